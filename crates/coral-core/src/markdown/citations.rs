//! Inline citation markers
//!
//! Cited spans are wrapped as `:cite[span]{generationId="g" start="s" end="e"}`
//! so a renderer can attach the documents from the citation index.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::chat::types::Citation;

/// Markdown syntax that can open a cited span
static LEADING_MARKDOWN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:#{1,6}[ \t]+|[-+*][ \t]+|\d+\.[ \t]+|[*_~`]+)+").unwrap());

/// Emphasis/code markers that can close a cited span
static TRAILING_MARKDOWN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_~`]+$").unwrap());

static CITE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#":cite\[((?:\\.|[^\]\\])*)\]\{generationId="([^"]*)" start="(\d+)" end="(\d+)"\}"#)
        .unwrap()
});

/// A marker found in annotated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    pub text: String,
    pub generation_id: String,
    pub start: usize,
    pub end: usize,
}

/// Byte offset of every char boundary, plus the end of the string
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Move citation bounds inward past markdown markers, so that `**Paris**`
/// cites `Paris` and the emphasis stays intact around the marker.
pub fn fix_citations_leading_markdown(citations: &[Citation], text: &str) -> Vec<Citation> {
    let bounds = char_boundaries(text);
    let char_len = bounds.len() - 1;

    citations
        .iter()
        .map(|citation| {
            if citation.start >= citation.end || citation.end > char_len {
                return citation.clone();
            }
            let span = &text[bounds[citation.start]..bounds[citation.end]];

            let lead = LEADING_MARKDOWN
                .find(span)
                .map(|m| m.as_str().chars().count())
                .unwrap_or(0);
            let rest: String = span.chars().skip(lead).collect();
            let trail = TRAILING_MARKDOWN
                .find(&rest)
                .map(|m| m.as_str().chars().count())
                .unwrap_or(0);

            let start = citation.start + lead;
            let end = citation.end - trail;
            if start >= end {
                return citation.clone();
            }
            Citation {
                start,
                end,
                text: text[bounds[start]..bounds[end]].to_string(),
                document_ids: citation.document_ids.clone(),
            }
        })
        .collect()
}

/// Wrap each cited span of `text` in a citation marker.
///
/// Spans are inserted right to left; spans that are empty, out of range or
/// overlap an already inserted span are skipped.
pub fn insert_citation_markers(text: &str, citations: &[Citation], generation_id: &str) -> String {
    let bounds = char_boundaries(text);
    let char_len = bounds.len() - 1;

    let mut ordered: Vec<&Citation> = citations.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    let mut out = text.to_string();
    let mut limit = char_len;
    for citation in ordered {
        if citation.start >= citation.end || citation.end > limit {
            continue;
        }
        let (from, to) = (bounds[citation.start], bounds[citation.end]);
        let span = text[from..to].replace('\\', "\\\\").replace(']', "\\]");
        let marker = format!(
            ":cite[{}]{{generationId=\"{}\" start=\"{}\" end=\"{}\"}}",
            span, generation_id, citation.start, citation.end
        );
        out.replace_range(from..to, &marker);
        limit = citation.start;
    }
    out
}

/// Every citation marker in annotated text, in order
pub fn parse_citation_markers(text: &str) -> Vec<CitationMarker> {
    CITE_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            Some(CitationMarker {
                text: unescape(&caps[1]),
                generation_id: caps[2].to_string(),
                start: caps[3].parse().ok()?,
                end: caps[4].parse().ok()?,
            })
        })
        .collect()
}

/// Replace each marker with whatever `render` returns for it
pub fn replace_citation_markers<F>(text: &str, mut render: F) -> String
where
    F: FnMut(&CitationMarker) -> String,
{
    CITE_MARKER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let marker = CitationMarker {
                text: unescape(&caps[1]),
                generation_id: caps[2].to_string(),
                start: caps[3].parse().unwrap_or(0),
                end: caps[4].parse().unwrap_or(0),
            };
            render(&marker)
        })
        .into_owned()
}

fn unescape(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut chars = span.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cite(start: usize, end: usize) -> Citation {
        Citation {
            start,
            end,
            text: String::new(),
            document_ids: vec!["d1".into()],
        }
    }

    #[test]
    fn test_insert_markers() {
        let text = "Paris is in France.";
        let marked = insert_citation_markers(text, &[cite(0, 5), cite(12, 18)], "g1");
        assert_eq!(
            marked,
            ":cite[Paris]{generationId=\"g1\" start=\"0\" end=\"5\"} is in \
             :cite[France]{generationId=\"g1\" start=\"12\" end=\"18\"}."
        );
    }

    #[test]
    fn test_insert_skips_overlap_and_out_of_range() {
        let text = "abcdef";
        let marked = insert_citation_markers(text, &[cite(1, 4), cite(3, 6), cite(4, 99)], "g");
        let markers = parse_citation_markers(&marked);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].text, "def");
    }

    #[test]
    fn test_char_offsets_with_multibyte_text() {
        let text = "Caf\u{e9} \u{1f980} crab";
        let marked = insert_citation_markers(text, &[cite(5, 6)], "g");
        let markers = parse_citation_markers(&marked);
        assert_eq!(markers[0].text, "\u{1f980}");
        assert!(marked.starts_with("Caf\u{e9} :cite["));
    }

    #[test]
    fn test_marker_round_trip_with_brackets() {
        let text = "see [1] here";
        let marked = insert_citation_markers(text, &[cite(4, 7)], "g9");
        let markers = parse_citation_markers(&marked);
        assert_eq!(
            markers,
            vec![CitationMarker {
                text: "[1]".into(),
                generation_id: "g9".into(),
                start: 4,
                end: 7,
            }]
        );
        let rendered = replace_citation_markers(&marked, |m| format!("<{}>", m.text));
        assert_eq!(rendered, "see <[1]> here");
    }

    #[test]
    fn test_fix_leading_markdown() {
        let text = "The **Eiffel Tower** is tall.\n## Heading cited";
        // Citation covers "**Eiffel Tower**"
        let fixed = fix_citations_leading_markdown(&[cite(4, 20), cite(30, 46)], text);
        assert_eq!(fixed[0].text, "Eiffel Tower");
        assert_eq!((fixed[0].start, fixed[0].end), (6, 18));
        assert_eq!(fixed[1].text, "Heading cited");
    }

    #[test]
    fn test_fix_star_bullet() {
        let text = "Cities:\n* **Paris** is big";
        let fixed = fix_citations_leading_markdown(&[cite(8, 19)], text);
        assert_eq!(fixed[0].text, "Paris");
        assert_eq!((fixed[0].start, fixed[0].end), (12, 17));
    }

    #[test]
    fn test_fix_leaves_plain_and_invalid_spans() {
        let text = "plain text";
        let citations = vec![cite(0, 5), cite(3, 2), cite(0, 50)];
        let fixed = fix_citations_leading_markdown(&citations, text);
        assert_eq!(fixed[0].text, "plain");
        assert_eq!(fixed[1], citations[1]);
        assert_eq!(fixed[2], citations[2]);
    }
}
