//! Plain-text rendering of messages and tables

use std::collections::HashMap;

use coral_core::chat::{span_key, BotMessage, BotState, ChatMessage, CitationIndex, ToolEvent};
use coral_core::markdown::{
    extract_structured_table, fix_citations_leading_markdown, insert_citation_markers,
    parse_tables, replace_citation_markers, structured_table_to_xsv,
};

/// Bot text with numbered citation references, followed by its sources
pub fn render_bot(bot: &BotMessage, index: &CitationIndex) -> String {
    let mut out = String::new();
    let mut sources: Vec<String> = Vec::new();

    match &bot.generation_id {
        Some(generation_id) if !bot.citations.is_empty() => {
            let citations = fix_citations_leading_markdown(&bot.citations, &bot.text);
            // The index is keyed by the spans the backend sent
            let original_keys: HashMap<String, String> = citations
                .iter()
                .zip(&bot.citations)
                .map(|(fixed, sent)| {
                    (
                        span_key(fixed.start, fixed.end),
                        span_key(sent.start, sent.end),
                    )
                })
                .collect();
            let marked = insert_citation_markers(&bot.text, &citations, generation_id);
            let text = replace_citation_markers(&marked, |marker| {
                let key = span_key(marker.start, marker.end);
                let key = original_keys.get(&key).unwrap_or(&key);
                let labels = index
                    .get(&marker.generation_id, key)
                    .map(|docs| docs.iter().map(|d| d.label().to_string()).collect::<Vec<_>>())
                    .unwrap_or_default();
                let label = if labels.is_empty() {
                    "(source unavailable)".to_string()
                } else {
                    labels.join(", ")
                };
                sources.push(label);
                format!("{}[{}]", marker.text, sources.len())
            });
            out.push_str(&text);
        }
        _ => out.push_str(&bot.text),
    }

    match bot.state {
        BotState::Error => {
            out.push_str(&format!(
                "\n\nerror: {}",
                bot.error.as_deref().unwrap_or("unknown error")
            ));
        }
        BotState::Aborted => out.push_str("\n\n[stopped]"),
        _ => {}
    }

    if !sources.is_empty() {
        out.push_str("\n\nSources:");
        for (n, label) in sources.iter().enumerate() {
            out.push_str(&format!("\n  [{}] {}", n + 1, label));
        }
    }
    out
}

/// One line per tool step, for showing what the bot did
pub fn render_tool_event(event: &ToolEvent) -> String {
    match event {
        ToolEvent::Plan { text } => format!("~ {}", text.trim()),
        ToolEvent::Search { queries } => {
            let texts: Vec<&str> = queries.iter().map(|q| q.text.as_str()).collect();
            format!("~ searching: {}", texts.join("; "))
        }
        ToolEvent::Calls { calls } => {
            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            format!("~ calling: {}", names.join(", "))
        }
        ToolEvent::Input { input } => format!("~ input: {}", input),
        ToolEvent::Result { result } => format!("~ result: {}", result),
    }
}

/// Whole conversation, user turns prefixed with `>`
pub fn render_conversation(messages: &[ChatMessage], index: &CitationIndex) -> String {
    messages
        .iter()
        .map(|message| match message {
            ChatMessage::User(user) => format!("> {}", user.text),
            ChatMessage::Bot(bot) => render_bot(bot, index),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Every well-formed table in `markdown` as delimited text
pub fn render_tables(markdown: &str, delimiter: char) -> Vec<String> {
    parse_tables(markdown)
        .iter()
        .filter_map(extract_structured_table)
        .filter_map(|table| structured_table_to_xsv(&table, delimiter))
        .collect()
}
