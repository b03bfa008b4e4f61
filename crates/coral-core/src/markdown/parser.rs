//! Markdown parsing using pulldown-cmark
//!
//! Pulls tables and fenced code blocks out of a bot response.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// A table as plain cell text, header row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNode {
    pub rows: Vec<Vec<String>>,
}

/// Fenced or indented code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub lang: Option<String>,
    pub code: String,
}

fn events(text: &str) -> Vec<Event<'_>> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    Parser::new_ext(text, options).collect()
}

/// Every table in the document, in order
pub fn parse_tables(text: &str) -> Vec<TableNode> {
    let events = events(text);
    let mut tables = Vec::new();
    let mut idx = 0;

    while idx < events.len() {
        match &events[idx] {
            Event::Start(Tag::Table(_)) => {
                let (table, new_idx) = parse_table(&events, idx + 1);
                tables.push(table);
                idx = new_idx;
            }
            _ => idx += 1,
        }
    }

    tables
}

/// Every code block in the document, in order
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let events = events(text);
    let mut blocks = Vec::new();
    let mut idx = 0;

    while idx < events.len() {
        match &events[idx] {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                    _ => None,
                };
                let (code, new_idx) = collect_code_block(&events, idx + 1);
                blocks.push(CodeBlock { lang, code });
                idx = new_idx;
            }
            _ => idx += 1,
        }
    }

    blocks
}

fn collect_code_block(events: &[Event<'_>], start: usize) -> (String, usize) {
    let mut code = String::new();
    let mut idx = start;

    while idx < events.len() {
        match &events[idx] {
            Event::End(TagEnd::CodeBlock) => {
                return (code, idx + 1);
            }
            Event::Text(text) => {
                code.push_str(text);
                idx += 1;
            }
            _ => {
                idx += 1;
            }
        }
    }

    (code, idx)
}

fn parse_table(events: &[Event<'_>], start: usize) -> (TableNode, usize) {
    let mut rows = Vec::new();
    let mut idx = start;
    let mut current_row: Vec<String> = Vec::new();

    while idx < events.len() {
        match &events[idx] {
            Event::End(TagEnd::Table) => {
                return (TableNode { rows }, idx + 1);
            }
            // The header's cells are not wrapped in a TableRow
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => {
                current_row = Vec::new();
                idx += 1;
            }
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                if !current_row.is_empty() {
                    rows.push(std::mem::take(&mut current_row));
                }
                idx += 1;
            }
            Event::Start(Tag::TableCell) => {
                let (content, new_idx) = cell_text(events, idx + 1);
                current_row.push(content);
                idx = new_idx;
            }
            _ => {
                idx += 1;
            }
        }
    }

    (TableNode { rows }, idx)
}

/// Plain text of a cell; formatting is dropped
fn cell_text(events: &[Event<'_>], start: usize) -> (String, usize) {
    let mut text = String::new();
    let mut idx = start;

    while idx < events.len() {
        match &events[idx] {
            Event::End(TagEnd::TableCell) => {
                return (text.trim().to_string(), idx + 1);
            }
            Event::Text(t) | Event::Code(t) | Event::InlineHtml(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
        idx += 1;
    }

    (text.trim().to_string(), idx)
}
