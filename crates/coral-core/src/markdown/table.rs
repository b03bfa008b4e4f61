//! Structured tables and delimited-text export

use super::parser::TableNode;

/// A rectangular table: every row has `header.len()` cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StructuredTable {
    /// Build from header-first rows; `None` unless there is a header plus at
    /// least one body row and all rows have the header's width
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Option<Self> {
        if rows.len() < 2 {
            return None;
        }
        let width = rows[0].len();
        if width == 0 || rows.iter().any(|row| row.len() != width) {
            return None;
        }
        let header = rows.remove(0);
        Some(Self { header, rows })
    }

    fn is_well_formed(&self) -> bool {
        !self.header.is_empty()
            && !self.rows.is_empty()
            && self.rows.iter().all(|row| row.len() == self.header.len())
    }
}

/// Validate a parsed table node into a structured table
pub fn extract_structured_table(node: &TableNode) -> Option<StructuredTable> {
    StructuredTable::from_rows(node.rows.clone())
}

/// Serialize to delimited text, quoting every cell.
///
/// Rows end with `\n`. Returns `None` for an empty or ragged table.
pub fn structured_table_to_xsv(table: &StructuredTable, delimiter: char) -> Option<String> {
    if !table.is_well_formed() {
        return None;
    }

    let mut out = String::new();
    for row in std::iter::once(&table.header).chain(table.rows.iter()) {
        let line = row
            .iter()
            .map(|cell| quote(cell))
            .collect::<Vec<_>>()
            .join(&delimiter.to_string());
        out.push_str(&line);
        out.push('\n');
    }
    Some(out)
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// Parse delimited text (quoted or bare cells) back into a table
pub fn parse_xsv(text: &str, delimiter: char) -> Option<StructuredTable> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    // Anything seen since the last row break, including `""`
    let mut row_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    cell.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                row_started = true;
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
                row_started = false;
            }
            c if c == delimiter => {
                row.push(std::mem::take(&mut cell));
                row_started = true;
            }
            _ => {
                cell.push(c);
                row_started = true;
            }
        }
    }
    if in_quotes {
        return None;
    }
    if row_started {
        row.push(cell);
        rows.push(row);
    }

    StructuredTable::from_rows(rows)
}
