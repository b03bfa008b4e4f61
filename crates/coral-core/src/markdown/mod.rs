//! Markdown post-processing for bot responses
//!
//! Table extraction and CSV/TSV export, code block extraction, and inline
//! citation markers.

pub mod citations;
pub mod parser;
pub mod table;

pub use citations::{
    fix_citations_leading_markdown, insert_citation_markers, parse_citation_markers,
    replace_citation_markers, CitationMarker,
};
pub use parser::{extract_code_blocks, parse_tables, CodeBlock, TableNode};
pub use table::{extract_structured_table, parse_xsv, structured_table_to_xsv, StructuredTable};
