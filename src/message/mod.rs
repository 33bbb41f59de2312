//! Parsing of Claude Code stream-json output

mod parser;

pub use parser::{assistant_text, parse_line, parse_message};
