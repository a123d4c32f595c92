//! Plain text passthrough

use super::{Parser, MIME_TEXT};
use crate::error::Result;
use crate::types::ParserOutput;

pub struct PlainTextParser;

impl Parser for PlainTextParser {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == MIME_TEXT
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParserOutput> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        Ok(ParserOutput::new(text, 100.0, "plain text, no extraction loss"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello() {
        let output = PlainTextParser.parse(b"hello").unwrap();
        assert_eq!(output.text, "hello");
        assert_eq!(output.parsed_percentage, 100.0);
        assert_eq!(
            output.parsed_comment.as_deref(),
            Some("plain text, no extraction loss")
        );
    }

    #[test]
    fn test_keeps_text_verbatim() {
        let output = PlainTextParser.parse(b"  line one\n\tline two \n").unwrap();
        assert_eq!(output.text, "  line one\n\tline two \n");
    }
}
