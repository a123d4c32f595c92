//! Format detection and text extraction

mod docx;
mod pdf;
mod plain_text;
mod registry;
pub mod sniff;
pub mod xml;

pub use docx::{assemble_text, DocxParser};
pub use pdf::PdfParser;
pub use plain_text::PlainTextParser;
pub use registry::{builtin_parsers, ParserRegistration, ParserRegistry};

use crate::error::Result;
use crate::types::ParserOutput;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Core trait that all format parsers implement
pub trait Parser: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this parser handles the given MIME type
    fn supports(&self, mime_type: &str) -> bool;

    /// Extract text from raw file bytes
    fn parse(&self, bytes: &[u8]) -> Result<ParserOutput>;
}

/// Extracted characters per source byte, in percent. Zero-length sources yield 0.
pub(crate) fn text_ratio(text: &str, source_len: usize) -> f64 {
    if source_len == 0 {
        return 0.0;
    }
    text.chars().count() as f64 / source_len as f64 * 100.0
}
