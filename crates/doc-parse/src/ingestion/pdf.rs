//! Paged document (PDF) text extraction

use std::collections::BTreeMap;

use lopdf::{Document, Encoding, Object, ObjectId};

use super::{text_ratio, Parser, MIME_PDF};
use crate::error::{Error, Result};
use crate::types::ParserOutput;

/// Operators that show text. Each one is a single content item.
const TEXT_OPERATORS: &[&str] = &["Tj", "TJ", "'", "\""];

/// Kerning adjustment (thousandths of an em) treated as a word gap inside a `TJ` array
const WORD_GAP: f32 = -100.0;

fn malformed(message: impl Into<String>) -> Error {
    Error::malformed("pdf", message)
}

/// Extracts text page by page. Each text-showing item on a page is trimmed,
/// empty items are dropped, and the rest are joined with single spaces. Pages
/// are joined with newlines. Any page that fails to decode aborts the whole
/// parse.
pub struct PdfParser;

impl PdfParser {
    fn page_text(doc: &Document, page_number: u32, page_id: ObjectId) -> Result<String> {
        let fonts = doc
            .get_page_fonts(page_id)
            .map_err(|e| malformed(format!("Failed to read fonts of page {}: {}", page_number, e)))?;
        let encodings = fonts
            .into_iter()
            .map(|(name, font)| font.get_font_encoding(doc).map(|encoding| (name, encoding)))
            .collect::<lopdf::Result<BTreeMap<Vec<u8>, Encoding>>>()
            .map_err(|e| malformed(format!("Unsupported font encoding on page {}: {}", page_number, e)))?;

        let content = doc
            .get_and_decode_page_content(page_id)
            .map_err(|e| malformed(format!("Failed to decode page {}: {}", page_number, e)))?;

        let mut items = Vec::new();
        let mut current: Option<&Encoding> = None;
        for operation in &content.operations {
            let operator = operation.operator.as_str();
            if operator == "Tf" {
                let font = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                    .ok_or_else(|| malformed(format!("Tf without a font name on page {}", page_number)))?;
                current = encodings.get(font);
            } else if TEXT_OPERATORS.contains(&operator) {
                let encoding = current.ok_or_else(|| {
                    malformed(format!("Text shown without a known font on page {}", page_number))
                })?;
                let mut item = String::new();
                collect_item(&mut item, encoding, &operation.operands).map_err(|e| {
                    malformed(format!("Failed to decode text on page {}: {}", page_number, e))
                })?;
                items.push(item);
            }
        }

        let items: Vec<&str> = items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .collect();

        Ok(items.join(" "))
    }
}

/// Decode the string operands of one text operator into `item`
fn collect_item(item: &mut String, encoding: &Encoding, operands: &[Object]) -> lopdf::Result<()> {
    for operand in operands {
        match operand {
            Object::String(bytes, _) => item.push_str(&Document::decode_text(encoding, bytes)?),
            Object::Array(elements) => collect_item(item, encoding, elements)?,
            Object::Integer(_) | Object::Real(_) => {
                if operand.as_float().map_or(false, |gap| gap < WORD_GAP) {
                    item.push(' ');
                }
            }
            _ => {}
        }
    }
    Ok(())
}

impl Parser for PdfParser {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == MIME_PDF
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParserOutput> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| malformed(format!("Failed to load PDF: {}", e)))?;

        // get_pages() is keyed by page number, so iteration is in page order
        let pages = doc.get_pages();
        let mut page_texts = Vec::with_capacity(pages.len());
        for (page_number, page_id) in &pages {
            page_texts.push(Self::page_text(&doc, *page_number, *page_id)?);
        }

        let text = page_texts.join("\n").trim().to_string();
        let text_len = text.chars().count();
        let percentage = text_ratio(&text, bytes.len()).round();

        tracing::debug!(
            "Extracted {} characters from {} PDF pages",
            text_len,
            pages.len()
        );

        Ok(ParserOutput::new(
            text,
            percentage,
            format!(
                "Parsed {} characters from {} document bytes",
                text_len,
                bytes.len()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build a PDF with one page per entry, each page running the given operations
    fn build_pdf_with(pages: Vec<Vec<Operation>>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids = Vec::new();
        for operations in pages {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    /// One text block per line, each showing its string with a single `Tj`
    fn build_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let pages = pages
            .iter()
            .map(|lines| {
                let mut operations = Vec::new();
                let mut y = 700;
                for line in lines.iter() {
                    operations.push(Operation::new("BT", vec![]));
                    operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                    operations.push(Operation::new("Td", vec![72.into(), y.into()]));
                    operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                    operations.push(Operation::new("ET", vec![]));
                    y -= 20;
                }
                operations
            })
            .collect();
        build_pdf_with(pages)
    }

    #[test]
    fn test_pages_in_order() {
        let bytes = build_pdf(&[&["Hello"], &["World"]]);
        let output = PdfParser.parse(&bytes).unwrap();

        let hello = output.text.find("Hello").unwrap();
        let world = output.text.find("World").unwrap();
        assert!(hello < world);
        assert_eq!(output.text.lines().count(), 2);
        assert!(output.parsed_percentage >= 0.0);
        assert_eq!(output.parsed_percentage.fract(), 0.0);
    }

    #[test]
    fn test_items_in_one_block_are_space_separated() {
        let bytes = build_pdf_with(vec![vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello")]),
            Operation::new("Td", vec![0.into(), (-20).into()]),
            Operation::new("Tj", vec![Object::string_literal("World")]),
            Operation::new("ET", vec![]),
        ]]);

        let output = PdfParser.parse(&bytes).unwrap();
        assert_eq!(output.text, "Hello World");
    }

    #[test]
    fn test_array_item_and_blank_items() {
        let bytes = build_pdf_with(vec![vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Hel"),
                    (-20).into(),
                    Object::string_literal("lo"),
                    (-300).into(),
                    Object::string_literal("there"),
                ])],
            ),
            Operation::new("Tj", vec![Object::string_literal("   ")]),
            Operation::new("Tj", vec![Object::string_literal("  again ")]),
            Operation::new("ET", vec![]),
        ]]);

        let output = PdfParser.parse(&bytes).unwrap();
        assert_eq!(output.text, "Hello there again");
    }

    #[test]
    fn test_text_without_font_is_malformed() {
        let bytes = build_pdf_with(vec![vec![
            Operation::new("BT", vec![]),
            Operation::new("Tj", vec![Object::string_literal("orphan")]),
            Operation::new("ET", vec![]),
        ]]);

        let err = PdfParser.parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn test_empty_text_is_zero_percent() {
        let bytes = build_pdf(&[&[]]);
        let output = PdfParser.parse(&bytes).unwrap();

        assert_eq!(output.text, "");
        assert_eq!(output.parsed_percentage, 0.0);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = PdfParser.parse(b"%PDF-1.4\nthis is not a pdf").unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }
}
