//! Zipped XML word-processing documents (DOCX)
//!
//! Only three container parts are read: the main document, footnotes and
//! endnotes. Body paragraphs are walked in order; each run contributes its
//! text, or the resolved text of the footnote/endnote it references.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use zip::result::ZipError;
use zip::ZipArchive;

use super::xml::{self, XmlElement};
use super::{text_ratio, Parser, MIME_DOCX};
use crate::error::{Error, Result};
use crate::types::ParserOutput;

const DOCUMENT_PART: &str = "word/document.xml";
const FOOTNOTES_PART: &str = "word/footnotes.xml";
const ENDNOTES_PART: &str = "word/endnotes.xml";

/// Upper bound on the decompressed size of one container part
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

const COMMENT: &str = "DOCX containers carry styling and metadata, so the percentage understates text coverage";
const MISSING_DOCUMENT_COMMENT: &str = "No word/document.xml found in the container";

fn malformed(message: impl Into<String>) -> Error {
    Error::malformed("docx", message)
}

pub struct DocxParser;

impl DocxParser {
    /// Read one named entry, `None` if the container does not have it.
    /// The size declared in the ZIP headers is not trusted; reading stops
    /// once `limit` bytes have been decompressed.
    fn read_part(
        archive: &mut ZipArchive<Cursor<&[u8]>>,
        name: &str,
        limit: u64,
    ) -> Result<Option<Vec<u8>>> {
        let entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(malformed(format!("Failed to open {}: {}", name, e))),
        };

        let mut buf = Vec::new();
        entry
            .take(limit + 1)
            .read_to_end(&mut buf)
            .map_err(|e| malformed(format!("Failed to read {}: {}", name, e)))?;

        if buf.len() as u64 > limit {
            return Err(malformed(format!(
                "{} expands beyond {} bytes",
                name, limit
            )));
        }
        Ok(Some(buf))
    }

    fn parse_part(name: &str, bytes: Option<Vec<u8>>) -> Result<Option<XmlElement>> {
        bytes
            .map(|bytes| {
                xml::parse_document(&bytes).map_err(|e| malformed(format!("{}: {}", name, e)))
            })
            .transpose()
    }
}

impl Parser for DocxParser {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == MIME_DOCX
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParserOutput> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| malformed(format!("Invalid ZIP container: {}", e)))?;

        let Some(document) = Self::read_part(&mut archive, DOCUMENT_PART, MAX_PART_BYTES)? else {
            tracing::warn!("DOCX container has no {}", DOCUMENT_PART);
            return Ok(ParserOutput::new(String::new(), 0.0, MISSING_DOCUMENT_COMMENT));
        };
        let footnotes = Self::read_part(&mut archive, FOOTNOTES_PART, MAX_PART_BYTES)?;
        let endnotes = Self::read_part(&mut archive, ENDNOTES_PART, MAX_PART_BYTES)?;

        let document = xml::parse_document(&document)
            .map_err(|e| malformed(format!("{}: {}", DOCUMENT_PART, e)))?;
        let footnotes = Self::parse_part(FOOTNOTES_PART, footnotes)?;
        let endnotes = Self::parse_part(ENDNOTES_PART, endnotes)?;

        let text = assemble_text(&document, footnotes.as_ref(), endnotes.as_ref())?;
        let percentage = text_ratio(&text, bytes.len());

        Ok(ParserOutput::new(text, percentage, COMMENT))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NoteKind {
    Footnote,
    Endnote,
}

impl NoteKind {
    fn element(&self) -> &'static str {
        match self {
            NoteKind::Footnote => "footnote",
            NoteKind::Endnote => "endnote",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            NoteKind::Footnote => "Footnote",
            NoteKind::Endnote => "Endnote",
        }
    }

    fn part(&self) -> &'static str {
        match self {
            NoteKind::Footnote => FOOTNOTES_PART,
            NoteKind::Endnote => ENDNOTES_PART,
        }
    }
}

/// Notes of one kind, indexed by id
struct NoteTable<'a> {
    kind: NoteKind,
    notes: Option<HashMap<i64, &'a XmlElement>>,
}

impl<'a> NoteTable<'a> {
    fn build(kind: NoteKind, root: Option<&'a XmlElement>) -> Self {
        let notes = match root {
            Some(root) => {
                let mut notes = HashMap::new();
                for note in root.children_named(kind.element()) {
                    match note_id(note, kind) {
                        Ok(id) => {
                            notes.insert(id, note);
                        }
                        // unreferenceable; only a reference to it is an error
                        Err(e) => tracing::debug!("Skipping {}: {}", kind.element(), e),
                    }
                }
                Some(notes)
            }
            None => None,
        };
        Self { kind, notes }
    }

    fn get(&self, id: i64) -> Result<&'a XmlElement> {
        let notes = self.notes.as_ref().ok_or_else(|| {
            malformed(format!(
                "{} {} referenced but {} is missing",
                self.kind.label(),
                id,
                self.kind.part()
            ))
        })?;

        notes
            .get(&id)
            .copied()
            .ok_or_else(|| malformed(format!("{} {} not found", self.kind.label(), id)))
    }
}

fn note_id(element: &XmlElement, kind: NoteKind) -> Result<i64> {
    let raw = element
        .attribute("id")
        .ok_or_else(|| malformed(format!("<{}> without an id", element.name)))?;
    raw.trim()
        .parse()
        .map_err(|_| malformed(format!("{} id '{}' is not numeric", kind.label(), raw)))
}

struct Assembler<'a> {
    footnotes: NoteTable<'a>,
    endnotes: NoteTable<'a>,
    // notes currently being expanded, to stop self-referencing notes
    resolving: Vec<(NoteKind, i64)>,
}

impl<'a> Assembler<'a> {
    fn paragraphs(&mut self, container: &XmlElement) -> Result<Vec<String>> {
        container
            .children_named("p")
            .map(|paragraph| self.paragraph(paragraph))
            .collect()
    }

    fn paragraph(&mut self, paragraph: &XmlElement) -> Result<String> {
        let mut parts = Vec::new();
        for run in paragraph.children_named("r") {
            if let Some(part) = self.run(run)? {
                parts.push(part);
            }
        }
        Ok(parts.join(" "))
    }

    fn run(&mut self, run: &XmlElement) -> Result<Option<String>> {
        let text: String = run.children_named("t").map(|t| t.text()).collect();
        if !text.is_empty() {
            return Ok(Some(text));
        }

        if let Some(reference) = run.child("footnoteReference") {
            return self.note(NoteKind::Footnote, reference).map(Some);
        }
        if let Some(reference) = run.child("endnoteReference") {
            return self.note(NoteKind::Endnote, reference).map(Some);
        }

        Ok(None)
    }

    fn note(&mut self, kind: NoteKind, reference: &XmlElement) -> Result<String> {
        let id = note_id(reference, kind)?;
        if self.resolving.contains(&(kind, id)) {
            return Err(malformed(format!("{} {} references itself", kind.label(), id)));
        }

        let note = match kind {
            NoteKind::Footnote => self.footnotes.get(id)?,
            NoteKind::Endnote => self.endnotes.get(id)?,
        };

        self.resolving.push((kind, id));
        let paragraphs = self.paragraphs(note);
        self.resolving.pop();

        Ok(format!("({}: {})", kind.label(), paragraphs?.join("\n")))
    }
}

/// Assemble document text from already-parsed main, footnotes and endnotes
/// trees. Paragraph runs are joined with spaces and paragraphs with newlines.
/// A reference to a note that cannot be resolved is an error.
pub fn assemble_text(
    document: &XmlElement,
    footnotes: Option<&XmlElement>,
    endnotes: Option<&XmlElement>,
) -> Result<String> {
    let body = if document.local_name() == "body" {
        document
    } else {
        document
            .child("body")
            .ok_or_else(|| malformed(format!("{} has no body element", DOCUMENT_PART)))?
    };

    let mut assembler = Assembler {
        footnotes: NoteTable::build(NoteKind::Footnote, footnotes),
        endnotes: NoteTable::build(NoteKind::Endnote, endnotes),
        resolving: Vec::new(),
    };

    Ok(assembler.paragraphs(body)?.join("\n"))
}
