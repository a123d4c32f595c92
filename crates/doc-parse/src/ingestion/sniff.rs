//! Content-based MIME type detection
//!
//! Only leading bytes are trusted; file names and client-supplied types are
//! never consulted. `None` means the content was inconclusive and the caller
//! decides the fallback.

use std::io::Cursor;

use zip::ZipArchive;

use super::{MIME_DOCX, MIME_PDF};

pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_ZIP: &str = "application/zip";

const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: &[u8] = &[0x50, 0x4B, 0x05, 0x06];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Fixed signatures checked in order
const SIGNATURES: &[(&[u8], &str)] = &[
    (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "image/png"),
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (&[0x1F, 0x8B], "application/gzip"),
    (b"{\\rtf", "application/rtf"),
    (
        &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
        "application/x-ole-storage",
    ),
];

/// Detect the MIME type of `bytes`
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.is_empty() {
        return None;
    }

    if is_pdf(bytes) {
        return Some(MIME_PDF);
    }

    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
        return Some(classify_zip(bytes));
    }

    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, mime)| *mime)
}

fn is_pdf(bytes: &[u8]) -> bool {
    let mut slice = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    while let Some((first, rest)) = slice.split_first() {
        if first.is_ascii_whitespace() {
            slice = rest;
        } else {
            break;
        }
    }
    slice.starts_with(b"%PDF")
}

/// OOXML packages share the ZIP signature; tell them apart by their entries
fn classify_zip(bytes: &[u8]) -> &'static str {
    let archive = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => {
            tracing::debug!("ZIP signature but unreadable directory: {}", e);
            return MIME_ZIP;
        }
    };

    let mut has_content_types = false;
    let mut kind = None;
    for name in archive.file_names() {
        if name == "[Content_Types].xml" {
            has_content_types = true;
        } else if kind.is_none() {
            kind = if name.starts_with("word/") {
                Some(MIME_DOCX)
            } else if name.starts_with("xl/") {
                Some(MIME_XLSX)
            } else if name.starts_with("ppt/") {
                Some(MIME_PPTX)
            } else {
                None
            };
        }
    }

    match kind {
        Some(mime) => {
            if !has_content_types {
                tracing::debug!("OOXML entries without [Content_Types].xml, treating as {}", mime);
            }
            mime
        }
        None => MIME_ZIP,
    }
}
