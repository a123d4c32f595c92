//! MIME type to parser mapping

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::{DocxParser, Parser, PdfParser, PlainTextParser, MIME_DOCX, MIME_PDF, MIME_TEXT};

/// Static registration fact: a MIME type and how to build its parser
#[derive(Clone, Copy)]
pub struct ParserRegistration {
    pub mime_type: &'static str,
    pub build: fn() -> Arc<dyn Parser>,
}

fn plain_text() -> Arc<dyn Parser> {
    Arc::new(PlainTextParser)
}

fn pdf() -> Arc<dyn Parser> {
    Arc::new(PdfParser)
}

fn docx() -> Arc<dyn Parser> {
    Arc::new(DocxParser)
}

/// The built-in parsers, in registration order
pub fn builtin_parsers() -> Vec<ParserRegistration> {
    vec![
        ParserRegistration {
            mime_type: MIME_TEXT,
            build: plain_text,
        },
        ParserRegistration {
            mime_type: MIME_PDF,
            build: pdf,
        },
        ParserRegistration {
            mime_type: MIME_DOCX,
            build: docx,
        },
    ]
}

/// Lookup table from MIME type to parser. Built once at startup and only
/// read afterwards.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in parsers
    pub fn with_builtin() -> Self {
        Self::from_registrations(builtin_parsers())
    }

    pub fn from_registrations(registrations: impl IntoIterator<Item = ParserRegistration>) -> Self {
        let mut registry = Self::new();
        for registration in registrations {
            registry.register(registration.mime_type, (registration.build)());
        }
        registry
    }

    /// Register a parser. A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, mime_type: impl Into<String>, parser: Arc<dyn Parser>) {
        let mime_type = mime_type.into();
        if let Some(previous) = self.parsers.insert(mime_type.clone(), parser) {
            tracing::warn!(
                "Parser '{}' for {} replaced by a later registration",
                previous.name(),
                mime_type
            );
        }
    }

    /// Parser for an exact MIME type
    pub fn get(&self, mime_type: &str) -> Option<Arc<dyn Parser>> {
        self.parsers.get(mime_type).cloned()
    }

    pub fn supported_types(&self) -> BTreeSet<String> {
        self.parsers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}
