//! Collaborator abstractions
//!
//! The pipeline reads source bytes through a trait so the file store can be a
//! local directory, an in-memory map, or a remote service.

pub mod file_store;

pub use file_store::{FileStore, InMemoryFileStore, LocalFileStore};
