//! Storage module for persistent data storage
//!
//! SQLite-backed persistence for parsed file records and the durable job queue.

mod database;
mod jobs;
mod parsed_files;

pub use database::Database;
pub use jobs::{JobStore, QUEUE_POLICY};
pub use parsed_files::ResultStore;
