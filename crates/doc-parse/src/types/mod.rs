//! Core types for the parsing pipeline

pub mod job;
pub mod parse_result;

pub use job::{DequeueOutcome, EnqueueOutcome, JobRecord, JobState, QueueStats};
pub use parse_result::{ParseResult, ParsedFileRecord, ParserOutput};
