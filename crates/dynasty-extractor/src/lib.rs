//! Dynasty Extractor - Political relation extraction pipeline
//!
//! Reads subject biographies, asks a structured-output LLM for politically
//! active relatives and classifies each subject's result.

pub mod pipeline;
pub mod prompt;
pub mod relation;
pub mod schema;
pub mod source;

pub use pipeline::{Pipeline, RunStats, SubjectOutcome};
pub use relation::{ExtractorConfig, RelationExtractor};
pub use schema::{relations_schema, validate_payload, RelationsPayload, SCHEMA_NAME};
pub use source::{source_key, DirectorySource, MemorySource};
