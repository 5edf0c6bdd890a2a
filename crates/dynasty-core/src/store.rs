//! JSON record store
//!
//! Persists one record per subject after extraction. The whole store is
//! rewritten on save; a run never updates records in place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DynastyError, ExtractionResult, PoliticalRelation, Result, Subject};

/// Persisted form of one subject's extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub name: String,
    pub source_ref: String,
    pub group: String,
    pub relations: Vec<PoliticalRelation>,
    pub has_political_ancestor: bool,
    pub has_political_relation: bool,
    pub political_relations_count: usize,
    pub political_ancestor_count: usize,
    #[serde(default)]
    pub extraction_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Build the record for a finished extraction
    pub fn new(subject: &Subject, result: &ExtractionResult, extracted_at: DateTime<Utc>) -> Self {
        Self {
            name: subject.name.clone(),
            source_ref: subject.source_ref.clone(),
            group: subject.group.clone(),
            relations: result.relations().to_vec(),
            has_political_ancestor: result.has_political_ancestor(),
            has_political_relation: result.has_political_relation(),
            political_relations_count: result.relations().len(),
            political_ancestor_count: result.ancestor_count(),
            extraction_failed: result.extraction_failed(),
            failure_reason: result.failure_reason().map(str::to_string),
            extracted_at,
        }
    }

    /// Rebuild the subject and its result.
    ///
    /// Flags are re-derived from the stored relations rather than trusted.
    pub fn into_parts(self) -> (Subject, ExtractionResult) {
        let subject = Subject::new(self.name, self.source_ref, self.group);
        let result = if self.extraction_failed {
            ExtractionResult::failed(
                subject.source_ref.clone(),
                self.failure_reason
                    .unwrap_or_else(|| "extraction failed".to_string()),
            )
        } else {
            ExtractionResult::from_relations(subject.source_ref.clone(), self.relations)
        };
        (subject, result)
    }
}

/// Trait for record persistence
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every record; an absent store is empty
    async fn load(&self) -> Result<Vec<StoredRecord>>;

    /// Replace the whole store with `records`
    async fn save(&self, records: &[StoredRecord]) -> Result<()>;
}

/// Record store backed by a single pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<StoredRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            DynastyError::Storage(format!("Failed to parse {}: {e}", self.path.display()))
        })
    }

    async fn save(&self, records: &[StoredRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| DynastyError::Storage(format!("Failed to serialize records: {e}")))?;

        // Write then rename so a crash never leaves a truncated store
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::info!(
            "Saved {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}
