//! Relation Extraction (RE) module
//!
//! Turns one biography into one [`ExtractionResult`] with a single
//! schema-constrained call to a [`StructuredLlm`]. Service errors, timeouts
//! and schema violations are folded into a failed result; nothing is
//! retried and nothing is raised to the caller.

use std::sync::Arc;
use std::time::Duration;

use dynasty_core::{
    AppConfig, Biography, DynastyError, ExtractionResult, PoliticalRelation, Result,
    StructuredLlm, StructuredRequest, Subject,
};

use crate::prompt::{build_user_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::schema::{relations_schema, validate_payload, SCHEMA_NAME};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the relation extractor
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// System prompt
    pub system_prompt: String,
    /// Upper bound on one service call
    pub timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ExtractorConfig {
    /// Take prompt and timeout from the application config
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config
                .extraction
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// LLM-backed political relation extractor
pub struct RelationExtractor {
    llm: Arc<dyn StructuredLlm>,
    config: ExtractorConfig,
    schema: serde_json::Value,
}

impl RelationExtractor {
    /// Create an extractor around a structured-output service
    pub fn new(llm: Arc<dyn StructuredLlm>, config: ExtractorConfig) -> Self {
        Self {
            llm,
            config,
            schema: relations_schema(),
        }
    }

    /// Model name of the underlying service
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Build the schema-constrained request for one subject
    pub fn build_request(&self, subject_name: &str, biography_text: &str) -> StructuredRequest {
        StructuredRequest {
            system: self.config.system_prompt.clone(),
            user: build_user_prompt(subject_name, biography_text),
            schema_name: SCHEMA_NAME.to_string(),
            schema: self.schema.clone(),
        }
    }

    /// Extract relations for `subject` from `biography`.
    ///
    /// An empty biography yields a successful result with no relations
    /// without calling the service.
    pub async fn extract(&self, subject: &Subject, biography: &Biography) -> ExtractionResult {
        if biography.is_empty() {
            tracing::debug!(subject = %subject.name, "Empty biography, skipping service call");
            return ExtractionResult::empty(&subject.source_ref);
        }

        match self.try_extract(&subject.name, &biography.text).await {
            Ok(relations) => {
                tracing::debug!(
                    subject = %subject.name,
                    relations = relations.len(),
                    "Relations extracted"
                );
                ExtractionResult::from_relations(&subject.source_ref, relations)
            }
            Err(e) => {
                tracing::warn!(subject = %subject.name, error = %e, "Extraction failed");
                ExtractionResult::failed(&subject.source_ref, e.to_string())
            }
        }
    }

    async fn try_extract(
        &self,
        subject_name: &str,
        biography_text: &str,
    ) -> Result<Vec<PoliticalRelation>> {
        let request = self.build_request(subject_name, biography_text);

        let response = tokio::time::timeout(
            self.config.timeout,
            self.llm.generate_structured(&request),
        )
        .await
        .map_err(|_| DynastyError::Timeout(self.config.timeout))??;

        let relations = validate_payload(response)?;
        Ok(exclude_self_references(subject_name, relations))
    }
}

/// Drop relations that name the subject themselves
pub fn exclude_self_references(
    subject_name: &str,
    relations: Vec<PoliticalRelation>,
) -> Vec<PoliticalRelation> {
    let subject_key = name_key(subject_name);
    relations
        .into_iter()
        .filter(|r| {
            let is_self = name_key(&r.relative_name) == subject_key;
            if is_self {
                tracing::debug!(relative = %r.relative_name, "Dropping self-reference");
            }
            !is_self
        })
        .collect()
}

/// Case- and whitespace-insensitive comparison key for person names
fn name_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
