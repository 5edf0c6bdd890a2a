//! Dynasty Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the dynasty system:
//! - Subjects, biographies and extracted political relations
//! - Extraction results and summary rows
//! - Common error types
//! - Service boundary traits (structured LLM, biography source)
//! - Configuration management
//! - JSON record store
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod store;
pub mod subjects;

pub use config::{
    AppConfig, ConfigError, ExtractionConfig, FailurePolicy, LlmConfig, LlmProvider,
    LoggingConfig, ReportConfig,
};
pub use store::{JsonFileStore, RecordStore, StoredRecord};
pub use subjects::{classify_party, load_subjects, SubjectRecord};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for dynasty operations
#[derive(Error, Debug)]
pub enum DynastyError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Biography fetch failed: {0}")]
    Fetch(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Service call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DynastyError>;

// ============================================================================
// Subjects and Biographies
// ============================================================================

/// One member of the legislature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Display name, also used to tell the subject apart from relatives
    pub name: String,

    /// Opaque locator of the biography (usually a URL)
    pub source_ref: String,

    /// Party or category label used for grouping
    pub group: String,
}

impl Subject {
    /// Create a new subject
    pub fn new(
        name: impl Into<String>,
        source_ref: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_ref: source_ref.into(),
            group: group.into(),
        }
    }
}

/// Raw biography text for one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Biography {
    pub subject_ref: String,
    pub text: String,
}

impl Biography {
    /// Create a biography
    pub fn new(subject_ref: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            subject_ref: subject_ref.into(),
            text: text.into(),
        }
    }

    /// A biography with no text (missing page or failed fetch)
    pub fn empty(subject_ref: impl Into<String>) -> Self {
        Self::new(subject_ref, String::new())
    }

    /// True when there is nothing to extract from
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// ============================================================================
// Political Relations
// ============================================================================

/// How a relative is related to the subject
///
/// Unknown values are rejected at deserialization time; there is no
/// fallback variant. Variants must not carry doc comments: the generated
/// schema has to stay a flat string enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    // mother or father
    Parent,
    // grandmother, grandfather, or any great-grandparent
    Grandparent,
    // includes great-aunts and great-uncles
    AuntOrUncle,
    // any other blood ancestor
    OtherAncestor,
    // brother or sister
    Sibling,
    // husband, wife or civil partner
    Spouse,
    // cousin, child, in-law...
    Other,
}

impl RelationKind {
    /// Every variant, in declaration order
    pub const ALL: [RelationKind; 7] = [
        Self::Parent,
        Self::Grandparent,
        Self::AuntOrUncle,
        Self::OtherAncestor,
        Self::Sibling,
        Self::Spouse,
        Self::Other,
    ];

    /// Get the wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Grandparent => "grandparent",
            Self::AuntOrUncle => "aunt_or_uncle",
            Self::OtherAncestor => "other_ancestor",
            Self::Sibling => "sibling",
            Self::Spouse => "spouse",
            Self::Other => "other",
        }
    }

    /// Whether this kind denotes a blood ancestor.
    ///
    /// Fixed policy: parents, grandparents, aunts/uncles and other ancestors
    /// count; siblings, spouses and anything else do not.
    pub fn is_ancestor(&self) -> bool {
        matches!(
            self,
            Self::Parent | Self::Grandparent | Self::AuntOrUncle | Self::OtherAncestor
        )
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationKind {
    type Err = DynastyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DynastyError::SchemaValidation(format!("unknown relation kind: {s}")))
    }
}

/// A family member of the subject who held political office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PoliticalRelation {
    /// Relationship of the family member to the politician
    pub relation_kind: RelationKind,

    /// Name of the family member
    pub relative_name: String,

    /// Short justification quoted or paraphrased from the biography
    pub description: Option<String>,

    /// Political role of the family member (MP, councillor, peer...)
    pub role: Option<String>,

    /// Political party of the family member
    pub party: Option<String>,
}

impl PoliticalRelation {
    /// Create a relation with only the required fields
    pub fn new(relation_kind: RelationKind, relative_name: impl Into<String>) -> Self {
        Self {
            relation_kind,
            relative_name: relative_name.into(),
            description: None,
            role: None,
            party: None,
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set political role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set party
    pub fn with_party(mut self, party: impl Into<String>) -> Self {
        self.party = Some(party.into());
        self
    }

    /// Derived from `relation_kind`
    pub fn is_ancestor(&self) -> bool {
        self.relation_kind.is_ancestor()
    }
}

// ============================================================================
// Extraction Results
// ============================================================================

/// Outcome of extracting relations for one subject
///
/// Fields are private so that the flags can only be derived from the
/// relation list; a failed result always has no relations and both flags
/// cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    subject_ref: String,
    relations: Vec<PoliticalRelation>,
    has_political_ancestor: bool,
    has_political_relation: bool,
    extraction_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl ExtractionResult {
    /// Successful extraction; flags are derived from `relations`
    pub fn from_relations(
        subject_ref: impl Into<String>,
        relations: Vec<PoliticalRelation>,
    ) -> Self {
        let has_political_ancestor = relations.iter().any(PoliticalRelation::is_ancestor);
        let has_political_relation = !relations.is_empty();
        Self {
            subject_ref: subject_ref.into(),
            relations,
            has_political_ancestor,
            has_political_relation,
            extraction_failed: false,
            failure_reason: None,
        }
    }

    /// Successful extraction that found nothing
    pub fn empty(subject_ref: impl Into<String>) -> Self {
        Self::from_relations(subject_ref, Vec::new())
    }

    /// Failed extraction
    pub fn failed(subject_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            subject_ref: subject_ref.into(),
            relations: Vec::new(),
            has_political_ancestor: false,
            has_political_relation: false,
            extraction_failed: true,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn subject_ref(&self) -> &str {
        &self.subject_ref
    }

    /// Relations in extraction order
    pub fn relations(&self) -> &[PoliticalRelation] {
        &self.relations
    }

    pub fn has_political_ancestor(&self) -> bool {
        self.has_political_ancestor
    }

    pub fn has_political_relation(&self) -> bool {
        self.has_political_relation
    }

    pub fn extraction_failed(&self) -> bool {
        self.extraction_failed
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Number of relations whose kind is an ancestor
    pub fn ancestor_count(&self) -> usize {
        self.relations.iter().filter(|r| r.is_ancestor()).count()
    }
}

// ============================================================================
// Summary Rows
// ============================================================================

/// Group key of the row that covers every subject
pub const ALL_GROUP: &str = "ALL";

/// Aggregate statistics for one group
///
/// Percentages are `None` when the group has no successful extraction,
/// which is distinct from `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub group_key: String,
    pub political_ancestor_percentage: Option<f64>,
    pub political_relation_percentage: Option<f64>,
    pub subject_count: usize,
}

// ============================================================================
// Traits
// ============================================================================

/// A schema-constrained request to a text-to-structured-data service
#[derive(Debug, Clone, Serialize)]
pub struct StructuredRequest {
    /// System instructions
    pub system: String,

    /// User content (the biography)
    pub user: String,

    /// Name attached to the schema
    pub schema_name: String,

    /// JSON schema the output must conform to
    pub schema: serde_json::Value,
}

/// Trait for services that turn text into schema-conforming JSON
#[async_trait::async_trait]
pub trait StructuredLlm: Send + Sync {
    /// Generate a JSON value constrained by `request.schema`
    async fn generate_structured(&self, request: &StructuredRequest)
        -> Result<serde_json::Value>;

    /// Model name for logging
    fn model(&self) -> &str;
}

/// Trait for biography providers
#[async_trait::async_trait]
pub trait BiographySource: Send + Sync {
    /// Retrieve the biography text of `subject`
    async fn fetch(&self, subject: &Subject) -> Result<Biography>;

    /// Source name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_policy() {
        let ancestors: Vec<_> = RelationKind::ALL
            .iter()
            .filter(|k| k.is_ancestor())
            .copied()
            .collect();

        assert_eq!(
            ancestors,
            vec![
                RelationKind::Parent,
                RelationKind::Grandparent,
                RelationKind::AuntOrUncle,
                RelationKind::OtherAncestor,
            ]
        );
        assert!(!RelationKind::Sibling.is_ancestor());
        assert!(!RelationKind::Spouse.is_ancestor());
        assert!(!RelationKind::Other.is_ancestor());
    }

    #[test]
    fn test_relation_kind_wire_format() {
        for kind in RelationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.as_str().parse::<RelationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_relation_kind_rejects_unknown() {
        assert!("cousin".parse::<RelationKind>().is_err());
        assert!(serde_json::from_str::<RelationKind>("\"cousin\"").is_err());
        assert!(serde_json::from_str::<RelationKind>("\"Parent\"").is_err());
    }

    #[test]
    fn test_relation_requires_name() {
        let missing = serde_json::json!({ "relation_kind": "parent" });
        assert!(serde_json::from_value::<PoliticalRelation>(missing).is_err());

        let minimal = serde_json::json!({
            "relation_kind": "spouse",
            "relative_name": "Jane Doe"
        });
        let relation: PoliticalRelation = serde_json::from_value(minimal).unwrap();
        assert_eq!(relation.relation_kind, RelationKind::Spouse);
        assert!(relation.description.is_none());
    }

    #[test]
    fn test_relation_builders_serialize_optional_fields() {
        let relation = PoliticalRelation::new(RelationKind::Parent, "Tony Benn")
            .with_description("Father, Labour MP for Chesterfield")
            .with_role("MP")
            .with_party("Labour");

        let value = serde_json::to_value(&relation).unwrap();
        assert_eq!(value["description"], "Father, Labour MP for Chesterfield");
        assert_eq!(value["role"], "MP");
        assert_eq!(value["party"], "Labour");

        let restored: PoliticalRelation = serde_json::from_value(value).unwrap();
        assert_eq!(restored, relation);
    }

    #[test]
    fn test_result_flags_from_relations() {
        let result = ExtractionResult::from_relations(
            "mp-1",
            vec![
                PoliticalRelation::new(RelationKind::Spouse, "A"),
                PoliticalRelation::new(RelationKind::Grandparent, "B"),
            ],
        );

        assert!(result.has_political_relation());
        assert!(result.has_political_ancestor());
        assert!(!result.extraction_failed());
        assert_eq!(result.ancestor_count(), 1);
        assert_eq!(result.relations()[0].relative_name, "A");
    }

    #[test]
    fn test_result_sibling_only_is_not_ancestor() {
        let result = ExtractionResult::from_relations(
            "mp-1",
            vec![PoliticalRelation::new(RelationKind::Sibling, "C")],
        );

        assert!(result.has_political_relation());
        assert!(!result.has_political_ancestor());
    }

    #[test]
    fn test_failed_result_invariant() {
        let result = ExtractionResult::failed("mp-1", "boom");

        assert!(result.extraction_failed());
        assert!(result.relations().is_empty());
        assert!(!result.has_political_ancestor());
        assert!(!result.has_political_relation());
        assert_eq!(result.failure_reason(), Some("boom"));
    }

    #[test]
    fn test_biography_empty() {
        assert!(Biography::empty("x").is_empty());
        assert!(Biography::new("x", "  \n\t").is_empty());
        assert!(!Biography::new("x", "Born in 1970.").is_empty());
    }
}
