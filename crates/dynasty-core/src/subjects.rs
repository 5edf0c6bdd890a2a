//! Subject list loading
//!
//! Reads the list of legislature members from a JSON file and assigns
//! each one a grouping label.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{DynastyError, Result, Subject};

/// Label used for any party that is not one of the major ones
pub const OTHER_GROUP: &str = "Other";

/// One entry of the subject list file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub name: String,
    pub source_ref: String,

    /// Clean grouping label; wins over `raw_party`
    #[serde(default)]
    pub group: Option<String>,

    /// Party name as it appears in the source listing
    #[serde(default)]
    pub raw_party: Option<String>,
}

impl SubjectRecord {
    /// Resolve the grouping label and build the subject
    pub fn into_subject(self) -> Subject {
        let group = match (self.group, self.raw_party) {
            (Some(group), _) => group,
            (None, Some(raw)) => classify_party(&raw).to_string(),
            (None, None) => OTHER_GROUP.to_string(),
        };
        Subject::new(self.name, self.source_ref, group)
    }
}

/// Map a raw party name to one of the report groups
pub fn classify_party(raw_party: &str) -> &'static str {
    let raw = raw_party.to_lowercase();
    if raw.contains("conservative") {
        "Conservative"
    } else if raw.contains("labour") {
        "Labour"
    } else if raw.contains("liberal democrat") {
        "Liberal Democrat"
    } else {
        OTHER_GROUP
    }
}

/// Load subjects from a JSON array file, keeping file order
pub fn load_subjects(path: impl AsRef<Path>) -> Result<Vec<Subject>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        DynastyError::NotFound(format!("subject list {}: {e}", path.display()))
    })?;
    parse_subjects(&content)
}

/// Parse subjects from JSON text
pub fn parse_subjects(content: &str) -> Result<Vec<Subject>> {
    let records: Vec<SubjectRecord> = serde_json::from_str(content)
        .map_err(|e| DynastyError::Config(format!("invalid subject list: {e}")))?;

    let subjects: Vec<Subject> = records
        .into_iter()
        .map(SubjectRecord::into_subject)
        .collect();

    tracing::debug!("Loaded {} subjects", subjects.len());
    Ok(subjects)
}
