//! Biography sources
//!
//! Network fetching and markup stripping happen outside this crate; the
//! sources here read biography text that is already on disk or in memory.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dynasty_core::{Biography, BiographySource, DynastyError, Result, Subject};

/// Reads `<root>/<key>.<extension>` where `key` comes from [`source_key`]
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    extension: String,
}

impl DirectorySource {
    /// Create a source reading `.txt` files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "txt".to_string(),
        }
    }

    /// Use a different file extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Path the biography of `subject` is read from
    pub fn path_for(&self, subject: &Subject) -> Result<PathBuf> {
        let key = source_key(&subject.source_ref)?;
        Ok(self.root.join(format!("{key}.{}", self.extension)))
    }
}

#[async_trait]
impl BiographySource for DirectorySource {
    async fn fetch(&self, subject: &Subject) -> Result<Biography> {
        let path = self.path_for(subject)?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DynastyError::Fetch(format!("{}: {e}", path.display())))?;

        Ok(Biography::new(&subject.source_ref, text))
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// File-name key for a source reference.
///
/// Takes the last non-empty path segment, drops any query or fragment and
/// replaces characters outside `[A-Za-z0-9._-]` with `_`.
pub fn source_key(source_ref: &str) -> Result<String> {
    let without_suffix = source_ref
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default();

    let segment = without_suffix
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    let key: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if key.is_empty() || key.chars().all(|c| c == '.') {
        return Err(DynastyError::Fetch(format!(
            "no usable file key in source reference {source_ref:?}"
        )));
    }
    Ok(key)
}

/// Biographies held in memory, keyed by `source_ref`
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    texts: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a biography
    pub fn with_biography(mut self, source_ref: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(source_ref.into(), text.into());
        self
    }
}

#[async_trait]
impl BiographySource for MemorySource {
    async fn fetch(&self, subject: &Subject) -> Result<Biography> {
        self.texts
            .get(&subject.source_ref)
            .map(|text| Biography::new(&subject.source_ref, text.clone()))
            .ok_or_else(|| DynastyError::Fetch(format!("no biography for {}", subject.source_ref)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
