//! Persisted metadata types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Format version written into every blob; blobs with another value are discarded.
pub const CACHE_VERSION: &str = "1.0";

/// Storage key of a project's blob.
pub fn cache_key(project_id: &str) -> String {
    format!("project-metadata-{project_id}")
}

/// Per-file metadata. Document content is never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub uri: String,
    pub name: String,
    pub language: String,
    /// Milliseconds since the Unix epoch
    pub last_modified: u64,
    pub version: u64,
    #[serde(default)]
    pub symbol_index: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl FileMetadata {
    /// Metadata for a file seen for the first time.
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            name: file_name_of(uri).to_string(),
            language: String::new(),
            last_modified: now_millis(),
            version: 0,
            symbol_index: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// Partial update for [`FileMetadata`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadataPatch {
    pub name: Option<String>,
    pub language: Option<String>,
    pub symbol_index: Option<Vec<String>>,
    pub dependencies: Option<Vec<String>>,
}

impl FileMetadataPatch {
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }

    pub(crate) fn apply_to(self, metadata: &mut FileMetadata) {
        if let Some(name) = self.name {
            metadata.name = name;
        }
        if let Some(language) = self.language {
            metadata.language = language;
        }
        if let Some(symbol_index) = self.symbol_index {
            metadata.symbol_index = symbol_index;
        }
        if let Some(dependencies) = self.dependencies {
            metadata.dependencies = dependencies;
        }
    }
}

/// Everything cached for one project, persisted as one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCache {
    pub project_id: String,
    pub files: BTreeMap<String, FileMetadata>,
    pub cache_version: String,
}

impl ProjectCache {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            files: BTreeMap::new(),
            cache_version: CACHE_VERSION.to_string(),
        }
    }
}

/// Last path segment of a uri, used as the default display name.
pub fn file_name_of(uri: &str) -> &str {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(uri)
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_uses_camel_case_field_names() {
        let mut cache = ProjectCache::new("p1");
        let mut file = FileMetadata::new("file:///src/a.js");
        file.last_modified = 42;
        cache.files.insert(file.uri.clone(), file);

        let json = serde_json::to_value(&cache).unwrap();

        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["cacheVersion"], "1.0");
        let entry = &json["files"]["file:///src/a.js"];
        assert_eq!(entry["name"], "a.js");
        assert_eq!(entry["lastModified"], 42);
        assert!(entry["symbolIndex"].is_array());
    }

    #[test]
    fn patch_leaves_unset_fields_alone() {
        let mut file = FileMetadata::new("file:///a.py");
        file.dependencies = vec!["os".into()];

        FileMetadataPatch::language("python").apply_to(&mut file);

        assert_eq!(file.language, "python");
        assert_eq!(file.dependencies, vec!["os".to_string()]);
    }
}
