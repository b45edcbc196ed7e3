//! Catalog definitions as static JSON configuration.
//!
//! A definition file holds either one catalog object or an array of them.
//! A directory is read in file-name order, taking every `*.json` entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use super::{Catalog, CatalogIntegrityError};
use crate::types::{DatasetId, DependencyEdge, Variable};

/// Serializable form of a [`Catalog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDefinition {
    /// Dataset identifier.
    pub id: DatasetId,
    /// Dataset display name.
    #[serde(default)]
    pub name: String,
    /// Variables in declaration order.
    #[serde(default)]
    pub variables: Vec<Variable>,
    /// "Requires" edges in declaration order.
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
}

impl CatalogDefinition {
    /// Validate the definition into an immutable catalog.
    pub fn into_catalog(self) -> Result<Catalog, CatalogIntegrityError> {
        Catalog::new(self.id, self.name, self.variables, self.edges)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many(Vec<CatalogDefinition>),
    One(CatalogDefinition),
}

/// Errors raised while reading catalog definitions.
#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    /// File or directory could not be read.
    #[error("Failed to read catalog source {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// File is not a valid catalog definition.
    #[error("Failed to parse catalog file {path}: {source}")]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Definition parsed but is not a consistent catalog.
    #[error("Catalog integrity error: {0}")]
    Integrity(#[from] CatalogIntegrityError),
}

/// All loaded catalogs, keyed by dataset.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct CatalogSet {
    catalogs: BTreeMap<DatasetId, Arc<Catalog>>,
}

impl CatalogSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog, rejecting a second catalog for the same dataset.
    pub fn insert(&mut self, catalog: Catalog) -> Result<(), CatalogIntegrityError> {
        if self.catalogs.contains_key(catalog.id()) {
            return Err(CatalogIntegrityError::DuplicateDataset {
                dataset: catalog.id().clone(),
            });
        }
        self.catalogs.insert(catalog.id().clone(), Arc::new(catalog));
        Ok(())
    }

    /// Validate a batch of definitions. Fails on the first bad one.
    pub fn from_definitions<I>(definitions: I) -> Result<Self, CatalogIntegrityError>
    where
        I: IntoIterator<Item = CatalogDefinition>,
    {
        let mut set = Self::new();
        for definition in definitions {
            set.insert(definition.into_catalog()?)?;
        }
        Ok(set)
    }

    /// Parse definitions from a JSON string (one object or an array).
    pub fn from_json_str(json: &str) -> Result<Self, CatalogLoadError> {
        let file: DefinitionFile = serde_json::from_str(json).map_err(|source| CatalogLoadError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Ok(Self::from_definitions(file.into_vec())?)
    }

    /// Load definitions from a file or a directory of `*.json` files.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, CatalogLoadError> {
        let path = path.as_ref();
        let io_err = |source| CatalogLoadError::Io { path: path.to_path_buf(), source };

        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(io_err)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut definitions = Vec::new();
        for file in files {
            let text = std::fs::read_to_string(&file).map_err(|source| CatalogLoadError::Io {
                path: file.clone(),
                source,
            })?;
            let parsed: DefinitionFile = serde_json::from_str(&text).map_err(|source| CatalogLoadError::Parse {
                path: file.clone(),
                source,
            })?;
            tracing::debug!(path = %file.display(), "Parsed catalog definition file");
            definitions.extend(parsed.into_vec());
        }

        let set = Self::from_definitions(definitions)?;
        tracing::info!(
            path = %path.display(),
            dataset_count = set.len(),
            "Loaded catalog definitions"
        );
        Ok(set)
    }

    /// Catalog for a dataset.
    pub fn get(&self, dataset_id: &DatasetId) -> Option<&Arc<Catalog>> {
        self.catalogs.get(dataset_id)
    }

    /// All catalogs in dataset order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Catalog>> {
        self.catalogs.values()
    }

    /// Number of catalogs.
    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    /// True if no catalog is loaded.
    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

impl DefinitionFile {
    fn into_vec(self) -> Vec<CatalogDefinition> {
        match self {
            Self::Many(v) => v,
            Self::One(d) => vec![d],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: &str = r#"[
        {"id": "A", "name": "a", "variables": [{"id": "x", "name": "/x"}], "edges": []},
        {"id": "B", "name": "b", "variables": [
            {"id": "x", "name": "/x", "data_type": "int"},
            {"id": "y", "name": "/y", "data_type": "int"}
        ], "edges": [{"origin": "x", "destination": "y", "kind": "dimension"}]}
    ]"#;

    #[test]
    fn test_parse_array_of_definitions() {
        let set = CatalogSet::from_json_str(TWO).unwrap();
        assert_eq!(set.len(), 2);
        let b = set.get(&DatasetId::new("B")).unwrap();
        assert_eq!(b.edges()[0].kind, crate::types::RequirementKind::Dimension);
    }

    #[test]
    fn test_parse_single_definition() {
        let set = CatalogSet::from_json_str(r#"{"id": "solo", "variables": []}"#).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_same_variable_id_in_two_datasets_is_allowed() {
        let set = CatalogSet::from_json_str(TWO).unwrap();
        let x = crate::types::VariableId::new("x");
        assert!(set.get(&DatasetId::new("A")).unwrap().contains(&x));
        assert!(set.get(&DatasetId::new("B")).unwrap().contains(&x));
    }

    #[test]
    fn test_duplicate_dataset_rejected() {
        let json = r#"[{"id": "A"}, {"id": "A"}]"#;
        let err = CatalogSet::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            CatalogLoadError::Integrity(CatalogIntegrityError::DuplicateDataset { .. })
        ));
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(
            CatalogSet::from_json_str("{not json"),
            Err(CatalogLoadError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_directory() {
        let dir = std::env::temp_dir().join(format!("vdk_catalogs_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.json"), r#"{"id": "A"}"#).unwrap();
        std::fs::write(dir.join("b.json"), r#"[{"id": "B"}, {"id": "C"}]"#).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let set = CatalogSet::load_path(&dir).unwrap();
        assert_eq!(set.len(), 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_path_is_io_error() {
        let err = CatalogSet::load_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, CatalogLoadError::Io { .. }));
    }
}
