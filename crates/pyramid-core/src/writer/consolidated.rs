//! Consolidated store metadata.
//!
//! The aggregated document maps every node path to its metadata so a
//! client can discover the pyramid's structure (groups, shapes, chunk
//! shapes, data types) with a single read instead of one read per node.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{PyramidError, Result};

/// Store key of the aggregated metadata document.
pub const CONSOLIDATED_KEY: &str = ".zmetadata";

/// Zarr V3 node metadata file name.
const NODE_METADATA_FILE: &str = "zarr.json";

/// Write the consolidated metadata document for the store at `root`.
///
/// Collects every node metadata file under the root into
/// `{"zarr_consolidated_format": 1, "metadata": {path: document}}`.
pub fn write_consolidated(root: &Path) -> Result<()> {
    let metadata = collect_node_metadata(root)?;

    let mut map = serde_json::Map::new();
    for (key, doc) in metadata {
        map.insert(key, doc);
    }

    let document = serde_json::json!({
        "zarr_consolidated_format": 1,
        "metadata": map,
    });

    std::fs::write(
        root.join(CONSOLIDATED_KEY),
        serde_json::to_vec_pretty(&document)?,
    )?;

    Ok(())
}

/// Walk the store directory collecting node metadata documents keyed by
/// store-relative path.
fn collect_node_metadata(root: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut metadata = BTreeMap::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| PyramidError::persist(e.to_string()))?;
        if !entry.file_type().is_file() || entry.file_name() != NODE_METADATA_FILE {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| PyramidError::persist(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");

        let document: serde_json::Value = serde_json::from_slice(&std::fs::read(entry.path())?)?;
        metadata.insert(relative, document);
    }

    if metadata.is_empty() {
        return Err(PyramidError::persist(format!(
            "no node metadata found under {}",
            root.display()
        )));
    }

    Ok(metadata)
}

/// Structural summary of one array in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySummary {
    pub name: String,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub data_type: String,
    pub dimension_names: Option<Vec<String>>,
}

/// Structural summary of one level group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub name: String,
    pub arrays: Vec<ArraySummary>,
}

/// Structural summary of a pyramid store, as discovered from its
/// aggregated metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub groups: Vec<GroupSummary>,
}

impl StoreSummary {
    /// Read the store structure from the consolidated document, falling
    /// back to a directory walk when the store was written without one.
    pub fn read(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let consolidated = root.join(CONSOLIDATED_KEY);

        let metadata = if consolidated.is_file() {
            let document: serde_json::Value =
                serde_json::from_slice(&std::fs::read(&consolidated)?)?;
            let map = document
                .get("metadata")
                .and_then(|m| m.as_object())
                .ok_or_else(|| {
                    PyramidError::invalid_metadata("consolidated document has no metadata map")
                })?;
            map.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        } else {
            collect_node_metadata(root)?
        };

        Self::from_metadata_map(&metadata)
    }

    /// Build the summary from a node-path → metadata map.
    fn from_metadata_map(metadata: &BTreeMap<String, serde_json::Value>) -> Result<Self> {
        let mut groups: BTreeMap<String, GroupSummary> = BTreeMap::new();

        for (key, document) in metadata {
            let parts: Vec<&str> = key.split('/').collect();
            let node_type = document.get("node_type").and_then(|v| v.as_str());

            match (parts.as_slice(), node_type) {
                ([_root_meta], _) => {}
                ([group, _meta], Some("group")) => {
                    groups.entry(group.to_string()).or_insert_with(|| GroupSummary {
                        name: group.to_string(),
                        arrays: Vec::new(),
                    });
                }
                ([group, array, _meta], Some("array")) => {
                    let summary = parse_array_summary(array, document)?;
                    groups
                        .entry(group.to_string())
                        .or_insert_with(|| GroupSummary {
                            name: group.to_string(),
                            arrays: Vec::new(),
                        })
                        .arrays
                        .push(summary);
                }
                _ => {}
            }
        }

        let mut groups: Vec<GroupSummary> = groups.into_values().collect();
        // Level groups are numeric; order finest to coarsest.
        groups.sort_by_key(|g| g.name.parse::<u64>().unwrap_or(u64::MAX));
        for group in &mut groups {
            group.arrays.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(Self { groups })
    }

    /// Names of the level groups, finest first.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&GroupSummary> {
        self.groups.iter().find(|g| g.name == name)
    }
}

impl GroupSummary {
    /// Look up an array by name.
    pub fn array(&self, name: &str) -> Option<&ArraySummary> {
        self.arrays.iter().find(|a| a.name == name)
    }
}

/// Parse shape/chunking/dtype out of a V3 array metadata document.
fn parse_array_summary(name: &str, document: &serde_json::Value) -> Result<ArraySummary> {
    let shape: Vec<u64> = document
        .get("shape")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or_else(|| {
            PyramidError::invalid_metadata(format!("array '{}' metadata has no shape", name))
        })?;

    let chunk_shape: Vec<u64> = document
        .pointer("/chunk_grid/configuration/chunk_shape")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or_else(|| {
            PyramidError::invalid_metadata(format!(
                "array '{}' metadata has no chunk shape",
                name
            ))
        })?;

    let data_type = match document.get("data_type") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => {
            return Err(PyramidError::invalid_metadata(format!(
                "array '{}' metadata has no data type",
                name
            )))
        }
    };

    let dimension_names = document
        .get("dimension_names")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    Ok(ArraySummary {
        name: name.to_string(),
        shape,
        chunk_shape,
        data_type,
        dimension_names,
    })
}
