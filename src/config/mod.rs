//! Engine configuration
//!
//! Loaded from JSON. Every field has a default so a partial file (or none at
//! all) is fine.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Element layout used to walk `ArrayProperty` payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayElementKind {
    /// Object references (UIndex)
    Object,
    /// Name references
    Name,
    /// Plain 32-bit integers
    Int,
    /// Tagged property lists, one per element
    Struct,
}

/// Settings shared by loading, resolution and porting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories searched when resolving imports
    pub search_paths: Vec<PathBuf>,

    /// File extensions tried for each candidate package name
    pub package_extensions: Vec<String>,

    /// Packages searched after the import's own root package
    pub global_packages: Vec<String>,

    /// Name of the quarantine root created by the pruner
    pub trash_package_name: String,

    /// Struct types serialized as raw binary instead of tagged properties
    pub immutable_structs: Vec<String>,

    /// Property name to array element layout
    pub array_hints: HashMap<String, ArrayElementKind>,

    /// Recreate missing import chains in the destination while porting
    pub port_missing_imports: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            package_extensions: ["pcc", "upk", "sfm", "u"].map(String::from).to_vec(),
            global_packages: ["Core", "Engine", "SFXGame", "Startup"].map(String::from).to_vec(),
            trash_package_name: "ME3ExplorerTrashPackage".to_string(),
            immutable_structs: [
                "Vector", "Vector2D", "Vector4", "Rotator", "Color", "LinearColor", "Guid",
                "Box", "Plane", "Quat", "Matrix", "IntPoint", "Sphere", "TwoVectors",
            ]
            .map(String::from)
            .to_vec(),
            array_hints: HashMap::new(),
            port_missing_imports: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Pretty JSON for writing back to disk
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether `struct_name` is stored as raw binary (case-insensitive)
    pub fn is_immutable_struct(&self, struct_name: &str) -> bool {
        self.immutable_structs
            .iter()
            .any(|s| s.eq_ignore_ascii_case(struct_name))
    }

    /// Element layout for the array property `property`, exact match first
    pub fn array_hint(&self, property: &str) -> Option<ArrayElementKind> {
        self.array_hints.get(property).copied().or_else(|| {
            self.array_hints
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(property))
                .map(|(_, v)| *v)
        })
    }

    /// Candidate file names for a package, one per configured extension
    pub fn candidate_files(&self, package_name: &str) -> Vec<String> {
        self.package_extensions
            .iter()
            .map(|ext| format!("{}.{}", package_name, ext.trim_start_matches('.')))
            .collect()
    }
}
