//! Import resolution across package files
//!
//! An import names an object living in another package. The candidate file
//! comes from the import's outermost ancestor (`Engine.StaticMeshActor`
//! lives in `Engine.pcc`), followed by the configured global packages.
//! Opened packages are kept in a [`PackageCache`] shared by every lookup of
//! a batch.

mod archive;
mod batch;

pub use archive::{ArchiveSource, DirectorySource, MemoryArchive};
pub use batch::{resolve_imports_batch, resolve_imports_in_background, BatchReport, ImportResolution};

use crate::config::EngineConfig;
use crate::entries::EntryRef;
use crate::package::Package;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Read-only cache of packages opened for resolution, keyed by lowercase
/// file name.
///
/// Nothing in here is ever mutated. Invalidate an entry before saving or
/// reloading the file behind it. Files that failed to open are remembered
/// and not parsed again until invalidated.
pub struct PackageCache {
    config: Arc<EngineConfig>,
    sources: Vec<Arc<dyn ArchiveSource>>,
    packages: RwLock<HashMap<String, Arc<Package>>>,
    unreadable: RwLock<HashMap<String, String>>,
}

impl fmt::Debug for PackageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageCache")
            .field("sources", &self.sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .field("packages", &self.len())
            .field("unreadable", &self.unreadable.read().len())
            .finish()
    }
}

impl PackageCache {
    /// A cache searching every directory in `config.search_paths`
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let sources = config
            .search_paths
            .iter()
            .map(|p| Arc::new(DirectorySource::new(p.clone())) as Arc<dyn ArchiveSource>)
            .collect();
        Self { config, sources, packages: RwLock::new(HashMap::new()), unreadable: RwLock::new(HashMap::new()) }
    }

    /// Search `source` after the existing ones
    pub fn with_source(mut self, source: Arc<dyn ArchiveSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Configuration used to open packages and list candidates
    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// Return the cached package for `file_name`, opening it from the first
    /// source that has it. `None` when no source does.
    ///
    /// A file that fails to open is recorded; later calls fail with the
    /// same reason without reading it again.
    pub fn get_or_open(&self, file_name: &str) -> Result<Option<Arc<Package>>> {
        let key = file_name.to_lowercase();
        if let Some(package) = self.packages.read().get(&key) {
            trace!(file = file_name, "package cache hit");
            return Ok(Some(Arc::clone(package)));
        }
        if let Some(reason) = self.unreadable.read().get(&key) {
            return Err(Error::StructuralCorruption { reason: reason.clone() });
        }

        let Some(source) = self.sources.iter().find(|s| s.contains(file_name)) else {
            return Ok(None);
        };
        debug!(file = file_name, source = source.name(), "opening package for resolution");
        let opened = source
            .decompress(file_name)
            .and_then(|stream| Package::from_reader(stream, Arc::clone(&self.config)));
        let mut package = match opened {
            Ok(package) => package,
            Err(e) => {
                self.unreadable.write().insert(key, format!("{} is unreadable: {}", file_name, e));
                return Err(e);
            }
        };
        package.set_file_path(Some(PathBuf::from(file_name)));

        let mut packages = self.packages.write();
        let package = packages.entry(key).or_insert_with(|| Arc::new(package));
        Ok(Some(Arc::clone(package)))
    }

    /// Put an already loaded package in the cache
    pub fn insert(&self, file_name: &str, package: Arc<Package>) {
        self.packages.write().insert(file_name.to_lowercase(), package);
    }

    /// Drop one cached package, or the record of it being unreadable.
    /// Returns whether anything was cached.
    pub fn invalidate(&self, file_name: &str) -> bool {
        let key = file_name.to_lowercase();
        let failed = self.unreadable.write().remove(&key).is_some();
        self.packages.write().remove(&key).is_some() || failed
    }

    /// Whether opening `file_name` failed before
    pub fn is_unreadable(&self, file_name: &str) -> bool {
        self.unreadable.read().contains_key(&file_name.to_lowercase())
    }

    /// Forget every package and every recorded failure
    pub fn clear(&self) {
        self.packages.write().clear();
        self.unreadable.write().clear();
    }

    /// Packages currently cached
    pub fn len(&self) -> usize {
        self.packages.read().len()
    }

    /// Whether no package is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The export backing an import
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    /// Package holding the export
    pub package: Arc<Package>,
    /// File that package came from
    pub file_name: String,
    /// The export, in `package`
    pub export: EntryRef,
}

/// Find the export `import` refers to. `Ok(None)` when no candidate package
/// has it.
pub fn resolve_import(pkg: &Package, import: EntryRef, cache: &PackageCache) -> Result<Option<ResolvedImport>> {
    if pkg.get_import(import).is_none() {
        return Err(Error::EntryNotFound(import));
    }
    let full_path = pkg.instanced_full_path(import);
    let root_name = pkg
        .object_name_of(pkg.root_ancestor(import))
        .map(|n| pkg.name_str(n).to_string())
        .unwrap_or_default();
    let own_file = pkg.file_name().map(|f| f.to_lowercase());

    let mut candidates = vec![(root_name.clone(), true)];
    candidates.extend(
        cache
            .config()
            .global_packages
            .iter()
            .filter(|g| !g.eq_ignore_ascii_case(&root_name))
            .map(|g| (g.clone(), false)),
    );

    for (package_name, from_root) in candidates {
        for file_name in cache.config().candidate_files(&package_name) {
            if own_file.as_deref() == Some(file_name.to_lowercase().as_str()) {
                continue;
            }
            if cache.is_unreadable(&file_name) {
                trace!(file = %file_name, "skipping unreadable package");
                continue;
            }
            let source = match cache.get_or_open(&file_name) {
                Ok(Some(source)) => source,
                Ok(None) => continue,
                Err(e) => {
                    warn!(import = %import, file = %file_name, error = %e, "candidate package could not be opened");
                    continue;
                }
            };

            // inside its own file, a package's objects sit at the top level
            let mut paths = vec![full_path.clone()];
            if from_root {
                if let Some((_, inner)) = full_path.split_once('.') {
                    paths.push(inner.to_string());
                }
            }
            for path in &paths {
                if let Some(export) = source.find_export(path) {
                    debug!(import = %import, file = %file_name, export = %export, "resolved import");
                    return Ok(Some(ResolvedImport { package: source, file_name, export }));
                }
            }
        }
    }

    debug!(import = %import, path = %full_path, "import not resolved");
    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fixtures;
    use crate::package::SaveOptions;

    /// `Engine.pcc` with class `StaticMeshActor` and `EngineMeshes.pcc`
    /// with mesh `Cube`, both as raw package bytes
    pub(crate) fn source_packages() -> Vec<(&'static str, Vec<u8>)> {
        let mut engine = Package::new("Engine");
        engine.find_or_add_name("None");
        fixtures::add_export(&mut engine, "StaticMeshActor", 0, EntryRef::Root, EntryRef::Root, vec![]);
        fixtures::add_export(&mut engine, "Level", 0, EntryRef::Root, EntryRef::Root, vec![]);

        let mut meshes = Package::new("EngineMeshes");
        meshes.find_or_add_name("None");
        let class = meshes.find_or_add_class_import("Engine", "StaticMesh").unwrap();
        fixtures::add_export(&mut meshes, "Cube", 0, EntryRef::Root, class, vec![]);

        vec![
            ("Engine.pcc", engine.to_bytes(SaveOptions::default()).unwrap()),
            ("EngineMeshes.pcc", meshes.to_bytes(SaveOptions::default()).unwrap()),
        ]
    }

    #[test]
    fn test_resolve_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        for (name, bytes) in source_packages() {
            std::fs::write(dir.path().join(name), bytes).unwrap();
        }
        let config = EngineConfig { search_paths: vec![dir.path().to_path_buf()], ..EngineConfig::default() };
        let cache = PackageCache::new(Arc::new(config));

        let pkg = fixtures::sample_package();
        let actor_class = pkg.find_entry("Engine.StaticMeshActor").unwrap();
        let resolved = resolve_import(&pkg, actor_class, &cache).unwrap().unwrap();
        assert_eq!(resolved.file_name, "Engine.pcc");
        assert_eq!(resolved.package.instanced_full_path(resolved.export), "StaticMeshActor");

        let cube = pkg.find_entry("EngineMeshes.Cube").unwrap();
        assert!(resolve_import(&pkg, cube, &cache).unwrap().is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_resolve_from_archive_and_miss() {
        let archive = MemoryArchive::new("DLC");
        for (name, bytes) in source_packages() {
            archive.insert(name, &bytes).unwrap();
        }
        let cache = PackageCache::new(Arc::new(EngineConfig::default())).with_source(Arc::new(archive));

        let pkg = fixtures::sample_package();
        let cube = pkg.find_entry("EngineMeshes.Cube").unwrap();
        let resolved = resolve_import(&pkg, cube, &cache).unwrap().unwrap();
        assert_eq!(resolved.file_name, "EngineMeshes.pcc");

        // Core.pcc is nowhere: a normal miss
        let object = pkg.find_entry("Core.Object").unwrap();
        assert!(resolve_import(&pkg, object, &cache).unwrap().is_none());

        let world = pkg.find_export("TheWorld").unwrap();
        assert!(matches!(resolve_import(&pkg, world, &cache), Err(Error::EntryNotFound(_))));
    }

    #[test]
    fn test_unreadable_candidate_falls_through_to_globals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Engine.pcc"), b"not a package at all").unwrap();

        let mut startup = Package::new("Startup");
        startup.find_or_add_name("None");
        let engine = fixtures::add_export(&mut startup, "Engine", 0, EntryRef::Root, EntryRef::Root, vec![]);
        fixtures::add_export(&mut startup, "StaticMeshActor", 0, engine, EntryRef::Root, vec![]);
        std::fs::write(dir.path().join("Startup.pcc"), startup.to_bytes(SaveOptions::default()).unwrap()).unwrap();

        let config = EngineConfig { search_paths: vec![dir.path().to_path_buf()], ..EngineConfig::default() };
        let cache = PackageCache::new(Arc::new(config));
        let pkg = fixtures::sample_package();
        let actor_class = pkg.find_entry("Engine.StaticMeshActor").unwrap();

        let resolved = resolve_import(&pkg, actor_class, &cache).unwrap().unwrap();
        assert_eq!(resolved.file_name, "Startup.pcc");
        assert!(cache.is_unreadable("ENGINE.pcc"));
        assert!(matches!(cache.get_or_open("Engine.pcc"), Err(Error::StructuralCorruption { .. })));

        // resolving again skips the broken file without reopening it
        let again = resolve_import(&pkg, actor_class, &cache).unwrap().unwrap();
        assert_eq!(again.file_name, "Startup.pcc");
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate("Engine.pcc"));
        assert!(!cache.is_unreadable("Engine.pcc"));
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = PackageCache::new(Arc::new(EngineConfig::default()));
        cache.insert("Scenario.pcc", Arc::new(fixtures::scenario_package()));
        assert!(cache.get_or_open("SCENARIO.pcc").unwrap().is_some());
        assert!(cache.invalidate("scenario.pcc"));
        assert!(cache.get_or_open("Scenario.pcc").unwrap().is_none());
        assert!(cache.is_empty());
    }
}
