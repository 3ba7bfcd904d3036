//! In-memory package
//!
//! Exports and imports are stored in two arenas addressed by slot, so a
//! reference stays valid for the whole session no matter how entries are
//! reparented. Entries are only ever appended.

mod serialize;

pub use serialize::SaveOptions;

use crate::changes::{ChangeLog, PackageChange, PackageObserver, PackageUpdate};
use crate::config::EngineConfig;
use crate::entries::{instanced, Entry, EntryRef, ExportEntry, ImportEntry, ObjectName};
use crate::format::{corrupt, PackageHeader};
use crate::names::NameTable;
use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One package: header, name table, both entry tables and the observers
/// listening to them
pub struct Package {
    header: PackageHeader,
    names: NameTable,
    imports: Vec<ImportEntry>,
    exports: Vec<ExportEntry>,
    depends: Vec<i32>,
    file_path: Option<PathBuf>,
    config: Arc<EngineConfig>,
    changes: ChangeLog,
    observers: Vec<Arc<dyn PackageObserver>>,
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("file_path", &self.file_path)
            .field("names", &self.names.len())
            .field("exports", &self.exports.len())
            .field("imports", &self.imports.len())
            .finish_non_exhaustive()
    }
}

impl Package {
    /// Create an empty package
    pub fn new(folder_name: &str) -> Self {
        Self {
            header: PackageHeader { folder_name: folder_name.to_string(), ..PackageHeader::default() },
            names: NameTable::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            depends: Vec::new(),
            file_path: None,
            config: Arc::new(EngineConfig::default()),
            changes: ChangeLog::default(),
            observers: Vec::new(),
        }
    }

    /// Use `config` instead of the defaults
    pub fn with_config(mut self, config: Arc<EngineConfig>) -> Self {
        self.config = config;
        self
    }

    /// Configuration this package was opened with
    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// File header as last read or written
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    /// Header fields a save does not regenerate can be edited here
    pub fn header_mut(&mut self) -> &mut PackageHeader {
        &mut self.header
    }

    /// Path the package was loaded from or last saved to
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// File name without directories, if the package came from disk
    pub fn file_name(&self) -> Option<String> {
        self.file_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    pub(crate) fn set_file_path(&mut self, path: Option<PathBuf>) {
        self.file_path = path;
    }

    // ---- names ---------------------------------------------------------

    /// The name table
    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Name table slot `index`
    pub fn name(&self, index: usize) -> Result<&str> {
        self.names.get(index)
    }

    /// Look a name up, appending it when missing. The change is delivered
    /// with the next commit.
    pub fn find_or_add_name(&mut self, name: &str) -> usize {
        let (index, added) = self.names.find_or_add(name);
        if added {
            self.changes.record(PackageUpdate::name(PackageChange::NameAdded, index));
        }
        index
    }

    /// Edit a name in place and notify observers
    pub fn replace_name(&mut self, index: usize, name: &str) -> Result<()> {
        self.names.replace(index, name)?;
        self.changes.record(PackageUpdate::name(PackageChange::NameEdited, index));
        self.commit_changes();
        Ok(())
    }

    /// Plain name of an object name, without instance suffix
    pub fn name_str(&self, name: ObjectName) -> &str {
        self.names.get(name.name).unwrap_or("")
    }

    /// Name with its `_N` instance suffix
    pub fn instanced_string(&self, name: ObjectName) -> String {
        instanced(self.name_str(name), name.number)
    }

    // ---- entries -------------------------------------------------------

    /// Export table in slot order
    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    /// Import table in slot order
    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    /// Export slots, trashed ones included
    pub fn export_count(&self) -> usize {
        self.exports.len()
    }

    /// Import slots, trashed ones included
    pub fn import_count(&self) -> usize {
        self.imports.len()
    }

    /// Export plus import slots
    pub fn entry_count(&self) -> usize {
        self.exports.len() + self.imports.len()
    }

    /// Every entry reference, exports first
    pub fn entry_refs(&self) -> impl Iterator<Item = EntryRef> + '_ {
        (0..self.exports.len())
            .map(EntryRef::Export)
            .chain((0..self.imports.len()).map(EntryRef::Import))
    }

    /// Whether `r` names the root or an existing entry
    pub fn contains(&self, r: EntryRef) -> bool {
        match r {
            EntryRef::Root => true,
            EntryRef::Export(i) => i < self.exports.len(),
            EntryRef::Import(i) => i < self.imports.len(),
        }
    }

    /// Either kind of entry; `None` for the root or a missing slot
    pub fn get_entry(&self, r: EntryRef) -> Option<Entry<'_>> {
        match r {
            EntryRef::Root => None,
            EntryRef::Export(i) => self.exports.get(i).map(|e| Entry::export(r, e)),
            EntryRef::Import(i) => self.imports.get(i).map(|e| Entry::import(r, e)),
        }
    }

    /// Export behind `r`, if `r` is an existing export
    pub fn get_export(&self, r: EntryRef) -> Option<&ExportEntry> {
        match r {
            EntryRef::Export(i) => self.exports.get(i),
            _ => None,
        }
    }

    /// Import behind `r`, if `r` is an existing import
    pub fn get_import(&self, r: EntryRef) -> Option<&ImportEntry> {
        match r {
            EntryRef::Import(i) => self.imports.get(i),
            _ => None,
        }
    }

    /// Parent link of an entry
    pub fn link_of(&self, r: EntryRef) -> Option<EntryRef> {
        self.get_entry(r).map(|e| e.link())
    }

    /// Name and IndexValue of an entry
    pub fn object_name_of(&self, r: EntryRef) -> Option<ObjectName> {
        self.get_entry(r).map(|e| e.object_name())
    }

    /// Mutable export header; records a header change
    pub fn export_mut(&mut self, r: EntryRef) -> Result<&mut ExportEntry> {
        let EntryRef::Export(i) = r else {
            return Err(Error::EntryNotFound(r));
        };
        if i >= self.exports.len() {
            return Err(Error::EntryNotFound(r));
        }
        self.changes.record(PackageUpdate::entry(PackageChange::HeaderChanged, r));
        Ok(&mut self.exports[i])
    }

    /// Mutable import record; records a header change
    pub fn import_mut(&mut self, r: EntryRef) -> Result<&mut ImportEntry> {
        let EntryRef::Import(i) = r else {
            return Err(Error::EntryNotFound(r));
        };
        if i >= self.imports.len() {
            return Err(Error::EntryNotFound(r));
        }
        self.changes.record(PackageUpdate::entry(PackageChange::HeaderChanged, r));
        Ok(&mut self.imports[i])
    }

    /// Change an entry's parent link, whatever its kind. Moving an entry
    /// under itself or one of its descendants is rejected.
    pub fn set_link(&mut self, r: EntryRef, link: EntryRef) -> Result<()> {
        if !self.contains(link) {
            return Err(Error::EntryNotFound(link));
        }
        if !r.is_root() && self.ancestors(link).contains(&r) {
            return Err(Error::InvalidOperation(format!("moving {} under {} would form a cycle", r, link)));
        }
        match r {
            EntryRef::Export(_) => self.export_mut(r)?.link = link,
            EntryRef::Import(_) => self.import_mut(r)?.link = link,
            EntryRef::Root => return Err(Error::InvalidOperation("the root has no parent".into())),
        }
        Ok(())
    }

    /// Change an entry's object name, whatever its kind
    pub fn set_object_name(&mut self, r: EntryRef, name: ObjectName) -> Result<()> {
        match r {
            EntryRef::Export(_) => self.export_mut(r)?.object_name = name,
            EntryRef::Import(_) => self.import_mut(r)?.object_name = name,
            EntryRef::Root => return Err(Error::InvalidOperation("the root cannot be renamed".into())),
        }
        Ok(())
    }

    /// Replace an export payload
    pub fn set_export_data(&mut self, r: EntryRef, data: Vec<u8>) -> Result<()> {
        let EntryRef::Export(i) = r else {
            return Err(Error::EntryNotFound(r));
        };
        let export = self.exports.get_mut(i).ok_or(Error::EntryNotFound(r))?;
        export.data = data;
        self.changes.record(PackageUpdate::entry(PackageChange::DataChanged, r));
        Ok(())
    }

    fn check_name(&self, name: ObjectName) -> Result<()> {
        self.names.get(name.name).map(|_| ())
    }

    fn check_ref(&self, r: EntryRef) -> Result<()> {
        if self.contains(r) {
            Ok(())
        } else {
            Err(Error::EntryNotFound(r))
        }
    }

    /// Append an export; the new slot is the next UIndex
    pub fn add_export(&mut self, export: ExportEntry) -> Result<EntryRef> {
        self.check_name(export.object_name)?;
        self.check_ref(export.link)?;
        let r = EntryRef::Export(self.exports.len());
        self.exports.push(export);
        self.depends.push(0);
        self.changes.record(PackageUpdate::entry(PackageChange::EntryAdded, r));
        debug!(entry = %r, "export added");
        Ok(r)
    }

    /// Append an import; the new slot is the next negative UIndex
    pub fn add_import(&mut self, import: ImportEntry) -> Result<EntryRef> {
        self.check_name(import.object_name)?;
        self.check_name(import.class_name)?;
        self.check_name(import.class_package)?;
        self.check_ref(import.link)?;
        let r = EntryRef::Import(self.imports.len());
        self.imports.push(import);
        self.changes.record(PackageUpdate::entry(PackageChange::EntryAdded, r));
        debug!(entry = %r, "import added");
        Ok(r)
    }

    // ---- paths ---------------------------------------------------------

    /// Chain from `r` up to (not including) the root
    pub fn ancestors(&self, r: EntryRef) -> Vec<EntryRef> {
        let mut chain = Vec::new();
        let mut current = r;
        let limit = self.entry_count() + 1;
        while !current.is_root() && chain.len() <= limit {
            let Some(link) = self.link_of(current) else { break };
            chain.push(current);
            current = link;
        }
        chain
    }

    /// Top-most ancestor below the root; `r` itself for root-level entries
    pub fn root_ancestor(&self, r: EntryRef) -> EntryRef {
        self.ancestors(r).last().copied().unwrap_or(EntryRef::Root)
    }

    /// Name of `r` with its instance suffix, e.g. `StaticMeshActor_0`
    pub fn instanced_name(&self, r: EntryRef) -> String {
        self.object_name_of(r)
            .map(|n| self.instanced_string(n))
            .unwrap_or_default()
    }

    /// Dot-joined instanced names from the root down to `r`
    pub fn instanced_full_path(&self, r: EntryRef) -> String {
        let chain = self.ancestors(r);
        chain
            .iter()
            .rev()
            .map(|a| self.instanced_name(*a))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Path of the parent; empty at package root
    pub fn parent_instanced_full_path(&self, r: EntryRef) -> String {
        match self.link_of(r) {
            Some(link) if !link.is_root() => self.instanced_full_path(link),
            _ => String::new(),
        }
    }

    /// The quarantine root, once the pruner has created it
    pub fn trash_root(&self) -> Option<EntryRef> {
        let trash_name = self.config.trash_package_name.as_str();
        self.exports
            .iter()
            .position(|e| e.link.is_root() && self.name_str(e.object_name) == trash_name)
            .map(EntryRef::Export)
    }

    /// Whether `r` is the trash root or sits beneath it
    pub fn is_trashed(&self, r: EntryRef) -> bool {
        match self.trash_root() {
            Some(trash) => self.ancestors(r).contains(&trash),
            None => false,
        }
    }

    /// Find a live entry by instanced full path (case-insensitive); exports
    /// are searched before imports
    pub fn find_entry(&self, path: &str) -> Option<EntryRef> {
        self.entry_refs()
            .find(|r| self.instanced_full_path(*r).eq_ignore_ascii_case(path) && !self.is_trashed(*r))
    }

    /// Like [`Package::find_entry`], exports only
    pub fn find_export(&self, path: &str) -> Option<EntryRef> {
        (0..self.exports.len())
            .map(EntryRef::Export)
            .find(|r| self.instanced_full_path(*r).eq_ignore_ascii_case(path) && !self.is_trashed(*r))
    }

    /// Direct children in table order, exports first
    pub fn children_of(&self, parent: EntryRef) -> Vec<EntryRef> {
        self.entry_refs()
            .filter(|r| self.link_of(*r) == Some(parent))
            .collect()
    }

    /// First IndexValue above every sibling sharing `name` under `parent`
    pub fn next_index_for(&self, parent: EntryRef, name: &str) -> i32 {
        self.children_of(parent)
            .into_iter()
            .filter_map(|r| self.object_name_of(r))
            .filter(|n| self.name_str(*n).eq_ignore_ascii_case(name))
            .map(|n| n.number)
            .max()
            .map_or(1, |max| max.max(0) + 1)
    }

    /// Find the import `package.class` (e.g. `Core.Package`), creating the
    /// two import records when they are missing
    pub fn find_or_add_class_import(&mut self, package: &str, class: &str) -> Result<EntryRef> {
        let path = format!("{}.{}", package, class);
        if let Some(r @ EntryRef::Import(_)) = self.find_entry(&path) {
            return Ok(r);
        }

        let core = self.find_or_add_name("Core");
        let package_class = self.find_or_add_name("Package");
        let class_class = self.find_or_add_name("Class");

        let package_ref = match self.find_entry(package) {
            Some(r @ EntryRef::Import(_)) => r,
            _ => {
                let name = self.find_or_add_name(package);
                self.add_import(ImportEntry {
                    class_package: ObjectName::new(core, 0),
                    class_name: ObjectName::new(package_class, 0),
                    link: EntryRef::Root,
                    object_name: ObjectName::new(name, 0),
                })?
            }
        };

        let name = self.find_or_add_name(class);
        self.add_import(ImportEntry {
            class_package: ObjectName::new(core, 0),
            class_name: ObjectName::new(class_class, 0),
            link: package_ref,
            object_name: ObjectName::new(name, 0),
        })
    }

    // ---- change notification ---------------------------------------------

    /// Register an observer for committed batches
    pub fn subscribe(&mut self, observer: Arc<dyn PackageObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn record(&mut self, update: PackageUpdate) {
        self.changes.record(update);
    }

    /// Number of updates waiting for the next commit
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    /// Deliver everything recorded since the last commit as one batch
    pub fn commit_changes(&mut self) {
        if self.changes.is_empty() {
            return;
        }
        let batch = self.changes.take();
        debug!(updates = batch.len(), "committing package changes");
        for observer in &self.observers {
            observer.package_changed(&batch);
        }
    }

    // ---- validation ------------------------------------------------------

    /// Check that every name and reference resolves and that parent links
    /// form a tree
    pub(crate) fn validate_structure(&self) -> Result<()> {
        for (i, import) in self.imports.iter().enumerate() {
            let r = EntryRef::Import(i);
            for name in [import.object_name, import.class_name, import.class_package] {
                self.check_name(name)
                    .map_err(|_| corrupt(format!("import {} has an invalid name index {}", r, name.name)))?;
            }
            if !self.contains(import.link) {
                return Err(corrupt(format!("orphan reference: import {} links to {}", r, import.link)));
            }
        }

        for (i, export) in self.exports.iter().enumerate() {
            let r = EntryRef::Export(i);
            self.check_name(export.object_name)
                .map_err(|_| corrupt(format!("export {} has an invalid name index", r)))?;
            if !self.contains(export.link) {
                return Err(corrupt(format!("orphan reference: export {} links to {}", r, export.link)));
            }
            for target in [export.class, export.super_class, export.archetype] {
                if !self.contains(target) {
                    return Err(corrupt(format!("export {} references missing entry {}", r, target)));
                }
            }
        }

        let limit = self.entry_count();
        for r in self.entry_refs() {
            if self.ancestors(r).len() > limit {
                return Err(corrupt(format!("parent links of {} form a cycle", r)));
            }
        }
        Ok(())
    }
}
