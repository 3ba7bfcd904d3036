//! Copying entries between packages and rewriting their references

use super::ObjectMap;
use crate::entries::{EntryRef, ExportEntry, ImportEntry, ObjectName};
use crate::issues::{IssueKind, RelinkIssue};
use crate::package::Package;
use crate::properties::PropertyCollection;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// State of one port: both packages, the caller's object map and what has
/// been produced so far
pub(crate) struct Relinker<'a> {
    source: &'a Package,
    dest: &'a mut Package,
    map: &'a mut ObjectMap,
    create_imports: bool,
    /// Copied exports as (source, destination), in copy order
    copied: Vec<(EntryRef, EntryRef)>,
    pub(crate) created: Vec<EntryRef>,
    pub(crate) issues: Vec<RelinkIssue>,
}

impl<'a> Relinker<'a> {
    pub(crate) fn new(source: &'a Package, dest: &'a mut Package, map: &'a mut ObjectMap, create_imports: bool) -> Self {
        Self { source, dest, map, create_imports, copied: Vec::new(), created: Vec::new(), issues: Vec::new() }
    }

    pub(crate) fn dest(&self) -> &Package {
        &*self.dest
    }

    pub(crate) fn dest_mut(&mut self) -> &mut Package {
        &mut *self.dest
    }

    pub(crate) fn map(&mut self, source: EntryRef, dest: EntryRef) {
        self.map.insert(source, dest);
    }

    pub(crate) fn is_mapped(&self, source: EntryRef) -> bool {
        self.map.contains_key(&source)
    }

    /// Re-intern a source name into the destination table
    fn intern(&mut self, name: ObjectName) -> ObjectName {
        let index = self.dest.find_or_add_name(self.source.name_str(name));
        ObjectName::new(index, name.number)
    }

    /// Append a copy of `source` under `link` and map it. Header references
    /// stay unset until [`Relinker::relink`]; the payload is copied verbatim.
    pub(crate) fn copy_entry(&mut self, source: EntryRef, link: EntryRef, name: Option<ObjectName>) -> Result<EntryRef> {
        let package: &'a Package = self.source;
        let copy = match source {
            EntryRef::Export(_) => {
                let export = package.get_export(source).ok_or(Error::EntryNotFound(source))?;
                let object_name = match name {
                    Some(name) => name,
                    None => self.intern(export.object_name),
                };
                let mut entry = ExportEntry::new(object_name, link, EntryRef::Root);
                entry.object_flags = export.object_flags;
                entry.export_flags = export.export_flags;
                entry.net_object_counts = export.net_object_counts.clone();
                entry.package_guid = export.package_guid;
                entry.package_flags = export.package_flags;
                entry.data = export.data().to_vec();
                let copy = self.dest.add_export(entry)?;
                self.copied.push((source, copy));
                copy
            }
            EntryRef::Import(_) => {
                let import = *package.get_import(source).ok_or(Error::EntryNotFound(source))?;
                let entry = ImportEntry {
                    class_package: self.intern(import.class_package),
                    class_name: self.intern(import.class_name),
                    link,
                    object_name: match name {
                        Some(name) => name,
                        None => self.intern(import.object_name),
                    },
                };
                self.dest.add_import(entry)?
            }
            EntryRef::Root => return Err(Error::InvalidOperation("the package root cannot be ported".into())),
        };

        self.map.insert(source, copy);
        self.created.push(copy);
        trace!(source = %source, copy = %copy, "copied entry");
        Ok(copy)
    }

    /// Destination counterpart of a source reference.
    ///
    /// Looks in the object map first, then for an entry with the same
    /// InstancedFullPath in the destination, then recreates missing imports
    /// when allowed. Matches are remembered in the map.
    pub(crate) fn resolve(&mut self, source: EntryRef) -> Result<Option<EntryRef>> {
        if source.is_root() {
            return Ok(Some(EntryRef::Root));
        }
        if let Some(mapped) = self.map.get(&source) {
            return Ok(Some(*mapped));
        }
        if !self.source.contains(source) {
            return Ok(None);
        }

        let path = self.source.instanced_full_path(source);
        if let Some(found) = self.dest.find_entry(&path) {
            trace!(source = %source, dest = %found, path = %path, "matched by path");
            self.map.insert(source, found);
            return Ok(Some(found));
        }
        if source.is_import() && self.create_imports {
            return self.recreate_import(source);
        }
        Ok(None)
    }

    fn recreate_import(&mut self, source: EntryRef) -> Result<Option<EntryRef>> {
        let import = *self.source.get_import(source).ok_or(Error::EntryNotFound(source))?;
        let Some(link) = self.resolve(import.link)? else {
            return Ok(None);
        };
        let entry = ImportEntry {
            class_package: self.intern(import.class_package),
            class_name: self.intern(import.class_name),
            link,
            object_name: self.intern(import.object_name),
        };
        let created = self.dest.add_import(entry)?;
        self.map.insert(source, created);
        self.created.push(created);
        debug!(source = %source, import = %created, "recreated missing import");
        Ok(Some(created))
    }

    fn unresolved(&mut self, dest: EntryRef, location: &str, target: EntryRef) {
        let message = format!(
            "{} refers to {} ({}), which has no counterpart in the destination",
            location,
            target,
            self.source.instanced_full_path(target)
        );
        warn!(entry = %dest, "{}", message);
        self.issues.push(RelinkIssue::unresolved_reference(dest, message));
    }

    /// Rewrite every copied export against the destination
    pub(crate) fn relink_copied(&mut self) -> Result<()> {
        let copied = std::mem::take(&mut self.copied);
        for (source, dest) in &copied {
            self.relink(*source, *dest)?;
        }
        self.copied = copied;
        Ok(())
    }

    /// Class counterpart for a copied export. A missing class import chain
    /// is recreated even when other imports are not, since an export whose
    /// class is the root reads as a class definition.
    fn resolve_class(&mut self, class: EntryRef) -> Result<Option<EntryRef>> {
        if let Some(found) = self.resolve(class)? {
            return Ok(Some(found));
        }
        if !class.is_import() {
            return Ok(None);
        }
        let allowed = std::mem::replace(&mut self.create_imports, true);
        let found = self.recreate_import(class);
        self.create_imports = allowed;
        found
    }

    /// Give the freshly copied `dest` the header references and payload of
    /// `source`, with every reference mapped into the destination.
    ///
    /// Unresolved super class and archetype references become the root;
    /// unresolved payload references keep their source value. Both are
    /// reported. A class that cannot be mapped fails the port.
    pub(crate) fn relink(&mut self, source: EntryRef, dest: EntryRef) -> Result<()> {
        let package: &'a Package = self.source;
        let export = package.get_export(source).ok_or(Error::EntryNotFound(source))?;
        let class = if export.class.is_root() {
            EntryRef::Root
        } else {
            self.resolve_class(export.class)?.ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "class {} of {} has no counterpart in the destination",
                    package.instanced_full_path(export.class),
                    package.instanced_full_path(source)
                ))
            })?
        };
        self.relink_header(source, dest, [class, EntryRef::Root, EntryRef::Root], &[false, true, true])?;
        self.relink_payload(source, dest)
    }

    /// Overwrite the existing export `dest` with the header references and
    /// payload of `source`. References without a destination counterpart
    /// keep `dest`'s current value and are reported.
    pub(crate) fn relink_onto(&mut self, source: EntryRef, dest: EntryRef) -> Result<()> {
        let current = self.dest.get_export(dest).ok_or(Error::EntryNotFound(dest))?;
        let fallback = [current.class, current.super_class, current.archetype];
        self.relink_header(source, dest, fallback, &[true, true, true])?;
        self.relink_payload(source, dest)
    }

    /// Map the class, super class and archetype of `source` onto `dest`.
    /// Slots flagged in `resolve` are looked up and fall back to `fallback`
    /// when unmatched; the others take `fallback` as is.
    fn relink_header(
        &mut self,
        source: EntryRef,
        dest: EntryRef,
        fallback: [EntryRef; 3],
        resolve: &[bool; 3],
    ) -> Result<()> {
        let package: &'a Package = self.source;
        let export = package.get_export(source).ok_or(Error::EntryNotFound(source))?;

        let mut header = fallback;
        let wanted = [export.class, export.super_class, export.archetype];
        for (i, location) in ["Class", "SuperClass", "Archetype"].into_iter().enumerate() {
            if !resolve[i] {
                continue;
            }
            match self.resolve(wanted[i])? {
                Some(mapped) => header[i] = mapped,
                None => self.unresolved(dest, location, wanted[i]),
            }
        }
        let [class, super_class, archetype] = header;
        let entry = self.dest.export_mut(dest)?;
        entry.class = class;
        entry.super_class = super_class;
        entry.archetype = archetype;
        Ok(())
    }

    fn relink_payload(&mut self, source: EntryRef, dest: EntryRef) -> Result<()> {
        let package: &'a Package = self.source;
        let export = package.get_export(source).ok_or(Error::EntryNotFound(source))?;

        let mut props = match PropertyCollection::decode(package, source) {
            Ok(props) => props,
            Err(Error::UnparsedPayload { reason, .. }) => {
                self.dest.set_export_data(dest, export.data().to_vec())?;
                self.issues.push(RelinkIssue::new(
                    IssueKind::UnparsedPayload,
                    Some(dest),
                    format!("payload copied verbatim, references not rewritten: {}", reason),
                ));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let mut table: HashMap<EntryRef, Option<EntryRef>> = HashMap::new();
        for (location, target) in props.references() {
            let mapped = match table.get(&target) {
                Some(mapped) => *mapped,
                None => {
                    let mapped = self.resolve(target)?;
                    table.insert(target, mapped);
                    mapped
                }
            };
            if mapped.is_none() {
                self.unresolved(dest, &location, target);
            }
        }
        props.for_each_ref_mut(&mut |target| {
            if let Some(Some(mapped)) = table.get(target) {
                *target = *mapped;
            }
        });

        let data = props.encode(&mut *self.dest)?;
        self.dest.set_export_data(dest, data)
    }
}
