//! Soft deletion into the quarantine root

use crate::changes::{PackageChange, PackageUpdate};
use crate::entries::{EntryRef, ExportEntry, ObjectName};
use crate::package::Package;
use crate::properties::PropertyCollection;
use crate::{Error, Result};
use std::collections::HashSet;
use tracing::info;

const TRASHED_NAME: &str = "Trash";

fn ensure_trash_root(pkg: &mut Package, package_class: EntryRef) -> Result<EntryRef> {
    if let Some(root) = pkg.trash_root() {
        return Ok(root);
    }
    let name = pkg.config().trash_package_name.clone();
    let name = pkg.find_or_add_name(&name);
    let mut export = ExportEntry::new(ObjectName::new(name, 0), EntryRef::Root, package_class);
    export.data = PropertyCollection::default().encode(pkg)?;
    let root = pkg.add_export(export)?;
    info!(entry = %root, "created trash root");
    Ok(root)
}

/// Move `entries` under the trash root, renaming each to `Trash` so its old
/// path can be reused. Exports lose their class, archetype and properties.
///
/// Descendants are not moved implicitly. Every entry is checked before any
/// is touched; the root, unknown entries and entries already in the trash
/// are rejected.
pub fn trash(pkg: &mut Package, entries: &[EntryRef]) -> Result<()> {
    let mut seen = HashSet::new();
    for r in entries {
        if r.is_root() {
            return Err(Error::InvalidOperation("the package root cannot be trashed".into()));
        }
        if !pkg.contains(*r) {
            return Err(Error::EntryNotFound(*r));
        }
        if pkg.is_trashed(*r) || !seen.insert(*r) {
            return Err(Error::AlreadyTrashed(*r));
        }
    }
    if entries.is_empty() {
        return Ok(());
    }

    let package_class = pkg.find_or_add_class_import("Core", "Package")?;
    let trash_root = ensure_trash_root(pkg, package_class)?;
    let trash_name = ObjectName::new(pkg.find_or_add_name(TRASHED_NAME), 0);
    let core = ObjectName::new(pkg.find_or_add_name("Core"), 0);
    let package = ObjectName::new(pkg.find_or_add_name("Package"), 0);
    let empty_payload = PropertyCollection::default().encode(pkg)?;

    for r in entries {
        match r {
            EntryRef::Export(_) => {
                let export = pkg.export_mut(*r)?;
                export.object_name = trash_name;
                export.link = trash_root;
                export.class = package_class;
                export.super_class = EntryRef::Root;
                export.archetype = EntryRef::Root;
                pkg.set_export_data(*r, empty_payload.clone())?;
            }
            EntryRef::Import(_) => {
                let import = pkg.import_mut(*r)?;
                import.object_name = trash_name;
                import.link = trash_root;
                import.class_package = core;
                import.class_name = package;
            }
            EntryRef::Root => unreachable!("rejected above"),
        }
        pkg.record(PackageUpdate::entry(PackageChange::EntryRemoved, *r));
    }

    info!(count = entries.len(), "trashed entries");
    pkg.commit_changes();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, RecordingObserver};
    use crate::ops::clone_entry;
    use std::sync::Arc;

    #[test]
    fn test_clone_then_trash_scenario() {
        let mut pkg = fixtures::scenario_package();
        let foo = EntryRef::from_uindex(5);
        let bar = EntryRef::from_uindex(-2);
        assert_eq!(pkg.instanced_full_path(bar), "Bar");

        let clone = clone_entry(&mut pkg, foo).unwrap();
        assert_eq!(clone, EntryRef::from_uindex(6));

        trash(&mut pkg, &[foo]).unwrap();
        let trash_root = pkg.trash_root().unwrap();
        assert_eq!(pkg.link_of(foo), Some(trash_root));
        assert!(pkg.is_trashed(foo));
        assert_eq!(pkg.link_of(clone), Some(EntryRef::Root));
        assert!(!pkg.is_trashed(clone));
        assert_eq!(pkg.find_export("Foo_0"), Some(clone));
        assert_eq!(pkg.find_export("Foo"), None);
        assert_eq!(pkg.link_of(bar), Some(EntryRef::Root));
    }

    #[test]
    fn test_trash_rejects_trashed_and_keeps_count() {
        let mut pkg = fixtures::sample_package();
        let world = pkg.find_export("TheWorld").unwrap();
        let level = pkg.find_export("TheWorld.PersistentLevel").unwrap();

        trash(&mut pkg, &[level]).unwrap();
        let count = pkg.entry_count();

        assert!(matches!(trash(&mut pkg, &[level]), Err(Error::AlreadyTrashed(r)) if r == level));
        let trash_root = pkg.trash_root().unwrap();
        assert!(matches!(trash(&mut pkg, &[trash_root]), Err(Error::AlreadyTrashed(_))));
        // nothing touched when one input is bad
        assert!(trash(&mut pkg, &[world, level]).is_err());
        assert_eq!(pkg.link_of(world), Some(EntryRef::Root));
        assert_eq!(pkg.entry_count(), count);
    }

    #[test]
    fn test_trashed_export_is_emptied() {
        let mut pkg = fixtures::sample_package();
        let actor = pkg.find_export("TheWorld.PersistentLevel.StaticMeshActor_1").unwrap();
        trash(&mut pkg, &[actor]).unwrap();

        let props = PropertyCollection::decode(&pkg, actor).unwrap();
        assert!(props.properties.is_empty());
        assert_eq!(pkg.instanced_name(actor), "Trash");
        assert_eq!(pkg.instanced_full_path(pkg.get_export(actor).unwrap().class), "Core.Package");
    }

    #[test]
    fn test_trash_is_one_batch() {
        let mut pkg = fixtures::sample_package();
        let observer = Arc::new(RecordingObserver::default());
        pkg.subscribe(observer.clone());

        let first = pkg.find_export("TheWorld.PersistentLevel.StaticMeshActor_0").unwrap();
        let component = pkg.children_of(first)[0];
        trash(&mut pkg, &[first, component]).unwrap();

        let batches = observer.batches();
        assert_eq!(batches.len(), 1);
        let removed: Vec<_> = batches[0]
            .iter()
            .filter(|u| u.change == PackageChange::EntryRemoved)
            .collect();
        assert_eq!(removed.len(), 2);
    }
}
