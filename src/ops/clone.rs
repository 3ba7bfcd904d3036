//! Entry and subtree duplication

use super::remap_export;
use crate::entries::{EntryRef, ObjectName};
use crate::package::Package;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Append a copy of `source` under `link`, returning the new reference
fn clone_one(pkg: &mut Package, source: EntryRef, link: EntryRef, number: i32) -> Result<EntryRef> {
    match source {
        EntryRef::Export(_) => {
            let mut export = pkg.get_export(source).ok_or(Error::EntryNotFound(source))?.clone();
            export.link = link;
            export.object_name.number = number;
            pkg.add_export(export)
        }
        EntryRef::Import(_) => {
            let mut import = *pkg.get_import(source).ok_or(Error::EntryNotFound(source))?;
            import.link = link;
            import.object_name.number = number;
            pkg.add_import(import)
        }
        EntryRef::Root => Err(Error::InvalidOperation("the package root cannot be cloned".into())),
    }
}

fn fresh_number(pkg: &Package, source: EntryRef) -> Result<(EntryRef, i32)> {
    let entry = pkg.get_entry(source).ok_or(Error::EntryNotFound(source))?;
    let link = entry.link();
    let ObjectName { name, .. } = entry.object_name();
    let name = pkg.name(name)?.to_string();
    Ok((link, pkg.next_index_for(link, &name)))
}

/// Clone `source` as a sibling with the next free IndexValue. Payload
/// references to `source` are pointed at the clone.
pub fn clone_entry(pkg: &mut Package, source: EntryRef) -> Result<EntryRef> {
    let (link, number) = fresh_number(pkg, source)?;
    let clone = clone_one(pkg, source, link, number)?;
    if clone.is_export() {
        let map = HashMap::from([(source, clone)]);
        remap_export(pkg, clone, &map)?;
    }

    debug!(source = %source, clone = %clone, "cloned entry");
    pkg.commit_changes();
    Ok(clone)
}

/// Clone `source` and its whole subtree. Only the new root gets a fresh
/// IndexValue; descendants keep theirs under their new parents. References
/// anywhere inside the copy to entries of the original subtree are pointed
/// at their copies.
pub fn clone_tree(pkg: &mut Package, source: EntryRef) -> Result<EntryRef> {
    let (link, number) = fresh_number(pkg, source)?;
    let root = clone_one(pkg, source, link, number)?;

    let mut map = HashMap::from([(source, root)]);
    let mut stack = vec![(source, root)];
    while let Some((original, copy)) = stack.pop() {
        for child in pkg.children_of(original) {
            if map.contains_key(&child) {
                continue;
            }
            let number = pkg.object_name_of(child).map(|n| n.number).unwrap_or(0);
            let child_copy = clone_one(pkg, child, copy, number)?;
            map.insert(child, child_copy);
            stack.push((child, child_copy));
        }
    }

    let mut copies: Vec<EntryRef> = map.values().copied().filter(|r| r.is_export()).collect();
    copies.sort_by_key(|r| r.uindex());
    for copy in copies {
        remap_export(pkg, copy, &map)?;
    }

    info!(source = %source, clone = %root, entries = map.len(), "cloned subtree");
    pkg.commit_changes();
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::properties::{PropertyCollection, PropertyValue};
    use crate::tree::EntryTree;

    #[test]
    fn test_clone_entry_is_sibling_with_new_index() {
        let mut pkg = fixtures::scenario_package();
        let foo = EntryRef::from_uindex(5);
        let clone = clone_entry(&mut pkg, foo).unwrap();

        assert_eq!(clone.uindex(), 6);
        assert_eq!(pkg.link_of(clone), Some(EntryRef::Root));
        assert_eq!(pkg.instanced_name(clone), "Foo_0");
        assert_eq!(pkg.instanced_name(foo), "Foo");

        let props = PropertyCollection::decode(&pkg, clone).unwrap();
        let myself = props.find("Myself").unwrap();
        assert!(matches!(myself.value, PropertyValue::Object { target, .. } if target == clone));
    }

    #[test]
    fn test_clone_import() {
        let mut pkg = fixtures::scenario_package();
        let bar = EntryRef::from_uindex(-2);
        let clone = clone_entry(&mut pkg, bar).unwrap();
        assert_eq!(clone, EntryRef::Import(3));
        assert_eq!(pkg.instanced_full_path(clone), "Bar_0");
    }

    #[test]
    fn test_clone_tree_is_isomorphic() {
        let mut pkg = fixtures::sample_package();
        let actor = pkg.find_export("TheWorld.PersistentLevel.StaticMeshActor_0").unwrap();
        let before = pkg.entry_count();
        let copy = clone_tree(&mut pkg, actor).unwrap();
        assert_eq!(pkg.entry_count(), before + 2);

        let mut tree = EntryTree::build(&pkg).unwrap();
        let relative = |pkg: &Package, tree: &mut EntryTree, root: EntryRef| -> Vec<String> {
            let prefix = pkg.instanced_full_path(root);
            tree.flatten(root)
                .iter()
                .map(|r| pkg.instanced_full_path(*r)[prefix.len()..].to_string())
                .collect()
        };
        assert_eq!(relative(&pkg, &mut tree, actor), relative(&pkg, &mut tree, copy));
        assert_eq!(pkg.instanced_name(copy), "StaticMeshActor_2");

        let component = pkg.children_of(copy)[0];
        assert_eq!(component, EntryRef::Export(6));
        let owner = PropertyCollection::decode(&pkg, component).unwrap();
        let refs = owner.references();
        assert!(refs.contains(&("Owner".to_string(), copy)));
        // outside the subtree: unchanged
        let mesh = pkg.find_entry("EngineMeshes.Cube").unwrap();
        assert!(refs.contains(&("StaticMesh".to_string(), mesh)));

        let actor_props = PropertyCollection::decode(&pkg, copy).unwrap().references();
        let base = pkg.find_export("TheWorld.PersistentLevel.StaticMeshActor_1").unwrap();
        assert!(actor_props.contains(&("Base".to_string(), base)));
        assert!(actor_props.contains(&("StaticMeshComponent".to_string(), component)));
    }

    #[test]
    fn test_clone_root_rejected() {
        let mut pkg = fixtures::scenario_package();
        assert!(clone_entry(&mut pkg, EntryRef::Root).is_err());
    }
}
