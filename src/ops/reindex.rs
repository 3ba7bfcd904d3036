//! IndexValue repair

use crate::entries::EntryRef;
use crate::package::Package;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

fn matching_siblings(pkg: &Package, name: &str, parent_path: &str) -> Vec<EntryRef> {
    pkg.exports()
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_class() && pkg.name_str(e.object_name) == name)
        .map(|(i, _)| EntryRef::Export(i))
        .filter(|r| pkg.parent_instanced_full_path(*r) == parent_path && !pkg.is_trashed(*r))
        .collect()
}

/// Renumber without committing; callers fold it into their own batch
pub(crate) fn renumber(pkg: &mut Package, name: &str, parent_path: &str) -> Result<usize> {
    let siblings = matching_siblings(pkg, name, parent_path);
    for (i, r) in siblings.iter().enumerate() {
        let number = i as i32 + 1;
        if pkg.object_name_of(*r).map(|n| n.number) != Some(number) {
            pkg.export_mut(*r)?.object_name.number = number;
        }
    }
    debug!(name, parent = parent_path, count = siblings.len(), "reindexed");
    Ok(siblings.len())
}

/// Renumber every non-class, non-trashed export called `name` under the
/// parent at `parent_path` as `1..=n` in table order. Returns `n`.
pub fn reindex(pkg: &mut Package, name: &str, parent_path: &str) -> Result<usize> {
    let count = renumber(pkg, name, parent_path)?;
    pkg.commit_changes();
    Ok(count)
}

/// Reindex the sibling group `r` belongs to
pub fn reindex_export(pkg: &mut Package, r: EntryRef) -> Result<usize> {
    let export = pkg.get_export(r).ok_or(Error::EntryNotFound(r))?;
    if pkg.is_trashed(r) {
        return Err(Error::AlreadyTrashed(r));
    }
    if export.is_class() {
        return Err(Error::InvalidOperation(format!("{} is a class and keeps IndexValue 0", r)));
    }
    let name = pkg.name_str(export.object_name).to_string();
    let parent = pkg.parent_instanced_full_path(r);
    reindex(pkg, &name, &parent)
}

/// Groups of live exports sharing one InstancedFullPath, in table order
pub fn find_duplicate_indexes(pkg: &Package) -> Vec<Vec<EntryRef>> {
    let mut groups: Vec<Vec<EntryRef>> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();
    for i in 0..pkg.export_count() {
        let r = EntryRef::Export(i);
        if pkg.is_trashed(r) {
            continue;
        }
        let path = pkg.instanced_full_path(r).to_lowercase();
        match by_path.get(&path) {
            Some(group) => groups[*group].push(r),
            None => {
                by_path.insert(path, groups.len());
                groups.push(vec![r]);
            }
        }
    }
    groups.retain(|g| g.len() > 1);
    groups
}

/// Reindex every sibling group that holds a duplicate path. Returns the
/// number of groups repaired.
pub fn reindex_duplicates(pkg: &mut Package) -> Result<usize> {
    let mut repaired = 0;
    for group in find_duplicate_indexes(pkg) {
        let first = group[0];
        let Some(export) = pkg.get_export(first) else { continue };
        if export.is_class() {
            continue;
        }
        let name = pkg.name_str(export.object_name).to_string();
        let parent = pkg.parent_instanced_full_path(first);
        renumber(pkg, &name, &parent)?;
        repaired += 1;
    }
    if repaired > 0 {
        info!(groups = repaired, "repaired duplicate indexes");
    }
    pkg.commit_changes();
    Ok(repaired)
}
