//! In-package graph mutations
//!
//! Every public operation here delivers its changes to observers as one
//! batch before returning.

mod audit;
mod clone;
mod reindex;
mod trash;

pub use audit::{find_references, ReferenceSite};
pub use clone::{clone_entry, clone_tree};
pub use reindex::{find_duplicate_indexes, reindex, reindex_duplicates, reindex_export};
pub(crate) use reindex::renumber;
pub use trash::trash;

use crate::entries::EntryRef;
use crate::package::Package;
use crate::properties::PropertyCollection;
use crate::{Error, Result};
use std::collections::HashMap;

/// Rewrite the header references and parsed payload of export `r` through
/// `map`. Returns `false` when the payload could not be parsed; it is then
/// left untouched.
pub(crate) fn remap_export(pkg: &mut Package, r: EntryRef, map: &HashMap<EntryRef, EntryRef>) -> Result<bool> {
    let export = pkg.get_export(r).ok_or(Error::EntryNotFound(r))?;
    let lookup = |target: EntryRef| map.get(&target).copied();
    let class = lookup(export.class);
    let super_class = lookup(export.super_class);
    let archetype = lookup(export.archetype);
    if class.is_some() || super_class.is_some() || archetype.is_some() {
        let export = pkg.export_mut(r)?;
        if let Some(class) = class {
            export.class = class;
        }
        if let Some(super_class) = super_class {
            export.super_class = super_class;
        }
        if let Some(archetype) = archetype {
            export.archetype = archetype;
        }
    }

    let mut props = match PropertyCollection::decode(pkg, r) {
        Ok(props) => props,
        Err(Error::UnparsedPayload { .. }) => return Ok(false),
        Err(e) => return Err(e),
    };
    let mut changed = false;
    props.for_each_ref_mut(&mut |target| {
        if let Some(mapped) = map.get(target) {
            *target = *mapped;
            changed = true;
        }
    });
    if changed {
        let data = props.encode(pkg)?;
        pkg.set_export_data(r, data)?;
    }
    Ok(true)
}
