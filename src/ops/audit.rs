//! Reference search

use crate::entries::EntryRef;
use crate::package::Package;
use crate::properties::PropertyCollection;
use serde::Serialize;

/// One place that refers to a searched entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSite {
    /// Export holding the reference
    pub entry: EntryRef,
    /// `Class`, `SuperClass`, `Archetype`, or a property path
    pub location: String,
}

/// Every export whose header or parsed properties refer to `target`.
/// Unparseable payloads are skipped.
pub fn find_references(pkg: &Package, target: EntryRef) -> Vec<ReferenceSite> {
    let mut sites = Vec::new();
    if target.is_root() {
        return sites;
    }

    for (i, export) in pkg.exports().iter().enumerate() {
        let entry = EntryRef::Export(i);
        for (location, r) in [
            ("Class", export.class),
            ("SuperClass", export.super_class),
            ("Archetype", export.archetype),
        ] {
            if r == target {
                sites.push(ReferenceSite { entry, location: location.to_string() });
            }
        }

        if let Ok(props) = PropertyCollection::decode(pkg, entry) {
            sites.extend(
                props
                    .references()
                    .into_iter()
                    .filter(|(_, r)| *r == target)
                    .map(|(location, _)| ReferenceSite { entry, location }),
            );
        }
    }
    sites
}
