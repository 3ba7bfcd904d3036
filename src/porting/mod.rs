//! Porting subtrees between packages
//!
//! A port copies entries from a source package into a destination package,
//! then rewrites every reference the copies carry so they point at
//! destination entries. The [`ObjectMap`] remembers which source entry ended
//! up where; it is filled before children are visited, so objects pointing
//! at themselves or at their ancestors relink correctly. Reusing one map
//! across related ports keeps shared dependencies from being copied twice.

mod relink;

use crate::entries::{instanced, EntryRef, ObjectName};
use crate::issues::{IssueKind, RelinkIssue};
use crate::ops::renumber;
use crate::package::Package;
use crate::properties::NameRef;
use crate::utils::{join_path, CancellationToken};
use crate::{Error, Result};
use relink::Relinker;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Source entry to destination entry
pub type ObjectMap = HashMap<EntryRef, EntryRef>;

/// How a port treats the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortingPolicy {
    /// Copy the subtree as new entries under `dest_parent`
    Clone,
    /// Overwrite the export `dest_parent` with the source export's class,
    /// flags and payload. Never adds entries.
    ReplaceSingular,
    /// Unify the source root with `dest_parent` and copy only children that
    /// do not already exist there
    Merge,
    /// Do nothing
    Cancel,
}

/// One port: what to copy, where, and how
#[derive(Debug, Clone, PartialEq)]
pub struct PortRequest {
    /// How the destination is treated
    pub policy: PortingPolicy,
    /// Entry in the source package to port
    pub source_root: EntryRef,
    /// Parent for [`PortingPolicy::Clone`], merge target for
    /// [`PortingPolicy::Merge`], entry to overwrite for
    /// [`PortingPolicy::ReplaceSingular`]
    pub dest_parent: EntryRef,
    /// Port descendants too
    pub recursive: bool,
    /// Name the copied root gets instead of its own
    pub root_name: Option<NameRef>,
    /// On a path conflict, take the next free IndexValue and renumber the
    /// sibling group instead of reporting the conflict
    pub auto_adjust: bool,
}

impl PortRequest {
    /// Recursive port without renaming or auto-adjust
    pub fn new(policy: PortingPolicy, source_root: EntryRef, dest_parent: EntryRef) -> Self {
        Self { policy, source_root, dest_parent, recursive: true, root_name: None, auto_adjust: false }
    }

    /// Resolve path conflicts by renumbering
    pub fn auto_adjust(mut self) -> Self {
        self.auto_adjust = true;
        self
    }

    /// Port the root alone
    pub fn singular(mut self) -> Self {
        self.recursive = false;
        self
    }

    /// Give the copied root another name
    pub fn renamed(mut self, name: NameRef) -> Self {
        self.root_name = Some(name);
        self
    }
}

/// What a completed port did
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortReport {
    /// Destination entry standing for the source root
    pub root: EntryRef,
    /// Entries appended to the destination, including recreated imports
    pub created: Vec<EntryRef>,
    /// New exports parented to a `PersistentLevel`; registering them as
    /// actors is up to the caller
    pub actor_candidates: Vec<EntryRef>,
    /// References that could not be mapped, payloads that could not be read
    pub issues: Vec<RelinkIssue>,
}

/// Result of a port that did not fail
#[derive(Debug, Clone)]
pub enum PortOutcome {
    /// The port ran
    Ported(PortReport),
    /// The destination already has an entry at the root's path
    Conflict {
        /// Entry already at that path
        existing: EntryRef,
        /// The path in question
        path: String,
        /// IndexValue that would not collide
        suggested_index: i32,
    },
    /// Nothing was done
    Cancelled,
}

impl PortOutcome {
    /// The report of a port that ran
    pub fn report(&self) -> Option<&PortReport> {
        match self {
            PortOutcome::Ported(report) => Some(report),
            _ => None,
        }
    }
}

const LEVEL_NAME: &str = "PersistentLevel";

/// Port `request.source_root` from `source` into `dest`.
///
/// Unresolvable references are reported in the result, never raised.
/// Errors mean the request was invalid, or a copied export's class has no
/// counterpart in the destination. Changes reach `dest`'s observers as one
/// batch, including those made before an error.
pub fn port(source: &Package, dest: &mut Package, request: &PortRequest, map: &mut ObjectMap) -> Result<PortOutcome> {
    if request.policy == PortingPolicy::Cancel {
        return Ok(PortOutcome::Cancelled);
    }
    if source.get_entry(request.source_root).is_none() {
        return Err(Error::EntryNotFound(request.source_root));
    }
    if !dest.contains(request.dest_parent) {
        return Err(Error::EntryNotFound(request.dest_parent));
    }

    let result = match request.policy {
        PortingPolicy::ReplaceSingular => replace_singular(source, dest, request, map),
        PortingPolicy::Merge => merge_into(source, dest, request, map),
        PortingPolicy::Clone => clone_subtree(source, dest, request, map),
        PortingPolicy::Cancel => Ok(PortOutcome::Cancelled),
    };
    // whatever was changed before a failure still goes out as one batch
    dest.commit_changes();
    let outcome = result?;

    if let PortOutcome::Ported(report) = &outcome {
        info!(
            policy = ?request.policy,
            root = %report.root,
            created = report.created.len(),
            issues = report.issues.len(),
            "ported"
        );
    }
    Ok(outcome)
}

fn replace_singular(source: &Package, dest: &mut Package, request: &PortRequest, map: &mut ObjectMap) -> Result<PortOutcome> {
    let target = request.dest_parent;
    if !request.source_root.is_export() || dest.get_export(target).is_none() {
        return Err(Error::InvalidOperation("replacing requires a source export and a destination export".into()));
    }

    let mut relinker = Relinker::new(source, dest, map, false);
    relinker.map(request.source_root, target);
    let flags = source.get_export(request.source_root).map(|e| e.object_flags).unwrap_or_default();
    relinker.dest_mut().export_mut(target)?.object_flags = flags;
    relinker.relink_onto(request.source_root, target)?;

    Ok(PortOutcome::Ported(PortReport { root: target, issues: relinker.issues, ..PortReport::default() }))
}

fn merge_into(source: &Package, dest: &mut Package, request: &PortRequest, map: &mut ObjectMap) -> Result<PortOutcome> {
    if request.dest_parent.is_root() {
        return Err(Error::InvalidOperation("cannot merge into the package root".into()));
    }
    let create_imports = dest.config().port_missing_imports;
    let mut relinker = Relinker::new(source, dest, map, create_imports);
    relinker.map(request.source_root, request.dest_parent);
    if request.recursive {
        port_children(&mut relinker, source, request.source_root, request.dest_parent, true)?;
    }
    relinker.relink_copied()?;
    Ok(PortOutcome::Ported(finish(relinker, request.dest_parent)))
}

fn clone_subtree(source: &Package, dest: &mut Package, request: &PortRequest, map: &mut ObjectMap) -> Result<PortOutcome> {
    if let Some(mapped) = map.get(&request.source_root) {
        return Ok(PortOutcome::Ported(PortReport { root: *mapped, ..PortReport::default() }));
    }

    let original = source.object_name_of(request.source_root).ok_or(Error::EntryNotFound(request.source_root))?;
    let (name, mut number) = match &request.root_name {
        Some(name) => (name.name.clone(), name.number),
        None => (source.name_str(original).to_string(), original.number),
    };

    // the incoming path, or for an unrenamed root the path it had in the source
    let incoming = join_path(&dest.instanced_full_path(request.dest_parent), &instanced(&name, number));
    let taken = dest.find_entry(&incoming).map(|existing| (existing, incoming)).or_else(|| {
        if request.root_name.is_some() {
            return None;
        }
        let source_path = source.instanced_full_path(request.source_root);
        dest.find_entry(&source_path).map(|existing| (existing, source_path))
    });
    let mut adjusted = false;
    if let Some((existing, path)) = taken {
        let suggested_index = dest.next_index_for(request.dest_parent, &name);
        if !request.auto_adjust {
            return Ok(PortOutcome::Conflict { existing, path, suggested_index });
        }
        warn!(path = %path, index = suggested_index, "path taken, adjusting index");
        number = suggested_index;
        adjusted = true;
    }

    let create_imports = dest.config().port_missing_imports;
    let mut relinker = Relinker::new(source, dest, map, create_imports);
    let root_name = ObjectName::new(relinker.dest_mut().find_or_add_name(&name), number);
    let root = relinker.copy_entry(request.source_root, request.dest_parent, Some(root_name))?;
    if request.recursive {
        port_children(&mut relinker, source, request.source_root, root, false)?;
    }
    relinker.relink_copied()?;

    if adjusted && root.is_export() {
        let parent_path = relinker.dest().parent_instanced_full_path(root);
        renumber(relinker.dest_mut(), &name, &parent_path)?;
    }
    Ok(PortOutcome::Ported(finish(relinker, root)))
}

/// Copy the children of `source_parent` under `dest_parent`, depth first.
/// With `merge`, a child whose instanced name already exists under
/// `dest_parent` is mapped onto that entry instead of copied.
fn port_children(
    relinker: &mut Relinker<'_>,
    source: &Package,
    source_parent: EntryRef,
    dest_parent: EntryRef,
    merge: bool,
) -> Result<()> {
    for child in source.children_of(source_parent) {
        if relinker.is_mapped(child) {
            continue;
        }
        let existing = if merge { matching_child(relinker.dest(), dest_parent, source, child) } else { None };
        let dest_child = match existing {
            Some(existing) => {
                relinker.map(child, existing);
                existing
            }
            None => relinker.copy_entry(child, dest_parent, None)?,
        };
        port_children(relinker, source, child, dest_child, merge)?;
    }
    Ok(())
}

fn matching_child(dest: &Package, dest_parent: EntryRef, source: &Package, child: EntryRef) -> Option<EntryRef> {
    let name = source.instanced_name(child);
    dest.children_of(dest_parent).into_iter().find(|c| {
        c.is_export() == child.is_export() && !dest.is_trashed(*c) && dest.instanced_name(*c).eq_ignore_ascii_case(&name)
    })
}

fn finish(relinker: Relinker<'_>, root: EntryRef) -> PortReport {
    let dest = relinker.dest();
    let actor_candidates = relinker
        .created
        .iter()
        .copied()
        .filter(|r| r.is_export())
        .filter(|r| {
            dest.link_of(*r)
                .and_then(|link| dest.object_name_of(link))
                .map(|n| dest.name_str(n).eq_ignore_ascii_case(LEVEL_NAME))
                .unwrap_or(false)
        })
        .collect();
    PortReport { root, created: relinker.created.clone(), actor_candidates, issues: relinker.issues.clone() }
}

/// Outcome of [`port_batch`]
#[derive(Debug, Clone, Default)]
pub struct BatchPortReport {
    /// One outcome per request that did not fail, in order
    pub outcomes: Vec<PortOutcome>,
    /// Requests that failed outright
    pub issues: Vec<RelinkIssue>,
    /// The token fired before every request ran
    pub cancelled: bool,
}

/// Run several ports in order with one object map. A failing request is
/// reported and the rest still run; the token is checked between requests.
pub fn port_batch(
    source: &Package,
    dest: &mut Package,
    requests: &[PortRequest],
    map: &mut ObjectMap,
    cancel: &CancellationToken,
) -> BatchPortReport {
    let mut report = BatchPortReport::default();
    for request in requests {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        match port(source, dest, request, map) {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(e) => {
                warn!(root = %request.source_root, error = %e, "port failed");
                report
                    .issues
                    .push(RelinkIssue::new(IssueKind::ItemFailed, Some(request.source_root), e.to_string()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, RecordingObserver};
    use crate::properties::{Property, PropertyCollection, PropertyValue};
    use std::sync::Arc;

    fn actor_0(pkg: &Package) -> EntryRef {
        pkg.find_export("TheWorld.PersistentLevel.StaticMeshActor_0").unwrap()
    }

    fn level(pkg: &Package) -> EntryRef {
        pkg.find_export("TheWorld.PersistentLevel").unwrap()
    }

    fn refs(pkg: &Package, r: EntryRef) -> Vec<(String, EntryRef)> {
        PropertyCollection::decode(pkg, r).unwrap().references()
    }

    #[test]
    fn test_clone_conflict_then_auto_adjust() {
        let source = fixtures::sample_package();
        let mut dest = fixtures::sample_package();
        let request = PortRequest::new(PortingPolicy::Clone, actor_0(&source), level(&dest));

        let before = dest.export_count();
        let outcome = port(&source, &mut dest, &request, &mut ObjectMap::new()).unwrap();
        match outcome {
            PortOutcome::Conflict { existing, path, suggested_index } => {
                assert_eq!(existing, actor_0(&dest));
                assert_eq!(path, "TheWorld.PersistentLevel.StaticMeshActor_0");
                assert_eq!(suggested_index, 3);
            }
            other => panic!("expected a conflict, got {:?}", other),
        }
        assert_eq!(dest.export_count(), before);

        let outcome = port(&source, &mut dest, &request.clone().auto_adjust(), &mut ObjectMap::new()).unwrap();
        let report = outcome.report().unwrap();
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(dest.export_count(), before + 2);
        assert_eq!(dest.instanced_full_path(report.root), "TheWorld.PersistentLevel.StaticMeshActor_2");
        assert_eq!(report.actor_candidates, vec![report.root]);

        let component = dest.children_of(report.root)[0];
        let component_refs = refs(&dest, component);
        assert!(component_refs.contains(&("Owner".to_string(), report.root)));
        assert!(component_refs.contains(&("StaticMesh".to_string(), dest.find_entry("EngineMeshes.Cube").unwrap())));
        let root_refs = refs(&dest, report.root);
        let base = dest.find_export("TheWorld.PersistentLevel.StaticMeshActor_1").unwrap();
        assert!(root_refs.contains(&("Base".to_string(), base)));
        assert_eq!(dest.get_export(report.root).unwrap().class, dest.find_entry("Engine.StaticMeshActor").unwrap());
    }

    #[test]
    fn test_clone_conflicts_when_source_path_exists() {
        let source = fixtures::sample_package();
        let mut dest = fixtures::sample_package();
        let request = PortRequest::new(PortingPolicy::Clone, actor_0(&source), EntryRef::Root).singular();

        let before = dest.export_count();
        match port(&source, &mut dest, &request, &mut ObjectMap::new()).unwrap() {
            PortOutcome::Conflict { existing, path, suggested_index } => {
                assert_eq!(existing, actor_0(&dest));
                assert_eq!(path, "TheWorld.PersistentLevel.StaticMeshActor_0");
                assert_eq!(suggested_index, 1);
            }
            other => panic!("expected a conflict, got {:?}", other),
        }
        assert_eq!(dest.export_count(), before);

        let outcome = port(&source, &mut dest, &request.clone().auto_adjust(), &mut ObjectMap::new()).unwrap();
        let root = outcome.report().unwrap().root;
        assert_eq!(dest.export_count(), before + 1);
        assert_eq!(dest.link_of(root), Some(EntryRef::Root));
        assert_eq!(dest.instanced_full_path(root), "StaticMeshActor_0");
    }

    #[test]
    fn test_clone_into_empty_package_recreates_imports() {
        let source = fixtures::sample_package();
        let mut dest = Package::new("Empty");
        let request = PortRequest::new(PortingPolicy::Clone, actor_0(&source), EntryRef::Root);

        let outcome = port(&source, &mut dest, &request, &mut ObjectMap::new()).unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(dest.export_count(), 2);
        assert!(dest.find_entry("Engine.StaticMeshActor").is_some());
        assert!(dest.find_entry("EngineMeshes.Cube").is_some());
        assert!(report.actor_candidates.is_empty());

        // Base points at the other actor, which was not ported
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::UnresolvedReference);
        assert_eq!(report.issues[0].entry, Some(report.root));
        let source_base = source.find_export("TheWorld.PersistentLevel.StaticMeshActor_1").unwrap();
        assert!(refs(&dest, report.root).contains(&("Base".to_string(), source_base)));
    }

    #[test]
    fn test_missing_imports_reported_when_disabled() {
        let config = crate::config::EngineConfig { port_missing_imports: false, ..Default::default() };
        let source = fixtures::sample_package();
        let mut dest = Package::new("Empty").with_config(Arc::new(config));
        let mesh_component = source.children_of(actor_0(&source))[0];
        let request = PortRequest::new(PortingPolicy::Clone, mesh_component, EntryRef::Root);

        let outcome = port(&source, &mut dest, &request, &mut ObjectMap::new()).unwrap();
        let report = outcome.report().unwrap();
        // the class chain is still brought over, nothing else is
        assert_eq!(dest.import_count(), 2);
        assert!(dest.find_entry("EngineMeshes.Cube").is_none());
        let export = dest.get_export(report.root).unwrap();
        assert!(!export.is_class());
        assert_eq!(dest.instanced_full_path(export.class), "Engine.StaticMeshComponent");

        // Owner and StaticMesh
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues.iter().all(|i| i.kind == IssueKind::UnresolvedReference));
        assert_eq!(refs(&dest, report.root).len(), 2);
    }

    #[test]
    fn test_replace_singular_keeps_class_it_cannot_map() {
        let source = fixtures::sample_package();
        let mut dest = Package::new("Other");
        dest.find_or_add_name("None");
        let engine = fixtures::add_import(&mut dest, "Engine", "Package", EntryRef::Root);
        let pawn = fixtures::add_import(&mut dest, "Pawn", "Class", engine);
        let hero = fixtures::add_export(&mut dest, "Hero", 0, EntryRef::Root, pawn, vec![]);
        dest.commit_changes();
        let before = dest.entry_count();

        let request = PortRequest::new(PortingPolicy::ReplaceSingular, actor_0(&source), hero);
        let outcome = port(&source, &mut dest, &request, &mut ObjectMap::new()).unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(dest.entry_count(), before);

        let export = dest.get_export(hero).unwrap();
        assert_eq!(export.class, pawn);
        assert!(!export.is_class());
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::UnresolvedReference && i.message.starts_with("Class")));

        let props = PropertyCollection::decode(&dest, hero).unwrap();
        assert_eq!(props.find("Tag").unwrap().value, PropertyValue::Name(NameRef::new("Crate", 0)));
        assert_eq!(crate::ops::find_references(&dest, pawn).len(), 1);
    }

    #[test]
    fn test_clone_counts_only_unmapped_nodes() {
        let source = fixtures::sample_package();
        let mut dest = fixtures::sample_package();
        let actor = actor_0(&source);
        let component = source.children_of(actor)[0];
        let dest_component = dest.children_of(actor_0(&dest))[0];

        let mut map = ObjectMap::from([(component, dest_component)]);
        let request =
            PortRequest::new(PortingPolicy::Clone, actor, level(&dest)).renamed(NameRef::new("StaticMeshActor", 9));
        let before = dest.export_count();
        let outcome = port(&source, &mut dest, &request, &mut map).unwrap();
        let report = outcome.report().unwrap();

        assert_eq!(dest.export_count(), before + 1);
        assert_eq!(dest.instanced_name(report.root), "StaticMeshActor_8");
        assert!(refs(&dest, report.root).contains(&("StaticMeshComponent".to_string(), dest_component)));
        assert_eq!(map.get(&actor), Some(&report.root));

        // a second port of the same root reuses the mapping
        let again = port(&source, &mut dest, &request, &mut map).unwrap();
        assert_eq!(again.report().unwrap().root, report.root);
        assert_eq!(dest.export_count(), before + 1);
    }

    #[test]
    fn test_self_reference_follows_copy() {
        let source = fixtures::scenario_package();
        let mut dest = Package::new("Empty");
        let foo = EntryRef::from_uindex(5);
        let outcome =
            port(&source, &mut dest, &PortRequest::new(PortingPolicy::Clone, foo, EntryRef::Root), &mut ObjectMap::new())
                .unwrap();
        let root = outcome.report().unwrap().root;
        assert_eq!(refs(&dest, root), vec![("Myself".to_string(), root)]);
    }

    #[test]
    fn test_replace_singular_keeps_count() {
        let source = fixtures::sample_package();
        let mut dest = fixtures::sample_package();
        let target = dest.find_export("TheWorld.PersistentLevel.StaticMeshActor_1").unwrap();
        let before = dest.entry_count();

        let request = PortRequest::new(PortingPolicy::ReplaceSingular, actor_0(&source), target);
        let outcome = port(&source, &mut dest, &request, &mut ObjectMap::new()).unwrap();
        assert_eq!(outcome.report().unwrap().root, target);
        assert_eq!(dest.entry_count(), before);

        let props = PropertyCollection::decode(&dest, target).unwrap();
        assert_eq!(props.find("Tag").unwrap().value, PropertyValue::Name(NameRef::new("Crate", 0)));
        // the source's Base pointed at the actor now being overwritten
        assert!(props.references().contains(&("Base".to_string(), target)));
        assert_eq!(dest.instanced_name(target), "StaticMeshActor_1");
    }

    #[test]
    fn test_merge_copies_only_new_children() {
        let mut source = fixtures::sample_package();
        let lvl = level(&source);
        let class = source.find_entry("Engine.StaticMeshActor").unwrap();
        let base = actor_0(&source);
        let fresh =
            fixtures::add_export(&mut source, "StaticMeshActor", 5, lvl, class, vec![Property::object("Base", base)]);
        source.commit_changes();

        let mut dest = fixtures::sample_package();
        let observer = Arc::new(RecordingObserver::default());
        dest.subscribe(observer.clone());
        let world = dest.find_export("TheWorld").unwrap();
        let request = PortRequest::new(PortingPolicy::Merge, source.find_export("TheWorld").unwrap(), world);
        let mut map = ObjectMap::new();
        let before = dest.export_count();

        let outcome = port(&source, &mut dest, &request, &mut map).unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.root, world);
        assert_eq!(dest.export_count(), before + 1);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.actor_candidates, report.created);

        let copy = map[&fresh];
        assert_eq!(dest.instanced_full_path(copy), "TheWorld.PersistentLevel.StaticMeshActor_4");
        assert_eq!(refs(&dest, copy), vec![("Base".to_string(), actor_0(&dest))]);
        assert_eq!(observer.batches().len(), 1);
    }

    #[test]
    fn test_failed_port_still_delivers_its_batch() {
        let mut source = Package::new("Widgets");
        source.find_or_add_name("None");
        let widget = fixtures::add_export(&mut source, "Widget", 0, EntryRef::Root, EntryRef::Root, vec![]);
        let thing = fixtures::add_export(&mut source, "Thing", 0, EntryRef::Root, widget, vec![]);
        source.commit_changes();

        let mut dest = Package::new("Empty");
        let observer = Arc::new(RecordingObserver::default());
        dest.subscribe(observer.clone());
        let request = PortRequest::new(PortingPolicy::Clone, thing, EntryRef::Root).singular();

        let result = port(&source, &mut dest, &request, &mut ObjectMap::new());
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
        assert_eq!(dest.pending_changes(), 0);
        let batches = observer.batches();
        assert_eq!(batches.len(), 1);
        assert!(batches[0]
            .iter()
            .any(|u| u.change == crate::changes::PackageChange::EntryAdded));
    }

    #[test]
    fn test_cancel_and_batch() {
        let source = fixtures::scenario_package();
        let mut dest = Package::new("Empty");
        let foo = EntryRef::from_uindex(5);
        let mut map = ObjectMap::new();

        let cancelled = port(&source, &mut dest, &PortRequest::new(PortingPolicy::Cancel, foo, EntryRef::Root), &mut map);
        assert!(matches!(cancelled, Ok(PortOutcome::Cancelled)));
        assert_eq!(dest.entry_count(), 0);

        let requests = vec![
            PortRequest::new(PortingPolicy::Clone, EntryRef::from_uindex(99), EntryRef::Root),
            PortRequest::new(PortingPolicy::Clone, foo, EntryRef::Root),
        ];
        let report = port_batch(&source, &mut dest, &requests, &mut map, &CancellationToken::new());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::ItemFailed);
        assert_eq!(report.outcomes.len(), 1);
        assert!(dest.find_export("Foo").is_some());

        let token = CancellationToken::new();
        token.cancel();
        let report = port_batch(&source, &mut dest, &requests, &mut map, &token);
        assert!(report.cancelled && report.outcomes.is_empty());
    }
}
