//! Entry tree
//!
//! Rebuilds the parent/child hierarchy from the flat tables. Nodes live in
//! two slot-indexed arenas mirroring the export and import tables, so a
//! parent lookup is a plain index.
//!
//! Children are sorted by case-insensitive name, then IndexValue. A parent
//! whose membership changes is marked dirty and re-sorted on its next read.

use crate::changes::{PackageChange, PackageUpdate, UpdateTarget};
use crate::entries::EntryRef;
use crate::format::corrupt;
use crate::package::Package;
use crate::Result;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
struct TreeNode {
    parent: Option<EntryRef>,
    children: Vec<EntryRef>,
    sort_key: (String, i32),
}

/// Parent/child view over one package's entries
#[derive(Debug, Default)]
pub struct EntryTree {
    root: TreeNode,
    exports: Vec<Option<TreeNode>>,
    imports: Vec<Option<TreeNode>>,
    dirty: HashSet<EntryRef>,
}

fn sort_key(pkg: &Package, r: EntryRef) -> (String, i32) {
    match pkg.object_name_of(r) {
        Some(name) => (pkg.name_str(name).to_lowercase(), name.number),
        None => (String::new(), 0),
    }
}

impl EntryTree {
    /// Build the whole tree. A parent link that does not resolve, or links
    /// that never reach the root, are fatal.
    pub fn build(pkg: &Package) -> Result<Self> {
        let mut tree = EntryTree {
            root: TreeNode::default(),
            exports: vec![None; pkg.export_count()],
            imports: vec![None; pkg.import_count()],
            dirty: HashSet::new(),
        };

        for r in pkg.entry_refs() {
            let link = pkg.link_of(r).unwrap_or_default();
            if !pkg.contains(link) {
                return Err(corrupt(format!("orphan reference: {} links to missing {}", r, link)));
            }
            *tree.slot_mut(r) = Some(TreeNode { parent: Some(link), children: Vec::new(), sort_key: sort_key(pkg, r) });
        }
        for r in pkg.entry_refs() {
            let link = pkg.link_of(r).unwrap_or_default();
            if let Some(parent) = tree.node_mut(link) {
                parent.children.push(r);
            }
            tree.dirty.insert(link);
        }

        let reachable = tree.flatten_unsorted(EntryRef::Root).len();
        if reachable != pkg.entry_count() {
            return Err(corrupt(format!(
                "{} entries are not reachable from the root (parent cycle)",
                pkg.entry_count() - reachable
            )));
        }

        debug!(entries = reachable, "built entry tree");
        Ok(tree)
    }

    fn slot_mut(&mut self, r: EntryRef) -> &mut Option<TreeNode> {
        let (table, i) = match r {
            EntryRef::Export(i) => (&mut self.exports, i),
            EntryRef::Import(i) => (&mut self.imports, i),
            EntryRef::Root => unreachable!("the root has no slot"),
        };
        if table.len() <= i {
            table.resize(i + 1, None);
        }
        &mut table[i]
    }

    fn node(&self, r: EntryRef) -> Option<&TreeNode> {
        match r {
            EntryRef::Root => Some(&self.root),
            EntryRef::Export(i) => self.exports.get(i).and_then(Option::as_ref),
            EntryRef::Import(i) => self.imports.get(i).and_then(Option::as_ref),
        }
    }

    fn node_mut(&mut self, r: EntryRef) -> Option<&mut TreeNode> {
        match r {
            EntryRef::Root => Some(&mut self.root),
            EntryRef::Export(i) => self.exports.get_mut(i).and_then(Option::as_mut),
            EntryRef::Import(i) => self.imports.get_mut(i).and_then(Option::as_mut),
        }
    }

    /// Whether `r` is attached to the tree
    pub fn contains(&self, r: EntryRef) -> bool {
        self.node(r).is_some()
    }

    /// Attached entries, not counting the root
    pub fn len(&self) -> usize {
        self.exports.iter().chain(&self.imports).filter(|n| n.is_some()).count()
    }

    /// Whether nothing is attached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parent of an attached entry
    pub fn parent(&self, r: EntryRef) -> Option<EntryRef> {
        self.node(r).and_then(|n| n.parent)
    }

    /// Sorted children of `parent`
    pub fn children(&mut self, parent: EntryRef) -> &[EntryRef] {
        if self.dirty.remove(&parent) {
            self.sort_children(parent);
        }
        self.node(parent).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn sort_children(&mut self, parent: EntryRef) {
        let Some(node) = self.node(parent) else { return };
        let mut keyed: Vec<((String, i32), EntryRef)> = node
            .children
            .iter()
            .map(|c| (self.node(*c).map(|n| n.sort_key.clone()).unwrap_or_default(), *c))
            .collect();
        keyed.sort();
        if let Some(node) = self.node_mut(parent) {
            node.children = keyed.into_iter().map(|(_, c)| c).collect();
        }
    }

    /// `start` and all its descendants, depth first in sorted order
    pub fn flatten(&mut self, start: EntryRef) -> Vec<EntryRef> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(r) = stack.pop() {
            if !r.is_root() {
                out.push(r);
            }
            let children = self.children(r).to_vec();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    fn flatten_unsorted(&self, start: EntryRef) -> Vec<EntryRef> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(r) = stack.pop() {
            if !seen.insert(r) {
                continue;
            }
            if !r.is_root() {
                out.push(r);
            }
            if let Some(node) = self.node(r) {
                stack.extend(node.children.iter().copied());
            }
        }
        out
    }

    /// Attach entries added to the package after the tree was built.
    ///
    /// Entries may arrive before their parents, so attachment repeats until a
    /// pass makes no progress; whatever is left is an orphan.
    pub fn attach_new(&mut self, pkg: &Package, entries: &[EntryRef]) -> Result<()> {
        let mut pending: Vec<EntryRef> = entries.iter().copied().filter(|r| !self.contains(*r)).collect();

        while !pending.is_empty() {
            let mut orphans = Vec::new();
            for r in &pending {
                let Some(link) = pkg.link_of(*r) else {
                    orphans.push(*r);
                    continue;
                };
                if let Some(parent) = self.node_mut(link) {
                    parent.children.push(*r);
                    *self.slot_mut(*r) = Some(TreeNode {
                        parent: Some(link),
                        children: Vec::new(),
                        sort_key: sort_key(pkg, *r),
                    });
                    self.dirty.insert(link);
                } else {
                    orphans.push(*r);
                }
            }

            if orphans.len() == pending.len() {
                warn!(count = orphans.len(), "unable to attach new entries to parents");
                let list: Vec<String> = orphans.iter().map(ToString::to_string).collect();
                return Err(corrupt(format!("orphan reference: {}", list.join(", "))));
            }
            pending = orphans;
        }
        Ok(())
    }

    /// Whether `r` is `ancestor` or sits somewhere below it
    fn is_within(&self, r: EntryRef, ancestor: EntryRef) -> bool {
        let mut current = Some(r);
        let mut steps = 0;
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            steps += 1;
            if c.is_root() || steps > self.len() + 1 {
                return false;
            }
            current = self.parent(c);
        }
        false
    }

    /// Bring the tree in line with one committed batch of updates
    pub fn apply_updates(&mut self, pkg: &Package, updates: &[PackageUpdate]) -> Result<()> {
        if updates.iter().any(|u| u.change == PackageChange::EntryRemoved) {
            *self = Self::build(pkg)?;
            return Ok(());
        }

        let mut added: Vec<EntryRef> = updates
            .iter()
            .filter(|u| u.change == PackageChange::EntryAdded)
            .filter_map(|u| match u.target {
                UpdateTarget::Entry(r) => Some(r),
                UpdateTarget::Name(_) => None,
            })
            .collect();
        added.sort_by_key(|r| r.uindex().unsigned_abs());
        self.attach_new(pkg, &added)?;

        for update in updates {
            let UpdateTarget::Entry(r) = update.target else { continue };
            if update.change != PackageChange::HeaderChanged || !self.contains(r) {
                continue;
            }
            let key = sort_key(pkg, r);
            let link = pkg.link_of(r).unwrap_or_default();
            let old_parent = self.parent(r).unwrap_or_default();
            if old_parent != link && self.is_within(link, r) {
                return Err(corrupt(format!("parent cycle: {} moved under its descendant {}", r, link)));
            }

            if let Some(node) = self.node_mut(r) {
                node.sort_key = key;
                node.parent = Some(link);
            }
            if old_parent != link {
                if !self.contains(link) {
                    return Err(corrupt(format!("orphan reference: {} moved under missing {}", r, link)));
                }
                if let Some(old) = self.node_mut(old_parent) {
                    old.children.retain(|c| *c != r);
                }
                if let Some(new) = self.node_mut(link) {
                    new.children.push(r);
                }
                self.dirty.insert(link);
            }
            self.dirty.insert(old_parent);
        }
        Ok(())
    }
}
