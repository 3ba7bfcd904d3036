//! Change notification
//!
//! Every mutation records what it touched into a [`ChangeLog`]. Observers
//! receive the whole log as one batch when the operation commits, never one
//! event per field write.

use crate::entries::EntryRef;
use serde::Serialize;
use std::collections::HashSet;

/// Kind of change made to a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PackageChange {
    /// A name was appended to the name table
    NameAdded,
    /// A name table slot got new text
    NameEdited,
    /// A new export or import slot
    EntryAdded,
    /// Entry left the live namespace (it still occupies its slot)
    EntryRemoved,
    /// Name, link, class or flags changed
    HeaderChanged,
    /// Export payload replaced
    DataChanged,
}

/// What a change applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UpdateTarget {
    /// Name table slot
    Name(usize),
    /// Export or import
    Entry(EntryRef),
}

/// A single (kind, target) notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PackageUpdate {
    /// What happened
    pub change: PackageChange,
    /// Where it happened
    pub target: UpdateTarget,
}

impl PackageUpdate {
    /// Update about a name table slot
    pub fn name(change: PackageChange, index: usize) -> Self {
        Self { change, target: UpdateTarget::Name(index) }
    }

    /// Update about an entry
    pub fn entry(change: PackageChange, entry: EntryRef) -> Self {
        Self { change, target: UpdateTarget::Entry(entry) }
    }
}

/// Receives one batch of updates per committed operation
pub trait PackageObserver: Send + Sync {
    /// Called once per committed operation with everything it touched
    fn package_changed(&self, updates: &[PackageUpdate]);
}

/// Ordered, de-duplicated pending updates
#[derive(Debug, Default)]
pub struct ChangeLog {
    updates: Vec<PackageUpdate>,
    seen: HashSet<PackageUpdate>,
}

impl ChangeLog {
    /// Queue `update` unless an identical one is already pending
    pub fn record(&mut self, update: PackageUpdate) {
        if self.seen.insert(update) {
            self.updates.push(update);
        }
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Pending update count
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Drain everything recorded so far
    pub fn take(&mut self) -> Vec<PackageUpdate> {
        self.seen.clear();
        std::mem::take(&mut self.updates)
    }
}
