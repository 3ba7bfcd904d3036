//! Package name table
//!
//! An append-only list of strings. Two slots may hold the same value; lookups
//! resolve to the first one.

use crate::{Error, Result};
use std::collections::HashMap;

/// Ordered name strings with a first-slot lookup
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl NameTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from names read off disk, keeping duplicates in place
    pub fn from_names(names: Vec<String>) -> Self {
        let mut lookup = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            lookup.entry(name.clone()).or_insert(i);
        }
        Self { names, lookup }
    }

    /// Number of slots
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table has no slots
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name at `index`
    pub fn get(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or(Error::NameIndexOutOfRange { index, count: self.names.len() })
    }

    /// Exact-match lookup
    pub fn find(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Returns the index of `name` and whether it had to be appended
    pub fn find_or_add(&mut self, name: &str) -> (usize, bool) {
        if let Some(index) = self.find(name) {
            return (index, false);
        }
        let index = self.names.len();
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), index);
        (index, true)
    }

    /// Change the value stored at `index` without renumbering anything
    pub fn replace(&mut self, index: usize, name: &str) -> Result<()> {
        let count = self.names.len();
        let slot = self
            .names
            .get_mut(index)
            .ok_or(Error::NameIndexOutOfRange { index, count })?;
        let old = std::mem::replace(slot, name.to_string());

        if self.lookup.get(&old) == Some(&index) {
            self.lookup.remove(&old);
            // another slot may carry the same old value
            if let Some(other) = self.names.iter().position(|n| *n == old) {
                self.lookup.insert(old, other);
            }
        }

        let first = self.names.iter().position(|n| n == name).unwrap_or(index);
        self.lookup.insert(name.to_string(), first);
        Ok(())
    }

    /// Names in slot order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
