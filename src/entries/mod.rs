//! Entry identities and table records
//!
//! Packages address their objects with a signed index. Positive values point
//! into the export table, negative values into the import table and zero
//! stands for the package root. That encoding only exists at the codec
//! boundary: the rest of the crate passes [`EntryRef`] around.

use serde::{Serialize, Serializer};
use std::fmt;

/// Reference to an entry slot, or to the package root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryRef {
    /// No object; the package itself
    Root,
    /// Zero-based slot in the export table
    Export(usize),
    /// Zero-based slot in the import table
    Import(usize),
}

impl EntryRef {
    /// Decode a serialized UIndex
    pub fn from_uindex(raw: i32) -> Self {
        match raw {
            0 => EntryRef::Root,
            n if n > 0 => EntryRef::Export((n - 1) as usize),
            n => EntryRef::Import((-(n as i64) - 1) as usize),
        }
    }

    /// Encode back into the serialized UIndex form
    pub fn uindex(self) -> i32 {
        match self {
            EntryRef::Root => 0,
            EntryRef::Export(slot) => slot as i32 + 1,
            EntryRef::Import(slot) => -(slot as i32) - 1,
        }
    }

    /// Whether this is the package root
    #[inline]
    pub fn is_root(self) -> bool {
        matches!(self, EntryRef::Root)
    }

    /// Whether this is an export slot
    #[inline]
    pub fn is_export(self) -> bool {
        matches!(self, EntryRef::Export(_))
    }

    /// Whether this is an import slot
    #[inline]
    pub fn is_import(self) -> bool {
        matches!(self, EntryRef::Import(_))
    }
}

impl Default for EntryRef {
    fn default() -> Self {
        EntryRef::Root
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.uindex())
    }
}

impl Serialize for EntryRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.uindex())
    }
}

/// An object name as stored in the tables: a name table slot plus the
/// instance number.
///
/// The instance number is the entry's IndexValue. Zero means the object is
/// unindexed; `n > 0` renders as `Name_{n-1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectName {
    /// Index into the owning package's name table
    pub name: usize,
    /// Instance number (IndexValue)
    pub number: i32,
}

impl ObjectName {
    /// Name table slot plus instance number
    pub fn new(name: usize, number: i32) -> Self {
        Self { name, number }
    }
}

/// Render a name string with its instance suffix
pub fn instanced(name: &str, number: i32) -> String {
    if number > 0 {
        format!("{}_{}", name, number - 1)
    } else {
        name.to_string()
    }
}

/// A locally owned object with a serialized payload
#[derive(Debug, Clone, PartialEq)]
pub struct ExportEntry {
    /// Name and IndexValue
    pub object_name: ObjectName,
    /// Parent (outer) of this export
    pub link: EntryRef,
    /// Class of the object; [`EntryRef::Root`] marks a class definition
    pub class: EntryRef,
    /// Parent class, for class and struct definitions
    pub super_class: EntryRef,
    /// Weak same-kind reference, never an ownership edge
    pub archetype: EntryRef,
    /// Object flags, copied verbatim
    pub object_flags: u64,
    /// Export flags, copied verbatim
    pub export_flags: u32,
    /// Per-generation net object counts
    pub net_object_counts: Vec<i32>,
    /// GUID of a forced-export package
    pub package_guid: [u8; 16],
    /// Flags of a forced-export package
    pub package_flags: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) serial_offset: i32,
}

impl ExportEntry {
    /// Create an export with an empty payload
    pub fn new(object_name: ObjectName, link: EntryRef, class: EntryRef) -> Self {
        Self {
            object_name,
            link,
            class,
            super_class: EntryRef::Root,
            archetype: EntryRef::Root,
            object_flags: 0,
            export_flags: 0,
            net_object_counts: Vec::new(),
            package_guid: [0; 16],
            package_flags: 0,
            data: Vec::new(),
            serial_offset: 0,
        }
    }

    /// Serialized payload (header + properties + class binary)
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Offset of the payload in the file this export was read from
    #[inline]
    pub fn serial_offset(&self) -> i32 {
        self.serial_offset
    }

    /// Class definitions carry a root class reference
    #[inline]
    pub fn is_class(&self) -> bool {
        self.class.is_root()
    }
}

/// A reference to an object that lives in another package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportEntry {
    /// Package defining the object's class, e.g. `Engine`
    pub class_package: ObjectName,
    /// Class of the object, e.g. `StaticMesh`
    pub class_name: ObjectName,
    /// Parent (outer) of this import
    pub link: EntryRef,
    /// Name and IndexValue
    pub object_name: ObjectName,
}

#[derive(Debug, Clone, Copy)]
enum EntryBody<'a> {
    Export(&'a ExportEntry),
    Import(&'a ImportEntry),
}

/// Borrowed view of either kind of entry, tagged with its own reference
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    reference: EntryRef,
    body: EntryBody<'a>,
}

impl<'a> Entry<'a> {
    pub(crate) fn export(reference: EntryRef, export: &'a ExportEntry) -> Self {
        Self { reference, body: EntryBody::Export(export) }
    }

    pub(crate) fn import(reference: EntryRef, import: &'a ImportEntry) -> Self {
        Self { reference, body: EntryBody::Import(import) }
    }

    /// The reference this entry was fetched with
    #[inline]
    pub fn reference(&self) -> EntryRef {
        self.reference
    }

    /// Name and IndexValue, whatever the kind
    pub fn object_name(&self) -> ObjectName {
        match self.body {
            EntryBody::Export(e) => e.object_name,
            EntryBody::Import(i) => i.object_name,
        }
    }

    /// Parent link, whatever the kind
    pub fn link(&self) -> EntryRef {
        match self.body {
            EntryBody::Export(e) => e.link,
            EntryBody::Import(i) => i.link,
        }
    }

    /// The export record, if this is an export
    pub fn as_export(&self) -> Option<&'a ExportEntry> {
        match self.body {
            EntryBody::Export(e) => Some(e),
            EntryBody::Import(_) => None,
        }
    }

    /// The import record, if this is an import
    pub fn as_import(&self) -> Option<&'a ImportEntry> {
        match self.body {
            EntryBody::Import(i) => Some(i),
            EntryBody::Export(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uindex_encoding() {
        assert_eq!(EntryRef::from_uindex(0), EntryRef::Root);
        assert_eq!(EntryRef::from_uindex(5), EntryRef::Export(4));
        assert_eq!(EntryRef::from_uindex(-2), EntryRef::Import(1));

        for raw in [-40, -1, 0, 1, 77] {
            assert_eq!(EntryRef::from_uindex(raw).uindex(), raw);
        }
    }

    #[test]
    fn test_display_uses_uindex() {
        assert_eq!(EntryRef::Export(4).to_string(), "#5");
        assert_eq!(EntryRef::Import(1).to_string(), "#-2");
        assert_eq!(EntryRef::Root.to_string(), "#0");
    }

    #[test]
    fn test_instanced_names() {
        assert_eq!(instanced("Foo", 0), "Foo");
        assert_eq!(instanced("Foo", 1), "Foo_0");
        assert_eq!(instanced("Foo", 12), "Foo_11");
    }
}
