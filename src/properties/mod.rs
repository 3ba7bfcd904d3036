//! Tagged property payloads
//!
//! An export payload (other than a class definition) is laid out as:
//!
//! ```text
//! [i32 net index][tag value]...[None][class-specific binary]
//! ```
//!
//! Each tag is `name, type, i32 size, i32 array index`, followed by a
//! type-specific extra (struct name, enum name, bool byte) and `size` bytes
//! of value. Names are decoded to strings so a collection can be written
//! back into a different package's name table.

use crate::config::ArrayElementKind;
use crate::entries::EntryRef;
use crate::format::{read_fstring, write_fstring};
use crate::package::Package;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

/// A decoded name reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameRef {
    /// Name text
    pub name: String,
    /// Instance number
    pub number: i32,
}

impl NameRef {
    /// Name text plus instance number
    pub fn new(name: impl Into<String>, number: i32) -> Self {
        Self { name: name.into(), number }
    }

    /// The `None` terminator name
    pub fn none() -> Self {
        Self::new("None", 0)
    }

    /// Whether this is `None` (case-insensitive)
    pub fn is_none(&self) -> bool {
        self.name.eq_ignore_ascii_case("None")
    }
}

/// Which object-valued property type a reference came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// `ObjectProperty`
    Object,
    /// `ComponentProperty`
    Component,
    /// `ClassProperty`
    Class,
    /// `InterfaceProperty`
    Interface,
}

impl ObjectKind {
    fn type_name(self) -> &'static str {
        match self {
            ObjectKind::Object => "ObjectProperty",
            ObjectKind::Component => "ComponentProperty",
            ObjectKind::Class => "ClassProperty",
            ObjectKind::Interface => "InterfaceProperty",
        }
    }
}

/// Payload of a `ByteProperty`
#[derive(Debug, Clone, PartialEq)]
pub enum ByteValue {
    /// Plain byte
    Raw(u8),
    /// Enum value stored by name
    Enum(NameRef),
}

/// Payload of a `StructProperty`
#[derive(Debug, Clone, PartialEq)]
pub enum StructBody {
    /// Nested tagged property list
    Tagged(Vec<Property>),
    /// Atomic struct stored as plain bytes
    Raw(Vec<u8>),
}

/// Payload of an `ArrayProperty`
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Object references
    Objects(Vec<EntryRef>),
    /// Names
    Names(Vec<NameRef>),
    /// Integers
    Ints(Vec<i32>),
    /// Tagged structs
    Structs(Vec<Vec<Property>>),
    /// Element layout unknown; kept verbatim
    Raw {
        /// Element count
        count: i32,
        /// Element bytes
        bytes: Vec<u8>,
    },
}

/// Decoded value of one property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// `IntProperty`
    Int(i32),
    /// `FloatProperty`
    Float(f32),
    /// `BoolProperty`
    Bool(bool),
    /// `ByteProperty`
    Byte {
        /// Enum type, `None` for a plain byte
        enum_name: NameRef,
        /// The value
        value: ByteValue,
    },
    /// `NameProperty`
    Name(NameRef),
    /// `StrProperty`
    Str(String),
    /// Any object-valued property
    Object {
        /// Declared property type
        kind: ObjectKind,
        /// Referenced entry
        target: EntryRef,
    },
    /// `DelegateProperty`
    Delegate {
        /// Object the function is bound on
        object: EntryRef,
        /// Function name
        function: NameRef,
    },
    /// `StructProperty`
    Struct {
        /// Struct type
        struct_name: NameRef,
        /// Struct contents
        body: StructBody,
    },
    /// `ArrayProperty`
    Array(ArrayValue),
    /// Property type this crate does not interpret
    Raw {
        /// Declared property type
        type_name: NameRef,
        /// Value bytes
        bytes: Vec<u8>,
    },
}

impl PropertyValue {
    fn type_name(&self) -> NameRef {
        let name = match self {
            PropertyValue::Int(_) => "IntProperty",
            PropertyValue::Float(_) => "FloatProperty",
            PropertyValue::Bool(_) => "BoolProperty",
            PropertyValue::Byte { .. } => "ByteProperty",
            PropertyValue::Name(_) => "NameProperty",
            PropertyValue::Str(_) => "StrProperty",
            PropertyValue::Object { kind, .. } => kind.type_name(),
            PropertyValue::Delegate { .. } => "DelegateProperty",
            PropertyValue::Struct { .. } => "StructProperty",
            PropertyValue::Array(_) => "ArrayProperty",
            PropertyValue::Raw { type_name, .. } => return type_name.clone(),
        };
        NameRef::new(name, 0)
    }
}

/// One tagged property
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name
    pub name: NameRef,
    /// Element index for static arrays
    pub array_index: i32,
    /// Decoded value
    pub value: PropertyValue,
}

impl Property {
    /// Property at array index 0
    pub fn new(name: &str, value: PropertyValue) -> Self {
        Self { name: NameRef::new(name, 0), array_index: 0, value }
    }

    /// `ObjectProperty` pointing at `target`
    pub fn object(name: &str, target: EntryRef) -> Self {
        Self::new(name, PropertyValue::Object { kind: ObjectKind::Object, target })
    }
}

/// A fully decoded export payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyCollection {
    /// Leading net index
    pub net_index: i32,
    /// Properties up to the `None` terminator
    pub properties: Vec<Property>,
    /// Class-specific binary after the property list, kept verbatim
    pub trailing: Vec<u8>,
}

impl PropertyCollection {
    /// Collection with no net index and no trailing bytes
    pub fn new(properties: Vec<Property>) -> Self {
        Self { net_index: 0, properties, trailing: Vec::new() }
    }

    /// Decode the payload of `export` using its package's name table
    pub fn decode(pkg: &Package, export: EntryRef) -> Result<Self> {
        let entry = pkg.get_export(export).ok_or(Error::EntryNotFound(export))?;
        if entry.is_class() {
            return Err(Error::UnparsedPayload {
                entry: export,
                reason: "class definitions carry no property list".into(),
            });
        }
        Self::decode_bytes(pkg, entry.data()).map_err(|e| match e {
            Error::UnparsedPayload { reason, .. } => Error::UnparsedPayload { entry: export, reason },
            other => Error::UnparsedPayload { entry: export, reason: other.to_string() },
        })
    }

    /// Decode raw payload bytes against `pkg`'s names
    pub fn decode_bytes(pkg: &Package, data: &[u8]) -> Result<Self> {
        let mut decoder = Decoder { cursor: Cursor::new(data), pkg };
        let net_index = decoder.cursor.read_i32::<LittleEndian>()?;
        let properties = decoder.read_properties()?;
        let mut trailing = Vec::new();
        decoder.cursor.read_to_end(&mut trailing)?;
        Ok(Self { net_index, properties, trailing })
    }

    /// Encode into `pkg`'s name table, adding any names it lacks
    pub fn encode(&self, pkg: &mut Package) -> Result<Vec<u8>> {
        let mut encoder = Encoder { out: Vec::new(), pkg };
        encoder.out.write_i32::<LittleEndian>(self.net_index)?;
        encoder.write_properties(&self.properties)?;
        encoder.out.extend_from_slice(&self.trailing);
        Ok(encoder.out)
    }

    /// Visit every object reference embedded in the properties
    pub fn for_each_ref_mut(&mut self, f: &mut dyn FnMut(&mut EntryRef)) {
        visit_refs_mut(&mut self.properties, f);
    }

    /// Every object reference together with the property path holding it
    pub fn references(&self) -> Vec<(String, EntryRef)> {
        let mut found = Vec::new();
        collect_refs(&self.properties, "", &mut found);
        found
    }

    /// First top-level property called `name` (case-insensitive)
    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name.name.eq_ignore_ascii_case(name))
    }
}

fn visit_refs_mut(properties: &mut [Property], f: &mut dyn FnMut(&mut EntryRef)) {
    for property in properties {
        match &mut property.value {
            PropertyValue::Object { target, .. } => f(target),
            PropertyValue::Delegate { object, .. } => f(object),
            PropertyValue::Struct { body: StructBody::Tagged(inner), .. } => visit_refs_mut(inner, f),
            PropertyValue::Array(ArrayValue::Objects(items)) => items.iter_mut().for_each(|r| f(r)),
            PropertyValue::Array(ArrayValue::Structs(items)) => {
                for inner in items {
                    visit_refs_mut(inner, f);
                }
            }
            _ => {}
        }
    }
}

fn collect_refs(properties: &[Property], prefix: &str, found: &mut Vec<(String, EntryRef)>) {
    for property in properties {
        let mut path = format!("{}{}", prefix, property.name.name);
        if property.array_index != 0 {
            path.push_str(&format!("[{}]", property.array_index));
        }
        match &property.value {
            PropertyValue::Object { target, .. } => found.push((path, *target)),
            PropertyValue::Delegate { object, .. } => found.push((path, *object)),
            PropertyValue::Struct { body: StructBody::Tagged(inner), .. } => {
                collect_refs(inner, &format!("{}.", path), found)
            }
            PropertyValue::Array(ArrayValue::Objects(items)) => {
                for (i, r) in items.iter().enumerate() {
                    found.push((format!("{}[{}]", path, i), *r));
                }
            }
            PropertyValue::Array(ArrayValue::Structs(items)) => {
                for (i, inner) in items.iter().enumerate() {
                    collect_refs(inner, &format!("{}[{}].", path, i), found);
                }
            }
            _ => {}
        }
    }
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::UnparsedPayload { entry: EntryRef::Root, reason: reason.into() }
}

struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
    pkg: &'a Package,
}

impl Decoder<'_> {
    fn read_name(&mut self) -> Result<NameRef> {
        let index = self.cursor.read_i32::<LittleEndian>()?;
        let number = self.cursor.read_i32::<LittleEndian>()?;
        let index = usize::try_from(index).map_err(|_| malformed(format!("negative name index {}", index)))?;
        Ok(NameRef::new(self.pkg.name(index)?, number))
    }

    fn read_ref(&mut self) -> Result<EntryRef> {
        Ok(EntryRef::from_uindex(self.cursor.read_i32::<LittleEndian>()?))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let remaining = self.cursor.get_ref().len() - self.cursor.position() as usize;
        if len > remaining {
            return Err(malformed(format!("value of {} bytes overruns payload", len)));
        }
        let mut bytes = vec![0u8; len];
        self.cursor.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn expect_consumed(&self, start: u64, size: i32, what: &NameRef) -> Result<()> {
        let consumed = self.cursor.position() - start;
        if consumed != size as u64 {
            return Err(malformed(format!(
                "{} declared {} bytes but used {}",
                what.name, size, consumed
            )));
        }
        Ok(())
    }

    fn read_properties(&mut self) -> Result<Vec<Property>> {
        let mut properties = Vec::new();
        loop {
            let name = self.read_name()?;
            if name.is_none() {
                return Ok(properties);
            }
            let type_name = self.read_name()?;
            let size = self.cursor.read_i32::<LittleEndian>()?;
            let array_index = self.cursor.read_i32::<LittleEndian>()?;
            if size < 0 {
                return Err(malformed(format!("{} has negative size", name.name)));
            }
            let value = self.read_value(&name, type_name, size)?;
            properties.push(Property { name, array_index, value });
        }
    }

    fn read_value(&mut self, name: &NameRef, type_name: NameRef, size: i32) -> Result<PropertyValue> {
        match type_name.name.as_str() {
            "BoolProperty" => {
                if size != 0 {
                    return Err(malformed("bool property with a value size"));
                }
                return Ok(PropertyValue::Bool(self.cursor.read_u8()? != 0));
            }
            "StructProperty" => {
                let struct_name = self.read_name()?;
                let start = self.cursor.position();
                let body = if self.pkg.config().is_immutable_struct(&struct_name.name) {
                    StructBody::Raw(self.read_bytes(size as usize)?)
                } else {
                    StructBody::Tagged(self.read_properties()?)
                };
                self.expect_consumed(start, size, name)?;
                return Ok(PropertyValue::Struct { struct_name, body });
            }
            "ByteProperty" => {
                let enum_name = self.read_name()?;
                let start = self.cursor.position();
                let value = if enum_name.is_none() {
                    ByteValue::Raw(self.cursor.read_u8()?)
                } else {
                    ByteValue::Enum(self.read_name()?)
                };
                self.expect_consumed(start, size, name)?;
                return Ok(PropertyValue::Byte { enum_name, value });
            }
            _ => {}
        }

        let start = self.cursor.position();
        let value = match type_name.name.as_str() {
            "IntProperty" => PropertyValue::Int(self.cursor.read_i32::<LittleEndian>()?),
            "FloatProperty" => PropertyValue::Float(self.cursor.read_f32::<LittleEndian>()?),
            "NameProperty" => PropertyValue::Name(self.read_name()?),
            "StrProperty" => PropertyValue::Str(read_fstring(&mut self.cursor)?),
            "ObjectProperty" => PropertyValue::Object { kind: ObjectKind::Object, target: self.read_ref()? },
            "ComponentProperty" => PropertyValue::Object { kind: ObjectKind::Component, target: self.read_ref()? },
            "ClassProperty" => PropertyValue::Object { kind: ObjectKind::Class, target: self.read_ref()? },
            "InterfaceProperty" => PropertyValue::Object { kind: ObjectKind::Interface, target: self.read_ref()? },
            "DelegateProperty" => {
                let object = self.read_ref()?;
                let function = self.read_name()?;
                PropertyValue::Delegate { object, function }
            }
            "ArrayProperty" => PropertyValue::Array(self.read_array(name, size)?),
            _ => PropertyValue::Raw { type_name, bytes: self.read_bytes(size as usize)? },
        };
        self.expect_consumed(start, size, name)?;
        Ok(value)
    }

    fn read_array(&mut self, name: &NameRef, size: i32) -> Result<ArrayValue> {
        let count = self.cursor.read_i32::<LittleEndian>()?;
        if count < 0 || size < 4 {
            return Err(malformed(format!("array {} has invalid length", name.name)));
        }
        let hint = self.pkg.config().array_hint(&name.name);
        let value = match hint {
            Some(ArrayElementKind::Object) => {
                ArrayValue::Objects((0..count).map(|_| self.read_ref()).collect::<Result<_>>()?)
            }
            Some(ArrayElementKind::Name) => {
                ArrayValue::Names((0..count).map(|_| self.read_name()).collect::<Result<_>>()?)
            }
            Some(ArrayElementKind::Int) => ArrayValue::Ints(
                (0..count)
                    .map(|_| Ok(self.cursor.read_i32::<LittleEndian>()?))
                    .collect::<Result<_>>()?,
            ),
            Some(ArrayElementKind::Struct) => {
                ArrayValue::Structs((0..count).map(|_| self.read_properties()).collect::<Result<_>>()?)
            }
            None => ArrayValue::Raw { count, bytes: self.read_bytes(size as usize - 4)? },
        };
        Ok(value)
    }
}

struct Encoder<'a> {
    out: Vec<u8>,
    pkg: &'a mut Package,
}

impl Encoder<'_> {
    fn write_name(&mut self, name: &NameRef) -> Result<()> {
        let index = self.pkg.find_or_add_name(&name.name);
        self.out.write_i32::<LittleEndian>(index as i32)?;
        self.out.write_i32::<LittleEndian>(name.number)?;
        Ok(())
    }

    fn write_ref(&mut self, r: EntryRef) -> Result<()> {
        self.out.write_i32::<LittleEndian>(r.uindex())?;
        Ok(())
    }

    fn write_properties(&mut self, properties: &[Property]) -> Result<()> {
        for property in properties {
            self.write_property(property)?;
        }
        self.write_name(&NameRef::none())
    }

    /// Encode `value` into a scratch buffer to learn its size
    fn encode_value(&mut self, value: &PropertyValue) -> Result<Vec<u8>> {
        let mut inner = Encoder { out: Vec::new(), pkg: &mut *self.pkg };
        inner.write_value(value)?;
        Ok(inner.out)
    }

    fn write_property(&mut self, property: &Property) -> Result<()> {
        self.write_name(&property.name)?;
        self.write_name(&property.value.type_name())?;

        let value = match &property.value {
            PropertyValue::Bool(b) => {
                self.out.write_i32::<LittleEndian>(0)?;
                self.out.write_i32::<LittleEndian>(property.array_index)?;
                self.out.write_u8(u8::from(*b))?;
                return Ok(());
            }
            other => self.encode_value(other)?,
        };

        self.out.write_i32::<LittleEndian>(value.len() as i32)?;
        self.out.write_i32::<LittleEndian>(property.array_index)?;
        match &property.value {
            PropertyValue::Struct { struct_name, .. } => self.write_name(struct_name)?,
            PropertyValue::Byte { enum_name, .. } => self.write_name(enum_name)?,
            _ => {}
        }
        self.out.extend_from_slice(&value);
        Ok(())
    }

    fn write_value(&mut self, value: &PropertyValue) -> Result<()> {
        match value {
            PropertyValue::Int(v) => self.out.write_i32::<LittleEndian>(*v)?,
            PropertyValue::Float(v) => self.out.write_f32::<LittleEndian>(*v)?,
            PropertyValue::Bool(b) => self.out.write_u8(u8::from(*b))?,
            PropertyValue::Byte { value, .. } => match value {
                ByteValue::Raw(b) => self.out.write_u8(*b)?,
                ByteValue::Enum(name) => self.write_name(name)?,
            },
            PropertyValue::Name(name) => self.write_name(name)?,
            PropertyValue::Str(s) => write_fstring(&mut self.out, s)?,
            PropertyValue::Object { target, .. } => self.write_ref(*target)?,
            PropertyValue::Delegate { object, function } => {
                self.write_ref(*object)?;
                self.write_name(function)?;
            }
            PropertyValue::Struct { body, .. } => match body {
                StructBody::Tagged(inner) => self.write_properties(inner)?,
                StructBody::Raw(bytes) => self.out.extend_from_slice(bytes),
            },
            PropertyValue::Array(array) => self.write_array(array)?,
            PropertyValue::Raw { bytes, .. } => self.out.extend_from_slice(bytes),
        }
        Ok(())
    }

    fn write_array(&mut self, array: &ArrayValue) -> Result<()> {
        match array {
            ArrayValue::Objects(items) => {
                self.out.write_i32::<LittleEndian>(items.len() as i32)?;
                for r in items {
                    self.write_ref(*r)?;
                }
            }
            ArrayValue::Names(items) => {
                self.out.write_i32::<LittleEndian>(items.len() as i32)?;
                for name in items {
                    self.write_name(name)?;
                }
            }
            ArrayValue::Ints(items) => {
                self.out.write_i32::<LittleEndian>(items.len() as i32)?;
                for v in items {
                    self.out.write_i32::<LittleEndian>(*v)?;
                }
            }
            ArrayValue::Structs(items) => {
                self.out.write_i32::<LittleEndian>(items.len() as i32)?;
                for inner in items {
                    self.write_properties(inner)?;
                }
            }
            ArrayValue::Raw { count, bytes } => {
                self.out.write_i32::<LittleEndian>(*count)?;
                self.out.extend_from_slice(bytes);
            }
        }
        Ok(())
    }
}
