//! On-disk package format
//!
//! All values are little-endian. The layout written by [`crate::Package`] is:
//!
//! ```text
//! [header][name table][import table][export table][depends table][export payloads]
//! ```
//!
//! Compressed packages keep the header uncompressed and store the rest as
//! zlib chunks described by the header's chunk table.

pub mod compression;
pub mod header;
pub mod records;

pub use header::{CompressedChunk, Generation, PackageHeader};

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Package file signature
pub const PACKAGE_MAGIC: u32 = 0x9E2A83C1;

/// Longest string accepted by the reader, in characters
const MAX_STRING_LEN: i32 = 0x0010_0000;

/// Build a structural corruption error
pub(crate) fn corrupt(reason: impl Into<String>) -> Error {
    Error::StructuralCorruption { reason: reason.into() }
}

/// Read a length-prefixed string.
///
/// Positive lengths are Latin-1 bytes, negative lengths UTF-16 code units;
/// both counts include the trailing NUL.
pub fn read_fstring<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_i32::<LittleEndian>()?;
    if len == 0 {
        return Ok(String::new());
    }
    if len.unsigned_abs() > MAX_STRING_LEN as u32 {
        return Err(corrupt(format!("string length {} out of range", len)));
    }

    if len > 0 {
        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;
        if bytes.pop() != Some(0) {
            return Err(corrupt("string is not NUL terminated"));
        }
        Ok(bytes.into_iter().map(char::from).collect())
    } else {
        let count = (-len) as usize;
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            units.push(reader.read_u16::<LittleEndian>()?);
        }
        if units.pop() != Some(0) {
            return Err(corrupt("wide string is not NUL terminated"));
        }
        String::from_utf16(&units).map_err(|e| corrupt(format!("invalid UTF-16 string: {}", e)))
    }
}

/// Write a string, choosing Latin-1 when every char fits in a byte
pub fn write_fstring<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    if value.is_empty() {
        writer.write_i32::<LittleEndian>(0)?;
        return Ok(());
    }

    if value.chars().all(|c| (c as u32) <= 0xFF) {
        let len = value.chars().count() + 1;
        writer.write_i32::<LittleEndian>(len as i32)?;
        for c in value.chars() {
            writer.write_u8(c as u8)?;
        }
        writer.write_u8(0)?;
    } else {
        let units: Vec<u16> = value.encode_utf16().collect();
        writer.write_i32::<LittleEndian>(-((units.len() + 1) as i32))?;
        for unit in units {
            writer.write_u16::<LittleEndian>(unit)?;
        }
        writer.write_u16::<LittleEndian>(0)?;
    }
    Ok(())
}
