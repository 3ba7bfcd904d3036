//! Import and export table records

use super::corrupt;
use crate::entries::{EntryRef, ExportEntry, ImportEntry, ObjectName};
use crate::Result;
use bytemuck::{Pod, Zeroable};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAX_NET_OBJECT_COUNTS: i32 = 0x1000;

fn name_index(raw: i32) -> Result<usize> {
    usize::try_from(raw).map_err(|_| corrupt(format!("negative name index {}", raw)))
}

/// Fixed 28-byte import record, read straight out of the table
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct RawImportRecord {
    class_package: i32,
    class_package_number: i32,
    class_name: i32,
    class_name_number: i32,
    link: i32,
    object_name: i32,
    object_name_number: i32,
}

impl RawImportRecord {
    pub(crate) const SIZE: usize = std::mem::size_of::<Self>();

    /// Swap every field between file order and host order
    fn swap_le(self) -> Self {
        Self {
            class_package: i32::from_le(self.class_package),
            class_package_number: i32::from_le(self.class_package_number),
            class_name: i32::from_le(self.class_name),
            class_name_number: i32::from_le(self.class_name_number),
            link: i32::from_le(self.link),
            object_name: i32::from_le(self.object_name),
            object_name_number: i32::from_le(self.object_name_number),
        }
    }

    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        let raw: Self = bytemuck::pod_read_unaligned(&buf);
        Ok(raw.swap_le())
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let le = self.swap_le();
        writer.write_all(bytemuck::bytes_of(&le))?;
        Ok(())
    }

    pub(crate) fn into_entry(self) -> Result<ImportEntry> {
        Ok(ImportEntry {
            class_package: ObjectName::new(name_index(self.class_package)?, self.class_package_number),
            class_name: ObjectName::new(name_index(self.class_name)?, self.class_name_number),
            link: EntryRef::from_uindex(self.link),
            object_name: ObjectName::new(name_index(self.object_name)?, self.object_name_number),
        })
    }

    pub(crate) fn from_entry(entry: &ImportEntry) -> Self {
        Self {
            class_package: entry.class_package.name as i32,
            class_package_number: entry.class_package.number,
            class_name: entry.class_name.name as i32,
            class_name_number: entry.class_name.number,
            link: entry.link.uindex(),
            object_name: entry.object_name.name as i32,
            object_name_number: entry.object_name.number,
        }
    }
}

/// Export record header as read from the table. The payload itself is
/// attached later from the data region.
pub(crate) struct ExportRecord {
    pub entry: ExportEntry,
    pub data_size: i32,
}

pub(crate) fn read_export<R: Read>(reader: &mut R) -> Result<ExportRecord> {
    let class = EntryRef::from_uindex(reader.read_i32::<LittleEndian>()?);
    let super_class = EntryRef::from_uindex(reader.read_i32::<LittleEndian>()?);
    let link = EntryRef::from_uindex(reader.read_i32::<LittleEndian>()?);
    let name = name_index(reader.read_i32::<LittleEndian>()?)?;
    let number = reader.read_i32::<LittleEndian>()?;
    let archetype = EntryRef::from_uindex(reader.read_i32::<LittleEndian>()?);
    let object_flags = reader.read_u64::<LittleEndian>()?;
    let data_size = reader.read_i32::<LittleEndian>()?;
    let data_offset = reader.read_i32::<LittleEndian>()?;
    let export_flags = reader.read_u32::<LittleEndian>()?;

    let net_count = reader.read_i32::<LittleEndian>()?;
    if !(0..=MAX_NET_OBJECT_COUNTS).contains(&net_count) {
        return Err(corrupt(format!("net object count {} out of range", net_count)));
    }
    let mut net_object_counts = Vec::with_capacity(net_count as usize);
    for _ in 0..net_count {
        net_object_counts.push(reader.read_i32::<LittleEndian>()?);
    }

    let mut package_guid = [0u8; 16];
    reader.read_exact(&mut package_guid)?;
    let package_flags = reader.read_u32::<LittleEndian>()?;

    if data_size < 0 || data_offset < 0 {
        return Err(corrupt(format!(
            "export payload offset {} / size {} invalid",
            data_offset, data_size
        )));
    }

    Ok(ExportRecord {
        entry: ExportEntry {
            object_name: ObjectName::new(name, number),
            link,
            class,
            super_class,
            archetype,
            object_flags,
            export_flags,
            net_object_counts,
            package_guid,
            package_flags,
            data: Vec::new(),
            serial_offset: data_offset,
        },
        data_size,
    })
}

/// Write one export record; `data_offset` is where its payload will land
pub(crate) fn write_export<W: Write>(writer: &mut W, export: &ExportEntry, data_offset: i32) -> Result<()> {
    writer.write_i32::<LittleEndian>(export.class.uindex())?;
    writer.write_i32::<LittleEndian>(export.super_class.uindex())?;
    writer.write_i32::<LittleEndian>(export.link.uindex())?;
    writer.write_i32::<LittleEndian>(export.object_name.name as i32)?;
    writer.write_i32::<LittleEndian>(export.object_name.number)?;
    writer.write_i32::<LittleEndian>(export.archetype.uindex())?;
    writer.write_u64::<LittleEndian>(export.object_flags)?;
    writer.write_i32::<LittleEndian>(export.data.len() as i32)?;
    writer.write_i32::<LittleEndian>(data_offset)?;
    writer.write_u32::<LittleEndian>(export.export_flags)?;
    writer.write_i32::<LittleEndian>(export.net_object_counts.len() as i32)?;
    for count in &export.net_object_counts {
        writer.write_i32::<LittleEndian>(*count)?;
    }
    writer.write_all(&export.package_guid)?;
    writer.write_u32::<LittleEndian>(export.package_flags)?;
    Ok(())
}

/// Size of an export record on disk
pub(crate) fn export_record_len(export: &ExportEntry) -> usize {
    // 6 i32 + u64 + 2 i32 + u32 + i32 count + counts + guid + u32
    6 * 4 + 8 + 2 * 4 + 4 + 4 + export.net_object_counts.len() * 4 + 16 + 4
}
