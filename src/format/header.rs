//! Package summary (file header)

use super::{corrupt, read_fstring, write_fstring, PACKAGE_MAGIC};
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAX_TABLE_ENTRIES: i32 = 0x0100_0000;

/// One row of the generation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Generation {
    /// Exports in that generation
    pub export_count: i32,
    /// Names in that generation
    pub name_count: i32,
    /// Net objects in that generation
    pub net_object_count: i32,
}

/// One row of the compressed chunk table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressedChunk {
    /// Where the inflated bytes go in the package image
    pub uncompressed_offset: i32,
    /// Inflated length
    pub uncompressed_size: i32,
    /// Where the zlib block starts in the file
    pub compressed_offset: i32,
    /// zlib block length
    pub compressed_size: i32,
}

/// Package summary at the start of every file
#[derive(Debug, Clone, PartialEq)]
pub struct PackageHeader {
    /// Engine file version
    pub file_version: u16,
    /// Licensee file version
    pub licensee_version: u16,
    /// Offset of the first export payload
    pub header_size: i32,
    /// Folder the package was cooked from
    pub folder_name: String,
    /// Package flags, copied verbatim
    pub package_flags: u32,
    /// Name table length
    pub name_count: i32,
    /// Name table position
    pub name_offset: i32,
    /// Export table length
    pub export_count: i32,
    /// Export table position
    pub export_offset: i32,
    /// Import table length
    pub import_count: i32,
    /// Import table position
    pub import_offset: i32,
    /// Depends table position, 0 when absent
    pub depends_offset: i32,
    /// Package GUID
    pub guid: [u8; 16],
    /// Generation table; the last row describes the current save
    pub generations: Vec<Generation>,
    /// Engine build
    pub engine_version: i32,
    /// Cooker build
    pub cooker_version: i32,
    /// Compression method, 0 for none
    pub compression_flags: u32,
    /// Compressed chunk table; empty when uncompressed
    pub chunks: Vec<CompressedChunk>,
    /// Source checksum, copied verbatim
    pub package_source: u32,
    /// Packages to load alongside this one
    pub additional_packages: Vec<String>,
}

impl Default for PackageHeader {
    fn default() -> Self {
        Self {
            file_version: 684,
            licensee_version: 194,
            header_size: 0,
            folder_name: "None".to_string(),
            package_flags: 0,
            name_count: 0,
            name_offset: 0,
            export_count: 0,
            export_offset: 0,
            import_count: 0,
            import_offset: 0,
            depends_offset: 0,
            guid: [0; 16],
            generations: vec![Generation::default()],
            engine_version: 6383,
            cooker_version: 196_715,
            compression_flags: 0,
            chunks: Vec::new(),
            package_source: 0,
            additional_packages: Vec::new(),
        }
    }
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<i32> {
    let count = reader.read_i32::<LittleEndian>()?;
    if !(0..=MAX_TABLE_ENTRIES).contains(&count) {
        return Err(corrupt(format!("{} count {} out of range", what, count)));
    }
    Ok(count)
}

impl PackageHeader {
    /// Read and sanity-check a header
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != PACKAGE_MAGIC {
            return Err(corrupt(format!("bad package magic 0x{:08X}", magic)));
        }

        let file_version = reader.read_u16::<LittleEndian>()?;
        let licensee_version = reader.read_u16::<LittleEndian>()?;
        let header_size = reader.read_i32::<LittleEndian>()?;
        let folder_name = read_fstring(reader)?;
        let package_flags = reader.read_u32::<LittleEndian>()?;

        let name_count = read_count(reader, "name")?;
        let name_offset = reader.read_i32::<LittleEndian>()?;
        let export_count = read_count(reader, "export")?;
        let export_offset = reader.read_i32::<LittleEndian>()?;
        let import_count = read_count(reader, "import")?;
        let import_offset = reader.read_i32::<LittleEndian>()?;
        let depends_offset = reader.read_i32::<LittleEndian>()?;

        let mut guid = [0u8; 16];
        reader.read_exact(&mut guid)?;

        let generation_count = read_count(reader, "generation")?;
        let mut generations = Vec::with_capacity(generation_count as usize);
        for _ in 0..generation_count {
            generations.push(Generation {
                export_count: reader.read_i32::<LittleEndian>()?,
                name_count: reader.read_i32::<LittleEndian>()?,
                net_object_count: reader.read_i32::<LittleEndian>()?,
            });
        }

        let engine_version = reader.read_i32::<LittleEndian>()?;
        let cooker_version = reader.read_i32::<LittleEndian>()?;

        let compression_flags = reader.read_u32::<LittleEndian>()?;
        let chunk_count = read_count(reader, "chunk")?;
        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for _ in 0..chunk_count {
            chunks.push(CompressedChunk {
                uncompressed_offset: reader.read_i32::<LittleEndian>()?,
                uncompressed_size: reader.read_i32::<LittleEndian>()?,
                compressed_offset: reader.read_i32::<LittleEndian>()?,
                compressed_size: reader.read_i32::<LittleEndian>()?,
            });
        }

        let package_source = reader.read_u32::<LittleEndian>()?;
        let additional_count = read_count(reader, "additional package")?;
        let mut additional_packages = Vec::with_capacity(additional_count as usize);
        for _ in 0..additional_count {
            additional_packages.push(read_fstring(reader)?);
        }

        Ok(Self {
            file_version,
            licensee_version,
            header_size,
            folder_name,
            package_flags,
            name_count,
            name_offset,
            export_count,
            export_offset,
            import_count,
            import_offset,
            depends_offset,
            guid,
            generations,
            engine_version,
            cooker_version,
            compression_flags,
            chunks,
            package_source,
            additional_packages,
        })
    }

    /// Write the header as read by [`PackageHeader::read`]
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(PACKAGE_MAGIC)?;
        writer.write_u16::<LittleEndian>(self.file_version)?;
        writer.write_u16::<LittleEndian>(self.licensee_version)?;
        writer.write_i32::<LittleEndian>(self.header_size)?;
        write_fstring(writer, &self.folder_name)?;
        writer.write_u32::<LittleEndian>(self.package_flags)?;

        for value in [
            self.name_count,
            self.name_offset,
            self.export_count,
            self.export_offset,
            self.import_count,
            self.import_offset,
            self.depends_offset,
        ] {
            writer.write_i32::<LittleEndian>(value)?;
        }
        writer.write_all(&self.guid)?;

        writer.write_i32::<LittleEndian>(self.generations.len() as i32)?;
        for gen in &self.generations {
            writer.write_i32::<LittleEndian>(gen.export_count)?;
            writer.write_i32::<LittleEndian>(gen.name_count)?;
            writer.write_i32::<LittleEndian>(gen.net_object_count)?;
        }

        writer.write_i32::<LittleEndian>(self.engine_version)?;
        writer.write_i32::<LittleEndian>(self.cooker_version)?;

        writer.write_u32::<LittleEndian>(self.compression_flags)?;
        writer.write_i32::<LittleEndian>(self.chunks.len() as i32)?;
        for chunk in &self.chunks {
            writer.write_i32::<LittleEndian>(chunk.uncompressed_offset)?;
            writer.write_i32::<LittleEndian>(chunk.uncompressed_size)?;
            writer.write_i32::<LittleEndian>(chunk.compressed_offset)?;
            writer.write_i32::<LittleEndian>(chunk.compressed_size)?;
        }

        writer.write_u32::<LittleEndian>(self.package_source)?;
        writer.write_i32::<LittleEndian>(self.additional_packages.len() as i32)?;
        for name in &self.additional_packages {
            write_fstring(writer, name)?;
        }
        Ok(())
    }

    /// Serialized size. Offsets are fixed width, so this does not depend on
    /// their values.
    pub fn encoded_len(&self) -> Result<usize> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf.len())
    }

    /// Whether the body is stored as zlib chunks
    pub fn is_compressed(&self) -> bool {
        !self.chunks.is_empty()
    }
}
