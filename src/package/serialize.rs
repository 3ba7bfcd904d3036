//! Loading and saving packages

use super::Package;
use crate::changes::ChangeLog;
use crate::config::EngineConfig;
use crate::format::compression::{deflate_body, inflate_package, single_chunk, COMPRESS_ZLIB};
use crate::format::records::{export_record_len, read_export, write_export, RawImportRecord};
use crate::format::{corrupt, read_fstring, write_fstring, CompressedChunk, PackageHeader};
use crate::names::NameTable;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Options applied when writing a package.
///
/// Saving always lays the file out the same way: header, name table,
/// import table, export table, depends table, then payloads in export
/// order. `header_size`, every table offset, each export's serial offset,
/// the counts, the newest generation and the chunk table are rewritten to
/// match. A package loaded from that layout saves back byte for byte; one
/// from any other layout (padding, reordered tables, trailing data) is
/// normalized on save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Store everything after the header as one zlib chunk
    pub compress: bool,
    /// Give the package a fresh GUID
    pub regenerate_guid: bool,
}

fn seek_to(cursor: &mut Cursor<&[u8]>, offset: i32, what: &str) -> Result<()> {
    let len = cursor.get_ref().len();
    match usize::try_from(offset) {
        Ok(pos) if pos <= len => {
            cursor.seek(SeekFrom::Start(pos as u64))?;
            Ok(())
        }
        _ => Err(corrupt(format!("{} offset {} outside the package", what, offset))),
    }
}

impl Package {
    /// Read a package file with the default configuration
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_config(path, Arc::new(EngineConfig::default()))
    }

    /// Read a package file
    pub fn load_with_config(path: impl AsRef<Path>, config: Arc<EngineConfig>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut package = Self::from_bytes(&bytes, config)?;
        package.set_file_path(Some(path.to_path_buf()));
        info!(
            path = %path.display(),
            exports = package.export_count(),
            imports = package.import_count(),
            "loaded package"
        );
        Ok(package)
    }

    /// Load from any byte stream: a file, an archive entry, memory
    pub fn from_reader<R: Read>(mut reader: R, config: Arc<EngineConfig>) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes, config)
    }

    /// Parse a whole package image. Any structural problem, truncation
    /// included, is reported as [`Error::StructuralCorruption`].
    pub fn from_bytes(bytes: &[u8], config: Arc<EngineConfig>) -> Result<Self> {
        Self::parse(bytes, config).map_err(|e| match e {
            Error::Io(io) => corrupt(format!("truncated package: {}", io)),
            other => other,
        })
    }

    fn parse(bytes: &[u8], config: Arc<EngineConfig>) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let header = PackageHeader::read(&mut cursor)?;
        let header_len = cursor.position() as usize;

        let image: Cow<'_, [u8]> = if header.is_compressed() {
            debug!(chunks = header.chunks.len(), "inflating compressed package");
            Cow::Owned(inflate_package(bytes, &header, header_len)?)
        } else {
            Cow::Borrowed(bytes)
        };
        let mut cursor = Cursor::new(image.as_ref());

        seek_to(&mut cursor, header.name_offset, "name table")?;
        let mut names = Vec::with_capacity(header.name_count as usize);
        for _ in 0..header.name_count {
            names.push(read_fstring(&mut cursor)?);
        }

        seek_to(&mut cursor, header.import_offset, "import table")?;
        let mut imports = Vec::with_capacity(header.import_count as usize);
        for _ in 0..header.import_count {
            imports.push(RawImportRecord::read(&mut cursor)?.into_entry()?);
        }

        seek_to(&mut cursor, header.export_offset, "export table")?;
        let mut records = Vec::with_capacity(header.export_count as usize);
        for _ in 0..header.export_count {
            records.push(read_export(&mut cursor)?);
        }

        let mut depends = vec![0; header.export_count as usize];
        if header.depends_offset > 0 {
            seek_to(&mut cursor, header.depends_offset, "depends table")?;
            for slot in depends.iter_mut() {
                *slot = cursor.read_i32::<LittleEndian>()?;
            }
        }

        let mut exports = Vec::with_capacity(records.len());
        for (i, mut record) in records.into_iter().enumerate() {
            let start = record.entry.serial_offset as usize;
            let end = start + record.data_size as usize;
            if end > image.len() {
                return Err(corrupt(format!("payload of export #{} runs past the end of the file", i + 1)));
            }
            record.entry.data = image[start..end].to_vec();
            exports.push(record.entry);
        }

        let package = Package {
            header,
            names: NameTable::from_names(names),
            imports,
            exports,
            depends,
            file_path: None,
            config,
            changes: ChangeLog::default(),
            observers: Vec::new(),
        };
        package.validate_structure()?;
        Ok(package)
    }

    /// Write the package to `path` and remember it as the file path
    pub fn save(&mut self, path: impl AsRef<Path>, options: SaveOptions) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(options)?;
        std::fs::write(path, &bytes)?;
        self.set_file_path(Some(path.to_path_buf()));
        info!(path = %path.display(), bytes = bytes.len(), compressed = options.compress, "saved package");
        Ok(())
    }

    /// Serialize the package. Offsets, counts, the newest generation and
    /// the compression table are regenerated.
    pub fn to_bytes(&mut self, options: SaveOptions) -> Result<Vec<u8>> {
        if options.regenerate_guid {
            self.header.guid = *uuid::Uuid::new_v4().as_bytes();
        }
        if let Some(generation) = self.header.generations.last_mut() {
            generation.export_count = self.exports.len() as i32;
            generation.name_count = self.names.len() as i32;
        }
        self.header.name_count = self.names.len() as i32;
        self.header.import_count = self.imports.len() as i32;
        self.header.export_count = self.exports.len() as i32;
        if options.compress {
            self.header.compression_flags = COMPRESS_ZLIB;
            self.header.chunks = vec![CompressedChunk::default()];
        } else {
            self.header.compression_flags = 0;
            self.header.chunks.clear();
        }
        self.depends.resize(self.exports.len(), 0);

        let header_len = self.header.encoded_len()?;
        let offset = |body: &Vec<u8>| (header_len + body.len()) as i32;
        let mut body = Vec::new();

        self.header.name_offset = offset(&body);
        for name in self.names.iter() {
            write_fstring(&mut body, name)?;
        }

        self.header.import_offset = offset(&body);
        for import in &self.imports {
            RawImportRecord::from_entry(import).write(&mut body)?;
        }

        self.header.export_offset = offset(&body);
        let table_len: usize = self.exports.iter().map(export_record_len).sum();
        self.header.depends_offset = self.header.export_offset + table_len as i32;
        let mut data_offset = self.header.depends_offset + (self.depends.len() * 4) as i32;
        self.header.header_size = data_offset;

        for export in self.exports.iter_mut() {
            export.serial_offset = data_offset;
            data_offset += export.data.len() as i32;
        }
        for export in &self.exports {
            write_export(&mut body, export, export.serial_offset)?;
        }
        for value in &self.depends {
            body.write_i32::<LittleEndian>(*value)?;
        }
        for export in &self.exports {
            body.extend_from_slice(&export.data);
        }

        let payload = if options.compress {
            let compressed = deflate_body(&body)?;
            self.header.chunks = vec![single_chunk(header_len, body.len(), compressed.len())];
            compressed
        } else {
            body
        };

        let mut out = Vec::with_capacity(header_len + payload.len());
        self.header.write(&mut out)?;
        debug_assert_eq!(out.len(), header_len);
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntryRef;
    use crate::fixtures;
    use tempfile::tempdir;

    #[test]
    fn test_unmodified_roundtrip_is_byte_identical() {
        let mut pkg = fixtures::sample_package();
        let first = pkg.to_bytes(SaveOptions::default()).unwrap();

        let mut loaded = Package::from_bytes(&first, pkg.config().clone()).unwrap();
        let second = loaded.to_bytes(SaveOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_foreign_layout_is_normalized() {
        let mut pkg = fixtures::sample_package();
        let canonical = pkg.to_bytes(SaveOptions::default()).unwrap();

        let mut padded = canonical.clone();
        padded.extend_from_slice(&[0xAB; 16]);
        let mut loaded = Package::from_bytes(&padded, pkg.config().clone()).unwrap();
        assert_eq!(loaded.export_count(), pkg.export_count());

        let saved = loaded.to_bytes(SaveOptions::default()).unwrap();
        assert_ne!(saved, padded);
        assert_eq!(saved, canonical);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let mut pkg = fixtures::sample_package();
        let plain = pkg.to_bytes(SaveOptions::default()).unwrap();
        let compressed = pkg.to_bytes(SaveOptions { compress: true, ..SaveOptions::default() }).unwrap();

        let mut loaded = Package::from_bytes(&compressed, pkg.config().clone()).unwrap();
        assert!(loaded.header().is_compressed());
        assert_eq!(loaded.export_count(), pkg.export_count());
        for r in pkg.entry_refs() {
            assert_eq!(loaded.instanced_full_path(r), pkg.instanced_full_path(r));
        }
        assert_eq!(loaded.exports()[0].data(), pkg.exports()[0].data());

        // saving uncompressed drops the chunk table again
        assert_eq!(loaded.to_bytes(SaveOptions::default()).unwrap(), plain);
    }

    #[test]
    fn test_regenerate_guid() {
        let mut pkg = fixtures::sample_package();
        let before = pkg.header().guid;
        pkg.to_bytes(SaveOptions { regenerate_guid: true, ..SaveOptions::default() }).unwrap();
        assert_ne!(pkg.header().guid, before);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("BioD_Test.pcc");

        let mut pkg = fixtures::sample_package();
        pkg.save(&path, SaveOptions::default()).unwrap();

        let loaded = Package::load(&path).unwrap();
        assert_eq!(loaded.file_name().as_deref(), Some("BioD_Test.pcc"));
        assert_eq!(loaded.import_count(), pkg.import_count());
        assert_eq!(loaded.header().generations.last().unwrap().export_count, pkg.export_count() as i32);
    }

    #[test]
    fn test_truncated_package_is_corrupt() {
        let mut pkg = fixtures::sample_package();
        let bytes = pkg.to_bytes(SaveOptions::default()).unwrap();
        let result = Package::from_bytes(&bytes[..bytes.len() / 2], pkg.config().clone());
        assert!(matches!(result, Err(Error::StructuralCorruption { .. })));
    }

    #[test]
    fn test_orphan_link_fails_load() {
        let mut pkg = fixtures::sample_package();
        let mut bytes = pkg.to_bytes(SaveOptions::default()).unwrap();

        // point the first import at an export slot that does not exist
        let link_at = pkg.header().import_offset as usize + 16;
        bytes[link_at..link_at + 4].copy_from_slice(&500i32.to_le_bytes());

        let result = Package::from_bytes(&bytes, pkg.config().clone());
        assert!(matches!(result, Err(Error::StructuralCorruption { .. })));
        assert_eq!(EntryRef::from_uindex(500), EntryRef::Export(499));
    }
}
