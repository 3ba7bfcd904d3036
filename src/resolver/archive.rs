//! Byte sources packages can be opened from
//!
//! Loading only needs a `Read`, so a plain directory and a compressed
//! container look the same to the resolver.

use crate::{Error, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::PathBuf;

/// A container of named entries, each readable as a byte stream
pub trait ArchiveSource: Send + Sync {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Whether `entry_id` (a file name, case-insensitive) is present
    fn contains(&self, entry_id: &str) -> bool;

    /// Open `entry_id` as a decompressed stream
    fn decompress(&self, entry_id: &str) -> Result<Box<dyn Read + Send>>;
}

/// Plain files in one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    label: String,
}

impl DirectorySource {
    /// Serve the files directly inside `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = root.display().to_string();
        Self { root, label }
    }

    fn locate(&self, entry_id: &str) -> Option<PathBuf> {
        let exact = self.root.join(entry_id);
        if exact.is_file() {
            return Some(exact);
        }
        // file systems may be case-sensitive; fall back to a scan
        std::fs::read_dir(&self.root)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| {
                p.is_file()
                    && p.file_name()
                        .map(|n| n.to_string_lossy().eq_ignore_ascii_case(entry_id))
                        .unwrap_or(false)
            })
    }
}

impl ArchiveSource for DirectorySource {
    fn name(&self) -> &str {
        &self.label
    }

    fn contains(&self, entry_id: &str) -> bool {
        self.locate(entry_id).is_some()
    }

    fn decompress(&self, entry_id: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.locate(entry_id).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found in {}", entry_id, self.label),
            ))
        })?;
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// In-memory archive whose entries are stored zlib-compressed
#[derive(Default)]
pub struct MemoryArchive {
    label: String,
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArchive {
    /// An empty archive called `label`
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), entries: RwLock::new(HashMap::new()) }
    }

    /// Compress and store `bytes` under `entry_id`
    pub fn insert(&self, entry_id: &str, bytes: &[u8]) -> Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes)?;
        let compressed = encoder.finish()?;
        self.entries.write().insert(entry_id.to_lowercase(), compressed);
        Ok(())
    }

    /// Stored entry count
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArchiveSource for MemoryArchive {
    fn name(&self) -> &str {
        &self.label
    }

    fn contains(&self, entry_id: &str) -> bool {
        self.entries.read().contains_key(&entry_id.to_lowercase())
    }

    fn decompress(&self, entry_id: &str) -> Result<Box<dyn Read + Send>> {
        let compressed = self
            .entries
            .read()
            .get(&entry_id.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::Decompression(format!("{} has no entry {}", self.label, entry_id)))?;
        Ok(Box::new(ZlibDecoder::new(Cursor::new(compressed))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_archive_streams_original_bytes() {
        let archive = MemoryArchive::new("DLC");
        archive.insert("Startup.pcc", b"package bytes").unwrap();
        assert!(archive.contains("startup.PCC"));
        assert!(!archive.contains("Engine.pcc"));

        let mut out = Vec::new();
        archive.decompress("STARTUP.pcc").unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"package bytes");
        assert!(matches!(archive.decompress("Engine.pcc"), Err(Error::Decompression(_))));
    }

    #[test]
    fn test_directory_source_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Engine.pcc"), b"abc").unwrap();
        let source = DirectorySource::new(dir.path());

        assert!(source.contains("engine.pcc"));
        let mut out = Vec::new();
        source.decompress("ENGINE.PCC").unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert!(source.decompress("Core.pcc").is_err());
    }
}
