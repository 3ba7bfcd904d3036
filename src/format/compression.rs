//! Zlib chunk handling for compressed packages

use super::{corrupt, CompressedChunk, PackageHeader};
use crate::{Error, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Chunks are zlib streams
pub const COMPRESS_ZLIB: u32 = 0x1;

/// Rebuild the uncompressed image of a package file.
///
/// The header region is copied as-is; every chunk is inflated into place.
pub fn inflate_package(file: &[u8], header: &PackageHeader, header_len: usize) -> Result<Vec<u8>> {
    if header.compression_flags & !COMPRESS_ZLIB != 0 {
        return Err(Error::Decompression(format!(
            "unsupported compression flags 0x{:X}",
            header.compression_flags
        )));
    }

    if header_len > file.len() {
        return Err(corrupt("package is shorter than its header"));
    }

    let image_len = header
        .chunks
        .iter()
        .map(|c| c.uncompressed_offset as i64 + c.uncompressed_size as i64)
        .max()
        .unwrap_or(0)
        .max(header_len as i64);
    if image_len < 0 || image_len > i32::MAX as i64 {
        return Err(corrupt("compressed chunk table describes an impossible image"));
    }

    let mut image = vec![0u8; image_len as usize];
    image[..header_len].copy_from_slice(&file[..header_len]);

    for (i, chunk) in header.chunks.iter().enumerate() {
        let src = chunk_range(chunk.compressed_offset, chunk.compressed_size, file.len())
            .ok_or_else(|| corrupt(format!("compressed chunk {} lies outside the file", i)))?;
        let dst = chunk_range(chunk.uncompressed_offset, chunk.uncompressed_size, image.len())
            .ok_or_else(|| corrupt(format!("chunk {} has an invalid target range", i)))?;

        let mut inflated = Vec::with_capacity(dst.len());
        ZlibDecoder::new(&file[src])
            .read_to_end(&mut inflated)
            .map_err(|e| Error::Decompression(format!("chunk {}: {}", i, e)))?;
        if inflated.len() != dst.len() {
            return Err(Error::Decompression(format!(
                "chunk {} inflated to {} bytes, expected {}",
                i,
                inflated.len(),
                dst.len()
            )));
        }
        image[dst].copy_from_slice(&inflated);
    }

    Ok(image)
}

fn chunk_range(offset: i32, size: i32, limit: usize) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let len = usize::try_from(size).ok()?;
    let end = start.checked_add(len)?;
    (end <= limit).then_some(start..end)
}

/// Compress `body` (everything after the header) into one zlib chunk
pub fn deflate_body(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

/// Chunk row describing a body compressed right after the header
pub fn single_chunk(header_len: usize, body_len: usize, compressed_len: usize) -> CompressedChunk {
    CompressedChunk {
        uncompressed_offset: header_len as i32,
        uncompressed_size: body_len as i32,
        compressed_offset: header_len as i32,
        compressed_size: compressed_len as i32,
    }
}
