//! Zlib (de)compression with exact consumed-byte accounting.

use crate::{Result, StorageError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Decompresses the zlib stream starting at `buf[offset]`.
///
/// Returns the inflated bytes and the exact number of compressed input
/// bytes consumed. Pack records are framed only by the stream's own end
/// marker, so callers advance their cursor by the consumed count.
pub fn decompress_from(buf: &[u8], offset: usize) -> Result<(Vec<u8>, usize)> {
    let input = buf.get(offset..).ok_or_else(|| {
        StorageError::Compression(format!("offset {} past end of input", offset))
    })?;
    let mut decoder = ZlibDecoder::new(input);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    Ok((bytes, decoder.total_in() as usize))
}

/// Compresses a buffer into a complete zlib stream at the default level.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Compression(e.to_string()))
}
