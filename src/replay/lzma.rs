//! The "pure LZMA" codec osu!'s `.osr` action data and this crate's replay
//! cache both speak: a 13-byte alone-format header followed by a raw LZMA1
//! stream, no `xz` container around it.

use std::io::Cursor;

use super::ReplayError;

/// Decompresses a pure-LZMA byte stream to its underlying bytes.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, ReplayError> {
    let mut out = Vec::new();
    lzma_rs::lzma_decompress(&mut Cursor::new(bytes), &mut out)?;
    Ok(out)
}

/// Compresses bytes into a pure-LZMA byte stream.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, ReplayError> {
    let mut out = Vec::new();
    lzma_rs::lzma_compress(&mut Cursor::new(bytes), &mut out)?;
    Ok(out)
}
