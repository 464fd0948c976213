//! Binary I/O helpers shared by the in-memory read path, `RunBuilder`, and
//! `KWayMerger`. Run files and the CLI's input/output files are all the
//! same format: tightly packed little-endian `f64`, no header.
//!
//! Whole-file reads for the in-memory path use `memmap2`. The mapping is
//! read once and copied into an 8-byte-aligned `Vec<f64>` the in-place
//! sorter can mutate directly, since the mapping itself is read-only.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};

/// Validate that a byte length is a whole number of `f64`s. File size must
/// be a multiple of 8 bytes; otherwise the driver fails with an invalid
/// input length error.
pub fn validate_length(byte_len: u64) -> Result<u64> {
    if byte_len % 8 != 0 {
        return Err(Error::ConfigInvalid(format!(
            "invalid input length: {byte_len} bytes is not a multiple of 8"
        )));
    }
    Ok(byte_len / 8)
}

/// Read an entire file of packed little-endian doubles into a `Vec<f64>`.
pub fn read_doubles_file(path: &Path) -> Result<Vec<f64>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    validate_length(len)?;
    if len == 0 {
        return Ok(Vec::new());
    }
    // SAFETY: read-only mapping; the file must not be truncated by another
    // process while we hold it, which we can't guarantee in general, so we
    // copy out of it immediately rather than keep it mapped.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(bytes_to_doubles(&mmap))
}

/// Decode a byte buffer of packed little-endian doubles. `bytes.len()`
/// must be a multiple of 8; excess trailing bytes (there should be none,
/// by construction) are ignored.
pub fn bytes_to_doubles(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// Encode doubles as packed little-endian bytes.
pub fn doubles_to_bytes(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Write a full slice of doubles to `path`, truncating/creating the file.
pub fn write_doubles_file(path: &Path, values: &[f64]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(&doubles_to_bytes(values))?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let values = [1.0, -0.0, 0.0, f64::INFINITY, f64::NEG_INFINITY];
        let bytes = doubles_to_bytes(&values);
        assert_eq!(bytes.len(), values.len() * 8);
        let back = bytes_to_doubles(&bytes);
        for (a, b) in values.iter().zip(back.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn rejects_length_not_multiple_of_eight() {
        assert!(validate_length(13).is_err());
        assert!(validate_length(16).is_ok());
        assert!(validate_length(0).is_ok());
    }
}
