//! RunBuilder: splits a value source into size-bounded runs, sorts each
//! run in memory with `KeyedMergeSort`, and writes it to a scratch file as
//! raw little-endian doubles.
//!
//! Runs are typically sorted sequentially even when the overall sort
//! permits parallelism: per-run sorts are usually small enough that
//! task-dispatch overhead dominates, and optimizing for the full external
//! pipeline's throughput favors pipelined sequential runs over intra-run
//! parallel sorting.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::merge_sort;
use crate::record::Record;
use crate::trace::Trace;

/// Where a `RunBuilder` reads its values from.
pub enum ValueSource<'a> {
    Slice(&'a [f64]),
    File(PathBuf),
}

/// One sorted run produced by `build_runs`.
pub struct Run {
    pub path: PathBuf,
    pub len: u64,
}

/// Scratch file name for run index `k` within one sort invocation.
pub fn run_file_name(k: u64) -> String {
    format!("xisort_run_{k}.bin")
}

/// Split `source` into runs of at most `max_elems` doubles each, sort each
/// run, and write it under `scratch_dir`. Returns the list of run files in
/// creation order. On any error, every run file already written is
/// unlinked before the error is returned.
pub fn build_runs(
    source: ValueSource<'_>,
    max_elems: u64,
    scratch_dir: &Path,
    parallel: bool,
    trace: Option<&Trace>,
) -> Result<Vec<Run>> {
    if max_elems == 0 {
        return Err(Error::ConfigInvalid("max_elems must be >= 1".to_string()));
    }

    let mut runs = Vec::new();
    let result = match source {
        ValueSource::Slice(values) => {
            build_from_slice(values, max_elems, scratch_dir, parallel, trace, &mut runs)
        }
        ValueSource::File(path) => {
            build_from_file(&path, max_elems, scratch_dir, parallel, trace, &mut runs)
        }
    };

    match result {
        Ok(()) => Ok(runs),
        Err(e) => {
            for run in &runs {
                let _ = std::fs::remove_file(&run.path);
            }
            Err(e)
        }
    }
}

fn build_from_slice(
    values: &[f64],
    max_elems: u64,
    scratch_dir: &Path,
    parallel: bool,
    trace: Option<&Trace>,
    runs: &mut Vec<Run>,
) -> Result<()> {
    let max_elems = max_elems as usize;
    let mut offset: u64 = 0;
    let mut k: u64 = 0;
    for chunk in values.chunks(max_elems.max(1)) {
        write_one_run(chunk, offset, k, scratch_dir, parallel, trace, runs)?;
        offset += chunk.len() as u64;
        k += 1;
    }
    Ok(())
}

fn build_from_file(
    path: &Path,
    max_elems: u64,
    scratch_dir: &Path,
    parallel: bool,
    trace: Option<&Trace>,
    runs: &mut Vec<Run>,
) -> Result<()> {
    let file = File::open(path)?;
    let byte_len = file.metadata()?.len();
    crate::io::validate_length(byte_len)?;

    let mut reader = BufReader::with_capacity(1 << 20, file);
    let max_elems = max_elems as usize;
    let mut chunk_bytes = vec![0u8; max_elems * 8];
    let mut offset: u64 = 0;
    let mut k: u64 = 0;

    loop {
        let n = read_up_to(&mut reader, &mut chunk_bytes)?;
        if n == 0 {
            break;
        }
        if n % 8 != 0 {
            return Err(Error::Internal(format!(
                "short read left a partial double: {n} bytes"
            )));
        }
        let values = crate::io::bytes_to_doubles(&chunk_bytes[..n]);
        write_one_run(&values, offset, k, scratch_dir, parallel, trace, runs)?;
        offset += values.len() as u64;
        k += 1;
    }
    Ok(())
}

/// Fill `buf` from `reader` as much as possible (up to `buf.len()` bytes),
/// stopping at EOF. Unlike `read_exact`, a short read here is not an
/// error: it only signals that the final chunk is smaller than
/// `max_elems`.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn write_one_run(
    values: &[f64],
    offset: u64,
    k: u64,
    scratch_dir: &Path,
    parallel: bool,
    trace: Option<&Trace>,
    runs: &mut Vec<Run>,
) -> Result<()> {
    let mut records: Vec<Record> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| Record::new(v, offset + i as u64))
        .collect();
    let mut aux = records.clone();
    merge_sort::sort(&mut records, &mut aux, parallel, trace);

    let sorted: Vec<f64> = records.iter().map(|r| r.value).collect();
    let path = scratch_dir.join(run_file_name(k));
    crate::io::write_doubles_file(&path, &sorted)?;
    runs.push(Run {
        path,
        len: sorted.len() as u64,
    });
    Ok(())
}
