//! KWayMerger: merges N sorted run files into one sorted output via a
//! min-heap keyed by `KeyCodec` output, with per-run read buffers and a
//! buffered writer.
//!
//! Each run moves through `Fresh -> Active -> Drained`. Heap entries break
//! key ties by run index, which makes the merge output a deterministic
//! function of the run contents regardless of heap implementation details:
//! equal-keyed elements from different runs are always emitted in
//! run-index order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::codec::encode;
use crate::error::{Error, Result};
use crate::trace::Trace;

/// Per-run state: an open reader, a buffer of decoded doubles, and a
/// cursor into that buffer. `Drained` once EOF has been reached and the
/// buffer is exhausted.
struct RunReader {
    reader: BufReader<File>,
    buf: Vec<f64>,
    cursor: usize,
    drained: bool,
    run_id: usize,
    byte_buf: Vec<u8>,
}

impl RunReader {
    fn open(path: &Path, buffer_elems: usize, run_id: usize) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = RunReader {
            reader: BufReader::with_capacity(1 << 16, file),
            buf: Vec::new(),
            cursor: 0,
            drained: false,
            run_id,
            byte_buf: vec![0u8; buffer_elems * 8],
        };
        r.refill()?;
        Ok(r)
    }

    fn head(&self) -> Option<f64> {
        if self.cursor < self.buf.len() {
            Some(self.buf[self.cursor])
        } else {
            None
        }
    }

    /// Advance past the current head, refilling from disk if the buffer is
    /// now exhausted.
    fn advance(&mut self) -> Result<()> {
        self.cursor += 1;
        if self.cursor >= self.buf.len() {
            self.refill()?;
        }
        Ok(())
    }

    fn refill(&mut self) -> Result<()> {
        let mut filled = 0;
        while filled < self.byte_buf.len() {
            let n = self.reader.read(&mut self.byte_buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled % 8 != 0 {
            return Err(Error::Io(std::io::Error::other(format!(
                "run {} ended on a partial double ({} bytes)",
                self.run_id, filled
            ))));
        }
        self.buf = crate::io::bytes_to_doubles(&self.byte_buf[..filled]);
        self.cursor = 0;
        if filled == 0 {
            self.drained = true;
        }
        Ok(())
    }
}

/// One entry in the merge heap: a value plus the run it came from. Ordered
/// by `(key(value), run_id)` ascending; `BinaryHeap` is a max-heap so we
/// store entries under `Reverse` at the call site... instead we implement
/// `Ord` to reverse the comparison directly, matching a min-heap.
struct HeapEntry {
    value: f64,
    run_id: usize,
}

impl HeapEntry {
    fn sort_key(&self) -> (u64, usize) {
        (encode(self.value), self.run_id)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap.
        other.sort_key().cmp(&self.sort_key())
    }
}

/// Merge `run_paths` (each a sorted run file) into `output_path`. Each run
/// is read with a buffer of `buffer_elems` doubles; the output is written
/// with a buffer of the same size. If `trace` is `Some`, every maximal
/// contiguous stretch of output values taken from the same run
/// contributes `1 / length` to the accumulated Φ.
pub fn merge_runs(
    run_paths: &[impl AsRef<Path>],
    output_path: &Path,
    buffer_elems: u64,
    trace: Option<&Trace>,
) -> Result<u64> {
    if buffer_elems == 0 {
        return Err(Error::ConfigInvalid("buffer_elems must be >= 1".to_string()));
    }
    let buffer_elems = buffer_elems as usize;

    let mut readers: Vec<RunReader> = Vec::with_capacity(run_paths.len());
    for (run_id, path) in run_paths.iter().enumerate() {
        readers.push(RunReader::open(path.as_ref(), buffer_elems, run_id)?);
    }

    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(readers.len());
    for r in &readers {
        if let Some(v) = r.head() {
            heap.push(HeapEntry {
                value: v,
                run_id: r.run_id,
            });
        }
    }

    let out_file = File::create(output_path)?;
    let mut writer = BufWriter::with_capacity(buffer_elems * 8, out_file);
    let mut out_buf: Vec<f64> = Vec::with_capacity(buffer_elems);

    let mut total: u64 = 0;
    let mut current_segment_run: Option<usize> = None;
    let mut current_segment_len: u64 = 0;

    macro_rules! close_segment {
        () => {
            if let (Some(_), Some(tr)) = (current_segment_run, trace) {
                if current_segment_len > 0 {
                    tr.record_segment(current_segment_len as usize);
                }
            }
        };
    }

    while let Some(top) = heap.pop() {
        out_buf.push(top.value);
        total += 1;

        match current_segment_run {
            Some(run_id) if run_id == top.run_id => {
                current_segment_len += 1;
            }
            _ => {
                close_segment!();
                current_segment_run = Some(top.run_id);
                current_segment_len = 1;
            }
        }

        if out_buf.len() >= buffer_elems {
            writer.write_all(&crate::io::doubles_to_bytes(&out_buf))?;
            out_buf.clear();
        }

        let reader = &mut readers[top.run_id];
        reader.advance()?;
        if let Some(next) = reader.head() {
            heap.push(HeapEntry {
                value: next,
                run_id: top.run_id,
            });
        }
    }
    close_segment!();

    if !out_buf.is_empty() {
        writer.write_all(&crate::io::doubles_to_bytes(&out_buf))?;
    }
    writer.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_doubles_file, write_doubles_file};

    #[test]
    fn merges_sorted_runs_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let run_a = dir.path().join("a.bin");
        let run_b = dir.path().join("b.bin");
        let run_c = dir.path().join("c.bin");
        write_doubles_file(&run_a, &[1.0, 4.0, 7.0]).unwrap();
        write_doubles_file(&run_b, &[2.0, 4.0, 9.0]).unwrap();
        write_doubles_file(&run_c, &[0.0, 4.0]).unwrap();

        let out = dir.path().join("out.bin");
        let n = merge_runs(&[run_a, run_b, run_c], &out, 2, None).unwrap();
        assert_eq!(n, 8);

        let merged = read_doubles_file(&out).unwrap();
        assert_eq!(merged, vec![0.0, 1.0, 2.0, 4.0, 4.0, 4.0, 7.0, 9.0]);
    }

    #[test]
    fn empty_run_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let run_a = dir.path().join("a.bin");
        let run_b = dir.path().join("b.bin");
        write_doubles_file(&run_a, &[]).unwrap();
        write_doubles_file(&run_b, &[1.0, 2.0]).unwrap();

        let out = dir.path().join("out.bin");
        let n = merge_runs(&[run_a, run_b], &out, 4, None).unwrap();
        assert_eq!(n, 2);
        assert_eq!(read_doubles_file(&out).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn single_run_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let run_a = dir.path().join("a.bin");
        write_doubles_file(&run_a, &[-1.0, 0.0, 1.0]).unwrap();
        let out = dir.path().join("out.bin");
        merge_runs(&[run_a], &out, 1, None).unwrap();
        assert_eq!(read_doubles_file(&out).unwrap(), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn trace_accumulates_segment_reciprocals() {
        let dir = tempfile::tempdir().unwrap();
        let run_a = dir.path().join("a.bin");
        let run_b = dir.path().join("b.bin");
        // a: 1,2,3   b: 1.5
        // merge order: a(1) a(2) b(1.5) a(3) -> segments of len 2, 1, 1
        write_doubles_file(&run_a, &[1.0, 2.0, 3.0]).unwrap();
        write_doubles_file(&run_b, &[1.5]).unwrap();
        let out = dir.path().join("out.bin");
        let trace = Trace::new();
        merge_runs(&[run_a, run_b], &out, 4, Some(&trace)).unwrap();
        let report = trace.report();
        assert_eq!(report.segment_count, 3);
        assert!((report.phi_sum - (0.5 + 1.0 + 1.0)).abs() < 1e-12);
    }
}
