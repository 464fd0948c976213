//! SortDriver: selects the in-memory or external path from `Config`,
//! orchestrates `RunBuilder` -> `KWayMerger` (with multi-pass merging when
//! fan-in would exceed the memory budget), cleans up scratch files, and
//! surfaces errors.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::io;
use crate::kway_merge;
use crate::merge_sort;
use crate::record::{records_from_slice, Record};
use crate::run_builder::{self, Run, ValueSource};
use crate::trace::{Trace, TraceReport};

/// What a top-level sort invocation produced, beyond the sorted data
/// itself.
#[derive(Debug, Clone)]
pub struct SortReport {
    pub elements: u64,
    pub external: bool,
    /// Number of first-pass runs created (0 for the in-memory path).
    pub runs: u32,
    pub trace: Option<TraceReport>,
}

/// Sort `data` in place according to `config`. Dispatches to the external
/// path automatically if `config.external` is set or if `data` exceeds
/// `config.mem_limit`.
pub fn xi_sort(data: &mut [f64], config: &Config) -> Result<SortReport> {
    apply_thread_count(config);

    let byte_len = data.len() as u64 * 8;
    let use_external = config.external || byte_len > config.mem_limit;

    if !use_external {
        return sort_in_memory(data, config);
    }

    tracing::debug!(elements = data.len(), "dispatching to external path (in-memory buffer)");

    let scratch = ScratchDir::create(config)?;
    let trace = config.trace.then(Trace::new);

    let outcome = (|| -> Result<(Vec<f64>, u32)> {
        let max_elems = max_elems_for(config)?;
        let runs = run_builder::build_runs(
            ValueSource::Slice(data),
            max_elems,
            scratch.path(),
            config.parallel,
            trace.as_ref(),
        )?;
        tracing::debug!(runs = runs.len(), "run-building complete");
        let run_count = runs.len() as u32;
        let final_path = merge_all_runs(runs, &scratch, config, trace.as_ref())?;
        let sorted = io::read_doubles_file(&final_path)?;
        let _ = std::fs::remove_file(&final_path);
        Ok((sorted, run_count))
    })();

    scratch.cleanup();

    let (sorted, run_count) = outcome?;
    data.copy_from_slice(&sorted);

    Ok(SortReport {
        elements: data.len() as u64,
        external: true,
        runs: run_count,
        trace: trace.map(|t| t.report()),
    })
}

/// External-mode entry point: sort the doubles in `input_path`, writing
/// the result to `output_path`. Takes the same in-memory-vs-external
/// dispatch as `xi_sort`: the external scratch-file pipeline only runs
/// when `config.external` is set or the file exceeds `config.mem_limit`.
pub fn xi_sort_external(input_path: &Path, output_path: &Path, config: &Config) -> Result<SortReport> {
    apply_thread_count(config);

    if config.mem_limit == 0 {
        return Err(Error::ConfigInvalid(
            "mem_limit must be > 0 in external mode".to_string(),
        ));
    }
    if config.buffer_elems == 0 {
        return Err(Error::ConfigInvalid("buffer_elems must be >= 1".to_string()));
    }

    let byte_len = std::fs::metadata(input_path)?.len();
    io::validate_length(byte_len)?;

    if byte_len == 0 {
        io::write_doubles_file(output_path, &[])?;
        return Ok(SortReport {
            elements: 0,
            external: true,
            runs: 0,
            trace: config.trace.then(|| TraceReport {
                phi_sum: 0.0,
                segment_count: 0,
            }),
        });
    }

    let use_external = config.external || byte_len > config.mem_limit;
    if !use_external {
        tracing::debug!(path = %input_path.display(), bytes = byte_len, "sorting file in memory");
        let mut data = io::read_doubles_file(input_path)?;
        let report = sort_in_memory(&mut data, config)?;
        io::write_doubles_file(output_path, &data)?;
        return Ok(report);
    }

    tracing::info!(path = %input_path.display(), bytes = byte_len, "sorting file externally");

    let scratch = ScratchDir::create(config)?;
    let trace = config.trace.then(Trace::new);

    let outcome = (|| -> Result<u32> {
        let max_elems = max_elems_for(config)?;
        let runs = run_builder::build_runs(
            ValueSource::File(input_path.to_path_buf()),
            max_elems,
            scratch.path(),
            config.parallel,
            trace.as_ref(),
        )?;
        tracing::debug!(runs = runs.len(), "run-building complete");
        let run_count = runs.len() as u32;
        let final_path = merge_all_runs(runs, &scratch, config, trace.as_ref())?;
        if final_path != output_path {
            std::fs::rename(&final_path, output_path)
                .or_else(|_| {
                    std::fs::copy(&final_path, output_path)?;
                    std::fs::remove_file(&final_path)
                })?;
        }
        Ok(run_count)
    })();

    scratch.cleanup();

    let run_count = outcome.inspect_err(|_| {
        let _ = std::fs::remove_file(output_path);
    })?;

    Ok(SortReport {
        elements: byte_len / 8,
        external: true,
        runs: run_count,
        trace: trace.map(|t| t.report()),
    })
}

fn sort_in_memory(data: &mut [f64], config: &Config) -> Result<SortReport> {
    let n = data.len();
    let mut records: Vec<Record> = Vec::new();
    records
        .try_reserve_exact(n)
        .map_err(|e| Error::ResourceExhausted(format!("allocating {n} records: {e}")))?;
    records.extend(records_from_slice(data));

    let mut aux: Vec<Record> = Vec::new();
    aux.try_reserve_exact(n)
        .map_err(|e| Error::ResourceExhausted(format!("allocating merge-sort aux buffer: {e}")))?;
    aux.extend_from_slice(&records);

    let trace = config.trace.then(Trace::new);
    merge_sort::sort(&mut records, &mut aux, config.parallel, trace.as_ref());

    for (slot, record) in data.iter_mut().zip(records.iter()) {
        *slot = record.value;
    }

    Ok(SortReport {
        elements: n as u64,
        external: false,
        runs: 0,
        trace: trace.map(|t| t.report()),
    })
}

fn apply_thread_count(config: &Config) {
    if let Some(n) = config.threads {
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(n.max(1))
            .build_global();
    }
}

/// Validates `mem_limit`/`buffer_elems` once, up front, so a config that
/// would only fail deep inside `kway_merge::merge_runs` (unreachable when
/// the run count collapses to one) is still rejected.
fn max_elems_for(config: &Config) -> Result<u64> {
    if config.mem_limit == 0 {
        return Err(Error::ConfigInvalid(
            "mem_limit must be > 0 in external mode".to_string(),
        ));
    }
    if config.buffer_elems == 0 {
        return Err(Error::ConfigInvalid("buffer_elems must be >= 1".to_string()));
    }
    Ok((config.mem_limit / 8).max(1))
}

/// A process-unique scratch directory for one sort invocation's run files.
struct ScratchDir {
    path: PathBuf,
    owned: Option<tempfile::TempDir>,
}

impl ScratchDir {
    fn create(config: &Config) -> Result<Self> {
        match &config.scratch_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(ScratchDir {
                    path: dir.clone(),
                    owned: None,
                })
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("xisort-")
                    .tempdir()
                    .map_err(Error::Io)?;
                Ok(ScratchDir {
                    path: dir.path().to_path_buf(),
                    owned: Some(dir),
                })
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink every run file this invocation created. `TempDir` removes
    /// the directory itself on drop when we own it; when the caller
    /// supplied `scratch_dir`, we only remove the files we wrote, leaving
    /// the directory itself (it may be shared).
    fn cleanup(self) {
        if self.owned.is_none() {
            if let Ok(entries) = std::fs::read_dir(&self.path) {
                for entry in entries.flatten() {
                    let name = entry.file_name();
                    if name.to_string_lossy().starts_with("xisort_") {
                        let _ = std::fs::remove_file(entry.path());
                    }
                }
            }
        }
        // `owned` (if any) is dropped here, removing the TempDir.
    }
}

/// The largest number of runs that can be merged in a single k-way pass
/// without `K * buffer_elems * 8` exceeding half the memory budget.
fn fan_in_cap(config: &Config) -> u64 {
    let budget = (config.mem_limit / 2).max(config.buffer_elems * 8);
    (budget / (config.buffer_elems.max(1) * 8)).max(2)
}

/// Merge `runs` down to a single sorted file, performing iterative
/// pairwise/K-way rounds when the run count exceeds the fan-in cap so
/// that peak memory stays bounded. Returns the path of the final merged
/// file (always inside `scratch.path()`).
fn merge_all_runs(
    mut runs: Vec<Run>,
    scratch: &ScratchDir,
    config: &Config,
    trace: Option<&Trace>,
) -> Result<PathBuf> {
    if runs.is_empty() {
        let empty_path = scratch.path().join("xisort_run_empty.bin");
        io::write_doubles_file(&empty_path, &[])?;
        return Ok(empty_path);
    }
    if runs.len() == 1 {
        return Ok(runs.remove(0).path);
    }

    let cap = fan_in_cap(config);
    let mut round: u64 = 0;

    loop {
        if runs.len() == 1 {
            return Ok(runs.remove(0).path);
        }
        tracing::debug!(round, runs = runs.len(), fan_in_cap = cap, "starting merge round");

        let cap = cap.max(2) as usize;
        let mut next_round: Vec<Run> = Vec::with_capacity(runs.len().div_ceil(cap));
        let mut group_idx: u64 = 0;

        for group in runs.chunks(cap) {
            if group.len() == 1 {
                next_round.push(Run {
                    path: group[0].path.clone(),
                    len: group[0].len,
                });
                continue;
            }
            let out_path = scratch
                .path()
                .join(format!("xisort_round_{round}_{group_idx}.bin"));
            let paths: Vec<PathBuf> = group.iter().map(|r| r.path.clone()).collect();
            let n = kway_merge::merge_runs(&paths, &out_path, config.buffer_elems, trace)?;
            for r in group {
                if r.path != out_path {
                    let _ = std::fs::remove_file(&r.path);
                }
            }
            next_round.push(Run {
                path: out_path,
                len: n,
            });
            group_idx += 1;
        }

        runs = next_round;
        round += 1;
    }
}
