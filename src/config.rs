//! Sort configuration and the byte-size suffix grammar shared by
//! `--mem-limit` and `--buffer-elems`.
//!
//! `parse_byte_size` is a direct generalization of `fsort`'s
//! `parse_buffer_size` (`K`/`M`/`G`/`T` suffixes, bare decimal bytes),
//! widened from `usize` to `u64` since mem-limits may legitimately exceed
//! 32-bit range on any platform.

use std::path::PathBuf;

/// Default `--mem-limit`: 1 GiB.
pub const DEFAULT_MEM_LIMIT: u64 = 1 << 30;

/// Default `--buffer-elems`: 32768 doubles (256 KiB per run/output buffer).
pub const DEFAULT_BUFFER_ELEMS: u64 = 32_768;

/// Configuration for one `xi_sort`/`xi_sort_external` invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Force the external (disk-backed) path even if the input fits in
    /// `mem_limit`.
    pub external: bool,
    /// Permit task-parallel in-memory sorts via `rayon::join`.
    pub parallel: bool,
    /// Enable the optional `TraceAccumulator`.
    pub trace: bool,
    /// Maximum bytes the sorter may keep resident. Must be > 0 in external
    /// mode.
    pub mem_limit: u64,
    /// Per-run and output buffer size, in doubles, for the external path.
    pub buffer_elems: u64,
    /// Directory under which scratch run files are created. `None` means
    /// a process-unique subdirectory of the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// Worker-thread count forwarded to `rayon::ThreadPoolBuilder`. `None`
    /// leaves rayon's global pool as-is (ambient thread count).
    pub threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            external: false,
            parallel: false,
            trace: false,
            mem_limit: DEFAULT_MEM_LIMIT,
            buffer_elems: DEFAULT_BUFFER_ELEMS,
            scratch_dir: None,
            threads: None,
        }
    }
}

/// Parse a byte-count string like `"10K"`, `"1M"`, `"1G"`, `"512"`.
pub fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty byte size".to_string());
    }

    let (num_part, suffix) = if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let (n, s) = s.split_at(s.len() - 1);
        (n, s.chars().next())
    } else {
        (s, None)
    };

    let base: u64 = num_part
        .parse()
        .map_err(|_| format!("invalid byte size: {}", s))?;

    let multiplier: u64 = match suffix {
        Some('K') | Some('k') => 1024,
        Some('M') | Some('m') => 1024 * 1024,
        Some('G') | Some('g') => 1024 * 1024 * 1024,
        Some('T') | Some('t') => 1024u64.pow(4),
        Some('b') => 512,
        Some(c) => return Err(format!("invalid suffix '{}' in byte size", c)),
        None => 1,
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("byte size overflows u64: {}", s))
}
