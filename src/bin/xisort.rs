use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::Parser;

use xisort::config::{parse_byte_size, Config, DEFAULT_BUFFER_ELEMS, DEFAULT_MEM_LIMIT};
use xisort::{xi_sort_external, Error};

#[derive(Parser)]
#[command(name = "xisort", about = "Sort a binary file of IEEE-754 doubles under the total order")]
struct Cli {
    /// Force the external (disk-backed) path even if the input fits in
    /// --mem-limit.
    #[arg(long)]
    external: bool,

    /// Sort in-memory runs using task parallelism.
    #[arg(long)]
    parallel: bool,

    /// Record the optional segment-length trace and print it to stderr.
    #[arg(long)]
    trace: bool,

    /// Maximum resident memory for the sort, e.g. "512M", "2G".
    #[arg(long = "mem-limit", value_name = "SIZE")]
    mem_limit: Option<String>,

    /// Per-run and output buffer size, in doubles.
    #[arg(long = "buffer-elems", value_name = "N")]
    buffer_elems: Option<u64>,

    /// Directory for scratch run files. Defaults to a process-unique
    /// subdirectory of the system temp dir.
    #[arg(long = "scratch-dir", value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Worker-thread count for the rayon pool.
    #[arg(long)]
    threads: Option<usize>,

    /// Print a summary of the sort to stderr.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Input file of packed little-endian doubles.
    input: PathBuf,

    /// Output file to write the sorted doubles to.
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let mem_limit = match cli.mem_limit.as_deref().map(parse_byte_size) {
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            eprintln!("[xisort] invalid --mem-limit: {e}");
            process::exit(1);
        }
        None => DEFAULT_MEM_LIMIT,
    };

    if let Some(dir) = &cli.scratch_dir {
        if let Err(e) = ensure_scratch_dir(dir) {
            eprintln!("[xisort] {e:#}");
            process::exit(2);
        }
    }

    let config = Config {
        external: cli.external,
        parallel: cli.parallel,
        trace: cli.trace,
        mem_limit,
        buffer_elems: cli.buffer_elems.unwrap_or(DEFAULT_BUFFER_ELEMS),
        scratch_dir: cli.scratch_dir,
        threads: cli.threads,
    };

    match xi_sort_external(&cli.input, &cli.output, &config) {
        Ok(report) => {
            if cli.verbose {
                eprintln!(
                    "[xisort] sorted {} elements (external={}, runs={})",
                    report.elements, report.external, report.runs
                );
                if let Some(t) = report.trace {
                    eprintln!(
                        "[xisort] trace: phi_sum={:.6} segments={}",
                        t.phi_sum, t.segment_count
                    );
                }
            }
        }
        Err(e) => {
            eprintln!("[xisort] {e}");
            process::exit(match e {
                Error::ConfigInvalid(_) => 2,
                _ => 1,
            });
        }
    }
}

/// Pre-create `--scratch-dir` so a missing or unwritable directory is
/// reported with its path before any run files are attempted, rather than
/// surfacing as a bare I/O error partway through the sort.
fn ensure_scratch_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating scratch directory {}", dir.display()))?;
    let probe = dir.join(".xisort-write-probe");
    std::fs::write(&probe, b"")
        .with_context(|| format!("scratch directory {} is not writable", dir.display()))?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
