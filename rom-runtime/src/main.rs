//!
//! This is the command shell of the object model.
//!
#![warn(missing_docs)]

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

#[cfg(feature = "jemalloc")]
use jemallocator::Jemalloc;

mod shell;

use rom_runtime::{Runtime, RuntimeConfig, TableStrategy};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Debug, Clone, PartialEq, Parser)]
#[command(about, author, version)]
struct Options {
    /// Script to run, one command per line (interactive when absent).
    file: Option<PathBuf>,

    /// Guard every variable table with its object's lock.
    #[arg(long)]
    synchronized: bool,

    /// Disable the method dispatch cache.
    #[arg(long)]
    no_cache: bool,

    /// Initial safe level.
    #[arg(long, default_value_t = 0)]
    safe_level: u8,

    /// Enable verbose output (with timing information).
    #[arg(short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let opts = Options::parse();

    let default_filter = if opts.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let strategy = if opts.synchronized {
        TableStrategy::Synchronized
    } else {
        TableStrategy::Stamped
    };
    let config = RuntimeConfig::default()
        .with_variable_strategy(strategy)
        .with_method_cache(!opts.no_cache)
        .with_safe_level(opts.safe_level);
    let runtime = Runtime::new(config);

    let Some(file) = opts.file else {
        return shell::interactive(&runtime, opts.verbose);
    };

    let input = File::open(&file)
        .with_context(|| format!("could not open `{}`", file.display()))?;
    shell::batch(&runtime, BufReader::new(input), opts.verbose)
}
