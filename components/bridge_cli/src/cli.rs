//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

/// Loads a module through the bridge and prints its exports as JSON.
#[derive(Parser, Debug)]
#[command(name = "bridge-run", version, about)]
pub struct Cli {
    /// Module id to load, resolved against the search paths
    pub module: String,

    /// Directory to resolve module ids against (repeatable)
    #[arg(short = 'p', long = "search-path", value_name = "DIR")]
    pub search_paths: Vec<String>,

    /// Environment parameters as a JSON file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print environment statistics after loading
    #[arg(long)]
    pub stats: bool,

    /// Log filter: off, error, warn, info, debug or trace
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Frames of 16ms to run after loading, servicing timers and messages
    #[arg(long, default_value_t = 0)]
    pub frames: u32,
}
