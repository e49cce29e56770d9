//! Command line configuration.
//!
//! Every flag can also be set through the environment:
//!
//! - `GIFINSPECT_VERBOSE` - Log parser progress (default: false)
//! - `GIFINSPECT_SUMMARY` - Leave decoded indices out of the report (default: false)
//!
//! `RUST_LOG` overrides the log filter chosen from `--verbose`.

use std::path::PathBuf;

use clap::Parser;

/// Log filter without `--verbose`.
pub const DEFAULT_LOG_FILTER: &str = "gifinspect=warn";

/// Log filter with `--verbose`.
pub const VERBOSE_LOG_FILTER: &str = "gifinspect=debug";

/// gifinspect - Print the block structure and decoded pixels of a GIF file.
#[derive(Parser, Debug, Clone)]
#[command(name = "gifinspect")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// GIF file to inspect. Nothing is done without one.
    #[arg(value_name = "FILE")]
    pub path: Option<PathBuf>,

    /// Log each parsed block and every decode anomaly.
    #[arg(short, long, env = "GIFINSPECT_VERBOSE")]
    pub verbose: bool,

    /// Print only the number of decoded indices per image.
    #[arg(long, env = "GIFINSPECT_SUMMARY")]
    pub summary: bool,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        }
    }
}
