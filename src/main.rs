use std::fs;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gifinspect::{config::Cli, report::Report};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_filter());

    let Some(path) = &cli.path else {
        return ExitCode::SUCCESS;
    };

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    match gifinspect::parse(&bytes) {
        Ok(gif) => {
            print!("{}", Report::new(&gif).show_data(!cli.summary));
            if gif.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("{}: {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so the report on stdout stays clean.
fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
