use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingOptions;

/// Filter directive used when `RUST_LOG` is unset; `-v` overrides the configured level.
pub fn default_directive(options: &LoggingOptions, verbosity: u8) -> String {
    match verbosity {
        0 => options.level.clone(),
        1 => "photocast=debug,info".to_owned(),
        _ => "photocast=trace,debug".to_owned(),
    }
}

pub fn init(options: &LoggingOptions, verbosity: u8) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = default_directive(options, verbosity);
            EnvFilter::try_new(&directive)
                .with_context(|| format!("invalid log filter {directive:?}"))?
        }
    };

    let file_layer = match &options.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(true))
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}
