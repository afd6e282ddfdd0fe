//! Binary entrypoint for photocastd.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use photocast::cast::chromecast::ChromecastConnector;
use photocast::config::Configuration;
use photocast::slideshow::Slideshow;

#[derive(Debug, Parser)]
#[command(
    name = "photocastd",
    version,
    about = "Cast a photo slideshow to Google Cast devices"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(value_name = "CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Skip the index build at startup
    #[arg(long)]
    no_index: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?
        .validated()
        .context("validating configuration")?;
    photocast::logging::init(&cfg.logging, cli.verbose)?;

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    let cancel = CancellationToken::new();
    let connector = Arc::new(ChromecastConnector::new(cfg.cast.discovery_timeout));
    let slideshow = Arc::new(Slideshow::new(&cfg, connector, cancel.child_token())?);

    if cli.no_index {
        info!("skipping startup index build");
    } else {
        let count = slideshow.reindex().await;
        info!(count, "startup index complete");
    }

    let server = photocast::web::spawn(
        Arc::clone(&slideshow),
        cfg.server.bind_address,
        cancel.clone(),
    );
    info!(base_url = %cfg.server.image_base_url(), "serving images to cast devices");

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                warn!(error = %err, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
    slideshow.shutdown().await;
    let _ = server.await;
    Ok(())
}
