//! `transient`: interactive console for temporary channels.
//!
//! Reads chat lines from stdin; prefixed lines are commands. Channels created
//! with `new_ch` are deleted once they have stayed empty for the grace period,
//! and a category created along with them goes once its last channel is gone.

mod app;
mod command;
mod credentials;
mod error;
mod logging;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use transient_runtime::{InMemoryGateway, Reclaimer};

use crate::app::{Console, Reply};
use crate::credentials::Credentials;
use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "transient", version, about = "Temporary channels that clean up after themselves")]
struct Args {
    /// TOML settings file.
    #[arg(long, env = "TRANSIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Command prefix (overrides settings).
    #[arg(long)]
    prefix: Option<String>,

    /// Seconds a channel may stay empty before it is deleted.
    #[arg(long)]
    grace_period_secs: Option<u64>,

    /// Bot token file; the first line must hold the token.
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Directory for daily log files.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Debug-level terminal logging.
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        settings.apply_env(std::env::vars())?;
        if let Some(prefix) = &self.prefix {
            settings.command_prefix = prefix.clone();
        }
        if let Some(secs) = self.grace_period_secs {
            settings.grace_period_secs = secs;
        }
        if let Some(path) = &self.token_file {
            settings.token_file = Some(path.clone());
        }
        if let Some(dir) = &self.log_dir {
            settings.log_dir = Some(dir.clone());
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = args.settings().context("loading settings")?;
    let log_file = logging::init(args.debug, settings.log_dir.as_deref())
        .context("initialising logging")?;
    if let Some(path) = &log_file {
        info!(path = %path.display(), "logging to file");
    }

    let credentials = settings
        .token_file
        .as_deref()
        .map(Credentials::load)
        .transpose()
        .context("loading credentials")?;
    match &credentials {
        Some(creds) => info!(token = %creds.fingerprint(), "credentials loaded"),
        None => warn!("no token file configured; running offline"),
    }

    let gateway = Arc::new(InMemoryGateway::new());
    let reclaimer = Reclaimer::start(gateway.clone(), settings.reclaim_config());
    let console = Console::new(
        settings.command_prefix.clone(),
        settings.scope,
        gateway,
        reclaimer,
    );
    info!(
        prefix = %settings.command_prefix,
        grace_secs = settings.grace_period_secs,
        "ready"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match console.handle_line(&line).await {
                    Reply::Text(text) => println!("{text}"),
                    Reply::Silent => {}
                    Reply::Quit => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    console.shutdown();
    Ok(())
}
