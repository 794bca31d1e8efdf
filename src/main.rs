//! Terminal video downloader.
//!
//! Paste a page URL, pick one of the qualities the resolver service offers,
//! and the file is fetched into the current directory by curl while a
//! progress gauge follows along.

mod api;
mod app;
mod application;
mod base_system;
mod domain;
mod ui;
mod utils;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use api::ResolverClient;
use app::DownloadApp;
use application::session::Session;
use application::transfer::{CurlProvider, TransferEngine};
use base_system::config::{self, Settings};
use base_system::logging::{LogOptions, LogSystem};
use ui::{CrosstermKeys, TerminalGuard};

/// Exit code for anything that goes wrong before the session starts.
const STARTUP_FAILURE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "svd", version)]
#[command(about = "Download videos through a link resolver service")]
struct Cli {
    /// Page URL; fills the input and submits right away
    url: Option<String>,

    /// Settings file (defaults to ./svd.yml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resolver endpoint, e.g. http://localhost:8080/api/download
    #[arg(long)]
    endpoint: Option<String>,

    /// Resolver timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Program used for the transfer
    #[arg(long)]
    curl: Option<String>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Directory for latest.log. A relative path is resolved against the
    /// working directory, which is also where downloads are saved
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Write the effective settings as a commented YAML file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(endpoint) = &self.endpoint {
            settings.resolver_endpoint = endpoint.clone();
        }
        if let Some(ms) = self.timeout_ms {
            settings.resolver_timeout_ms = ms;
        }
        if let Some(program) = &self.curl {
            settings.transfer_program = program.clone();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("svd: {e:#}");
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let mut settings = config::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    settings.validate()?;

    if let Some(path) = &cli.write_config {
        config::write_with_comments(&settings, path)?;
        println!("settings written to {}", path.display());
        return Ok(0);
    }

    let log = LogSystem::init(LogOptions {
        debug: cli.debug,
        log_dir: cli.log_dir.clone(),
    })
    .context("init logging")?;
    info!("svd v{} logging to {}", env!("CARGO_PKG_VERSION"), log.path().display());
    info!("resolver endpoint {}", settings.resolver_endpoint);

    let working_dir = std::env::current_dir().context("read working directory")?;
    let resolver =
        ResolverClient::new(settings.resolver_config()).context("build resolver HTTP client")?;
    let engine = TransferEngine::new(Arc::new(CurlProvider::new(&settings.transfer_program)));
    let session = Session::new(settings.session_settings(working_dir));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    let code = runtime.block_on(async move {
        let mut guard = TerminalGuard::enter()?;
        let (app, rx) = DownloadApp::new(session, resolver, engine);
        let mut keys = CrosstermKeys;
        app.run(guard.terminal(), rx, &mut keys, cli.url).await
    })?;

    Ok(u8::try_from(code).unwrap_or(1))
}
