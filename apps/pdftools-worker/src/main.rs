//! PDF tools worker binary
//!
//! Reads worker messages from stdin and writes outbound messages to stdout.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use pdftools_worker::{transport, Host, PdfcpuProcess, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdftools-worker")]
#[command(version, about = "Merge and decrypt PDFs over a JSON-lines protocol")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Decrypt toolkit executable (overrides engine.program)
    #[arg(long)]
    program: Option<String>,

    /// Parent directory for engine sandboxes (overrides engine.work_dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (overrides logging.level)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::from_file(path)?,
            None => WorkerConfig::default(),
        };
        if let Some(program) = &self.program {
            config.engine.program = program.clone();
        }
        if let Some(work_dir) = &self.work_dir {
            config.engine.work_dir = Some(work_dir.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    // stdout carries protocol messages, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log filter")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting pdftools worker v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(program = %config.engine.program, "Decrypt engine");

    let host = Host::new(PdfcpuProcess::new(config.engine));
    transport::run_stdio(&host).await
}
