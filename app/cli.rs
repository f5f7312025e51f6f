use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _};
use wager_settlement::config::EngineConfig;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Run a wager settlement scenario against an in-process engine
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Scenario file (JSON)
    pub scenario: PathBuf,
    /// Engine settings. Ignored if the scenario carries its own `config`.
    #[command(flatten)]
    pub engine: EngineConfig,
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
    /// Log filter directives. `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_filter: String,
    /// Abort at the first rejected step
    #[arg(long)]
    pub strict: bool,
}

/// Logs go to stderr; stdout carries the report.
pub fn set_tracing_subscriber(
    format: LogFormat,
    directives: &str,
) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
                .with_writer(std::io::stderr);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }
    Ok(())
}
