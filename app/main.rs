use std::io::Write as _;

use clap::Parser as _;
use tokio_stream::StreamExt as _;

mod cli;
mod scenario;

use cli::Cli;
use scenario::{Runner, Scenario};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::set_tracing_subscriber(cli.log_format, &cli.log_filter)?;
    let scenario = Scenario::load(&cli.scenario)?;
    let config = scenario.config.clone().unwrap_or(cli.engine);
    tracing::info!(
        steps = scenario.steps.len(),
        start_time = scenario.start_time,
        "running scenario"
    );
    let mut runner = Runner::new(config, scenario.start_time);
    let mut notifications = runner.engine().registry().events().stream();
    // Ends once the engine, and with it every sender, is dropped
    let listener = tokio::spawn(async move {
        let mut seen = 0u64;
        while let Some(item) = notifications.next().await {
            match item {
                Ok(event) => {
                    seen += 1;
                    tracing::info!(?event, "notification");
                }
                Err(err) => {
                    tracing::warn!(%err, "notification listener lagged");
                }
            }
        }
        seen
    });
    let report = runner.run(&scenario.steps, cli.strict);
    drop(runner);
    let notifications_seen = listener.await?;
    let report = report?;
    tracing::info!(
        applied = report.steps_applied,
        rejected = report.steps_rejected,
        notifications_seen,
        "scenario finished"
    );
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &report)?;
    writeln!(stdout)?;
    Ok(())
}
