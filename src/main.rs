#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, bail};
use clap::Parser;
use log::{debug, error, info};

use mangoprof::analyzer::dispatch::{self, Outcome};
use mangoprof::analyzer::{AggregateState, report};
use mangoprof::config::Cli;
use mangoprof::connection::get_connection_manager;
use mangoprof::error::Error;
use mangoprof::helpers::{redact_uri_password, validate_mongodb_uri};
use mangoprof::models::ProfilerRecord;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(reason) = validate_mongodb_uri(&cli.uri) {
        bail!("invalid MongoDB URI: {reason}");
    }

    info!(
        "mangoprof {} ({}) connecting to {}",
        env!("CARGO_PKG_VERSION"),
        env!("MANGOPROF_GIT_SHA"),
        redact_uri_password(&cli.uri)
    );

    let manager = get_connection_manager();
    let client = manager.connect(&cli.uri).context("failed to connect")?;

    let mut state = AggregateState::new();
    manager
        .seed_index_counts(&client, &cli.database, &mut state)
        .context("failed to enumerate indexes")?;

    let thresholds = cli.thresholds();
    let explainer = manager.explainer(&client, &cli.database);
    let records = manager
        .profiler_records(&client, &cli.database, cli.batch_size)
        .context("failed to open system.profile")?;

    let mut classified = 0u64;
    let mut aborted = 0u64;
    for record in records {
        let record = ProfilerRecord::new(record.context("failed to read profiler record")?);
        debug!("{} on {} ({} ms)", record.op_tag(), record.ns(), record.millis().unwrap_or(0));
        match dispatch::classify_record(&record, &explainer, &thresholds, &mut state) {
            Ok(Outcome::Classified) => classified += 1,
            Ok(Outcome::Skipped) => {}
            Err(err @ Error::UnknownStage { .. }) => {
                // fatal for this record only; earlier contributions stand
                error!("{err}");
                aborted += 1;
            }
            Err(err) => return Err(err).context("classification failed"),
        }
    }
    info!("classified {classified} records, {aborted} aborted on unknown stages");

    let stdout = std::io::stdout();
    report::render(&state, cli.diagnostics, &mut stdout.lock())
        .context("failed to render report")?;

    if let Some(path) = &cli.csv_out {
        report::export_use_counts_csv(&state, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote index use counts to {}", path.display());
    }

    if let Some(path) = &cli.json_out {
        report::export_json(&state, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote aggregate JSON to {}", path.display());
    }

    Ok(())
}
