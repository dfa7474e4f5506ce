// Final report rendering

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use chrono::Utc;

use crate::analyzer::state::AggregateState;
use crate::error::Result;
use crate::helpers::{format_bytes, format_number};

/// Render the whole report. Severity buckets print ascending so the worst
/// offenders land at the bottom of the terminal, right above the prompt.
pub fn render(state: &AggregateState, diagnostics: bool, out: &mut impl Write) -> Result<()> {
    writeln!(out, "mangoprof report generated {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))?;

    writeln!(out, "\nIN-MEMORY SORTS:")?;
    if state.slow_sorts.is_empty() {
        writeln!(out, "  (none over threshold)")?;
    }
    for (signature, mem_used) in sorted_by_severity(&state.slow_sorts) {
        writeln!(out, "  {} sorted in memory: {}", format_bytes(mem_used), signature)?;
    }

    writeln!(out, "\nOVER-FETCHING INDEX SCANS:")?;
    if state.overfetches.is_empty() {
        writeln!(out, "  (none over threshold)")?;
    }
    for (signature, surplus) in sorted_by_severity(&state.overfetches) {
        writeln!(out, "  {} surplus docs examined: {}", format_number(surplus), signature)?;
    }

    writeln!(out, "\nFULL COLLECTION SCANS:")?;
    if state.full_scans.is_empty() {
        writeln!(out, "  (none over threshold)")?;
    }
    for (signature, docs_scanned) in sorted_by_severity(&state.full_scans) {
        writeln!(out, "  {} docs scanned: {}", format_number(docs_scanned), signature)?;
    }

    writeln!(out, "\nINDEX USE COUNTS:")?;
    for (collection, counts) in &state.index_use_counts {
        writeln!(out, "  {collection}")?;
        for (index, count) in counts {
            writeln!(out, "    {index}: {}", format_number(*count))?;
        }
    }

    if diagnostics {
        render_diagnostics(state, out)?;
    }

    Ok(())
}

fn render_diagnostics(state: &AggregateState, out: &mut impl Write) -> Result<()> {
    if !state.unknown_operators.is_empty() {
        writeln!(out, "\nUNHANDLED OPERATORS FOUND:")?;
        for op in &state.unknown_operators {
            writeln!(out, "  {op}")?;
        }
    }
    if !state.unknown_command_shapes.is_empty() {
        writeln!(out, "\nUNHANDLED COMMAND SHAPES FOUND:")?;
        for shape in &state.unknown_command_shapes {
            writeln!(out, "  {shape}")?;
        }
    }
    if !state.summarized_collections.is_empty() {
        writeln!(out, "\nCOLLECTIONS WHERE SOME QUERIES COULD NOT BE ANALYZED:")?;
        for collection in &state.summarized_collections {
            writeln!(out, "  {collection}")?;
        }
    }
    Ok(())
}

/// Ascending by severity, signature as tiebreak so output is deterministic.
fn sorted_by_severity(bucket: &HashMap<String, u64>) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> =
        bucket.iter().map(|(signature, severity)| (signature.as_str(), *severity)).collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    entries
}

/// Dump the whole aggregate as pretty JSON for machine consumers.
pub fn export_json(state: &AggregateState, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, state)?;
    Ok(())
}

/// Dump the use-count table as CSV for spreadsheet triage.
pub fn export_use_counts_csv(state: &AggregateState, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["collection", "index", "uses"])?;
    for (collection, counts) in &state.index_use_counts {
        for (index, count) in counts {
            let count = count.to_string();
            writer.write_record([collection.as_str(), index.as_str(), count.as_str()])?;
        }
    }
    writer.flush()?;
    Ok(())
}
