// Operation dispatcher
//
// One profiler record in, at most one classified plan tree out. Read
// operations embed their winning plan; writes and commands need an explain
// round-trip through the `Explainer` collaborator.

use std::sync::LazyLock;

use log::{debug, warn};
use mongodb::bson::{Bson, Document};
use regex::Regex;

use crate::analyzer::plan::PlanNode;
use crate::analyzer::state::AggregateState;
use crate::analyzer::walker;
use crate::config::Thresholds;
use crate::error::Result;
use crate::models::{OpKind, ProfilerRecord};

/// Plan-fetching collaborator. The production implementation drives the
/// server's explain facility; tests substitute canned plans.
pub trait Explainer {
    fn explain_find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> Result<Document>;

    fn explain_count(&self, collection: &str, filter: Document) -> Result<Document>;

    fn explain_update(&self, collection: &str, filter: Document, update: Document)
    -> Result<Document>;

    fn explain_delete(&self, collection: &str, filter: Document) -> Result<Document>;

    /// Pipeline stages of an aggregate explain, cursor-backed stage included.
    fn explain_aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>>;
}

/// What the dispatcher did with one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Classified,
    Skipped,
}

/// Command kinds that never carry a query shape worth classifying.
const IGNORED_COMMANDS: &[&str] = &["listIndexes", "dbStats", "profile", "collStats"];

/// Resolve a plan tree for one profiler record and classify it. The only
/// error that escapes is the fatal-for-record unknown-stage rejection; every
/// degraded input path downgrades to a skip plus a per-collection flag.
pub fn classify_record(
    record: &ProfilerRecord,
    explainer: &dyn Explainer,
    thresholds: &Thresholds,
    state: &mut AggregateState,
) -> Result<Outcome> {
    match record.op() {
        OpKind::Query => {
            let Some(stats) = record.exec_stats() else {
                warn!("query record on {} has no execStats", record.ns());
                state.mark_summarized(record.collection());
                return Ok(Outcome::Skipped);
            };
            classify_plan(stats, record.collection(), record, thresholds, state)
        }
        OpKind::Update => {
            let collection = record.collection();
            let (Some(filter), Some(update)) = (record.query(), record.update_obj()) else {
                // payload truncated or stringified by the profiler
                state.mark_summarized(collection);
                return Ok(Outcome::Skipped);
            };
            match explainer.explain_update(collection, filter.clone(), update.clone()) {
                Ok(explain) => {
                    classify_explain_reply(&explain, collection, record, thresholds, state)
                }
                Err(err) => degraded(collection, "update explain", &err, state),
            }
        }
        OpKind::Remove => {
            let collection = record.collection();
            let Some(filter) = record.query() else {
                state.mark_summarized(collection);
                return Ok(Outcome::Skipped);
            };
            match explainer.explain_delete(collection, filter.clone()) {
                Ok(explain) => {
                    classify_explain_reply(&explain, collection, record, thresholds, state)
                }
                Err(err) => degraded(collection, "remove explain", &err, state),
            }
        }
        OpKind::Command => classify_command(record, explainer, thresholds, state),
        OpKind::Insert | OpKind::KillCursors | OpKind::GetMore => {
            debug!("skipping {} record on {}", record.op_tag(), record.ns());
            Ok(Outcome::Skipped)
        }
        OpKind::Other => {
            state.record_unknown_operator(record.op_tag());
            Ok(Outcome::Skipped)
        }
    }
}

fn classify_command(
    record: &ProfilerRecord,
    explainer: &dyn Explainer,
    thresholds: &Thresholds,
    state: &mut AggregateState,
) -> Result<Outcome> {
    let command = match record.command() {
        Some(Bson::Document(doc)) => doc,
        Some(Bson::String(text)) => {
            // command too large for the profiler; only a truncated textual
            // rendering survives, so recover the collection and move on
            match collection_from_truncated(text) {
                Some(collection) => state.mark_summarized(&collection),
                None => warn!("truncated command with no recoverable collection: {text:?}"),
            }
            return Ok(Outcome::Skipped);
        }
        _ => {
            state.record_unknown_command("<missing command>".to_string());
            return Ok(Outcome::Skipped);
        }
    };

    if let Ok(collection) = command.get_str("aggregate") {
        let pipeline = pipeline_stages(command);
        let stages = match explainer.explain_aggregate(collection, pipeline) {
            Ok(stages) => stages,
            Err(err) => return degraded(collection, "aggregate explain", &err, state),
        };
        // only the initial cursor-backed stage reads from an index; later
        // pipeline stages transform what the cursor already produced
        let Some(plan) = stages
            .iter()
            .find_map(|stage| stage.get_document("$cursor").ok().and_then(winning_plan))
        else {
            debug!("aggregate on {collection} has no cursor-backed stage");
            return Ok(Outcome::Skipped);
        };
        return classify_plan(plan, collection, record, thresholds, state);
    }

    if let Ok(collection) = command.get_str("count") {
        let filter = command_filter(command);
        return match explainer.explain_count(collection, filter) {
            Ok(explain) => classify_explain_reply(&explain, collection, record, thresholds, state),
            Err(err) => degraded(collection, "count explain", &err, state),
        };
    }

    if let Ok(collection) = command.get_str("distinct") {
        let filter = command_filter(command);
        return match explainer.explain_find(collection, filter, None) {
            Ok(explain) => classify_explain_reply(&explain, collection, record, thresholds, state),
            Err(err) => degraded(collection, "distinct explain", &err, state),
        };
    }

    if let Ok(collection) =
        command.get_str("findAndModify").or_else(|_| command.get_str("findandmodify"))
    {
        let filter = command_filter(command);
        let sort = command.get_document("sort").ok().cloned();
        return match explainer.explain_find(collection, filter, sort) {
            Ok(explain) => classify_explain_reply(&explain, collection, record, thresholds, state),
            Err(err) => degraded(collection, "findAndModify explain", &err, state),
        };
    }

    if let Ok(collection) = command.get_str("mapreduce").or_else(|_| command.get_str("mapReduce"))
    {
        let filter = command_filter(command);
        return match explainer.explain_find(collection, filter, None) {
            Ok(explain) => classify_explain_reply(&explain, collection, record, thresholds, state),
            Err(err) => degraded(collection, "mapreduce explain", &err, state),
        };
    }

    if IGNORED_COMMANDS.iter().any(|key| command.contains_key(key)) {
        return Ok(Outcome::Skipped);
    }

    state.record_unknown_command(command_shape(command));
    Ok(Outcome::Skipped)
}

/// Build the tree and walk it.
fn classify_plan(
    plan: &Document,
    collection: &str,
    record: &ProfilerRecord,
    thresholds: &Thresholds,
    state: &mut AggregateState,
) -> Result<Outcome> {
    let node = PlanNode::from_document(plan, record)?;
    walker::classify(&node, collection, record, thresholds, state);
    Ok(Outcome::Classified)
}

/// Explain replies root their plan under `queryPlanner.winningPlan`.
fn classify_explain_reply(
    explain: &Document,
    collection: &str,
    record: &ProfilerRecord,
    thresholds: &Thresholds,
    state: &mut AggregateState,
) -> Result<Outcome> {
    let Some(plan) = winning_plan(explain) else {
        warn!("explain for {collection} carries no winning plan");
        state.mark_summarized(collection);
        return Ok(Outcome::Skipped);
    };
    classify_plan(plan, collection, record, thresholds, state)
}

fn winning_plan(explain: &Document) -> Option<&Document> {
    explain.get_document("queryPlanner").ok()?.get_document("winningPlan").ok()
}

/// An explain failure degrades the collection, never the run.
fn degraded(
    collection: &str,
    what: &str,
    err: &crate::error::Error,
    state: &mut AggregateState,
) -> Result<Outcome> {
    warn!("{what} failed for {collection}: {err}");
    state.mark_summarized(collection);
    Ok(Outcome::Skipped)
}

fn command_filter(command: &Document) -> Document {
    command.get_document("query").cloned().unwrap_or_default()
}

fn pipeline_stages(command: &Document) -> Vec<Document> {
    command
        .get_array("pipeline")
        .map(|stages| stages.iter().filter_map(|stage| stage.as_document().cloned()).collect())
        .unwrap_or_default()
}

/// Sorted key list, the same shape diagnostics have always used to describe
/// an unhandled command.
fn command_shape(command: &Document) -> String {
    let mut keys: Vec<String> = command.iter().map(|(key, _)| key.to_string()).collect();
    keys.sort_unstable();
    format!("[{}]", keys.join(", "))
}

// First `key: "value"` pair in a truncated command rendering; the value is
// the target collection for every command shape we care about.
static TRUNCATED_COLLECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[A-Za-z_$][A-Za-z0-9_$]*\s*:\s*"([^"]+)""#).expect("valid truncation regex")
});

fn collection_from_truncated(text: &str) -> Option<String> {
    TRUNCATED_COLLECTION.captures(text).map(|captures| captures[1].to_string())
}
