// Stage tree walker

use log::warn;

use crate::analyzer::index_name::ID_INDEX;
use crate::analyzer::plan::PlanNode;
use crate::analyzer::state::AggregateState;
use crate::analyzer::summary::{self, IXSCAN_TAG};
use crate::config::Thresholds;
use crate::models::ProfilerRecord;

/// Classify one plan node, attributing index use or flagging inefficiency,
/// then recurse into its children. Infallible: unknown stages were already
/// rejected when the tree was built, and degraded summaries downgrade to a
/// per-collection flag instead of an error.
pub fn classify(
    node: &PlanNode,
    collection: &str,
    record: &ProfilerRecord,
    thresholds: &Thresholds,
    state: &mut AggregateState,
) {
    match node {
        PlanNode::IndexScan { index_name } | PlanNode::CountScan { index_name } => {
            state.record_index_use(collection, index_name);
        }
        PlanNode::IdHack => {
            state.record_index_use(collection, ID_INDEX);
        }
        PlanNode::CollScan => {
            let scanned = record.docs_examined().unwrap_or(0);
            if scanned > thresholds.collscan_docs {
                state.record_full_scan(record.signature(), scanned);
            }
            // sub-threshold scans are noise: tiny collections scan fine
        }
        PlanNode::Sort { mem_usage } => {
            if *mem_usage > thresholds.sort_mem_bytes {
                state.record_slow_sort(record.signature(), *mem_usage);
            }
        }
        PlanNode::Fetch { n_returned, docs_examined, children } => {
            // an index that matched far more than it returned still cost us
            if n_returned + thresholds.fetch_surplus < *docs_examined {
                state.record_overfetch(record.signature(), docs_examined - n_returned);
            }
            for child in children {
                classify(child, collection, record, thresholds, state);
            }
        }
        PlanNode::PassThrough { children, .. } => {
            for child in children {
                classify(child, collection, record, thresholds, state);
            }
        }
        PlanNode::Eof => {}
        PlanNode::Summary { text } => {
            if text.trim_start().starts_with(IXSCAN_TAG) {
                match summary::parse_summary(text) {
                    Ok(names) => {
                        for name in names {
                            state.record_index_use(collection, &name);
                        }
                    }
                    Err(err) => {
                        warn!("unparsable plan summary for {collection}: {err}");
                        state.mark_summarized(collection);
                    }
                }
            } else {
                state.mark_summarized(collection);
            }
        }
    }
}
