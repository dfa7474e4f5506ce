// Plan-tree model
//
// Explain output is a loosely structured tree whose node shape varies by
// stage and server version. All field probing happens here, once, when the
// raw document is turned into a `PlanNode`; the walker only ever dispatches
// on the closed variant set.

use mongodb::bson::{Bson, Document};

use crate::analyzer::index_name;
use crate::error::{Error, Result};
use crate::models::{ProfilerRecord, u64_field};

/// One node of a query plan, discriminated up front.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanNode {
    /// `IXSCAN`: an index satisfied the query
    IndexScan { index_name: String },
    /// `COUNT_SCAN`: a count answered from an index
    CountScan { index_name: String },
    /// `IDHACK`: direct primary-key lookup, the `_id` index is implied
    IdHack,
    /// `COLLSCAN`: full collection scan
    CollScan,
    /// `SORT`: in-memory sort, no index provided the order
    Sort { mem_usage: u64 },
    /// `FETCH`: document materialization, with examine/return counters
    Fetch { n_returned: u64, docs_examined: u64, children: Vec<PlanNode> },
    /// Structural stages that only forward to their input stage(s)
    PassThrough { stage: String, children: Vec<PlanNode> },
    /// `EOF`: exhausted stream marker
    Eof,
    /// Degraded output: a pre-rendered text summary instead of children
    Summary { text: String },
}

const PASS_THROUGH_STAGES: &[&str] = &[
    "SUBPLAN",
    "OR",
    "CACHED_PLAN",
    "COUNT",
    "LIMIT",
    "PROJECTION",
    "UPDATE",
    "SKIP",
    "DELETE",
    "SORT_MERGE",
];

impl PlanNode {
    /// Build a node (and its subtree) from a raw explain document. Unknown
    /// stage tags are rejected here, loudly, so they can never masquerade as
    /// handled further down.
    pub fn from_document(doc: &Document, record: &ProfilerRecord) -> Result<Self> {
        let stage = doc.get_str("stage").ok();
        match stage {
            Some("IXSCAN") => {
                Ok(Self::IndexScan { index_name: resolve_index_name(doc, "IXSCAN", record)? })
            }
            Some("COUNT_SCAN") => {
                Ok(Self::CountScan { index_name: resolve_index_name(doc, "COUNT_SCAN", record)? })
            }
            Some("IDHACK") => Ok(Self::IdHack),
            Some("COLLSCAN") => Ok(Self::CollScan),
            Some("SORT") => Ok(Self::Sort { mem_usage: u64_field(doc, "memUsage").unwrap_or(0) }),
            Some("FETCH") => Ok(Self::Fetch {
                n_returned: u64_field(doc, "nReturned").unwrap_or(0),
                docs_examined: u64_field(doc, "docsExamined").unwrap_or(0),
                children: child_nodes(doc, record)?,
            }),
            Some("EOF") => Ok(Self::Eof),
            Some(tag) if PASS_THROUGH_STAGES.contains(&tag) => Ok(Self::PassThrough {
                stage: tag.to_string(),
                children: child_nodes(doc, record)?,
            }),
            other => {
                // Degraded explain output carries only a rendered summary;
                // the server version decides, not us.
                if let Ok(text) = doc.get_str("summary") {
                    return Ok(Self::Summary { text: text.to_string() });
                }
                Err(Error::UnknownStage {
                    stage: other.unwrap_or("<missing>").to_string(),
                    record: record.to_json(),
                })
            }
        }
    }
}

/// Index-use stages name their index directly; when the name is absent the
/// key pattern still identifies it via the canonical naming scheme.
fn resolve_index_name(doc: &Document, stage: &str, record: &ProfilerRecord) -> Result<String> {
    if let Ok(name) = doc.get_str("indexName") {
        return Ok(name.to_string());
    }
    if let Ok(keys) = doc.get_document("keyPattern") {
        return Ok(index_name::normalize(keys));
    }
    Err(Error::MissingIndexName { stage: stage.to_string(), record: record.to_json() })
}

/// Single child under `inputStage`, many under `inputStages`, or a leaf.
fn child_nodes(doc: &Document, record: &ProfilerRecord) -> Result<Vec<PlanNode>> {
    if let Ok(child) = doc.get_document("inputStage") {
        return Ok(vec![PlanNode::from_document(child, record)?]);
    }
    let mut children = Vec::new();
    if let Ok(stages) = doc.get_array("inputStages") {
        for stage in stages {
            if let Bson::Document(child) = stage {
                children.push(PlanNode::from_document(child, record)?);
            }
        }
    }
    Ok(children)
}
