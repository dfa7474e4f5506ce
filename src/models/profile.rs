// Profiler record model

use mongodb::bson::{Bson, Document};

/// Operation kind tag on a profiler record. Decided once, up front, so the
/// dispatcher never re-probes raw strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Query,
    Update,
    Remove,
    Command,
    Insert,
    KillCursors,
    GetMore,
    Other,
}

impl OpKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "query" => Self::Query,
            "update" => Self::Update,
            "remove" => Self::Remove,
            "command" => Self::Command,
            "insert" => Self::Insert,
            "killcursors" => Self::KillCursors,
            "getmore" => Self::GetMore,
            _ => Self::Other,
        }
    }
}

/// One `system.profile` entry. Wraps the raw document so signature rendering
/// and diagnostics can reproduce exactly what the server recorded.
#[derive(Clone, Debug)]
pub struct ProfilerRecord {
    doc: Document,
}

impl ProfilerRecord {
    pub fn new(doc: Document) -> Self {
        Self { doc }
    }

    pub fn op(&self) -> OpKind {
        OpKind::from_tag(self.op_tag())
    }

    /// Raw operation tag, kept for the unknown-operator diagnostic set.
    pub fn op_tag(&self) -> &str {
        self.doc.get_str("op").unwrap_or_default()
    }

    /// Full namespace, `<database>.<collection>`.
    pub fn ns(&self) -> &str {
        self.doc.get_str("ns").unwrap_or_default()
    }

    /// Collection part of the namespace (everything after the first dot).
    pub fn collection(&self) -> &str {
        let ns = self.ns();
        ns.split_once('.').map(|(_, collection)| collection).unwrap_or(ns)
    }

    pub fn query(&self) -> Option<&Document> {
        self.doc.get_document("query").ok()
    }

    pub fn update_obj(&self) -> Option<&Document> {
        self.doc.get_document("updateobj").ok()
    }

    /// Command payload. Usually a document; the profiler truncates very large
    /// commands to a string, so callers must handle both.
    pub fn command(&self) -> Option<&Bson> {
        self.doc.get("command")
    }

    /// Embedded winning-plan execution stats (present on `query` records).
    pub fn exec_stats(&self) -> Option<&Document> {
        self.doc.get_document("execStats").ok()
    }

    /// Documents the whole operation scanned, per the profiler. Older
    /// servers report this as `nscanned`.
    pub fn docs_examined(&self) -> Option<u64> {
        u64_field(&self.doc, "docsExamined").or_else(|| u64_field(&self.doc, "nscanned"))
    }

    pub fn millis(&self) -> Option<u64> {
        u64_field(&self.doc, "millis")
    }

    /// Stable serialization of the triggering query: namespace plus the
    /// query-shape payload. BSON documents keep field order, so identical
    /// operations produce identical signatures across runs.
    pub fn signature(&self) -> String {
        let mut parts = vec![self.ns().to_string()];
        if let Some(query) = self.query() {
            parts.push(relaxed_json(&Bson::Document(query.clone())));
        } else if let Some(command) = self.command() {
            parts.push(relaxed_json(command));
        }
        if let Some(update) = self.update_obj() {
            parts.push(relaxed_json(&Bson::Document(update.clone())));
        }
        parts.join(" ")
    }

    /// Compact JSON rendering of the whole record, for diagnostics.
    pub fn to_json(&self) -> String {
        relaxed_json(&Bson::Document(self.doc.clone()))
    }
}

fn relaxed_json(value: &Bson) -> String {
    let json = value.clone().into_relaxed_extjson();
    serde_json::to_string(&json).unwrap_or_else(|_| format!("{value:?}"))
}

/// Read a numeric field regardless of which BSON number type the server
/// chose for it.
pub fn u64_field(doc: &Document, key: &str) -> Option<u64> {
    match doc.get(key)? {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(n) if *n >= 0.0 => Some(*n as u64),
        _ => None,
    }
}
