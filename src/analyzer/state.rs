// Aggregate run state

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

/// Everything one classification run accumulates. Created once at run start,
/// exclusively owned by the sequential classification loop, read once at the
/// end by the reporter.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct AggregateState {
    /// collection -> index name -> use count. Pre-seeded at zero from the
    /// declared indexes so unused indexes report as zero rather than vanish.
    pub index_use_counts: BTreeMap<String, BTreeMap<String, u64>>,
    /// Distinct full-scan signatures -> documents scanned.
    pub full_scans: HashMap<String, u64>,
    /// Distinct in-memory-sort signatures -> bytes of sort memory used.
    pub slow_sorts: HashMap<String, u64>,
    /// Distinct over-fetching signatures -> surplus documents examined.
    pub overfetches: HashMap<String, u64>,
    /// Collections for which some input could not be classified.
    pub summarized_collections: BTreeSet<String>,
    /// Operation tags the dispatcher did not recognize.
    pub unknown_operators: BTreeSet<String>,
    /// Command key shapes the dispatcher did not recognize.
    pub unknown_command_shapes: BTreeSet<String>,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declared index at zero uses.
    pub fn seed_index(&mut self, collection: &str, index_name: &str) {
        self.index_use_counts
            .entry(collection.to_string())
            .or_default()
            .entry(index_name.to_string())
            .or_insert(0);
    }

    pub fn record_index_use(&mut self, collection: &str, index_name: &str) {
        *self
            .index_use_counts
            .entry(collection.to_string())
            .or_default()
            .entry(index_name.to_string())
            .or_insert(0) += 1;
    }

    /// Severity buckets are sets keyed by signature; a repeat observation
    /// keeps the worst severity seen.
    pub fn record_full_scan(&mut self, signature: String, docs_scanned: u64) {
        let entry = self.full_scans.entry(signature).or_insert(0);
        *entry = (*entry).max(docs_scanned);
    }

    pub fn record_slow_sort(&mut self, signature: String, mem_used: u64) {
        let entry = self.slow_sorts.entry(signature).or_insert(0);
        *entry = (*entry).max(mem_used);
    }

    pub fn record_overfetch(&mut self, signature: String, surplus: u64) {
        let entry = self.overfetches.entry(signature).or_insert(0);
        *entry = (*entry).max(surplus);
    }

    pub fn mark_summarized(&mut self, collection: &str) {
        self.summarized_collections.insert(collection.to_string());
    }

    pub fn record_unknown_operator(&mut self, op: &str) {
        self.unknown_operators.insert(op.to_string());
    }

    pub fn record_unknown_command(&mut self, shape: String) {
        self.unknown_command_shapes.insert(shape);
    }
}
