// Data structures shared across the analyzer

pub mod profile;

pub use profile::{OpKind, ProfilerRecord, u64_field};
