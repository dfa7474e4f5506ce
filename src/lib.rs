//! Classify MongoDB profiler records: which indexes are used, which queries
//! fall back to collection scans, and which sorts or fetches are wasteful.
//!
//! The classification core (`analyzer`) is pure and testable without a
//! server; everything that talks to MongoDB lives behind the blocking
//! facade in `connection`.

pub mod analyzer;
pub mod config;
pub mod connection;
pub mod error;
pub mod helpers;
pub mod models;
