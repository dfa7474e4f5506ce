//! MongoDB connection management: the blocking facade over the async driver
//! plus the external collaborators the analyzer depends on (index
//! enumeration, profiler record stream, explain).

pub mod mongo;

pub use mongo::{ConnectionManager, MongoExplainer, ProfilerStream, get_connection_manager};
