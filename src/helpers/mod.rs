pub mod format;
pub mod validate;

pub use format::{format_bytes, format_number};
pub use validate::{REDACTED_PASSWORD, redact_uri_password, validate_mongodb_uri};
