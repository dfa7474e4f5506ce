// Legacy textual plan summaries
//
// Older servers sometimes hand back a pre-rendered summary string instead of
// a structured plan, of the shape `IXSCAN { user.name: 1, age: -1 }` with
// unquoted keys and bare word tokens. An OR of index scans renders several
// such clauses in one string. This module recovers a canonical index name
// from each clause.

use std::sync::LazyLock;

use mongodb::bson::Document;
use regex::Regex;
use thiserror::Error;

use crate::analyzer::index_name;

/// Leading tag of an index-scan clause in a textual plan summary.
pub const IXSCAN_TAG: &str = "IXSCAN";

/// A summary that could not be turned into index names. Contained by the
/// walker, which flags the originating collection as partially unanalyzable.
#[derive(Debug, Error)]
pub enum SummaryParseError {
    #[error("no key pattern after {IXSCAN_TAG} tag in {0:?}")]
    MissingPattern(String),

    #[error("unbalanced braces in summary {0:?}")]
    Unbalanced(String),

    #[error("key pattern is not a document literal: {0}")]
    Literal(String),
}

// Bare identifier-like tokens, including dotted paths (`user.name`) and the
// odd `$**` wildcard component.
static BARE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$.*]*").expect("valid token regex"));

/// Extract and normalize every `IXSCAN { ... }` clause in a degraded plan
/// summary, one canonical index name per clause.
pub fn parse_summary(text: &str) -> Result<Vec<String>, SummaryParseError> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find(IXSCAN_TAG) {
        rest = &rest[at + IXSCAN_TAG.len()..];
        let (pattern, end) = key_pattern(rest, text)?;
        names.push(parse_key_pattern(pattern)?);
        rest = &rest[end..];
    }
    if names.is_empty() {
        return Err(SummaryParseError::MissingPattern(text.to_string()));
    }
    Ok(names)
}

/// One `{ ... }` key pattern: quote the bare tokens so the remainder parses
/// as a lenient document literal, then normalize.
fn parse_key_pattern(pattern: &str) -> Result<String, SummaryParseError> {
    let quoted = BARE_TOKEN.replace_all(pattern, "\"${0}\"");
    let keys: Document =
        json5::from_str(&quoted).map_err(|err| SummaryParseError::Literal(err.to_string()))?;
    Ok(index_name::normalize(&keys))
}

/// Locate the brace-delimited key pattern at the start of `rest`, returning
/// the pattern slice and the offset just past its closing brace.
fn key_pattern<'a>(rest: &'a str, whole: &str) -> Result<(&'a str, usize), SummaryParseError> {
    let open = rest
        .find('{')
        .ok_or_else(|| SummaryParseError::MissingPattern(whole.to_string()))?;
    let mut depth = 0usize;
    for (offset, ch) in rest[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = open + offset + 1;
                    return Ok((&rest[open..end], end));
                }
            }
            _ => {}
        }
    }
    Err(SummaryParseError::Unbalanced(whole.to_string()))
}
