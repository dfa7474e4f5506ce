// Canonical index naming

use mongodb::bson::{Bson, Document};

/// Name of the implicit primary-key index. The `_id` index is never declared,
/// so its name is a constant rather than something derived from a key spec.
pub const ID_INDEX: &str = "_id_";

/// Canonical name for an ordered key specification, matching the server's
/// default index naming: `{ a: 1, b: -1 }` -> `a_1_b_-1`.
///
/// Field order is significant and must survive: a `Document` keeps insertion
/// order, which is why the key spec is not handed around as a hash map.
pub fn normalize(keys: &Document) -> String {
    let mut parts = Vec::with_capacity(keys.len());
    for (field, direction) in keys {
        parts.push(format!("{}_{}", field, direction_token(direction)));
    }
    parts.join("_")
}

/// Directions are `1`/`-1` in some numeric BSON type, or a plain token for
/// special index kinds (`hashed`, `text`, `2dsphere`).
fn direction_token(value: &Bson) -> String {
    match value {
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) => (*n as i64).to_string(),
        Bson::String(token) => token.clone(),
        other => other.to_string(),
    }
}
