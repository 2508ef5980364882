//! Field naming convention shared by the generator and the consumer
//!
//! The consumer never sees the generator's registry. Everything it checks is
//! reconstructed from these names as they appear in store payloads.

use bson::{Bson, Document};

use crate::types::Marker;

/// Document key field
pub const ID_FIELD: &str = "_id";
/// Canonical marker field written when a document is created
pub const MARKER_FIELD: &str = "u";
/// Prefix of per-update tag fields (`u1`, `u2`, ...)
pub const TAG_PREFIX: &str = "u";
/// Optional auxiliary scalar
pub const SCALAR_FIELD: &str = "k";
/// Optional auxiliary timestamp
pub const TIMESTAMP_FIELD: &str = "d";

/// Name of the tag field for sequence number `seq`.
pub fn tag_name(seq: u64) -> String {
    format!("{}{}", TAG_PREFIX, seq)
}

/// True if `name` is a tag field: the prefix followed by at least one digit.
///
/// The bare canonical marker field does not count.
pub fn is_tag_name(name: &str) -> bool {
    match name.strip_prefix(TAG_PREFIX) {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Integer value of a BSON field, accepting both widths.
pub fn int_value(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int64(v) => Some(*v),
        Bson::Int32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

/// Marker stored under `field` in `document`, if present and integral.
pub fn marker_field(document: &Document, field: &str) -> Option<Marker> {
    document.get(field).and_then(int_value).map(Marker)
}
