//! Deterministic object naming for donation proofs.
//!
//! Names have the shape `bukti-transfer/<donationId>/<epochMillis>-<fileName>`.
//! Two uploads of the same file for the same donation within one millisecond
//! map to the same name and overwrite each other.

use chrono::Utc;

use crate::shared::constants::OBJECT_PREFIX;

/// Build the object name for an upload happening now
pub fn build_object_name(donation_id: &str, file_name: &str) -> String {
    build_object_name_at(donation_id, file_name, Utc::now().timestamp_millis())
}

/// Build the object name for an upload at a given epoch-millisecond timestamp
pub fn build_object_name_at(donation_id: &str, file_name: &str, timestamp_millis: i64) -> String {
    format!(
        "{}/{}/{}-{}",
        OBJECT_PREFIX, donation_id, timestamp_millis, file_name
    )
}

/// Percent-encode an object name for URLs and the `X-Bz-File-Name` header.
///
/// Each path segment is encoded separately so `/` separators survive.
pub fn encode_object_name(object_name: &str) -> String {
    object_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
