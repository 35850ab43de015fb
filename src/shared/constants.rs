/// Prefix for every donation-proof object name
pub const OBJECT_PREFIX: &str = "bukti-transfer";

/// Content type used when none can be determined
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
