/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

// =============================================================================
// RATE LIMIT HEADERS
// =============================================================================

pub const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RATE_LIMIT_TYPE: &str = "x-ratelimit-type";

/// Method value of an endpoint limit that applies to every HTTP method
pub const WILDCARD_METHOD: &str = "*";

/// Upper bound on an activity retention period, in days
pub const MAX_RETENTION_DAYS: i64 = 36500;
