//! Canonical default values shared by the manager, its workers and tests.

pub const DEFAULT_STATUS_STORE_URL: &str = "sqlite:tickets.sqlite";
/// Redeliveries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Fixed spacing between redeliveries.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;
/// Messages processed concurrently by one router.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;
/// Terminal tickets are kept this long before they may be purged.
pub const DEFAULT_TICKET_TTL_HOURS: i64 = 24;
/// Owner recorded on every catalog table we create.
pub const DEFAULT_TABLE_OWNER: &str = "tributary";
