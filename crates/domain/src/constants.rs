//! Shared constants for the integration pipeline

use std::time::Duration;

/// Maximum length of the accumulated output/error text on a request log.
/// Longer content is truncated, never rejected.
pub const REQUEST_LOG_TEXT_CAP: usize = 5_000;

/// Default timeout for simple remote calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for bulk code-list fetches, which can run for a very long time
/// on the remote side.
pub const BULK_REQUEST_TIMEOUT: Duration = Duration::from_secs(1_800);

/// Default ceiling for automatic corrective credit notes per invoice.
pub const DEFAULT_MAX_ALLOWED_REVISIONS: u32 = 3;

/// Default per-document submission attempt ceiling used by the sweep.
pub const DEFAULT_MAX_SUBMISSION_ATTEMPTS: u32 = 3;

/// Default lookback window for the periodic submission sweep.
pub const DEFAULT_SUBMISSION_TIMEFRAME_SECS: u64 = 86_400;

/// Default delay before retrying after a duplicate-entity compensation.
pub const DEFAULT_DUPLICATE_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Minimum length for generated auth passwords.
pub const MIN_GENERATED_PASSWORD_LEN: usize = 16;

/// Failure-body marker indicating the stored auth password itself is stale.
pub const STALE_PASSWORD_MARKER: &str = "could not decode json";

/// Taxation rate threshold (percent) for code B.
pub const TAX_CODE_B_THRESHOLD: f64 = 16.0;

/// Taxation rate threshold (percent) for code E.
pub const TAX_CODE_E_THRESHOLD: f64 = 8.0;
