//! Integration settings and auth token types
//!
//! `IntegrationSettings` is the explicit context value passed through every
//! core call. It is constructed once per request or job and carries the
//! credentials, base URLs and company scoping that the original system read
//! from an ad-hoc settings singleton.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DUPLICATE_RETRY_DELAY, DEFAULT_MAX_ALLOWED_REVISIONS, DEFAULT_MAX_SUBMISSION_ATTEMPTS,
    DEFAULT_SUBMISSION_TIMEFRAME_SECS,
};
use crate::types::Doctype;

/// Bearer token pair issued by the auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Build a token set from an `expires_in` TTL in seconds.
    #[must_use]
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
        }
    }

    /// True when the token is expired or expires within `threshold_seconds`.
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        let cutoff = Utc::now() + ChronoDuration::seconds(threshold_seconds);
        self.expires_at <= cutoff
    }

    /// Seconds until expiry; negative when already expired.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }
}

/// Per-integration configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    /// Unique name of this settings record.
    pub name: String,
    pub company: String,
    /// Base URL of the fiscal service API.
    pub server_url: String,
    /// Base URL of the auth server (token and password endpoints).
    pub auth_server_url: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    /// Remote workstation id sent as the `X-Workstation` header when set.
    pub workstation_id: Option<String>,
    pub is_active: bool,
    pub sandbox: bool,
    /// Ceiling for automatic corrective credit notes per invoice.
    pub max_allowed_revisions: u32,
    pub max_sales_submission_attempts: u32,
    pub max_purchase_submission_attempts: u32,
    pub max_stock_submission_attempts: u32,
    pub sales_auto_submission_enabled: bool,
    pub purchase_auto_submission_enabled: bool,
    pub stock_auto_submission_enabled: bool,
    /// Lookback window for the periodic submission sweep, in seconds.
    pub submission_timeframe_secs: u64,
    /// Delay before retrying after a duplicate-entity compensation, in
    /// seconds. Kept configurable rather than hard-coded.
    pub duplicate_retry_delay_secs: u64,
}

impl IntegrationSettings {
    /// Attempt ceiling for the given document type.
    #[must_use]
    pub fn max_attempts_for(&self, doctype: Doctype) -> u32 {
        match doctype {
            Doctype::SalesInvoice => self.max_sales_submission_attempts,
            Doctype::PurchaseInvoice => self.max_purchase_submission_attempts,
            Doctype::StockAdjustment => self.max_stock_submission_attempts,
            _ => DEFAULT_MAX_SUBMISSION_ATTEMPTS,
        }
    }

    pub fn duplicate_retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.duplicate_retry_delay_secs)
    }
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            company: String::new(),
            server_url: String::new(),
            auth_server_url: String::new(),
            username: String::new(),
            password: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            workstation_id: None,
            is_active: true,
            sandbox: true,
            max_allowed_revisions: DEFAULT_MAX_ALLOWED_REVISIONS,
            max_sales_submission_attempts: DEFAULT_MAX_SUBMISSION_ATTEMPTS,
            max_purchase_submission_attempts: DEFAULT_MAX_SUBMISSION_ATTEMPTS,
            max_stock_submission_attempts: DEFAULT_MAX_SUBMISSION_ATTEMPTS,
            sales_auto_submission_enabled: false,
            purchase_auto_submission_enabled: false,
            stock_auto_submission_enabled: false,
            submission_timeframe_secs: DEFAULT_SUBMISSION_TIMEFRAME_SECS,
            duplicate_retry_delay_secs: DEFAULT_DUPLICATE_RETRY_DELAY.as_secs(),
        }
    }
}
