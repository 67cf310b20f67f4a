//! Records exchanged with the rate limiter backend
//!
//! These mirror the JSON bodies of the REST API one to one. Field names are
//! camelCase on the wire; optional server-managed fields (`id`, timestamps)
//! are skipped when absent so create requests only carry what the operator
//! typed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Header carrying the request quota of the current time window
pub const HEADER_TIMEWINDOW_LIMIT: &str = "x-ratelimit-timewindow-limit";

/// Header carrying the requests left in the current time window
pub const HEADER_TIMEWINDOW_REMAINING: &str = "x-ratelimit-timewindow-remaining";

/// Header identifying the tenant a notification is sent on behalf of
pub const HEADER_CLIENT_ID: &str = "X-Client-Id";

/// A tenant registered with the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub client_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Client {
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// What the backend does once a client exhausts its quota
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThrottlingMode {
    /// Requests over quota are allowed with a warning
    Soft,
    /// Requests over quota are rejected with 429
    #[default]
    Hard,
}

impl fmt::Display for ThrottlingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottlingMode::Soft => write!(f, "SOFT"),
            ThrottlingMode::Hard => write!(f, "HARD"),
        }
    }
}

impl FromStr for ThrottlingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SOFT" => Ok(ThrottlingMode::Soft),
            "HARD" => Ok(ThrottlingMode::Hard),
            other => Err(format!("unknown throttling mode: {}", other)),
        }
    }
}

/// Per-client quota policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub client_id: String,
    pub time_window_requests: u64,
    pub time_window_seconds: u64,
    pub monthly_requests: u64,
    pub throttling_mode: ThrottlingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Default for RateLimitConfig {
    /// The values a fresh configuration form starts from
    fn default() -> Self {
        Self {
            id: None,
            client_id: String::new(),
            time_window_requests: 100,
            time_window_seconds: 60,
            monthly_requests: 10_000,
            throttling_mode: ThrottlingMode::Hard,
            created_at: None,
            updated_at: None,
        }
    }
}

/// The single global throughput cap
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemLimitConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub global_requests_per_second: u64,
}

impl Default for SystemLimitConfig {
    fn default() -> Self {
        Self {
            id: None,
            global_requests_per_second: 1000,
        }
    }
}

/// Body of a test notification
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub recipient: String,
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl NotificationRequest {
    pub fn new(recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            message: message.into(),
            kind: None,
        }
    }
}

/// Delivery channel of a test notification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    #[default]
    Email,
    Sms,
}

impl NotificationChannel {
    /// Path segment under `/notifications`
    pub fn path(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for NotificationChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(NotificationChannel::Email),
            "sms" => Ok(NotificationChannel::Sms),
            other => Err(format!("unknown notification channel: {}", other)),
        }
    }
}

/// Lowercase-keyed response headers, ordered for stable display
pub type HeaderMap = BTreeMap<String, String>;

/// Quota headers the backend attaches to notification responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let parse = |name: &str| headers.get(name).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            limit: parse(HEADER_TIMEWINDOW_LIMIT),
            remaining: parse(HEADER_TIMEWINDOW_REMAINING),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none()
    }
}

/// Successful answer to a notification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    pub status: u16,
    /// `message` field of the response body, when there is one
    pub message: Option<String>,
    pub headers: HeaderMap,
}

impl NotificationResponse {
    pub fn rate_limit(&self) -> RateLimitHeaders {
        RateLimitHeaders::from_headers(&self.headers)
    }
}
