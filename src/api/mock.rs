use crate::api::{AdminApi, ApiFuture, ErrorBody};
use crate::error::ApiError;
use crate::models::{
    Client, HeaderMap, NotificationChannel, NotificationRequest, NotificationResponse,
    RateLimitConfig, SystemLimitConfig, ThrottlingMode, HEADER_TIMEWINDOW_LIMIT,
    HEADER_TIMEWINDOW_REMAINING,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// In-memory stand-in for the rate limiter backend
///
/// Behaves like the real service closely enough to drive the console
/// without a network: ids are unique (409 on duplicates), unknown ids answer
/// 404, blank ids answer 400 with a validation report, and notifications are
/// counted against each client's time window. HARD mode rejects with 429
/// once the window is used up; SOFT mode lets the request through with
/// `remaining = 0`.
///
/// Every call is counted per operation name and a failure can be queued for
/// the next call of a given operation.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MockState {
    clients: BTreeMap<String, Client>,
    rate_limits: BTreeMap<String, RateLimitConfig>,
    system: SystemLimitConfig,
    windows: HashMap<String, UsageWindow>,
    next_id: i64,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, ApiError>,
    last_client_header: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct UsageWindow {
    started_at: DateTime<Utc>,
    used: u64,
}

impl MockState {
    /// Count the call and hand back a queued failure, if any
    fn enter(&mut self, operation: &'static str) -> Result<(), ApiError> {
        *self.calls.entry(operation).or_insert(0) += 1;
        match self.failures.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

fn not_found(what: &str, client_id: &str) -> ApiError {
    ApiError::status(
        404,
        ErrorBody::Json {
            message: Some(format!("{} not found for client: {}", what, client_id)),
            errors: Vec::new(),
        },
    )
}

fn conflict(message: String) -> ApiError {
    ApiError::status(
        409,
        ErrorBody::Json {
            message: Some(message),
            errors: Vec::new(),
        },
    )
}

fn blank_field(field: &str) -> ApiError {
    ApiError::status(
        400,
        ErrorBody::parse(
            &serde_json::json!({
                "error": "Bad Request",
                "errors": [{ "field": field, "defaultMessage": format!("{} must not be blank", field) }]
            })
            .to_string(),
        ),
    )
}

fn now_text() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a client record
    pub fn with_client(self, client: Client) -> Self {
        {
            let mut state = self.lock();
            let id = state.assign_id();
            let mut client = client;
            client.id.get_or_insert(id);
            state.clients.insert(client.client_id.clone(), client);
        }
        self
    }

    /// Seed a rate-limit configuration
    pub fn with_rate_limit(self, config: RateLimitConfig) -> Self {
        {
            let mut state = self.lock();
            let id = state.assign_id();
            let mut config = config;
            config.id.get_or_insert(id);
            state.rate_limits.insert(config.client_id.clone(), config);
        }
        self
    }

    /// Seed the global limit
    pub fn with_system_limit(self, global_requests_per_second: u64) -> Self {
        self.lock().system.global_requests_per_second = global_requests_per_second;
        self
    }

    /// Delay every response (useful for exercising concurrent sends)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.lock().failures.insert(operation, error);
    }

    /// Number of times `operation` has been called
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// `X-Client-Id` of the last notification request
    pub fn last_client_header(&self) -> Option<String> {
        self.lock().last_client_header.clone()
    }

    /// Current client records
    pub fn clients(&self) -> Vec<Client> {
        self.lock().clients.values().cloned().collect()
    }

    /// Current rate-limit configurations
    pub fn rate_limits(&self) -> Vec<RateLimitConfig> {
        self.lock().rate_limits.values().cloned().collect()
    }

    /// Reset call counters and queued failures, keeping the records
    pub fn reset(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.failures.clear();
        state.windows.clear();
        state.last_client_header = None;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn notify(
        &self,
        client_id: &str,
        request: &NotificationRequest,
        channel: NotificationChannel,
    ) -> Result<NotificationResponse, ApiError> {
        let mut state = self.lock();
        state.enter("send_notification")?;
        state.last_client_header = Some(client_id.to_string());

        if client_id.trim().is_empty() {
            return Err(blank_field("X-Client-Id"));
        }
        if request.recipient.trim().is_empty() {
            return Err(blank_field("recipient"));
        }
        if !state.clients.contains_key(client_id) {
            return Err(not_found("Client", client_id));
        }

        let sent = NotificationResponse {
            status: 200,
            message: Some(format!("{} sent to {}", channel, request.recipient)),
            headers: HeaderMap::new(),
        };

        let Some(config) = state.rate_limits.get(client_id).cloned() else {
            return Ok(sent);
        };

        let now = Utc::now();
        let window_span = window_length(config.time_window_seconds);
        let window = state
            .windows
            .entry(client_id.to_string())
            .or_insert(UsageWindow {
                started_at: now,
                used: 0,
            });
        if now - window.started_at >= window_span {
            *window = UsageWindow {
                started_at: now,
                used: 0,
            };
        }

        let limit = config.time_window_requests;
        let over_quota = window.used >= limit;
        if !over_quota {
            window.used += 1;
        }

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_TIMEWINDOW_LIMIT.to_string(), limit.to_string());
        headers.insert(
            HEADER_TIMEWINDOW_REMAINING.to_string(),
            limit.saturating_sub(window.used).to_string(),
        );

        match (over_quota, config.throttling_mode) {
            (false, _) => Ok(NotificationResponse { headers, ..sent }),
            (true, ThrottlingMode::Soft) => Ok(NotificationResponse {
                headers,
                message: Some(format!(
                    "{} sent to {} (soft limit exceeded)",
                    channel, request.recipient
                )),
                ..sent
            }),
            (true, ThrottlingMode::Hard) => Err(ApiError::Http {
                status: 429,
                body: ErrorBody::Json {
                    message: Some("Rate limit exceeded".to_string()),
                    errors: Vec::new(),
                },
                headers,
            }),
        }
    }
}

impl AdminApi for MockBackend {
    fn base_url(&self) -> &str {
        "mock://rate-limiter/api"
    }

    fn list_clients(&self) -> ApiFuture<'_, Vec<Client>> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("list_clients")?;
            Ok(state.clients.values().cloned().collect())
        })
    }

    fn get_client<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, Client> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("get_client")?;
            state
                .clients
                .get(client_id)
                .cloned()
                .ok_or_else(|| not_found("Client", client_id))
        })
    }

    fn create_client<'a>(&'a self, client: &'a Client) -> ApiFuture<'a, Client> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("create_client")?;
            if client.client_id.trim().is_empty() {
                return Err(blank_field("clientId"));
            }
            if client.name.trim().is_empty() {
                return Err(blank_field("name"));
            }
            if state.clients.contains_key(&client.client_id) {
                return Err(conflict(format!(
                    "Client with ID {} already exists",
                    client.client_id
                )));
            }

            let mut created = client.clone();
            created.id = Some(state.assign_id());
            created.created_at = Some(now_text());
            created.updated_at = created.created_at.clone();
            state
                .clients
                .insert(created.client_id.clone(), created.clone());
            Ok(created)
        })
    }

    fn update_client<'a>(
        &'a self,
        client_id: &'a str,
        client: &'a Client,
    ) -> ApiFuture<'a, Client> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("update_client")?;
            let existing = state
                .clients
                .get(client_id)
                .cloned()
                .ok_or_else(|| not_found("Client", client_id))?;
            if client.name.trim().is_empty() {
                return Err(blank_field("name"));
            }

            let updated = Client {
                id: existing.id,
                client_id: existing.client_id.clone(),
                created_at: existing.created_at.clone(),
                updated_at: Some(now_text()),
                ..client.clone()
            };
            state.clients.insert(client_id.to_string(), updated.clone());
            Ok(updated)
        })
    }

    fn delete_client<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("delete_client")?;
            // Rate-limit configuration is intentionally left in place
            state
                .clients
                .remove(client_id)
                .map(|_| ())
                .ok_or_else(|| not_found("Client", client_id))
        })
    }

    fn list_rate_limits(&self) -> ApiFuture<'_, Vec<RateLimitConfig>> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("list_rate_limits")?;
            Ok(state.rate_limits.values().cloned().collect())
        })
    }

    fn get_rate_limit<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, RateLimitConfig> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("get_rate_limit")?;
            state
                .rate_limits
                .get(client_id)
                .cloned()
                .ok_or_else(|| not_found("Rate limit configuration", client_id))
        })
    }

    fn create_rate_limit<'a>(
        &'a self,
        config: &'a RateLimitConfig,
    ) -> ApiFuture<'a, RateLimitConfig> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("create_rate_limit")?;
            if config.client_id.trim().is_empty() {
                return Err(blank_field("clientId"));
            }
            if state.rate_limits.contains_key(&config.client_id) {
                return Err(conflict(format!(
                    "Rate limit configuration already exists for client: {}",
                    config.client_id
                )));
            }

            let mut created = config.clone();
            created.id = Some(state.assign_id());
            created.created_at = Some(now_text());
            created.updated_at = created.created_at.clone();
            state
                .rate_limits
                .insert(created.client_id.clone(), created.clone());
            Ok(created)
        })
    }

    fn update_rate_limit<'a>(
        &'a self,
        client_id: &'a str,
        config: &'a RateLimitConfig,
    ) -> ApiFuture<'a, RateLimitConfig> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("update_rate_limit")?;
            let existing = state
                .rate_limits
                .get(client_id)
                .cloned()
                .ok_or_else(|| not_found("Rate limit configuration", client_id))?;

            let updated = RateLimitConfig {
                id: existing.id,
                client_id: existing.client_id.clone(),
                created_at: existing.created_at.clone(),
                updated_at: Some(now_text()),
                ..config.clone()
            };
            state
                .rate_limits
                .insert(client_id.to_string(), updated.clone());
            // A new policy starts a fresh window
            state.windows.remove(client_id);
            Ok(updated)
        })
    }

    fn delete_rate_limit<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("delete_rate_limit")?;
            state.windows.remove(client_id);
            state
                .rate_limits
                .remove(client_id)
                .map(|_| ())
                .ok_or_else(|| not_found("Rate limit configuration", client_id))
        })
    }

    fn get_system_limits(&self) -> ApiFuture<'_, SystemLimitConfig> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("get_system_limits")?;
            Ok(state.system.clone())
        })
    }

    fn update_system_limits<'a>(
        &'a self,
        config: &'a SystemLimitConfig,
    ) -> ApiFuture<'a, SystemLimitConfig> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.enter("update_system_limits")?;
            if config.global_requests_per_second == 0 {
                return Err(ApiError::status(
                    400,
                    ErrorBody::Text("globalRequestsPerSecond must be positive".to_string()),
                ));
            }
            let id = state.system.id.or(Some(1));
            state.system = SystemLimitConfig {
                id,
                global_requests_per_second: config.global_requests_per_second,
            };
            Ok(state.system.clone())
        })
    }

    fn send_notification<'a>(
        &'a self,
        channel: NotificationChannel,
        client_id: &'a str,
        request: &'a NotificationRequest,
    ) -> ApiFuture<'a, NotificationResponse> {
        Box::pin(async move {
            self.pause().await;
            self.notify(client_id, request, channel)
        })
    }
}

/// Window length as a chrono duration, saturating for windows chrono cannot hold
fn window_length(seconds: u64) -> ChronoDuration {
    i64::try_from(seconds)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .unwrap_or(ChronoDuration::MAX)
}
