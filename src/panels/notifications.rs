use crate::api::{describe_error, AdminApi, StatusHints};
use crate::error::{ApiError, ErrorKind, PanelError, ValidationError};
use crate::models::{
    Client, HeaderMap, NotificationChannel, NotificationRequest, NotificationResponse,
    RateLimitHeaders,
};
use crate::panels::{render_table, Panel, PanelFuture};
use crate::toasts::Toaster;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Number of requests a burst sends by default
pub const DEFAULT_BURST_SIZE: usize = 10;

/// Outcome of one test notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    /// HTTP status; `None` when no response was received
    pub status: Option<u16>,
    pub message: String,
    /// Response headers, lowercased
    pub headers: HeaderMap,
    pub error: bool,
}

impl NotificationResult {
    fn sent(response: NotificationResponse) -> Self {
        Self {
            status: Some(response.status),
            message: response.message.unwrap_or_else(|| "Success".to_string()),
            headers: response.headers,
            error: false,
        }
    }

    fn failed(err: &ApiError, rate_limited_message: &str, base_url: &str) -> Self {
        let message = if err.is_rate_limited() {
            rate_limited_message.to_string()
        } else {
            describe_error(err, base_url, StatusHints::NONE)
        };
        Self {
            status: err.status_code().filter(|status| *status != 0),
            message,
            headers: err.headers().cloned().unwrap_or_default(),
            error: true,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }

    pub fn rate_limit(&self) -> RateLimitHeaders {
        RateLimitHeaders::from_headers(&self.headers)
    }
}

/// One row of the results table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSlot {
    Pending,
    Done(NotificationResult),
}

/// Sends test notifications on behalf of a client to observe throttling
pub struct NotificationTestPanel {
    api: Arc<dyn AdminApi>,
    toaster: Toaster,
    pub client_id: String,
    pub channel: NotificationChannel,
    pub request: NotificationRequest,
    clients: Vec<Client>,
    results: Vec<ResultSlot>,
    loading: bool,
    burst_size: usize,
}

impl NotificationTestPanel {
    pub fn new(api: Arc<dyn AdminApi>, toaster: Toaster) -> Self {
        Self {
            api,
            toaster,
            client_id: String::new(),
            channel: NotificationChannel::default(),
            request: NotificationRequest::default(),
            clients: Vec::new(),
            results: Vec::new(),
            loading: false,
            burst_size: DEFAULT_BURST_SIZE,
        }
    }

    pub fn with_burst_size(mut self, burst_size: usize) -> Self {
        self.burst_size = burst_size.max(1);
        self
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn results(&self) -> &[ResultSlot] {
        &self.results
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Refresh the client picker
    ///
    /// The list is emptied on failure. Connectivity failures are expected
    /// while the backend starts up and raise no toast.
    pub async fn load_clients(&mut self) -> Result<(), PanelError> {
        match self.api.list_clients().await {
            Ok(clients) => {
                self.clients = clients;
                Ok(())
            }
            Err(e) => {
                self.clients.clear();
                let message = describe_error(&e, self.api.base_url(), StatusHints::CLIENT_LISTING);
                if e.kind() == ErrorKind::Connectivity {
                    debug!("Backend not reachable for client list: {}", message);
                } else {
                    self.toaster
                        .error(&format!("error loading clients: {}", message.to_lowercase()));
                }
                Err(PanelError::Api { message, source: e })
            }
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let blank = |s: &str| s.trim().is_empty();
        if blank(&self.client_id) || blank(&self.request.recipient) || blank(&self.request.message)
        {
            return Err(ValidationError::IncompleteForm);
        }
        Ok(())
    }

    fn check_form(&self) -> Result<(), PanelError> {
        self.validate().map_err(|e| {
            self.toaster.error(&e.to_string());
            PanelError::from(e)
        })
    }

    /// Send one notification and record its outcome
    ///
    /// Once the form is valid this returns the result even when the backend
    /// refused the request; a 429 is an expected outcome, not a failure.
    pub async fn send_notification(&mut self) -> Result<NotificationResult, PanelError> {
        self.check_form()?;

        self.loading = true;
        self.results = vec![ResultSlot::Pending];
        let outcome = self
            .api
            .send_notification(self.channel, &self.client_id, &self.request)
            .await;

        let result = match outcome {
            Ok(response) => {
                info!("{} notification accepted for {}", self.channel, self.client_id);
                self.toaster.success("Notification sent successfully");
                NotificationResult::sent(response)
            }
            Err(e) => {
                let result = NotificationResult::failed(
                    &e,
                    "Rate limit exceeded (429). This is expected when testing rate limiting",
                    self.api.base_url(),
                );
                if result.is_rate_limited() {
                    warn!("Notification throttled for {}", self.client_id);
                    self.toaster
                        .warning("Rate limit exceeded - Check results table for details");
                } else {
                    self.toaster.error(&format!("Error: {}", result.message));
                }
                result
            }
        };

        self.results = vec![ResultSlot::Done(result.clone())];
        self.loading = false;
        Ok(result)
    }

    /// Send `burst_size` notifications at once
    ///
    /// Each result lands in its own slot as it completes, whatever the order.
    pub async fn send_burst(&mut self) -> Result<Vec<NotificationResult>, PanelError> {
        self.check_form()?;

        self.loading = true;
        self.results = vec![ResultSlot::Pending; self.burst_size];

        let mut tasks = JoinSet::new();
        for index in 0..self.burst_size {
            let api = Arc::clone(&self.api);
            let channel = self.channel;
            let client_id = self.client_id.clone();
            let request = self.request.clone();
            tasks.spawn(async move {
                let outcome = api.send_notification(channel, &client_id, &request).await;
                (index, outcome)
            });
        }

        let base_url = self.api.base_url().to_string();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    let result = match outcome {
                        Ok(response) => NotificationResult::sent(response),
                        Err(e) => NotificationResult::failed(
                            &e,
                            "Rate limit exceeded. Status Code:429",
                            &base_url,
                        ),
                    };
                    if let Some(slot) = self.results.get_mut(index) {
                        *slot = ResultSlot::Done(result);
                    }
                }
                Err(e) => warn!("Burst request task failed: {}", e),
            }
        }

        let results: Vec<NotificationResult> = self
            .results
            .iter_mut()
            .map(|slot| match slot {
                ResultSlot::Done(result) => result.clone(),
                ResultSlot::Pending => {
                    let result = NotificationResult {
                        status: None,
                        message: "Request failed".to_string(),
                        headers: HeaderMap::new(),
                        error: true,
                    };
                    *slot = ResultSlot::Done(result.clone());
                    result
                }
            })
            .collect();

        let throttled = results.iter().filter(|r| r.is_rate_limited()).count();
        info!(
            "Burst of {} for {} done, {} throttled",
            results.len(),
            self.client_id,
            throttled
        );
        self.loading = false;
        self.toaster.info("All requests completed");
        Ok(results)
    }
}

impl Panel for NotificationTestPanel {
    fn title(&self) -> &'static str {
        "Notification Tests"
    }

    fn poll(&mut self) -> PanelFuture<'_> {
        Box::pin(async move {
            let _ = self.load_clients().await;
        })
    }

    fn on_activated(&mut self) -> PanelFuture<'_> {
        Box::pin(async move {
            let _ = self.load_clients().await;
        })
    }

    fn is_form_open(&self) -> bool {
        false
    }

    fn render(&self) -> String {
        let mut out = format!(
            "Client: {}  Channel: {}  Recipient: {}",
            if self.client_id.is_empty() { "-" } else { self.client_id.as_str() },
            self.channel,
            if self.request.recipient.is_empty() { "-" } else { self.request.recipient.as_str() },
        );
        if self.loading {
            out.push_str("  (sending...)");
        }
        if self.results.is_empty() {
            return out;
        }

        let rows: Vec<Vec<String>> = self
            .results
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                ResultSlot::Pending => vec![
                    (i + 1).to_string(),
                    "...".to_string(),
                    "pending".to_string(),
                    String::new(),
                    String::new(),
                ],
                ResultSlot::Done(result) => {
                    let quota = result.rate_limit();
                    let show = |v: Option<u64>| v.map(|n| n.to_string()).unwrap_or_default();
                    vec![
                        (i + 1).to_string(),
                        result
                            .status
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "Error".to_string()),
                        result.message.clone(),
                        show(quota.limit),
                        show(quota.remaining),
                    ]
                }
            })
            .collect();

        out.push_str("\n\n");
        out.push_str(&render_table(
            &["#", "Status", "Message", "Limit", "Remaining"],
            &rows,
        ));
        out
    }
}
