use crate::api::{AdminApi, ApiFuture, ErrorBody};
use crate::error::{ApiError, ConfigError};
use crate::models::{
    Client, HeaderMap, NotificationChannel, NotificationRequest, NotificationResponse,
    RateLimitConfig, SystemLimitConfig, HEADER_CLIENT_ID,
};
use crate::monitoring::{RequestMonitor, RequestTimer};
use log::debug;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// HTTP implementation of [`AdminApi`]
///
/// Talks JSON to the backend's API root, e.g.
/// `https://rate-limiter-backend.onrender.com/api`.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: Url,
    base_url_text: String,
    monitor: Option<Arc<RequestMonitor>>,
}

impl RestBackend {
    /// Create a backend for the given API root
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the URL cannot be used as a
    /// base for request paths or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid API URL '{}': {}", base_url, e))
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::ValidationError(format!(
                "API URL cannot be used as a base: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ConfigError::ValidationError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: parsed,
            base_url_text: base_url.trim_end_matches('/').to_string(),
            monitor: None,
        })
    }

    /// Time every request into `monitor`
    pub fn with_monitor(mut self, monitor: Arc<RequestMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Build an endpoint URL, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request, turning non-2xx answers into [`ApiError::Http`]
    async fn execute(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Response, ApiError> {
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!("{} -> {}", operation, response.status());
                Ok(response)
            }
            Ok(response) => Err(Self::error_from_response(response).await),
            Err(e) => Err(ApiError::from(e)),
        }
    }

    /// Run a whole call, body decoding included, and record its outcome
    async fn timed<T, F>(&self, operation: &'static str, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let timer = self.monitor.as_ref().map(|m| RequestTimer::start(Arc::clone(m)));
        let result = call.await;

        if let Err(e) = &result {
            debug!("{} failed: {}", operation, e);
        }
        if let Some(timer) = timer {
            timer.finish(result.as_ref().err().map(ApiError::kind));
        }
        result
    }

    async fn error_from_response(response: Response) -> ApiError {
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let text = response.text().await.unwrap_or_default();

        ApiError::Http {
            status,
            body: ErrorBody::parse(&text),
            headers,
        }
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        self.timed(operation, async {
            let response = self.execute(request, operation).await?;
            response.json::<T>().await.map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse {} response: {}", operation, e))
            })
        })
        .await
    }

    async fn delete(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<(), ApiError> {
        self.timed(operation, async {
            self.execute(request, operation).await?;
            Ok(())
        })
        .await
    }
}

/// Copy response headers into a lowercase-keyed map
fn collect_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// `message` field of a JSON body, if present
fn body_message(text: &str) -> Option<String> {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
}

impl AdminApi for RestBackend {
    fn base_url(&self) -> &str {
        &self.base_url_text
    }

    fn list_clients(&self) -> ApiFuture<'_, Vec<Client>> {
        Box::pin(async move {
            let url = self.endpoint(&["clients"]);
            self.fetch_json(self.client.get(url), "list_clients").await
        })
    }

    fn get_client<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, Client> {
        Box::pin(async move {
            let url = self.endpoint(&["clients", client_id]);
            self.fetch_json(self.client.get(url), "get_client").await
        })
    }

    fn create_client<'a>(&'a self, client: &'a Client) -> ApiFuture<'a, Client> {
        Box::pin(async move {
            let url = self.endpoint(&["clients"]);
            self.fetch_json(self.client.post(url).json(client), "create_client")
                .await
        })
    }

    fn update_client<'a>(
        &'a self,
        client_id: &'a str,
        client: &'a Client,
    ) -> ApiFuture<'a, Client> {
        Box::pin(async move {
            let url = self.endpoint(&["clients", client_id]);
            self.fetch_json(self.client.put(url).json(client), "update_client")
                .await
        })
    }

    fn delete_client<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.endpoint(&["clients", client_id]);
            self.delete(self.client.delete(url), "delete_client").await
        })
    }

    fn list_rate_limits(&self) -> ApiFuture<'_, Vec<RateLimitConfig>> {
        Box::pin(async move {
            let url = self.endpoint(&["rate-limits"]);
            self.fetch_json(self.client.get(url), "list_rate_limits").await
        })
    }

    fn get_rate_limit<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, RateLimitConfig> {
        Box::pin(async move {
            let url = self.endpoint(&["rate-limits", client_id]);
            self.fetch_json(self.client.get(url), "get_rate_limit").await
        })
    }

    fn create_rate_limit<'a>(
        &'a self,
        config: &'a RateLimitConfig,
    ) -> ApiFuture<'a, RateLimitConfig> {
        Box::pin(async move {
            let url = self.endpoint(&["rate-limits"]);
            self.fetch_json(self.client.post(url).json(config), "create_rate_limit")
                .await
        })
    }

    fn update_rate_limit<'a>(
        &'a self,
        client_id: &'a str,
        config: &'a RateLimitConfig,
    ) -> ApiFuture<'a, RateLimitConfig> {
        Box::pin(async move {
            let url = self.endpoint(&["rate-limits", client_id]);
            self.fetch_json(self.client.put(url).json(config), "update_rate_limit")
                .await
        })
    }

    fn delete_rate_limit<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.endpoint(&["rate-limits", client_id]);
            self.delete(self.client.delete(url), "delete_rate_limit")
                .await
        })
    }

    fn get_system_limits(&self) -> ApiFuture<'_, SystemLimitConfig> {
        Box::pin(async move {
            let url = self.endpoint(&["system", "limits"]);
            self.fetch_json(self.client.get(url), "get_system_limits")
                .await
        })
    }

    fn update_system_limits<'a>(
        &'a self,
        config: &'a SystemLimitConfig,
    ) -> ApiFuture<'a, SystemLimitConfig> {
        Box::pin(async move {
            let url = self.endpoint(&["system", "limits"]);
            self.fetch_json(self.client.put(url).json(config), "update_system_limits")
                .await
        })
    }

    fn send_notification<'a>(
        &'a self,
        channel: NotificationChannel,
        client_id: &'a str,
        request: &'a NotificationRequest,
    ) -> ApiFuture<'a, NotificationResponse> {
        Box::pin(async move {
            let url = self.endpoint(&["notifications", channel.path()]);
            let request = self
                .client
                .post(url)
                .header(HEADER_CLIENT_ID, client_id)
                .json(request);

            self.timed("send_notification", async {
                let response = self.execute(request, "send_notification").await?;
                let status = response.status().as_u16();
                let headers = collect_headers(response.headers());
                let text = response.text().await.map_err(|e| {
                    ApiError::InvalidResponse(format!(
                        "Failed to read send_notification response: {}",
                        e
                    ))
                })?;

                Ok(NotificationResponse {
                    status,
                    message: body_message(&text),
                    headers,
                })
            })
            .await
        })
    }
}
