/// Backend contract and its implementations
pub mod error_body;
pub mod mock;
pub mod rest;

pub use error_body::{describe_error, ErrorBody, FieldError, StatusHints};
pub use mock::MockBackend;
pub use rest::RestBackend;

use crate::error::ApiError;
use crate::models::{
    Client, NotificationChannel, NotificationRequest, NotificationResponse, RateLimitConfig,
    SystemLimitConfig,
};
use std::future::Future;
use std::pin::Pin;

/// Future returned by every backend call
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// REST contract of the rate limiter backend
///
/// Paths are relative to the backend's API root (`/api`).
pub trait AdminApi: Send + Sync {
    /// API root, used in connectivity messages
    fn base_url(&self) -> &str;

    /// `GET /clients`
    fn list_clients(&self) -> ApiFuture<'_, Vec<Client>>;

    /// `GET /clients/{clientId}`
    fn get_client<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, Client>;

    /// `POST /clients`
    fn create_client<'a>(&'a self, client: &'a Client) -> ApiFuture<'a, Client>;

    /// `PUT /clients/{clientId}`
    fn update_client<'a>(&'a self, client_id: &'a str, client: &'a Client)
        -> ApiFuture<'a, Client>;

    /// `DELETE /clients/{clientId}`
    fn delete_client<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, ()>;

    /// `GET /rate-limits`
    fn list_rate_limits(&self) -> ApiFuture<'_, Vec<RateLimitConfig>>;

    /// `GET /rate-limits/{clientId}`
    fn get_rate_limit<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, RateLimitConfig>;

    /// `POST /rate-limits`
    fn create_rate_limit<'a>(
        &'a self,
        config: &'a RateLimitConfig,
    ) -> ApiFuture<'a, RateLimitConfig>;

    /// `PUT /rate-limits/{clientId}`
    fn update_rate_limit<'a>(
        &'a self,
        client_id: &'a str,
        config: &'a RateLimitConfig,
    ) -> ApiFuture<'a, RateLimitConfig>;

    /// `DELETE /rate-limits/{clientId}`
    fn delete_rate_limit<'a>(&'a self, client_id: &'a str) -> ApiFuture<'a, ()>;

    /// `GET /system/limits`
    fn get_system_limits(&self) -> ApiFuture<'_, SystemLimitConfig>;

    /// `PUT /system/limits`
    fn update_system_limits<'a>(
        &'a self,
        config: &'a SystemLimitConfig,
    ) -> ApiFuture<'a, SystemLimitConfig>;

    /// `POST /notifications/{email|sms}` with `X-Client-Id`
    ///
    /// A throttled request resolves to an [`ApiError::Http`] with status 429
    /// whose headers still carry the quota values.
    fn send_notification<'a>(
        &'a self,
        channel: NotificationChannel,
        client_id: &'a str,
        request: &'a NotificationRequest,
    ) -> ApiFuture<'a, NotificationResponse>;
}
