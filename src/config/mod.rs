#[allow(clippy::module_inception)]
mod config;

pub use config::{
    ApiConfig, BackendKind, Config, NotificationsConfig, PollingConfig, ToastConfig,
    API_URL_ENV, DEFAULT_API_URL,
};
