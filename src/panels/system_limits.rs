use crate::api::{describe_error, AdminApi, StatusHints};
use crate::error::{ApiError, PanelError, ValidationError};
use crate::models::SystemLimitConfig;
use crate::panels::{Panel, PanelFuture};
use crate::toasts::Toaster;
use log::info;
use std::sync::Arc;

/// Views and edits the global throughput cap
pub struct SystemLimitPanel {
    api: Arc<dyn AdminApi>,
    toaster: Toaster,
    config: SystemLimitConfig,
    draft: Option<SystemLimitConfig>,
}

impl SystemLimitPanel {
    pub fn new(api: Arc<dyn AdminApi>, toaster: Toaster) -> Self {
        Self {
            api,
            toaster,
            config: SystemLimitConfig::default(),
            draft: None,
        }
    }

    /// Last value loaded from the backend
    pub fn config(&self) -> &SystemLimitConfig {
        &self.config
    }

    pub fn draft(&self) -> Option<&SystemLimitConfig> {
        self.draft.as_ref()
    }

    fn fail(&self, action: &str, err: ApiError) -> PanelError {
        let message = format!(
            "{}: {}",
            action,
            describe_error(&err, self.api.base_url(), StatusHints::NONE)
        );
        self.toaster.error(&message);
        PanelError::Api {
            message,
            source: err,
        }
    }

    pub async fn load(&mut self) -> Result<(), PanelError> {
        match self.api.get_system_limits().await {
            Ok(config) => {
                self.config = config;
                Ok(())
            }
            Err(e) => Err(self.fail("Error loading system limits", e)),
        }
    }

    /// Start editing from the loaded value
    pub fn begin_edit(&mut self) {
        if self.draft.is_none() {
            self.draft = Some(self.config.clone());
        }
    }

    pub fn set_global_requests_per_second(&mut self, value: u64) {
        self.begin_edit();
        if let Some(draft) = self.draft.as_mut() {
            draft.global_requests_per_second = value;
        }
    }

    pub fn cancel_edit(&mut self) {
        self.draft = None;
    }

    /// Save the draft, or the loaded value when nothing was edited
    pub async fn submit(&mut self) -> Result<SystemLimitConfig, PanelError> {
        let candidate = self.draft.clone().unwrap_or_else(|| self.config.clone());
        if candidate.global_requests_per_second < 1 {
            let err = ValidationError::TooSmall {
                field: "Global Requests Per Second",
                min: 1,
            };
            self.toaster.error(&err.to_string());
            return Err(err.into());
        }

        match self.api.update_system_limits(&candidate).await {
            Ok(saved) => {
                info!(
                    "System limit set to {} requests/s",
                    saved.global_requests_per_second
                );
                self.toaster.success("System limits updated successfully");
                self.draft = None;
                let _ = self.load().await;
                Ok(saved)
            }
            Err(e) => Err(self.fail("Error updating system limits", e)),
        }
    }
}

impl Panel for SystemLimitPanel {
    fn title(&self) -> &'static str {
        "System Limits"
    }

    fn poll(&mut self) -> PanelFuture<'_> {
        Box::pin(async move {
            if !self.is_form_open() {
                let _ = self.load().await;
            }
        })
    }

    fn is_form_open(&self) -> bool {
        self.draft.is_some()
    }

    fn render(&self) -> String {
        let mut out = format!(
            "Global Requests Per Second: {}",
            self.config.global_requests_per_second
        );
        if let Some(draft) = &self.draft {
            out.push_str(&format!(
                "\n\nEditing\n  Global Requests Per Second: {}",
                draft.global_requests_per_second
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ErrorBody, MockBackend};
    use crate::toasts::ToastLevel;

    fn panel(backend: Arc<MockBackend>) -> (SystemLimitPanel, Toaster) {
        let toaster = Toaster::default();
        (SystemLimitPanel::new(backend, toaster.clone()), toaster)
    }

    #[tokio::test]
    async fn test_load() {
        let backend = Arc::new(MockBackend::new().with_system_limit(250));
        let (mut panel, _) = panel(backend);

        panel.load().await.unwrap();
        assert_eq!(panel.config().global_requests_per_second, 250);
        assert_eq!(panel.render(), "Global Requests Per Second: 250");
    }

    #[tokio::test]
    async fn test_load_failure() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next(
            "get_system_limits",
            ApiError::Unreachable("connection refused".to_string()),
        );
        let (mut panel, toaster) = panel(backend);

        assert!(panel.load().await.is_err());
        assert_eq!(
            toaster.latest().unwrap().message,
            "Error loading system limits: Cannot connect to server. Please ensure the backend is running at mock://rate-limiter/api"
        );
    }

    #[tokio::test]
    async fn test_submit_updates_and_reloads() {
        let backend = Arc::new(MockBackend::new());
        let (mut panel, toaster) = panel(backend.clone());
        panel.load().await.unwrap();

        panel.set_global_requests_per_second(2000);
        let saved = panel.submit().await.unwrap();

        assert_eq!(saved.global_requests_per_second, 2000);
        assert_eq!(panel.config().global_requests_per_second, 2000);
        assert!(panel.draft().is_none());
        assert_eq!(backend.call_count("get_system_limits"), 2);
        let toast = toaster.latest().unwrap();
        assert_eq!(toast.level, ToastLevel::Success);
        assert_eq!(toast.message, "System limits updated successfully");
    }

    #[tokio::test]
    async fn test_zero_is_rejected_without_request() {
        let backend = Arc::new(MockBackend::new());
        let (mut panel, toaster) = panel(backend.clone());

        panel.set_global_requests_per_second(0);
        assert!(matches!(
            panel.submit().await,
            Err(PanelError::Validation(ValidationError::TooSmall { .. }))
        ));
        assert_eq!(
            toaster.latest().unwrap().message,
            "Global Requests Per Second must be at least 1"
        );
        assert_eq!(backend.call_count("update_system_limits"), 0);
    }

    #[tokio::test]
    async fn test_update_failure_keeps_draft() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next(
            "update_system_limits",
            ApiError::status(503, ErrorBody::Empty),
        );
        let (mut panel, toaster) = panel(backend);

        panel.set_global_requests_per_second(10);
        assert!(panel.submit().await.is_err());
        assert_eq!(
            toaster.latest().unwrap().message,
            "Error updating system limits: HTTP 503 error occurred"
        );
        assert_eq!(panel.draft().unwrap().global_requests_per_second, 10);
    }

    #[tokio::test]
    async fn test_poll_does_not_clobber_draft() {
        let backend = Arc::new(MockBackend::new());
        let (mut panel, _) = panel(backend.clone());

        panel.begin_edit();
        panel.poll().await;
        assert_eq!(backend.call_count("get_system_limits"), 0);

        panel.cancel_edit();
        panel.poll().await;
        assert_eq!(backend.call_count("get_system_limits"), 1);
    }
}
