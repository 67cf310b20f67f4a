use crate::api::{describe_error, AdminApi, StatusHints};
use crate::error::{ApiError, PanelError, ValidationError};
use crate::models::{Client, RateLimitConfig};
use crate::panels::{render_table, Confirm, FormMode, Panel, PanelFuture};
use crate::toasts::Toaster;
use log::{debug, info};
use std::sync::Arc;

/// Rate-limit configuration being created or edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitForm {
    pub config: RateLimitConfig,
    pub mode: FormMode,
    /// Client id typed in by hand rather than picked from the list
    pub allow_manual_entry: bool,
}

impl RateLimitForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let config = &self.config;
        if config.client_id.trim().is_empty() {
            return Err(ValidationError::Required("Client ID"));
        }

        let minimums = [
            ("Time Window Requests", config.time_window_requests),
            ("Time Window Seconds", config.time_window_seconds),
            ("Monthly Requests", config.monthly_requests),
        ];
        for (field, value) in minimums {
            if value < 1 {
                return Err(ValidationError::TooSmall { field, min: 1 });
            }
        }
        Ok(())
    }
}

/// Manages per-client quota policies
pub struct RateLimitConfigPanel {
    api: Arc<dyn AdminApi>,
    toaster: Toaster,
    confirm: Arc<dyn Confirm>,
    configs: Vec<RateLimitConfig>,
    clients: Vec<Client>,
    form: Option<RateLimitForm>,
}

impl RateLimitConfigPanel {
    pub fn new(api: Arc<dyn AdminApi>, toaster: Toaster, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            api,
            toaster,
            confirm,
            configs: Vec::new(),
            clients: Vec::new(),
            form: None,
        }
    }

    pub fn configs(&self) -> &[RateLimitConfig] {
        &self.configs
    }

    /// Clients offered when picking the owner of a new configuration
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn form(&self) -> Option<&RateLimitForm> {
        self.form.as_ref()
    }

    pub fn form_mut(&mut self) -> Option<&mut RateLimitForm> {
        self.form.as_mut()
    }

    pub fn is_edit_mode(&self) -> bool {
        matches!(&self.form, Some(form) if form.mode == FormMode::Edit)
    }

    fn fail(&self, action: &str, err: ApiError) -> PanelError {
        let message = format!(
            "{}: {}",
            action,
            describe_error(&err, self.api.base_url(), StatusHints::RATE_LIMITS)
        );
        self.toaster.error(&message);
        PanelError::Api {
            message,
            source: err,
        }
    }

    pub async fn load_configs(&mut self) -> Result<(), PanelError> {
        match self.api.list_rate_limits().await {
            Ok(configs) => {
                self.configs = configs;
                Ok(())
            }
            Err(e) => Err(self.fail("Error loading configurations", e)),
        }
    }

    /// Refresh the client picker
    ///
    /// Failures are not reported: there may simply be no clients yet.
    pub async fn load_clients(&mut self) {
        match self.api.list_clients().await {
            Ok(clients) => self.clients = clients,
            Err(e) => debug!("Client list unavailable for rate limits: {}", e),
        }
    }

    /// Open a form with the default policy in create mode
    pub async fn show_new_form(&mut self) {
        self.form = Some(RateLimitForm {
            config: RateLimitConfig::default(),
            mode: FormMode::Create,
            allow_manual_entry: false,
        });
        self.load_clients().await;
    }

    pub fn edit_config(&mut self, config: &RateLimitConfig) {
        self.form = Some(RateLimitForm {
            config: config.clone(),
            mode: FormMode::Edit,
            allow_manual_entry: false,
        });
    }

    /// Type a client id by hand instead of picking one
    pub fn enter_client_id(&mut self, client_id: &str) {
        if let Some(form) = self.form.as_mut() {
            form.config.client_id = client_id.to_string();
            form.allow_manual_entry = true;
        }
    }

    /// Pick the owner of a new configuration from the client list
    ///
    /// When the client already has a configuration the operator is offered
    /// to edit it instead; declining clears the selection. A failed lookup is
    /// treated as "no configuration yet".
    pub async fn select_client(&mut self, client_id: &str) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        form.config.client_id = client_id.to_string();
        form.allow_manual_entry = false;
        if form.mode != FormMode::Create || client_id.trim().is_empty() {
            return;
        }

        let existing = match self.api.get_rate_limit(client_id).await {
            Ok(existing) => existing,
            Err(e) => {
                debug!("No existing configuration for {}: {}", client_id, e);
                return;
            }
        };

        if self.confirm.confirm(
            "A configuration already exists for this client. Do you want to edit it instead?",
        ) {
            self.edit_config(&existing);
        } else if let Some(form) = self.form.as_mut() {
            form.config.client_id.clear();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.form = None;
    }

    /// Create or update the configuration in the open form
    pub async fn submit(&mut self) -> Result<RateLimitConfig, PanelError> {
        let Some(form) = self.form.as_ref() else {
            return Err(ValidationError::NoOpenForm.into());
        };
        if let Err(e) = form.validate() {
            self.toaster.error(&e.to_string());
            return Err(e.into());
        }

        let mode = form.mode;
        let mut payload = form.config.clone();
        payload.client_id = payload.client_id.trim().to_string();
        let result = match mode {
            FormMode::Edit => {
                self.api
                    .update_rate_limit(&payload.client_id, &payload)
                    .await
            }
            FormMode::Create => self.api.create_rate_limit(&payload).await,
        };

        match (result, mode) {
            (Ok(saved), FormMode::Edit) => {
                info!("Updated rate limit for {}", saved.client_id);
                self.toaster.success("Configuration updated successfully");
                self.finish_submit().await;
                Ok(saved)
            }
            (Ok(saved), FormMode::Create) => {
                info!("Created rate limit for {}", saved.client_id);
                self.toaster.success("Configuration created successfully");
                self.finish_submit().await;
                Ok(saved)
            }
            (Err(e), FormMode::Edit) => Err(self.fail("Error updating configuration", e)),
            (Err(e), FormMode::Create) => Err(self.fail("Error creating configuration", e)),
        }
    }

    async fn finish_submit(&mut self) {
        self.form = None;
        let _ = self.load_configs().await;
    }

    /// Delete a client's configuration after confirmation
    pub async fn delete_config(&mut self, client_id: &str) -> Result<bool, PanelError> {
        let prompt = format!(
            "Are you sure you want to delete configuration for client {}?",
            client_id
        );
        if !self.confirm.confirm(&prompt) {
            return Ok(false);
        }

        match self.api.delete_rate_limit(client_id).await {
            Ok(()) => {
                info!("Deleted rate limit for {}", client_id);
                self.toaster.success("Configuration deleted successfully");
                let _ = self.load_configs().await;
                Ok(true)
            }
            Err(e) => Err(self.fail("Error deleting configuration", e)),
        }
    }
}

impl Panel for RateLimitConfigPanel {
    fn title(&self) -> &'static str {
        "Rate Limits"
    }

    fn poll(&mut self) -> PanelFuture<'_> {
        Box::pin(async move {
            if !self.is_form_open() {
                let _ = self.load_configs().await;
                self.load_clients().await;
            }
        })
    }

    fn on_activated(&mut self) -> PanelFuture<'_> {
        Box::pin(async move {
            self.load_clients().await;
            let _ = self.load_configs().await;
        })
    }

    fn is_form_open(&self) -> bool {
        self.form.is_some()
    }

    fn render(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .configs
            .iter()
            .map(|c| {
                vec![
                    c.client_id.clone(),
                    c.time_window_requests.to_string(),
                    c.time_window_seconds.to_string(),
                    c.monthly_requests.to_string(),
                    c.throttling_mode.to_string(),
                ]
            })
            .collect();

        let mut out = if rows.is_empty() {
            "No rate limit configurations.".to_string()
        } else {
            render_table(
                &["Client ID", "Requests", "Window (s)", "Monthly", "Mode"],
                &rows,
            )
        };

        if let Some(form) = &self.form {
            let heading = match form.mode {
                FormMode::Create => "New configuration",
                FormMode::Edit => "Edit configuration",
            };
            let c = &form.config;
            out.push_str(&format!(
                "\n\n{}\n  Client ID:            {}\n  Time Window Requests: {}\n  Time Window Seconds:  {}\n  Monthly Requests:     {}\n  Throttling Mode:      {}",
                heading,
                c.client_id,
                c.time_window_requests,
                c.time_window_seconds,
                c.monthly_requests,
                c.throttling_mode,
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ErrorBody, MockBackend};
    use crate::models::ThrottlingMode;
    use crate::panels::MockConfirm;
    use quickcheck_macros::quickcheck;

    fn config(client_id: &str) -> RateLimitConfig {
        RateLimitConfig {
            client_id: client_id.to_string(),
            ..RateLimitConfig::default()
        }
    }

    fn panel_with(backend: Arc<MockBackend>, confirm: MockConfirm) -> (RateLimitConfigPanel, Toaster) {
        let toaster = Toaster::default();
        let panel = RateLimitConfigPanel::new(backend, toaster.clone(), Arc::new(confirm));
        (panel, toaster)
    }

    fn panel(backend: Arc<MockBackend>) -> (RateLimitConfigPanel, Toaster) {
        panel_with(backend, MockConfirm::new())
    }

    #[test]
    fn test_form_validation_messages() {
        let mut form = RateLimitForm {
            config: config("acme"),
            mode: FormMode::Create,
            allow_manual_entry: true,
        };
        assert!(form.validate().is_ok());

        form.config.time_window_seconds = 0;
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Time Window Seconds must be at least 1"
        );

        form.config.time_window_requests = 0;
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Time Window Requests must be at least 1"
        );

        form.config.client_id = " ".to_string();
        assert_eq!(form.validate().unwrap_err().to_string(), "Client ID is required");
    }

    #[quickcheck]
    fn prop_positive_quotas_validate(requests: u64, seconds: u64, monthly: u64) -> bool {
        let form = RateLimitForm {
            config: RateLimitConfig {
                client_id: "acme".to_string(),
                time_window_requests: requests,
                time_window_seconds: seconds,
                monthly_requests: monthly,
                ..RateLimitConfig::default()
            },
            mode: FormMode::Create,
            allow_manual_entry: false,
        };
        form.validate().is_ok() == (requests >= 1 && seconds >= 1 && monthly >= 1)
    }

    #[tokio::test]
    async fn test_new_form_uses_defaults_and_loads_clients() {
        let backend = Arc::new(MockBackend::new().with_client(Client::new("acme", "Acme")));
        let (mut panel, _) = panel(backend);

        panel.show_new_form().await;
        let form = panel.form().unwrap();
        assert_eq!(form.config, RateLimitConfig::default());
        assert_eq!(form.mode, FormMode::Create);
        assert!(!form.allow_manual_entry);
        assert_eq!(panel.clients().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_monthly_requests_rejected_without_request() {
        let backend = Arc::new(MockBackend::new());
        let (mut panel, toaster) = panel(backend.clone());

        panel.show_new_form().await;
        panel.enter_client_id("acme");
        panel.form_mut().unwrap().config.monthly_requests = 0;
        assert!(panel.submit().await.is_err());

        assert_eq!(
            toaster.latest().unwrap().message,
            "Monthly Requests must be at least 1"
        );
        assert_eq!(backend.call_count("create_rate_limit"), 0);
    }

    #[tokio::test]
    async fn test_create_config() {
        let backend = Arc::new(MockBackend::new());
        let (mut panel, toaster) = panel(backend.clone());

        panel.show_new_form().await;
        panel.enter_client_id("acme");
        panel.form_mut().unwrap().config.throttling_mode = ThrottlingMode::Soft;
        let created = panel.submit().await.unwrap();

        assert_eq!(created.throttling_mode, ThrottlingMode::Soft);
        assert_eq!(
            toaster.latest().unwrap().message,
            "Configuration created successfully"
        );
        assert!(!panel.is_form_open());
        assert_eq!(panel.configs().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_calls_update() {
        let backend = Arc::new(MockBackend::new().with_rate_limit(config("acme")));
        let (mut panel, toaster) = panel(backend.clone());
        panel.load_configs().await.unwrap();

        let existing = panel.configs()[0].clone();
        panel.edit_config(&existing);
        assert!(panel.is_edit_mode());
        panel.form_mut().unwrap().config.time_window_requests = 5;
        let saved = panel.submit().await.unwrap();

        assert_eq!(saved.time_window_requests, 5);
        assert_eq!(backend.call_count("update_rate_limit"), 1);
        assert_eq!(backend.call_count("create_rate_limit"), 0);
        assert_eq!(
            toaster.latest().unwrap().message,
            "Configuration updated successfully"
        );
    }

    #[tokio::test]
    async fn test_conflict_fallback_wording() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next("create_rate_limit", ApiError::status(409, ErrorBody::Empty));
        let (mut panel, toaster) = panel(backend);

        panel.show_new_form().await;
        panel.enter_client_id("acme");
        assert!(panel.submit().await.is_err());
        assert_eq!(
            toaster.latest().unwrap().message,
            "Error creating configuration: A configuration for this client ID already exists."
        );
        assert!(panel.is_form_open());
    }

    #[tokio::test]
    async fn test_selecting_configured_client_offers_edit() {
        let backend = Arc::new(
            MockBackend::new()
                .with_client(Client::new("acme", "Acme"))
                .with_rate_limit(config("acme")),
        );
        let mut confirm = MockConfirm::new();
        confirm
            .expect_confirm()
            .withf(|prompt| prompt.starts_with("A configuration already exists"))
            .times(1)
            .return_const(true);
        let (mut panel, _) = panel_with(backend, confirm);

        panel.show_new_form().await;
        panel.select_client("acme").await;

        assert!(panel.is_edit_mode());
        assert_eq!(panel.form().unwrap().config.client_id, "acme");
        assert!(panel.form().unwrap().config.id.is_some());
    }

    #[tokio::test]
    async fn test_declining_edit_clears_selection() {
        let backend = Arc::new(MockBackend::new().with_rate_limit(config("acme")));
        let mut confirm = MockConfirm::new();
        confirm.expect_confirm().times(1).return_const(false);
        let (mut panel, _) = panel_with(backend, confirm);

        panel.show_new_form().await;
        panel.select_client("acme").await;

        let form = panel.form().unwrap();
        assert_eq!(form.mode, FormMode::Create);
        assert_eq!(form.config.client_id, "");
    }

    #[tokio::test]
    async fn test_selecting_unconfigured_client_asks_nothing() {
        let backend = Arc::new(MockBackend::new().with_client(Client::new("acme", "Acme")));
        let (mut panel, toaster) = panel(backend.clone());

        panel.show_new_form().await;
        panel.select_client("acme").await;

        assert_eq!(panel.form().unwrap().config.client_id, "acme");
        assert_eq!(backend.call_count("get_rate_limit"), 1);
        // The 404 lookup is not an operator-facing error
        assert!(toaster.latest().is_none());
    }

    #[tokio::test]
    async fn test_declined_delete_is_a_no_op() {
        let backend = Arc::new(MockBackend::new().with_rate_limit(config("acme")));
        let mut confirm = MockConfirm::new();
        confirm
            .expect_confirm()
            .withf(|prompt| prompt.contains("Are you sure you want to delete configuration for client acme?"))
            .times(1)
            .return_const(false);
        let (mut panel, _) = panel_with(backend.clone(), confirm);

        assert!(!panel.delete_config("acme").await.unwrap());
        assert_eq!(backend.call_count("delete_rate_limit"), 0);
    }

    #[tokio::test]
    async fn test_confirmed_delete() {
        let backend = Arc::new(MockBackend::new().with_rate_limit(config("acme")));
        let mut confirm = MockConfirm::new();
        confirm.expect_confirm().return_const(true);
        let (mut panel, _) = panel_with(backend.clone(), confirm);

        assert!(panel.delete_config("acme").await.unwrap());
        assert!(backend.rate_limits().is_empty());
    }

    #[tokio::test]
    async fn test_client_list_failure_is_silent() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next("list_clients", ApiError::status(500, ErrorBody::Empty));
        let (mut panel, toaster) = panel(backend);

        panel.load_clients().await;
        assert!(toaster.latest().is_none());
    }

    #[tokio::test]
    async fn test_activation_and_poll() {
        let backend = Arc::new(MockBackend::new());
        let (mut panel, _) = panel(backend.clone());

        panel.on_activated().await;
        assert_eq!(backend.call_count("list_rate_limits"), 1);
        assert_eq!(backend.call_count("list_clients"), 1);

        panel.edit_config(&config("acme"));
        panel.poll().await;
        assert_eq!(backend.call_count("list_rate_limits"), 1);

        panel.cancel_edit();
        panel.poll().await;
        assert_eq!(backend.call_count("list_rate_limits"), 2);
    }
}
