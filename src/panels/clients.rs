use crate::api::{describe_error, AdminApi, StatusHints};
use crate::error::{ApiError, PanelError, ValidationError};
use crate::models::Client;
use crate::panels::{non_blank, render_table, Confirm, FormMode, Panel, PanelFuture};
use crate::toasts::Toaster;
use log::info;
use std::sync::Arc;

/// Client record being created or edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientForm {
    pub client: Client,
    pub mode: FormMode,
}

impl ClientForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.client.client_id.trim().is_empty() {
            return Err(ValidationError::Required("Client ID"));
        }
        if self.client.name.trim().is_empty() {
            return Err(ValidationError::Required("Client name"));
        }
        Ok(())
    }

    /// The record as it goes on the wire
    fn payload(&self) -> Client {
        let mut client = self.client.clone();
        client.description = non_blank(client.description);
        client.contact_email = non_blank(client.contact_email);
        client
    }
}

/// Lists, creates, edits and deletes tenants
pub struct ClientManagementPanel {
    api: Arc<dyn AdminApi>,
    toaster: Toaster,
    confirm: Arc<dyn Confirm>,
    clients: Vec<Client>,
    form: Option<ClientForm>,
}

impl ClientManagementPanel {
    pub fn new(api: Arc<dyn AdminApi>, toaster: Toaster, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            api,
            toaster,
            confirm,
            clients: Vec::new(),
            form: None,
        }
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn form(&self) -> Option<&ClientForm> {
        self.form.as_ref()
    }

    pub fn form_mut(&mut self) -> Option<&mut ClientForm> {
        self.form.as_mut()
    }

    pub fn is_edit_mode(&self) -> bool {
        matches!(&self.form, Some(form) if form.mode == FormMode::Edit)
    }

    /// Toast an API failure and wrap it for the caller
    fn fail(&self, action: &str, err: ApiError) -> PanelError {
        let message = format!(
            "{}: {}",
            action,
            describe_error(&err, self.api.base_url(), StatusHints::CLIENTS)
        );
        self.toaster.error(&message);
        PanelError::Api {
            message,
            source: err,
        }
    }

    pub async fn load_clients(&mut self) -> Result<(), PanelError> {
        match self.api.list_clients().await {
            Ok(clients) => {
                self.clients = clients;
                Ok(())
            }
            Err(e) => Err(self.fail("Error loading clients", e)),
        }
    }

    /// Open an empty form in create mode
    pub fn show_new_form(&mut self) {
        self.form = Some(ClientForm {
            client: Client::default(),
            mode: FormMode::Create,
        });
    }

    /// Open the form pre-filled with a copy of `client`
    pub fn edit_client(&mut self, client: &Client) {
        self.form = Some(ClientForm {
            client: client.clone(),
            mode: FormMode::Edit,
        });
    }

    pub fn cancel_edit(&mut self) {
        self.form = None;
    }

    /// Create or update the record in the open form
    ///
    /// Invalid input is rejected without a request. On success the list is
    /// reloaded and the form closed; on failure the form stays open.
    pub async fn submit(&mut self) -> Result<Client, PanelError> {
        let Some(form) = self.form.as_ref() else {
            return Err(ValidationError::NoOpenForm.into());
        };
        if let Err(e) = form.validate() {
            self.toaster.error(&e.to_string());
            return Err(e.into());
        }

        let mode = form.mode;
        let payload = form.payload();
        let result = match mode {
            FormMode::Edit => {
                self.api
                    .update_client(&payload.client_id, &payload)
                    .await
            }
            FormMode::Create => self.api.create_client(&payload).await,
        };

        match (result, mode) {
            (Ok(saved), FormMode::Edit) => {
                info!("Updated client {}", saved.client_id);
                self.toaster.success("Client updated successfully");
                self.finish_submit().await;
                Ok(saved)
            }
            (Ok(saved), FormMode::Create) => {
                info!("Created client {}", saved.client_id);
                self.toaster.success("Client created successfully");
                self.finish_submit().await;
                Ok(saved)
            }
            (Err(e), FormMode::Edit) => Err(self.fail("Error updating client", e)),
            (Err(e), FormMode::Create) => Err(self.fail("Error creating client", e)),
        }
    }

    async fn finish_submit(&mut self) {
        // A failed reload already raised its own toast
        let _ = self.load_clients().await;
        self.form = None;
    }

    /// Delete a client after confirmation
    ///
    /// Returns `Ok(false)` without any request when the operator declines.
    pub async fn delete_client(&mut self, client_id: &str) -> Result<bool, PanelError> {
        let prompt = format!(
            "Are you sure you want to delete client {}? This will not delete the rate limit configuration.",
            client_id
        );
        if !self.confirm.confirm(&prompt) {
            return Ok(false);
        }

        match self.api.delete_client(client_id).await {
            Ok(()) => {
                info!("Deleted client {}", client_id);
                self.toaster.success("Client deleted successfully");
                let _ = self.load_clients().await;
                Ok(true)
            }
            Err(e) => Err(self.fail("Error deleting client", e)),
        }
    }
}

impl Panel for ClientManagementPanel {
    fn title(&self) -> &'static str {
        "Clients"
    }

    fn poll(&mut self) -> PanelFuture<'_> {
        Box::pin(async move {
            if !self.is_form_open() {
                let _ = self.load_clients().await;
            }
        })
    }

    fn is_form_open(&self) -> bool {
        self.form.is_some()
    }

    fn render(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .clients
            .iter()
            .map(|c| {
                vec![
                    c.client_id.clone(),
                    c.name.clone(),
                    c.description.clone().unwrap_or_default(),
                    c.contact_email.clone().unwrap_or_default(),
                    c.created_at.clone().unwrap_or_default(),
                ]
            })
            .collect();

        let mut out = if rows.is_empty() {
            "No clients registered.".to_string()
        } else {
            render_table(
                &["Client ID", "Name", "Description", "Contact Email", "Created"],
                &rows,
            )
        };

        if let Some(form) = &self.form {
            let heading = match form.mode {
                FormMode::Create => "New client",
                FormMode::Edit => "Edit client",
            };
            out.push_str(&format!(
                "\n\n{}\n  Client ID:     {}\n  Name:          {}\n  Description:   {}\n  Contact Email: {}",
                heading,
                form.client.client_id,
                form.client.name,
                form.client.description.as_deref().unwrap_or(""),
                form.client.contact_email.as_deref().unwrap_or(""),
            ));
        }
        out
    }
}
