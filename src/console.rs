//! Tabbed console tying the panels together
//!
//! The console owns one panel per tab and the shared toast center. It does
//! not drive itself: the binary's `watch` loop calls [`Console::poll_all`] on
//! every interval tick, [`Console::execute`] for each line the operator types,
//! [`Console::tick`] to expire toasts and [`Console::render`] to redraw.
//!
//! Commands act on the active tab. Destructive actions and the "edit the
//! existing configuration instead?" question are asked on screen and answered
//! with `y` or `n` on the next line.

use crate::api::AdminApi;
use crate::error::CommandError;
use crate::monitoring::RequestMonitor;
use crate::panels::{
    ClientManagementPanel, Confirm, FormMode, NotificationTestPanel, Panel, RateLimitConfigPanel,
    SystemLimitPanel,
};
use crate::toasts::Toaster;
use log::{debug, info};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Console tabs, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Clients,
    SystemLimits,
    RateLimits,
    Notifications,
}

impl Tab {
    pub const ALL: [Tab; 4] = [
        Tab::Clients,
        Tab::SystemLimits,
        Tab::RateLimits,
        Tab::Notifications,
    ];

    /// Tab at a zero-based position
    pub fn from_index(index: usize) -> Option<Tab> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            Tab::Clients => 0,
            Tab::SystemLimits => 1,
            Tab::RateLimits => 2,
            Tab::Notifications => 3,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Tab::Clients => "Clients",
            Tab::SystemLimits => "System Limits",
            Tab::RateLimits => "Rate Limits",
            Tab::Notifications => "Notification Tests",
        }
    }

    /// Commands understood on this tab
    pub fn hint(&self) -> &'static str {
        match self {
            Tab::Clients => {
                "new, edit <id>, set <id|name|description|email> <value>, save, cancel, delete <id>"
            }
            Tab::SystemLimits => "edit, set rps <n>, save, cancel",
            Tab::RateLimits => {
                "new, edit <id>, pick <id>, set <client|requests|window|monthly|mode> <value>, \
                 save, cancel, delete <id>"
            }
            Tab::Notifications => {
                "pick <id>, set <client|channel|recipient|message> <value>, send, burst"
            }
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A line typed by the operator in watch mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Switch to a tab (`1`-`4`)
    SelectTab(usize),
    Refresh,
    Quit,
    /// Open an empty form
    New,
    /// Open the form on a listed record; the system limit takes no id
    Edit(Option<String>),
    /// Change one field of the open form
    Set { field: String, value: String },
    /// Choose the client a configuration or notification is for
    Pick(String),
    Save,
    Cancel,
    Delete(String),
    Send,
    Burst,
    /// `y` or `n` to the question on screen
    Answer(bool),
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> ConsoleCommand {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let unknown = || ConsoleCommand::Unknown(line.to_string());

        match (word.to_ascii_lowercase().as_str(), rest) {
            ("r" | "refresh", "") => ConsoleCommand::Refresh,
            ("q" | "quit" | "exit", "") => ConsoleCommand::Quit,
            ("y" | "yes", "") => ConsoleCommand::Answer(true),
            ("n" | "no", "") => ConsoleCommand::Answer(false),
            ("new", "") => ConsoleCommand::New,
            ("edit", "") => ConsoleCommand::Edit(None),
            ("edit", id) => ConsoleCommand::Edit(Some(id.to_string())),
            ("set", "") => unknown(),
            ("set", args) => {
                let (field, value) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
                ConsoleCommand::Set {
                    field: field.to_ascii_lowercase(),
                    value: value.trim().to_string(),
                }
            }
            ("pick", id) if !id.is_empty() => ConsoleCommand::Pick(id.to_string()),
            ("save", "") => ConsoleCommand::Save,
            ("cancel", "") => ConsoleCommand::Cancel,
            ("delete", id) if !id.is_empty() => ConsoleCommand::Delete(id.to_string()),
            ("send", "") => ConsoleCommand::Send,
            ("burst", "") => ConsoleCommand::Burst,
            (other, "") => match other.parse::<usize>() {
                Ok(n) if (1..=Tab::ALL.len()).contains(&n) => ConsoleCommand::SelectTab(n - 1),
                _ => unknown(),
            },
            _ => unknown(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConsoleCommand::SelectTab(_) => "tab",
            ConsoleCommand::Refresh => "refresh",
            ConsoleCommand::Quit => "quit",
            ConsoleCommand::New => "new",
            ConsoleCommand::Edit(_) => "edit",
            ConsoleCommand::Set { .. } => "set",
            ConsoleCommand::Pick(_) => "pick",
            ConsoleCommand::Save => "save",
            ConsoleCommand::Cancel => "cancel",
            ConsoleCommand::Delete(_) => "delete",
            ConsoleCommand::Send => "send",
            ConsoleCommand::Burst => "burst",
            ConsoleCommand::Answer(_) => "answer",
            ConsoleCommand::Unknown(_) => "unknown",
        }
    }
}

/// A question waiting for the operator's `y` or `n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingQuestion {
    DeleteClient(String),
    DeleteConfig(String),
    EditExistingConfig(String),
}

impl PendingQuestion {
    pub fn prompt(&self) -> String {
        match self {
            PendingQuestion::DeleteClient(id) => format!(
                "Are you sure you want to delete client {}? This will not delete the rate limit configuration.",
                id
            ),
            PendingQuestion::DeleteConfig(id) => format!(
                "Are you sure you want to delete configuration for client {}?",
                id
            ),
            PendingQuestion::EditExistingConfig(_) => {
                "A configuration already exists for this client. Do you want to edit it instead?"
                    .to_string()
            }
        }
    }
}

/// Confirmation answered ahead of time by the operator
///
/// The console arms an answer before running the panel action that asks for
/// it. An unarmed prompt declines.
#[derive(Debug, Default)]
pub struct ConsoleConfirm {
    answer: Mutex<Option<bool>>,
}

impl ConsoleConfirm {
    fn arm(&self, answer: Option<bool>) {
        *self.answer.lock().unwrap_or_else(|p| p.into_inner()) = answer;
    }
}

impl Confirm for ConsoleConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let answer = self
            .answer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        debug!("{} -> {:?}", prompt, answer);
        answer.unwrap_or(false)
    }
}

pub struct Console {
    pub clients: ClientManagementPanel,
    pub system_limits: SystemLimitPanel,
    pub rate_limits: RateLimitConfigPanel,
    pub notifications: NotificationTestPanel,
    api: Arc<dyn AdminApi>,
    active: Tab,
    toaster: Toaster,
    monitor: Option<Arc<RequestMonitor>>,
    /// Set when questions are asked on screen rather than by `confirm`
    prompts: Option<Arc<ConsoleConfirm>>,
    pending: Option<PendingQuestion>,
}

impl Console {
    pub fn new(api: Arc<dyn AdminApi>, toaster: Toaster, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            clients: ClientManagementPanel::new(
                Arc::clone(&api),
                toaster.clone(),
                Arc::clone(&confirm),
            ),
            system_limits: SystemLimitPanel::new(Arc::clone(&api), toaster.clone()),
            rate_limits: RateLimitConfigPanel::new(Arc::clone(&api), toaster.clone(), confirm),
            notifications: NotificationTestPanel::new(Arc::clone(&api), toaster.clone()),
            api,
            active: Tab::Clients,
            toaster,
            monitor: None,
            prompts: None,
            pending: None,
        }
    }

    /// A console that asks its questions on screen and takes the answer from
    /// the next command
    pub fn interactive(api: Arc<dyn AdminApi>, toaster: Toaster) -> Self {
        let prompts = Arc::new(ConsoleConfirm::default());
        let mut console = Self::new(api, toaster, Arc::clone(&prompts) as Arc<dyn Confirm>);
        console.prompts = Some(prompts);
        console
    }

    pub fn with_burst_size(mut self, burst_size: usize) -> Self {
        self.notifications = self.notifications.with_burst_size(burst_size);
        self
    }

    /// Show request statistics in the status line
    pub fn with_monitor(mut self, monitor: Arc<RequestMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Backend shared by the panels, for lookups outside any panel
    pub fn api(&self) -> Arc<dyn AdminApi> {
        Arc::clone(&self.api)
    }

    pub fn active_tab(&self) -> Tab {
        self.active
    }

    pub fn toaster(&self) -> &Toaster {
        &self.toaster
    }

    pub fn pending(&self) -> Option<&PendingQuestion> {
        self.pending.as_ref()
    }

    fn panel(&self, tab: Tab) -> &dyn Panel {
        match tab {
            Tab::Clients => &self.clients,
            Tab::SystemLimits => &self.system_limits,
            Tab::RateLimits => &self.rate_limits,
            Tab::Notifications => &self.notifications,
        }
    }

    fn panel_mut(&mut self, tab: Tab) -> &mut dyn Panel {
        match tab {
            Tab::Clients => &mut self.clients,
            Tab::SystemLimits => &mut self.system_limits,
            Tab::RateLimits => &mut self.rate_limits,
            Tab::Notifications => &mut self.notifications,
        }
    }

    /// Initial load of every panel
    pub async fn start(&mut self) {
        info!("Loading console data");
        self.poll_all().await;
    }

    /// Switch tabs by zero-based index
    ///
    /// The rate-limit and notification tabs refresh their client pickers on
    /// activation. Out-of-range indexes are ignored.
    pub async fn select_tab(&mut self, index: usize) -> Option<Tab> {
        let tab = Tab::from_index(index)?;
        debug!("Switching to tab {}", tab);
        self.active = tab;
        if matches!(tab, Tab::RateLimits | Tab::Notifications) {
            self.panel_mut(tab).on_activated().await;
        }
        Some(tab)
    }

    /// Refresh every panel; panels with an open form skip themselves
    pub async fn poll_all(&mut self) {
        for tab in Tab::ALL {
            self.panel_mut(tab).poll().await;
        }
    }

    /// Expire toasts whose time is up
    pub fn tick(&self) -> usize {
        self.toaster.tick()
    }

    /// Run one operator command on the active tab
    ///
    /// Input that cannot be carried out raises a warning toast. Panel
    /// failures have already raised their own toasts.
    pub async fn execute(&mut self, command: ConsoleCommand) {
        if let Err(e) = self.try_execute(command).await {
            self.toaster.warning(&e.to_string());
        }
    }

    async fn try_execute(&mut self, command: ConsoleCommand) -> Result<(), CommandError> {
        if let Some(question) = self.pending.take() {
            if let ConsoleCommand::Answer(yes) = command {
                self.answer(question, yes).await;
                return Ok(());
            }
            debug!("Question left unanswered: {}", question.prompt());
        }

        match (command, self.active) {
            (ConsoleCommand::SelectTab(index), _) => {
                self.select_tab(index).await;
            }
            (ConsoleCommand::Refresh, _) => self.poll_all().await,
            (ConsoleCommand::Quit, _) => {}
            (ConsoleCommand::Unknown(line), _) if line.is_empty() => {}
            (ConsoleCommand::Unknown(line), _) => return Err(CommandError::Unknown(line)),
            (ConsoleCommand::Answer(_), _) => return Err(CommandError::NothingToAnswer),

            (ConsoleCommand::New, Tab::Clients) => self.clients.show_new_form(),
            (ConsoleCommand::New, Tab::RateLimits) => self.rate_limits.show_new_form().await,
            (ConsoleCommand::New | ConsoleCommand::Edit(None), Tab::SystemLimits) => {
                self.system_limits.begin_edit()
            }
            (ConsoleCommand::Edit(Some(id)), Tab::Clients) => {
                let client = self
                    .clients
                    .clients()
                    .iter()
                    .find(|c| c.client_id == id)
                    .cloned()
                    .ok_or(CommandError::NotFound { kind: "client", id })?;
                self.clients.edit_client(&client);
            }
            (ConsoleCommand::Edit(Some(id)), Tab::RateLimits) => {
                let config = self
                    .rate_limits
                    .configs()
                    .iter()
                    .find(|c| c.client_id == id)
                    .cloned()
                    .ok_or(CommandError::NotFound {
                        kind: "configuration",
                        id,
                    })?;
                self.rate_limits.edit_config(&config);
            }

            (ConsoleCommand::Set { field, value }, tab) => self.set_field(tab, &field, &value)?,

            (ConsoleCommand::Pick(id), Tab::RateLimits) => {
                let creating = matches!(
                    self.rate_limits.form(),
                    Some(form) if form.mode == FormMode::Create
                );
                if !creating {
                    return Err(CommandError::NoOpenForm);
                }
                let exists = self.rate_limits.configs().iter().any(|c| c.client_id == id);
                if exists {
                    self.ask(PendingQuestion::EditExistingConfig(id)).await;
                } else {
                    self.rate_limits.select_client(&id).await;
                }
            }
            (ConsoleCommand::Pick(id), Tab::Notifications) => self.notifications.client_id = id,

            (ConsoleCommand::Save, tab) if !self.panel(tab).is_form_open() => {
                if tab == Tab::Notifications {
                    return Err(CommandError::NotOnTab {
                        command: "save",
                        tab: tab.title(),
                    });
                }
                return Err(CommandError::NoOpenForm);
            }
            (ConsoleCommand::Save, Tab::Clients) => {
                let _ = self.clients.submit().await;
            }
            (ConsoleCommand::Save, Tab::RateLimits) => {
                let _ = self.rate_limits.submit().await;
            }
            (ConsoleCommand::Save, Tab::SystemLimits) => {
                let _ = self.system_limits.submit().await;
            }

            (ConsoleCommand::Cancel, Tab::Clients) => self.clients.cancel_edit(),
            (ConsoleCommand::Cancel, Tab::RateLimits) => self.rate_limits.cancel_edit(),
            (ConsoleCommand::Cancel, Tab::SystemLimits) => self.system_limits.cancel_edit(),

            (ConsoleCommand::Delete(id), Tab::Clients) => {
                self.ask(PendingQuestion::DeleteClient(id)).await
            }
            (ConsoleCommand::Delete(id), Tab::RateLimits) => {
                self.ask(PendingQuestion::DeleteConfig(id)).await
            }

            (ConsoleCommand::Send, Tab::Notifications) => {
                let _ = self.notifications.send_notification().await;
            }
            (ConsoleCommand::Burst, Tab::Notifications) => {
                let _ = self.notifications.send_burst().await;
            }

            (command, tab) => {
                return Err(CommandError::NotOnTab {
                    command: command.name(),
                    tab: tab.title(),
                })
            }
        }
        Ok(())
    }

    /// Put a question on screen, or let the panel's own confirmation decide
    /// when the console does not ask questions itself
    async fn ask(&mut self, question: PendingQuestion) {
        if self.prompts.is_some() {
            self.pending = Some(question);
        } else {
            self.run_question(question).await;
        }
    }

    async fn answer(&mut self, question: PendingQuestion, yes: bool) {
        if let Some(prompts) = &self.prompts {
            prompts.arm(Some(yes));
        }
        self.run_question(question).await;
        // The panel may not have asked, e.g. when the lookup failed
        if let Some(prompts) = &self.prompts {
            prompts.arm(None);
        }
    }

    async fn run_question(&mut self, question: PendingQuestion) {
        match question {
            PendingQuestion::DeleteClient(id) => {
                let _ = self.clients.delete_client(&id).await;
            }
            PendingQuestion::DeleteConfig(id) => {
                let _ = self.rate_limits.delete_config(&id).await;
            }
            PendingQuestion::EditExistingConfig(id) => self.rate_limits.select_client(&id).await,
        }
    }

    fn set_field(&mut self, tab: Tab, field: &str, value: &str) -> Result<(), CommandError> {
        let count = || {
            value.parse::<u64>().map_err(|_| CommandError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            })
        };

        match tab {
            Tab::Clients => {
                let form = self.clients.form_mut().ok_or(CommandError::NoOpenForm)?;
                match field {
                    "id" | "clientid" if form.mode == FormMode::Edit => {
                        return Err(CommandError::ReadOnly("Client ID"))
                    }
                    "id" | "clientid" => form.client.client_id = value.to_string(),
                    "name" => form.client.name = value.to_string(),
                    "description" => form.client.description = Some(value.to_string()),
                    "email" | "contactemail" => form.client.contact_email = Some(value.to_string()),
                    _ => return Err(CommandError::UnknownField(field.to_string())),
                }
            }
            Tab::RateLimits => {
                let mode = self
                    .rate_limits
                    .form()
                    .map(|form| form.mode)
                    .ok_or(CommandError::NoOpenForm)?;
                if matches!(field, "client" | "clientid") {
                    if mode == FormMode::Edit {
                        return Err(CommandError::ReadOnly("Client ID"));
                    }
                    self.rate_limits.enter_client_id(value);
                    return Ok(());
                }

                let form = self.rate_limits.form_mut().ok_or(CommandError::NoOpenForm)?;
                match field {
                    "requests" => form.config.time_window_requests = count()?,
                    "window" | "seconds" => form.config.time_window_seconds = count()?,
                    "monthly" => form.config.monthly_requests = count()?,
                    "mode" => {
                        form.config.throttling_mode =
                            value.parse().map_err(|_| CommandError::InvalidValue {
                                field: field.to_string(),
                                value: value.to_string(),
                            })?
                    }
                    _ => return Err(CommandError::UnknownField(field.to_string())),
                }
            }
            Tab::SystemLimits => match field {
                "rps" => self.system_limits.set_global_requests_per_second(count()?),
                _ => return Err(CommandError::UnknownField(field.to_string())),
            },
            Tab::Notifications => {
                let panel = &mut self.notifications;
                match field {
                    "client" | "clientid" => panel.client_id = value.to_string(),
                    "channel" => {
                        panel.channel = value.parse().map_err(|_| CommandError::InvalidValue {
                            field: field.to_string(),
                            value: value.to_string(),
                        })?
                    }
                    "recipient" => panel.request.recipient = value.to_string(),
                    "message" => panel.request.message = value.to_string(),
                    _ => return Err(CommandError::UnknownField(field.to_string())),
                }
            }
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let strip: Vec<String> = Tab::ALL
            .iter()
            .map(|tab| {
                if *tab == self.active {
                    format!("[{}] *{}*", tab.index() + 1, tab.title())
                } else {
                    format!("[{}] {}", tab.index() + 1, tab.title())
                }
            })
            .collect();

        let mut out = strip.join("  ");
        out.push_str("\n\n");
        out.push_str(&self.panel(self.active).render());

        if let Some(question) = &self.pending {
            out.push_str(&format!("\n\n{} [y/n]", question.prompt()));
        }

        let center = self.toaster.lock();
        if center.active_count() > 0 {
            out.push('\n');
            for toast in center.active() {
                out.push_str(&format!("\n{}", toast));
            }
        }
        drop(center);

        if let Some(monitor) = &self.monitor {
            out.push_str("\n\n");
            out.push_str(&monitor.snapshot().status_line());
        }
        out.push_str("\n\n");
        out.push_str(self.active.hint());
        out.push_str("\n1-4 switch tab, r refresh, q quit");
        out
    }
}
