use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use ratelimit_console::api::{AdminApi, MockBackend, RestBackend};
use ratelimit_console::config::{BackendKind, Config, API_URL_ENV};
use ratelimit_console::console::{Console, ConsoleCommand};
use ratelimit_console::error::{ConfigError, PanelError};
use ratelimit_console::models::{Client, NotificationChannel, RateLimitConfig, ThrottlingMode};
use ratelimit_console::monitoring::RequestMonitor;
use ratelimit_console::panels::{AssumeYes, Panel, StdinConfirm};
use ratelimit_console::toasts::{ToastCenter, Toaster};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Command-line arguments for the rate limiter admin console
#[derive(Parser, Debug)]
#[command(
    name = "ratelimit-console",
    about = "Admin console for the rate limiter backend",
    long_about = "Manage clients, per-client rate limits and the global system limit of a \
                  rate limiter backend, and send test notifications to watch throttling happen."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// API root, overriding the config file and API_URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Backend implementation
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage clients
    Clients {
        #[command(subcommand)]
        action: ClientAction,
    },
    /// Manage per-client rate limits
    Limits {
        #[command(subcommand)]
        action: LimitAction,
    },
    /// View or change the global system limit
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
    /// Send test notifications
    Notify(NotifyArgs),
    /// Interactive console with periodic refresh
    Watch {
        /// Tab to open on (1-4)
        #[arg(long, default_value_t = 1)]
        tab: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ClientAction {
    List,
    Get {
        client_id: String,
    },
    Create {
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        contact_email: Option<String>,
    },
    Update {
        client_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        contact_email: Option<String>,
    },
    Delete {
        client_id: String,
    },
}

#[derive(Args, Debug, Default)]
struct QuotaArgs {
    /// Requests allowed per time window
    #[arg(long)]
    requests: Option<u64>,
    /// Length of the time window in seconds
    #[arg(long)]
    window_seconds: Option<u64>,
    /// Requests allowed per month
    #[arg(long)]
    monthly: Option<u64>,
    /// Throttling mode once the quota is used up
    #[arg(long)]
    mode: Option<ThrottlingMode>,
}

impl QuotaArgs {
    fn apply(&self, config: &mut RateLimitConfig) {
        if let Some(requests) = self.requests {
            config.time_window_requests = requests;
        }
        if let Some(seconds) = self.window_seconds {
            config.time_window_seconds = seconds;
        }
        if let Some(monthly) = self.monthly {
            config.monthly_requests = monthly;
        }
        if let Some(mode) = self.mode {
            config.throttling_mode = mode;
        }
    }
}

#[derive(Subcommand, Debug)]
enum LimitAction {
    List,
    Get {
        client_id: String,
    },
    Create {
        #[arg(long)]
        client_id: String,
        #[command(flatten)]
        quota: QuotaArgs,
    },
    Update {
        client_id: String,
        #[command(flatten)]
        quota: QuotaArgs,
    },
    Delete {
        client_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    Get,
    Set {
        /// Global requests per second
        #[arg(long)]
        rps: u64,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelArg {
    Email,
    Sms,
}

impl From<ChannelArg> for NotificationChannel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Email => NotificationChannel::Email,
            ChannelArg::Sms => NotificationChannel::Sms,
        }
    }
}

#[derive(Args, Debug)]
struct NotifyArgs {
    #[arg(value_enum)]
    channel: ChannelArg,
    #[arg(long)]
    client_id: String,
    #[arg(long)]
    recipient: String,
    #[arg(long)]
    message: String,
    /// Send a burst of concurrent requests instead of one
    #[arg(long)]
    burst: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// Missing config files are not an error here; loading falls back to
    /// defaults.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Command::Watch { tab } = self.command {
            if !(1..=4).contains(&tab) {
                return Err(format!("Tab must be between 1 and 4, got {}", tab));
            }
        }

        Ok(())
    }

    /// Settings after applying `API_URL` and the command-line overrides
    fn resolve_config(&self, env_api_url: Option<String>) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref());
        config.apply_env_from(env_api_url);
        if let Some(url) = &self.api_url {
            config.api.url = url.trim().to_string();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        config.validate()?;
        Ok(config)
    }
}

/// A mock backend with one throttled client, so the console has something to
/// show without a server
fn demo_backend() -> MockBackend {
    let mut client = Client::new("demo-client", "Demo Client");
    client.description = Some("Seeded by the mock backend".to_string());
    MockBackend::new()
        .with_client(client)
        .with_rate_limit(RateLimitConfig {
            client_id: "demo-client".to_string(),
            time_window_requests: 5,
            time_window_seconds: 60,
            ..RateLimitConfig::default()
        })
}

fn build_backend(
    config: &Config,
    monitor: Arc<RequestMonitor>,
) -> Result<Arc<dyn AdminApi>, ConfigError> {
    match config.backend {
        BackendKind::Http => {
            info!("Using backend at {}", config.api.url);
            let backend = RestBackend::new(&config.api.url, config.request_timeout())?
                .with_monitor(monitor);
            Ok(Arc::new(backend))
        }
        BackendKind::Mock => {
            info!("Using in-memory mock backend");
            Ok(Arc::new(demo_backend()))
        }
    }
}

/// Write toasts raised since the last call to stderr
fn flush_toasts(toaster: &Toaster) {
    for toast in toaster.drain_new() {
        eprintln!("{}", toast);
    }
}

async fn run_clients(console: &mut Console, action: ClientAction) -> anyhow::Result<()> {
    match action {
        ClientAction::List => {
            let panel = &mut console.clients;
            panel.load_clients().await?;
            println!("{}", panel.render());
        }
        ClientAction::Get { client_id } => {
            let api = console.api();
            let client = api
                .get_client(&client_id)
                .await
                .with_context(|| format!("Error loading client {}", client_id))?;
            println!("{}", serde_json::to_string_pretty(&client)?);
        }
        ClientAction::Create {
            client_id,
            name,
            description,
            contact_email,
        } => {
            let panel = &mut console.clients;
            panel.show_new_form();
            if let Some(form) = panel.form_mut() {
                form.client.client_id = client_id;
                form.client.name = name;
                form.client.description = description;
                form.client.contact_email = contact_email;
            }
            let created = panel.submit().await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        ClientAction::Update {
            client_id,
            name,
            description,
            contact_email,
        } => {
            let api = console.api();
            let existing = api
                .get_client(&client_id)
                .await
                .with_context(|| format!("Error loading client {}", client_id))?;
            let panel = &mut console.clients;
            panel.edit_client(&existing);
            if let Some(form) = panel.form_mut() {
                if let Some(name) = name {
                    form.client.name = name;
                }
                if description.is_some() {
                    form.client.description = description;
                }
                if contact_email.is_some() {
                    form.client.contact_email = contact_email;
                }
            }
            let updated = panel.submit().await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        ClientAction::Delete { client_id } => {
            if !console.clients.delete_client(&client_id).await? {
                println!("Cancelled");
            }
        }
    }
    Ok(())
}

async fn run_limits(console: &mut Console, action: LimitAction) -> anyhow::Result<()> {
    match action {
        LimitAction::List => {
            let panel = &mut console.rate_limits;
            panel.load_configs().await?;
            println!("{}", panel.render());
        }
        LimitAction::Get { client_id } => {
            let config = console.api()
                .get_rate_limit(&client_id)
                .await
                .with_context(|| format!("Error loading configuration for {}", client_id))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        LimitAction::Create { client_id, quota } => {
            let panel = &mut console.rate_limits;
            panel.show_new_form().await;
            panel.enter_client_id(&client_id);
            if let Some(form) = panel.form_mut() {
                quota.apply(&mut form.config);
            }
            let created = panel.submit().await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        LimitAction::Update { client_id, quota } => {
            let existing = console.api()
                .get_rate_limit(&client_id)
                .await
                .with_context(|| format!("Error loading configuration for {}", client_id))?;
            let panel = &mut console.rate_limits;
            panel.edit_config(&existing);
            if let Some(form) = panel.form_mut() {
                quota.apply(&mut form.config);
            }
            let updated = panel.submit().await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        LimitAction::Delete { client_id } => {
            if !console.rate_limits.delete_config(&client_id).await? {
                println!("Cancelled");
            }
        }
    }
    Ok(())
}

async fn run_system(console: &mut Console, action: SystemAction) -> anyhow::Result<()> {
    let panel = &mut console.system_limits;
    panel.load().await?;
    if let SystemAction::Set { rps } = action {
        panel.set_global_requests_per_second(rps);
        panel.submit().await?;
    }
    println!("{}", panel.render());
    Ok(())
}

async fn run_notify(console: &mut Console, args: NotifyArgs) -> anyhow::Result<()> {
    let panel = &mut console.notifications;
    panel.client_id = args.client_id;
    panel.channel = args.channel.into();
    panel.request.recipient = args.recipient;
    panel.request.message = args.message;

    if args.burst {
        panel.send_burst().await?;
    } else {
        panel.send_notification().await?;
    }
    println!("{}", panel.render());
    Ok(())
}

fn redraw(console: &Console) {
    let mut stdout = std::io::stdout();
    // Clear screen and home the cursor
    let _ = write!(stdout, "\x1b[2J\x1b[H{}\n> ", console.render());
    let _ = stdout.flush();
}

/// Interactive mode: refresh on an interval, run the commands typed on stdin
/// against the active tab and stop on `q` or Ctrl-C
async fn watch(mut console: Console, poll_interval: Duration, tab: usize) -> anyhow::Result<()> {
    let (shutdown_sender, mut shutdown_receiver) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler")?;

    console.start().await;
    console.select_tab(tab.saturating_sub(1)).await;
    redraw(&console);

    let mut poll = tokio::time::interval(poll_interval);
    // The first tick completes immediately; start() already loaded everything
    poll.tick().await;
    let mut redraw_tick = tokio::time::interval(Duration::from_secs(1));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = poll.tick() => console.poll_all().await,
            _ = redraw_tick.tick() => {
                if console.tick() == 0 {
                    continue;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match ConsoleCommand::parse(&line) {
                    ConsoleCommand::Quit => break,
                    command => console.execute(command).await,
                },
                Ok(None) => {
                    info!("stdin closed, press Ctrl+C to stop");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read command: {}", e);
                    stdin_open = false;
                }
            },
            _ = shutdown_receiver.recv() => break,
        }
        console.tick();
        redraw(&console);
    }

    info!("Console stopped");
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli
        .resolve_config(std::env::var(API_URL_ENV).ok())
        .context("Invalid configuration")?;

    let monitor = Arc::new(RequestMonitor::new());
    let api = build_backend(&config, Arc::clone(&monitor)).context("Failed to create backend")?;
    let mut center = ToastCenter::with_settings(
        config.toast_durations(),
        config.toasts.max_visible,
        config.toasts.max_message_length,
    );
    if !matches!(cli.command, Command::Watch { .. }) {
        // One-shot commands print their toasts to stderr
        center = center.printed_by_caller();
    }
    let toaster = Toaster::new(center);
    let console = match (&cli.command, cli.yes) {
        (_, true) => Console::new(api, toaster.clone(), Arc::new(AssumeYes)),
        // stdin belongs to the command reader, so questions are answered there
        (Command::Watch { .. }, false) => Console::interactive(api, toaster.clone()),
        (_, false) => Console::new(api, toaster.clone(), Arc::new(StdinConfirm)),
    };
    let mut console = console
        .with_burst_size(config.notifications.burst_size)
        .with_monitor(monitor);

    let result = match cli.command {
        Command::Watch { tab } => watch(console, config.poll_interval(), tab).await,
        Command::Clients { action } => run_clients(&mut console, action).await,
        Command::Limits { action } => run_limits(&mut console, action).await,
        Command::System { action } => run_system(&mut console, action).await,
        Command::Notify(args) => run_notify(&mut console, args).await,
    };
    flush_toasts(&toaster);
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        if !already_reported(&e) {
            error!("{:#}", e);
        }
        std::process::exit(1);
    }
}

/// Panel errors were already shown as toasts
fn already_reported(e: &anyhow::Error) -> bool {
    e.downcast_ref::<PanelError>().is_some()
}
