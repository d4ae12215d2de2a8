mod console;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use huddle_chats::{
    login, member_channel, register, Composer, LoginForm, Member, RegistrationForm, Sidebar,
    SidebarItem, LOGIN_ROUTE,
};
use huddle_config::{load as load_config, AppConfig};
use huddle_gateway::{build_router, AppState};
use huddle_rowstore::Upload;
use huddle_runtime::{telemetry, ClientServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Huddle chat client (lists channels by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the registration gateway
    Serve,
    /// Create an account through the gateway
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Keep the session after this process exits
        #[arg(long)]
        remember: bool,
    },
    /// Forget the stored session
    Logout,
    /// List joined channels, plus suggestions for a search
    Channels {
        #[arg(long)]
        search: Option<String>,
    },
    /// Create a public channel
    NewChannel { name: String },
    /// Join an existing channel
    Join { channel_id: String },
    /// Open a direct message with a member
    Dm { email: String },
    /// Follow a channel and chat interactively
    Watch { channel_id: String },
    /// Send one message
    Send {
        channel_id: String,
        text: String,
        /// Image to attach
        #[arg(long)]
        attach: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Channels { search: None }) {
        Commands::Serve => run_server(&config).await,
        Commands::Register {
            email,
            password,
            confirm_password,
        } => run_register(&config, RegistrationForm::new(email, password, confirm_password)).await,
        Commands::Login {
            email,
            password,
            remember,
        } => run_login(&config, LoginForm::new(email, password).remember(remember)).await,
        Commands::Logout => run_logout(&config),
        Commands::Channels { search } => run_channels(&config, search).await,
        Commands::NewChannel { name } => {
            run_selection(&config, Some(name), SidebarItem::NewChannel).await
        }
        Commands::Join { channel_id } => {
            run_selection(&config, None, SidebarItem::JoinChannel(channel_id)).await
        }
        Commands::Dm { email } => run_direct_message(&config, &email).await,
        Commands::Watch { channel_id } => {
            let (services, member) = signed_in(&config).await?;
            console::run(&services, member, &channel_id).await
        }
        Commands::Send {
            channel_id,
            text,
            attach,
        } => run_send(&config, &channel_id, text, attach).await,
    }
}

async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    info!("starting Huddle gateway");

    let state = AppState::from_config(config).context("failed to build gateway state")?;
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(huddle_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("gateway shut down");
    Ok(())
}

async fn run_register(config: &AppConfig, form: RegistrationForm) -> anyhow::Result<()> {
    let services = ClientServices::initialise(config, "/register")?;
    let registrar = services.registrar()?;
    register(&registrar, &form).await?;
    println!("Registered {}. Sign in with `huddle login`.", form.email.trim());
    Ok(())
}

async fn run_login(config: &AppConfig, form: LoginForm) -> anyhow::Result<()> {
    let services = ClientServices::initialise(config, LOGIN_ROUTE)?;
    let cookie = login(services.store.as_ref(), &form, &services.sessions).await?;
    services.client.set_token(Some(cookie.value.clone()));

    match services.directory.current_member().await? {
        Some(member) => println!("Signed in as {}", member.display_name()),
        None => println!("Signed in"),
    }
    Ok(())
}

fn run_logout(config: &AppConfig) -> anyhow::Result<()> {
    let services = ClientServices::initialise(config, "/")?;
    services.sessions.clear()?;
    println!("Signed out");
    Ok(())
}

/// Resolves the member behind the stored session.
async fn signed_in(config: &AppConfig) -> anyhow::Result<(ClientServices, Member)> {
    let services = ClientServices::initialise(config, "/")?;
    let member = services.directory.current_member().await;
    if services.redirected_to_login() {
        bail!("session expired; sign in again with `huddle login`");
    }
    match member? {
        Some(member) => Ok((services, member)),
        None => bail!("not signed in; run `huddle login` first"),
    }
}

async fn run_channels(config: &AppConfig, search: Option<String>) -> anyhow::Result<()> {
    let (services, member) = signed_in(config).await?;
    let sidebar = Sidebar::new(services.store.clone());
    sidebar.set_member(Some(member));
    sidebar.set_search(search.unwrap_or_default());
    sidebar.refresh().await?;

    let entries = sidebar.entries();
    if entries.is_empty() {
        println!("No channels yet. Create one with `huddle new-channel <name>`.");
    }
    for entry in entries {
        match &entry.item {
            SidebarItem::Channel(id) | SidebarItem::JoinChannel(id) => {
                println!("  {:<32} {}", entry.label, id)
            }
            SidebarItem::DirectMessage(member) => println!("  {:<32} {}", entry.label, member.id),
            SidebarItem::NewChannel => println!("  {}", entry.label),
        }
    }
    Ok(())
}

async fn run_selection(
    config: &AppConfig,
    search: Option<String>,
    item: SidebarItem,
) -> anyhow::Result<()> {
    let (services, member) = signed_in(config).await?;
    let sidebar = Sidebar::new(services.store.clone());
    sidebar.set_member(Some(member));
    if let Some(search) = search {
        sidebar.set_search(search);
    }

    let selection = sidebar.select(item).await?;
    if let Some(channel_id) = selection.channel_id() {
        println!("Opened channel {channel_id}. Follow it with `huddle watch {channel_id}`.");
    }
    Ok(())
}

async fn run_direct_message(config: &AppConfig, email: &str) -> anyhow::Result<()> {
    let (services, member) = signed_in(config).await?;
    let other = services
        .directory
        .search(email, 5)
        .await?
        .into_iter()
        .find(|candidate| candidate.email.eq_ignore_ascii_case(email.trim()))
        .with_context(|| format!("no member with email {email}"))?;

    let sidebar = Sidebar::new(services.store.clone());
    sidebar.set_member(Some(member));
    let selection = sidebar.select(SidebarItem::DirectMessage(other)).await?;
    if let Some(channel_id) = selection.channel_id() {
        println!("Direct message ready: {channel_id}");
    }
    Ok(())
}

async fn run_send(
    config: &AppConfig,
    channel_id: &str,
    text: String,
    attach: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (services, member) = signed_in(config).await?;
    let channel = member_channel(services.store.as_ref(), &member, channel_id).await?;
    let mut composer = Composer::new();
    if let Some(path) = attach {
        let upload = read_upload(&path).await?;
        composer.attach(services.store.as_ref(), upload).await?;
    }
    composer.set_text(text);

    match composer
        .send(services.store.as_ref(), Some(&member), &channel.id)
        .await?
    {
        Some(message) => println!("Sent {}", message.id),
        None => println!("Nothing to send"),
    }
    Ok(())
}

pub(crate) async fn read_upload(path: &Path) -> anyhow::Result<Upload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(Upload::new(file_name, guess_content_type(path), bytes))
}

fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
