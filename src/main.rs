// dotclock - Settings editor and tooling for the ESP32 dot-matrix alarm clock
// Talks to the clock's JSON API over HTTP, or serves an emulator of it
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod binding;
mod config;
mod device;
mod dropdown;
mod emulator;
mod form;
mod rows;
mod session;
mod settings;
mod transport;
mod tui;
mod types;

use config::{Args, ClientConfig, Command, Domain, FileAction, TimeAction};
use device::DeviceClient;
use emulator::DeviceState;
use session::EditingSession;
use settings::{ClockSettings, NetworkSettings, SettingsDocument};
use transport::HttpTransport;

// Logs go to a file while the editor owns the terminal, to stderr otherwise
fn init_logging(config: &ClientConfig, to_file: bool) -> Result<()> {
    let filter = |default: &str| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if to_file {
        let path = config.log_path()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter("info"))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter("warn"))
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn format_timestamp(utctimestamp: i64) -> Result<String> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    Ok(OffsetDateTime::from_unix_timestamp(utctimestamp)?.format(&format)?)
}

async fn show<D: SettingsDocument>(client: &DeviceClient<HttpTransport>, label_field: &str) -> Result<()> {
    let mut session = EditingSession::<D>::new(label_field);
    session.load(client).await?;
    if let Some(document) = session.document() {
        println!("{}", serde_json::to_string_pretty(document)?);
    }
    Ok(())
}

async fn run_command(command: Command, config: &ClientConfig, client: DeviceClient<HttpTransport>) -> Result<()> {
    match command {
        Command::Show { domain: Domain::Clock } => show::<ClockSettings>(&client, &config.sound_label_field).await,
        Command::Show { domain: Domain::Network } => show::<NetworkSettings>(&client, &config.sound_label_field).await,
        Command::Sounds => {
            let sounds = client.read_reference_list().await?;
            println!("🔔 {} sounds on {}:", sounds.len(), config.device_url);
            for label in sounds.labels(&config.sound_label_field) {
                println!("  {}", label);
            }
            Ok(())
        }
        Command::Time { action: TimeAction::Show } => {
            let now = client.read_time().await?;
            println!("🕰️  Device time: {}", format_timestamp(now)?);
            Ok(())
        }
        Command::Time { action: TimeAction::Sync } => {
            let local = OffsetDateTime::now_utc().unix_timestamp();
            client.set_time(local).await?;
            let now = client.read_time().await?;
            info!(local, device = now, "clock synchronized");
            println!("✅ Device time set to {}", format_timestamp(now)?);
            Ok(())
        }
        Command::Files { action: FileAction::List { filesystem } } => {
            let filesystem = filesystem.unwrap_or_else(|| config.filesystem.clone());
            let files = client.list_files(&filesystem).await?;
            println!("📁 {} ({} files)", filesystem, files.len());
            for file in files {
                println!("  {:>9}  {}", file.filesize, file.filename);
            }
            Ok(())
        }
        Command::Files { action: FileAction::Delete { name } } => {
            client.delete_file(&name).await?;
            println!("🗑️  Deleted {}", name);
            Ok(())
        }
        Command::Files { action: FileAction::Upload { path } } => {
            let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let size = bytes.len();
            let name = client.upload_file(&path.to_string_lossy(), bytes).await?;
            println!("📤 Uploaded {} ({} bytes)", name, size);
            Ok(())
        }
        Command::Edit { .. } | Command::Emulate { .. } => Ok(()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set global config path immediately (before any config loads)
    ClientConfig::set_config_path(args.cfg.clone());

    let mut config = match ClientConfig::load_or_create(args.cfg.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\n❌ Failed to load config file: {:#}", e);
            eprintln!("\nPlease fix the config file or delete it to regenerate with defaults.");
            return Err(e);
        }
    };

    // Persist command-line choices
    if config.merge_with_args(&args) {
        config.save()?;
    }

    let command = args.command.clone().unwrap_or(Command::Edit { domain: Domain::Clock });
    init_logging(&config, matches!(command, Command::Edit { .. }))?;

    if let Command::Emulate { .. } = command {
        let rt = tokio::runtime::Runtime::new()?;
        let state = DeviceState::default().shared();
        return rt.block_on(emulator::run_emulator(config.emulator_ip.clone(), config.emulator_port, state));
    }

    let client = DeviceClient::new(HttpTransport::from_config(&config)?);
    info!(url = client.transport().json_url(), "using device");

    match command {
        Command::Edit { domain: Domain::Clock } => tui::run_editor::<ClockSettings>(&config, client),
        Command::Edit { domain: Domain::Network } => tui::run_editor::<NetworkSettings>(&config, client),
        command => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_command(command, &config, client))
        }
    }
}
