// Config Module - Client configuration and command-line argument parsing
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// Global storage for custom config path
static CUSTOM_CONFIG_PATH: OnceLock<Option<String>> = OnceLock::new();

const CONFIG_DIR: &str = "dotclock";
const DEFAULT_LOG_FILE: &str = "dotclock.log";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Settings editor for the ESP32 dot-matrix alarm clock",
    long_about = "Reads, edits and writes the clock and network settings of an ESP32 alarm clock\n\
                  over its JSON API. Also syncs the clock time, manages files on the device and\n\
                  can run a local emulator of the device API."
)]
pub struct Args {
    /// Config file path or name (e.g., --cfg /full/path or --cfg bedroom for ~/.config/dotclock/bedroom.conf)
    #[arg(long)]
    pub cfg: Option<String>,

    /// Device base URL, e.g. http://192.168.4.1
    #[arg(short, long)]
    pub device: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Domain {
    #[default]
    Clock,
    Network,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Interactive settings editor (default)
    Edit {
        #[arg(value_enum, default_value = "clock")]
        domain: Domain,
    },
    /// Print a settings document as JSON
    Show {
        #[arg(value_enum, default_value = "clock")]
        domain: Domain,
    },
    /// List the alarm sounds available on the device
    Sounds,
    /// Read or set the device clock
    Time {
        #[command(subcommand)]
        action: TimeAction,
    },
    /// Manage files on the device filesystem
    Files {
        #[command(subcommand)]
        action: FileAction,
    },
    /// Run a local emulator of the device API
    Emulate {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum TimeAction {
    Show,
    /// Set the device clock from this machine's clock
    Sync,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum FileAction {
    List {
        #[arg(long)]
        filesystem: Option<String>,
    },
    Delete {
        name: String,
    },
    Upload {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>,  // Stores the config file path (not serialized)

    pub device_url: String,
    pub json_endpoint: String,
    pub upload_endpoint: String,
    pub request_timeout_ms: u64,
    pub filesystem: String,
    pub sound_label_field: String,
    pub emulator_ip: String,
    pub emulator_port: u16,
    pub log_file: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            config_path: None,
            // The clock serves its own access point on this address until it joins a network
            device_url: "http://192.168.4.1".to_string(),
            json_endpoint: "api/json/request".to_string(),
            upload_endpoint: "api/file_upload/www/".to_string(),
            request_timeout_ms: 5000,
            filesystem: "/www".to_string(),
            sound_label_field: "wavsound".to_string(),
            emulator_ip: "127.0.0.1".to_string(),
            emulator_port: 8080,
            log_file: String::new(),
        }
    }
}

fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

impl ClientConfig {
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        // Track if any args were actually provided
        let mut args_provided = false;

        if let Some(ref device) = args.device {
            self.device_url = device.clone();
            args_provided = true;
        }

        if let Some(timeout_ms) = args.timeout_ms {
            self.request_timeout_ms = timeout_ms;
            args_provided = true;
        }

        if let Some(Command::Emulate { ip, port }) = &args.command {
            if let Some(ip) = ip {
                self.emulator_ip = ip.clone();
                args_provided = true;
            }
            if let Some(port) = port {
                self.emulator_port = *port;
                args_provided = true;
            }
        }

        if args_provided {
            self.sanitize();
        }
        args_provided
    }

    /// Set the global config path (called once at startup)
    pub fn set_config_path(cfg: Option<String>) {
        let _ = CUSTOM_CONFIG_PATH.set(cfg);
    }

    /// Get the global config path (if set)
    fn get_config_path_arg() -> Option<&'static str> {
        CUSTOM_CONFIG_PATH.get().and_then(|opt| opt.as_deref())
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let config_dir = PathBuf::from(home).join(".config").join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        // Priority: explicit arg > global > None
        let cfg = cfg_arg.or_else(|| Self::get_config_path_arg());

        let Some(cfg) = cfg else {
            return Ok(Self::config_dir()?.join("config.conf"));
        };

        // Absolute or relative paths are used as given
        let path = PathBuf::from(cfg);
        if path.is_absolute() || cfg.contains('/') || cfg.contains('\\') {
            return Ok(path);
        }

        // Otherwise treat as config name in config directory
        let filename = if cfg.ends_with(".conf") {
            cfg.to_string()
        } else {
            format!("{}.conf", cfg)
        };
        Ok(Self::config_dir()?.join(filename))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut parsed: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        parsed.config_path = Some(path.to_path_buf());
        parsed.sanitize();
        Ok(parsed)
    }

    /// Load the config, writing a default one first when none exists yet
    pub fn load_or_create(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        if !path.exists() {
            let config = ClientConfig {
                config_path: Some(path.clone()),
                ..Default::default()
            };
            config.save()?;
            eprintln!("📝 Created default config at {}", path.display());
            return Ok(config);
        }
        Self::load_from(&path)
    }

    /// Sanitize config values to handle common formatting issues
    pub fn sanitize(&mut self) {
        self.device_url = self.device_url.trim().trim_end_matches('/').to_string();
        self.json_endpoint = self.json_endpoint.trim().trim_start_matches('/').to_string();
        self.upload_endpoint = self.upload_endpoint.trim().trim_start_matches('/').to_string();
        if !self.upload_endpoint.is_empty() && !self.upload_endpoint.ends_with('/') {
            self.upload_endpoint.push('/');
        }
        self.sound_label_field = self.sound_label_field.trim().to_string();
        self.emulator_ip = self.emulator_ip.trim().to_string();
        self.log_file = self.log_file.trim().to_string();

        self.filesystem = self.filesystem.trim().trim_end_matches('/').to_string();
        if !self.filesystem.starts_with('/') {
            self.filesystem.insert(0, '/');
        }

        // Clamp numeric values to reasonable ranges
        self.request_timeout_ms = self.request_timeout_ms.clamp(100, 60000);
        self.emulator_port = self.emulator_port.max(1);

        // Empty required strings fall back to defaults
        let defaults = ClientConfig::default();
        if self.json_endpoint.is_empty() {
            self.json_endpoint = defaults.json_endpoint;
        }
        if self.upload_endpoint.is_empty() {
            self.upload_endpoint = defaults.upload_endpoint;
        }
        if self.sound_label_field.is_empty() {
            self.sound_label_field = defaults.sound_label_field;
        }
    }

    /// Where the editor writes its log while it owns the terminal
    pub fn log_path(&self) -> Result<PathBuf> {
        if !self.log_file.is_empty() {
            return Ok(PathBuf::from(&self.log_file));
        }
        match self.config_path.as_deref().and_then(Path::parent) {
            Some(dir) => Ok(dir.join(DEFAULT_LOG_FILE)),
            None => Ok(Self::config_dir()?.join(DEFAULT_LOG_FILE)),
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::config_path(None)?,
        };

        // Sanitize values before saving
        let mut sanitized = self.clone();
        sanitized.sanitize();

        // Build TOML with comments manually for better documentation
        let contents = format!(
            r#"# dotclock Configuration File

# Base URL of the clock (its own access point answers on http://192.168.4.1)
device_url = {}

# JSON API endpoint, relative to device_url
json_endpoint = {}

# File upload endpoint, relative to device_url (file name is appended)
upload_endpoint = {}

# Request timeout in milliseconds (100-60000)
request_timeout_ms = {}

# Filesystem listed by 'files list'
filesystem = {}

# Field of the sound list shown in the suggestion dropdown
sound_label_field = {}

# Address and port for 'emulate'
emulator_ip = {}
emulator_port = {}

# Log file used while the editor owns the terminal (empty = next to this file)
log_file = {}
"#,
            quoted(&sanitized.device_url),
            quoted(&sanitized.json_endpoint),
            quoted(&sanitized.upload_endpoint),
            sanitized.request_timeout_ms,
            quoted(&sanitized.filesystem),
            quoted(&sanitized.sound_label_field),
            quoted(&sanitized.emulator_ip),
            sanitized.emulator_port,
            quoted(&sanitized.log_file),
        );

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, contents)?;
        Ok(())
    }
}
