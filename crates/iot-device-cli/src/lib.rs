//! # IoT Device CLI
//!
//! Command-line front end for the `iot-device-client` library.
//!
//! This module provides CLI commands for:
//! - Printing a device SAS token
//! - Publishing device-to-cloud telemetry
//! - Reading and settling cloud-to-device messages
//! - Managing device identities in the hub registry
//!
//! Every command issues one token up front and then performs its requests
//! sequentially. Nothing is retried.

use bytes::Bytes;
use clap::{Args, CommandFactory, Parser, Subcommand};
use iot_device_client::{
    AddDeviceOutcome, DeviceClientError, DeviceCredentials, HttpTransport, MessageId,
    OutboundMessage, QueueClient, RegistryClient, RemoveDeviceOutcome, ReqwestTransport,
    SasSigner, Settlement, ValidationError,
};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod telemetry;

pub use crate::config::{CliConfig, ConfigError, ConfigLoader};
pub use crate::telemetry::TelemetryReading;

// ============================================================================
// CLI Structure
// ============================================================================

/// IoT device CLI - Azure IoT Hub messaging over HTTPS
#[derive(Parser, Debug)]
#[command(name = "iot-device")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send and receive Azure IoT Hub device messages over HTTPS")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "IOT_DEVICE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Device identity flags; each overrides the configuration file
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// IoT hub name, without the domain
    #[arg(long = "hub", env = "IOT_HUB_NAME", global = true)]
    pub hub_name: Option<String>,

    /// Device name
    #[arg(long = "device", env = "IOT_DEVICE_NAME", global = true)]
    pub device_name: Option<String>,

    /// Base64 device shared key
    #[arg(long = "key", env = "IOT_DEVICE_KEY", global = true, hide_env_values = true)]
    pub shared_key: Option<String>,

    /// Device connection string; takes precedence over hub, device and key
    #[arg(
        long,
        env = "IOT_DEVICE_CONNECTION_STRING",
        global = true,
        hide_env_values = true
    )]
    pub connection_string: Option<String>,

    /// Token lifetime in seconds
    #[arg(long = "ttl", global = true)]
    pub token_ttl_seconds: Option<i64>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a device SAS token
    Token,

    /// Publish a device-to-cloud message
    Send {
        /// Literal message body
        #[arg(short, long, conflicts_with = "file")]
        payload: Option<String>,

        /// Read the message body from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Sensor id for the generated telemetry reading
        #[arg(long, default_value = telemetry::DEFAULT_SENSOR_ID)]
        sensor_id: String,

        /// Temperature for the generated telemetry reading
        #[arg(long, default_value_t = telemetry::DEFAULT_TEMPERATURE)]
        temperature: f64,

        /// Humidity for the generated telemetry reading
        #[arg(long, default_value_t = telemetry::DEFAULT_HUMIDITY)]
        humidity: f64,

        /// Content type of the message body
        #[arg(long, default_value = iot_device_client::message::DEFAULT_CONTENT_TYPE)]
        content_type: String,
    },

    /// Read the next cloud-to-device message
    Receive {
        /// Settle the message after reading it: none, complete, reject or abandon
        #[arg(short, long, default_value = "none")]
        settle: SettleMode,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Complete a message, removing it from the queue
    Complete {
        /// Message id (the ETag returned by receive)
        message_id: String,
    },

    /// Reject a message, dead-lettering it
    Reject {
        /// Message id (the ETag returned by receive)
        message_id: String,
    },

    /// Abandon a message, making it available again
    Abandon {
        /// Message id (the ETag returned by receive)
        message_id: String,
    },

    /// Device identity registry commands
    Registry {
        /// Service connection string with registry access
        #[arg(long, env = "IOT_HUB_SERVICE_CONNECTION_STRING", hide_env_values = true)]
        service_connection_string: Option<String>,

        #[command(subcommand)]
        action: RegistryCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Registry subcommands
#[derive(Subcommand, Debug)]
pub enum RegistryCommands {
    /// Register a device, printing its primary key
    Add { device_id: String },

    /// Remove a device
    Remove { device_id: String },

    /// Show one device identity as JSON
    Show { device_id: String },

    /// List registered devices
    List {
        /// Maximum number of devices to return
        #[arg(short, long, default_value = "100")]
        max: u32,
    },
}

/// What to do with a message after `receive`; `None` leaves it locked
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettleMode(Option<Settlement>);

impl SettleMode {
    pub fn settlement(self) -> Option<Settlement> {
        self.0
    }
}

impl FromStr for SettleMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self(None));
        }
        s.parse::<Settlement>().map(|settlement| Self(Some(settlement)))
    }
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] DeviceClientError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Client(_) => 2,
            Self::InvalidArgument { .. } => 3,
            Self::Io(_) => 4,
            Self::Serialization(_) => 5,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    execute(cli, &mut std::io::stdout()).await
}

/// Execute a parsed command line, writing command output to `out`.
pub async fn execute<W: Write>(cli: Cli, out: &mut W) -> Result<(), CliError> {
    let Cli {
        config: config_path,
        device,
        command,
        ..
    } = cli;

    match command {
        Commands::Completions { shell } => execute_completions_command(shell, out),
        Commands::Token => {
            let config = load_configuration(config_path, &device)?;
            let credentials = config.device.credentials()?;
            execute_token_command(&credentials, config.device.token_ttl_seconds, out)
        }
        Commands::Send {
            payload,
            file,
            sensor_id,
            temperature,
            humidity,
            content_type,
        } => {
            let config = load_configuration(config_path, &device)?;
            let reading = TelemetryReading::new(sensor_id, temperature, humidity);
            let body = resolve_payload(payload, file, &reading)?;
            let message = OutboundMessage::new(body).with_content_type(content_type);
            execute_send_command(&device_client(&config)?, &message, out).await
        }
        Commands::Receive { settle, format } => {
            let config = load_configuration(config_path, &device)?;
            execute_receive_command(&device_client(&config)?, settle.settlement(), format, out)
                .await
        }
        Commands::Complete { message_id } => {
            let config = load_configuration(config_path, &device)?;
            let id = parse_message_id(message_id)?;
            execute_settle_command(&device_client(&config)?, &id, Settlement::Complete, out).await
        }
        Commands::Reject { message_id } => {
            let config = load_configuration(config_path, &device)?;
            let id = parse_message_id(message_id)?;
            execute_settle_command(&device_client(&config)?, &id, Settlement::Reject, out).await
        }
        Commands::Abandon { message_id } => {
            let config = load_configuration(config_path, &device)?;
            let id = parse_message_id(message_id)?;
            execute_settle_command(&device_client(&config)?, &id, Settlement::Abandon, out).await
        }
        Commands::Registry {
            service_connection_string,
            action,
        } => {
            let mut config = load_configuration(config_path, &device)?;
            if let Some(connection_string) = service_connection_string {
                config.registry.connection_string = Some(connection_string);
            }
            execute_registry_command(&registry_client(&config)?, action, out).await
        }
    }
}

/// Initialize logging based on CLI arguments. Logs go to stderr so that
/// command output on stdout stays machine-readable.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level).map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_configuration(path: Option<PathBuf>, device: &DeviceArgs) -> Result<CliConfig, ConfigError> {
    let mut config = ConfigLoader::new().with_file(path).load()?;
    config.device.apply_args(device);
    Ok(config)
}

fn http_transport(config: &CliConfig) -> Result<ReqwestTransport, CliError> {
    let transport = match config.http.timeout_seconds {
        Some(seconds) => ReqwestTransport::with_timeout(Duration::from_secs(seconds))?,
        None => ReqwestTransport::new()?,
    };
    Ok(transport)
}

/// Device queue client with a freshly issued token
fn device_client(config: &CliConfig) -> Result<QueueClient<ReqwestTransport>, CliError> {
    let client = QueueClient::new(config.device.credentials()?, http_transport(config)?);
    client.refresh_token(config.device.token_ttl_seconds);
    Ok(client)
}

/// Registry client with a freshly issued policy token
fn registry_client(config: &CliConfig) -> Result<RegistryClient<ReqwestTransport>, CliError> {
    let client = RegistryClient::new(config.registry.credentials()?, http_transport(config)?);
    client.refresh_token(config.registry.token_ttl_seconds);
    Ok(client)
}

fn parse_message_id(message_id: String) -> Result<MessageId, CliError> {
    if message_id.trim().is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "message_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(MessageId::from_etag(&message_id))
}

/// Body for `send`: literal payload, file contents, or the telemetry reading.
pub fn resolve_payload(
    payload: Option<String>,
    file: Option<PathBuf>,
    reading: &TelemetryReading,
) -> Result<Bytes, CliError> {
    match (payload, file) {
        (Some(payload), _) => Ok(Bytes::from(payload)),
        (None, Some(path)) => Ok(Bytes::from(std::fs::read(path)?)),
        (None, None) => Ok(Bytes::from(reading.to_json()?)),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute token command
pub fn execute_token_command<W: Write>(
    credentials: &DeviceCredentials,
    ttl_seconds: i64,
    out: &mut W,
) -> Result<(), CliError> {
    let signer = SasSigner::new(credentials.shared_key().clone());
    let token = signer.issue(&credentials.resource_uri(), ttl_seconds);

    info!(
        device = %credentials.device_name(),
        expiry = token.expiry(),
        "Issued device token"
    );
    writeln!(out, "{}", token)?;
    Ok(())
}

/// Execute send command; prints the returned status code
pub async fn execute_send_command<T: HttpTransport, W: Write>(
    client: &QueueClient<T>,
    message: &OutboundMessage,
    out: &mut W,
) -> Result<(), CliError> {
    let status = client.publish(message).await?;
    if !(200..300).contains(&status) {
        warn!(status = status, "Hub did not accept the message");
    }
    writeln!(out, "{}", status)?;
    Ok(())
}

/// Execute receive command
pub async fn execute_receive_command<T: HttpTransport, W: Write>(
    client: &QueueClient<T>,
    settle: Option<Settlement>,
    format: OutputFormat,
    out: &mut W,
) -> Result<(), CliError> {
    let message = client.read().await?;

    let settled = match (&message.message_id, settle) {
        (Some(id), Some(settlement)) => Some((settlement, client.settle(id, settlement).await?)),
        _ => None,
    };

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "status": message.status_code,
                "messageId": message.message_id.as_ref().map(MessageId::as_str),
                "headers": message.headers,
                "body": message.text(),
                "settlement": settled.map(|(settlement, status)| serde_json::json!({
                    "action": settlement.as_str(),
                    "status": status,
                })),
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
        OutputFormat::Text => {
            writeln!(out, "status: {}", message.status_code)?;
            match &message.message_id {
                Some(id) => {
                    writeln!(out, "message-id: {}", id)?;
                    writeln!(out, "{}", message.text())?;
                }
                None => writeln!(out, "no message queued")?,
            }
            if let Some((settlement, status)) = settled {
                writeln!(out, "{}: {}", settlement, status)?;
            }
        }
    }

    Ok(())
}

/// Execute complete, reject or abandon; prints the returned status code
pub async fn execute_settle_command<T: HttpTransport, W: Write>(
    client: &QueueClient<T>,
    message_id: &MessageId,
    settlement: Settlement,
    out: &mut W,
) -> Result<(), CliError> {
    let status = client.settle(message_id, settlement).await?;
    if !(200..300).contains(&status) {
        warn!(
            message_id = %message_id,
            settlement = %settlement,
            status = status,
            "Settlement was not accepted"
        );
    }
    writeln!(out, "{}", status)?;
    Ok(())
}

/// Execute registry subcommands
pub async fn execute_registry_command<T: HttpTransport, W: Write>(
    client: &RegistryClient<T>,
    action: RegistryCommands,
    out: &mut W,
) -> Result<(), CliError> {
    match action {
        RegistryCommands::Add { device_id } => {
            let outcome = client.add_device(&device_id).await?;
            let state = match &outcome {
                AddDeviceOutcome::Created(_) => "created",
                AddDeviceOutcome::AlreadyExists(_) => "exists",
            };
            let identity = outcome.identity();
            writeln!(out, "{}: {}", state, identity.device_id)?;
            if let Some(key) = identity.primary_key() {
                writeln!(out, "primary key: {}", key)?;
            }
        }
        RegistryCommands::Remove { device_id } => {
            let outcome = client.remove_device(&device_id).await?;
            let state = match outcome {
                RemoveDeviceOutcome::Removed => "removed",
                RemoveDeviceOutcome::NotFound => "not found",
            };
            writeln!(out, "{}: {}", state, device_id)?;
        }
        RegistryCommands::Show { device_id } => match client.get_device(&device_id).await? {
            Some(identity) => writeln!(out, "{}", serde_json::to_string_pretty(&identity)?)?,
            None => {
                return Err(CliError::InvalidArgument {
                    arg: "device_id".to_string(),
                    message: format!("device '{}' is not registered", device_id),
                })
            }
        },
        RegistryCommands::List { max } => {
            for identity in client.list_devices(max).await? {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    identity.device_id,
                    identity
                        .status
                        .map(|status| status.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    identity.connection_state.as_deref().unwrap_or("-"),
                )?;
            }
        }
    }
    Ok(())
}

/// Execute completions command
pub fn execute_completions_command<W: Write>(
    shell: clap_complete::Shell,
    out: &mut W,
) -> Result<(), CliError> {
    clap_complete::generate(shell, &mut Cli::command(), "iot-device", out);
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
