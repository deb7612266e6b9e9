//! # Earhart CLI
//!
//! Operator command-line interface for the Earhart webhook pipeline.
//!
//! This module provides CLI commands for:
//! - Verifying captured deliveries
//! - Signing bodies for local testing
//! - Running a delivery through the full pipeline
//! - Inspecting the resolved policy and the supported event types

use async_trait::async_trait;
use clap::{CommandFactory, Parser, Subcommand};
use earhart_core::webhook::{
    EventBus, EventKind, EventListener, EventNotification, FetchError, Freshness, OrgFetcher,
    OrgSnapshot, PolicyError, ProcessingResult, ResultSummary, SignatureVerifier, UserFetcher,
    UserSnapshot, VerificationError, VerifiedPayload, WebhookEnvelope, WebhookHeaders,
    WebhookPipeline, WebhookPolicy, MESSAGE_ID_HEADERS, SIGNATURE_HEADERS, TIMESTAMP_HEADERS,
};
use earhart_core::{CacheStore, InMemoryCacheStore, Timestamp, Ulid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable prefix for configuration overrides
///
/// `EARHART__POLICY__VERIFY_SIGNATURES=false` sets `policy.verify_signatures`.
pub const ENV_PREFIX: &str = "EARHART";

// ============================================================================
// CLI Structure
// ============================================================================

/// Earhart CLI - Verified intake for identity-provider webhooks
#[derive(Parser)]
#[command(name = "earhart")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verified, typed intake for identity-provider webhooks")]
#[command(
    long_about = "Earhart verifies signed identity-provider webhooks, parses them into typed events, \
                  enriches them with fresh snapshots and invalidates stale cache entries"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "EARHART_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging filter, e.g. `info` or `earhart_core=debug`
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check a captured delivery's signature and timestamp
    Verify {
        #[command(flatten)]
        delivery: DeliveryArgs,

        /// Signing secret, overriding the configured one
        #[arg(long, env = "EARHART_SIGNING_SECRET", hide_env_values = true)]
        secret: Option<String>,

        /// Unix time to check the timestamp against (defaults to now)
        #[arg(long)]
        now: Option<i64>,
    },

    /// Produce signature headers for a body
    Sign {
        /// File holding the body to sign, or `-` for stdin
        #[arg(short, long)]
        body: PathBuf,

        /// Message id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Unix timestamp (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,

        /// Signing secret, overriding the configured one
        #[arg(long, env = "EARHART_SIGNING_SECRET", hide_env_values = true)]
        secret: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a delivery through the full pipeline against an in-memory cache
    Process {
        #[command(flatten)]
        delivery: DeliveryArgs,

        /// JSON file with `users`, `organisations` and `cache` fixtures
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Signing secret, overriding the configured one
        #[arg(long, env = "EARHART_SIGNING_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Show the resolved webhook policy
    Policy {
        /// Output format
        #[arg(short, long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// List supported event types
    Events {
        /// Also list provider events that are acknowledged but not modelled
        #[arg(short, long)]
        all: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// A captured delivery given on the command line
#[derive(Debug, Clone, clap::Args)]
pub struct DeliveryArgs {
    /// File holding the raw request body, or `-` for stdin
    #[arg(short, long)]
    pub body: PathBuf,

    /// Request header as `name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

impl DeliveryArgs {
    fn into_envelope(self) -> Result<WebhookEnvelope, CliError> {
        let body = read_body(&self.body)?;
        let headers: WebhookHeaders = self.headers.into_iter().collect();
        Ok(WebhookEnvelope::new(headers, body))
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

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

/// Parse a `name: value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `name: value`, got '{}'", raw))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{}'", raw));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Delivery rejected with status {status}: {message}")]
    DeliveryRejected { status: u16, message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {message}")]
    Output { message: String },
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    InvalidFormat(#[from] config::ConfigError),

    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
///
/// Every field has a default, so an absent configuration resolves to the
/// default policy with warn-level logging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Webhook pipeline policy
    pub policy: WebhookPolicy,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Directory holding the per-user default configuration file
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("earhart"))
}

/// Load configuration from the layered sources
///
/// Sources (later sources override earlier ones):
///  1. `<config dir>/earhart/config.{yaml,json,toml}` if present
///  2. The explicit file, when given
///  3. Environment variables prefixed `EARHART__` (double-underscore separator)
pub fn load_configuration(explicit: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(dir) = default_config_dir() {
        let base = dir.join("config");
        builder =
            builder.add_source(config::File::with_name(&base.to_string_lossy()).required(false));
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        debug!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }

    let config: CliConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.policy.validate()?;
    Ok(config)
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    run(Cli::parse()).await
}

/// Execute an already parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    // Completions must work even with a broken configuration
    if let Commands::Completions { shell } = cli.command {
        return execute_completions_command(shell);
    }

    let config = load_configuration(cli.config.as_deref())?;
    initialize_logging(&cli, &config.logging);

    match cli.command {
        Commands::Verify {
            delivery,
            secret,
            now,
        } => execute_verify_command(delivery, secret, now, &config),
        Commands::Sign {
            body,
            id,
            timestamp,
            secret,
            format,
        } => execute_sign_command(&body, id, timestamp, secret, format, &config),
        Commands::Process {
            delivery,
            snapshots,
            secret,
        } => execute_process_command(delivery, snapshots, secret, &config).await,
        Commands::Policy { format } => {
            println!("{}", render_policy(&config.policy, format)?);
            Ok(())
        }
        Commands::Events { all } => {
            println!("{}", render_events(all));
            Ok(())
        }
        Commands::Completions { shell } => execute_completions_command(shell),
    }
}

/// Install the tracing subscriber
///
/// Precedence: `--log-level`, then `RUST_LOG`, then the configured level.
/// Logs go to stderr so command output stays machine-readable.
fn initialize_logging(cli: &Cli, logging: &LoggingConfig) {
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Already installed when embedded in another binary or test
    let _ = if cli.json_logs || logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_verify_command(
    delivery: DeliveryArgs,
    secret: Option<String>,
    now: Option<i64>,
    config: &CliConfig,
) -> Result<(), CliError> {
    let policy = resolve_policy(config, secret)?;
    let verifier = verifier_for(&policy)?;
    let envelope = delivery.into_envelope()?;

    let payload = verifier.verify(&envelope.body, &envelope.headers)?;
    let now = now.unwrap_or_else(|| envelope.received_at.unix_seconds());
    verifier.check_timestamp(
        envelope.timestamp().unwrap_or_default(),
        now,
        policy.timestamp_tolerance_seconds(),
    )?;

    info!(
        message_id = %envelope.message_id().unwrap_or("-"),
        "Delivery verified"
    );
    println!("{}", render_verified(&envelope, &payload));
    Ok(())
}

fn execute_sign_command(
    body: &Path,
    id: Option<String>,
    timestamp: Option<i64>,
    secret: Option<String>,
    format: OutputFormat,
    config: &CliConfig,
) -> Result<(), CliError> {
    let policy = resolve_policy(config, secret)?;
    let verifier = verifier_for(&policy)?;
    let body = read_body(body)?;

    let id = id.unwrap_or_else(|| format!("msg_{}", Ulid::new()));
    let timestamp = timestamp.unwrap_or_else(|| Timestamp::now().unix_seconds());
    let signature = verifier.sign(&id, timestamp, &body);

    let headers = [
        (MESSAGE_ID_HEADERS[0], id),
        (TIMESTAMP_HEADERS[0], timestamp.to_string()),
        (SIGNATURE_HEADERS[0], signature),
    ];
    println!("{}", render_headers(&headers, format)?);
    Ok(())
}

async fn execute_process_command(
    delivery: DeliveryArgs,
    snapshots: Option<PathBuf>,
    secret: Option<String>,
    config: &CliConfig,
) -> Result<(), CliError> {
    let mut policy = resolve_policy(config, secret)?;

    let fixtures = match snapshots {
        Some(path) => SnapshotFixtures::load(&path)?,
        None => {
            if policy.enrich_events() {
                info!("No snapshot fixtures given, enrichment disabled");
                policy = policy
                    .to_builder()
                    .enrich_events(false)
                    .build()
                    .map_err(ConfigError::from)?;
            }
            SnapshotFixtures::default()
        }
    };

    let cache = Arc::new(InMemoryCacheStore::new());
    for (key, value) in &fixtures.cache {
        cache
            .put(key, value.clone(), None)
            .await
            .map_err(|e| CliError::InvalidArgument {
                arg: "--snapshots".to_string(),
                message: e.to_string(),
            })?;
    }

    let mut bus = EventBus::new();
    bus.subscribe(Arc::new(LoggingListener));

    let fixtures = Arc::new(fixtures);
    let pipeline = WebhookPipeline::builder(policy)
        .user_fetcher(fixtures.clone())
        .org_fetcher(fixtures)
        .dispatcher(Arc::new(bus))
        .cache_store(cache.clone())
        .build()
        .map_err(ConfigError::from)?;

    let result = pipeline.process(delivery.into_envelope()?).await;
    println!("{}", render_report(&result, cache.keys())?);

    if result.should_acknowledge() {
        Ok(())
    } else {
        Err(CliError::DeliveryRejected {
            status: result.acknowledgement_status(),
            message: result.error().unwrap_or("unknown error").to_string(),
        })
    }
}

fn execute_completions_command(shell: clap_complete::Shell) -> Result<(), CliError> {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "earhart", &mut std::io::stdout());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Configured policy with an optional command-line secret override
fn resolve_policy(config: &CliConfig, secret: Option<String>) -> Result<WebhookPolicy, CliError> {
    match secret {
        Some(secret) => Ok(config
            .policy
            .to_builder()
            .signing_secret(secret)
            .build()
            .map_err(ConfigError::from)?),
        None => Ok(config.policy.clone()),
    }
}

fn verifier_for(policy: &WebhookPolicy) -> Result<SignatureVerifier, CliError> {
    let secret = policy
        .signing_secret()
        .ok_or(ConfigError::Policy(PolicyError::MissingSigningSecret))?;

    SignatureVerifier::new(secret.clone())
        .map_err(|e| CliError::Configuration(ConfigError::Policy(e.into())))
}

fn read_body(path: &Path) -> Result<Vec<u8>, CliError> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        std::io::stdin().read_to_end(&mut body)?;
        return Ok(body);
    }

    std::fs::read(path).map_err(|e| CliError::InvalidArgument {
        arg: "--body".to_string(),
        message: format!("{}: {}", path.display(), e),
    })
}

fn output_error(e: impl std::fmt::Display) -> CliError {
    CliError::Output {
        message: e.to_string(),
    }
}

/// Render the policy summary with the secret masked
pub fn render_policy(policy: &WebhookPolicy, format: ConfigFormat) -> Result<String, CliError> {
    let summary = policy.summary();
    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&summary).map_err(output_error),
        ConfigFormat::Json => serde_json::to_string_pretty(&summary).map_err(output_error),
        ConfigFormat::Toml => toml::to_string(&summary).map_err(output_error),
    }
}

/// One event type per line, modelled kinds first
pub fn render_events(all: bool) -> String {
    let mut lines: Vec<String> = EventKind::ALL
        .iter()
        .map(|kind| kind.as_str().to_string())
        .collect();

    if all {
        lines.extend(
            EventKind::KNOWN_UNMODELED
                .iter()
                .map(|event_type| format!("{} (acknowledged, not modelled)", event_type)),
        );
    }

    lines.join("\n")
}

/// Render signature headers as `name: value` lines or a JSON object
pub fn render_headers(headers: &[(&str, String)], format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let map: BTreeMap<&str, &str> = headers
                .iter()
                .map(|(name, value)| (*name, value.as_str()))
                .collect();
            serde_json::to_string_pretty(&map).map_err(output_error)
        }
    }
}

fn render_verified(envelope: &WebhookEnvelope, payload: &VerifiedPayload) -> String {
    format!(
        "verified message_id={} event_type={}",
        envelope.message_id().unwrap_or("-"),
        payload.event_type().as_deref().unwrap_or("-")
    )
}

/// Outcome of `earhart process`
#[derive(Debug, Serialize)]
pub struct ProcessReport {
    pub acknowledgement_status: u16,
    pub delivery_id: Option<String>,
    pub run_id: String,
    #[serde(flatten)]
    pub summary: ResultSummary,
    /// Keys still cached after the run
    pub remaining_cache_keys: Vec<String>,
}

fn render_report(result: &ProcessingResult, remaining: Vec<String>) -> Result<String, CliError> {
    let report = ProcessReport {
        acknowledgement_status: result.acknowledgement_status(),
        delivery_id: result.delivery_id().map(str::to_string),
        run_id: result.run_id().as_str(),
        summary: result.summary(),
        remaining_cache_keys: remaining,
    };
    serde_json::to_string_pretty(&report).map_err(output_error)
}

// ============================================================================
// Fixtures
// ============================================================================

/// Snapshots and cache contents used by `earhart process`
///
/// ```json
/// {
///   "users": { "u1": { "user_id": "u1", ... } },
///   "organisations": { "o1": { "orgId": "o1", "name": "Acme" } },
///   "cache": { "user.u1": { "email": "a@b.c" } }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotFixtures {
    pub users: HashMap<String, UserSnapshot>,
    pub organisations: HashMap<String, OrgSnapshot>,
    pub cache: BTreeMap<String, Value>,
}

impl SnapshotFixtures {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let contents = std::fs::read_to_string(path).map_err(|e| CliError::InvalidArgument {
            arg: "--snapshots".to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;

        serde_json::from_str(&contents).map_err(|e| CliError::InvalidArgument {
            arg: "--snapshots".to_string(),
            message: format!("invalid fixtures: {}", e),
        })
    }
}

#[async_trait]
impl UserFetcher for SnapshotFixtures {
    async fn fetch_user(
        &self,
        user_id: &str,
        _freshness: Freshness,
    ) -> Result<UserSnapshot, FetchError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| FetchError::user_not_found(user_id))
    }
}

#[async_trait]
impl OrgFetcher for SnapshotFixtures {
    async fn fetch_org(&self, org_id: &str, _freshness: Freshness) -> Result<OrgSnapshot, FetchError> {
        self.organisations
            .get(org_id)
            .cloned()
            .ok_or_else(|| FetchError::org_not_found(org_id))
    }
}

/// Listener that logs every dispatched event
struct LoggingListener;

#[async_trait]
impl EventListener for LoggingListener {
    async fn handle_event(
        &self,
        notification: &EventNotification,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        info!(
            event_type = %notification.event.event_type(),
            user_id = ?notification.event.subject_user_id(),
            org_id = ?notification.event.subject_org_id(),
            enriched = notification.is_enriched(),
            "Event dispatched"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
