//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::CascadeMode;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "studycache";
const ENV_PREFIX: &str = "STUDYCACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_BULK_CONFIRMATION_THRESHOLD: usize = 10;
const DEFAULT_CONFIRMATION_TTL_SECS: u64 = 300;
const DEFAULT_MAX_PENDING_CONFIRMATIONS: usize = 64;
const DEFAULT_MONITOR_LIMIT: usize = 1000;
const DEFAULT_CLIENT_BASE_URL: &str = "http://127.0.0.1:3000/";
const DEFAULT_CLIENT_FRESHNESS_SECS: u64 = 30 * 60;
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the studycache binary.
#[derive(Debug, Parser)]
#[command(name = "studycache", version, about = "Study platform cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STUDYCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and administrative HTTP services.
    Serve(Box<ServeArgs>),
    /// Resolve and validate configuration, then print it.
    #[command(name = "check-config")]
    CheckConfig(ServeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Follow `related_keys` transitively when invalidating.
    #[arg(
        long = "cache-transitive-cascade",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_transitive_cascade: Option<bool>,

    /// Override the key count above which `invalidate` needs confirmation.
    #[arg(long = "cache-bulk-confirmation-threshold", value_name = "COUNT")]
    pub cache_bulk_confirmation_threshold: Option<usize>,

    /// Override the confirmation token lifetime.
    #[arg(long = "cache-confirmation-ttl-seconds", value_name = "SECONDS")]
    pub cache_confirmation_ttl_seconds: Option<u64>,

    /// Override the origin base URL used by the client.
    #[arg(long = "client-base-url", value_name = "URL")]
    pub client_base_url: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub client: ClientSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub cascade: CascadeMode,
    pub bulk_confirmation_threshold: usize,
    pub confirmation_ttl: Duration,
    pub max_pending_confirmations: NonZeroUsize,
    pub monitor_default_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: Url,
    /// Cached values younger than this are served without a request.
    pub freshness: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckConfig(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    client: RawClientSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(transitive) = overrides.cache_transitive_cascade {
            self.cache.cascade = Some(if transitive {
                CascadeMode::Transitive
            } else {
                CascadeMode::SingleHop
            });
        }
        if let Some(threshold) = overrides.cache_bulk_confirmation_threshold {
            self.cache.bulk_confirmation_threshold = Some(threshold);
        }
        if let Some(seconds) = overrides.cache_confirmation_ttl_seconds {
            self.cache.confirmation_ttl_seconds = Some(seconds);
        }
        if let Some(url) = overrides.client_base_url.as_ref() {
            self.client.base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            client,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let client = build_client_settings(client)?;

        Ok(Self {
            server,
            logging,
            cache,
            client,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;
    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin listener must not share the public address",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_secs = cache
        .confirmation_ttl_seconds
        .unwrap_or(DEFAULT_CONFIRMATION_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.confirmation_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        cascade: cache.cascade.unwrap_or_default(),
        bulk_confirmation_threshold: cache
            .bulk_confirmation_threshold
            .unwrap_or(DEFAULT_BULK_CONFIRMATION_THRESHOLD),
        confirmation_ttl: Duration::from_secs(ttl_secs),
        max_pending_confirmations: non_zero_usize(
            cache
                .max_pending_confirmations
                .unwrap_or(DEFAULT_MAX_PENDING_CONFIRMATIONS),
            "cache.max_pending_confirmations",
        )?,
        monitor_default_limit: non_zero_usize(
            cache.monitor_default_limit.unwrap_or(DEFAULT_MONITOR_LIMIT),
            "cache.monitor_default_limit",
        )?,
    })
}

fn build_client_settings(client: RawClientSettings) -> Result<ClientSettings, LoadError> {
    let raw_url = client
        .base_url
        .unwrap_or_else(|| DEFAULT_CLIENT_BASE_URL.to_string());
    let base_url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("client.base_url", format!("`{raw_url}`: {err}")))?;
    if base_url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "client.base_url",
            "must be an absolute http(s) URL",
        ));
    }

    let freshness_secs = client
        .freshness_seconds
        .unwrap_or(DEFAULT_CLIENT_FRESHNESS_SECS);
    let timeout_secs = client
        .request_timeout_seconds
        .unwrap_or(DEFAULT_CLIENT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "client.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ClientSettings {
        base_url,
        freshness: Duration::from_secs(freshness_secs),
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    cascade: Option<CascadeMode>,
    bulk_confirmation_threshold: Option<usize>,
    confirmation_ttl_seconds: Option<u64>,
    max_pending_confirmations: Option<usize>,
    monitor_default_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawClientSettings {
    base_url: Option<String>,
    freshness_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
