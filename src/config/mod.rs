//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;
use crate::domain::types::EntityType;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "bizdash";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BROADCAST_CHANNEL: &str = "bizdash_cache_invalidation";
const DEFAULT_CHANGE_CHANNEL: &str = "bizdash_table_changes";
const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;
const MAX_CHANNEL_NAME_LEN: usize = 63;
pub(crate) const DEFAULT_ORDERS_PAGE_SIZE: u32 = 25;
pub(crate) const DEFAULT_TOP_CLIENTS_LIMIT: u32 = 10;

/// Command-line arguments for the bizdash binary.
#[derive(Debug, Parser)]
#[command(name = "bizdash", version, about = "Business dashboard statistics cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BIZDASH_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Listen for invalidations from peers and the database until Ctrl-C.
    Listen(ListenArgs),
    /// Print dashboard statistics as JSON.
    Stats(StatsArgs),
    /// Print one page of the orders list as JSON.
    Orders(OrdersArgs),
    /// Print the top clients by revenue as JSON.
    #[command(name = "top-clients")]
    TopClients(TopClientsArgs),
    /// Invalidate cached queries depending on an entity type and notify peers.
    Invalidate(InvalidateArgs),
    /// Remove expired entries from both cache tiers.
    Purge,
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the directory backing the persistent cache tier.
    #[arg(long = "cache-dir", value_name = "PATH", global = true)]
    pub cache_storage_dir: Option<PathBuf>,

    /// Disable the persistent cache tier for this run.
    #[arg(long = "memory-only", action = clap::ArgAction::SetTrue, global = true)]
    pub memory_only: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ListenArgs {
    /// Do not subscribe to database table change notifications.
    #[arg(long = "no-table-changes", action = clap::ArgAction::SetTrue)]
    pub no_table_changes: bool,
}

#[derive(Debug, Args, Clone)]
pub struct StatsArgs {
    #[arg(long)]
    pub year: i32,

    /// Month number (1-12) or `all`.
    #[arg(long, default_value = "all")]
    pub month: String,
}

#[derive(Debug, Args, Clone)]
pub struct OrdersArgs {
    #[arg(long)]
    pub year: i32,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long = "page-size", default_value_t = DEFAULT_ORDERS_PAGE_SIZE)]
    pub page_size: u32,
}

#[derive(Debug, Args, Clone)]
pub struct TopClientsArgs {
    #[arg(long)]
    pub year: i32,

    #[arg(long, default_value_t = DEFAULT_TOP_CLIENTS_LIMIT)]
    pub limit: u32,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    /// Entity type: order, invoice, client or all.
    #[arg(value_name = "ENTITY", value_parser = parse_entity_type)]
    pub entity: EntityType,

    /// Identifier of the changed record.
    #[arg(long)]
    pub id: Option<String>,
}

fn parse_entity_type(value: &str) -> Result<EntityType, String> {
    EntityType::from_str(value).map_err(|err| err.to_string())
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheConfig,
    pub notify: NotifySettings,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    /// Channel carrying session-to-session invalidations.
    pub broadcast_channel: String,
    /// Channel the table change triggers notify on.
    pub change_channel: String,
    pub listen_table_changes: bool,
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

    builder = builder.add_source(Environment::with_prefix("BIZDASH").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);
    if let Some(Command::Listen(args)) = cli.command.as_ref()
        && args.no_table_changes
    {
        raw.notify.listen_table_changes = Some(false);
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    notify: RawNotifySettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(dir) = overrides.cache_storage_dir.as_ref() {
            self.cache.storage_dir = Some(dir.clone());
        }
        if overrides.memory_only {
            self.cache.enable_persistent_tier = Some(false);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            notify,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let notify = build_notify_settings(notify)?;

        Ok(Self {
            logging,
            database,
            cache,
            notify,
        })
    }
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS.into()),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();

    let memory_ttl_seconds = ttl_seconds(
        cache.memory_ttl_seconds.unwrap_or(defaults.memory_ttl_seconds),
        "cache.memory_ttl_seconds",
    )?;
    let persistent_ttl_seconds = ttl_seconds(
        cache
            .persistent_ttl_seconds
            .unwrap_or(defaults.persistent_ttl_seconds),
        "cache.persistent_ttl_seconds",
    )?;
    let memory_capacity = positive_usize(
        cache.memory_capacity.unwrap_or(defaults.memory_capacity),
        "cache.memory_capacity",
    )?;
    let bus_capacity = positive_usize(
        cache.bus_capacity.unwrap_or(defaults.bus_capacity),
        "cache.bus_capacity",
    )?;
    let consume_batch_limit = positive_usize(
        cache
            .consume_batch_limit
            .unwrap_or(defaults.consume_batch_limit),
        "cache.consume_batch_limit",
    )?;

    let storage_dir = cache.storage_dir.unwrap_or(defaults.storage_dir);
    if storage_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.storage_dir",
            "path must not be empty",
        ));
    }

    let namespace = cache.namespace.unwrap_or(defaults.namespace);
    if namespace.trim().is_empty() {
        return Err(LoadError::invalid("cache.namespace", "must not be empty"));
    }

    Ok(CacheConfig {
        enable_memory_tier: cache
            .enable_memory_tier
            .unwrap_or(defaults.enable_memory_tier),
        enable_persistent_tier: cache
            .enable_persistent_tier
            .unwrap_or(defaults.enable_persistent_tier),
        memory_ttl_seconds,
        persistent_ttl_seconds,
        memory_capacity,
        storage_dir,
        namespace,
        bus_capacity,
        consume_batch_limit,
    })
}

fn build_notify_settings(notify: RawNotifySettings) -> Result<NotifySettings, LoadError> {
    let broadcast_channel = channel_name(
        notify
            .broadcast_channel
            .unwrap_or_else(|| DEFAULT_BROADCAST_CHANNEL.to_string()),
        "notify.broadcast_channel",
    )?;
    let change_channel = channel_name(
        notify
            .change_channel
            .unwrap_or_else(|| DEFAULT_CHANGE_CHANNEL.to_string()),
        "notify.change_channel",
    )?;
    if broadcast_channel == change_channel {
        return Err(LoadError::invalid(
            "notify.change_channel",
            "must differ from notify.broadcast_channel",
        ));
    }

    Ok(NotifySettings {
        broadcast_channel,
        change_channel,
        listen_table_changes: notify.listen_table_changes.unwrap_or(true),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_memory_tier: Option<bool>,
    enable_persistent_tier: Option<bool>,
    memory_ttl_seconds: Option<u64>,
    persistent_ttl_seconds: Option<u64>,
    memory_capacity: Option<usize>,
    storage_dir: Option<PathBuf>,
    namespace: Option<String>,
    bus_capacity: Option<usize>,
    consume_batch_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotifySettings {
    broadcast_channel: Option<String>,
    change_channel: Option<String>,
    listen_table_changes: Option<bool>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn ttl_seconds(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    if value > MAX_TTL_SECONDS {
        return Err(LoadError::invalid(
            key,
            format!("must be at most {MAX_TTL_SECONDS} seconds (one year)"),
        ));
    }
    Ok(value)
}

fn positive_usize(value: usize, key: &'static str) -> Result<usize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

/// Channel names are used as unquoted Postgres identifiers.
fn channel_name(value: String, key: &'static str) -> Result<String, LoadError> {
    let name = value.trim();
    if name.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(LoadError::invalid(
            key,
            format!("must be at most {MAX_CHANNEL_NAME_LEN} bytes"),
        ));
    }
    let valid = name
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(LoadError::invalid(
            key,
            "use lowercase letters, digits and underscores, not starting with a digit",
        ));
    }
    Ok(name.to_string())
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
