//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{
    DEFAULT_DIRECTORY, DEFAULT_EXEMPT_CONTROLLERS, DEFAULT_MEMORY_CAPACITY, DEFAULT_TTL_SECONDS,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "fpcache";
const ENV_PREFIX: &str = "FPCACHE";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_PORT: u16 = 3101;
const DEFAULT_SETTINGS_FILE: &str = "var/fpcache-settings.toml";

/// Command-line arguments for the fpcache binary.
#[derive(Debug, Parser)]
#[command(name = "fpcache", version, about = "Full-page cache administration")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FPCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub cache: CacheOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the administrative HTTP listener.
    Serve(Box<ServeArgs>),
    /// Remove every stored page from the active backend.
    Clear,
    /// Persist and activate a different storage backend.
    #[command(name = "set-backend")]
    SetBackend(SetBackendArgs),
    /// List supported backends and show the active one.
    Backends,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct SetBackendArgs {
    /// Backend name (`files` or `memory`).
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the root directory of the files backend.
    #[arg(long = "cache-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub directory: Option<PathBuf>,

    /// Override the persisted settings file holding the backend selection.
    #[arg(long = "settings-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub settings_file: Option<PathBuf>,

    /// Toggle debug mode, which disables serving and capturing.
    #[arg(
        long = "cache-debug-mode",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub debug_mode: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

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
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub admin_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub ttl: Duration,
    pub memory_capacity: NonZeroUsize,
    pub debug_mode: bool,
    pub exempt_controllers: Vec<String>,
    pub settings_file: PathBuf,
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

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.exempt_controllers")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_cache_overrides(&cli.cache);
    if let Some(Command::Serve(args)) = cli.command.as_ref() {
        raw.apply_serve_overrides(&args.overrides);
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(directory) = overrides.directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(path) = overrides.settings_file.as_ref() {
            self.cache.settings_file = Some(path.clone());
        }
        if let Some(debug_mode) = overrides.debug_mode {
            self.cache.debug_mode = Some(debug_mode);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            server,
            logging,
            cache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    Ok(ServerSettings { admin_addr })
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
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let capacity = cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY as u64);
    let memory_capacity = usize::try_from(capacity)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.memory_capacity",
                "must be greater than zero and fit in usize",
            )
        })?;

    let exempt_controllers = match cache.exempt_controllers {
        Some(names) => names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
        None => DEFAULT_EXEMPT_CONTROLLERS
            .iter()
            .map(|name| name.to_string())
            .collect(),
    };

    let settings_file = cache
        .settings_file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    if settings_file.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.settings_file",
            "path must not be empty",
        ));
    }

    Ok(CacheSettings {
        directory,
        ttl: Duration::from_secs(ttl_seconds),
        memory_capacity,
        debug_mode: cache.debug_mode.unwrap_or(false),
        exempt_controllers,
        settings_file,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    admin_host: Option<String>,
    admin_port: Option<u16>,
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
    directory: Option<PathBuf>,
    ttl_seconds: Option<u64>,
    memory_capacity: Option<u64>,
    debug_mode: Option<bool>,
    exempt_controllers: Option<Vec<String>>,
    settings_file: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.admin_addr.port(), DEFAULT_ADMIN_PORT);
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert_eq!(settings.logging.format, LogFormat::Compact);
        assert_eq!(settings.cache.directory, PathBuf::from("var/fpcache"));
        assert_eq!(settings.cache.ttl, Duration::from_secs(999_999));
        assert_eq!(settings.cache.memory_capacity.get(), 10_000);
        assert!(!settings.cache.debug_mode);
        assert_eq!(
            settings.cache.exempt_controllers,
            vec!["OrderController".to_string(), "OrderOpcController".to_string()]
        );
        assert_eq!(
            settings.cache.settings_file,
            PathBuf::from("var/fpcache-settings.toml")
        );
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.admin_port = Some(4000);
        raw.logging.level = Some("info".to_string());
        raw.cache.debug_mode = Some(false);

        raw.apply_serve_overrides(&ServeOverrides {
            admin_port: Some(4321),
            log_level: Some("debug".to_string()),
            log_json: Some(true),
            ..Default::default()
        });
        raw.apply_cache_overrides(&CacheOverrides {
            debug_mode: Some(true),
            directory: Some(PathBuf::from("/tmp/pages")),
            ..Default::default()
        });
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.admin_addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert!(settings.cache.debug_mode);
        assert_eq!(settings.cache.directory, PathBuf::from("/tmp/pages"));
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.ttl_seconds = Some(0);
        let err = Settings::from_raw(raw).expect_err("zero ttl");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "cache.ttl_seconds",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.cache.memory_capacity = Some(0);
        let err = Settings::from_raw(raw).expect_err("zero capacity");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "cache.memory_capacity",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.server.admin_port = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut raw = RawSettings::default();
        raw.logging.level = Some("chatty".to_string());
        let err = Settings::from_raw(raw).expect_err("invalid level");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "logging.level",
                ..
            }
        ));
    }

    #[test]
    fn blank_exempt_controllers_are_dropped() {
        let mut raw = RawSettings::default();
        raw.cache.exempt_controllers = Some(vec![
            " CartController ".to_string(),
            String::new(),
        ]);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(
            settings.cache.exempt_controllers,
            vec!["CartController".to_string()]
        );
    }

    #[test]
    fn config_file_is_layered_under_cli() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        writeln!(
            file,
            "[cache]\nttl_seconds = 600\nmemory_capacity = 32\n\n[server]\nadmin_port = 3900"
        )
        .expect("write config");

        let cli = CliArgs::try_parse_from([
            "fpcache",
            "--config-file",
            file.path().to_str().expect("utf-8 path"),
            "--cache-debug-mode",
            "true",
            "serve",
            "--server-admin-port",
            "3999",
        ])
        .expect("valid cli");

        let settings = load(&cli).expect("valid settings");
        assert_eq!(settings.cache.ttl, Duration::from_secs(600));
        assert_eq!(settings.cache.memory_capacity.get(), 32);
        assert!(settings.cache.debug_mode);
        assert_eq!(settings.server.admin_addr.port(), 3999);
    }

    #[test]
    fn set_backend_command_parses_name() {
        let cli = CliArgs::try_parse_from(["fpcache", "set-backend", "memory"]).expect("valid cli");
        match cli.command {
            Some(Command::SetBackend(args)) => assert_eq!(args.name, "memory"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
