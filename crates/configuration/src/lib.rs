use crate::error::ConfigError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    BinanceConfig, Config, DatabaseConfig, EventsConfig, ExchangesConfig, LoggingConfig,
    PaperConfig, SandboxConfig,
};

/// Loads the runner configuration from `config.toml`.
///
/// The file is optional; every section falls back to its defaults. Values can
/// be overridden with `RUNNER__SECTION__KEY` environment variables, and
/// `DATABASE_URL` (typically from `.env`) replaces `database.url`.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Same as [`load_config`] but reads the given file.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(config::Environment::with_prefix("RUNNER").separator("__"))
        .build()?;

    let mut config = builder.try_deserialize::<Config>()?;

    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be greater than 0".to_string(),
        ));
    }
    if config.events.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "events.channel_capacity must be greater than 0".to_string(),
        ));
    }
    if config.sandbox.sleep_slice_ms == 0 {
        return Err(ConfigError::ValidationError(
            "sandbox.sleep_slice_ms must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Installs the global tracing subscriber.
///
/// Returns the guard of the non-blocking file writer when file logging is
/// enabled; it must be kept alive for the lifetime of the process.
pub fn init_logging(logging: &settings::LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| ConfigError::LoggingError(e.to_string()))?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));

    match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| ConfigError::LoggingError(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| ConfigError::LoggingError(e.to_string()))?;
            Ok(None)
        }
    }
}
