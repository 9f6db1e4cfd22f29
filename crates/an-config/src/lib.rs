//! # an-config
//!
//! Runtime settings. Sources, lowest precedence first: built-in defaults, an
//! optional `annotator.toml`, then `ANNOTATOR__SECTION__KEY` environment
//! variables (a `.env` file is loaded first when present).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "ANNOTATOR";
pub const DEFAULT_FILE: &str = "annotator";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
    /// Marks the collaborator cookie `Secure`
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    /// Keys session signing, nonces and email encryption
    pub server_secret: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteSettings {
    pub name: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollaborationSettings {
    pub allow_outside_collaborators: bool,
    pub session_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupSettings {
    pub auto_delete_enabled: bool,
    pub auto_delete_months: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub security: SecuritySettings,
    pub site: SiteSettings,
    pub collaboration: CollaborationSettings,
    pub cleanup: CleanupSettings,
    pub search: SearchSettings,
}

fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    builder
        .set_default("server.bind", "127.0.0.1:8080")?
        .set_default("server.cookie_secure", false)?
        .set_default("database.url", "sqlite:annotator.db")?
        .set_default("site.name", "Annotator")?
        .set_default("site.base_url", "http://localhost:8080/")?
        .set_default("collaboration.allow_outside_collaborators", true)?
        .set_default("collaboration.session_days", 7)?
        .set_default("cleanup.auto_delete_enabled", true)?
        .set_default("cleanup.auto_delete_months", 12)?
        .set_default("search.max_results", 10)
}

impl Settings {
    /// Loads `.env`, `annotator.toml` (if any) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(ConfigError::Invalid(format!(".env: {err}"))),
        }
        let builder = with_defaults(Config::builder())?
            .add_source(File::with_name(DEFAULT_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        Self::finish(builder.build()?)
    }

    /// Defaults overlaid with a TOML document. No file or environment lookup.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let builder = with_defaults(Config::builder())?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder.build()?)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        if settings.security.server_secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("security.server_secret must not be empty".into()));
        }
        if settings.search.max_results == 0 {
            return Err(ConfigError::Invalid("search.max_results must be positive".into()));
        }
        Ok(settings)
    }

    pub fn session_days(&self) -> i64 {
        self.collaboration.session_days.max(1)
    }

    pub fn auto_delete_months(&self) -> u32 {
        self.cleanup.auto_delete_months.clamp(1, 60)
    }
}
