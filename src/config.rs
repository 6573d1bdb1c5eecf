//! Configuration manager for accounts.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_WEBHOOK_USERNAME: &str = "Jexactyl";
pub const DEFAULT_WEBHOOK_AVATAR: &str =
    "https://avatars.githubusercontent.com/u/91636558";

/// Reason a configuration file was not used.
#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error("`config.yaml` file cannot be opened: {0}")]
    Open(std::io::Error),
    #[error("`config.yaml` file is invalid: {0}")]
    Parse(serde_yaml::Error),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Panel name, used when `settings::app:name` is not set.
    pub name: String,
    /// Public URL of the panel.
    pub url: String,
    #[serde(default)]
    pub(crate) version: String,
    #[serde(skip)]
    pub(crate) path: PathBuf,
    /// Static bearer key accepted by the administrative API.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to automatic mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Identity used by approval webhooks.
    #[serde(default, skip_serializing)]
    pub webhook: Webhook,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// RabbitMQ mail queue configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Hostname:(?port) for RabbitMQ instance.
    pub address: String,
    /// RabbitMQ default vhost.
    pub vhost: Option<String>,
    /// RabbitMQ username to access queue.
    pub username: String,
    /// RabbitMQ password to access queue.
    pub password: String,
    /// Max channel connections.
    pub pool: Option<u16>,
    /// Queue name to send mailing events.
    pub queue: String,
}

/// Approval webhook identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    /// Name displayed as message author.
    pub username: String,
    /// Avatar displayed next to the message.
    pub avatar_url: String,
}

impl Default for Webhook {
    fn default() -> Self {
        Self {
            username: DEFAULT_WEBHOOK_USERNAME.to_owned(),
            avatar_url: DEFAULT_WEBHOOK_AVATAR.to_owned(),
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Current crate version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match Self::load(file_path) {
            Ok(config) => Ok(Arc::new(self.finalize(config)?)),
            Err(err) => {
                tracing::error!(path = %file_path.display(), "{err}");
                Ok(Arc::new(self.fallback()))
            },
        }
    }

    fn load(path: &Path) -> Result<Configuration, LoadError> {
        let file = File::open(path).map_err(LoadError::Open)?;
        serde_yaml::from_reader(file).map_err(LoadError::Parse)
    }

    /// Apply version and URL normalization to a freshly parsed file.
    fn finalize(
        &self,
        mut config: Configuration,
    ) -> Result<Self, url::ParseError> {
        config.version = VERSION.to_owned();
        config.url = self.normalize_url(&config.url)?;

        if config.name.is_empty() {
            config.name = DEFAULT_WEBHOOK_USERNAME.to_owned();
        }

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn fallback(&self) -> Self {
        Self {
            name: DEFAULT_WEBHOOK_USERNAME.to_owned(),
            url: "http://localhost/".to_owned(),
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    /// Public URL as a parsed [`Url`].
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.url)
    }
}

/// Append `segments` after the path of `base`, keeping any sub-path the
/// panel is served under.
pub fn append_path(
    base: &Url,
    segments: &[&str],
) -> Result<Url, url::ParseError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
