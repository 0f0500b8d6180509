use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

pub const UPLOAD_URL_ENV: &str = "IMAGE_UPLOAD_URL";
pub const UPLOAD_TOKEN_ENV: &str = "IMAGE_UPLOAD_TOKEN";
pub const OUTPUT_DIR_ENV: &str = "OUTPUT_IMAGE_PATH";

const DEFAULT_OUTPUT_DIR_NAME: &str = "gen_image";
const DISABLED_VALUES: [&str; 3] = ["off", "none", "disabled"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IMAGE_UPLOAD_URL is not a valid URL ({value}): {source}")]
    InvalidUploadUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("IMAGE_UPLOAD_URL must use http or https, got '{scheme}'")]
    UnsupportedScheme { scheme: String },
}

/// Remote image host. Endpoint and token only exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub endpoint: Url,
    pub token: String,
}

/// Outcome of resolving the local output directory at startup.
///
/// `Unavailable` records a directory that was requested but could not be
/// created; it is never retried for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalStorage {
    Disabled,
    Ready(PathBuf),
    Unavailable { dir: PathBuf, reason: String },
}

impl LocalStorage {
    /// Create `dir` (and parents) once and record the result.
    pub fn prepare(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match fs::create_dir_all(&dir) {
            Ok(()) => Self::Ready(dir),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "local output directory unavailable");
                Self::Unavailable {
                    dir,
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn ready_dir(&self) -> Option<&Path> {
        match self {
            Self::Ready(dir) => Some(dir.as_path()),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// What the caller asked for regarding the local directory, before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalDirSetting {
    /// Nothing set: use the per-user default directory.
    Default,
    Disabled,
    Dir(PathBuf),
}

impl LocalDirSetting {
    pub fn from_raw(raw: Option<&str>) -> Self {
        let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::Default;
        };
        if DISABLED_VALUES
            .iter()
            .any(|disabled| value.eq_ignore_ascii_case(disabled))
        {
            return Self::Disabled;
        }
        Self::Dir(PathBuf::from(value))
    }
}

/// Process-wide storage configuration. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub remote: Option<RemoteTarget>,
    pub local: LocalStorage,
}

impl StorageConfig {
    pub fn new(remote: Option<RemoteTarget>, local: LocalStorage) -> Self {
        Self { remote, local }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_override(None)
    }

    /// Like [`StorageConfig::from_env`], with an explicit local directory that
    /// takes precedence over `OUTPUT_IMAGE_PATH`.
    pub fn from_env_with_override(local_override: Option<&str>) -> Result<Self, ConfigError> {
        let output_dir = local_override
            .map(str::to_string)
            .or_else(|| env::var(OUTPUT_DIR_ENV).ok());
        Self::resolve(
            non_empty_env(UPLOAD_URL_ENV).as_deref(),
            non_empty_env(UPLOAD_TOKEN_ENV).as_deref(),
            LocalDirSetting::from_raw(output_dir.as_deref()),
        )
    }

    pub fn resolve(
        upload_url: Option<&str>,
        upload_token: Option<&str>,
        local: LocalDirSetting,
    ) -> Result<Self, ConfigError> {
        let remote = resolve_remote(upload_url, upload_token)?;
        let local = match local {
            LocalDirSetting::Disabled => LocalStorage::Disabled,
            LocalDirSetting::Dir(dir) => LocalStorage::prepare(dir),
            LocalDirSetting::Default => match dirs::home_dir() {
                Some(home) => LocalStorage::prepare(home.join(DEFAULT_OUTPUT_DIR_NAME)),
                None => {
                    tracing::warn!("no home directory; local storage disabled");
                    LocalStorage::Disabled
                }
            },
        };
        Ok(Self { remote, local })
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn has_any_backend(&self) -> bool {
        self.remote.is_some() || !self.local.is_disabled()
    }
}

fn resolve_remote(
    upload_url: Option<&str>,
    upload_token: Option<&str>,
) -> Result<Option<RemoteTarget>, ConfigError> {
    let upload_url = upload_url.map(str::trim).filter(|value| !value.is_empty());
    let upload_token = upload_token.map(str::trim).filter(|value| !value.is_empty());
    match (upload_url, upload_token) {
        (Some(raw), Some(token)) => {
            let endpoint = Url::parse(raw).map_err(|source| ConfigError::InvalidUploadUrl {
                value: raw.to_string(),
                source,
            })?;
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(ConfigError::UnsupportedScheme {
                    scheme: endpoint.scheme().to_string(),
                });
            }
            Ok(Some(RemoteTarget {
                endpoint,
                token: token.to_string(),
            }))
        }
        (None, None) => Ok(None),
        (Some(_), None) => {
            tracing::warn!("IMAGE_UPLOAD_URL set without IMAGE_UPLOAD_TOKEN; remote upload disabled");
            Ok(None)
        }
        (None, Some(_)) => {
            tracing::warn!("IMAGE_UPLOAD_TOKEN set without IMAGE_UPLOAD_URL; remote upload disabled");
            Ok(None)
        }
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
