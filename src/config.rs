use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const RPC_URL_KEY: &str = "RPC_URL";
pub const PRIVATE_KEY_KEY: &str = "PRIVATE_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required configuration '{0}' is missing or empty")]
    Missing(&'static str),
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("timeout_secs must be greater than zero")]
    ZeroTimeout,
}

/// A credential that never shows up in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// RPC endpoint URL. Hosted providers put API keys in the path or query,
/// so only scheme, host and port are ever displayed.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn redacted(&self) -> String {
        let Ok(url) = reqwest::Url::parse(&self.0) else {
            return "[redacted]".to_string();
        };
        match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}://{}:{}/[redacted]", url.scheme(), host, port),
            (Some(host), None) => format!("{}://{}/[redacted]", url.scheme(), host),
            (None, _) => "[redacted]".to_string(),
        }
    }

    /// Replaces every occurrence of the full URL in `text` with its redacted form.
    pub fn scrub(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }
        text.replace(&self.0, &self.redacted())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Anything that can hand out a snapshot of key/value configuration.
pub trait ConfigSource {
    fn vars(&self) -> Result<HashMap<String, String>, ConfigError>;
}

impl ConfigSource for HashMap<String, String> {
    fn vars(&self) -> Result<HashMap<String, String>, ConfigError> {
        Ok(self.clone())
    }
}

/// Process environment layered over a dotenv file.
///
/// The file is read into a private map; the process environment is never
/// modified, and a variable already set in the environment wins.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    env_file: Option<PathBuf>,
}

impl EnvSource {
    /// Discovers `.env` from the working directory upwards.
    pub fn new() -> Self {
        Self { env_file: None }
    }

    /// Reads an explicit dotenv file, which must exist.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self { env_file: Some(path.into()) }
    }

    fn file_vars(&self) -> Result<HashMap<String, String>, ConfigError> {
        let iter = match &self.env_file {
            Some(path) => dotenvy::from_path_iter(path).map_err(|source| ConfigError::EnvFile {
                path: path.clone(),
                source,
            })?,
            None => match dotenvy::dotenv_iter() {
                Ok(iter) => iter,
                Err(e) if e.not_found() => return Ok(HashMap::new()),
                Err(source) => {
                    return Err(ConfigError::EnvFile { path: PathBuf::from(".env"), source });
                }
            },
        };

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                path: self.env_file.clone().unwrap_or_else(|| PathBuf::from(".env")),
                source,
            })?;
            vars.insert(key, value);
        }
        Ok(vars)
    }
}

impl ConfigSource for EnvSource {
    fn vars(&self) -> Result<HashMap<String, String>, ConfigError> {
        let mut vars = self.file_vars()?;
        for key in [RPC_URL_KEY, PRIVATE_KEY_KEY] {
            if let Ok(value) = std::env::var(key) {
                vars.insert(key.to_string(), value);
            }
        }
        Ok(vars)
    }
}

/// Endpoint and signing credential for one run.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub rpc_url: Endpoint,
    pub private_key: Secret,
}

impl Configuration {
    pub fn load(source: &impl ConfigSource) -> Result<Self, ConfigError> {
        let vars = source.vars()?;
        let required = |key: &'static str| -> Result<String, ConfigError> {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::Missing(key))
        };

        Ok(Self {
            rpc_url: Endpoint::new(required(RPC_URL_KEY)?),
            private_key: Secret::new(required(PRIVATE_KEY_KEY)?),
        })
    }
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_forge_bin() -> PathBuf {
    PathBuf::from("forge")
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_contract_file() -> PathBuf {
    PathBuf::from("src/ProductRecord.sol")
}

/// Non-secret toolchain settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    #[serde(default = "default_forge_bin")]
    pub forge_bin: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Relative to `project_dir`.
    #[serde(default = "default_contract_file")]
    pub contract_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            forge_bin: default_forge_bin(),
            timeout_secs: default_timeout_secs(),
            contract_file: default_contract_file(),
        }
    }
}

impl Settings {
    pub fn from_yaml_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_yaml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.timeout_secs == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Path handed to forge, relative to the project root.
    pub fn contract_path(&self, contract_name: &str) -> String {
        format!("{}:{}", self.contract_file.display(), contract_name)
    }
}
