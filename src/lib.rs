pub mod compiler;
pub mod config;
pub mod network;
pub mod orchestrator;
pub mod record;

pub use compiler::{Artifact, CompileError, Compiler, ForgeCompiler};
pub use config::{ConfigError, ConfigSource, Configuration, Endpoint, EnvSource, Secret, Settings, SettingsError};
pub use network::{DeploymentRequest, ForgeNetwork, Network, QueryError, Receipt, SubmissionError};
pub use orchestrator::{DeployError, Deployment, Orchestrator, PipelineState, ReadError, Stage};
pub use record::{ArgumentError, RawValues, RecordDefinition, RecordValues};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),
    #[error("address must be 20 bytes (40 hex digits): {0}")]
    InvalidLength(String),
    #[error("address contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// The network-assigned location of a deployed record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(s.to_string()))?;
        if digits.len() != 40 {
            return Err(AddressError::InvalidLength(s.to_string()));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checksummed_address() {
        let addr: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
        assert_eq!(addr.as_str(), "0x5FbDB2315678afecb367f032d93F642f64180aa3");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(matches!(
            "5FbDB2315678afecb367f032d93F642f64180aa3".parse::<Address>(),
            Err(AddressError::MissingPrefix(_))
        ));
        assert!(matches!("0x1234".parse::<Address>(), Err(AddressError::InvalidLength(_))));
        assert!(matches!(
            "0xZZbDB2315678afecb367f032d93F642f64180aa3".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_goes_through_validation() {
        let json = "\"0x5FbDB2315678afecb367f032d93F642f64180aa3\"";
        let addr: Address = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&addr).unwrap(), json);
        assert!(serde_json::from_str::<Address>("\"nope\"").is_err());
    }
}
