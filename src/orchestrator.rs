//! The deployment pipeline: configuration, build, creation transaction.
//!
//! Each run is a single attempt. A failure at any stage ends the run with
//! that stage named; nothing before an acknowledged submission touches the
//! network.

use crate::compiler::{CompileError, Compiler};
use crate::config::{ConfigError, ConfigSource, Configuration};
use crate::network::{DeploymentRequest, Network, QueryError, SubmissionError};
use crate::record::{RawValues, RecordDefinition, RecordValues};
use crate::Address;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Building,
    Submitting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::Building => "building",
            Stage::Submitting => "submitting",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Building,
    Submitting,
    Succeeded(Address),
    Failed(Stage),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded(_) | PipelineState::Failed(_))
    }
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("init failed: {0}")]
    ConfigMissing(#[from] ConfigError),
    #[error("building failed: {0}")]
    Compile(#[from] CompileError),
    #[error("submitting failed: {0}")]
    Submission(#[from] SubmissionError),
}

impl DeployError {
    pub fn stage(&self) -> Stage {
        match self {
            DeployError::ConfigMissing(_) => Stage::Init,
            DeployError::Compile(_) => Stage::Building,
            DeployError::Submission(_) => Stage::Submitting,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("init failed: {0}")]
    ConfigMissing(#[from] ConfigError),
    #[error("query failed: {0}")]
    Query(#[from] QueryError),
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub address: Address,
    pub transaction_hash: Option<String>,
    pub deployer: Option<String>,
    /// BLAKE3 of the deployed bytecode.
    pub fingerprint: String,
}

pub struct Orchestrator<C, N> {
    definition: RecordDefinition,
    compiler: C,
    network: N,
}

impl<C: Compiler, N: Network> Orchestrator<C, N> {
    pub fn new(compiler: C, network: N) -> Self {
        Self {
            definition: RecordDefinition::new(),
            compiler,
            network,
        }
    }

    pub fn definition(&self) -> &RecordDefinition {
        &self.definition
    }

    pub async fn deploy(&self, source: &impl ConfigSource, raw: RawValues) -> Result<Deployment, DeployError> {
        self.deploy_traced(source, raw).await.1
    }

    /// Like [`deploy`](Self::deploy), also returning every state the run
    /// passed through, ending in a terminal one.
    pub async fn deploy_traced(
        &self,
        source: &impl ConfigSource,
        raw: RawValues,
    ) -> (Vec<PipelineState>, Result<Deployment, DeployError>) {
        let mut states = vec![PipelineState::Init];
        let result = self.run(source, raw, &mut states).await;

        let terminal = match &result {
            Ok(deployment) => {
                info!(address = %deployment.address, "deployment succeeded");
                PipelineState::Succeeded(deployment.address.clone())
            }
            Err(e) => {
                debug!(stage = %e.stage(), "deployment failed");
                PipelineState::Failed(e.stage())
            }
        };
        states.push(terminal);
        (states, result)
    }

    async fn run(
        &self,
        source: &impl ConfigSource,
        raw: RawValues,
        states: &mut Vec<PipelineState>,
    ) -> Result<Deployment, DeployError> {
        info!(stage = %Stage::Init, "loading configuration");
        let config = Configuration::load(source)?;

        transition(states, PipelineState::Building);
        info!(stage = %Stage::Building, contract = self.definition.contract_name(), "compiling record");
        let artifact = self.compiler.compile(&self.definition).await?;

        transition(states, PipelineState::Submitting);
        let request = DeploymentRequest::new(config, &raw).map_err(SubmissionError::from)?;
        info!(
            stage = %Stage::Submitting,
            product_id = %request.values.product_id,
            price = %request.values.price,
            is_available = request.values.is_available,
            "sending creation transaction"
        );
        let receipt = self.network.submit(&request, &artifact).await?;

        Ok(Deployment {
            address: receipt.deployed_to,
            transaction_hash: receipt.transaction_hash,
            deployer: receipt.deployer,
            fingerprint: artifact.fingerprint,
        })
    }

    /// Reads back the values stored at `address`.
    pub async fn query(&self, source: &impl ConfigSource, address: &Address) -> Result<RecordValues, ReadError> {
        let config = Configuration::load(source)?;
        info!(%address, "querying record");
        Ok(self.network.query(&config, address).await?)
    }
}

fn transition(states: &mut Vec<PipelineState>, next: PipelineState) {
    debug!(from = ?states.last(), to = ?next, "state transition");
    states.push(next);
}
