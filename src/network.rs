use crate::compiler::Artifact;
use crate::config::{Configuration, Settings};
use crate::record::{FIELDS, RawValues, RecordValues};
use crate::{Address, ArgumentError};
use async_trait::async_trait;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("invalid constructor argument: {0}")]
    InvalidArgument(#[from] ArgumentError),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("no acknowledgment within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("failed to launch deployment toolchain: {0}")]
    Toolchain(#[source] std::io::Error),
    #[error("could not read deployment receipt from: {0}")]
    MalformedReceipt(String),
}

#[derive(Error, Debug)]
pub enum QueryError {
    /// Carries no URL; the endpoint may embed an API key.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("cannot decode {field}: {reason}")]
    Decode { field: &'static str, reason: String },
}

/// Acknowledgment of an included creation transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub deployed_to: Address,
    #[serde(default)]
    pub deployer: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

impl Receipt {
    /// Accepts `forge create --json` output, or its plain-text summary.
    pub fn from_forge_output(stdout: &str) -> Result<Self, SubmissionError> {
        for line in stdout.lines().rev() {
            let line = line.trim();
            if line.starts_with('{') {
                if let Ok(receipt) = serde_json::from_str::<Receipt>(line) {
                    return Ok(receipt);
                }
            }
        }

        let field = |label: &str| {
            stdout
                .lines()
                .find_map(|l| l.trim().strip_prefix(label))
                .map(|v| v.trim().to_string())
        };
        let deployed_to = field("Deployed to:")
            .and_then(|a| a.parse::<Address>().ok())
            .ok_or_else(|| SubmissionError::MalformedReceipt(stdout.trim().to_string()))?;

        Ok(Self {
            deployed_to,
            deployer: field("Deployer:"),
            transaction_hash: field("Transaction hash:"),
        })
    }
}

/// The ordered constructor values bound to the configuration they are sent
/// with. Built at the start of submission and dropped when the run ends.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub config: Configuration,
    pub values: RecordValues,
}

impl DeploymentRequest {
    pub fn new(config: Configuration, raw: &RawValues) -> Result<Self, ArgumentError> {
        Ok(Self {
            config,
            values: RecordValues::parse(raw)?,
        })
    }

    pub fn constructor_args(&self) -> Vec<String> {
        self.values.constructor_args()
    }
}

/// The ledger the record is created on and read back from.
#[async_trait]
pub trait Network: Send + Sync {
    async fn submit(&self, request: &DeploymentRequest, artifact: &Artifact) -> Result<Receipt, SubmissionError>;

    async fn query(&self, config: &Configuration, address: &Address) -> Result<RecordValues, QueryError>;
}

/// Submits through `forge create` and reads back over JSON-RPC.
pub struct ForgeNetwork {
    settings: Settings,
    http: reqwest::Client,
}

impl ForgeNetwork {
    pub fn new(settings: Settings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self { settings, http })
    }

    async fn eth_call(&self, rpc_url: &str, to: &Address, selector: [u8; 4]) -> Result<Vec<u8>, QueryError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": to.as_str(), "data": format!("0x{}", hex::encode(selector)) }, "latest"],
        });
        let response: RpcResponse = self
            .http
            .post(rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.without_url()))?
            .json()
            .await
            .map_err(|e| QueryError::Transport(e.without_url()))?;

        if let Some(err) = response.error {
            return Err(QueryError::Rpc { code: err.code, message: err.message });
        }
        let result = response.result.unwrap_or_default();
        hex::decode(result.trim_start_matches("0x")).map_err(|e| QueryError::Decode {
            field: "result",
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Network for ForgeNetwork {
    async fn submit(&self, request: &DeploymentRequest, artifact: &Artifact) -> Result<Receipt, SubmissionError> {
        let config = &request.config;
        let args = request.constructor_args();
        info!(
            contract = %artifact.contract_path,
            endpoint = %config.rpc_url,
            timeout_secs = self.settings.timeout_secs,
            "submitting creation transaction"
        );
        debug!(?args, "forge create arguments");

        let mut cmd = Command::new(&self.settings.forge_bin);
        cmd.arg("create")
            .arg("--broadcast")
            .arg("--json")
            .arg("--rpc-url")
            .arg(config.rpc_url.expose())
            .arg("--private-key")
            .arg(config.private_key.expose())
            .arg(&artifact.contract_path)
            .arg("--constructor-args")
            .args(&args)
            .current_dir(&self.settings.project_dir)
            .kill_on_drop(true);

        let timeout = self.settings.timeout();
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(SubmissionError::Toolchain)?,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "stopped waiting for acknowledgment");
                return Err(SubmissionError::Timeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            let reason = config.rpc_url.scrub(reason).replace(config.private_key.expose(), "[redacted]");
            return Err(SubmissionError::Rejected(reason));
        }

        let receipt = Receipt::from_forge_output(&stdout)?;
        info!(address = %receipt.deployed_to, tx = ?receipt.transaction_hash, "creation acknowledged");
        Ok(receipt)
    }

    async fn query(&self, config: &Configuration, address: &Address) -> Result<RecordValues, QueryError> {
        let [id_field, name_field, price_field, available_field] = FIELDS;
        let rpc = config.rpc_url.expose();
        let product_id = decode_string(id_field.name, &self.eth_call(rpc, address, id_field.selector).await?)?;
        let product_name = decode_string(name_field.name, &self.eth_call(rpc, address, name_field.selector).await?)?;
        let price = decode_int(price_field.name, &self.eth_call(rpc, address, price_field.selector).await?)?;
        let is_available =
            decode_bool(available_field.name, &self.eth_call(rpc, address, available_field.selector).await?)?;

        Ok(RecordValues { product_id, product_name, price, is_available })
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

const WORD: usize = 32;

fn word<'a>(field: &'static str, data: &'a [u8], offset: usize) -> Result<&'a [u8], QueryError> {
    let end = offset.checked_add(WORD);
    end.and_then(|end| data.get(offset..end)).ok_or_else(|| QueryError::Decode {
        field,
        reason: format!("expected 32 bytes at offset {}, have {}", offset, data.len()),
    })
}

fn word_to_usize(field: &'static str, w: &[u8]) -> Result<usize, QueryError> {
    let (high, low) = w.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(QueryError::Decode { field, reason: "length or offset out of range".into() });
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf))
        .map_err(|_| QueryError::Decode { field, reason: "length or offset out of range".into() })
}

fn decode_string(field: &'static str, data: &[u8]) -> Result<String, QueryError> {
    let offset = word_to_usize(field, word(field, data, 0)?)?;
    let len = word_to_usize(field, word(field, data, offset)?)?;
    let start = offset + WORD;
    let bytes = data
        .get(start..start.saturating_add(len))
        .ok_or_else(|| QueryError::Decode { field, reason: "string runs past end of data".into() })?;
    String::from_utf8(bytes.to_vec()).map_err(|e| QueryError::Decode { field, reason: e.to_string() })
}

fn decode_int(field: &'static str, data: &[u8]) -> Result<BigInt, QueryError> {
    Ok(BigInt::from_signed_bytes_be(word(field, data, 0)?))
}

fn decode_bool(field: &'static str, data: &[u8]) -> Result<bool, QueryError> {
    let w = word(field, data, 0)?;
    if w[..WORD - 1].iter().any(|b| *b != 0) {
        return Err(QueryError::Decode { field, reason: "not a bool word".into() });
    }
    match w[WORD - 1] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(QueryError::Decode { field, reason: format!("bool byte {}", other) }),
    }
}
