use clap::{Parser, Subcommand};
use record_deploy::{
    Address, EnvSource, ForgeCompiler, ForgeNetwork, Orchestrator, PipelineState, RawValues, Settings,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Provision an immutable product record on chain.
#[derive(Parser, Debug)]
#[command(name = "record_deploy", version, about)]
struct Cli {
    /// Dotenv file holding RPC_URL and PRIVATE_KEY (default: discover .env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// YAML file with toolchain settings
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the record and create one instance with the given values
    Deploy {
        #[arg(allow_hyphen_values = true)]
        product_id: String,
        #[arg(allow_hyphen_values = true)]
        product_name: String,
        #[arg(allow_hyphen_values = true)]
        price: String,
        #[arg(allow_hyphen_values = true)]
        is_available: String,
    },
    /// Print the Solidity source of the record
    Render,
    /// Read the stored values of a deployed record
    Query { address: Address },
}

/// A pipeline stage or the query failed.
const EXIT_FAILED: u8 = 1;
/// The run could not start: unreadable settings or a bad command line.
const EXIT_SETUP: u8 = 2;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_SETUP)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = Settings::load(cli.settings.as_deref())?;
    let source = match &cli.env_file {
        Some(path) => EnvSource::with_file(path),
        None => EnvSource::new(),
    };
    let orchestrator = Orchestrator::new(
        ForgeCompiler::new(settings.clone()),
        ForgeNetwork::new(settings)?,
    );

    match cli.command {
        Command::Render => {
            let def = orchestrator.definition();
            if cli.json {
                let out = serde_json::json!({
                    "contract": def.contract_name(),
                    "fingerprint": def.source_fingerprint(),
                    "source": def.render_source(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print!("{}", def.render_source());
                eprintln!("fingerprint: {}", def.source_fingerprint());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Deploy { product_id, product_name, price, is_available } => {
            let raw = RawValues::new(product_id, product_name, price, is_available);
            let (states, result) = orchestrator.deploy_traced(&source, raw).await;
            if cli.verbose {
                let path: Vec<String> = states.iter().map(describe).collect();
                eprintln!("pipeline: {}", path.join(" -> "));
            }

            match result {
                Ok(deployment) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&deployment)?);
                    } else {
                        println!("Deployed to: {}", deployment.address);
                        if let Some(tx) = &deployment.transaction_hash {
                            println!("Transaction hash: {}", tx);
                        }
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    Ok(ExitCode::from(EXIT_FAILED))
                }
            }
        }
        Command::Query { address } => match orchestrator.query(&source, &address).await {
            Ok(values) => {
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&values)?);
                } else {
                    println!("product_id:   {}", values.product_id);
                    println!("product_name: {}", values.product_name);
                    println!("price:        {}", values.price);
                    println!("is_available: {}", values.is_available);
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("error: query of {} failed: {}", address, e);
                Ok(ExitCode::from(EXIT_FAILED))
            }
        },
    }
}

fn describe(state: &PipelineState) -> String {
    match state {
        PipelineState::Init => "init".into(),
        PipelineState::Building => "building".into(),
        PipelineState::Submitting => "submitting".into(),
        PipelineState::Succeeded(addr) => format!("succeeded({})", addr),
        PipelineState::Failed(stage) => format!("failed({})", stage),
    }
}
