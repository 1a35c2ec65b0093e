//! Attestor proof orchestration CLI.

#![deny(clippy::unwrap_used)]

use attestor::{
    CompositeGenerator, EngineConfig, InputMap, MockGenerator, MockVerifier, ProofEngineBuilder,
    ProofRequest, ProofRequestOptions, VerificationRequest,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "attestor")]
#[command(about = "Proof orchestration engine for privacy-preserving reserve attestation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging.
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Proof generation and verification.
    Proof {
        #[command(subcommand)]
        action: ProofAction,
    },
    /// Reserve attestation monitoring surface (stub: external collaborator).
    Reserve {
        #[command(subcommand)]
        action: ReserveAction,
    },
    /// Key and ceremony management (stub: external collaborator).
    Setup {
        #[command(subcommand)]
        action: SetupAction,
    },
    /// Print version information.
    Version,
}

#[derive(Subcommand)]
enum ProofAction {
    /// Generate a proof synchronously and print its summary.
    Generate {
        /// Proof type, e.g. balance_threshold.
        #[arg(long)]
        proof_type: String,
        /// Public inputs as a JSON object.
        #[arg(long, default_value = "{}")]
        public_inputs: String,
        /// Private inputs as a JSON object.
        #[arg(long, default_value = "{}")]
        private_inputs: String,
    },
    /// Verify a previously generated proof.
    Verify {
        /// Hex-encoded proof bytes.
        #[arg(long)]
        proof_bytes: String,
        /// Circuit identifier the proof was generated under.
        #[arg(long)]
        circuit_hash: String,
        /// Public inputs as a JSON object.
        #[arg(long, default_value = "{}")]
        public_inputs: String,
    },
}

#[derive(Subcommand)]
enum ReserveAction {
    /// Continuously watch reserve balances for attestation triggers.
    Monitor,
    /// Run a single reserve check.
    Check,
}

#[derive(Subcommand)]
enum SetupAction {
    /// Generate or rotate proving/verification keys.
    Keys,
    /// Run a trusted-setup ceremony step.
    Ceremony,
}

fn parse_inputs(raw: &str) -> Result<InputMap, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("invalid input: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "invalid input: expected a JSON object".to_string())?;
    let mut inputs = InputMap::new();
    for (key, val) in object {
        let converted = match val {
            serde_json::Value::Number(n) if n.is_i64() => {
                attestor::InputValue::Integer(n.as_i64().expect("checked is_i64 above"))
            }
            serde_json::Value::String(s) => attestor::InputValue::Decimal(s.clone()),
            other => return Err(format!("invalid input: unsupported value for {}: {}", key, other)),
        };
        inputs.insert(key.clone(), converted);
    }
    Ok(inputs)
}

fn default_backend() -> Arc<CompositeGenerator> {
    let mut backend = CompositeGenerator::new();
    let proof_types = [
        "balance_threshold",
        "solvency_ratio",
        "merkle_inclusion",
        "portfolio_aggregate",
    ];
    backend.register_generator(Arc::new(MockGenerator::new(proof_types)));
    for proof_type in proof_types {
        backend.register_verifier(proof_type, Arc::new(MockVerifier));
    }
    Arc::new(backend)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("attestor {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Proof { action } => run_proof(action, cli.output).await,
        Commands::Reserve { action } => run_reserve(action),
        Commands::Setup { action } => run_setup(action),
    }
}

async fn run_proof(action: ProofAction, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let backend = default_backend();
    let engine = ProofEngineBuilder::new(EngineConfig::default())
        .backend(backend)
        .build()?;
    engine.start();

    match action {
        ProofAction::Generate {
            proof_type,
            public_inputs,
            private_inputs,
        } => {
            let request = ProofRequest {
                proof_type,
                subject_id: None,
                account_id: None,
                public_inputs: parse_inputs(&public_inputs)?,
                private_inputs: parse_inputs(&private_inputs)?,
                options: ProofRequestOptions::default(),
            };
            let artifact = engine.generate(request).await?;
            print_output(output, &artifact)?;
        }
        ProofAction::Verify {
            proof_bytes,
            circuit_hash,
            public_inputs,
        } => {
            let request = VerificationRequest {
                proof_id: None,
                proof_bytes: hex::decode(&proof_bytes)
                    .map_err(|e| format!("invalid input: {}", e))?,
                public_inputs: parse_inputs(&public_inputs)?,
                verification_key: Vec::new(),
                circuit_hash,
            };
            let valid = engine.verify(request).await?;
            print_output(output, &serde_json::json!({ "valid": valid }))?;
        }
    }

    engine.stop().await;
    Ok(())
}

fn print_output(format: OutputFormat, value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

fn run_reserve(action: ReserveAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ReserveAction::Monitor => {
            println!("reserve monitor: not implemented in this core; wire a reserve feed and call ProofEngine::submit_job per trigger");
        }
        ReserveAction::Check => {
            println!("reserve check: not implemented in this core; this is an external collaborator's responsibility");
        }
    }
    Ok(())
}

fn run_setup(action: SetupAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SetupAction::Keys => {
            println!("setup keys: not implemented in this core; key management is an external collaborator's responsibility");
        }
        SetupAction::Ceremony => {
            println!("setup ceremony: not implemented in this core; trusted setup is an external collaborator's responsibility");
        }
    }
    Ok(())
}
