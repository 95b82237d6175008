//! tinfoil-verify CLI - cross-verify an enclave against its published source.
//!
//! Exit status: 0 verified, 1 failed, 2 measurements mismatched.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tinfoil_verifier::events::EVENT_TARGET;
use tinfoil_verifier::{
    CrossVerifier, Event, EventSink, MemorySink, RuntimeStrategy, TrustedRootSource,
    VerificationOutcome, VerificationStatus, VerifierConfig,
};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Verify that an enclave runs the image published by a GitHub repository.
///
/// The expected image digest is read from the repository's latest release,
/// its Sigstore provenance is verified, and the measurement it attests to is
/// compared with the measurement in the enclave's hardware attestation.
#[derive(Parser)]
#[command(name = "tinfoil-verify")]
#[command(version = VERSION)]
#[command(about = "Cross-verify enclave attestation against Sigstore provenance")]
struct Cli {
    /// Source repository (owner/name)
    #[arg(short, long)]
    repo: String,

    /// Enclave hostname
    #[arg(short, long)]
    domain: String,

    /// Verify against this image digest instead of the latest release
    #[arg(long)]
    digest: Option<String>,

    /// Runtime attestation type (enclave, nitro)
    #[arg(short, long, default_value = "nitro")]
    strategy: RuntimeStrategy,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// URL returning the expected verifier engine version
    #[arg(long)]
    engine_tag_url: Option<String>,

    /// Skip fetching AMD collateral for SEV-SNP reports
    #[arg(long)]
    no_vendor_collateral: bool,

    /// Sigstore trusted_root.json to use instead of fetching the public-good root
    #[arg(long, value_name = "PATH")]
    trusted_root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Prints each event as it is recorded
struct PrintSink;

impl EventSink for PrintSink {
    fn record(&self, event: Event) {
        println!("{}", event);
    }
}

/// Filter used when `RUST_LOG` is unset
///
/// Events are already printed by the sink, so their `tracing` mirror is off.
fn fallback_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "warn" };
    format!("tinfoil_verifier={},{}=off", level, EVENT_TARGET)
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(outcome: &VerificationOutcome) -> ExitCode {
    match outcome.status {
        VerificationStatus::Verified => ExitCode::SUCCESS,
        VerificationStatus::Failed(_) => ExitCode::from(1),
        VerificationStatus::Mismatched { .. } => ExitCode::from(2),
    }
}

fn print_text(outcome: &VerificationOutcome) {
    println!();
    if let Some(url) = &outcome.bundle_url {
        println!("Attestation bundle:  {}", url);
    }
    if let Some(url) = &outcome.attestation_url {
        println!("Runtime attestation: {}", url);
    }
    if let Some(release) = &outcome.release {
        println!("Release:             {}", release.tag);
    }
    if let Some(digest) = &outcome.expected_digest {
        println!("Expected digest:     {}", digest);
    }
    if let Some(m) = &outcome.provenance_measurement {
        println!("Source measurement:  {}", m);
    }
    if let Some(m) = &outcome.runtime_measurement {
        println!("Enclave measurement: {}", m);
    }
    if let Some(fp) = &outcome.certificate_fingerprint {
        println!("TLS key fingerprint: {}", fp);
    }
    println!("Result:              {}", outcome.status.state());
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = VerifierConfig {
        runtime_strategy: cli.strategy,
        timeout: Duration::from_secs(cli.timeout),
        engine_tag_url: cli.engine_tag_url.clone(),
        vendor_collateral: !cli.no_vendor_collateral,
        ..VerifierConfig::default()
    };
    if let Some(path) = &cli.trusted_root {
        config.trusted_root = TrustedRootSource::File(path.clone());
    }

    let verifier = match CrossVerifier::from_config(config) {
        Ok(verifier) => verifier,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    match cli.format {
        OutputFormat::Text => {
            let sink = PrintSink;
            let outcome = run(&verifier, &cli, &sink).await;
            print_text(&outcome);
            exit_code(&outcome)
        }
        OutputFormat::Json => {
            let sink = MemorySink::new();
            let outcome = run(&verifier, &cli, &sink).await;
            let report = serde_json::json!({
                "outcome": outcome,
                "events": sink.events(),
            });
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: failed to serialize outcome: {}", e),
            }
            exit_code(&outcome)
        }
    }
}

async fn run(verifier: &CrossVerifier, cli: &Cli, sink: &dyn EventSink) -> VerificationOutcome {
    match &cli.digest {
        Some(digest) => verifier.verify_digest(&cli.repo, digest, &cli.domain, sink).await,
        None => verifier.verify(&cli.repo, &cli.domain, sink).await,
    }
}
