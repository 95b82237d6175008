//! Configuration for a cross-verifier

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attestation::sev::DEFAULT_KDS_BASE;
use crate::error::Error;
use crate::sigstore::SIGSTORE_TRUSTED_ROOT_URL;

/// How the runtime attestation served by the enclave is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuntimeStrategy {
    /// JSON enclave report (SEV-SNP or TDX) binding the TLS key fingerprint
    #[serde(rename = "enclave")]
    EnclaveReport,
    /// COSE-signed Nitro hardware attestation document
    #[default]
    #[serde(rename = "nitro")]
    NitroDocument,
}

impl FromStr for RuntimeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enclave" => Ok(RuntimeStrategy::EnclaveReport),
            "nitro" => Ok(RuntimeStrategy::NitroDocument),
            other => Err(Error::InvalidInput(format!(
                "unknown runtime strategy {:?} (expected \"enclave\" or \"nitro\")", other
            ))),
        }
    }
}

impl fmt::Display for RuntimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStrategy::EnclaveReport => f.write_str("enclave"),
            RuntimeStrategy::NitroDocument => f.write_str("nitro"),
        }
    }
}

/// Where the Sigstore trusted root (`trusted_root.json`) is read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedRootSource {
    /// Local copy, e.g. one refreshed through the Sigstore TUF client
    File(PathBuf),
    /// Fetched with the verifier's transport on every provenance check
    Url(String),
}

impl Default for TrustedRootSource {
    fn default() -> Self {
        TrustedRootSource::Url(SIGSTORE_TRUSTED_ROOT_URL.into())
    }
}

/// Configuration for a verification run
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// GitHub REST API base, used for release lookup.
    pub github_api: String,
    /// Base of the attestations API serving Sigstore bundles.
    pub attestation_api: String,
    /// Runtime attestation interpretation.
    pub runtime_strategy: RuntimeStrategy,
    /// Per-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
    /// URL returning the engine version tag callers expect, if any.
    pub engine_tag_url: Option<String>,
    /// AMD key distribution service (or proxy) for SEV-SNP collateral.
    pub kds_base: String,
    /// Check SEV-SNP reports against the AMD certificate chain.
    pub vendor_collateral: bool,
    /// Fulcio and Rekor trust anchors for provenance bundles.
    pub trusted_root: TrustedRootSource,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".into(),
            attestation_api: "https://api.github.com".into(),
            runtime_strategy: RuntimeStrategy::default(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("tinfoil-verifier/", env!("CARGO_PKG_VERSION")).into(),
            engine_tag_url: None,
            kds_base: DEFAULT_KDS_BASE.into(),
            vendor_collateral: true,
            trusted_root: TrustedRootSource::default(),
        }
    }
}
