//! Measurement extraction engine
//!
//! The cross-verifier only sees [`MeasurementExtractor`]: raw artifact bytes
//! in, a verified measurement or a failure out. [`VerifierEngine`] is the
//! bundled implementation backed by [`crate::sigstore`] and
//! [`crate::attestation`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::attestation::{self, nitro, Measurement, Verification};
use crate::config::{RuntimeStrategy, TrustedRootSource, VerifierConfig};
use crate::error::{Error, Result};
use crate::fetch::HttpTransport;
use crate::release::ExpectedDigest;
use crate::sigstore::{self, TrustedRoot};

/// Turns attestation artifacts into verified measurements
///
/// Each call is independent; the verifier never retries a rejected artifact.
#[async_trait]
pub trait MeasurementExtractor: Send + Sync {
    /// Version tag of the engine, compared against the requested tag before a run
    fn version(&self) -> &str;

    /// Verify a provenance bundle attests to `expected_digest` for `repository`
    async fn verify_provenance(
        &self,
        expected_digest: &ExpectedDigest,
        bundle: &[u8],
        repository: &str,
    ) -> Result<Measurement>;

    /// Verify a runtime attestation document and return its measurement
    async fn verify_runtime(&self, document: &[u8]) -> Result<Verification>;
}

/// Default engine: Sigstore bundles on one side, hardware attestations on the other
pub struct VerifierEngine {
    strategy: RuntimeStrategy,
    transport: Arc<dyn HttpTransport>,
    kds_base: String,
    vendor_collateral: bool,
    trusted_root_source: TrustedRootSource,
    trusted_root: Option<Arc<TrustedRoot>>,
}

impl VerifierEngine {
    pub fn new(config: &VerifierConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            strategy: config.runtime_strategy,
            transport,
            kds_base: config.kds_base.clone(),
            vendor_collateral: config.vendor_collateral,
            trusted_root_source: config.trusted_root.clone(),
            trusted_root: None,
        }
    }

    /// Use an already loaded trusted root instead of the configured source
    pub fn with_trusted_root(mut self, root: TrustedRoot) -> Self {
        self.trusted_root = Some(Arc::new(root));
        self
    }

    pub fn strategy(&self) -> RuntimeStrategy {
        self.strategy
    }

    async fn load_trusted_root(&self) -> Result<Arc<TrustedRoot>> {
        if let Some(root) = &self.trusted_root {
            return Ok(root.clone());
        }

        let raw = match &self.trusted_root_source {
            TrustedRootSource::File(path) => std::fs::read(path).map_err(|e| {
                Error::SigstoreVerification(format!(
                    "Failed to read trusted root {}: {}", path.display(), e
                ))
            })?,
            TrustedRootSource::Url(url) => {
                let response = self.transport.get(url).await?;
                if response.status != 200 {
                    return Err(Error::UnexpectedStatus {
                        url: url.clone(),
                        expected: 200,
                        actual: response.status,
                    });
                }
                response.body
            }
        };

        let root = TrustedRoot::from_json(&raw)?;
        debug!(
            authorities = root.authority_uris().count(),
            logs = root.log_urls().count(),
            "trusted root loaded"
        );
        Ok(Arc::new(root))
    }
}

#[async_trait]
impl MeasurementExtractor for VerifierEngine {
    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn verify_provenance(
        &self,
        expected_digest: &ExpectedDigest,
        bundle: &[u8],
        repository: &str,
    ) -> Result<Measurement> {
        let trusted_root = self.load_trusted_root().await?;
        let verified = sigstore::verify_bundle(bundle, expected_digest, repository, &trusted_root)?;
        debug!(
            workflow = %verified.identity.build_signer_uri,
            certificate = %verified.certificate_fingerprint,
            "provenance bundle verified"
        );
        Ok(verified.measurement)
    }

    async fn verify_runtime(&self, document: &[u8]) -> Result<Verification> {
        match self.strategy {
            RuntimeStrategy::EnclaveReport => {
                let doc = attestation::parse_document(document)?;
                if self.vendor_collateral {
                    attestation::verify_full(&doc, self.transport.as_ref(), &self.kds_base).await
                } else {
                    attestation::verify(&doc)
                }
            }
            RuntimeStrategy::NitroDocument => nitro::verify(document),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::tdx;
    use crate::error::ErrorKind;
    use crate::fetch::testing::StaticTransport;
    use crate::sigstore::testing::{Fixture, REPO};

    fn config(strategy: RuntimeStrategy, vendor_collateral: bool) -> VerifierConfig {
        VerifierConfig {
            runtime_strategy: strategy,
            vendor_collateral,
            ..VerifierConfig::default()
        }
    }

    fn engine(strategy: RuntimeStrategy) -> VerifierEngine {
        VerifierEngine::new(&config(strategy, false), Arc::new(StaticTransport::new()))
    }

    #[test]
    fn test_version_is_crate_version() {
        let engine = engine(RuntimeStrategy::NitroDocument);
        assert_eq!(engine.version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(engine.strategy(), RuntimeStrategy::NitroDocument);
    }

    #[tokio::test]
    async fn test_enclave_strategy_rejects_nitro_document() {
        let err = engine(RuntimeStrategy::EnclaveReport)
            .verify_runtime(b"hEShATgioFkQ")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }

    #[tokio::test]
    async fn test_nitro_strategy_rejects_enclave_report() {
        let raw = br#"{"format":"https://tinfoil.sh/predicate/sev-snp-guest/v2","body":"H4sI"}"#;
        let err = engine(RuntimeStrategy::NitroDocument)
            .verify_runtime(raw)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }

    #[tokio::test]
    async fn test_collateral_mode_rejects_tdx_quote() {
        let document = serde_json::json!({
            "format": "https://tinfoil.sh/predicate/tdx-guest/v2",
            "body": tdx::testing::encode(&tdx::testing::sample_quote()),
        });
        let engine = VerifierEngine::new(
            &config(RuntimeStrategy::EnclaveReport, true),
            Arc::new(StaticTransport::new()),
        );

        let err = engine.verify_runtime(document.to_string().as_bytes()).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)), "{}", err);
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }

    #[tokio::test]
    async fn test_provenance_rejects_garbage() {
        let digest = ExpectedDigest::parse(&"ab".repeat(32)).unwrap();
        let err = engine(RuntimeStrategy::NitroDocument)
            .with_trusted_root(Fixture::new().trusted_root())
            .verify_provenance(&digest, b"{}", "org/app")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }

    #[tokio::test]
    async fn test_provenance_fetches_trusted_root() {
        let fixture = Fixture::new();
        let digest = ExpectedDigest::parse(&"5e".repeat(32)).unwrap();
        let url = "https://trust.example.com/trusted_root.json";
        let transport =
            Arc::new(StaticTransport::new().with(url, 200, fixture.trusted_root_json()));
        let config = VerifierConfig {
            trusted_root: TrustedRootSource::Url(url.into()),
            ..config(RuntimeStrategy::NitroDocument, true)
        };
        let engine = VerifierEngine::new(&config, transport.clone());

        let bundle = fixture.bundle(digest.as_str()).to_string();
        let measurement = engine.verify_provenance(&digest, bundle.as_bytes(), REPO).await.unwrap();
        assert_eq!(measurement.registers.len(), 3);
        assert_eq!(transport.requests(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_trusted_root_fails_provenance() {
        let fixture = Fixture::new();
        let digest = ExpectedDigest::parse(&"5e".repeat(32)).unwrap();
        let config = VerifierConfig {
            trusted_root: TrustedRootSource::File("/nonexistent/trusted_root.json".into()),
            ..config(RuntimeStrategy::NitroDocument, true)
        };
        let engine = VerifierEngine::new(&config, Arc::new(StaticTransport::new()));

        let bundle = fixture.bundle(digest.as_str()).to_string();
        let err = engine.verify_provenance(&digest, bundle.as_bytes(), REPO).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read trusted root"));
    }
}
