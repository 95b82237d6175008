//! Artifact retrieval
//!
//! Fetches the two raw attestation artifacts a verification run compares:
//! the Sigstore bundle published for an image digest, and the enclave's
//! runtime attestation. Each endpoint has exactly one acceptable status code;
//! anything else is a hard failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::{emit, Event, EventSink, Pipeline};
use crate::release::ExpectedDigest;

/// Path of the runtime attestation on an enclave host
pub const ATTESTATION_PATH: &str = "/.well-known/tinfoil-attestation";

/// Status the attestations API answers with when a bundle exists
pub const PROVENANCE_STATUS: u16 = 200;

/// Status an enclave answers with when it has freshly issued an attestation.
/// A 200 here usually means a caching intermediary served a stored copy.
pub const RUNTIME_STATUS: u16 = 201;

/// Raw HTTP response; status codes are left for the caller to judge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// GET transport used for every network access
///
/// Implementations report network-level failures as [`Error::Transport`]
/// and must not interpret status codes.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// Production transport backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            // Redirects would turn an unexpected 3xx into a silent success
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::transport("client", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;

        let status = response.status().as_u16();
        let body = response.bytes()
            .await
            .map_err(|e| Error::transport(url, e))?;

        debug!(url, status, bytes = body.len(), "GET complete");
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[derive(Debug, Deserialize)]
struct AttestationResponse {
    attestations: Vec<AttestationEntry>,
}

#[derive(Debug, Deserialize)]
struct AttestationEntry {
    /// Exact bytes as served, key order and whitespace included
    bundle: Box<RawValue>,
}

/// Retrieves provenance bundles and runtime attestations
pub struct ArtifactFetcher {
    transport: Arc<dyn HttpTransport>,
    attestation_api: String,
}

impl ArtifactFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, attestation_api: impl Into<String>) -> Self {
        Self {
            transport,
            attestation_api: attestation_api.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL of the attestation records for `digest`
    pub fn bundle_url(&self, repo: &str, digest: &ExpectedDigest) -> String {
        format!("{}/repos/{}/attestations/sha256:{}", self.attestation_api, repo, digest)
    }

    /// URL of the runtime attestation served by `domain`
    pub fn attestation_url(domain: &str) -> Result<String> {
        validate_domain(domain)?;
        Ok(format!("https://{}{}", domain, ATTESTATION_PATH))
    }

    /// Fetch the Sigstore bundle for `digest`, returned as JSON bytes
    pub async fn fetch_provenance_bundle(
        &self,
        repo: &str,
        digest: &ExpectedDigest,
        events: &dyn EventSink,
    ) -> Result<Vec<u8>> {
        let url = self.bundle_url(repo, digest);
        emit(
            events,
            Event::info(format!("Fetching attestation bundle from {}", url))
                .in_pipeline(Pipeline::Provenance),
        );

        let response = self.get_expecting(&url, PROVENANCE_STATUS).await?;

        let records: AttestationResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::malformed(&url, format!("invalid attestation list: {}", e)))?;

        let first = records.attestations
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed(&url, "no attestations for digest"))?;

        Ok(first.bundle.get().as_bytes().to_vec())
    }

    /// Fetch the runtime attestation document served by `domain`
    pub async fn fetch_runtime_attestation(
        &self,
        domain: &str,
        events: &dyn EventSink,
    ) -> Result<Vec<u8>> {
        let url = Self::attestation_url(domain)?;
        emit(
            events,
            Event::info(format!("Fetching runtime attestation from {}", url))
                .in_pipeline(Pipeline::Runtime),
        );

        let response = self.get_expecting(&url, RUNTIME_STATUS).await?;
        Ok(response.body)
    }

    async fn get_expecting(&self, url: &str, expected: u16) -> Result<HttpResponse> {
        let response = self.transport.get(url).await?;
        if response.status != expected {
            return Err(Error::UnexpectedStatus {
                url: url.to_string(),
                expected,
                actual: response.status,
            });
        }
        Ok(response)
    }
}

/// Accept bare hostnames, optionally with a port
fn validate_domain(domain: &str) -> Result<()> {
    let invalid = domain.is_empty()
        || domain.chars().any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@' | '\\'));

    if invalid {
        return Err(Error::InvalidInput(format!("not a bare hostname: {:?}", domain)));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::StaticTransport;
    use super::*;
    use crate::error::ErrorKind;
    use crate::events::MemorySink;

    const API: &str = "https://api.github.com";

    fn digest() -> ExpectedDigest {
        ExpectedDigest::parse(&"ab".repeat(32)).unwrap()
    }

    fn fetcher(transport: StaticTransport) -> ArtifactFetcher {
        ArtifactFetcher::new(Arc::new(transport), format!("{}/", API))
    }

    #[test]
    fn test_bundle_url_is_deterministic() {
        let fetcher = fetcher(StaticTransport::new());
        assert_eq!(
            fetcher.bundle_url("org/app", &digest()),
            format!("{}/repos/org/app/attestations/sha256:{}", API, "ab".repeat(32))
        );
    }

    #[tokio::test]
    async fn test_provenance_returns_first_bundle() {
        let url = format!("{}/repos/org/app/attestations/sha256:{}", API, "ab".repeat(32));
        let body = r#"{"attestations":[{"bundle":{"n":1}},{"bundle":{"n":2}}]}"#;
        let fetcher = fetcher(StaticTransport::new().with(url, 200, body));
        let events = MemorySink::new();

        let bundle = fetcher.fetch_provenance_bundle("org/app", &digest(), &events).await.unwrap();
        assert_eq!(bundle, br#"{"n":1}"#.to_vec());
        assert_eq!(events.len(), 1);
        assert_eq!(events.events()[0].pipeline, Some(Pipeline::Provenance));
    }

    #[tokio::test]
    async fn test_provenance_bundle_bytes_are_untouched() {
        let url = format!("{}/repos/org/app/attestations/sha256:{}", API, "ab".repeat(32));
        let bundle = r#"{"mediaType": "application/vnd.dev.sigstore.bundle.v0.3+json",
            "dsseEnvelope": {"z": 1, "a": 2}}"#;
        let body = format!(r#"{{"attestations":[{{"bundle":{}}}]}}"#, bundle);
        let fetcher = fetcher(StaticTransport::new().with(url, 200, body));

        let fetched = fetcher.fetch_provenance_bundle("org/app", &digest(), &MemorySink::new())
            .await
            .unwrap();
        assert_eq!(fetched, bundle.as_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_provenance_requires_200() {
        for status in [201, 204, 302, 404, 500] {
            let url = format!("{}/repos/org/app/attestations/sha256:{}", API, "ab".repeat(32));
            let transport = StaticTransport::new().with(url, status, r#"{"attestations":[]}"#);
            let fetcher = fetcher(transport);

            let err = fetcher.fetch_provenance_bundle("org/app", &digest(), &MemorySink::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnexpectedStatus, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_provenance_empty_list_is_malformed() {
        let url = format!("{}/repos/org/app/attestations/sha256:{}", API, "ab".repeat(32));
        let fetcher = fetcher(StaticTransport::new().with(url, 200, r#"{"attestations":[]}"#));

        let err = fetcher.fetch_provenance_bundle("org/app", &digest(), &MemorySink::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_runtime_requires_201() {
        let url = "https://enclave.example.com/.well-known/tinfoil-attestation";
        let fetcher_ok = fetcher(StaticTransport::new().with(url, 201, "doc"));
        let body = fetcher_ok.fetch_runtime_attestation("enclave.example.com", &MemorySink::new())
            .await
            .unwrap();
        assert_eq!(body, b"doc".to_vec());

        // 200 looks like success but means the attestation was not freshly issued
        let fetcher_stale = fetcher(StaticTransport::new().with(url, 200, "doc"));
        let err = fetcher_stale.fetch_runtime_attestation("enclave.example.com", &MemorySink::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { expected: 201, actual: 200, .. }));
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let fetcher = fetcher(StaticTransport::new());
        let err = fetcher.fetch_runtime_attestation("unreachable.example.com", &MemorySink::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("unreachable.example.com"));
    }

    #[test]
    fn test_domain_validation() {
        assert!(ArtifactFetcher::attestation_url("enclave.example.com").is_ok());
        assert!(ArtifactFetcher::attestation_url("localhost:8443").is_ok());
        for bad in ["", "a/b", "host?x", "user@host", "host name"] {
            let err = ArtifactFetcher::attestation_url(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{:?}", bad);
        }
    }
}
