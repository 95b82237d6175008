//! Cross-verification of provenance and runtime attestations
//!
//! A run resolves the expected image digest, then drives two independent
//! pipelines concurrently:
//!
//! - **provenance**: fetch the Sigstore bundle for the digest and verify it
//! - **runtime**: fetch the enclave's attestation and verify it
//!
//! Both pipelines always run to completion before the measurements are
//! compared, so a failure on one side never hides the other side's result.
//! Nothing is cached between runs.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info_span, Instrument};

use crate::attestation::{Measurement, Verification};
use crate::config::VerifierConfig;
use crate::engine::{MeasurementExtractor, VerifierEngine};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{emit, Event, EventSink, Pipeline};
use crate::fetch::{ArtifactFetcher, HttpTransport, ReqwestTransport};
use crate::release::{validate_repo, ArtifactLocator, ExpectedDigest, LocatedRelease};

/// Progress of a verification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Idle,
    LocatingDigest,
    FetchingArtifacts,
    Adjudicating,
    Verified,
    Mismatched,
    Failed,
}

impl VerificationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Mismatched | Self::Failed)
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LocatingDigest => "locating digest",
            Self::FetchingArtifacts => "fetching artifacts",
            Self::Adjudicating => "adjudicating",
            Self::Verified => "verified",
            Self::Mismatched => "mismatched",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A recorded error: its category and rendered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// How one pipeline ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineReport {
    Succeeded { measurement: String },
    Failed(Failure),
}

impl PipelineReport {
    fn from_result<T>(
        result: &std::result::Result<T, Failure>,
        measurement: impl Fn(&T) -> String,
    ) -> Self {
        match result {
            Ok(value) => PipelineReport::Succeeded { measurement: measurement(value) },
            Err(failure) => PipelineReport::Failed(failure.clone()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PipelineReport::Failed(_))
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineReport::Succeeded { measurement } => write!(f, "succeeded ({})", measurement),
            PipelineReport::Failed(failure) => write!(f, "failed: {}", failure),
        }
    }
}

/// Why a run ended in [`VerificationStatus::Failed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The expected digest could not be determined; no artifact was fetched
    Locate(Failure),
    /// At least one pipeline failed; both outcomes are kept
    Pipelines {
        provenance: PipelineReport,
        runtime: PipelineReport,
    },
}

impl FailureReason {
    /// Kinds of every failure contained in the reason
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self {
            FailureReason::Locate(failure) => vec![failure.kind],
            FailureReason::Pipelines { provenance, runtime } => [provenance, runtime]
                .into_iter()
                .filter_map(|report| match report {
                    PipelineReport::Failed(failure) => Some(failure.kind),
                    PipelineReport::Succeeded { .. } => None,
                })
                .collect(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Locate(failure) => write!(f, "{}", failure),
            FailureReason::Pipelines { provenance, runtime } => {
                write!(f, "provenance pipeline {}; runtime pipeline {}", provenance, runtime)
            }
        }
    }
}

/// Terminal verdict of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    /// Both sides verified but disagree: the enclave is not running the attested image
    Mismatched { detail: String },
    Failed(FailureReason),
}

impl VerificationStatus {
    pub fn state(&self) -> VerificationState {
        match self {
            VerificationStatus::Verified => VerificationState::Verified,
            VerificationStatus::Mismatched { .. } => VerificationState::Mismatched,
            VerificationStatus::Failed(_) => VerificationState::Failed,
        }
    }
}

/// Result of one verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub repository: String,
    pub domain: String,
    /// Release the digest came from; absent for manually supplied digests
    pub release: Option<LocatedRelease>,
    pub expected_digest: Option<ExpectedDigest>,
    pub provenance_measurement: Option<Measurement>,
    pub runtime_measurement: Option<Measurement>,
    /// TLS key fingerprint bound in the runtime attestation
    pub certificate_fingerprint: Option<String>,
    pub bundle_url: Option<String>,
    pub attestation_url: Option<String>,
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Compare two verified measurements
pub fn adjudicate(provenance: &Measurement, runtime: &Measurement) -> VerificationStatus {
    match provenance.equals(runtime) {
        Ok(()) => VerificationStatus::Verified,
        Err(e) => VerificationStatus::Mismatched { detail: e.to_string() },
    }
}

type PipelineResult<T> = std::result::Result<T, Failure>;

/// Orchestrates digest lookup, both pipelines and adjudication
pub struct CrossVerifier {
    config: VerifierConfig,
    transport: Arc<dyn HttpTransport>,
    locator: ArtifactLocator,
    fetcher: ArtifactFetcher,
    engine: Arc<dyn MeasurementExtractor>,
}

impl CrossVerifier {
    pub fn new(
        config: VerifierConfig,
        transport: Arc<dyn HttpTransport>,
        engine: Arc<dyn MeasurementExtractor>,
    ) -> Self {
        Self {
            locator: ArtifactLocator::new(Arc::clone(&transport), config.github_api.clone()),
            fetcher: ArtifactFetcher::new(Arc::clone(&transport), config.attestation_api.clone()),
            config,
            transport,
            engine,
        }
    }

    /// Build a verifier with the reqwest transport and the bundled engine
    pub fn from_config(config: VerifierConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.timeout, &config.user_agent)?);
        let engine = Arc::new(VerifierEngine::new(&config, Arc::clone(&transport)));
        Ok(Self::new(config, transport, engine))
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify `domain` against the digest in the latest release of `repository`
    pub async fn verify(
        &self,
        repository: &str,
        domain: &str,
        events: &dyn EventSink,
    ) -> VerificationOutcome {
        let span = info_span!("verify", repository, domain);
        async {
            self.check_engine_version(events).await;

            transition(events, VerificationState::LocatingDigest);
            let located = self.locator.locate(repository, events).await;
            let (release, digest) = match located {
                Ok(release) => {
                    let digest = release.digest.clone();
                    (Some(release), digest)
                }
                Err(e) => return finish_locate_failure(repository, domain, &e, events),
            };

            self.run_pipelines(repository, domain, release, digest, events).await
        }
        .instrument(span)
        .await
    }

    /// Verify `domain` against a caller-supplied digest, skipping release lookup
    pub async fn verify_digest(
        &self,
        repository: &str,
        digest: &str,
        domain: &str,
        events: &dyn EventSink,
    ) -> VerificationOutcome {
        let span = info_span!("verify_digest", repository, domain);
        async {
            self.check_engine_version(events).await;

            transition(events, VerificationState::LocatingDigest);
            let parsed = validate_repo(repository).and_then(|()| ExpectedDigest::parse(digest));
            let digest = match parsed {
                Ok(digest) => digest,
                Err(e) => return finish_locate_failure(repository, domain, &e, events),
            };
            emit(events, Event::info(format!("Using supplied digest {}", digest)));

            self.run_pipelines(repository, domain, None, digest, events).await
        }
        .instrument(span)
        .await
    }

    async fn run_pipelines(
        &self,
        repository: &str,
        domain: &str,
        release: Option<LocatedRelease>,
        digest: ExpectedDigest,
        events: &dyn EventSink,
    ) -> VerificationOutcome {
        emit(events, Event::info(format!("Verifying {} against digest {}", domain, digest)));
        transition(events, VerificationState::FetchingArtifacts);

        let (provenance, runtime) = tokio::join!(
            self.provenance_pipeline(repository, &digest, events),
            self.runtime_pipeline(domain, events),
        );

        transition(events, VerificationState::Adjudicating);

        let status = match (&provenance, &runtime) {
            (Ok(source), Ok(enclave)) => adjudicate(source, &enclave.measurement),
            _ => VerificationStatus::Failed(FailureReason::Pipelines {
                provenance: PipelineReport::from_result(&provenance, |m| m.fingerprint()),
                runtime: PipelineReport::from_result(&runtime, |v| v.measurement.fingerprint()),
            }),
        };

        let runtime = runtime.ok();
        let outcome = VerificationOutcome {
            status,
            repository: repository.to_string(),
            domain: domain.to_string(),
            release,
            bundle_url: Some(self.fetcher.bundle_url(repository, &digest)),
            attestation_url: ArtifactFetcher::attestation_url(domain).ok(),
            expected_digest: Some(digest),
            provenance_measurement: provenance.ok(),
            certificate_fingerprint: runtime.as_ref().and_then(|v| v.tls_public_key_fp.clone()),
            runtime_measurement: runtime.map(|v| v.measurement),
        };

        summarize(&outcome, events);
        outcome
    }

    async fn provenance_pipeline(
        &self,
        repository: &str,
        digest: &ExpectedDigest,
        events: &dyn EventSink,
    ) -> PipelineResult<Measurement> {
        let result = async {
            let bundle = self.fetcher.fetch_provenance_bundle(repository, digest, events).await?;
            emit(
                events,
                Event::info("Verifying sigstore signature").in_pipeline(Pipeline::Provenance),
            );
            self.engine.verify_provenance(digest, &bundle, repository).await
        }
        .await;

        match result {
            Ok(measurement) => {
                emit(
                    events,
                    Event::info(format!("Provenance measurement: {}", measurement))
                        .in_pipeline(Pipeline::Provenance),
                );
                Ok(measurement)
            }
            Err(e) => Err(pipeline_failure(Pipeline::Provenance, &e, events)),
        }
    }

    async fn runtime_pipeline(
        &self,
        domain: &str,
        events: &dyn EventSink,
    ) -> PipelineResult<Verification> {
        let result = async {
            let document = self.fetcher.fetch_runtime_attestation(domain, events).await?;
            emit(
                events,
                Event::info("Verifying runtime attestation").in_pipeline(Pipeline::Runtime),
            );
            self.engine.verify_runtime(&document).await
        }
        .await;

        match result {
            Ok(verification) => {
                emit(
                    events,
                    Event::info(format!("Runtime measurement: {}", verification.measurement))
                        .in_pipeline(Pipeline::Runtime),
                );
                if let Some(fp) = &verification.tls_public_key_fp {
                    emit(
                        events,
                        Event::info(format!("Attested certificate fingerprint: {}", fp))
                            .in_pipeline(Pipeline::Runtime),
                    );
                }
                Ok(verification)
            }
            Err(e) => Err(pipeline_failure(Pipeline::Runtime, &e, events)),
        }
    }

    /// Compare the engine's version with the requested tag; never fatal
    async fn check_engine_version(&self, events: &dyn EventSink) {
        let Some(url) = self.config.engine_tag_url.as_deref() else {
            return;
        };

        let requested = match self.transport.get(url).await {
            Ok(response) if response.status == 200 => {
                String::from_utf8_lossy(&response.body).trim().to_string()
            }
            Ok(response) => {
                emit(
                    events,
                    Event::warning(format!(
                        "Could not fetch engine version tag from {}: status {}",
                        url, response.status
                    )),
                );
                return;
            }
            Err(e) => {
                emit(events, Event::warning(format!("Could not fetch engine version tag: {}", e)));
                return;
            }
        };

        let loaded = self.engine.version();
        if requested.trim_start_matches('v') == loaded.trim_start_matches('v') {
            debug!(version = loaded, "engine version matches");
            return;
        }

        // TODO: decide with product whether a version mismatch should abort the run
        let mismatch = Error::EngineVersionMismatch {
            requested,
            loaded: loaded.to_string(),
        };
        emit(events, Event::warning(mismatch.to_string()));
    }
}

fn transition(events: &dyn EventSink, state: VerificationState) {
    debug!(%state, "state transition");
    let message = match state {
        VerificationState::LocatingDigest => "Locating expected digest",
        VerificationState::FetchingArtifacts => "Fetching attestation artifacts",
        VerificationState::Adjudicating => "Comparing measurements",
        // Terminal states are reported by the summary event
        _ => return,
    };
    emit(events, Event::info(message));
}

fn pipeline_failure(pipeline: Pipeline, err: &Error, events: &dyn EventSink) -> Failure {
    emit(events, Event::error(err.to_string()).in_pipeline(pipeline));
    Failure::from(err)
}

fn finish_locate_failure(
    repository: &str,
    domain: &str,
    err: &Error,
    events: &dyn EventSink,
) -> VerificationOutcome {
    let outcome = VerificationOutcome {
        status: VerificationStatus::Failed(FailureReason::Locate(Failure::from(err))),
        repository: repository.to_string(),
        domain: domain.to_string(),
        release: None,
        expected_digest: None,
        provenance_measurement: None,
        runtime_measurement: None,
        certificate_fingerprint: None,
        bundle_url: None,
        attestation_url: None,
    };
    summarize(&outcome, events);
    outcome
}

/// Emit the single terminal event of a run
fn summarize(outcome: &VerificationOutcome, events: &dyn EventSink) {
    let show = |m: &Option<Measurement>| {
        m.as_ref()
            .map_or_else(|| "unavailable".to_string(), |m| m.fingerprint())
    };

    let event = match &outcome.status {
        VerificationStatus::Verified => Event::info(format!(
            "Verification successful: source and enclave measurements match ({})",
            show(&outcome.runtime_measurement)
        )),
        VerificationStatus::Mismatched { detail } => Event::error(format!(
            "Verification failed: measurements do not match ({}; source {}, enclave {})",
            detail,
            show(&outcome.provenance_measurement),
            show(&outcome.runtime_measurement)
        )),
        VerificationStatus::Failed(reason) => {
            Event::error(format!("Verification failed: {}", reason))
        }
    };
    debug!(state = %outcome.status.state(), "run finished");
    emit(events, event);
}
