//! # Tinfoil Verifier
//!
//! Establishes trust in a confidential-computing deployment by cross-checking
//! two independently rooted attestations of the same enclave image.
//!
//! ## Cross-Verification
//!
//! ### Expected digest
//! - Fetches the latest GitHub release of the source repository
//! - Extracts the published image digest from the release notes
//!   (`EIF hash: …`, falling back to ``Digest: `…` ``)
//!
//! ### Provenance pipeline (Sigstore)
//! - Fetches the Sigstore bundle attesting to the digest
//! - Checks its Rekor entry and Fulcio certificate chain against the Sigstore
//!   trusted root
//! - Verifies the DSSE signature with the Fulcio certificate's P-256 key
//! - Checks the certificate was issued to GitHub Actions for the repository
//! - Extracts the source measurement from the signed in-toto statement
//!
//! ### Runtime pipeline (hardware)
//! - Fetches `/.well-known/tinfoil-attestation` from the enclave (HTTP 201 only)
//! - Verifies an AWS Nitro attestation document or an SEV-SNP report (TDX
//!   quotes only structurally, when vendor collateral is disabled)
//! - Extracts the enclave measurement and attested TLS key fingerprint
//!
//! ### Adjudication
//! Both pipelines run concurrently and always to completion. Equal
//! measurements yield `Verified`, different ones `Mismatched`; any pipeline
//! error yields `Failed` with the outcome of both sides.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tinfoil_verifier::{CrossVerifier, MemorySink, VerifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let verifier = CrossVerifier::from_config(VerifierConfig::default())?;
//!     let events = MemorySink::new();
//!
//!     let outcome = verifier.verify("org/app", "app.example.com", &events).await;
//!     for event in events.events() {
//!         println!("{}", event);
//!     }
//!     assert!(outcome.is_verified());
//!     Ok(())
//! }
//! ```

pub mod attestation;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetch;
pub mod release;
pub mod sigstore;
pub mod verifier;

pub use config::{RuntimeStrategy, TrustedRootSource, VerifierConfig};
pub use engine::{MeasurementExtractor, VerifierEngine};
pub use error::{Error, ErrorKind, Result};
pub use events::{Event, EventSink, MemorySink, NullSink};
pub use fetch::{ArtifactFetcher, HttpResponse, HttpTransport, ReqwestTransport};
pub use release::{ArtifactLocator, ExpectedDigest, LocatedRelease};
pub use sigstore::TrustedRoot;
pub use verifier::{
    CrossVerifier, Failure, FailureReason, PipelineReport, VerificationOutcome, VerificationState,
    VerificationStatus,
};
