//! Error types for the verifier

use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("Unexpected HTTP status from {url}: expected {expected}, got {actual}")]
    UnexpectedStatus {
        url: String,
        expected: u16,
        actual: u16,
    },

    #[error("No published release found for {0}")]
    ReleaseNotFound(String),

    #[error("No image digest found in release {tag} of {repo}")]
    DigestNotFound { repo: String, tag: String },

    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Attestation verification failed: {0}")]
    AttestationVerification(String),

    #[error("Sigstore verification failed: {0}")]
    SigstoreVerification(String),

    #[error("Unsupported attestation format: {0}")]
    UnsupportedFormat(String),

    #[error("Verifier engine version mismatch: requested {requested}, loaded {loaded}")]
    EngineVersionMismatch { requested: String, loaded: String },
}

impl Error {
    /// Network-level failure while talking to `url`
    pub fn transport(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    pub(crate) fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Coarse category of the error, stable across message wording changes
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            Error::ReleaseNotFound(_) => ErrorKind::ReleaseNotFound,
            Error::DigestNotFound { .. } => ErrorKind::DigestNotFound,
            Error::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Json(_)
            | Error::Base64(_)
            | Error::AttestationVerification(_)
            | Error::SigstoreVerification(_)
            | Error::UnsupportedFormat(_) => ErrorKind::Extraction,
            Error::EngineVersionMismatch { .. } => ErrorKind::EngineVersionMismatch,
        }
    }
}

/// Error categories recorded in verification outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    UnexpectedStatus,
    ReleaseNotFound,
    DigestNotFound,
    MalformedResponse,
    InvalidInput,
    /// The verification engine rejected an artifact
    Extraction,
    EngineVersionMismatch,
}

pub type Result<T> = std::result::Result<T, Error>;
