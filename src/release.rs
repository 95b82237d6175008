//! Expected digest lookup
//!
//! The image digest a deployment should be running is published in the body
//! of the repository's latest GitHub release. Release notes have used more
//! than one label for it over time, so extraction walks an ordered rule list
//! and the first match wins.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::{emit, Event, EventSink};
use crate::fetch::HttpTransport;

/// Length of a hex-encoded SHA-256 digest
const DIGEST_HEX_LEN: usize = 64;

/// Hex-encoded image digest the runtime is expected to match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExpectedDigest(String);

impl ExpectedDigest {
    /// Accept a 64-character hex digest as given; case is preserved
    pub fn parse(digest: &str) -> Result<Self> {
        let digest = digest.trim();
        if digest.len() != DIGEST_HEX_LEN || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!(
                "expected a {}-character hex digest, got {:?}", DIGEST_HEX_LEN, digest
            )));
        }
        Ok(Self(digest.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The release a digest was taken from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedRelease {
    pub tag: String,
    pub digest: ExpectedDigest,
}

/// A labelled pattern whose first capture group is the digest
#[derive(Debug, Clone, Copy)]
pub struct DigestRule {
    pub label: &'static str,
    pub pattern: &'static str,
}

/// Extraction rules in priority order
pub const DIGEST_RULES: &[DigestRule] = &[
    DigestRule {
        label: "EIF hash",
        pattern: r"(?i)EIF hash: ([a-f0-9]{64})",
    },
    DigestRule {
        label: "Digest",
        pattern: r"Digest: `([a-f0-9]{64})`",
    },
];

static COMPILED_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DIGEST_RULES
        .iter()
        .filter_map(|rule| Regex::new(rule.pattern).ok().map(|re| (rule.label, re)))
        .collect()
});

/// Pull the image digest out of a release body
pub fn extract_digest(body: &str) -> Option<ExpectedDigest> {
    COMPILED_RULES.iter().find_map(|(label, re)| {
        let captured = re.captures(body)?.get(1)?.as_str();
        debug!(rule = label, "digest rule matched");
        Some(ExpectedDigest(captured.to_string()))
    })
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
}

/// Resolves the expected digest from a repository's latest release
pub struct ArtifactLocator {
    transport: Arc<dyn HttpTransport>,
    github_api: String,
}

impl ArtifactLocator {
    pub fn new(transport: Arc<dyn HttpTransport>, github_api: impl Into<String>) -> Self {
        Self {
            transport,
            github_api: github_api.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn release_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/releases/latest", self.github_api, repo)
    }

    /// Find the digest published in the latest release of `repo`
    pub async fn locate(&self, repo: &str, events: &dyn EventSink) -> Result<LocatedRelease> {
        validate_repo(repo)?;
        emit(events, Event::info(format!("Fetching latest release for {}", repo)));

        let url = self.release_url(repo);
        let response = self.transport.get(&url).await?;
        match response.status {
            200 => {}
            404 => return Err(Error::ReleaseNotFound(repo.to_string())),
            actual => {
                return Err(Error::UnexpectedStatus { url, expected: 200, actual });
            }
        }

        let release: ReleaseResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::malformed(&url, format!("invalid release descriptor: {}", e)))?;

        let digest = release.body
            .as_deref()
            .and_then(extract_digest)
            .ok_or_else(|| Error::DigestNotFound {
                repo: repo.to_string(),
                tag: release.tag_name.clone(),
            })?;

        emit(events, Event::info(format!("Found latest release {}", release.tag_name)));
        Ok(LocatedRelease {
            tag: release.tag_name,
            digest,
        })
    }
}

/// Repositories are `owner/name`
pub(crate) fn validate_repo(repo: &str) -> Result<()> {
    let valid = match repo.split_once('/') {
        Some((owner, name)) => {
            let part_ok = |s: &str| {
                !s.is_empty()
                    && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            };
            part_ok(owner) && part_ok(name)
        }
        None => false,
    };

    if !valid {
        return Err(Error::InvalidInput(format!("repository must be owner/name, got {:?}", repo)));
    }
    Ok(())
}
