//! Sigstore trust material: Fulcio certificate authorities and Rekor logs
//!
//! Parsed from the public-good `trusted_root.json` distributed through the
//! Sigstore TUF repository. A bundle is trusted only when its signing
//! certificate chains to one of the authorities and one of its transparency
//! log entries carries a signed entry timestamp from one of the logs.

use std::time::Duration;

use base64::Engine;
use der::Decode;
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_cert::spki::SubjectPublicKeyInfoRef;

use crate::attestation::certs::ParsedCert;
use crate::error::{Error, Result};
use super::{decode_b64, sigstore_error, TlogEntry};

/// `trusted_root.json` published in the Sigstore root-signing repository
pub const SIGSTORE_TRUSTED_ROOT_URL: &str =
    "https://raw.githubusercontent.com/sigstore/root-signing/main/targets/trusted_root.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustedRootJson {
    #[serde(default)]
    certificate_authorities: Vec<AuthorityJson>,
    #[serde(default)]
    tlogs: Vec<TlogJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorityJson {
    #[serde(default)]
    uri: String,
    cert_chain: CertChainJson,
}

#[derive(Debug, Deserialize)]
struct CertChainJson {
    certificates: Vec<RawBytesJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBytesJson {
    raw_bytes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TlogJson {
    #[serde(default)]
    base_url: String,
    public_key: RawBytesJson,
    log_id: KeyIdJson,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyIdJson {
    key_id: String,
}

#[derive(Debug, Clone)]
struct CertificateAuthority {
    uri: String,
    /// Issuing certificate first, self-signed root last
    chain: Vec<ParsedCert>,
}

#[derive(Debug, Clone)]
struct TransparencyLog {
    base_url: String,
    key_id: Vec<u8>,
    key: VerifyingKey,
}

/// Fulcio authorities and Rekor log keys a bundle may be anchored in
#[derive(Debug, Clone)]
pub struct TrustedRoot {
    authorities: Vec<CertificateAuthority>,
    logs: Vec<TransparencyLog>,
}

/// Payload of a Rekor signed entry timestamp; fields are in canonical (sorted) order
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedEntry<'a> {
    body: &'a str,
    integrated_time: i64,
    #[serde(rename = "logID")]
    log_id: String,
    log_index: i64,
}

impl TrustedRoot {
    /// Parse a Sigstore `trusted_root.json` document
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let root: TrustedRootJson = serde_json::from_slice(raw)
            .map_err(|e| Error::SigstoreVerification(format!("Invalid trusted root: {}", e)))?;

        let authorities = root.certificate_authorities
            .iter()
            .map(CertificateAuthority::parse)
            .collect::<Result<Vec<_>>>()?;
        let logs = root.tlogs
            .iter()
            .map(TransparencyLog::parse)
            .collect::<Result<Vec<_>>>()?;

        if authorities.is_empty() {
            return Err(Error::SigstoreVerification(
                "Trusted root has no certificate authority".into(),
            ));
        }
        if logs.is_empty() {
            return Err(Error::SigstoreVerification("Trusted root has no transparency log".into()));
        }

        Ok(Self { authorities, logs })
    }

    pub fn authority_uris(&self) -> impl Iterator<Item = &str> {
        self.authorities.iter().map(|a| a.uri.as_str())
    }

    pub fn log_urls(&self) -> impl Iterator<Item = &str> {
        self.logs.iter().map(|l| l.base_url.as_str())
    }

    /// Check the signing certificate chains to a trusted authority at `signed_at`
    pub(super) fn verify_signing_certificate(
        &self,
        leaf: &ParsedCert,
        signed_at: Duration,
    ) -> Result<()> {
        leaf.check_validity(signed_at, "signing")
            .map_err(|_| Error::SigstoreVerification(
                "Signing certificate was not valid when the entry was logged".into(),
            ))?;

        let mut reasons = Vec::new();
        for authority in &self.authorities {
            match authority.verify(leaf, signed_at) {
                Ok(()) => return Ok(()),
                Err(e) => reasons.push(format!("{}: {}", authority.uri, e)),
            }
        }

        Err(Error::SigstoreVerification(format!(
            "Signing certificate does not chain to a trusted authority ({})",
            reasons.join("; ")
        )))
    }

    /// Find a log entry signed by a trusted log that records `payload` signed by `leaf_der`
    ///
    /// Returns the entry's integration time.
    pub(super) fn verify_log_entries(
        &self,
        entries: &[TlogEntry],
        payload: &[u8],
        leaf_der: &[u8],
    ) -> Result<Duration> {
        let mut last_error = None;
        for entry in entries {
            match self.verify_log_entry(entry, payload, leaf_der) {
                Ok(integrated) => return Ok(integrated),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::SigstoreVerification("Bundle has no transparency log entry".into())
        }))
    }

    fn verify_log_entry(
        &self,
        entry: &TlogEntry,
        payload: &[u8],
        leaf_der: &[u8],
    ) -> Result<Duration> {
        let key_id = decode_b64(&entry.log_id.key_id, "log id")?;
        let log = self.logs
            .iter()
            .find(|log| log.key_id == key_id)
            .ok_or_else(|| Error::SigstoreVerification(format!(
                "Entry from unknown transparency log {}", hex::encode(&key_id)
            )))?;

        let promise = entry.inclusion_promise
            .as_ref()
            .ok_or_else(|| {
                Error::SigstoreVerification("Log entry has no inclusion promise".into())
            })?;
        let set = decode_b64(&promise.signed_entry_timestamp, "signed entry timestamp")?;
        let signature = Signature::from_der(&set)
            .map_err(|e| {
                Error::SigstoreVerification(format!("Invalid signed entry timestamp: {}", e))
            })?;

        let signed = serde_json::to_vec(&SignedEntry {
            body: &entry.canonicalized_body,
            integrated_time: entry.integrated_time,
            log_id: hex::encode(&key_id),
            log_index: entry.log_index,
        })?;
        log.key
            .verify(&signed, &signature)
            .map_err(|e| Error::SigstoreVerification(format!(
                "Signed entry timestamp verification failed: {}", e
            )))?;

        let body = decode_b64(&entry.canonicalized_body, "log entry body")?;
        verify_entry_body(&body, payload, leaf_der)?;

        u64::try_from(entry.integrated_time)
            .map(Duration::from_secs)
            .map_err(|_| Error::SigstoreVerification("Negative integration time".into()))
    }
}

impl CertificateAuthority {
    fn parse(json: &AuthorityJson) -> Result<Self> {
        let chain = json.cert_chain.certificates
            .iter()
            .map(|raw| {
                let der = decode_b64(&raw.raw_bytes, "authority certificate")?;
                ParsedCert::from_der(&der, "authority certificate").map_err(sigstore_error)
            })
            .collect::<Result<Vec<_>>>()?;

        match chain.last() {
            Some(root) if root.is_self_issued() => Ok(Self { uri: json.uri.clone(), chain }),
            Some(_) => Err(Error::SigstoreVerification(format!(
                "Authority {} chain does not end in a self-signed root", json.uri
            ))),
            None => Err(Error::SigstoreVerification(format!(
                "Authority {} has an empty certificate chain", json.uri
            ))),
        }
    }

    /// Walk leaf → issuing CA → ... → root
    fn verify(&self, leaf: &ParsedCert, at: Duration) -> Result<()> {
        let mut child = leaf;
        for issuer in &self.chain {
            if !child.issued_by(issuer) {
                return Err(Error::SigstoreVerification("issuer name mismatch".into()));
            }
            child.verify_ecdsa_signed_by(issuer, "certificate").map_err(sigstore_error)?;
            issuer.check_validity(at, "authority").map_err(sigstore_error)?;
            child = issuer;
        }
        child.verify_ecdsa_signed_by(child, "root").map_err(sigstore_error)
    }
}

impl TransparencyLog {
    fn parse(json: &TlogJson) -> Result<Self> {
        let spki_der = decode_b64(&json.public_key.raw_bytes, "log public key")?;
        let spki = SubjectPublicKeyInfoRef::from_der(&spki_der)
            .map_err(|e| Error::SigstoreVerification(format!("Invalid log public key: {}", e)))?;
        let key = VerifyingKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
            .map_err(|e| Error::SigstoreVerification(format!(
                "Unsupported log key for {}: {}", json.base_url, e
            )))?;

        Ok(Self {
            base_url: json.base_url.clone(),
            key_id: decode_b64(&json.log_id.key_id, "log id")?,
            key,
        })
    }
}

/// The logged entry must record this payload, signed with the bundle's certificate
fn verify_entry_body(body: &[u8], payload: &[u8], leaf_der: &[u8]) -> Result<()> {
    let body: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| Error::SigstoreVerification(format!("Invalid log entry body: {}", e)))?;

    let (hash_pointer, signatures_pointer, key_field) = match body["kind"].as_str() {
        Some("dsse") => ("/spec/payloadHash/value", "/spec/signatures", "verifier"),
        Some("intoto") => (
            "/spec/content/payloadHash/value",
            "/spec/content/envelope/signatures",
            "publicKey",
        ),
        other => {
            return Err(Error::SigstoreVerification(format!(
                "Unsupported log entry kind {:?}", other
            )));
        }
    };

    let recorded = body.pointer(hash_pointer)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::SigstoreVerification("Log entry has no payload hash".into()))?;
    if !recorded.eq_ignore_ascii_case(&hex::encode(Sha256::digest(payload))) {
        return Err(Error::SigstoreVerification("Log entry records a different payload".into()));
    }

    let signed_by_leaf = body.pointer(signatures_pointer)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|signature| signature[key_field].as_str())
        .any(|encoded| verifier_matches(encoded, leaf_der));
    if !signed_by_leaf {
        return Err(Error::SigstoreVerification(
            "Log entry was not signed with the bundle certificate".into(),
        ));
    }

    Ok(())
}

/// Rekor stores verifiers as base64 of a PEM certificate
fn verifier_matches(encoded: &str, leaf_der: &[u8]) -> bool {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()
        .and_then(|pem_bytes| pem::parse(pem_bytes).ok())
        .is_some_and(|pem| pem.contents() == leaf_der)
}
