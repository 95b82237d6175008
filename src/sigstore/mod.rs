//! Sigstore provenance verification
//!
//! A provenance bundle proves that a GitHub Actions workflow in the expected
//! repository built the image with the expected digest. Verification:
//! 1. Parse the bundle and its Fulcio leaf certificate
//! 2. Find a transparency log entry whose signed entry timestamp verifies
//!    under a trusted Rekor key and which records this envelope's payload
//!    signed with this certificate
//! 3. Chain the certificate to a trusted Fulcio root, valid at the time
//!    the entry was logged
//! 4. Verify the DSSE envelope signature (P-256) over the PAE encoding
//! 5. Check the certificate identity: GitHub Actions issuer, matching repository
//! 6. Check the in-toto statement's subject digest is the expected digest
//! 7. Extract the measurement from the statement's predicate

mod trust;

pub use trust::{TrustedRoot, SIGSTORE_TRUSTED_ROOT_URL};

use base64::Engine;
use der::asn1::{Ia5StringRef, Utf8StringRef};
use der::Decode;
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use crate::attestation::certs::ParsedCert;
use crate::attestation::types::{Measurement, PredicateType};
use crate::error::{Error, Result};
use crate::release::ExpectedDigest;

/// OIDC issuer of GitHub Actions workload identities
pub const GITHUB_ACTIONS_ISSUER: &str = "https://token.actions.githubusercontent.com";

const OID_ISSUER_V1: &str = "1.3.6.1.4.1.57264.1.1";
const OID_ISSUER_V2: &str = "1.3.6.1.4.1.57264.1.8";
const OID_BUILD_SIGNER_URI: &str = "1.3.6.1.4.1.57264.1.9";
const OID_SOURCE_REPOSITORY_URI: &str = "1.3.6.1.4.1.57264.1.12";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bundle {
    verification_material: VerificationMaterial,
    dsse_envelope: DsseEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationMaterial {
    #[serde(default)]
    certificate: Option<RawCertificate>,
    #[serde(default)]
    x509_certificate_chain: Option<CertificateChain>,
    #[serde(default)]
    tlog_entries: Vec<TlogEntry>,
}

/// Rekor entry as embedded in a bundle; 64-bit integers arrive as JSON strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TlogEntry {
    #[serde(deserialize_with = "int_or_string")]
    log_index: i64,
    log_id: LogId,
    #[serde(deserialize_with = "int_or_string")]
    integrated_time: i64,
    #[serde(default)]
    inclusion_promise: Option<InclusionPromise>,
    canonicalized_body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogId {
    key_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InclusionPromise {
    signed_entry_timestamp: String,
}

fn int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(value) => Ok(value),
        IntOrString::Str(value) => value.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct CertificateChain {
    certificates: Vec<RawCertificate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCertificate {
    raw_bytes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DsseEnvelope {
    payload: String,
    payload_type: String,
    signatures: Vec<DsseSignature>,
}

#[derive(Debug, Deserialize)]
struct DsseSignature {
    sig: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InTotoStatement {
    predicate_type: String,
    #[serde(default)]
    predicate: serde_json::Value,
    subject: Vec<Subject>,
}

#[derive(Debug, Deserialize)]
struct Subject {
    #[serde(default)]
    digest: std::collections::HashMap<String, String>,
}

/// Identity claims of a Fulcio signing certificate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateIdentity {
    pub issuer: String,
    pub build_signer_uri: String,
    pub source_repository_uri: String,
}

/// Provenance measurement along with the signer it was verified against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProvenance {
    pub measurement: Measurement,
    pub identity: CertificateIdentity,
    /// SHA-256 of the signing certificate
    pub certificate_fingerprint: String,
}

/// Verify a Sigstore bundle for `expected_digest` signed from `repo`
///
/// The bundle must be anchored in `trusted_root`: logged by one of its
/// transparency logs and signed with a certificate from one of its authorities.
pub fn verify_bundle(
    bundle: &[u8],
    expected_digest: &ExpectedDigest,
    repo: &str,
    trusted_root: &TrustedRoot,
) -> Result<VerifiedProvenance> {
    let bundle: Bundle = serde_json::from_slice(bundle)
        .map_err(|e| Error::SigstoreVerification(format!("Failed to parse bundle: {}", e)))?;

    let cert_der = leaf_certificate(&bundle.verification_material)?;
    let leaf = ParsedCert::from_der(&cert_der, "certificate").map_err(sigstore_error)?;

    let payload = decode_b64(&bundle.dsse_envelope.payload, "payload")?;
    let logged_at = trusted_root.verify_log_entries(
        &bundle.verification_material.tlog_entries,
        &payload,
        &cert_der,
    )?;
    trusted_root.verify_signing_certificate(&leaf, logged_at)?;

    verify_dsse_signature(&leaf.cert, &bundle.dsse_envelope, &payload)?;

    let identity = certificate_identity(&leaf.cert);
    verify_certificate_identity(&identity, repo)?;

    let statement: InTotoStatement = serde_json::from_slice(&payload)
        .map_err(|e| Error::SigstoreVerification(format!("Failed to parse statement: {}", e)))?;
    verify_subject(&statement, expected_digest)?;

    Ok(VerifiedProvenance {
        measurement: measurement_from_statement(&statement)?,
        identity,
        certificate_fingerprint: hex::encode(Sha256::digest(&cert_der)),
    })
}

fn decode_b64(value: &str, what: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| Error::SigstoreVerification(format!("Failed to decode {}: {}", what, e)))
}

/// Certificate helpers report attestation errors; provenance reports its own
fn sigstore_error(err: Error) -> Error {
    match err {
        Error::AttestationVerification(reason) => Error::SigstoreVerification(reason),
        other => other,
    }
}

fn leaf_certificate(material: &VerificationMaterial) -> Result<Vec<u8>> {
    let raw = material.certificate
        .as_ref()
        .or_else(|| material.x509_certificate_chain.as_ref().and_then(|c| c.certificates.first()))
        .ok_or_else(|| Error::SigstoreVerification("No certificate in bundle".into()))?;
    decode_b64(&raw.raw_bytes, "certificate")
}

/// Compute the DSSE pre-authentication encoding
///
/// `"DSSEv1" SP LEN(type) SP type SP LEN(body) SP body`, lengths in ASCII decimal.
fn compute_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!("DSSEv1 {} {} {} ", payload_type.len(), payload_type, payload.len());
    let mut pae = Vec::with_capacity(header.len() + payload.len());
    pae.extend_from_slice(header.as_bytes());
    pae.extend_from_slice(payload);
    pae
}

fn verify_dsse_signature(
    cert: &Certificate,
    envelope: &DsseEnvelope,
    payload: &[u8],
) -> Result<()> {
    let key_bytes = cert.tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();

    // Fulcio issues P-256 leaf keys
    let verifying_key = VerifyingKey::from_sec1_bytes(key_bytes)
        .map_err(|e| Error::SigstoreVerification(format!("Invalid public key: {}", e)))?;

    let encoded = envelope.signatures
        .first()
        .ok_or_else(|| Error::SigstoreVerification("No signature".into()))?;
    let sig_bytes = decode_b64(&encoded.sig, "signature")?;

    // DER (SEQUENCE tag) or raw r||s
    let signature = if sig_bytes.first() == Some(&0x30) {
        Signature::from_der(&sig_bytes)
    } else {
        Signature::from_slice(&sig_bytes)
    }
    .map_err(|e| Error::SigstoreVerification(format!("Invalid signature encoding: {}", e)))?;

    let pae = compute_pae(&envelope.payload_type, payload);
    verifying_key.verify(&pae, &signature)
        .map_err(|e| {
            Error::SigstoreVerification(format!("DSSE signature verification failed: {}", e))
        })
}

/// Read the Fulcio identity extensions from a certificate
pub fn certificate_identity(cert: &Certificate) -> CertificateIdentity {
    let mut identity = CertificateIdentity::default();
    let mut legacy_issuer = None;

    for ext in cert.tbs_certificate.extensions.iter().flatten() {
        let value = ext.extn_value.as_bytes();
        match ext.extn_id.to_string().as_str() {
            OID_ISSUER_V1 => legacy_issuer = Some(extension_string(value)),
            OID_ISSUER_V2 => identity.issuer = extension_string(value),
            OID_BUILD_SIGNER_URI => identity.build_signer_uri = extension_string(value),
            OID_SOURCE_REPOSITORY_URI => identity.source_repository_uri = extension_string(value),
            _ => {}
        }
    }

    if identity.issuer.is_empty() {
        identity.issuer = legacy_issuer.unwrap_or_default();
    }
    identity
}

/// Newer Fulcio extensions are DER strings; the original issuer extension is raw text
fn extension_string(value: &[u8]) -> String {
    if let Ok(s) = Utf8StringRef::from_der(value) {
        return s.as_str().to_string();
    }
    if let Ok(s) = Ia5StringRef::from_der(value) {
        return s.as_str().to_string();
    }
    String::from_utf8_lossy(value).into_owned()
}

/// Require a GitHub Actions signer from `repo`
pub fn verify_certificate_identity(identity: &CertificateIdentity, repo: &str) -> Result<()> {
    if identity.issuer != GITHUB_ACTIONS_ISSUER {
        return Err(Error::SigstoreVerification(format!(
            "Certificate not issued for GitHub Actions: issuer {:?}", identity.issuer
        )));
    }

    let repo_url = format!("https://github.com/{}", repo);
    let workflow_prefix = format!("{}/", repo_url);
    if identity.source_repository_uri != repo_url
        && !identity.build_signer_uri.starts_with(&workflow_prefix)
    {
        return Err(Error::SigstoreVerification(format!(
            "Certificate not for {}: repository {:?}, workflow {:?}",
            repo, identity.source_repository_uri, identity.build_signer_uri
        )));
    }

    Ok(())
}

/// Digest lookup keys are hex, so the subject is compared case-insensitively
fn verify_subject(statement: &InTotoStatement, expected: &ExpectedDigest) -> Result<()> {
    let attested = statement.subject
        .iter()
        .filter_map(|s| s.digest.get("sha256"))
        .any(|d| d.eq_ignore_ascii_case(expected.as_str()));

    if !attested {
        return Err(Error::SigstoreVerification(format!(
            "Statement does not attest to digest {}", expected
        )));
    }
    Ok(())
}

fn predicate_str<'a>(predicate: &'a serde_json::Value, pointer: &str) -> Result<&'a str> {
    predicate.pointer(pointer)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::SigstoreVerification(format!("Predicate missing {}", pointer)))
}

fn measurement_from_statement(statement: &InTotoStatement) -> Result<Measurement> {
    let type_ = PredicateType::from_uri(&statement.predicate_type);
    let predicate = &statement.predicate;

    let pointers: &[&str] = match type_ {
        PredicateType::AwsNitroEnclaveV1 => &["/PCR0", "/PCR1", "/PCR2"],
        PredicateType::SevGuestV2 => &["/snp_measurement"],
        PredicateType::SnpTdxMultiPlatformV1 => {
            &["/snp_measurement", "/tdx_measurement/rtmr1", "/tdx_measurement/rtmr2"]
        }
        PredicateType::TdxGuestV2 | PredicateType::Unknown => {
            return Err(Error::SigstoreVerification(format!(
                "Unsupported predicate type: {}", statement.predicate_type
            )));
        }
    };

    let registers = pointers.iter()
        .map(|p| predicate_str(predicate, p).map(str::to_string))
        .collect::<Result<Vec<_>>>()?;

    Ok(Measurement { type_, registers })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::attestation::certs::testing::TestKey;

    fn statement(
        predicate_type: &str,
        predicate: serde_json::Value,
        digest: &str,
    ) -> InTotoStatement {
        serde_json::from_value(serde_json::json!({
            "_type": "https://in-toto.io/Statement/v1",
            "predicateType": predicate_type,
            "predicate": predicate,
            "subject": [{ "name": "image", "digest": { "sha256": digest } }],
        }))
        .unwrap()
    }

    fn github_identity(repo_uri: &str, workflow: &str) -> CertificateIdentity {
        CertificateIdentity {
            issuer: GITHUB_ACTIONS_ISSUER.into(),
            build_signer_uri: workflow.into(),
            source_repository_uri: repo_uri.into(),
        }
    }

    #[test]
    fn test_pae_encoding() {
        let pae = compute_pae("http://example.com/HelloWorld", b"hello world");
        assert_eq!(pae, b"DSSEv1 29 http://example.com/HelloWorld 11 hello world");
    }

    #[test]
    fn test_nitro_predicate_measurement() {
        let digest = "ab".repeat(32);
        let st = statement(
            "https://tinfoil.sh/predicate/aws-nitro-enclave/v1",
            serde_json::json!({ "PCR0": "00", "PCR1": "11", "PCR2": "22" }),
            &digest,
        );
        let m = measurement_from_statement(&st).unwrap();
        assert_eq!(m.type_, PredicateType::AwsNitroEnclaveV1);
        assert_eq!(m.registers, vec!["00", "11", "22"]);
    }

    #[test]
    fn test_multiplatform_predicate_measurement() {
        let st = statement(
            "https://tinfoil.sh/predicate/snp-tdx-multiplatform/v1",
            serde_json::json!({
                "snp_measurement": "aa",
                "tdx_measurement": { "rtmr1": "bb", "rtmr2": "cc" },
            }),
            "",
        );
        let m = measurement_from_statement(&st).unwrap();
        assert_eq!(m.registers, vec!["aa", "bb", "cc"]);
    }

    #[test]
    fn test_missing_predicate_field() {
        let st = statement(
            "https://tinfoil.sh/predicate/sev-snp-guest/v2",
            serde_json::json!({}),
            "",
        );
        let err = measurement_from_statement(&st).unwrap_err();
        assert!(err.to_string().contains("snp_measurement"));
    }

    #[test]
    fn test_unknown_predicate_rejected() {
        let st = statement("https://slsa.dev/provenance/v1", serde_json::json!({}), "");
        assert!(measurement_from_statement(&st).is_err());
    }

    #[test]
    fn test_subject_must_match_digest() {
        let digest = ExpectedDigest::parse(&"ab".repeat(32)).unwrap();
        let st = statement("x", serde_json::json!({}), &"AB".repeat(32));
        assert!(verify_subject(&st, &digest).is_ok());

        let other = statement("x", serde_json::json!({}), &"cd".repeat(32));
        assert!(verify_subject(&other, &digest).is_err());
    }

    #[test]
    fn test_identity_accepts_repository_or_workflow() {
        let by_repo = github_identity("https://github.com/org/app", "");
        assert!(verify_certificate_identity(&by_repo, "org/app").is_ok());

        let by_workflow = github_identity(
            "",
            "https://github.com/org/app/.github/workflows/release.yml@refs/tags/v1",
        );
        assert!(verify_certificate_identity(&by_workflow, "org/app").is_ok());
    }

    #[test]
    fn test_identity_rejects_lookalike_repository() {
        let identity = github_identity(
            "https://github.com/org/app-evil",
            "https://github.com/org/app-evil/.github/workflows/release.yml@refs/heads/main",
        );
        assert!(verify_certificate_identity(&identity, "org/app").is_err());
    }

    #[test]
    fn test_identity_rejects_other_issuer() {
        let mut identity = github_identity("https://github.com/org/app", "");
        identity.issuer = "https://accounts.google.com".into();
        assert!(verify_certificate_identity(&identity, "org/app").is_err());
    }

    #[test]
    fn test_extension_string_decodes_der_and_raw() {
        // UTF8String "abc"
        assert_eq!(extension_string(&[0x0c, 0x03, b'a', b'b', b'c']), "abc");
        assert_eq!(extension_string(GITHUB_ACTIONS_ISSUER.as_bytes()), GITHUB_ACTIONS_ISSUER);
    }

    #[test]
    fn test_bundle_without_certificate() {
        let digest = ExpectedDigest::parse(&"ab".repeat(32)).unwrap();
        let bundle = serde_json::json!({
            "verificationMaterial": {},
            "dsseEnvelope": {
                "payload": "",
                "payloadType": "application/vnd.in-toto+json",
                "signatures": [],
            },
        });
        let root = Fixture::new().trusted_root();
        let err = verify_bundle(bundle.to_string().as_bytes(), &digest, "org/app", &root)
            .unwrap_err();
        assert!(err.to_string().contains("No certificate"));
    }

    #[test]
    fn test_garbage_bundle() {
        let digest = ExpectedDigest::parse(&"ab".repeat(32)).unwrap();
        let root = Fixture::new().trusted_root();
        assert!(verify_bundle(b"not json", &digest, "org/app", &root).is_err());
    }

    fn verify_json(
        bundle: &serde_json::Value,
        digest: &str,
        root: &TrustedRoot,
    ) -> Result<VerifiedProvenance> {
        let digest = ExpectedDigest::parse(digest).unwrap();
        verify_bundle(bundle.to_string().as_bytes(), &digest, REPO, root)
    }

    #[test]
    fn test_chained_bundle_verifies() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);

        let verified =
            verify_json(&fixture.bundle(&digest), &digest, &fixture.trusted_root()).unwrap();
        assert_eq!(verified.measurement.type_, PredicateType::AwsNitroEnclaveV1);
        assert_eq!(
            verified.measurement.registers,
            vec!["00".repeat(48), "11".repeat(48), "22".repeat(48)]
        );
        assert_eq!(verified.identity.issuer, GITHUB_ACTIONS_ISSUER);
        assert_eq!(verified.identity.source_repository_uri, "https://github.com/org/app");
        assert_eq!(
            verified.certificate_fingerprint,
            hex::encode(Sha256::digest(&fixture.leaf_der))
        );
    }

    #[test]
    fn test_self_signed_github_certificate_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        // Same identity claims, but the certificate vouches for itself
        let key = TestKey::p256(21);
        let self_signed =
            github_leaf("O=sigstore.dev", "https://github.com/org/app").issue(&key, &key);
        let payload = testing::statement(&digest);
        let bundle = fixture.bundle_with(&key, &self_signed, &payload, INTEGRATED_TIME);

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("does not chain to a trusted authority"), "{}", err);
    }

    #[test]
    fn test_certificate_skipping_intermediate_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let leaf = fixture.issue_from_root(&github_leaf(
            "CN=sigstore-intermediate,O=sigstore.test",
            "https://github.com/org/app",
        ));
        let payload = testing::statement(&digest);
        let bundle = fixture.bundle_with(&fixture.leaf_key, &leaf, &payload, INTEGRATED_TIME);

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("does not chain"), "{}", err);
    }

    #[test]
    fn test_tampered_envelope_signature_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let mut bundle = fixture.bundle(&digest);
        let pae = compute_pae(PAYLOAD_TYPE, &testing::statement(&digest));
        let other = TestKey::p256(22).sign_der(&pae);
        bundle["dsseEnvelope"]["signatures"][0]["sig"] =
            base64::engine::general_purpose::STANDARD.encode(other).into();

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("DSSE signature verification failed"), "{}", err);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let mut bundle = fixture.bundle(&digest);
        let forged = testing::statement(&"77".repeat(32));
        bundle["dsseEnvelope"]["payload"] =
            base64::engine::general_purpose::STANDARD.encode(forged).into();

        // The log entry no longer matches the payload
        let err = verify_json(&bundle, &"77".repeat(32), &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("different payload"), "{}", err);
    }

    #[test]
    fn test_tampered_integration_time_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let mut bundle = fixture.bundle(&digest);
        bundle["verificationMaterial"]["tlogEntries"][0]["integratedTime"] = "1700000100".into();

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("Signed entry timestamp verification failed"), "{}", err);
    }

    #[test]
    fn test_entry_from_unknown_log_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let mut bundle = fixture.bundle(&digest);
        bundle["verificationMaterial"]["tlogEntries"][0]["logId"]["keyId"] =
            base64::engine::general_purpose::STANDARD.encode([0u8; 32]).into();

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("unknown transparency log"), "{}", err);
    }

    #[test]
    fn test_bundle_without_log_entry_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let mut bundle = fixture.bundle(&digest);
        bundle["verificationMaterial"]["tlogEntries"] = serde_json::json!([]);

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("no transparency log entry"), "{}", err);
    }

    #[test]
    fn test_entry_logged_after_certificate_expiry_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let late = (LEAF_NOT_AFTER + 1) as i64;
        let payload = testing::statement(&digest);
        let bundle = fixture.bundle_with(&fixture.leaf_key, &fixture.leaf_der, &payload, late);

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("not valid when the entry was logged"), "{}", err);
    }

    #[test]
    fn test_bundle_from_other_repository_rejected() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let leaf = fixture.issue_leaf(&github_leaf(
            "CN=sigstore-intermediate,O=sigstore.test",
            "https://github.com/org/app-evil",
        ));
        let payload = testing::statement(&digest);
        let bundle = fixture.bundle_with(&fixture.leaf_key, &leaf, &payload, INTEGRATED_TIME);

        let err = verify_json(&bundle, &digest, &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("Certificate not for org/app"), "{}", err);
    }

    #[test]
    fn test_bundle_for_other_digest_rejected() {
        let fixture = Fixture::new();
        let bundle = fixture.bundle(&"5e".repeat(32));

        let err = verify_json(&bundle, &"6f".repeat(32), &fixture.trusted_root()).unwrap_err();
        assert!(err.to_string().contains("does not attest to digest"), "{}", err);
    }

    #[test]
    fn test_numeric_log_fields_accepted() {
        let fixture = Fixture::new();
        let digest = "5e".repeat(32);
        let mut bundle = fixture.bundle(&digest);
        let entry = &mut bundle["verificationMaterial"]["tlogEntries"][0];
        entry["logIndex"] = 42.into();
        entry["integratedTime"] = INTEGRATED_TIME.into();

        assert!(verify_json(&bundle, &digest, &fixture.trusted_root()).is_ok());
    }
}
