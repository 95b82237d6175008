//! AWS Nitro Enclaves attestation document verification
//!
//! The enclave serves a base64-encoded COSE_Sign1 structure whose payload is
//! a CBOR attestation document. Verification:
//! 1. Decode the COSE_Sign1 envelope and the CBOR payload
//! 2. Check the document structure (module id, SHA384 digest, PCRs, bundle)
//! 3. Walk the CA bundle from the pinned AWS Nitro root down to the leaf
//!    certificate (ECDSA P-384, validity windows)
//! 4. Verify the COSE signature with the leaf key
//! 5. Return PCR0..PCR2 as the measurement

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use coset::{CborSerializable, CoseSign1};
use p384::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde::Deserialize;
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use super::certs::ParsedCert;
use super::types::{Measurement, PredicateType, Verification};

/// SHA-256 of the DER-encoded AWS Nitro Enclaves root certificate (G1)
///
/// Published at https://aws-nitro-enclaves.amazonaws.com/AWS_NitroEnclaves_Root-G1.zip
const AWS_NITRO_ROOT_G1_SHA256: &str = "641a0321a3e244efe456463195d606317ed7cdcc3c1756e09893f3c68f79bb5b";

/// PCRs that make up the image measurement: enclave image, kernel, application
const MEASURED_PCRS: [u32; 3] = [0, 1, 2];
const PCR_SIZE: usize = 48;

#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
struct NitroDocument {
    module_id: String,
    digest: String,
    /// Milliseconds since the Unix epoch
    timestamp: u64,
    pcrs: BTreeMap<u32, ByteBuf>,
    certificate: ByteBuf,
    cabundle: Vec<ByteBuf>,
    #[serde(default)]
    public_key: Option<ByteBuf>,
}

/// Verify a Nitro attestation document and extract PCR0..PCR2
pub fn verify(document: &[u8]) -> Result<Verification> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::AttestationVerification(format!("System clock before epoch: {}", e)))?;
    verify_pinned(document, now, AWS_NITRO_ROOT_G1_SHA256)
}

/// Verify at time `now` under the root whose DER SHA-256 is `root_sha256`
fn verify_pinned(document: &[u8], now: Duration, root_sha256: &str) -> Result<Verification> {
    let text = std::str::from_utf8(document)
        .map_err(|_| Error::AttestationVerification("Nitro document is not base64 text".into()))?;
    let cose_bytes = base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| Error::AttestationVerification(format!("Base64 decode failed: {}", e)))?;

    let cose = CoseSign1::from_slice(&cose_bytes)
        .map_err(|e| {
            Error::AttestationVerification(format!("Failed to decode COSE_Sign1: {:?}", e))
        })?;

    let payload = cose.payload.as_ref()
        .ok_or_else(|| Error::AttestationVerification("COSE_Sign1 has no payload".into()))?;

    let doc: NitroDocument = ciborium::de::from_reader(payload.as_slice())
        .map_err(|e| {
            Error::AttestationVerification(format!("Failed to decode attestation document: {}", e))
        })?;

    check_structure(&doc)?;

    let leaf = verify_chain(&doc, now, root_sha256)?;

    let leaf_key = VerifyingKey::from_sec1_bytes(leaf.public_key_bytes())
        .map_err(|e| Error::AttestationVerification(format!("Invalid leaf public key: {}", e)))?;

    cose.verify_signature(&[], |signature, message| {
        let signature = Signature::try_from(signature)?;
        leaf_key.verify(message, &signature)
    })
    .map_err(|e| {
        Error::AttestationVerification(format!("COSE signature verification failed: {}", e))
    })?;

    let registers = MEASURED_PCRS.iter()
        .map(|index| hex::encode(&doc.pcrs[index]))
        .collect();

    Ok(Verification {
        measurement: Measurement {
            type_: PredicateType::AwsNitroEnclaveV1,
            registers,
        },
        tls_public_key_fp: doc.public_key
            .as_ref()
            .map(|key| hex::encode(Sha256::digest(key))),
        hpke_public_key: None,
    })
}

fn check_structure(doc: &NitroDocument) -> Result<()> {
    if doc.module_id.is_empty() {
        return Err(Error::AttestationVerification("Empty module id".into()));
    }

    if doc.digest != "SHA384" {
        return Err(Error::AttestationVerification(format!(
            "Unsupported document digest: {}", doc.digest
        )));
    }

    if doc.timestamp == 0 {
        return Err(Error::AttestationVerification("Missing document timestamp".into()));
    }

    for index in MEASURED_PCRS {
        match doc.pcrs.get(&index) {
            Some(pcr) if pcr.len() == PCR_SIZE => {}
            Some(pcr) => {
                return Err(Error::AttestationVerification(format!(
                    "PCR{} has length {}, expected {}", index, pcr.len(), PCR_SIZE
                )));
            }
            None => {
                return Err(Error::AttestationVerification(format!("Missing PCR{}", index)));
            }
        }
    }

    if doc.cabundle.is_empty() {
        return Err(Error::AttestationVerification("Empty CA bundle".into()));
    }

    Ok(())
}

/// Verify root → intermediates → leaf and return the parsed leaf
fn verify_chain(doc: &NitroDocument, now: Duration, root_sha256: &str) -> Result<ParsedCert> {
    let root_der = &doc.cabundle[0];
    let root_hash = hex::encode(Sha256::digest(root_der));
    if root_hash != root_sha256 {
        return Err(Error::AttestationVerification(format!(
            "Root certificate is not the AWS Nitro root: {}", root_hash
        )));
    }

    let mut issuer = ParsedCert::from_der(root_der, "root")?;
    if !issuer.is_self_issued() {
        return Err(Error::AttestationVerification("Root certificate is not self-issued".into()));
    }
    issuer.check_validity(now, "root")?;

    for intermediate in &doc.cabundle[1..] {
        let cert = ParsedCert::from_der(intermediate, "intermediate")?;
        verify_issued(&cert, &issuer, now, "intermediate")?;
        issuer = cert;
    }

    let leaf = ParsedCert::from_der(&doc.certificate, "leaf")?;
    verify_issued(&leaf, &issuer, now, "leaf")?;

    // The document must have been produced while the leaf was valid
    leaf.check_validity(Duration::from_millis(doc.timestamp), "leaf (at document time)")?;

    Ok(leaf)
}

fn verify_issued(cert: &ParsedCert, issuer: &ParsedCert, now: Duration, label: &str) -> Result<()> {
    if !cert.issued_by(issuer) {
        return Err(Error::AttestationVerification(format!(
            "{} certificate issuer does not match its parent", label
        )));
    }

    cert.check_validity(now, label)?;
    cert.verify_ecdsa_signed_by(issuer, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::certs::testing::{CertTemplate, TestKey};
    use coset::{iana, CoseSign1Builder, HeaderBuilder};

    const ROOT_NAME: &str = "CN=aws.nitro-enclaves,O=Amazon";
    const NOW: u64 = 1_700_000_100;

    fn leaf_template() -> CertTemplate<'static> {
        CertTemplate::new("CN=i-0abc-enc0123", ROOT_NAME, 1_699_999_000, 1_700_003_600)
    }

    /// Root and leaf keys with the leaf certificate chained under the root
    struct Chain {
        root_der: Vec<u8>,
        leaf_der: Vec<u8>,
        leaf_key: TestKey,
    }

    impl Chain {
        fn new() -> Self {
            let root_key = TestKey::p384(31);
            let leaf_key = TestKey::p384(32);
            let root_der = CertTemplate::new(ROOT_NAME, ROOT_NAME, 1_600_000_000, 1_900_000_000)
                .issue(&root_key, &root_key);
            let leaf_der = leaf_template().issue(&leaf_key, &root_key);
            Self { root_der, leaf_der, leaf_key }
        }

        fn root_pin(&self) -> String {
            hex::encode(Sha256::digest(&self.root_der))
        }

        fn document(&self) -> NitroDocument {
            NitroDocument {
                certificate: ByteBuf::from(self.leaf_der.clone()),
                cabundle: vec![ByteBuf::from(self.root_der.clone())],
                public_key: Some(ByteBuf::from(b"tls-public-key".to_vec())),
                ..document()
            }
        }
    }

    /// COSE_Sign1 over the CBOR document, base64-encoded as the enclave serves it
    fn sign(doc: &NitroDocument, key: &TestKey) -> Vec<u8> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(doc, &mut payload).unwrap();

        let cose = CoseSign1Builder::new()
            .protected(HeaderBuilder::new().algorithm(iana::Algorithm::ES384).build())
            .payload(payload)
            .create_signature(&[], |message| key.sign_fixed(message))
            .build();
        base64::engine::general_purpose::STANDARD
            .encode(cose.to_vec().unwrap())
            .into_bytes()
    }

    fn document() -> NitroDocument {
        let pcrs = MEASURED_PCRS.iter()
            .map(|&i| (i, ByteBuf::from(vec![i as u8; PCR_SIZE])))
            .collect();
        NitroDocument {
            module_id: "i-0abc-enc0123".into(),
            digest: "SHA384".into(),
            timestamp: 1_700_000_000_000,
            pcrs,
            certificate: ByteBuf::from(vec![1, 2, 3]),
            cabundle: vec![ByteBuf::from(vec![4, 5, 6])],
            public_key: None,
        }
    }

    #[test]
    fn test_structure_accepts_complete_document() {
        assert!(check_structure(&document()).is_ok());
    }

    #[test]
    fn test_structure_rejects_sha256_digest() {
        let mut doc = document();
        doc.digest = "SHA256".into();
        let err = check_structure(&doc).unwrap_err();
        assert!(err.to_string().contains("Unsupported document digest"));
    }

    #[test]
    fn test_structure_rejects_missing_pcr() {
        let mut doc = document();
        doc.pcrs.remove(&1);
        let err = check_structure(&doc).unwrap_err();
        assert!(err.to_string().contains("Missing PCR1"));
    }

    #[test]
    fn test_structure_rejects_short_pcr() {
        let mut doc = document();
        doc.pcrs.insert(0, ByteBuf::from(vec![0u8; 32]));
        assert!(check_structure(&doc).is_err());
    }

    #[test]
    fn test_chain_rejects_unpinned_root() {
        let now = Duration::from_secs(1_700_000_000);
        let err = verify_chain(&document(), now, AWS_NITRO_ROOT_G1_SHA256).unwrap_err();
        assert!(err.to_string().contains("not the AWS Nitro root"));
    }

    #[test]
    fn test_signed_document_verifies() {
        let chain = Chain::new();
        let signed = sign(&chain.document(), &chain.leaf_key);

        let now = Duration::from_secs(NOW);
        let verification = verify_pinned(&signed, now, &chain.root_pin()).unwrap();
        assert_eq!(verification.measurement.type_, PredicateType::AwsNitroEnclaveV1);
        assert_eq!(
            verification.measurement.registers,
            vec!["00".repeat(PCR_SIZE), "01".repeat(PCR_SIZE), "02".repeat(PCR_SIZE)]
        );
        assert_eq!(
            verification.tls_public_key_fp,
            Some(hex::encode(Sha256::digest(b"tls-public-key")))
        );
    }

    #[test]
    fn test_signed_document_needs_pinned_root() {
        let chain = Chain::new();
        let signed = sign(&chain.document(), &chain.leaf_key);

        let now = Duration::from_secs(NOW);
        let err = verify_pinned(&signed, now, AWS_NITRO_ROOT_G1_SHA256).unwrap_err();
        assert!(err.to_string().contains("not the AWS Nitro root"));
    }

    #[test]
    fn test_document_signed_by_other_key_rejected() {
        let chain = Chain::new();
        let signed = sign(&chain.document(), &TestKey::p384(33));

        let err = verify_pinned(&signed, Duration::from_secs(NOW), &chain.root_pin()).unwrap_err();
        assert!(err.to_string().contains("COSE signature verification failed"));
    }

    #[test]
    fn test_leaf_from_other_issuer_rejected() {
        let chain = Chain::new();
        let rogue = TestKey::p384(34);
        let mut doc = chain.document();
        doc.certificate = ByteBuf::from(leaf_template().issue(&chain.leaf_key, &rogue));
        let signed = sign(&doc, &chain.leaf_key);

        let err = verify_pinned(&signed, Duration::from_secs(NOW), &chain.root_pin()).unwrap_err();
        assert!(err.to_string().contains("leaf signature verification failed"), "{}", err);
    }

    #[test]
    fn test_expired_leaf_rejected() {
        let chain = Chain::new();
        let signed = sign(&chain.document(), &chain.leaf_key);

        let later = Duration::from_secs(1_700_003_601);
        let err = verify_pinned(&signed, later, &chain.root_pin()).unwrap_err();
        assert!(err.to_string().contains("outside its validity period"));
    }

    #[test]
    fn test_rejects_non_base64() {
        let err = verify(b"%%% not base64 %%%").unwrap_err();
        assert!(err.to_string().contains("Base64"));
    }

    #[test]
    fn test_rejects_non_cose_payload() {
        let body = base64::engine::general_purpose::STANDARD.encode(b"plain text, not CBOR");
        let err = verify(body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("COSE_Sign1"));
    }

    #[test]
    fn test_root_constant_is_sha256_hex() {
        assert_eq!(AWS_NITRO_ROOT_G1_SHA256.len(), 64);
        assert!(AWS_NITRO_ROOT_G1_SHA256.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
