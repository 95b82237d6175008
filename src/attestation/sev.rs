//! AMD SEV-SNP attestation verification
//!
//! This module verifies SEV-SNP attestation reports using the AMD certificate chain.
//! The verification flow:
//! 1. Parse the raw attestation report
//! 2. Fetch VCEK certificate from AMD KDS (via Tinfoil's proxy)
//! 3. Verify ARK public key matches pinned value (root of trust)
//! 4. Verify ARK is self-signed (RSA-PSS SHA-384)
//! 5. Verify ASK is signed by ARK (RSA-PSS SHA-384)
//! 6. Verify VCEK is signed by ASK (RSA-PSS SHA-384)
//! 7. Verify report signature against VCEK (ECDSA P-384)
//! 8. Extract measurement and TLS keys

use base64::Engine;
use flate2::read::GzDecoder;
use sha2::Sha384;
use std::io::Read;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fetch::HttpTransport;
use super::certs::{parse_pem_chain, ParsedCert};
use super::types::{Measurement, PredicateType, Verification};

// SEV-SNP report offsets (v3 report structure)
const REPORT_DATA_OFFSET: usize = 80;
const REPORT_DATA_SIZE: usize = 64;
const MEASUREMENT_OFFSET: usize = 144;
const MEASUREMENT_SIZE: usize = 48;
const SIGNATURE_OFFSET: usize = 672;
const SIGNATURE_SIZE: usize = 512;
const REPORT_SIZE: usize = 1184;

// Chip ID and TCB for VCEK lookup
const CHIP_ID_OFFSET: usize = 416;
const CHIP_ID_SIZE: usize = 64;
const REPORTED_TCB_OFFSET: usize = 384;

// Signature component sizes (AMD SEV-SNP ECDSA P-384)
// Each component (R, S) is stored in 72 bytes (48 bytes value + 24 bytes padding)
// Values are in little-endian format
const SIG_COMPONENT_SIZE: usize = 72;
const SIG_VALUE_SIZE: usize = 48;  // P-384 scalar size

/// AMD KDS proxy serving VCEK certificates and the Genoa chain
pub const DEFAULT_KDS_BASE: &str = "https://kds-proxy.tinfoil.sh";

/// AMD ARK (AMD Root Key) for Genoa processors
/// This is the SPKI (SubjectPublicKeyInfo) SHA-256 fingerprint of the ARK public key.
///
/// To regenerate this value:
/// ```bash
/// curl -s 'https://kds.amd.com/vcek/v1/Genoa/cert_chain' | \
///   openssl x509 -pubkey -noout | \
///   openssl pkey -pubin -outform DER | sha256sum
/// ```
const AMD_ARK_GENOA_SPKI_FINGERPRINT: &str = "429a69c9422aa258ee4d8db5fcda9c6470ef15f8cd5a9cebd6cbc7d90b863831";

/// Verify AMD SEV-SNP report structure and extract measurements
///
/// Checks size, version and signature sanity without contacting AMD.
pub fn verify(body: &str) -> Result<Verification> {
    let report_bytes = decode_report(body)?;
    validate_report_structure(&report_bytes)?;
    verify_report_signature_basic(&report_bytes)?;
    Ok(extract_verification(&report_bytes))
}

/// Full verification including VCEK fetch and chain validation
pub async fn verify_full(
    body: &str,
    transport: &dyn HttpTransport,
    kds_base: &str,
) -> Result<Verification> {
    // 1. Decode and decompress
    let report_bytes = decode_report(body)?;
    
    // 2. Basic structure validation
    validate_report_structure(&report_bytes)?;
    
    // 3. Extract chip_id and TCB for VCEK lookup
    let chip_id = &report_bytes[CHIP_ID_OFFSET..CHIP_ID_OFFSET + CHIP_ID_SIZE];
    let reported_tcb = &report_bytes[REPORTED_TCB_OFFSET..REPORTED_TCB_OFFSET + 8];
    
    // 4. Fetch and verify certificate chain
    let vcek = fetch_vcek(transport, kds_base, chip_id, reported_tcb).await?;
    let cert_chain = fetch_cert_chain(transport, kds_base).await?;
    
    // 5. ARK pinning and RSA-PSS signature verification
    verify_cert_chain_crypto(&vcek, &cert_chain)?;
    
    // 6. Verify report signature against VCEK
    verify_report_signature_full(&report_bytes, &vcek)?;
    debug!("SEV-SNP report signature verified against VCEK");
    
    Ok(extract_verification(&report_bytes))
}

/// Measurement (48 bytes at offset 144) and report data keys.
/// Report data holds the TLS key fingerprint (first 32 bytes) and HPKE key (next 32).
fn extract_verification(report_bytes: &[u8]) -> Verification {
    let measurement_bytes =
        &report_bytes[MEASUREMENT_OFFSET..MEASUREMENT_OFFSET + MEASUREMENT_SIZE];
    let report_data = &report_bytes[REPORT_DATA_OFFSET..REPORT_DATA_OFFSET + REPORT_DATA_SIZE];

    Verification {
        measurement: Measurement {
            type_: PredicateType::SevGuestV2,
            registers: vec![hex::encode(measurement_bytes)],
        },
        tls_public_key_fp: Some(hex::encode(&report_data[..32])),
        hpke_public_key: Some(hex::encode(&report_data[32..])),
    }
}

fn decode_report(body: &str) -> Result<Vec<u8>> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| Error::AttestationVerification(format!("Base64 decode failed: {}", e)))?;
    
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut report_bytes = Vec::new();
    decoder.read_to_end(&mut report_bytes)
        .map_err(|e| Error::AttestationVerification(format!("Gzip decompress failed: {}", e)))?;
    
    Ok(report_bytes)
}

fn validate_report_structure(report: &[u8]) -> Result<()> {
    if report.len() != REPORT_SIZE {
        return Err(Error::AttestationVerification(format!(
            "Invalid report size: expected {}, got {}",
            REPORT_SIZE, report.len()
        )));
    }
    
    let version = u32::from_le_bytes([report[0], report[1], report[2], report[3]]);
    if version < 2 || version > 3 {
        return Err(Error::AttestationVerification(format!(
            "Unexpected report version: {}", version
        )));
    }
    
    Ok(())
}

/// Parse R and S from the signature bytes
/// AMD SEV-SNP stores ECDSA P-384 signatures as:
/// - R: 72 bytes (48 bytes value in little-endian + 24 bytes padding)
/// - S: 72 bytes (48 bytes value in little-endian + 24 bytes padding)  
/// - Reserved: 368 bytes
fn parse_signature_components(sig_bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    if sig_bytes.len() < SIG_COMPONENT_SIZE * 2 {
        return Err(Error::AttestationVerification("Signature too short".into()));
    }
    
    // Extract R (first 48 bytes of first 72-byte component) and convert from LE to BE
    let r_le = &sig_bytes[0..SIG_VALUE_SIZE];
    let r_be: Vec<u8> = r_le.iter().copied().rev().collect();
    
    // Extract S (first 48 bytes of second 72-byte component) and convert from LE to BE
    let s_le = &sig_bytes[SIG_COMPONENT_SIZE..SIG_COMPONENT_SIZE + SIG_VALUE_SIZE];
    let s_be: Vec<u8> = s_le.iter().copied().rev().collect();
    
    Ok((r_be, s_be))
}

fn verify_report_signature_basic(report: &[u8]) -> Result<()> {
    let sig_bytes = &report[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_SIZE];
    
    // Basic check: signature should not be all zeros
    if sig_bytes.iter().all(|&b| b == 0) {
        return Err(Error::AttestationVerification(
            "Invalid signature: all zeros".into()
        ));
    }
    
    // Parse and validate R and S components
    let (r_be, s_be) = parse_signature_components(sig_bytes)?;
    
    if r_be.iter().all(|&b| b == 0) || s_be.iter().all(|&b| b == 0) {
        return Err(Error::AttestationVerification(
            "Invalid ECDSA signature components".into()
        ));
    }
    
    Ok(())
}

/// Fetch VCEK certificate from AMD KDS via Tinfoil's proxy
async fn fetch_vcek(
    transport: &dyn HttpTransport,
    kds_base: &str,
    chip_id: &[u8],
    tcb: &[u8],
) -> Result<Vec<u8>> {
    let tcb: [u8; 8] = tcb.try_into()
        .map_err(|_| Error::AttestationVerification("Reported TCB must be 8 bytes".into()))?;
    let tcb_val = u64::from_le_bytes(tcb);
    let bl_spl = (tcb_val & 0xFF) as u8;
    let tee_spl = ((tcb_val >> 8) & 0xFF) as u8;
    let snp_spl = ((tcb_val >> 48) & 0xFF) as u8;
    let ucode_spl = ((tcb_val >> 56) & 0xFF) as u8;
    
    let url = format!(
        "{}/vcek/v1/Genoa/{}?blSPL={}&teeSPL={}&snpSPL={}&ucodeSPL={}",
        kds_base, hex::encode(chip_id), bl_spl, tee_spl, snp_spl, ucode_spl
    );
    
    fetch_collateral(transport, &url, "VCEK").await
}

/// Fetch AMD certificate chain (ASK + ARK)
async fn fetch_cert_chain(transport: &dyn HttpTransport, kds_base: &str) -> Result<Vec<u8>> {
    let url = format!("{}/vcek/v1/Genoa/cert_chain", kds_base);
    fetch_collateral(transport, &url, "cert chain").await
}

async fn fetch_collateral(transport: &dyn HttpTransport, url: &str, what: &str) -> Result<Vec<u8>> {
    let response = transport.get(url)
        .await
        .map_err(|e| Error::AttestationVerification(format!("Failed to fetch {}: {}", what, e)))?;
    
    if !(200..300).contains(&response.status) {
        return Err(Error::AttestationVerification(format!(
            "{} fetch failed: HTTP {}",
            what, response.status
        )));
    }
    
    Ok(response.body)
}

/// Verify the AMD certificate chain
///
/// 1. ARK public key matches the pinned fingerprint (root of trust)
/// 2. VCEK → ASK → ARK issuer/subject structure and CNs
/// 3. ARK self-signature, ASK signed by ARK, VCEK signed by ASK (RSA-PSS SHA-384)
fn verify_cert_chain_crypto(vcek_der: &[u8], cert_chain_pem: &[u8]) -> Result<()> {
    let chain_certs = parse_pem_chain(cert_chain_pem)?;
    if chain_certs.len() < 2 {
        return Err(Error::AttestationVerification(
            "Certificate chain should contain ASK and ARK".into()
        ));
    }

    let vcek = ParsedCert::from_der(vcek_der, "VCEK")?;
    let ask = ParsedCert::from_der(&chain_certs[0], "ASK")?;
    let ark = ParsedCert::from_der(&chain_certs[1], "ARK")?;

    let ark_fingerprint = ark.spki_fingerprint();
    if ark_fingerprint != AMD_ARK_GENOA_SPKI_FINGERPRINT {
        return Err(Error::AttestationVerification(format!(
            "ARK public key fingerprint mismatch: expected {}, got {}",
            AMD_ARK_GENOA_SPKI_FINGERPRINT, ark_fingerprint
        )));
    }

    if !vcek.issued_by(&ask) {
        return Err(Error::AttestationVerification(
            "VCEK issuer does not match ASK subject".into()
        ));
    }
    if !ask.issued_by(&ark) {
        return Err(Error::AttestationVerification(
            "ASK issuer does not match ARK subject".into()
        ));
    }
    if !ark.is_self_issued() {
        return Err(Error::AttestationVerification(
            "ARK is not self-signed".into()
        ));
    }

    for (cert, expected) in [(&ark, "ARK-Genoa"), (&ask, "SEV-Genoa")] {
        let cn = cert.common_name()?;
        if cn != expected {
            return Err(Error::AttestationVerification(format!(
                "Unexpected CN: {}, expected {}", cn, expected
            )));
        }
    }

    verify_rsa_pss_signature(&ark, &ark, "ARK self-signature")?;
    verify_rsa_pss_signature(&ask, &ark, "ASK signature")?;
    verify_rsa_pss_signature(&vcek, &ask, "VCEK signature")?;

    Ok(())
}

/// Verify `subject` carries a valid RSA-PSS SHA-384 signature by `signer`
fn verify_rsa_pss_signature(
    subject: &ParsedCert,
    signer: &ParsedCert,
    context: &str,
) -> Result<()> {
    use rsa::RsaPublicKey;
    use rsa::pss::{Signature, VerifyingKey};
    use rsa::signature::Verifier;
    use rsa::pkcs8::DecodePublicKey;
    
    let rsa_pubkey = RsaPublicKey::from_public_key_der(&signer.spki_der)
        .map_err(|e| {
            Error::AttestationVerification(format!(
                "Invalid RSA public key for {}: {}", context, e
            ))
        })?;
    
    let verifying_key: VerifyingKey<Sha384> = VerifyingKey::new(rsa_pubkey);
    
    let sig = Signature::try_from(subject.signature())
        .map_err(|e| {
            Error::AttestationVerification(format!(
                "Invalid signature format for {}: {}", context, e
            ))
        })?;
    
    verifying_key.verify(&subject.tbs_der, &sig)
        .map_err(|e| {
            Error::AttestationVerification(format!("{} verification failed: {}", context, e))
        })?;
    
    Ok(())
}

/// Verify report signature against VCEK public key
///
/// `GenericArray` is deprecated upstream but still what `from_scalars` takes.
#[allow(deprecated)]
fn verify_report_signature_full(report: &[u8], vcek: &[u8]) -> Result<()> {
    use p384::ecdsa::{Signature, VerifyingKey, signature::Verifier};
    use p384::elliptic_curve::generic_array::GenericArray;
    
    let vcek = ParsedCert::from_der(vcek, "VCEK")?;
    
    // The report signature is ECDSA P-384 over SHA-384 of the report body (bytes 0..672)
    let report_body = &report[0..SIGNATURE_OFFSET];
    
    let sig_bytes = &report[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_SIZE];
    let (r_be, s_be) = parse_signature_components(sig_bytes)?;
    
    let signature = Signature::from_scalars(
        GenericArray::clone_from_slice(&r_be),
        GenericArray::clone_from_slice(&s_be),
    ).map_err(|e| Error::AttestationVerification(format!("Invalid signature format: {}", e)))?;
    
    // Uncompressed EC point (04 || x || y)
    let verifying_key = VerifyingKey::from_sec1_bytes(vcek.public_key_bytes())
        .map_err(|e| Error::AttestationVerification(format!("Invalid VCEK public key: {}", e)))?;
    
    verifying_key.verify(report_body, &signature)
        .map_err(|e| {
            Error::AttestationVerification(format!("Signature verification failed: {}", e))
        })?;
    
    Ok(())
}
