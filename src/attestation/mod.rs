//! Runtime attestation verification
//!
//! Turns the document served at `/.well-known/tinfoil-attestation` into a
//! verified enclave measurement. Two document shapes are understood:
//!
//! - **Enclave reports**: JSON `{format, body}` wrapping a gzipped SEV-SNP
//!   report or TDX quote. These bind the enclave's TLS key fingerprint in the
//!   report data.
//! - **Nitro documents**: a base64 COSE_Sign1 hardware attestation document
//!   signed under the AWS Nitro root.

pub(crate) mod certs;
pub mod nitro;
pub mod sev;
pub mod tdx;
pub mod types;

pub use types::{AttestationDocument, Measurement, MeasurementError, PredicateType, Verification};

use crate::error::{Error, Result};
use crate::fetch::HttpTransport;

/// Parse an enclave report document
pub fn parse_document(raw: &[u8]) -> Result<AttestationDocument> {
    serde_json::from_slice(raw)
        .map_err(|e| Error::UnsupportedFormat(format!("Not an enclave report document: {}", e)))
}

/// Verify an enclave report from its structure alone
///
/// SEV-SNP reports are checked for size, version and signature sanity; the
/// AMD certificate chain is not fetched.
pub fn verify(doc: &AttestationDocument) -> Result<Verification> {
    match doc.format {
        PredicateType::SevGuestV2 | PredicateType::SnpTdxMultiPlatformV1 => sev::verify(&doc.body),
        PredicateType::TdxGuestV2 => tdx::verify(&doc.body),
        PredicateType::AwsNitroEnclaveV1 => nitro::verify(doc.body.as_bytes()),
        PredicateType::Unknown => Err(Error::UnsupportedFormat(
            "Unknown attestation format".into()
        )),
    }
}

/// Verify an enclave report including vendor collateral
///
/// SEV-SNP reports are checked against the AMD chain (VCEK → ASK → ARK)
/// fetched from `kds_base`. TDX quotes are refused: their quoting enclave
/// signature and PCK chain cannot be checked yet.
pub async fn verify_full(
    doc: &AttestationDocument,
    transport: &dyn HttpTransport,
    kds_base: &str,
) -> Result<Verification> {
    match doc.format {
        PredicateType::SevGuestV2 | PredicateType::SnpTdxMultiPlatformV1 => {
            sev::verify_full(&doc.body, transport, kds_base).await
        }
        PredicateType::TdxGuestV2 => Err(Error::UnsupportedFormat(
            "TDX quote signatures cannot be verified against Intel collateral".into(),
        )),
        _ => verify(doc),
    }
}
