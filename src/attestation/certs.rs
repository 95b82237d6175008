//! X.509 helpers shared by the hardware certificate chain checks

use std::time::Duration;

use der::asn1::ObjectIdentifier;
use der::{Decode, Encode};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use sha2::{Digest, Sha256, Sha384};
use x509_cert::Certificate;

use crate::error::{Error, Result};

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

/// A certificate decoded once, with the DER encodings the chain checks need
#[derive(Debug, Clone)]
pub(crate) struct ParsedCert {
    pub cert: Certificate,
    /// DER encoding of the full SubjectPublicKeyInfo
    pub spki_der: Vec<u8>,
    /// DER encoding of the TBS (to-be-signed) certificate
    pub tbs_der: Vec<u8>,
}

impl ParsedCert {
    pub fn from_der(cert_der: &[u8], label: &str) -> Result<Self> {
        let cert = Certificate::from_der(cert_der)
            .map_err(|e| {
                Error::AttestationVerification(format!("Failed to parse {}: {}", label, e))
            })?;

        let spki_der = cert.tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| {
                Error::AttestationVerification(format!("Failed to encode {} SPKI: {}", label, e))
            })?;

        let tbs_der = cert.tbs_certificate
            .to_der()
            .map_err(|e| {
                Error::AttestationVerification(format!("Failed to encode {} TBS: {}", label, e))
            })?;

        Ok(Self { cert, spki_der, tbs_der })
    }

    /// SHA-256 over the SPKI DER, hex-encoded (what `openssl pkey -pubin | sha256sum` prints)
    pub fn spki_fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.spki_der))
    }

    pub fn signature(&self) -> &[u8] {
        self.cert.signature.raw_bytes()
    }

    /// Raw subject public key bits (an SEC1 point for EC keys)
    pub fn public_key_bytes(&self) -> &[u8] {
        self.cert.tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes()
    }

    pub fn issued_by(&self, issuer: &ParsedCert) -> bool {
        self.cert.tbs_certificate.issuer == issuer.cert.tbs_certificate.subject
    }

    pub fn is_self_issued(&self) -> bool {
        self.cert.tbs_certificate.issuer == self.cert.tbs_certificate.subject
    }

    /// Check this certificate's ECDSA signature under `issuer`'s key
    ///
    /// The digest follows the certificate's signature algorithm; the curve
    /// follows the issuer key (P-256 or P-384).
    pub fn verify_ecdsa_signed_by(&self, issuer: &ParsedCert, label: &str) -> Result<()> {
        let algorithm = self.cert.signature_algorithm.oid;
        let digest = if algorithm == ECDSA_WITH_SHA256 {
            Sha256::digest(&self.tbs_der).to_vec()
        } else if algorithm == ECDSA_WITH_SHA384 {
            Sha384::digest(&self.tbs_der).to_vec()
        } else {
            return Err(Error::AttestationVerification(format!(
                "Unsupported {} signature algorithm {}", label, algorithm
            )));
        };

        let key = issuer.public_key_bytes();
        let verified = match key.len() {
            // SEC1 compressed or uncompressed P-256 point
            33 | 65 => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(key)
                    .map_err(|e| invalid_issuer_key(label, e))?;
                let signature = p256::ecdsa::Signature::from_der(self.signature())
                    .map_err(|e| invalid_signature(label, e))?;
                key.verify_prehash(&digest, &signature)
            }
            49 | 97 => {
                let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(key)
                    .map_err(|e| invalid_issuer_key(label, e))?;
                let signature = p384::ecdsa::Signature::from_der(self.signature())
                    .map_err(|e| invalid_signature(label, e))?;
                key.verify_prehash(&digest, &signature)
            }
            other => {
                return Err(Error::AttestationVerification(format!(
                    "Unsupported issuer key for {} ({} bytes)", label, other
                )));
            }
        };

        verified.map_err(|e| {
            Error::AttestationVerification(format!(
                "{} signature verification failed: {}", label, e
            ))
        })
    }

    /// Common Name of the subject
    pub fn common_name(&self) -> Result<String> {
        use der::asn1::Utf8StringRef;
        use x509_cert::der::oid::db::rfc4519::CN;

        for rdn in self.cert.tbs_certificate.subject.0.iter() {
            for atv in rdn.0.iter() {
                if atv.oid != CN {
                    continue;
                }

                if let Ok(encoded) = atv.value.to_der() {
                    if let Ok(s) = Utf8StringRef::from_der(&encoded) {
                        return Ok(s.as_str().to_string());
                    }
                }

                // PrintableString and friends: the raw value is ASCII
                return std::str::from_utf8(atv.value.value())
                    .map(str::to_string)
                    .map_err(|_| {
                        Error::AttestationVerification("CN value is not valid UTF-8".into())
                    });
            }
        }

        Err(Error::AttestationVerification("No CN found in certificate".into()))
    }

    /// Check `now` (time since the Unix epoch) falls inside the validity window
    pub fn check_validity(&self, now: Duration, label: &str) -> Result<()> {
        let validity = &self.cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_unix_duration();
        let not_after = validity.not_after.to_unix_duration();

        if now < not_before || now > not_after {
            return Err(Error::AttestationVerification(format!(
                "{} certificate is outside its validity period",
                label
            )));
        }

        Ok(())
    }
}

fn invalid_issuer_key(label: &str, e: impl std::fmt::Display) -> Error {
    Error::AttestationVerification(format!("Invalid issuer key for {}: {}", label, e))
}

fn invalid_signature(label: &str, e: impl std::fmt::Display) -> Error {
    Error::AttestationVerification(format!("Invalid {} signature: {}", label, e))
}

/// Split a PEM bundle into DER certificates
pub(crate) fn parse_pem_chain(chain_pem: &[u8]) -> Result<Vec<Vec<u8>>> {
    let pems = pem::parse_many(chain_pem)
        .map_err(|e| Error::AttestationVerification(format!("Failed to parse PEM chain: {}", e)))?;

    Ok(pems.into_iter().map(|p| p.contents().to_vec()).collect())
}
