//! Core types for attestation verification

use serde::{Deserialize, Serialize};

/// Predicate types for different attestation formats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateType {
    #[serde(rename = "https://tinfoil.sh/predicate/aws-nitro-enclave/v1")]
    AwsNitroEnclaveV1,

    #[serde(rename = "https://tinfoil.sh/predicate/sev-snp-guest/v2")]
    SevGuestV2,

    #[serde(rename = "https://tinfoil.sh/predicate/tdx-guest/v2")]
    TdxGuestV2,

    #[serde(rename = "https://tinfoil.sh/predicate/snp-tdx-multiplatform/v1")]
    SnpTdxMultiPlatformV1,

    #[serde(other)]
    Unknown,
}

impl PredicateType {
    /// Parse a predicate type URI, as found in in-toto statements
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            "https://tinfoil.sh/predicate/aws-nitro-enclave/v1" => PredicateType::AwsNitroEnclaveV1,
            "https://tinfoil.sh/predicate/sev-snp-guest/v2" => PredicateType::SevGuestV2,
            "https://tinfoil.sh/predicate/tdx-guest/v2" => PredicateType::TdxGuestV2,
            "https://tinfoil.sh/predicate/snp-tdx-multiplatform/v1" => {
                PredicateType::SnpTdxMultiPlatformV1
            }
            _ => PredicateType::Unknown,
        }
    }
}

/// Enclave report document served by SEV-SNP and TDX enclaves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationDocument {
    pub format: PredicateType,
    pub body: String, // Base64-encoded, gzipped attestation
}

/// Measurement registers of an enclave image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "type")]
    pub type_: PredicateType,
    pub registers: Vec<String>,
}

impl Measurement {
    /// Compare measurements, handling multi-platform predicates
    ///
    /// Registers are compared as exact strings: `ABCD` and `abcd` differ.
    pub fn equals(&self, other: &Measurement) -> Result<(), MeasurementError> {
        // Multi-platform to specific platform comparison
        if self.type_ == PredicateType::SnpTdxMultiPlatformV1 && other.type_ != self.type_ {
            return self.compare_multiplatform(other);
        }
        if other.type_ == PredicateType::SnpTdxMultiPlatformV1 && self.type_ != other.type_ {
            return other.compare_multiplatform(self);
        }

        if self.type_ != other.type_ {
            return Err(MeasurementError::FormatMismatch);
        }

        if self.registers != other.registers {
            return Err(MeasurementError::RegisterMismatch);
        }

        Ok(())
    }

    fn compare_multiplatform(&self, other: &Measurement) -> Result<(), MeasurementError> {
        if self.registers.len() < 3 {
            return Err(MeasurementError::TooFewRegisters);
        }

        match other.type_ {
            PredicateType::SevGuestV2 => {
                // Multi-platform register[0] is SNP measurement
                let actual_snp = other.registers.first()
                    .ok_or(MeasurementError::TooFewRegisters)?;

                if &self.registers[0] != actual_snp {
                    return Err(MeasurementError::SnpMismatch);
                }
            }
            PredicateType::TdxGuestV2 => {
                if other.registers.len() < 5 {
                    return Err(MeasurementError::TooFewRegisters);
                }

                // Multi-platform registers[1,2] are RTMR1, RTMR2
                // TDX registers are [MRTD, RTMR0, RTMR1, RTMR2, RTMR3]
                if self.registers[1] != other.registers[2] {
                    return Err(MeasurementError::Rtmr1Mismatch);
                }
                if self.registers[2] != other.registers[3] {
                    return Err(MeasurementError::Rtmr2Mismatch);
                }

                let rtmr3_zero = "0".repeat(96);
                if other.registers[4] != rtmr3_zero {
                    return Err(MeasurementError::Rtmr3Mismatch);
                }
            }
            _ => return Err(MeasurementError::FormatMismatch),
        }

        Ok(())
    }

    /// Compute fingerprint of measurement
    ///
    /// Single-register measurements render as the register itself, so an
    /// SEV-SNP or single-digest measurement reads the same in logs as in
    /// release notes.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        if self.registers.len() == 1 {
            return self.registers[0].clone();
        }

        let joined = self.registers.join("|");
        let hash = Sha256::digest(joined.as_bytes());
        hex::encode(hash)
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeasurementError {
    #[error("Attestation format mismatch")]
    FormatMismatch,

    #[error("Register values don't match")]
    RegisterMismatch,

    #[error("Too few registers in measurement")]
    TooFewRegisters,

    #[error("SNP measurement mismatch")]
    SnpMismatch,

    #[error("RTMR1 mismatch")]
    Rtmr1Mismatch,

    #[error("RTMR2 mismatch")]
    Rtmr2Mismatch,

    #[error("RTMR3 mismatch (expected zeros)")]
    Rtmr3Mismatch,
}

/// Result of successful runtime attestation verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Enclave measurement registers
    pub measurement: Measurement,

    /// TLS public key fingerprint (hex-encoded SHA256), when the document binds one
    pub tls_public_key_fp: Option<String>,

    /// HPKE public key for encrypted communication (hex-encoded)
    pub hpke_public_key: Option<String>,
}

impl Verification {
    pub fn new(measurement: Measurement) -> Self {
        Self {
            measurement,
            tls_public_key_fp: None,
            hpke_public_key: None,
        }
    }
}
