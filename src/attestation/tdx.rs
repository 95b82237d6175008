//! Intel TDX attestation verification

use base64::Engine;
use flate2::read::GzDecoder;
use std::io::Read;

use crate::error::{Error, Result};
use super::types::{Measurement, PredicateType, Verification};

const HEADER_SIZE: usize = 48;
const TD_REPORT_SIZE: usize = 584;
const KEYS_SIZE: usize = 64;
const REGISTER_SIZE: usize = 48;

// Offsets of MRTD and RTMR0..3 within the TD report body
const MRTD_OFFSET: usize = 136;
const RTMR0_OFFSET: usize = 328;

const QUOTE_VERSION: u16 = 4;
const TEE_TYPE_TDX: u32 = 0x81;

/// Parse an Intel TDX quote and extract its measurements
///
/// Structure only: the quoting enclave signature is not checked, so
/// [`super::verify_full`] refuses TDX quotes.
pub fn verify(body: &str) -> Result<Verification> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| Error::AttestationVerification(format!("Base64 decode failed: {}", e)))?;

    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)
        .map_err(|e| Error::AttestationVerification(format!("Gzip decompress failed: {}", e)))?;

    let quote = TdxQuote::parse(&decompressed)?;

    Ok(Verification {
        measurement: quote.measurement(),
        tls_public_key_fp: Some(hex::encode(&quote.keys[..32])),
        hpke_public_key: Some(hex::encode(&quote.keys[32..])),
    })
}

/// Parsed TDX Quote (v4)
///
/// Layout: 48-byte header, 584-byte TD report, signature data, then the
/// 64 key bytes the enclave appends (32 TLS fingerprint + 32 HPKE).
// TODO: verify the QE signature and PCK chain against Intel PCS collateral so
// `verify_full` can accept TDX quotes.
struct TdxQuote {
    /// MRTD followed by RTMR0..RTMR3
    registers: [[u8; REGISTER_SIZE]; 5],
    keys: [u8; KEYS_SIZE],
}

impl TdxQuote {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE + TD_REPORT_SIZE + KEYS_SIZE {
            return Err(Error::AttestationVerification(
                "TDX quote data too short".into()
            ));
        }

        let version = u16::from_le_bytes([data[0], data[1]]);
        if version != QUOTE_VERSION {
            return Err(Error::AttestationVerification(format!(
                "Unsupported TDX quote version: {}", version
            )));
        }

        let tee_type = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if tee_type != TEE_TYPE_TDX {
            return Err(Error::AttestationVerification(format!(
                "Quote is not a TDX quote (TEE type {:#x})", tee_type
            )));
        }

        let report = &data[HEADER_SIZE..HEADER_SIZE + TD_REPORT_SIZE];
        let mut registers = [[0u8; REGISTER_SIZE]; 5];
        registers[0].copy_from_slice(&report[MRTD_OFFSET..MRTD_OFFSET + REGISTER_SIZE]);
        for (i, register) in registers.iter_mut().skip(1).enumerate() {
            let start = RTMR0_OFFSET + i * REGISTER_SIZE;
            register.copy_from_slice(&report[start..start + REGISTER_SIZE]);
        }

        let mut keys = [0u8; KEYS_SIZE];
        keys.copy_from_slice(&data[data.len() - KEYS_SIZE..]);

        Ok(Self { registers, keys })
    }

    fn measurement(&self) -> Measurement {
        Measurement {
            type_: PredicateType::TdxGuestV2,
            registers: self.registers.iter().map(hex::encode).collect(),
        }
    }
}
