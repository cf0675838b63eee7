//! Serialized signature form: `0x` + r (32 bytes) + s (32 bytes) + v (minimal hex).

use alloy::hex;
use alloy::primitives::U256;
use alloy::signers::Signature;

use crate::error::{RelayError, RelayResult};

/// Offset added to the y-parity bit to form `v`.
pub const V_OFFSET: u64 = 27;

/// The (v, r, s) triple of an ECDSA signature, with r and s normalized to unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl RawSignature {
    /// Serialize as `r || s || v`.
    pub fn to_hex(&self) -> String {
        concat_sig(self.v, self.r, self.s)
    }

    /// Rebuild the alloy signature (for recovery checks).
    pub fn to_alloy(&self) -> RelayResult<Signature> {
        let parity = match self.v {
            0 | 27 => false,
            1 | 28 => true,
            v => {
                return Err(RelayError::InvalidSignatureComponent(format!(
                    "v = {} has no recovery parity",
                    v
                )))
            }
        };
        Ok(Signature::new(self.r, self.s, parity))
    }
}

impl From<&Signature> for RawSignature {
    fn from(sig: &Signature) -> Self {
        Self {
            v: V_OFFSET + sig.v() as u64,
            r: sig.r(),
            s: sig.s(),
        }
    }
}

/// Concatenate already-normalized components.
pub fn concat_sig(v: u64, r: U256, s: U256) -> String {
    format!(
        "0x{}{}{:x}",
        hex::encode(r.to_be_bytes::<32>()),
        hex::encode(s.to_be_bytes::<32>()),
        v
    )
}

/// Concatenate components given as big-endian two's-complement byte strings.
pub fn concat_sig_bytes(v: u64, r: &[u8], s: &[u8]) -> RelayResult<String> {
    let r = normalize_component(r)?;
    let s = normalize_component(s)?;
    Ok(concat_sig(v, r, s))
}

/// Normalize a big-endian component to its unsigned 256-bit form.
///
/// The bytes are read as a 256-bit two's-complement integer: only bit 255 of
/// a full word marks a negative value, and its unsigned form is the same word.
/// Shorter inputs are zero-extended. Wider inputs may only carry redundant
/// sign-extension bytes; anything else needs more than 256 bits and fails.
pub fn normalize_component(bytes: &[u8]) -> RelayResult<U256> {
    let mut significant = bytes;
    while significant.len() > 32 {
        let redundant = match significant[0] {
            0x00 => true,
            0xff => significant[1] & 0x80 != 0,
            _ => false,
        };
        if !redundant {
            return Err(RelayError::InvalidSignatureComponent(format!(
                "component of {} bytes exceeds 256 bits",
                bytes.len()
            )));
        }
        significant = &significant[1..];
    }
    Ok(U256::from_be_slice(significant))
}

/// Split a serialized signature back into its components.
pub fn split_sig(serialized: &str) -> RelayResult<RawSignature> {
    let digits = serialized.strip_prefix("0x").ok_or_else(|| {
        RelayError::InvalidSignatureComponent("signature is missing the 0x prefix".to_string())
    })?;
    if digits.len() <= 128 || digits.len() > 128 + 16 {
        return Err(RelayError::InvalidSignatureComponent(format!(
            "signature has {} hex digits",
            digits.len()
        )));
    }
    let (r_hex, rest) = digits.split_at(64);
    let (s_hex, v_hex) = rest.split_at(64);

    let word = |h: &str| -> RelayResult<U256> {
        let bytes = hex::decode(h)
            .map_err(|e| RelayError::InvalidSignatureComponent(format!("bad hex: {}", e)))?;
        Ok(U256::from_be_slice(&bytes))
    };
    let v = u64::from_str_radix(v_hex, 16)
        .map_err(|e| RelayError::InvalidSignatureComponent(format!("bad v {}: {}", v_hex, e)))?;

    Ok(RawSignature { v, r: word(r_hex)?, s: word(s_hex)? })
}
