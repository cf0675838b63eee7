//! Canonical packed encoding and hashing of typed fields.
//!
//! Fields are packed back to back with no length prefixes or padding other than
//! the fixed 32-byte width of `uint256`, then hashed with keccak-256. The field
//! order is part of the format: reordering fields yields a different digest.

use alloy::dyn_abi::DynSolValue;
use alloy::hex;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use serde_json::Value;

use crate::error::{RelayError, RelayResult};

/// Declared type of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Uint256,
    Address,
    Bytes,
    String,
}

/// A typed value ready for packed encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalField {
    Uint256(U256),
    Address(Address),
    Bytes(Bytes),
    String(String),
}

impl CanonicalField {
    /// Parse a loosely-typed JSON value into the declared field type.
    pub fn parse(ty: FieldType, value: &Value) -> RelayResult<Self> {
        Ok(match ty {
            FieldType::Uint256 => CanonicalField::Uint256(parse_uint256(value)?),
            FieldType::Address => CanonicalField::Address(parse_address(value)?),
            FieldType::Bytes => CanonicalField::Bytes(parse_bytes(value)?),
            FieldType::String => match value {
                Value::String(s) => CanonicalField::String(s.clone()),
                other => {
                    return Err(RelayError::Encoding(format!("expected string, got {}", other)))
                }
            },
        })
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            CanonicalField::Uint256(_) => FieldType::Uint256,
            CanonicalField::Address(_) => FieldType::Address,
            CanonicalField::Bytes(_) => FieldType::Bytes,
            CanonicalField::String(_) => FieldType::String,
        }
    }

    fn to_sol(&self) -> DynSolValue {
        match self {
            CanonicalField::Uint256(v) => DynSolValue::Uint(*v, 256),
            CanonicalField::Address(a) => DynSolValue::Address(*a),
            CanonicalField::Bytes(b) => DynSolValue::Bytes(b.to_vec()),
            CanonicalField::String(s) => DynSolValue::String(s.clone()),
        }
    }
}

/// Pack fields in the given order.
pub fn encode_packed(fields: &[CanonicalField]) -> Vec<u8> {
    DynSolValue::Tuple(fields.iter().map(CanonicalField::to_sol).collect()).abi_encode_packed()
}

/// Pack fields in the given order and hash the result.
pub fn digest(fields: &[CanonicalField]) -> B256 {
    keccak256(encode_packed(fields))
}

/// Parse an unsigned 256-bit integer from a JSON number, hex string or decimal string.
pub fn parse_uint256(value: &Value) -> RelayResult<U256> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(U256::from(v))
            } else if n.as_i64().is_some() {
                Err(RelayError::Encoding(format!("negative integer {} for uint256", n)))
            } else {
                Err(RelayError::Encoding(format!("{} is not an exact integer; pass large values as strings", n)))
            }
        }
        Value::String(s) => parse_uint256_str(s),
        other => Err(RelayError::Encoding(format!("expected uint256, got {}", other))),
    }
}

fn parse_uint256_str(raw: &str) -> RelayResult<U256> {
    let s = raw.trim();
    if s.starts_with('-') {
        return Err(RelayError::Encoding(format!("negative integer {} for uint256", s)));
    }
    if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if digits.is_empty() {
            return Ok(U256::ZERO);
        }
        if digits.trim_start_matches('0').len() > 64 {
            return Err(RelayError::Encoding(format!("{} exceeds 256 bits", s)));
        }
        return U256::from_str_radix(digits, 16)
            .map_err(|e| RelayError::Encoding(format!("invalid hex quantity {}: {}", s, e)));
    }
    if s.is_empty() {
        return Err(RelayError::Encoding("empty integer".to_string()));
    }
    U256::from_str_radix(s, 10)
        .map_err(|e| RelayError::Encoding(format!("invalid uint256 {}: {}", s, e)))
}

/// Parse a 20-byte address from a hex string.
pub fn parse_address(value: &Value) -> RelayResult<Address> {
    let s = value
        .as_str()
        .ok_or_else(|| RelayError::Encoding(format!("expected address string, got {}", value)))?;
    parse_address_str(s)
}

pub fn parse_address_str(s: &str) -> RelayResult<Address> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.len() != 40 {
        return Err(RelayError::Encoding(format!(
            "address {} must be 20 bytes, got {} hex digits",
            s,
            digits.len()
        )));
    }
    let bytes = hex::decode(digits)
        .map_err(|e| RelayError::Encoding(format!("invalid address {}: {}", s, e)))?;
    Ok(Address::from_slice(&bytes))
}

/// Parse a hex byte string. Empty strings and `"0x"` decode to no bytes.
pub fn parse_bytes(value: &Value) -> RelayResult<Bytes> {
    match value {
        Value::Null => Ok(Bytes::new()),
        Value::String(s) => parse_bytes_str(s),
        other => Err(RelayError::Encoding(format!("expected hex bytes, got {}", other))),
    }
}

pub fn parse_bytes_str(s: &str) -> RelayResult<Bytes> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.len() % 2 != 0 {
        return Err(RelayError::Encoding(format!("odd-length hex string {}", s)));
    }
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| RelayError::Encoding(format!("invalid hex bytes {}: {}", s, e)))
}
