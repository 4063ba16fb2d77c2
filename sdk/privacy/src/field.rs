//! Field Codec
//!
//! Every value that crosses a process boundary (commitments, nullifiers,
//! roots, public signals) is a BN254 scalar-field element. On the wire it is
//! a 32-byte little-endian buffer; inside proof documents it is a canonical
//! decimal string.
//!
//! ```text
//! to_bytes(x)   = LE(x) zero-padded to 32 bytes
//! from_bytes(b) = x   iff   LE⁻¹(b) < p
//! ```
//!
//! Values at or above the modulus are rejected, never reduced.

use ark_bn254::Fr;
use ark_ff::{BigInt, BigInteger, PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

/// A scalar-field element of the proving curve
pub type FieldElement = Fr;

/// Width of an encoded field element
pub const FIELD_BYTES: usize = 32;

/// Errors raised while encoding or decoding field elements
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("value is not below the field modulus")]
    OutOfRange,

    #[error("invalid decimal string: {0:?}")]
    InvalidDecimal(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),
}

/// Encode a field element as 32 little-endian bytes
pub fn to_bytes(x: &Fr) -> [u8; FIELD_BYTES] {
    let bytes = x.into_bigint().to_bytes_le();
    let mut arr = [0u8; FIELD_BYTES];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

/// Decode 32 little-endian bytes into a field element
pub fn from_bytes(bytes: &[u8]) -> Result<Fr, EncodingError> {
    if bytes.len() != FIELD_BYTES {
        return Err(EncodingError::InvalidLength {
            expected: FIELD_BYTES,
            actual: bytes.len(),
        });
    }

    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let mut chunk = [0u8; 8];
        chunk.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
        *limb = u64::from_le_bytes(chunk);
    }

    Fr::from_bigint(BigInt::new(limbs)).ok_or(EncodingError::OutOfRange)
}

/// Parse a canonical decimal string into any prime field
///
/// Used for both the scalar field (public signals) and the base field
/// (curve coordinates in proof and key documents).
pub fn parse_decimal<F: PrimeField>(s: &str) -> Result<F, EncodingError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EncodingError::InvalidDecimal(s.to_string()));
    }

    let value = BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or_else(|| EncodingError::InvalidDecimal(s.to_string()))?;
    let modulus = BigUint::from_bytes_le(&F::MODULUS.to_bytes_le());
    if value >= modulus {
        return Err(EncodingError::OutOfRange);
    }

    Ok(F::from_le_bytes_mod_order(&value.to_bytes_le()))
}

/// Render a field element as a decimal string
pub fn to_decimal<F: PrimeField>(x: &F) -> String {
    BigUint::from_bytes_le(&x.into_bigint().to_bytes_le()).to_string()
}

/// Hex (little-endian bytes) rendering, as used by the HTTP surface
pub fn to_hex(x: &Fr) -> String {
    hex::encode(to_bytes(x))
}

/// Parse a hex string (optional `0x` prefix) of exactly 32 bytes
pub fn parse_hex(s: &str) -> Result<Fr, EncodingError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| EncodingError::InvalidHex(e.to_string()))?;
    from_bytes(&bytes)
}

/// Serde adapter: field element <-> hex string
pub mod serde_hex {
    use super::*;

    pub fn serialize<S: Serializer>(x: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(x))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter: field element <-> decimal string
pub mod serde_decimal {
    use super::*;

    pub fn serialize<S: Serializer>(x: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_decimal(x))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_decimal(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::{One, Zero};

    /// p = BN254 scalar modulus, little-endian
    fn modulus_bytes() -> [u8; 32] {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&Fr::MODULUS.to_bytes_le());
        arr
    }

    #[test]
    fn test_roundtrip_edges() {
        let p_minus_one = -Fr::one();
        for x in [Fr::zero(), Fr::one(), Fr::from(u64::MAX), p_minus_one] {
            assert_eq!(from_bytes(&to_bytes(&x)).unwrap(), x);
        }
    }

    #[test]
    fn test_roundtrip_sampled() {
        let mut x = Fr::from(7u64);
        for _ in 0..64 {
            x = x * x + Fr::from(3u64);
            assert_eq!(from_bytes(&to_bytes(&x)).unwrap(), x);
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let bytes = to_bytes(&Fr::from(0x0102u64));
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 0x01);
        assert!(bytes[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_rejects_modulus_and_above() {
        let p = modulus_bytes();
        assert_eq!(from_bytes(&p), Err(EncodingError::OutOfRange));

        let mut p_plus_one = p;
        p_plus_one[0] += 1;
        assert_eq!(from_bytes(&p_plus_one), Err(EncodingError::OutOfRange));

        assert_eq!(from_bytes(&[0xff; 32]), Err(EncodingError::OutOfRange));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(
            from_bytes(&[0u8; 31]),
            Err(EncodingError::InvalidLength {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_decimal() {
        let x: Fr = parse_decimal("12345678901234567890").unwrap();
        assert_eq!(to_decimal(&x), "12345678901234567890");

        let p = BigUint::from_bytes_le(&modulus_bytes()).to_string();
        assert_eq!(parse_decimal::<Fr>(&p), Err(EncodingError::OutOfRange));
        assert!(matches!(
            parse_decimal::<Fr>("-1"),
            Err(EncodingError::InvalidDecimal(_))
        ));
        assert!(matches!(
            parse_decimal::<Fr>(""),
            Err(EncodingError::InvalidDecimal(_))
        ));
    }

    #[test]
    fn test_hex() {
        let x = Fr::from(42u64);
        assert_eq!(parse_hex(&to_hex(&x)).unwrap(), x);
        assert_eq!(parse_hex(&format!("0x{}", to_hex(&x))).unwrap(), x);
        assert!(matches!(parse_hex("zz"), Err(EncodingError::InvalidHex(_))));
    }
}
