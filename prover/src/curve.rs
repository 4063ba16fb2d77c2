//! Curve points as decimal-string coordinates
//!
//! Proof and key documents carry points in projective-looking form:
//! G1 as `[x, y, z]` and G2 as `[[x.c0, x.c1], [y.c0, y.c1], [z.c0, z.c1]]`,
//! with `z = 1` for affine points and `z = 0` for the point at infinity.
//! Decoding checks range, curve membership and subgroup membership.

use ark_bn254::{Fq, Fq2, G1Affine, G2Affine};
use ark_ff::{BigInteger, PrimeField};
use shade_privacy::field;

use crate::error::ProofError;

fn coordinate(s: &str, what: &str) -> Result<Fq, ProofError> {
    field::parse_decimal::<Fq>(s)
        .map_err(|e| ProofError::MalformedProof(format!("{}: {}", what, e)))
}

/// Whether a trailing `z` marks the point at infinity
fn is_infinity(z: Option<&str>, what: &str) -> Result<bool, ProofError> {
    match z {
        None | Some("1") => Ok(false),
        Some("0") => Ok(true),
        Some(other) => Err(ProofError::MalformedProof(format!(
            "{}: unsupported z coordinate {:?}",
            what, other
        ))),
    }
}

pub fn g1_from_decimal(coords: &[String], what: &str) -> Result<G1Affine, ProofError> {
    if coords.len() != 2 && coords.len() != 3 {
        return Err(ProofError::MalformedProof(format!(
            "{}: expected 2 or 3 coordinates, got {}",
            what,
            coords.len()
        )));
    }
    if is_infinity(coords.get(2).map(String::as_str), what)? {
        return Ok(G1Affine::identity());
    }

    let point = G1Affine::new_unchecked(coordinate(&coords[0], what)?, coordinate(&coords[1], what)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProofError::MalformedProof(format!("{}: not a valid G1 point", what)));
    }
    Ok(point)
}

fn fq2(pair: &[String], what: &str) -> Result<Fq2, ProofError> {
    if pair.len() != 2 {
        return Err(ProofError::MalformedProof(format!(
            "{}: expected a coordinate pair, got {} values",
            what,
            pair.len()
        )));
    }
    Ok(Fq2::new(coordinate(&pair[0], what)?, coordinate(&pair[1], what)?))
}

pub fn g2_from_decimal(coords: &[Vec<String>], what: &str) -> Result<G2Affine, ProofError> {
    if coords.len() != 2 && coords.len() != 3 {
        return Err(ProofError::MalformedProof(format!(
            "{}: expected 2 or 3 coordinate pairs, got {}",
            what,
            coords.len()
        )));
    }
    if let Some(z) = coords.get(2) {
        let z0 = z.first().map(String::as_str);
        let z1 = z.get(1).map(String::as_str);
        if z.len() != 2 || z1 != Some("0") {
            return Err(ProofError::MalformedProof(format!("{}: malformed z coordinate", what)));
        }
        if is_infinity(z0, what)? {
            return Ok(G2Affine::identity());
        }
    }

    let point = G2Affine::new_unchecked(fq2(&coords[0], what)?, fq2(&coords[1], what)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProofError::MalformedProof(format!("{}: not a valid G2 point", what)));
    }
    Ok(point)
}

pub fn g1_to_decimal(p: &G1Affine) -> Vec<String> {
    if p.infinity {
        return vec!["0".into(), "1".into(), "0".into()];
    }
    vec![field::to_decimal(&p.x), field::to_decimal(&p.y), "1".into()]
}

pub fn g2_to_decimal(p: &G2Affine) -> Vec<Vec<String>> {
    if p.infinity {
        return vec![
            vec!["0".into(), "0".into()],
            vec!["1".into(), "0".into()],
            vec!["0".into(), "0".into()],
        ];
    }
    vec![
        vec![field::to_decimal(&p.x.c0), field::to_decimal(&p.x.c1)],
        vec![field::to_decimal(&p.y.c0), field::to_decimal(&p.y.c1)],
        vec!["1".into(), "0".into()],
    ]
}

/// 32-byte big-endian base-field element
pub fn fq_to_be(x: &Fq) -> [u8; 32] {
    let bytes = x.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// G1 as `x ‖ y`, big-endian (64 bytes)
pub fn g1_to_be(p: &G1Affine) -> [u8; 64] {
    let mut out = [0u8; 64];
    if !p.infinity {
        out[..32].copy_from_slice(&fq_to_be(&p.x));
        out[32..].copy_from_slice(&fq_to_be(&p.y));
    }
    out
}

/// G2 as `x.c1 ‖ x.c0 ‖ y.c1 ‖ y.c0`, big-endian (128 bytes)
pub fn g2_to_be(p: &G2Affine) -> [u8; 128] {
    let mut out = [0u8; 128];
    if !p.infinity {
        out[..32].copy_from_slice(&fq_to_be(&p.x.c1));
        out[32..64].copy_from_slice(&fq_to_be(&p.x.c0));
        out[64..96].copy_from_slice(&fq_to_be(&p.y.c1));
        out[96..].copy_from_slice(&fq_to_be(&p.y.c0));
    }
    out
}
