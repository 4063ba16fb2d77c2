//! Poseidon hashing
//!
//! `Hash2` and `Hash4` are a single Poseidon sponge over BN254 Fr that absorbs
//! two or four elements and squeezes one. The circuit gadgets in the prover
//! crate build on [`poseidon_config`], so native and in-circuit hashes agree.

use std::sync::LazyLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};

static POSEIDON_CONFIG: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(build_config);

/// Poseidon configuration for Shade
///
/// Field: BN254 Fr (254 bits)
/// Rate: 2, Capacity: 1
/// Security: 128 bits
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    &POSEIDON_CONFIG
}

fn build_config() -> PoseidonConfig<Fr> {
    let prime_bits: u64 = 254;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;
    let skip_matrices: u64 = 0;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        rate,
        full_rounds,
        partial_rounds,
        skip_matrices,
    );

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}

/// Hash2(a, b): Merkle node and key-derivation hash
pub fn hash2(a: &Fr, b: &Fr) -> Fr {
    sponge_hash(&[*a, *b])
}

/// Hash4(a, b, c, d): note commitment and nullifier hash
pub fn hash4(a: &Fr, b: &Fr, c: &Fr, d: &Fr) -> Fr {
    sponge_hash(&[*a, *b, *c, *d])
}

fn sponge_hash(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(poseidon_config());
    for input in inputs {
        sponge.absorb(input);
    }
    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    out[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash2_deterministic_and_ordered() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_eq!(hash2(&a, &b), hash2(&a, &b));
        assert_ne!(hash2(&a, &b), hash2(&b, &a), "hash2 must not be symmetric");
    }

    #[test]
    fn test_hash4_differs_from_hash2_prefix() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        let zero = Fr::from(0u64);
        assert_ne!(hash4(&a, &b, &zero, &zero), hash2(&a, &b));
    }
}
