//! In-circuit counterparts of the native hashes in `shade_privacy`
//!
//! Every gadget uses the same Poseidon configuration as the native code, so a
//! value computed here equals the one computed outside the circuit.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    constraints::CryptographicSpongeVar, poseidon::constraints::PoseidonSpongeVar,
};
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use shade_privacy::{MerklePath, NULLIFIER_DOMAIN, OWNER_DOMAIN, poseidon_config};

fn sponge_hash(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[&FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, poseidon_config());
    for input in inputs {
        sponge.absorb(*input)?;
    }
    let mut out = sponge.squeeze_field_elements(1)?;
    Ok(out.remove(0))
}

/// Hash2 inside the circuit
pub fn hash2(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    sponge_hash(cs, &[a, b])
}

/// Hash4 inside the circuit
pub fn hash4(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    c: &FpVar<Fr>,
    d: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    sponge_hash(cs, &[a, b, c, d])
}

/// owner_key = Hash2(spending_key, OWNER_DOMAIN)
pub fn owner_key(
    cs: ConstraintSystemRef<Fr>,
    spending_key: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let domain = FpVar::constant(Fr::from(OWNER_DOMAIN));
    hash2(cs, spending_key, &domain)
}

/// commitment = Hash4(amount, owner_key, randomness, token_id)
pub fn commitment(
    cs: ConstraintSystemRef<Fr>,
    amount: &FpVar<Fr>,
    owner_key: &FpVar<Fr>,
    randomness: &FpVar<Fr>,
    token_id: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    hash4(cs, amount, owner_key, randomness, token_id)
}

/// nullifier = Hash4(commitment, spending_key, randomness, NULLIFIER_DOMAIN)
pub fn nullifier(
    cs: ConstraintSystemRef<Fr>,
    commitment: &FpVar<Fr>,
    spending_key: &FpVar<Fr>,
    randomness: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let domain = FpVar::constant(Fr::from(NULLIFIER_DOMAIN));
    hash4(cs, commitment, spending_key, randomness, &domain)
}

/// Fold `leaf` up a witnessed authentication path and return the root
pub fn merkle_root(
    cs: ConstraintSystemRef<Fr>,
    leaf: &FpVar<Fr>,
    path: &MerklePath,
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut current = leaf.clone();

    for (sibling, is_right) in path.siblings.iter().zip(path.path_bits()) {
        let sibling = FpVar::new_witness(cs.clone(), || Ok(*sibling))?;
        let is_right = Boolean::new_witness(cs.clone(), || Ok(is_right))?;

        // is_right: hash(sibling, current), else hash(current, sibling)
        let left = FpVar::conditionally_select(&is_right, &sibling, &current)?;
        let right = FpVar::conditionally_select(&is_right, &current, &sibling)?;

        current = hash2(cs.clone(), &left, &right)?;
    }

    Ok(current)
}

/// Constrain `value` to fit in 64 bits
pub fn enforce_u64(value: &FpVar<Fr>) -> Result<(), SynthesisError> {
    let bits = value.to_bits_le()?;
    for bit in &bits[64..] {
        bit.enforce_equal(&Boolean::constant(false))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_relations::r1cs::ConstraintSystem;
    use shade_privacy::{IncrementalMerkleTree, Note, SpendingKey, hash2 as native_hash2};

    #[test]
    fn test_gadgets_match_native() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let sk = SpendingKey::from_field(Fr::from(99u64));
        let note = Note::new(250, sk.owner_key(), Fr::from(7u64), Fr::from(3u64));

        let sk_var = FpVar::new_witness(cs.clone(), || Ok(*sk.as_field())).unwrap();
        let amount = FpVar::new_witness(cs.clone(), || Ok(Fr::from(note.amount))).unwrap();
        let randomness = FpVar::new_witness(cs.clone(), || Ok(note.randomness)).unwrap();
        let token = FpVar::new_witness(cs.clone(), || Ok(note.token_id)).unwrap();

        let owner = owner_key(cs.clone(), &sk_var).unwrap();
        assert_eq!(owner.value().unwrap(), sk.owner_key());

        let cm = commitment(cs.clone(), &amount, &owner, &randomness, &token).unwrap();
        assert_eq!(cm.value().unwrap(), note.commitment().to_field());

        let nf = nullifier(cs.clone(), &cm, &sk_var, &randomness).unwrap();
        assert_eq!(nf.value().unwrap(), note.nullifier(&sk).to_field());

        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_merkle_gadget_matches_tree() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let mut tree = IncrementalMerkleTree::with_depth(4);
        for n in 0..5u64 {
            tree.insert(shade_privacy::Commitment::from_field(Fr::from(n + 1))).unwrap();
        }

        let path = tree.path(3).unwrap();
        let leaf = FpVar::new_witness(cs.clone(), || Ok(Fr::from(4u64))).unwrap();
        let root = merkle_root(cs.clone(), &leaf, &path).unwrap();

        assert_eq!(root.value().unwrap(), tree.root());
        assert_eq!(
            hash2(cs.clone(), &leaf, &leaf).unwrap().value().unwrap(),
            native_hash2(&Fr::from(4u64), &Fr::from(4u64))
        );
    }

    #[test]
    fn test_enforce_u64() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let ok = FpVar::new_witness(cs.clone(), || Ok(Fr::from(u64::MAX))).unwrap();
        enforce_u64(&ok).unwrap();
        assert!(cs.is_satisfied().unwrap());

        let cs = ConstraintSystem::<Fr>::new_ref();
        let too_big =
            FpVar::new_witness(cs.clone(), || Ok(Fr::from(u64::MAX) + Fr::from(1u64))).unwrap();
        enforce_u64(&too_big).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }
}
