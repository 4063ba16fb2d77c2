//! End-to-end prove / verify against a small tree

use std::sync::LazyLock;

use ark_bn254::{Bn254, Fr};
use ark_groth16::ProvingKey;
use ark_std::rand::{SeedableRng, rngs::StdRng};
use shade_privacy::{IncrementalMerkleTree, Note, SpendingKey};
use shade_prover::keys::generate_keys;
use shade_prover::{
    CircuitInputs, Groth16Prover, ONCHAIN_PROOF_LEN, ProofDocument, ProofError, ProverService,
    SpendInput, TransferProver, VerifierKey, is_valid, verify,
};

const DEPTH: usize = 3;

static KEYS: LazyLock<(ProvingKey<Bn254>, VerifierKey)> = LazyLock::new(|| {
    let mut rng = StdRng::seed_from_u64(2024);
    let (pk, vk) = generate_keys(DEPTH, &mut rng).unwrap();
    (pk, VerifierKey::from_ark(&vk).unwrap())
});

fn prover() -> Groth16Prover {
    Groth16Prover::new(KEYS.0.clone(), DEPTH).unwrap()
}

fn spend(amounts_in: [u64; 2], amounts_out: [u64; 2], public_amount: u64) -> CircuitInputs {
    let sk = SpendingKey::from_field(Fr::from(1234u64));
    let token = Fr::from(5u64);
    let mut tree = IncrementalMerkleTree::with_depth(DEPTH);

    let notes = [
        Note::new(amounts_in[0], sk.owner_key(), Fr::from(11u64), token),
        Note::new(amounts_in[1], sk.owner_key(), Fr::from(12u64), token),
    ];
    for note in &notes {
        tree.insert(note.commitment()).unwrap();
    }

    let recipient = SpendingKey::from_field(Fr::from(99u64)).owner_key();
    CircuitInputs {
        merkle_root: tree.root(),
        inputs: [
            SpendInput {
                note: notes[0].clone(),
                path: tree.path(0).unwrap(),
            },
            SpendInput {
                note: notes[1].clone(),
                path: tree.path(1).unwrap(),
            },
        ],
        outputs: [
            Note::new(amounts_out[0], recipient, Fr::from(21u64), token),
            Note::new(amounts_out[1], sk.owner_key(), Fr::from(22u64), token),
        ],
        public_amount,
        spending_key: sk,
    }
}

#[test]
fn test_transfer_proof_verifies() {
    let generated = prover().prove(&spend([50, 25], [60, 15], 0)).unwrap();
    let vk = &KEYS.1;

    assert_eq!(generated.public_signals.len(), 6);
    assert_eq!(generated.public_signals[5], "0");
    assert!(verify(vk, &generated.public_signals, &generated.proof).unwrap());
    assert!(is_valid(vk, &generated.public_signals, &generated.proof));

    let onchain = generated.proof.to_onchain_bytes().unwrap();
    assert_eq!(onchain.len(), ONCHAIN_PROOF_LEN);
}

#[test]
fn test_unshield_proof_verifies() {
    let generated = prover().prove(&spend([50, 25], [30, 0], 45)).unwrap();
    assert_eq!(generated.public_signals[5], "45");
    assert!(is_valid(&KEYS.1, &generated.public_signals, &generated.proof));
}

#[test]
fn test_tampered_signal_rejected() {
    let generated = prover().prove(&spend([50, 25], [60, 15], 0)).unwrap();

    let mut signals = generated.public_signals.clone();
    signals[5] = "1".to_string();
    assert!(!verify(&KEYS.1, &signals, &generated.proof).unwrap());

    let mut signals = generated.public_signals;
    signals.swap(1, 2);
    assert!(!is_valid(&KEYS.1, &signals, &generated.proof));
}

#[test]
fn test_fabricated_proof_rejected() {
    let generated = prover().prove(&spend([50, 25], [60, 15], 0)).unwrap();

    // Valid curve points that were never produced by the prover
    let fake = ProofDocument {
        pi_a: generated.proof.pi_c.clone(),
        pi_b: generated.proof.pi_b.clone(),
        pi_c: generated.proof.pi_a.clone(),
        protocol: None,
        curve: None,
    };
    assert!(!is_valid(&KEYS.1, &generated.public_signals, &fake));

    // Off-curve point fails before pairing
    let mut off_curve = generated.proof.clone();
    off_curve.pi_a[1] = "3".to_string();
    assert!(matches!(
        verify(&KEYS.1, &generated.public_signals, &off_curve),
        Err(ProofError::MalformedProof(_))
    ));
}

#[test]
fn test_wrong_signal_count_rejected() {
    let generated = prover().prove(&spend([50, 25], [60, 15], 0)).unwrap();
    let short = &generated.public_signals[..5];
    assert!(matches!(
        verify(&KEYS.1, short, &generated.proof),
        Err(ProofError::PublicInputCount {
            expected: 6,
            actual: 5
        })
    ));
}

#[test]
fn test_non_canonical_signal_rejected() {
    let generated = prover().prove(&spend([50, 25], [60, 15], 0)).unwrap();
    let mut signals = generated.public_signals;
    // BN254 scalar modulus
    signals[0] =
        "21888242871839275222246405745257275088548364400416034343698204186575808495617".to_string();
    assert!(verify(&KEYS.1, &signals, &generated.proof).is_err());
}

#[tokio::test]
async fn test_service_proves_off_runtime() {
    let service = ProverService::start(prover());
    let generated = service.prove(spend([10, 0], [4, 6], 0)).await.unwrap();
    assert!(is_valid(&KEYS.1, &generated.public_signals, &generated.proof));
}

#[tokio::test]
async fn test_service_reports_unsatisfiable_inputs() {
    let service = ProverService::start(prover());
    let result = service.prove(spend([10, 0], [4, 7], 0)).await;
    assert!(matches!(result, Err(ProofError::Generation(_))));
}

#[test]
fn test_prover_rejects_wrong_depth() {
    let mut inputs = spend([10, 0], [10, 0], 0);
    inputs.inputs[0].path.siblings.push(Fr::from(0u64));
    assert!(matches!(prover().prove(&inputs), Err(ProofError::Generation(_))));
}
