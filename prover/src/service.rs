//! Async prover service
//!
//! Proving is CPU-bound, so it runs on a dedicated thread outside the tokio
//! runtime. Callers exchange messages with it and never block.
//!
//! ```text
//!   caller ──(inputs, oneshot)──▶ mpsc ──▶ prover thread
//!   caller ◀────────── oneshot reply ◀────────┘
//! ```
//!
//! A panic inside the prover is caught and reported as
//! [`ProofError::WorkerCrashed`]; the thread keeps serving requests.

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::{error, warn};
use tokio::sync::{mpsc, oneshot};

use crate::error::ProofError;
use crate::inputs::CircuitInputs;
use crate::proof::GeneratedProof;
use crate::prover::TransferProver;

/// Queue depth for pending prove requests
const QUEUE_DEPTH: usize = 32;

/// Request to prove a spend
pub struct ProveRequest {
    pub inputs: CircuitInputs,
    pub reply: oneshot::Sender<Result<GeneratedProof, ProofError>>,
}

/// Handle to the proving thread
#[derive(Clone)]
pub struct ProverService {
    request_tx: mpsc::Sender<ProveRequest>,
}

impl ProverService {
    /// Start the prover service with the given prover implementation
    pub fn start<P: TransferProver + 'static>(prover: P) -> Self {
        let (request_tx, mut request_rx) = mpsc::channel::<ProveRequest>(QUEUE_DEPTH);

        std::thread::spawn(move || {
            while let Some(request) = request_rx.blocking_recv() {
                let result = catch_unwind(AssertUnwindSafe(|| prover.prove(&request.inputs)))
                    .unwrap_or_else(|_| {
                        error!("prover panicked while proving");
                        Err(ProofError::WorkerCrashed)
                    });

                // The caller may have dropped its receiver; the result is discarded
                if request.reply.send(result).is_err() {
                    warn!("prove result discarded: caller went away");
                }
            }
        });

        Self { request_tx }
    }

    /// Submit inputs for proving and await the result
    pub async fn prove(&self, inputs: CircuitInputs) -> Result<GeneratedProof, ProofError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.request_tx
            .send(ProveRequest {
                inputs,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ProofError::ServiceUnavailable)?;

        reply_rx.await.map_err(|_| ProofError::WorkerCrashed)?
    }
}
