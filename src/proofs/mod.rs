//! Zero-knowledge proofs over twisted-ElGamal ciphertexts.
//!
//! Each spendable operation carries a proof bundle: a Fiat-Shamir sigma
//! proof over the operation's ciphertext relation, plus bulletproof range
//! proofs binding every fresh chunk to `[0, 2^16)`. All bundles share the
//! transcript discipline in [`transcript`] and the two-byte version prefix
//! checked by their decoders.

use curve25519_dalek::scalar::Scalar;
use merlin::TranscriptRng;

use crate::{elgamal::chunked::chunk_power, BALANCE_CHUNKS};

pub mod transcript;

pub mod range_proof;

mod new_balance;

pub mod normalization;
pub mod rotation;
pub mod transfer;
pub mod withdrawal;

pub use normalization::NormalizationProof;
pub use range_proof::InRangeProof;
pub use rotation::RotationProof;
pub use transfer::{AuditorLeg, TransferProof, MAX_AUDITORS};
pub use withdrawal::WithdrawalProof;

/// Version prefix carried by every proof encoding.
pub const PROOF_VERSION: u16 = 1;

/// `Σ chunk_i · 2^(16·i)` over response or nonce scalars.
pub(crate) fn aggregate_scalar_chunks(chunks: &[Scalar; BALANCE_CHUNKS]) -> Scalar {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| chunk_power(i) * chunk)
        .sum()
}

/// Draw one nonce per chunk from the transcript-bound RNG.
pub(crate) fn random_chunk_scalars(rng: &mut TranscriptRng) -> [Scalar; BALANCE_CHUNKS] {
    let mut scalars = [Scalar::ZERO; BALANCE_CHUNKS];
    for scalar in scalars.iter_mut() {
        *scalar = Scalar::random(rng);
    }
    scalars
}

/// Chunk values of a balance, in scalar form.
pub(crate) fn scalar_chunks(balance: crate::Balance) -> [Scalar; BALANCE_CHUNKS] {
    crate::elgamal::chunked::split_into_chunks(balance).map(Scalar::from)
}
