//! Client-side cryptographic core for confidential asset balances on a
//! Move-based chain.
//!
//! A balance lives on-chain as a twisted-ElGamal ciphertext under the
//! owner's encryption key, split into eight 16-bit chunks. This crate
//! implements the ciphertext engine, the sigma and range proofs the
//! on-chain verifier demands, the canonical wire codec, and the async
//! orchestrator that turns `deposit` / `withdraw` / `transfer` / `rotate`
//! requests into proof-bearing transactions.
//!
//! The chain itself is reached only through the collaborator traits in
//! [`chain`]; tests drive the whole pipeline against in-process fakes.

#[macro_use]
pub(crate) mod macros;

pub(crate) mod dalek_ng_compat;

pub mod errors;

pub mod balance;
pub mod chain;
pub mod client;
pub mod codec;
pub mod elgamal;
pub mod proofs;
pub mod worker;

pub use curve25519_dalek::scalar::Scalar;

pub use balance::{BalanceRecord, BalanceState, DecryptedBalance};
pub use chain::{Address, ChainReader, ConfidentialCall, Receipt, Signer, Submitter};
pub use client::{ClientConfig, ConfidentialClient};
pub use elgamal::{
    ChunkedCipherText, CipherText, ConfidentialKeys, DecryptionKey, EncryptionKey,
    DECRYPTION_KEY_CLAIM,
};
pub use errors::{Error, Result};
pub use proofs::{
    AuditorLeg, InRangeProof, NormalizationProof, RotationProof, TransferProof, WithdrawalProof,
    MAX_AUDITORS, PROOF_VERSION,
};
pub use worker::{Operation, OperationQueue, OperationWorker};

/// A confidential balance. Eight 16-bit chunks give 128 bits of range;
/// reading a value back is a bounded discrete-log search per chunk, which
/// is why chunks are kept small.
pub type Balance = u128;

/// A public amount as it appears in deposit and withdraw calls.
pub type Amount = u64;

/// Plaintext bits per ciphertext chunk.
pub const CHUNK_BITS: u32 = 16;

/// Chunks per balance ciphertext.
pub const BALANCE_CHUNKS: usize = 8;
