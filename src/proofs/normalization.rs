//! Proof that a re-encrypted balance preserves its value and that every
//! fresh chunk fits back into 16 bits.
//!
//! Homomorphic additions (rollovers, incoming transfers) can push chunks of
//! the available ciphertext past 16 bits. Normalization decrypts with a
//! wider per-chunk search, re-encrypts the same value with fresh
//! randomness, and proves the equality plus the per-chunk bound.

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use rand_core::{CryptoRng, RngCore};

use crate::{
    chain::Address,
    codec::{decode_fixed, decode_version},
    elgamal::{chunked::split_into_chunks, ChunkedCipherText, ConfidentialKeys, EncryptionKey},
    errors::Result,
    proofs::{
        new_balance::NewBalanceSigma, withdrawal::decode_versioned, InRangeProof, PROOF_VERSION,
    },
    Balance, BALANCE_CHUNKS, CHUNK_BITS,
};

/// The domain label for the normalization proof.
pub const NORMALIZATION_PROOF_LABEL: &[u8] = b"CA-SIGMA-NORM-v1";
/// The domain label for the challenge.
pub const NORMALIZATION_PROOF_CHALLENGE_LABEL: &[u8] = b"CA-SIGMA-NORM-v1-challenge";

/// Proof bundle carried by a `normalize` transaction.
#[derive(Clone, Debug)]
pub struct NormalizationProof {
    pub(crate) sigma: NewBalanceSigma,
    pub range_proofs: [InRangeProof; BALANCE_CHUNKS],
}

impl NormalizationProof {
    /// Build the proof and the normalized ciphertext it certifies.
    ///
    /// `balance` is the decrypted plaintext of `current`, read with the
    /// wide per-chunk search if necessary.
    pub fn new<R: RngCore + CryptoRng>(
        keys: &ConfidentialKeys,
        account: &Address,
        token: &Address,
        balance: Balance,
        current: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<(Self, ChunkedCipherText)> {
        current.verify_value(&keys.secret, balance)?;

        let (randomness, new_balance) = ChunkedCipherText::encrypt(&keys.public, balance, rng);

        let sigma = NewBalanceSigma::prove(
            NORMALIZATION_PROOF_LABEL,
            NORMALIZATION_PROOF_CHALLENGE_LABEL,
            account,
            token,
            keys,
            None,
            current,
            balance,
            &new_balance,
            &randomness,
            rng,
        )?;
        let range_proofs =
            InRangeProof::prove_chunks(&split_into_chunks(balance), &randomness.0, rng)?;

        Ok((
            NormalizationProof {
                sigma,
                range_proofs,
            },
            new_balance,
        ))
    }

    /// Verify the bundle from public data only.
    pub fn verify<R: RngCore + CryptoRng>(
        &self,
        account: &Address,
        token: &Address,
        key: &EncryptionKey,
        current: &ChunkedCipherText,
        new_balance: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<()> {
        self.sigma.verify(
            NORMALIZATION_PROOF_LABEL,
            NORMALIZATION_PROOF_CHALLENGE_LABEL,
            account,
            token,
            key,
            None,
            current,
            new_balance,
        )?;

        let commitments = new_balance.compressed_commitments();
        InRangeProof::verify_batch(
            commitments.iter().zip(self.range_proofs.iter()),
            CHUNK_BITS,
            rng,
        )
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode_versioned(bytes, "normalization proof")
    }
}

impl Encode for NormalizationProof {
    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        PROOF_VERSION.encode_to(dest);
        self.sigma.encode_to(dest);
        for proof in &self.range_proofs {
            proof.encode_to(dest);
        }
    }
}

impl Decode for NormalizationProof {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        decode_version(input, PROOF_VERSION)?;
        Ok(Self {
            sigma: NewBalanceSigma::decode(input)?,
            range_proofs: decode_fixed::<InRangeProof, I, BALANCE_CHUNKS>(input)?,
        })
    }
}
