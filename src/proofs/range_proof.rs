//! Bulletproof range proofs over ciphertext chunk commitments.
//!
//! The Pedersen generators are the ElGamal generators `(G, H)`, so a chunk
//! commitment `C = m·G + r·H` is directly a range-proof commitment for
//! `(m, r)`. Single-commitment proofs cover individual chunks; aggregated
//! proofs cover a whole 8-chunk ciphertext with one proof.

use bulletproofs::{BulletproofGens, RangeProof};
use codec::{Decode, Encode, Error as CodecError, Input, Output};
use curve25519_dalek::{ristretto::CompressedRistretto, scalar::Scalar};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    elgamal::pedersen_gens,
    errors::Result,
    BALANCE_CHUNKS, CHUNK_BITS,
};

const RANGE_PROOF_LABEL: &[u8] = b"ConfidentialAssetRangeProof";

lazy_static::lazy_static! {
    /// Generators valid for proofs up to 64 bits and aggregation up to the
    /// chunk count. Built once, shared by provers and verifiers.
    static ref BP_GENS: BulletproofGens = BulletproofGens::new(64, BALANCE_CHUNKS);
}

/// A non-interactive proof that a committed value lies in `[0, 2^bits)`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InRangeProof(pub RangeProof);

impl InRangeProof {
    /// Prove `value ∈ [0, 2^bits)` for `commitment = value·G + blinding·H`.
    pub fn prove<R: RngCore + CryptoRng>(
        value: u64,
        blinding: Scalar,
        bits: u32,
        rng: &mut R,
    ) -> Result<Self> {
        let mut transcript = Transcript::new(RANGE_PROOF_LABEL);
        let ng_blinding = crate::dalek_ng_compat::scalar_to_ng(&blinding);
        let (proof, _commitment) = RangeProof::prove_single_with_rng(
            &BP_GENS,
            pedersen_gens(),
            &mut transcript,
            value,
            &ng_blinding,
            bits as usize,
            rng,
        )?;

        Ok(Self(proof))
    }

    /// Verify against a single commitment.
    pub fn verify<R: RngCore + CryptoRng>(
        &self,
        commitment: &CompressedRistretto,
        bits: u32,
        rng: &mut R,
    ) -> Result<()> {
        let mut transcript = Transcript::new(RANGE_PROOF_LABEL);
        let ng_commitment = crate::dalek_ng_compat::compressed_to_ng(commitment);
        Ok(self.0.verify_single_with_rng(
            &BP_GENS,
            pedersen_gens(),
            &mut transcript,
            &ng_commitment,
            bits as usize,
            rng,
        )?)
    }

    /// One aggregated proof over several commitments of the same bit length.
    /// The number of values must be a power of two, at most the chunk count.
    pub fn prove_multiple<R: RngCore + CryptoRng>(
        values: &[u64],
        blindings: &[Scalar],
        bits: u32,
        rng: &mut R,
    ) -> Result<Self> {
        let mut transcript = Transcript::new(RANGE_PROOF_LABEL);
        let ng_blindings = crate::dalek_ng_compat::scalars_to_ng(blindings);
        let (proof, _commitments) = RangeProof::prove_multiple_with_rng(
            &BP_GENS,
            pedersen_gens(),
            &mut transcript,
            values,
            &ng_blindings,
            bits as usize,
            rng,
        )?;

        Ok(Self(proof))
    }

    /// Verify an aggregated proof against its commitments.
    pub fn verify_multiple<R: RngCore + CryptoRng>(
        &self,
        commitments: &[CompressedRistretto],
        bits: u32,
        rng: &mut R,
    ) -> Result<()> {
        let mut transcript = Transcript::new(RANGE_PROOF_LABEL);
        let ng_commitments = crate::dalek_ng_compat::compressed_slice_to_ng(commitments);
        Ok(self.0.verify_multiple_with_rng(
            &BP_GENS,
            pedersen_gens(),
            &mut transcript,
            &ng_commitments,
            bits as usize,
            rng,
        )?)
    }

    /// Verify a batch of per-chunk proofs over a shared generator set,
    /// short-circuiting on the first failure. Transfers verify up to 16
    /// commitments this way.
    pub fn verify_batch<'a, R, I>(batch: I, bits: u32, rng: &mut R) -> Result<()>
    where
        R: RngCore + CryptoRng,
        I: IntoIterator<Item = (&'a CompressedRistretto, &'a InRangeProof)>,
    {
        for (commitment, proof) in batch {
            proof.verify(commitment, bits, rng)?;
        }
        Ok(())
    }

    /// Prove each chunk of a freshly encrypted balance in range.
    pub fn prove_chunks<R: RngCore + CryptoRng>(
        chunks: &[u64; BALANCE_CHUNKS],
        blindings: &[Scalar; BALANCE_CHUNKS],
        rng: &mut R,
    ) -> Result<[InRangeProof; BALANCE_CHUNKS]> {
        let mut proofs = Vec::with_capacity(BALANCE_CHUNKS);
        for (value, blinding) in chunks.iter().zip(blindings.iter()) {
            proofs.push(Self::prove(*value, *blinding, CHUNK_BITS, rng)?);
        }
        proofs
            .try_into()
            .map_err(|_| crate::errors::Error::ProofFailed("chunk range proofs"))
    }
}

/// Wire form: a 4-byte little-endian length, then the bulletproof bytes.
impl Encode for InRangeProof {
    fn size_hint(&self) -> usize {
        // See `RangeProof::to_bytes`: (2·log2(bits·parties) + 9)·32, plus
        // the length prefix.
        4 + (2 * 7 + 9) * 32
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        let bytes = self.0.to_bytes();
        (bytes.len() as u32).encode_to(dest);
        dest.write(&bytes);
    }
}

impl Decode for InRangeProof {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let len = u32::decode(input)?;
        let mut raw = vec![0u8; len as usize];
        input.read(&mut raw)?;
        let proof = RangeProof::from_bytes(&raw)
            .map_err(|_| CodecError::from("Invalid `RangeProof`."))?;

        Ok(Self(proof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::DecryptionKey;
    use rand::{rngs::StdRng, SeedableRng};

    const SEED_1: [u8; 32] = [42u8; 32];

    #[test]
    fn basic_range_proof() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();
        let secret_value = 42u64;

        let (witness, cipher) = public.encrypt_value(secret_value.into(), &mut rng);
        let proof =
            InRangeProof::prove(secret_value, witness.blinding(), CHUNK_BITS, &mut rng).unwrap();
        assert!(proof
            .verify(&cipher.commitment.compress(), CHUNK_BITS, &mut rng)
            .is_ok());

        // A value outside the range must not verify.
        let large_value = (1u64 << CHUNK_BITS) + 3;
        let (bad_witness, bad_cipher) = public.encrypt_value(large_value.into(), &mut rng);
        let bad_proof =
            InRangeProof::prove(large_value, bad_witness.blinding(), CHUNK_BITS, &mut rng).unwrap();
        assert!(bad_proof
            .verify(&bad_cipher.commitment.compress(), CHUNK_BITS, &mut rng)
            .is_err());
    }

    #[test]
    fn aggregated_range_proof() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();

        let values = [1u64, 2, 3, 4, 5, 6, 7, 0xffff];
        let mut blindings = [Scalar::ZERO; BALANCE_CHUNKS];
        let mut commitments = Vec::with_capacity(BALANCE_CHUNKS);
        for (i, value) in values.iter().enumerate() {
            let (witness, cipher) = public.encrypt_value((*value).into(), &mut rng);
            blindings[i] = witness.blinding();
            commitments.push(cipher.commitment.compress());
        }

        let proof = InRangeProof::prove_multiple(&values, &blindings, CHUNK_BITS, &mut rng).unwrap();
        assert!(proof
            .verify_multiple(&commitments, CHUNK_BITS, &mut rng)
            .is_ok());

        // Tampering with one commitment breaks it.
        commitments.swap(0, 1);
        assert!(proof
            .verify_multiple(&commitments, CHUNK_BITS, &mut rng)
            .is_err());
    }

    #[test]
    fn codec_uses_length_prefix() {
        let mut rng = StdRng::from_seed(SEED_1);
        let proof = InRangeProof::prove(9, Scalar::random(&mut rng), CHUNK_BITS, &mut rng).unwrap();

        let encoded = proof.encode();
        let expected_len = u32::from_le_bytes(encoded[0..4].try_into().unwrap()) as usize;
        assert_eq!(encoded.len(), 4 + expected_len);

        let decoded = InRangeProof::decode(&mut &encoded[..]).unwrap();
        assert_eq!(decoded.0.to_bytes(), proof.0.to_bytes());
    }
}
