//! Proof that a key rotation re-encrypts the available balance unchanged.
//!
//! The prover holds the old and new decryption keys, shows that the current
//! ciphertext under the old key and the fresh ciphertext under the new key
//! decrypt to the same chunked amount, and binds every fresh chunk to
//! `[0, 2^16)`. The pending balance must already be empty; the orchestrator
//! refuses rotation otherwise.

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar, traits::MultiscalarMul};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};

use crate::{
    chain::Address,
    codec::{
        decode_fixed, decode_points, decode_scalars, decode_version, encode_points, encode_scalars,
        ScalarEncoder,
    },
    elgamal::{
        base_point, chunked::split_into_chunks, h_generator, ChunkedCipherText, ConfidentialKeys,
        EncryptionKey,
    },
    errors::{Error, Result},
    proofs::{
        aggregate_scalar_chunks, random_chunk_scalars, scalar_chunks,
        transcript::TranscriptProtocol, withdrawal::decode_versioned, InRangeProof, PROOF_VERSION,
    },
    Balance, BALANCE_CHUNKS, CHUNK_BITS,
};

/// The domain label for the key-rotation proof.
pub const ROTATION_PROOF_LABEL: &[u8] = b"CA-SIGMA-ROTATE-v1";
/// The domain label for the challenge.
pub const ROTATION_PROOF_CHALLENGE_LABEL: &[u8] = b"CA-SIGMA-ROTATE-v1-challenge";

/// Sigma part of a rotation proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RotationSigma {
    /// Old-balance preservation commitment.
    x1: RistrettoPoint,
    /// Old key-pair relation commitment.
    x2: RistrettoPoint,
    /// New key-pair relation commitment.
    x3: RistrettoPoint,
    /// Per-chunk encryption correctness commitments under the new key.
    x4s: [RistrettoPoint; BALANCE_CHUNKS],
    /// Per-chunk handle correctness commitments under the new key.
    x5s: [RistrettoPoint; BALANCE_CHUNKS],

    /// Responses hiding the balance chunks.
    a1s: [Scalar; BALANCE_CHUNKS],
    /// Response hiding the old decryption key.
    a2: Scalar,
    /// Response hiding the old inverted key.
    a3: Scalar,
    /// Response hiding the new inverted key.
    a4: Scalar,
    /// Responses hiding the fresh blinding factors.
    a5s: [Scalar; BALANCE_CHUNKS],
}

/// Proof bundle carried by a `rotate_encryption_key` transaction.
#[derive(Clone, Debug)]
pub struct RotationProof {
    pub(crate) sigma: RotationSigma,
    pub range_proofs: [InRangeProof; BALANCE_CHUNKS],
}

fn statement_transcript(
    account: &Address,
    token: &Address,
    old_key: &EncryptionKey,
    new_key: &EncryptionKey,
    current: &ChunkedCipherText,
    new_balance: &ChunkedCipherText,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(ROTATION_PROOF_LABEL);
    transcript.append_domain_separator(ROTATION_PROOF_LABEL);
    transcript.append_address(b"account", account);
    transcript.append_address(b"token", token);
    transcript.append_key(b"old-ek", old_key)?;
    transcript.append_key(b"new-ek", new_key)?;
    transcript.append_chunked_ciphertext(b"current", current);
    transcript.append_chunked_ciphertext(b"new", new_balance);
    Ok(transcript)
}

impl RotationSigma {
    fn append_commitments(&self, transcript: &mut Transcript) {
        transcript.append_point(b"X1", &self.x1.compress());
        transcript.append_point(b"X2", &self.x2.compress());
        transcript.append_point(b"X3", &self.x3.compress());
        for x in &self.x4s {
            transcript.append_point(b"X4", &x.compress());
        }
        for x in &self.x5s {
            transcript.append_point(b"X5", &x.compress());
        }
    }
}

impl RotationProof {
    /// Build the proof and the re-encrypted balance under the new key.
    ///
    /// `balance` is the decrypted plaintext of `current`, which must be
    /// normalized (all chunks within 16 bits) before rotation.
    pub fn new<R: RngCore + CryptoRng>(
        old_keys: &ConfidentialKeys,
        new_keys: &ConfidentialKeys,
        account: &Address,
        token: &Address,
        balance: Balance,
        current: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<(Self, ChunkedCipherText)> {
        current.verify_value(&old_keys.secret, balance)?;

        let (randomness, new_balance) = ChunkedCipherText::encrypt(&new_keys.public, balance, rng);

        let mut transcript = statement_transcript(
            account,
            token,
            &old_keys.public,
            &new_keys.public,
            current,
            &new_balance,
        )?;
        let old_secret = old_keys.secret.secret();
        let new_secret = new_keys.secret.secret();
        // Bind the prover RNG to both secrets so neither key alone can
        // replay the nonces.
        let mut witness = [0u8; 64];
        witness[..32].copy_from_slice(old_secret.as_bytes());
        witness[32..].copy_from_slice(new_secret.as_bytes());
        let mut rng = transcript.witness_rng(&witness, rng);
        zeroize::Zeroize::zeroize(&mut witness);

        let k1s = random_chunk_scalars(&mut rng);
        let k2 = Scalar::random(&mut rng);
        let k3 = Scalar::random(&mut rng);
        let k4 = Scalar::random(&mut rng);
        let k5s = random_chunk_scalars(&mut rng);

        let x1 = RistrettoPoint::multiscalar_mul(
            [aggregate_scalar_chunks(&k1s), k2],
            [base_point(), current.aggregate_handles()],
        );
        let x2 = k3 * h_generator();
        let x3 = k4 * h_generator();
        let mut x4s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        let mut x5s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        for i in 0..BALANCE_CHUNKS {
            x4s[i] =
                RistrettoPoint::multiscalar_mul([k1s[i], k5s[i]], [base_point(), *h_generator()]);
            x5s[i] = k5s[i] * new_keys.public.point;
        }

        let mut sigma = RotationSigma {
            x1,
            x2,
            x3,
            x4s,
            x5s,
            a1s: [Scalar::ZERO; BALANCE_CHUNKS],
            a2: Scalar::ZERO,
            a3: Scalar::ZERO,
            a4: Scalar::ZERO,
            a5s: [Scalar::ZERO; BALANCE_CHUNKS],
        };
        sigma.append_commitments(&mut transcript);
        let rho = transcript
            .scalar_challenge(ROTATION_PROOF_CHALLENGE_LABEL)
            .x();

        let chunks = scalar_chunks(balance);
        for i in 0..BALANCE_CHUNKS {
            sigma.a1s[i] = k1s[i] - rho * chunks[i];
            sigma.a5s[i] = k5s[i] - rho * randomness.0[i];
        }
        sigma.a2 = k2 - rho * old_secret;
        sigma.a3 = k3 - rho * old_secret.invert();
        sigma.a4 = k4 - rho * new_secret.invert();

        let range_proofs =
            InRangeProof::prove_chunks(&split_into_chunks(balance), &randomness.0, &mut rng)?;

        Ok((
            RotationProof {
                sigma,
                range_proofs,
            },
            new_balance,
        ))
    }

    /// Verify the bundle from public data only.
    #[allow(clippy::too_many_arguments)]
    pub fn verify<R: RngCore + CryptoRng>(
        &self,
        account: &Address,
        token: &Address,
        old_key: &EncryptionKey,
        new_key: &EncryptionKey,
        current: &ChunkedCipherText,
        new_balance: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<()> {
        let mut transcript =
            statement_transcript(account, token, old_key, new_key, current, new_balance)?;
        self.sigma.append_commitments(&mut transcript);
        let rho = transcript
            .scalar_challenge(ROTATION_PROOF_CHALLENGE_LABEL)
            .x();
        let sigma = &self.sigma;

        // X1 = Σ(2^16i·a1_i)·G + a2·Σ 2^16i·D_cur_i + ρ·Σ 2^16i·C_cur_i
        ensure!(
            sigma.x1
                == RistrettoPoint::multiscalar_mul(
                    [aggregate_scalar_chunks(&sigma.a1s), sigma.a2, rho],
                    [
                        base_point(),
                        current.aggregate_handles(),
                        current.aggregate_commitments(),
                    ],
                ),
            Error::SigmaVerificationError { check: 1 }
        );

        // X2 = a3·H + ρ·P_old
        ensure!(
            sigma.x2
                == RistrettoPoint::multiscalar_mul(
                    [sigma.a3, rho],
                    [*h_generator(), old_key.point],
                ),
            Error::SigmaVerificationError { check: 2 }
        );

        // X3 = a4·H + ρ·P_new
        ensure!(
            sigma.x3
                == RistrettoPoint::multiscalar_mul(
                    [sigma.a4, rho],
                    [*h_generator(), new_key.point],
                ),
            Error::SigmaVerificationError { check: 3 }
        );

        for i in 0..BALANCE_CHUNKS {
            // X4_i = a1_i·G + a5_i·H + ρ·C_new_i
            ensure!(
                sigma.x4s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [sigma.a1s[i], sigma.a5s[i], rho],
                        [base_point(), *h_generator(), new_balance.0[i].commitment],
                    ),
                Error::SigmaVerificationError { check: 4 }
            );

            // X5_i = a5_i·P_new + ρ·D_new_i
            ensure!(
                sigma.x5s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [sigma.a5s[i], rho],
                        [new_key.point, new_balance.0[i].handle],
                    ),
                Error::SigmaVerificationError { check: 5 }
            );
        }

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
        decode_versioned(bytes, "rotation proof")
    }
}

impl Encode for RotationProof {
    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        PROOF_VERSION.encode_to(dest);
        encode_points(&[self.sigma.x1, self.sigma.x2, self.sigma.x3], dest);
        encode_points(&self.sigma.x4s, dest);
        encode_points(&self.sigma.x5s, dest);
        encode_scalars(&self.sigma.a1s, dest);
        ScalarEncoder(&self.sigma.a2).encode_to(dest);
        ScalarEncoder(&self.sigma.a3).encode_to(dest);
        ScalarEncoder(&self.sigma.a4).encode_to(dest);
        encode_scalars(&self.sigma.a5s, dest);
        for proof in &self.range_proofs {
            proof.encode_to(dest);
        }
    }
}

impl Decode for RotationProof {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        decode_version(input, PROOF_VERSION)?;
        let [x1, x2, x3] = decode_points::<I, 3>(input)?;
        let x4s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let x5s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let a1s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;
        let [a2, a3, a4] = decode_scalars::<I, 3>(input)?;
        let a5s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;
        let range_proofs = decode_fixed::<InRangeProof, I, BALANCE_CHUNKS>(input)?;

        Ok(Self {
            sigma: RotationSigma {
                x1,
                x2,
                x3,
                x4s,
                x5s,
                a1s,
                a2,
                a3,
                a4,
                a5s,
            },
            range_proofs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const SEED_1: [u8; 32] = [29u8; 32];

    #[test]
    fn rotation_round_trip() {
        let mut rng = StdRng::from_seed(SEED_1);
        let old_keys = ConfidentialKeys::generate(&mut rng);
        let new_keys = ConfidentialKeys::generate(&mut rng);
        let account = Address::new([11u8; 32]);
        let token = Address::new([12u8; 32]);

        let (_, current) = ChunkedCipherText::encrypt(&old_keys.public, 1_000_000_000, &mut rng);
        let (proof, rotated) = RotationProof::new(
            &old_keys,
            &new_keys,
            &account,
            &token,
            1_000_000_000,
            &current,
            &mut rng,
        )
        .unwrap();

        assert!(proof
            .verify(
                &account,
                &token,
                &old_keys.public,
                &new_keys.public,
                &current,
                &rotated,
                &mut rng,
            )
            .is_ok());

        // Only the new key decrypts the rotated balance.
        assert_eq!(rotated.decrypt(&new_keys.secret).unwrap(), 1_000_000_000);
        assert!(rotated.decrypt(&old_keys.secret).is_err());
    }

    #[test]
    fn value_change_fails_verification() {
        let mut rng = StdRng::from_seed(SEED_1);
        let old_keys = ConfidentialKeys::generate(&mut rng);
        let new_keys = ConfidentialKeys::generate(&mut rng);
        let account = Address::new([11u8; 32]);
        let token = Address::new([12u8; 32]);

        let (_, current) = ChunkedCipherText::encrypt(&old_keys.public, 500, &mut rng);
        let (proof, _) = RotationProof::new(
            &old_keys,
            &new_keys,
            &account,
            &token,
            500,
            &current,
            &mut rng,
        )
        .unwrap();

        let (_, forged) = ChunkedCipherText::encrypt(&new_keys.public, 501, &mut rng);
        assert!(proof
            .verify(
                &account,
                &token,
                &old_keys.public,
                &new_keys.public,
                &current,
                &forged,
                &mut rng,
            )
            .is_err());
    }

    #[test]
    fn codec_round_trip() {
        let mut rng = StdRng::from_seed(SEED_1);
        let old_keys = ConfidentialKeys::generate(&mut rng);
        let new_keys = ConfidentialKeys::generate(&mut rng);
        let account = Address::new([11u8; 32]);
        let token = Address::new([12u8; 32]);

        let (_, current) = ChunkedCipherText::encrypt(&old_keys.public, 64_000, &mut rng);
        let (proof, rotated) = RotationProof::new(
            &old_keys,
            &new_keys,
            &account,
            &token,
            64_000,
            &current,
            &mut rng,
        )
        .unwrap();

        let bytes = proof.to_bytes();
        let decoded = RotationProof::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.to_bytes(), bytes);
        assert!(decoded
            .verify(
                &account,
                &token,
                &old_keys.public,
                &new_keys.public,
                &current,
                &rotated,
                &mut rng,
            )
            .is_ok());

        let mut tampered = bytes;
        tampered[0] = 0xff;
        tampered[1] = 0xff;
        assert_err!(
            RotationProof::from_bytes(&tampered).map(|_| ()),
            Error::UnsupportedVersion(0xffff)
        );
    }
}
