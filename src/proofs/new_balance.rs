//! The shared sigma relation behind withdrawal and normalization proofs.
//!
//! Statement: the prover knows `d`, fresh chunk values `{b_i}` and blinding
//! factors `{r_i}` such that, for an optional public amount `w`,
//!
//! ```text
//! Σ 2^(16i)·C_cur_i − d·Σ 2^(16i)·D_cur_i = (Σ 2^(16i)·b_i + w)·G
//! C_new_i = b_i·G + r_i·H          for every chunk i
//! D_new_i = r_i·P                  for every chunk i
//! P = d⁻¹·H
//! ```
//!
//! i.e. the new ciphertext re-encrypts the current balance minus `w` under
//! the same key. With `w` absent this is exactly the normalization relation.
//! Range proofs on the new chunks are layered on top by the callers.

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use curve25519_dalek::{
    ristretto::RistrettoPoint,
    scalar::Scalar,
    traits::MultiscalarMul,
};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};

use crate::{
    chain::Address,
    codec::{decode_points, decode_scalars, encode_points, encode_scalars, ScalarEncoder},
    elgamal::{base_point, h_generator, ChunkedCipherText, ChunkedRandomness, ConfidentialKeys, EncryptionKey},
    errors::{Error, Result},
    proofs::{
        aggregate_scalar_chunks, random_chunk_scalars, scalar_chunks,
        transcript::TranscriptProtocol,
    },
    Amount, Balance, BALANCE_CHUNKS,
};

/// Sigma part of a withdrawal or normalization proof: four commitment
/// groups and the matching responses, fixed-width on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NewBalanceSigma {
    /// Balance-preservation commitment.
    x1: RistrettoPoint,
    /// Key-pair relation commitment.
    x2: RistrettoPoint,
    /// Per-chunk encryption correctness commitments.
    x3s: [RistrettoPoint; BALANCE_CHUNKS],
    /// Per-chunk handle correctness commitments.
    x4s: [RistrettoPoint; BALANCE_CHUNKS],

    /// Responses hiding the new chunk values.
    a1s: [Scalar; BALANCE_CHUNKS],
    /// Response hiding `d`.
    a2: Scalar,
    /// Response hiding `d⁻¹`.
    a3: Scalar,
    /// Responses hiding the fresh blinding factors.
    a4s: [Scalar; BALANCE_CHUNKS],
}

fn statement_transcript(
    tag: &'static [u8],
    account: &Address,
    token: &Address,
    key: &EncryptionKey,
    amount: Option<Amount>,
    current: &ChunkedCipherText,
    new_balance: &ChunkedCipherText,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(tag);
    transcript.append_domain_separator(tag);
    transcript.append_address(b"account", account);
    transcript.append_address(b"token", token);
    transcript.append_key(b"ek", key)?;
    if let Some(amount) = amount {
        transcript.append_u64(b"amount", amount);
    }
    transcript.append_chunked_ciphertext(b"current", current);
    transcript.append_chunked_ciphertext(b"new", new_balance);
    Ok(transcript)
}

impl NewBalanceSigma {
    /// Prove that `new_balance` re-encrypts `current` minus `amount`.
    ///
    /// `new_value` is the plaintext of `new_balance`, and `randomness` its
    /// fresh per-chunk blinding factors.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn prove<R: RngCore + CryptoRng>(
        tag: &'static [u8],
        challenge_label: &'static [u8],
        account: &Address,
        token: &Address,
        keys: &ConfidentialKeys,
        amount: Option<Amount>,
        current: &ChunkedCipherText,
        new_value: Balance,
        new_balance: &ChunkedCipherText,
        randomness: &ChunkedRandomness,
        rng: &mut R,
    ) -> Result<Self> {
        let mut transcript = statement_transcript(
            tag,
            account,
            token,
            &keys.public,
            amount,
            current,
            new_balance,
        )?;
        let secret = keys.secret.secret();
        let mut rng = transcript.witness_rng(secret.as_bytes(), rng);

        let k1s = random_chunk_scalars(&mut rng);
        let k2 = Scalar::random(&mut rng);
        let k3 = Scalar::random(&mut rng);
        let k4s = random_chunk_scalars(&mut rng);

        let current_handles = current.aggregate_handles();
        let x1 = RistrettoPoint::multiscalar_mul(
            [aggregate_scalar_chunks(&k1s), k2],
            [base_point(), current_handles],
        );
        let x2 = k3 * h_generator();
        let mut x3s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        let mut x4s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        for i in 0..BALANCE_CHUNKS {
            x3s[i] = RistrettoPoint::multiscalar_mul([k1s[i], k4s[i]], [base_point(), *h_generator()]);
            x4s[i] = k4s[i] * keys.public.point;
        }

        transcript.append_point(b"X1", &x1.compress());
        transcript.append_point(b"X2", &x2.compress());
        for x in &x3s {
            transcript.append_point(b"X3", &x.compress());
        }
        for x in &x4s {
            transcript.append_point(b"X4", &x.compress());
        }
        let rho = transcript.scalar_challenge(challenge_label).x();

        let chunks = scalar_chunks(new_value);
        let mut a1s = [Scalar::ZERO; BALANCE_CHUNKS];
        let mut a4s = [Scalar::ZERO; BALANCE_CHUNKS];
        for i in 0..BALANCE_CHUNKS {
            a1s[i] = k1s[i] - rho * chunks[i];
            a4s[i] = k4s[i] - rho * randomness.0[i];
        }

        Ok(NewBalanceSigma {
            x1,
            x2,
            x3s,
            x4s,
            a1s,
            a2: k2 - rho * secret,
            a3: k3 - rho * secret.invert(),
            a4s,
        })
    }

    /// Verify the relation from public data only.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn verify(
        &self,
        tag: &'static [u8],
        challenge_label: &'static [u8],
        account: &Address,
        token: &Address,
        key: &EncryptionKey,
        amount: Option<Amount>,
        current: &ChunkedCipherText,
        new_balance: &ChunkedCipherText,
    ) -> Result<()> {
        let mut transcript =
            statement_transcript(tag, account, token, key, amount, current, new_balance)?;
        transcript.append_point(b"X1", &self.x1.compress());
        transcript.append_point(b"X2", &self.x2.compress());
        for x in &self.x3s {
            transcript.append_point(b"X3", &x.compress());
        }
        for x in &self.x4s {
            transcript.append_point(b"X4", &x.compress());
        }
        let rho = transcript.scalar_challenge(challenge_label).x();

        // X1 = (Σ 2^(16i)·a1_i − ρ·w)·G + a2·Σ 2^(16i)·D_cur_i
        //      + ρ·Σ 2^(16i)·C_cur_i
        let mut base_scalar = aggregate_scalar_chunks(&self.a1s);
        if let Some(amount) = amount {
            base_scalar -= rho * Scalar::from(amount);
        }
        let expected_x1 = RistrettoPoint::multiscalar_mul(
            [base_scalar, self.a2, rho],
            [
                base_point(),
                current.aggregate_handles(),
                current.aggregate_commitments(),
            ],
        );
        ensure!(
            self.x1 == expected_x1,
            Error::SigmaVerificationError { check: 1 }
        );

        // X2 = a3·H + ρ·P
        ensure!(
            self.x2
                == RistrettoPoint::multiscalar_mul([self.a3, rho], [*h_generator(), key.point]),
            Error::SigmaVerificationError { check: 2 }
        );

        for i in 0..BALANCE_CHUNKS {
            // X3_i = a1_i·G + a4_i·H + ρ·C_new_i
            ensure!(
                self.x3s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [self.a1s[i], self.a4s[i], rho],
                        [
                            base_point(),
                            *h_generator(),
                            new_balance.0[i].commitment,
                        ],
                    ),
                Error::SigmaVerificationError { check: 3 }
            );

            // X4_i = a4_i·P + ρ·D_new_i
            ensure!(
                self.x4s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [self.a4s[i], rho],
                        [key.point, new_balance.0[i].handle],
                    ),
                Error::SigmaVerificationError { check: 4 }
            );
        }

        Ok(())
    }
}

impl Encode for NewBalanceSigma {
    fn size_hint(&self) -> usize {
        (2 + 2 * BALANCE_CHUNKS) * 32 + (2 + 2 * BALANCE_CHUNKS) * 32
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        encode_points(&[self.x1, self.x2], dest);
        encode_points(&self.x3s, dest);
        encode_points(&self.x4s, dest);
        encode_scalars(&self.a1s, dest);
        ScalarEncoder(&self.a2).encode_to(dest);
        ScalarEncoder(&self.a3).encode_to(dest);
        encode_scalars(&self.a4s, dest);
    }
}

impl Decode for NewBalanceSigma {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let [x1, x2] = decode_points::<I, 2>(input)?;
        let x3s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let x4s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let a1s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;
        let [a2, a3] = decode_scalars::<I, 2>(input)?;
        let a4s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;

        Ok(Self {
            x1,
            x2,
            x3s,
            x4s,
            a1s,
            a2,
            a3,
            a4s,
        })
    }
}
