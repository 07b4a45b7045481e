//! Proof that a confidential transfer is balanced and well-encrypted.
//!
//! One sigma proof binds, under a single challenge: the sender's old and
//! new balances, the transferred amount encrypted to the recipient, and the
//! same amount encrypted to every auditor. Plaintext chunks are shared
//! across recipient and auditor ciphertexts; every party's chunks carry
//! independent fresh randomness.
//!
//! The auditor list is ordered: the transcript absorbs keys and ciphertexts
//! in list order, so the same logical transfer with permuted auditors is a
//! different proof.

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
        base_point, chunked::split_into_chunks, h_generator, ChunkedCipherText, ChunkedRandomness,
        ConfidentialKeys, EncryptionKey,
    },
    errors::{Error, Result},
    proofs::{
        aggregate_scalar_chunks, random_chunk_scalars, scalar_chunks,
        transcript::TranscriptProtocol, withdrawal::decode_versioned, InRangeProof, PROOF_VERSION,
    },
    Amount, Balance, BALANCE_CHUNKS, CHUNK_BITS,
};

/// The domain label for the transfer proof.
pub const TRANSFER_PROOF_LABEL: &[u8] = b"CA-SIGMA-TRANSFER-v1";
/// The domain label for the challenge.
pub const TRANSFER_PROOF_CHALLENGE_LABEL: &[u8] = b"CA-SIGMA-TRANSFER-v1-challenge";

pub const MAX_AUDITORS: usize = 8;

/// An auditor's view of the transfer: their key and the amount encrypted
/// to it, carried inline in the proof.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AuditorLeg {
    pub key: EncryptionKey,
    pub amount: ChunkedCipherText,
}

/// Sigma part of a transfer proof. Commitment and response widths beyond
/// the fixed core are determined by the auditor count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TransferSigma {
    /// Balance-preservation commitment.
    x1: RistrettoPoint,
    /// Sender new-balance handle commitments.
    x2s: [RistrettoPoint; BALANCE_CHUNKS],
    /// Recipient handle commitments.
    x3s: [RistrettoPoint; BALANCE_CHUNKS],
    /// Amount encryption commitments.
    x4s: [RistrettoPoint; BALANCE_CHUNKS],
    /// Sender key-pair relation commitment.
    x5: RistrettoPoint,
    /// Sender new-balance encryption commitments.
    x6s: [RistrettoPoint; BALANCE_CHUNKS],
    /// Per-auditor amount encryption commitments.
    x7s: Vec<[RistrettoPoint; BALANCE_CHUNKS]>,
    /// Per-auditor handle commitments.
    x8s: Vec<[RistrettoPoint; BALANCE_CHUNKS]>,

    /// Responses hiding the new balance chunks.
    a1s: [Scalar; BALANCE_CHUNKS],
    /// Response hiding the sender's decryption key.
    a2: Scalar,
    /// Responses hiding the recipient-leg randomness.
    a3s: [Scalar; BALANCE_CHUNKS],
    /// Responses hiding the amount chunks.
    a4s: [Scalar; BALANCE_CHUNKS],
    /// Response hiding the sender's inverted key.
    a5: Scalar,
    /// Responses hiding the new-balance randomness.
    a6s: [Scalar; BALANCE_CHUNKS],
    /// Per-auditor responses hiding that leg's randomness.
    a7s: Vec<[Scalar; BALANCE_CHUNKS]>,
}

/// Proof bundle carried by a `confidential_transfer` transaction.
#[derive(Clone, Debug)]
pub struct TransferProof {
    pub auditors: Vec<AuditorLeg>,
    pub(crate) sigma: TransferSigma,
    /// Per-chunk bounds on the amount, against the recipient's commitments.
    pub amount_range_proofs: [InRangeProof; BALANCE_CHUNKS],
    /// Per-chunk bounds on the sender's new balance.
    pub balance_range_proofs: [InRangeProof; BALANCE_CHUNKS],
    /// One aggregated proof per auditor leg.
    pub auditor_range_proofs: Vec<InRangeProof>,
}

#[allow(clippy::too_many_arguments)]
fn statement_transcript(
    account: &Address,
    token: &Address,
    sender_key: &EncryptionKey,
    recipient_key: &EncryptionKey,
    auditors: &[AuditorLeg],
    current: &ChunkedCipherText,
    new_balance: &ChunkedCipherText,
    recipient_amount: &ChunkedCipherText,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(TRANSFER_PROOF_LABEL);
    transcript.append_domain_separator(TRANSFER_PROOF_LABEL);
    transcript.append_address(b"account", account);
    transcript.append_address(b"token", token);
    transcript.append_key(b"sender-ek", sender_key)?;
    transcript.append_key(b"recipient-ek", recipient_key)?;
    for leg in auditors {
        transcript.append_key(b"auditor-ek", &leg.key)?;
    }
    transcript.append_chunked_ciphertext(b"current", current);
    transcript.append_chunked_ciphertext(b"new", new_balance);
    transcript.append_chunked_ciphertext(b"recipient-amount", recipient_amount);
    for leg in auditors {
        transcript.append_chunked_ciphertext(b"auditor-amount", &leg.amount);
    }
    Ok(transcript)
}

impl TransferSigma {
    fn append_commitments(&self, transcript: &mut Transcript) {
        transcript.append_point(b"X1", &self.x1.compress());
        for x in &self.x2s {
            transcript.append_point(b"X2", &x.compress());
        }
        for x in &self.x3s {
            transcript.append_point(b"X3", &x.compress());
        }
        for x in &self.x4s {
            transcript.append_point(b"X4", &x.compress());
        }
        transcript.append_point(b"X5", &self.x5.compress());
        for x in &self.x6s {
            transcript.append_point(b"X6", &x.compress());
        }
        for xs in &self.x7s {
            for x in xs {
                transcript.append_point(b"X7", &x.compress());
            }
        }
        for xs in &self.x8s {
            for x in xs {
                transcript.append_point(b"X8", &x.compress());
            }
        }
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        encode_points(&[self.x1], dest);
        encode_points(&self.x2s, dest);
        encode_points(&self.x3s, dest);
        encode_points(&self.x4s, dest);
        encode_points(&[self.x5], dest);
        encode_points(&self.x6s, dest);
        for xs in &self.x7s {
            encode_points(xs, dest);
        }
        for xs in &self.x8s {
            encode_points(xs, dest);
        }
        encode_scalars(&self.a1s, dest);
        ScalarEncoder(&self.a2).encode_to(dest);
        encode_scalars(&self.a3s, dest);
        encode_scalars(&self.a4s, dest);
        ScalarEncoder(&self.a5).encode_to(dest);
        encode_scalars(&self.a6s, dest);
        for scalars in &self.a7s {
            encode_scalars(scalars, dest);
        }
    }

    fn decode_with_auditors<I: Input>(input: &mut I, count: usize) -> Result<Self, CodecError> {
        let [x1] = decode_points::<I, 1>(input)?;
        let x2s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let x3s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let x4s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let [x5] = decode_points::<I, 1>(input)?;
        let x6s = decode_points::<I, BALANCE_CHUNKS>(input)?;
        let mut x7s = Vec::with_capacity(count);
        for _ in 0..count {
            x7s.push(decode_points::<I, BALANCE_CHUNKS>(input)?);
        }
        let mut x8s = Vec::with_capacity(count);
        for _ in 0..count {
            x8s.push(decode_points::<I, BALANCE_CHUNKS>(input)?);
        }
        let a1s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;
        let [a2] = decode_scalars::<I, 1>(input)?;
        let a3s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;
        let a4s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;
        let [a5] = decode_scalars::<I, 1>(input)?;
        let a6s = decode_scalars::<I, BALANCE_CHUNKS>(input)?;
        let mut a7s = Vec::with_capacity(count);
        for _ in 0..count {
            a7s.push(decode_scalars::<I, BALANCE_CHUNKS>(input)?);
        }

        Ok(Self {
            x1,
            x2s,
            x3s,
            x4s,
            x5,
            x6s,
            x7s,
            x8s,
            a1s,
            a2,
            a3s,
            a4s,
            a5,
            a6s,
            a7s,
        })
    }
}

impl TransferProof {
    /// Build the transfer proof plus the two ciphertexts the transaction
    /// installs: the sender's new available balance and the recipient's
    /// encrypted amount. Auditor ciphertexts travel inside the proof.
    ///
    /// `balance` is the decrypted plaintext of `current`.
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: RngCore + CryptoRng>(
        sender: &ConfidentialKeys,
        account: &Address,
        token: &Address,
        recipient_key: &EncryptionKey,
        auditor_keys: &[EncryptionKey],
        amount: Amount,
        balance: Balance,
        current: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<(Self, ChunkedCipherText, ChunkedCipherText)> {
        ensure!(auditor_keys.len() <= MAX_AUDITORS, Error::TooManyAuditors);
        ensure!(
            balance >= amount as Balance,
            Error::InsufficientBalance { balance, amount }
        );
        current.verify_value(&sender.secret, balance)?;

        let new_value = balance - amount as Balance;
        let (new_randomness, new_balance) =
            ChunkedCipherText::encrypt(&sender.public, new_value, rng);
        let (amount_randomness, recipient_amount) =
            ChunkedCipherText::encrypt(recipient_key, amount as Balance, rng);

        let mut auditor_randomness: Vec<ChunkedRandomness> = Vec::with_capacity(auditor_keys.len());
        let mut auditors = Vec::with_capacity(auditor_keys.len());
        for key in auditor_keys {
            let (randomness, cipher_text) =
                ChunkedCipherText::encrypt(key, amount as Balance, rng);
            auditor_randomness.push(randomness);
            auditors.push(AuditorLeg {
                key: *key,
                amount: cipher_text,
            });
        }

        let mut transcript = statement_transcript(
            account,
            token,
            &sender.public,
            recipient_key,
            &auditors,
            current,
            &new_balance,
            &recipient_amount,
        )?;
        let secret = sender.secret.secret();
        let mut rng = transcript.witness_rng(secret.as_bytes(), rng);

        let k1s = random_chunk_scalars(&mut rng);
        let k2 = Scalar::random(&mut rng);
        let k3s = random_chunk_scalars(&mut rng);
        let k4s = random_chunk_scalars(&mut rng);
        let k5 = Scalar::random(&mut rng);
        let k6s = random_chunk_scalars(&mut rng);
        let k7s: Vec<[Scalar; BALANCE_CHUNKS]> = (0..auditors.len())
            .map(|_| random_chunk_scalars(&mut rng))
            .collect();

        let handle_diff = current.aggregate_handles() - new_balance.aggregate_handles();
        let x1 = RistrettoPoint::multiscalar_mul(
            [
                aggregate_scalar_chunks(&k1s),
                aggregate_scalar_chunks(&k6s) - aggregate_scalar_chunks(&k3s),
                k2,
            ],
            [base_point(), *h_generator(), handle_diff],
        );
        let mut x2s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        let mut x3s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        let mut x4s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        let mut x6s = [RistrettoPoint::default(); BALANCE_CHUNKS];
        for i in 0..BALANCE_CHUNKS {
            x2s[i] = k6s[i] * sender.public.point;
            x3s[i] = k3s[i] * recipient_key.point;
            x4s[i] =
                RistrettoPoint::multiscalar_mul([k4s[i], k3s[i]], [base_point(), *h_generator()]);
            x6s[i] =
                RistrettoPoint::multiscalar_mul([k1s[i], k6s[i]], [base_point(), *h_generator()]);
        }
        let x5 = k5 * h_generator();
        let mut x7s = Vec::with_capacity(auditors.len());
        let mut x8s = Vec::with_capacity(auditors.len());
        for (j, leg) in auditors.iter().enumerate() {
            let mut xc = [RistrettoPoint::default(); BALANCE_CHUNKS];
            let mut xh = [RistrettoPoint::default(); BALANCE_CHUNKS];
            for i in 0..BALANCE_CHUNKS {
                xc[i] = RistrettoPoint::multiscalar_mul(
                    [k4s[i], k7s[j][i]],
                    [base_point(), *h_generator()],
                );
                xh[i] = k7s[j][i] * leg.key.point;
            }
            x7s.push(xc);
            x8s.push(xh);
        }

        let mut sigma = TransferSigma {
            x1,
            x2s,
            x3s,
            x4s,
            x5,
            x6s,
            x7s,
            x8s,
            a1s: [Scalar::ZERO; BALANCE_CHUNKS],
            a2: Scalar::ZERO,
            a3s: [Scalar::ZERO; BALANCE_CHUNKS],
            a4s: [Scalar::ZERO; BALANCE_CHUNKS],
            a5: Scalar::ZERO,
            a6s: [Scalar::ZERO; BALANCE_CHUNKS],
            a7s: Vec::new(),
        };
        sigma.append_commitments(&mut transcript);
        let rho = transcript
            .scalar_challenge(TRANSFER_PROOF_CHALLENGE_LABEL)
            .x();

        let balance_chunks = scalar_chunks(new_value);
        let amount_chunks = scalar_chunks(amount as Balance);
        for i in 0..BALANCE_CHUNKS {
            sigma.a1s[i] = k1s[i] - rho * balance_chunks[i];
            sigma.a3s[i] = k3s[i] - rho * amount_randomness.0[i];
            sigma.a4s[i] = k4s[i] - rho * amount_chunks[i];
            sigma.a6s[i] = k6s[i] - rho * new_randomness.0[i];
        }
        sigma.a2 = k2 - rho * secret;
        sigma.a5 = k5 - rho * secret.invert();
        sigma.a7s = k7s
            .iter()
            .zip(auditor_randomness.iter())
            .map(|(nonces, randomness)| {
                let mut responses = [Scalar::ZERO; BALANCE_CHUNKS];
                for i in 0..BALANCE_CHUNKS {
                    responses[i] = nonces[i] - rho * randomness.0[i];
                }
                responses
            })
            .collect();

        let amount_values = split_into_chunks(amount as Balance);
        let amount_range_proofs =
            InRangeProof::prove_chunks(&amount_values, &amount_randomness.0, &mut rng)?;
        let balance_range_proofs =
            InRangeProof::prove_chunks(&split_into_chunks(new_value), &new_randomness.0, &mut rng)?;
        let mut auditor_range_proofs = Vec::with_capacity(auditors.len());
        for randomness in &auditor_randomness {
            auditor_range_proofs.push(InRangeProof::prove_multiple(
                &amount_values,
                &randomness.0,
                CHUNK_BITS,
                &mut rng,
            )?);
        }

        Ok((
            TransferProof {
                auditors,
                sigma,
                amount_range_proofs,
                balance_range_proofs,
                auditor_range_proofs,
            },
            new_balance,
            recipient_amount,
        ))
    }

    /// Verify the bundle from public data only.
    #[allow(clippy::too_many_arguments)]
    pub fn verify<R: RngCore + CryptoRng>(
        &self,
        account: &Address,
        token: &Address,
        sender_key: &EncryptionKey,
        recipient_key: &EncryptionKey,
        current: &ChunkedCipherText,
        new_balance: &ChunkedCipherText,
        recipient_amount: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<()> {
        let count = self.auditors.len();
        ensure!(count <= MAX_AUDITORS, Error::TooManyAuditors);
        ensure!(
            self.sigma.x7s.len() == count
                && self.sigma.x8s.len() == count
                && self.sigma.a7s.len() == count
                && self.auditor_range_proofs.len() == count,
            Error::WrongNumberOfAuditors
        );

        let mut transcript = statement_transcript(
            account,
            token,
            sender_key,
            recipient_key,
            &self.auditors,
            current,
            new_balance,
            recipient_amount,
        )?;
        self.sigma.append_commitments(&mut transcript);
        let rho = transcript
            .scalar_challenge(TRANSFER_PROOF_CHALLENGE_LABEL)
            .x();
        let sigma = &self.sigma;

        // X1 = Σ(2^16i·a1_i)·G + (Σ 2^16i·a6_i − Σ 2^16i·a3_i)·H
        //      + a2·(ΣD_cur − ΣD_new) + ρ·(ΣC_cur − ΣC_amount)
        let expected_x1 = RistrettoPoint::multiscalar_mul(
            [
                aggregate_scalar_chunks(&sigma.a1s),
                aggregate_scalar_chunks(&sigma.a6s) - aggregate_scalar_chunks(&sigma.a3s),
                sigma.a2,
                rho,
            ],
            [
                base_point(),
                *h_generator(),
                current.aggregate_handles() - new_balance.aggregate_handles(),
                current.aggregate_commitments() - recipient_amount.aggregate_commitments(),
            ],
        );
        ensure!(
            sigma.x1 == expected_x1,
            Error::SigmaVerificationError { check: 1 }
        );

        for i in 0..BALANCE_CHUNKS {
            // X2_i = a6_i·P_s + ρ·D_new_i
            ensure!(
                sigma.x2s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [sigma.a6s[i], rho],
                        [sender_key.point, new_balance.0[i].handle],
                    ),
                Error::SigmaVerificationError { check: 2 }
            );

            // X3_i = a3_i·P_r + ρ·D_amount_i
            ensure!(
                sigma.x3s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [sigma.a3s[i], rho],
                        [recipient_key.point, recipient_amount.0[i].handle],
                    ),
                Error::SigmaVerificationError { check: 3 }
            );

            // X4_i = a4_i·G + a3_i·H + ρ·C_amount_i
            ensure!(
                sigma.x4s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [sigma.a4s[i], sigma.a3s[i], rho],
                        [
                            base_point(),
                            *h_generator(),
                            recipient_amount.0[i].commitment,
                        ],
                    ),
                Error::SigmaVerificationError { check: 4 }
            );

            // X6_i = a1_i·G + a6_i·H + ρ·C_new_i
            ensure!(
                sigma.x6s[i]
                    == RistrettoPoint::multiscalar_mul(
                        [sigma.a1s[i], sigma.a6s[i], rho],
                        [base_point(), *h_generator(), new_balance.0[i].commitment],
                    ),
                Error::SigmaVerificationError { check: 6 }
            );
        }

        // X5 = a5·H + ρ·P_s
        ensure!(
            sigma.x5
                == RistrettoPoint::multiscalar_mul(
                    [sigma.a5, rho],
                    [*h_generator(), sender_key.point],
                ),
            Error::SigmaVerificationError { check: 5 }
        );

        for (j, leg) in self.auditors.iter().enumerate() {
            for i in 0..BALANCE_CHUNKS {
                // X7_ji = a4_i·G + a7_ji·H + ρ·C_auditor_ji
                ensure!(
                    sigma.x7s[j][i]
                        == RistrettoPoint::multiscalar_mul(
                            [sigma.a4s[i], sigma.a7s[j][i], rho],
                            [base_point(), *h_generator(), leg.amount.0[i].commitment],
                        ),
                    Error::SigmaVerificationError { check: 7 }
                );

                // X8_ji = a7_ji·P_aj + ρ·D_auditor_ji
                ensure!(
                    sigma.x8s[j][i]
                        == RistrettoPoint::multiscalar_mul(
                            [sigma.a7s[j][i], rho],
                            [leg.key.point, leg.amount.0[i].handle],
                        ),
                    Error::SigmaVerificationError { check: 8 }
                );
            }
        }

        let amount_commitments = recipient_amount.compressed_commitments();
        InRangeProof::verify_batch(
            amount_commitments.iter().zip(self.amount_range_proofs.iter()),
            CHUNK_BITS,
            rng,
        )?;
        let balance_commitments = new_balance.compressed_commitments();
        InRangeProof::verify_batch(
            balance_commitments.iter().zip(self.balance_range_proofs.iter()),
            CHUNK_BITS,
            rng,
        )?;
        for (leg, proof) in self.auditors.iter().zip(self.auditor_range_proofs.iter()) {
            proof.verify_multiple(&leg.amount.compressed_commitments(), CHUNK_BITS, rng)?;
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode_versioned(bytes, "transfer proof")
    }
}

impl Encode for TransferProof {
    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        PROOF_VERSION.encode_to(dest);
        (self.auditors.len() as u8).encode_to(dest);
        for leg in &self.auditors {
            leg.encode_to(dest);
        }
        self.sigma.encode_to(dest);
        for proof in &self.amount_range_proofs {
            proof.encode_to(dest);
        }
        for proof in &self.balance_range_proofs {
            proof.encode_to(dest);
        }
        for proof in &self.auditor_range_proofs {
            proof.encode_to(dest);
        }
    }
}

impl Decode for TransferProof {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        decode_version(input, PROOF_VERSION)?;
        let count = u8::decode(input)? as usize;
        if count > MAX_AUDITORS {
            return Err(CodecError::from("too many auditors"));
        }
        let mut auditors = Vec::with_capacity(count);
        for _ in 0..count {
            auditors.push(AuditorLeg::decode(input)?);
        }
        let sigma = TransferSigma::decode_with_auditors(input, count)?;
        let amount_range_proofs = decode_fixed::<InRangeProof, I, BALANCE_CHUNKS>(input)?;
        let balance_range_proofs = decode_fixed::<InRangeProof, I, BALANCE_CHUNKS>(input)?;
        let mut auditor_range_proofs = Vec::with_capacity(count);
        for _ in 0..count {
            auditor_range_proofs.push(InRangeProof::decode(input)?);
        }

        Ok(Self {
            auditors,
            sigma,
            amount_range_proofs,
            balance_range_proofs,
            auditor_range_proofs,
        })
    }
}
