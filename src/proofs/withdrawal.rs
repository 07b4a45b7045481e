//! Proof that a withdrawal leaves a correctly re-encrypted balance.
//!
//! The prover claims `new = current − amount` for a public `amount`, shows
//! knowledge of the decryption key, and binds every new chunk to
//! `[0, 2^16)` so the subtraction cannot wrap.

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use rand_core::{CryptoRng, RngCore};

use crate::{
    chain::Address,
    codec::{decode_fixed, decode_version},
    elgamal::{chunked::split_into_chunks, ChunkedCipherText, ConfidentialKeys, EncryptionKey},
    errors::{Error, Result},
    proofs::{new_balance::NewBalanceSigma, InRangeProof, PROOF_VERSION},
    Amount, Balance, BALANCE_CHUNKS, CHUNK_BITS,
};

/// The domain label for the withdrawal proof.
pub const WITHDRAWAL_PROOF_LABEL: &[u8] = b"CA-SIGMA-WITHDRAW-v1";
/// The domain label for the challenge.
pub const WITHDRAWAL_PROOF_CHALLENGE_LABEL: &[u8] = b"CA-SIGMA-WITHDRAW-v1-challenge";

/// Proof bundle carried by a `withdraw` transaction.
#[derive(Clone, Debug)]
pub struct WithdrawalProof {
    pub(crate) sigma: NewBalanceSigma,
    pub range_proofs: [InRangeProof; BALANCE_CHUNKS],
}

impl WithdrawalProof {
    /// Build the proof and the new available ciphertext it certifies.
    ///
    /// `balance` is the decrypted plaintext of `current`; the caller must
    /// have refreshed it immediately before proving.
    pub fn new<R: RngCore + CryptoRng>(
        keys: &ConfidentialKeys,
        account: &Address,
        token: &Address,
        amount: Amount,
        balance: Balance,
        current: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<(Self, ChunkedCipherText)> {
        ensure!(
            balance >= amount as Balance,
            Error::InsufficientBalance { balance, amount }
        );
        current.verify_value(&keys.secret, balance)?;

        let new_value = balance - amount as Balance;
        let (randomness, new_balance) = ChunkedCipherText::encrypt(&keys.public, new_value, rng);

        let sigma = NewBalanceSigma::prove(
            WITHDRAWAL_PROOF_LABEL,
            WITHDRAWAL_PROOF_CHALLENGE_LABEL,
            account,
            token,
            keys,
            Some(amount),
            current,
            new_value,
            &new_balance,
            &randomness,
            rng,
        )?;
        let range_proofs =
            InRangeProof::prove_chunks(&split_into_chunks(new_value), &randomness.0, rng)?;

        Ok((
            WithdrawalProof {
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
        key: &EncryptionKey,
        amount: Amount,
        current: &ChunkedCipherText,
        new_balance: &ChunkedCipherText,
        rng: &mut R,
    ) -> Result<()> {
        self.sigma.verify(
            WITHDRAWAL_PROOF_LABEL,
            WITHDRAWAL_PROOF_CHALLENGE_LABEL,
            account,
            token,
            key,
            Some(amount),
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

    /// Decode, checking the version prefix first and rejecting trailing
    /// bytes so every proof has exactly one encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode_versioned(bytes, "withdrawal proof")
    }
}

impl Encode for WithdrawalProof {
    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        PROOF_VERSION.encode_to(dest);
        self.sigma.encode_to(dest);
        for proof in &self.range_proofs {
            proof.encode_to(dest);
        }
    }
}

impl Decode for WithdrawalProof {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        decode_version(input, PROOF_VERSION)?;
        Ok(Self {
            sigma: NewBalanceSigma::decode(input)?,
            range_proofs: decode_fixed::<InRangeProof, I, BALANCE_CHUNKS>(input)?,
        })
    }
}

/// Shared versioned-decode helper for all proof bundles.
pub(crate) fn decode_versioned<T: Decode>(bytes: &[u8], what: &'static str) -> Result<T> {
    let input = &mut &bytes[..];
    let version = u16::decode(input).map_err(|_| Error::InvalidEncoding(what))?;
    ensure!(version == PROOF_VERSION, Error::UnsupportedVersion(version));

    // Re-decode from the top so `T::decode` sees its version prefix.
    let input = &mut &bytes[..];
    let value = T::decode(input).map_err(|_| Error::InvalidEncoding(what))?;
    ensure!(input.is_empty(), Error::InvalidEncoding(what));
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const SEED_1: [u8; 32] = [17u8; 32];

    fn fixture() -> (
        ConfidentialKeys,
        Address,
        Address,
        ChunkedCipherText,
        StdRng,
    ) {
        let mut rng = StdRng::from_seed(SEED_1);
        let keys = ConfidentialKeys::generate(&mut rng);
        let account = Address::new([3u8; 32]);
        let token = Address::new([4u8; 32]);
        let (_, current) = ChunkedCipherText::encrypt(&keys.public, 1_000_000_000, &mut rng);
        (keys, account, token, current, rng)
    }

    #[test]
    fn withdrawal_proof_round_trip() {
        let (keys, account, token, current, mut rng) = fixture();

        let (proof, new_balance) = WithdrawalProof::new(
            &keys,
            &account,
            &token,
            400_000_000,
            1_000_000_000,
            &current,
            &mut rng,
        )
        .unwrap();

        assert!(proof
            .verify(
                &account,
                &token,
                &keys.public,
                400_000_000,
                &current,
                &new_balance,
                &mut rng,
            )
            .is_ok());
        assert_eq!(new_balance.decrypt(&keys.secret).unwrap(), 600_000_000);
    }

    #[test]
    fn wrong_amount_fails_verification() {
        let (keys, account, token, current, mut rng) = fixture();
        let (proof, new_balance) = WithdrawalProof::new(
            &keys,
            &account,
            &token,
            400_000_000,
            1_000_000_000,
            &current,
            &mut rng,
        )
        .unwrap();

        assert_err!(
            proof.verify(
                &account,
                &token,
                &keys.public,
                400_000_001,
                &current,
                &new_balance,
                &mut rng,
            ),
            Error::SigmaVerificationError { check: 1 }
        );
    }

    #[test]
    fn wrong_statement_addresses_fail_verification() {
        let (keys, account, token, current, mut rng) = fixture();
        let (proof, new_balance) = WithdrawalProof::new(
            &keys,
            &account,
            &token,
            1,
            1_000_000_000,
            &current,
            &mut rng,
        )
        .unwrap();

        let other = Address::new([9u8; 32]);
        assert!(proof
            .verify(
                &other,
                &token,
                &keys.public,
                1,
                &current,
                &new_balance,
                &mut rng,
            )
            .is_err());
    }

    #[test]
    fn overdraw_is_rejected_locally() {
        let (keys, account, token, current, mut rng) = fixture();
        assert_err!(
            WithdrawalProof::new(
                &keys,
                &account,
                &token,
                2_000_000_000,
                1_000_000_000,
                &current,
                &mut rng,
            )
            .map(|_| ()),
            Error::InsufficientBalance {
                balance: 1_000_000_000,
                amount: 2_000_000_000
            }
        );
    }

    #[test]
    fn codec_round_trip_and_version_check() {
        let (keys, account, token, current, mut rng) = fixture();
        let (proof, new_balance) = WithdrawalProof::new(
            &keys,
            &account,
            &token,
            7,
            1_000_000_000,
            &current,
            &mut rng,
        )
        .unwrap();

        let bytes = proof.to_bytes();
        // 2-byte version, 18 + 18 fixed-width sigma words, then eight
        // length-prefixed 16-bit bulletproofs of (2·log2(16) + 9)·32 bytes.
        assert_eq!(bytes.len(), 2 + 36 * 32 + 8 * (4 + 17 * 32));

        let decoded = WithdrawalProof::from_bytes(&bytes).unwrap();
        assert!(decoded
            .verify(
                &account,
                &token,
                &keys.public,
                7,
                &current,
                &new_balance,
                &mut rng,
            )
            .is_ok());
        assert_eq!(decoded.to_bytes(), bytes);

        // Flipping the version prefix must fail with UnsupportedVersion.
        let mut tampered = bytes.clone();
        tampered[0] = 0xff;
        tampered[1] = 0xff;
        assert_err!(
            WithdrawalProof::from_bytes(&tampered).map(|_| ()),
            Error::UnsupportedVersion(0xffff)
        );

        // Trailing bytes are not canonical.
        let mut padded = bytes;
        padded.push(0);
        assert_err!(
            WithdrawalProof::from_bytes(&padded).map(|_| ()),
            Error::InvalidEncoding("withdrawal proof")
        );
    }
}
