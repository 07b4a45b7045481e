//! Fiat-Shamir transcript discipline shared by all sigma proofs.
//!
//! A transcript absorbs, in fixed order: the proof's domain tag, the account
//! and token addresses, the public keys, the input and output ciphertexts,
//! and finally every prover commitment. The challenge is extracted once at
//! the end; verifiers rebuild the transcript identically.

use curve25519_dalek::{
    ristretto::CompressedRistretto, scalar::Scalar, traits::IsIdentity,
};
use merlin::{Transcript, TranscriptRng};
use rand_core::{CryptoRng, RngCore};

use crate::{
    chain::Address,
    elgamal::{ChunkedCipherText, CipherText, EncryptionKey},
    errors::{Error, Result},
};

/// The challenge scalar of a sigma protocol round.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ZKPChallenge {
    x: Scalar,
}

impl ZKPChallenge {
    pub fn x(&self) -> Scalar {
        self.x
    }
}

impl From<Scalar> for ZKPChallenge {
    fn from(x: Scalar) -> Self {
        ZKPChallenge { x }
    }
}

pub trait TranscriptProtocol {
    fn append_domain_separator(&mut self, label: &'static [u8]);

    fn append_address(&mut self, label: &'static [u8], address: &Address);

    /// Absorb a point that may legitimately be the identity (ciphertext
    /// components of randomness-free encodings).
    fn append_point(&mut self, label: &'static [u8], point: &CompressedRistretto);

    /// Absorb a point that must not be the identity (keys, commitments).
    fn append_validated_point(
        &mut self,
        label: &'static [u8],
        point: &CompressedRistretto,
    ) -> Result<()>;

    fn append_key(&mut self, label: &'static [u8], key: &EncryptionKey) -> Result<()>;

    fn append_ciphertext(&mut self, label: &'static [u8], cipher_text: &CipherText);

    fn append_chunked_ciphertext(&mut self, label: &'static [u8], chunks: &ChunkedCipherText);

    fn append_u64(&mut self, label: &'static [u8], value: u64);

    /// Extract the challenge. Called exactly once, after all absorptions.
    fn scalar_challenge(&mut self, label: &'static [u8]) -> ZKPChallenge;

    /// Build a transcript-bound RNG rekeyed with secret witness bytes, so
    /// prover nonces are fresh per call yet bound to the statement.
    fn witness_rng<R: RngCore + CryptoRng>(&self, witness: &[u8], rng: &mut R) -> TranscriptRng;
}

impl TranscriptProtocol for Transcript {
    fn append_domain_separator(&mut self, label: &'static [u8]) {
        self.append_message(b"dom-sep", label);
    }

    fn append_address(&mut self, label: &'static [u8], address: &Address) {
        self.append_message(label, address.as_bytes());
    }

    fn append_point(&mut self, label: &'static [u8], point: &CompressedRistretto) {
        self.append_message(label, point.as_bytes());
    }

    fn append_validated_point(
        &mut self,
        label: &'static [u8],
        point: &CompressedRistretto,
    ) -> Result<()> {
        ensure!(
            !point.is_identity(),
            Error::InvalidEncoding("unexpected identity point in transcript")
        );
        self.append_message(label, point.as_bytes());
        Ok(())
    }

    fn append_key(&mut self, label: &'static [u8], key: &EncryptionKey) -> Result<()> {
        self.append_validated_point(label, &key.point.compress())
    }

    fn append_ciphertext(&mut self, label: &'static [u8], cipher_text: &CipherText) {
        self.append_point(label, &cipher_text.commitment.compress());
        self.append_point(label, &cipher_text.handle.compress());
    }

    fn append_chunked_ciphertext(&mut self, label: &'static [u8], chunks: &ChunkedCipherText) {
        for chunk in &chunks.0 {
            self.append_ciphertext(label, chunk);
        }
    }

    fn append_u64(&mut self, label: &'static [u8], value: u64) {
        self.append_message(label, &value.to_le_bytes());
    }

    fn scalar_challenge(&mut self, label: &'static [u8]) -> ZKPChallenge {
        let mut buf = [0u8; 64];
        self.challenge_bytes(label, &mut buf);
        Scalar::from_bytes_mod_order_wide(&buf).into()
    }

    fn witness_rng<R: RngCore + CryptoRng>(&self, witness: &[u8], rng: &mut R) -> TranscriptRng {
        self.build_rng()
            .rekey_with_witness_bytes(b"witness", witness)
            .finalize(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::traits::Identity;
    use curve25519_dalek::ristretto::RistrettoPoint;

    #[test]
    fn identical_transcripts_yield_identical_challenges() {
        let account = Address::new([1u8; 32]);
        let token = Address::new([2u8; 32]);

        let run = || {
            let mut t = Transcript::new(b"test");
            t.append_domain_separator(b"test-proof");
            t.append_address(b"account", &account);
            t.append_address(b"token", &token);
            t.append_u64(b"amount", 500);
            t.scalar_challenge(b"challenge")
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn absorption_order_matters() {
        let mut t1 = Transcript::new(b"test");
        t1.append_u64(b"a", 1);
        t1.append_u64(b"b", 2);

        let mut t2 = Transcript::new(b"test");
        t2.append_u64(b"b", 2);
        t2.append_u64(b"a", 1);

        assert_ne!(
            t1.scalar_challenge(b"challenge"),
            t2.scalar_challenge(b"challenge")
        );
    }

    #[test]
    fn identity_rejected_for_keys() {
        let mut t = Transcript::new(b"test");
        let identity = RistrettoPoint::identity().compress();
        assert!(t.append_validated_point(b"key", &identity).is_err());
        // Ciphertext components may be the identity.
        t.append_point(b"ct", &identity);
    }
}
