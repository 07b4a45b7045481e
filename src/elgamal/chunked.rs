//! Chunked ciphertexts for 128-bit balances.
//!
//! A balance is split little-endian into eight 16-bit chunks, each chunk
//! encrypted independently with fresh randomness. Chunk 0 holds the least
//! significant bits; the wire form is the 512-byte concatenation of the
//! chunk ciphertexts.
//!
//! Homomorphic addition operates per chunk, so chunks of an accumulated
//! ciphertext can outgrow 16 bits; such a ciphertext is *unnormalized* and
//! must be re-encrypted (with a normalization proof) before it can be spent.

use core::ops::{Add, AddAssign, Sub, SubAssign};

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar, traits::MultiscalarMul};
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    codec::decode_fixed,
    elgamal::{CipherText, CommitmentWitness, DecryptionKey, EncryptionKey},
    errors::{Error, Result},
    Balance, BALANCE_CHUNKS, CHUNK_BITS,
};

lazy_static::lazy_static! {
    /// Scalar weights `2^(16·i)` used to recompose chunked values.
    static ref CHUNK_POWERS: [Scalar; BALANCE_CHUNKS] = {
        let mut powers = [Scalar::ONE; BALANCE_CHUNKS];
        for (i, power) in powers.iter_mut().enumerate() {
            *power = Scalar::from(1u128 << (CHUNK_BITS as usize * i));
        }
        powers
    };
}

/// The scalar weight of chunk `i`.
pub(crate) fn chunk_power(i: usize) -> Scalar {
    CHUNK_POWERS[i]
}

/// Split a balance into its 16-bit chunks, least significant first.
pub fn split_into_chunks(balance: Balance) -> [u64; BALANCE_CHUNKS] {
    let mut chunks = [0u64; BALANCE_CHUNKS];
    for (i, chunk) in chunks.iter_mut().enumerate() {
        *chunk = ((balance >> (CHUNK_BITS as usize * i)) & 0xffff) as u64;
    }
    chunks
}

/// Recompose `Σ chunk_i · 2^(16·i)`. Chunks wider than 16 bits are allowed
/// (unnormalized reads); the sum must still fit in 128 bits.
pub fn recompose_chunks(chunks: &[u64; BALANCE_CHUNKS]) -> Result<Balance> {
    let mut balance: Balance = 0;
    for (i, &chunk) in chunks.iter().enumerate() {
        let term = (chunk as Balance)
            .checked_shl((CHUNK_BITS as usize * i) as u32)
            .filter(|term| term >> (CHUNK_BITS as usize * i) == chunk as Balance)
            .ok_or(Error::AmountOutOfRange { max_bits: 128 })?;
        balance = balance
            .checked_add(term)
            .ok_or(Error::AmountOutOfRange { max_bits: 128 })?;
    }
    Ok(balance)
}

/// The blinding factors of a freshly encrypted chunked ciphertext.
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub struct ChunkedRandomness(pub [Scalar; BALANCE_CHUNKS]);

/// Eight independently encrypted 16-bit chunks of one balance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkedCipherText(pub [CipherText; BALANCE_CHUNKS]);

impl ChunkedCipherText {
    /// All chunks zero with zero randomness. Account initialization.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Encode a public balance with no randomness (deposit-side encoding).
    pub fn from_value(balance: Balance) -> Self {
        let chunks = split_into_chunks(balance);
        ChunkedCipherText(chunks.map(|chunk| CipherText::from_value(chunk.into())))
    }

    /// Encrypt a balance under `key` with fresh per-chunk randomness.
    pub fn encrypt<R: RngCore + CryptoRng>(
        key: &EncryptionKey,
        balance: Balance,
        rng: &mut R,
    ) -> (ChunkedRandomness, Self) {
        let mut blindings = [Scalar::ZERO; BALANCE_CHUNKS];
        for blinding in blindings.iter_mut() {
            *blinding = Scalar::random(rng);
        }
        let randomness = ChunkedRandomness(blindings);
        let cipher_text = Self::encrypt_with(key, balance, &randomness);
        (randomness, cipher_text)
    }

    /// Encrypt with caller-supplied randomness.
    pub fn encrypt_with(
        key: &EncryptionKey,
        balance: Balance,
        randomness: &ChunkedRandomness,
    ) -> Self {
        let chunks = split_into_chunks(balance);
        let mut cipher_texts = [CipherText::zero(); BALANCE_CHUNKS];
        for (i, cipher_text) in cipher_texts.iter_mut().enumerate() {
            let witness = CommitmentWitness::new(chunks[i].into(), randomness.0[i]);
            *cipher_text = key.encrypt(&witness);
        }
        ChunkedCipherText(cipher_texts)
    }

    /// Decrypt all chunks with the 16-bit search and recompose the balance.
    pub fn decrypt(&self, key: &DecryptionKey) -> Result<Balance> {
        self.decrypt_with_bits(key, CHUNK_BITS)
    }

    /// Decrypt with a wider per-chunk search bound. Needed to read an
    /// unnormalized balance whose chunks have outgrown 16 bits.
    pub fn decrypt_with_bits(&self, key: &DecryptionKey, max_bits: u32) -> Result<Balance> {
        #[cfg(feature = "rayon")]
        let chunks = {
            use rayon::prelude::*;
            let decrypted: Vec<u64> = self
                .0
                .par_iter()
                .enumerate()
                .map(|(i, chunk)| {
                    key.decrypt_with_bits(chunk, max_bits)
                        .map_err(|_| Error::ChunkDecryptFailed(i))
                })
                .collect::<Result<_>>()?;
            decrypted
                .try_into()
                .map_err(|_| Error::AmountOutOfRange { max_bits })?
        };

        #[cfg(not(feature = "rayon"))]
        let chunks = {
            let mut decrypted = [0u64; BALANCE_CHUNKS];
            for (i, chunk) in self.0.iter().enumerate() {
                decrypted[i] = key
                    .decrypt_with_bits(chunk, max_bits)
                    .map_err(|_| Error::ChunkDecryptFailed(i))?;
            }
            decrypted
        };

        recompose_chunks(&chunks)
    }

    /// True iff every chunk decrypts to zero. Avoids the DL search.
    pub fn decrypts_to_zero(&self, key: &DecryptionKey) -> bool {
        use curve25519_dalek::traits::Identity;
        self.0
            .iter()
            .all(|chunk| key.decrypt_point(chunk) == RistrettoPoint::identity())
    }

    /// Check against a known balance without searching:
    /// `Σ 2^(16i)·(C_i − d·D_i)` must equal `balance·G`.
    pub fn verify_value(&self, key: &DecryptionKey, balance: Balance) -> Result<()> {
        ensure!(
            self.aggregate_decrypted(key) == Scalar::from(balance) * crate::elgamal::base_point(),
            Error::ProofFailed("known-balance check")
        );
        Ok(())
    }

    /// `Σ 2^(16i)·(C_i − d·D_i)`, the aggregated decrypted group element.
    pub fn aggregate_decrypted(&self, key: &DecryptionKey) -> RistrettoPoint {
        self.aggregate_commitments() - key.secret() * self.aggregate_handles()
    }

    /// `Σ 2^(16i)·C_i`.
    pub fn aggregate_commitments(&self) -> RistrettoPoint {
        RistrettoPoint::multiscalar_mul(
            CHUNK_POWERS.iter(),
            self.0.iter().map(|chunk| &chunk.commitment),
        )
    }

    /// `Σ 2^(16i)·D_i`.
    pub fn aggregate_handles(&self) -> RistrettoPoint {
        RistrettoPoint::multiscalar_mul(
            CHUNK_POWERS.iter(),
            self.0.iter().map(|chunk| &chunk.handle),
        )
    }

    /// The per-chunk commitments in compressed form, as the range-proof
    /// adapter consumes them.
    pub fn compressed_commitments(
        &self,
    ) -> [curve25519_dalek::ristretto::CompressedRistretto; BALANCE_CHUNKS] {
        self.0.map(|chunk| chunk.commitment.compress())
    }
}

impl<'a, 'b> Add<&'b ChunkedCipherText> for &'a ChunkedCipherText {
    type Output = ChunkedCipherText;

    fn add(self, other: &'b ChunkedCipherText) -> ChunkedCipherText {
        let mut chunks = self.0;
        for (chunk, rhs) in chunks.iter_mut().zip(other.0.iter()) {
            *chunk += rhs;
        }
        ChunkedCipherText(chunks)
    }
}
define_add_variants!(
    LHS = ChunkedCipherText,
    RHS = ChunkedCipherText,
    Output = ChunkedCipherText
);

impl<'b> AddAssign<&'b ChunkedCipherText> for ChunkedCipherText {
    fn add_assign(&mut self, rhs: &ChunkedCipherText) {
        *self = (self as &ChunkedCipherText) + rhs;
    }
}
define_add_assign_variants!(LHS = ChunkedCipherText, RHS = ChunkedCipherText);

impl<'a, 'b> Sub<&'b ChunkedCipherText> for &'a ChunkedCipherText {
    type Output = ChunkedCipherText;

    fn sub(self, other: &'b ChunkedCipherText) -> ChunkedCipherText {
        let mut chunks = self.0;
        for (chunk, rhs) in chunks.iter_mut().zip(other.0.iter()) {
            *chunk -= rhs;
        }
        ChunkedCipherText(chunks)
    }
}
define_sub_variants!(
    LHS = ChunkedCipherText,
    RHS = ChunkedCipherText,
    Output = ChunkedCipherText
);

impl<'b> SubAssign<&'b ChunkedCipherText> for ChunkedCipherText {
    fn sub_assign(&mut self, rhs: &ChunkedCipherText) {
        *self = (self as &ChunkedCipherText) - rhs;
    }
}
define_sub_assign_variants!(LHS = ChunkedCipherText, RHS = ChunkedCipherText);

impl Encode for ChunkedCipherText {
    #[inline]
    fn size_hint(&self) -> usize {
        crate::codec::RISTRETTO_POINT_SIZE * 2 * BALANCE_CHUNKS
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        for chunk in &self.0 {
            chunk.encode_to(dest);
        }
    }
}

impl Decode for ChunkedCipherText {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        Ok(Self(decode_fixed::<CipherText, I, BALANCE_CHUNKS>(input)?))
    }
}
