//! Twisted-ElGamal encryption over the Ristretto group.
//!
//! The public key is the *inverse* of the decryption key times the second
//! generator, `P = d⁻¹·H`, so that a ciphertext
//!
//! ```text
//! C = m·G + r·H        (commitment)
//! D = r·P              (decryption handle)
//! ```
//!
//! decrypts as `m·G = C − d·D`. Since the scheme is homomorphic, addition
//! and subtraction are provided over ciphertexts. Recovering `m` itself is a
//! bounded discrete-log search, see [`discrete_log`].

use core::cmp::Ordering;
use core::ops::{Add, AddAssign, Sub, SubAssign};

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use curve25519_dalek::{
    constants::{RISTRETTO_BASEPOINT_COMPRESSED, RISTRETTO_BASEPOINT_POINT},
    ristretto::RistrettoPoint,
    scalar::Scalar,
    traits::Identity,
};
use bulletproofs::PedersenGens;
use rand_core::{CryptoRng, RngCore};
use sha3::Sha3_512;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    codec::{
        NonIdentityPointDecoder, RistrettoPointDecoder, RistrettoPointEncoder, ScalarDecoder,
        ScalarEncoder,
    },
    errors::{Error, Result},
};

pub mod chunked;
pub mod discrete_log;

pub use chunked::{ChunkedCipherText, ChunkedRandomness};

/// Domain string an external wallet signs to deterministically derive a
/// decryption key. The signature over this message, not the message itself,
/// is hashed to a scalar.
pub const DECRYPTION_KEY_CLAIM: &[u8] = b"CONFIDENTIAL_ASSET__TWISTED_ED25519_PRIVATE_KEY_CLAIM";

const DECRYPTION_KEY_DERIVATION_LABEL: &[u8] = b"CA-DK-v1";
const H_GENERATOR_LABEL: &[u8] = b"TwistedElGamalH";

lazy_static::lazy_static! {
    static ref H_GENERATOR: RistrettoPoint =
        hash_to_point(H_GENERATOR_LABEL, RISTRETTO_BASEPOINT_COMPRESSED.as_bytes());

    static ref PC_GENS: PedersenGens = PedersenGens {
        B: crate::dalek_ng_compat::point_to_ng(&RISTRETTO_BASEPOINT_POINT),
        B_blinding: crate::dalek_ng_compat::point_to_ng(&H_GENERATOR),
    };
}

/// The primary group generator `G`.
pub fn base_point() -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT
}

/// The second, independent generator `H`.
pub fn h_generator() -> &'static RistrettoPoint {
    &H_GENERATOR
}

/// Pedersen generators `(G, H)` shared with the range-proof adapter, so that
/// a ciphertext commitment doubles as a range-proof commitment.
pub fn pedersen_gens() -> &'static PedersenGens {
    &PC_GENS
}

/// Hash a label and message to a group element.
pub fn hash_to_point(label: &[u8], data: &[u8]) -> RistrettoPoint {
    let mut input = Vec::with_capacity(label.len() + data.len());
    input.extend_from_slice(label);
    input.extend_from_slice(data);
    RistrettoPoint::hash_from_bytes::<Sha3_512>(&input)
}

/// Hash a label and message to a scalar.
pub fn hash_to_scalar(label: &[u8], data: &[u8]) -> Scalar {
    let mut input = Vec::with_capacity(label.len() + data.len());
    input.extend_from_slice(label);
    input.extend_from_slice(data);
    Scalar::hash_from_bytes::<Sha3_512>(&input)
}

// ------------------------------------------------------------------------
// Key material.
// ------------------------------------------------------------------------

/// The secret decryption key. Never leaves the client and is wiped on drop.
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub struct DecryptionKey {
    secret: Scalar,
}

impl DecryptionKey {
    pub fn new(secret: Scalar) -> Self {
        DecryptionKey { secret }
    }

    /// Generate a fresh key from a CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        DecryptionKey {
            secret: Scalar::random(rng),
        }
    }

    /// Derive the key from an external signature over
    /// [`DECRYPTION_KEY_CLAIM`]. Deterministic: the same signature always
    /// yields the same key.
    pub fn from_signature(signature: &[u8]) -> Self {
        DecryptionKey {
            secret: hash_to_scalar(DECRYPTION_KEY_DERIVATION_LABEL, signature),
        }
    }

    pub fn secret(&self) -> Scalar {
        self.secret
    }

    /// The matching public encryption key `P = d⁻¹·H`.
    pub fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey {
            point: self.secret.invert() * *H_GENERATOR,
        }
    }

    /// Decrypt to the committed group element `m·G`.
    pub fn decrypt_point(&self, cipher_text: &CipherText) -> RistrettoPoint {
        cipher_text.commitment - self.secret * cipher_text.handle
    }

    /// Decrypt a ciphertext known to hold a single 16-bit chunk.
    pub fn decrypt(&self, cipher_text: &CipherText) -> Result<u64> {
        self.decrypt_with_bits(cipher_text, crate::CHUNK_BITS)
    }

    /// Decrypt with a caller-chosen search bound.
    ///
    /// The search time depends on the plaintext *value*; the scalar
    /// multiplication by the key itself stays constant-time.
    pub fn decrypt_with_bits(&self, cipher_text: &CipherText, max_bits: u32) -> Result<u64> {
        discrete_log::decode_with_bits(self.decrypt_point(cipher_text), max_bits)
            .ok_or(Error::AmountOutOfRange { max_bits })
    }

    /// Verify that a ciphertext encrypts the given value, without searching.
    pub fn verify_value(&self, cipher_text: &CipherText, value: &Scalar) -> Result<()> {
        ensure!(
            value * RISTRETTO_BASEPOINT_POINT == self.decrypt_point(cipher_text),
            Error::ProofFailed("known-value check")
        );
        Ok(())
    }
}

impl Encode for DecryptionKey {
    #[inline]
    fn size_hint(&self) -> usize {
        crate::codec::SCALAR_SIZE
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        ScalarEncoder(&self.secret).encode_to(dest);
    }
}

impl Decode for DecryptionKey {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        Ok(Self {
            secret: ScalarDecoder::decode(input)?.0,
        })
    }
}

/// The public encryption key, published on-chain per (account, token).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncryptionKey {
    pub point: RistrettoPoint,
}

impl EncryptionKey {
    fn encrypt_helper(&self, value: Scalar, blinding: Scalar) -> CipherText {
        let commitment = PC_GENS.commit(
            crate::dalek_ng_compat::scalar_to_ng(&value),
            crate::dalek_ng_compat::scalar_to_ng(&blinding),
        );
        CipherText {
            commitment: crate::dalek_ng_compat::point_from_ng(&commitment),
            handle: blinding * self.point,
        }
    }

    /// Encrypt a witness whose blinding was chosen by the caller.
    pub fn encrypt(&self, witness: &CommitmentWitness) -> CipherText {
        self.encrypt_helper(witness.value, witness.blinding)
    }

    /// Generate a blinding factor and encrypt the value; the witness is
    /// returned because proofs need it.
    pub fn encrypt_value<R: RngCore + CryptoRng>(
        &self,
        value: Scalar,
        rng: &mut R,
    ) -> (CommitmentWitness, CipherText) {
        let witness = CommitmentWitness {
            value,
            blinding: Scalar::random(rng),
        };
        let cipher_text = self.encrypt(&witness);
        (witness, cipher_text)
    }
}

impl PartialOrd for EncryptionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EncryptionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.point
            .compress()
            .to_bytes()
            .cmp(&other.point.compress().to_bytes())
    }
}

impl Encode for EncryptionKey {
    #[inline]
    fn size_hint(&self) -> usize {
        crate::codec::RISTRETTO_POINT_SIZE
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        RistrettoPointEncoder(&self.point).encode_to(dest);
    }
}

impl Decode for EncryptionKey {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        Ok(Self {
            point: NonIdentityPointDecoder::decode(input)?.0,
        })
    }
}

/// Holds both halves of an account's confidential keypair.
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub struct ConfidentialKeys {
    #[zeroize(skip)]
    pub public: EncryptionKey,
    pub secret: DecryptionKey,
}

impl ConfidentialKeys {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_decryption_key(DecryptionKey::generate(rng))
    }

    pub fn from_signature(signature: &[u8]) -> Self {
        Self::from_decryption_key(DecryptionKey::from_signature(signature))
    }

    pub fn from_decryption_key(secret: DecryptionKey) -> Self {
        ConfidentialKeys {
            public: secret.encryption_key(),
            secret,
        }
    }
}

// ------------------------------------------------------------------------
// Witness and ciphertext.
// ------------------------------------------------------------------------

/// Prover's representation of an encrypted secret.
#[derive(Clone, PartialEq, Debug, Zeroize, ZeroizeOnDrop)]
pub struct CommitmentWitness {
    /// The committed amount in scalar form.
    value: Scalar,

    /// A random blinding factor.
    blinding: Scalar,
}

impl CommitmentWitness {
    pub fn new(value: Scalar, blinding: Scalar) -> Self {
        CommitmentWitness { value, blinding }
    }

    pub fn value(&self) -> Scalar {
        self.value
    }

    pub fn blinding(&self) -> Scalar {
        self.blinding
    }
}

/// A single twisted-ElGamal ciphertext.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CipherText {
    pub commitment: RistrettoPoint,
    pub handle: RistrettoPoint,
}

impl Default for CipherText {
    fn default() -> Self {
        Self::zero()
    }
}

impl CipherText {
    /// A ciphertext of zero with zero randomness. Account initialization.
    pub fn zero() -> Self {
        CipherText {
            commitment: RistrettoPoint::identity(),
            handle: RistrettoPoint::identity(),
        }
    }

    /// Encode a public value with no randomness (deposit-side encoding).
    pub fn from_value(value: Scalar) -> Self {
        CipherText {
            commitment: value * RISTRETTO_BASEPOINT_POINT,
            handle: RistrettoPoint::identity(),
        }
    }
}

impl<'a, 'b> Add<&'b CipherText> for &'a CipherText {
    type Output = CipherText;

    fn add(self, other: &'b CipherText) -> CipherText {
        CipherText {
            commitment: self.commitment + other.commitment,
            handle: self.handle + other.handle,
        }
    }
}
define_add_variants!(LHS = CipherText, RHS = CipherText, Output = CipherText);

impl<'b> AddAssign<&'b CipherText> for CipherText {
    fn add_assign(&mut self, rhs: &CipherText) {
        *self = (self as &CipherText) + rhs;
    }
}
define_add_assign_variants!(LHS = CipherText, RHS = CipherText);

impl<'a, 'b> Sub<&'b CipherText> for &'a CipherText {
    type Output = CipherText;

    fn sub(self, other: &'b CipherText) -> CipherText {
        CipherText {
            commitment: self.commitment - other.commitment,
            handle: self.handle - other.handle,
        }
    }
}
define_sub_variants!(LHS = CipherText, RHS = CipherText, Output = CipherText);

impl<'b> SubAssign<&'b CipherText> for CipherText {
    fn sub_assign(&mut self, rhs: &CipherText) {
        *self = (self as &CipherText) - rhs;
    }
}
define_sub_assign_variants!(LHS = CipherText, RHS = CipherText);

impl Encode for CipherText {
    #[inline]
    fn size_hint(&self) -> usize {
        crate::codec::RISTRETTO_POINT_SIZE * 2
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        RistrettoPointEncoder(&self.commitment).encode_to(dest);
        RistrettoPointEncoder(&self.handle).encode_to(dest);
    }
}

impl Decode for CipherText {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        Ok(Self {
            commitment: RistrettoPointDecoder::decode(input)?.0,
            handle: RistrettoPointDecoder::decode(input)?.0,
        })
    }
}

// ------------------------------------------------------------------------
// Tests.
// ------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const SEED_1: [u8; 32] = [42u8; 32];
    const SEED_2: [u8; 32] = [56u8; 32];

    #[test]
    fn basic_enc_dec() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();

        let value = 256u64;
        let (_, cipher) = public.encrypt_value(value.into(), &mut rng);
        assert_eq!(secret.decrypt(&cipher).unwrap(), value);
    }

    #[test]
    fn twisted_key_relation() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();

        // P = d⁻¹·H, so d·P = H.
        assert_eq!(secret.secret() * public.point, *h_generator());
    }

    #[test]
    fn zero_blinding_matches_plain_encoding() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();

        let value = Scalar::from(77u64);
        let cipher = public.encrypt(&CommitmentWitness::new(value, Scalar::ZERO));
        assert_eq!(cipher, CipherText::from_value(value));
        assert_eq!(secret.decrypt(&cipher).unwrap(), 77);
    }

    #[test]
    fn decrypt_zero_ciphertext() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        assert_eq!(secret.decrypt(&CipherText::zero()).unwrap(), 0);
    }

    #[test]
    fn decrypt_rejects_out_of_range() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();

        let value = (1u64 << crate::CHUNK_BITS) + 3;
        let (_, cipher) = public.encrypt_value(value.into(), &mut rng);
        assert_err!(
            secret.decrypt(&cipher),
            Error::AmountOutOfRange {
                max_bits: crate::CHUNK_BITS
            }
        );
        // A wider search bound finds it.
        assert_eq!(secret.decrypt_with_bits(&cipher, 32).unwrap(), value);
    }

    #[test]
    fn homomorphic_encryption() {
        let mut rng = StdRng::from_seed(SEED_2);
        let v1 = Scalar::from(623u32);
        let v2 = Scalar::from(456u32);
        let r1 = Scalar::random(&mut rng);
        let r2 = Scalar::random(&mut rng);

        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();

        let cipher1 = public.encrypt(&CommitmentWitness::new(v1, r1));
        let cipher2 = public.encrypt(&CommitmentWitness::new(v2, r2));

        let mut cipher12 = public.encrypt(&CommitmentWitness::new(v1 + v2, r1 + r2));
        assert_eq!(cipher1 + cipher2, cipher12);
        cipher12 -= cipher2;
        assert_eq!(cipher1, cipher12);

        cipher12 = public.encrypt(&CommitmentWitness::new(v1 - v2, r1 - r2));
        assert_eq!(cipher1 - cipher2, cipher12);
        cipher12 += cipher2;
        assert_eq!(cipher1, cipher12);
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let signature = [9u8; 64];
        let a = DecryptionKey::from_signature(&signature);
        let b = DecryptionKey::from_signature(&signature);
        assert_eq!(a.secret(), b.secret());
        assert_eq!(a.encryption_key(), b.encryption_key());

        let c = DecryptionKey::from_signature(&[10u8; 64]);
        assert_ne!(a.secret(), c.secret());
    }

    #[test]
    fn verify_known_value() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();

        let (_, cipher) = public.encrypt_value(1_000u64.into(), &mut rng);
        assert!(secret.verify_value(&cipher, &1_000u64.into()).is_ok());
        assert!(secret.verify_value(&cipher, &1_001u64.into()).is_err());
    }

    #[test]
    fn ciphertext_codec_round_trip() {
        let mut rng = StdRng::from_seed(SEED_1);
        let secret = DecryptionKey::generate(&mut rng);
        let public = secret.encryption_key();
        let (_, cipher) = public.encrypt_value(5u64.into(), &mut rng);

        let bytes = cipher.encode();
        assert_eq!(bytes.len(), 64);
        let decoded = CipherText::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, cipher);

        let key_bytes = public.encode();
        assert_eq!(key_bytes.len(), 32);
        let decoded_key = EncryptionKey::decode(&mut &key_bytes[..]).unwrap();
        assert_eq!(decoded_key, public);
    }
}
