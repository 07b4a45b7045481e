//! SCALE encoding primitives for curve types and proof framing.
//!
//! Every structure in this crate has exactly one canonical byte form: points
//! are 32-byte canonical Ristretto encodings, scalars are 32 little-endian
//! bytes below the group order, and all integers on the wire are fixed-width
//! little-endian. Decoders reject anything non-canonical.

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::Identity,
};

/// A serialized Ristretto point size.
pub const RISTRETTO_POINT_SIZE: usize = 32;

/// A serialized scalar size.
pub const SCALAR_SIZE: usize = 32;

/// Encode a `RistrettoPoint` as its 32-byte canonical compressed form.
pub struct RistrettoPointEncoder<'a>(pub &'a RistrettoPoint);

impl Encode for RistrettoPointEncoder<'_> {
    #[inline]
    fn size_hint(&self) -> usize {
        RISTRETTO_POINT_SIZE
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        self.0.compress().as_bytes().encode_to(dest);
    }
}

/// Decode a `RistrettoPoint` from a 32-byte canonical compressed form.
pub struct RistrettoPointDecoder(pub RistrettoPoint);

impl Decode for RistrettoPointDecoder {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let raw = <[u8; RISTRETTO_POINT_SIZE]>::decode(input)?;
        let inner = CompressedRistretto(raw)
            .decompress()
            .ok_or_else(|| CodecError::from("Invalid `CompressedRistretto`."))?;

        Ok(Self(inner))
    }
}

/// Decode a `RistrettoPoint`, additionally rejecting the identity.
///
/// Used for encryption keys, where the identity would collapse every
/// decryption handle to zero.
pub struct NonIdentityPointDecoder(pub RistrettoPoint);

impl Decode for NonIdentityPointDecoder {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let point = RistrettoPointDecoder::decode(input)?.0;
        if point == RistrettoPoint::identity() {
            return Err(CodecError::from("Forbidden identity point."));
        }

        Ok(Self(point))
    }
}

/// Encode a `Scalar` as 32 little-endian bytes.
pub struct ScalarEncoder<'a>(pub &'a Scalar);

impl Encode for ScalarEncoder<'_> {
    #[inline]
    fn size_hint(&self) -> usize {
        SCALAR_SIZE
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        self.0.as_bytes().encode_to(dest);
    }
}

/// Decode a `Scalar`, rejecting non-canonical (unreduced) encodings.
pub struct ScalarDecoder(pub Scalar);

impl Decode for ScalarDecoder {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let raw = <[u8; SCALAR_SIZE]>::decode(input)?;
        let inner = Option::<Scalar>::from(Scalar::from_canonical_bytes(raw))
            .ok_or_else(|| CodecError::from("Non-canonical `Scalar`."))?;

        Ok(Self(inner))
    }
}

/// Encode a sequence of points without a length prefix.
///
/// Sequence lengths in this wire format are always fixed by the enclosing
/// structure (chunk counts, auditor counts), never self-describing.
pub fn encode_points<W: Output + ?Sized>(points: &[RistrettoPoint], dest: &mut W) {
    for point in points {
        RistrettoPointEncoder(point).encode_to(dest);
    }
}

/// Encode a sequence of scalars without a length prefix.
pub fn encode_scalars<W: Output + ?Sized>(scalars: &[Scalar], dest: &mut W) {
    for scalar in scalars {
        ScalarEncoder(scalar).encode_to(dest);
    }
}

/// Decode a fixed-length sequence.
pub fn decode_fixed<T: Decode, I: Input, const N: usize>(
    input: &mut I,
) -> Result<[T; N], CodecError> {
    let mut items = Vec::with_capacity(N);
    for _ in 0..N {
        items.push(T::decode(input)?);
    }
    items
        .try_into()
        .map_err(|_| CodecError::from("fixed sequence length mismatch"))
}

/// Decode `N` points.
pub fn decode_points<I: Input, const N: usize>(
    input: &mut I,
) -> Result<[RistrettoPoint; N], CodecError> {
    Ok(decode_fixed::<RistrettoPointDecoder, I, N>(input)?.map(|p| p.0))
}

/// Decode `N` scalars.
pub fn decode_scalars<I: Input, const N: usize>(input: &mut I) -> Result<[Scalar; N], CodecError> {
    Ok(decode_fixed::<ScalarDecoder, I, N>(input)?.map(|s| s.0))
}

/// Read the two-byte little-endian version prefix of a proof encoding and
/// reject anything but `expected`.
pub fn decode_version<I: Input>(input: &mut I, expected: u16) -> Result<(), CodecError> {
    let version = u16::decode(input)?;
    if version != expected {
        return Err(CodecError::from("unsupported proof version"));
    }
    Ok(())
}
