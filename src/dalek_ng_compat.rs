//! Byte-level bridge between `curve25519-dalek` v4 (used throughout this
//! crate) and `curve25519-dalek-ng` (required by `bulletproofs` v4's public
//! API). Both crates implement the same curve25519/ristretto255 arithmetic,
//! so these conversions are lossless round-trips through the canonical wire
//! encoding, not a change of value.

use curve25519_dalek::ristretto::{
    CompressedRistretto as Compressed, RistrettoPoint as Point,
};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek_ng::ristretto::{
    CompressedRistretto as NgCompressed, RistrettoPoint as NgPoint,
};
use curve25519_dalek_ng::scalar::Scalar as NgScalar;

pub(crate) fn scalar_to_ng(s: &Scalar) -> NgScalar {
    NgScalar::from_bytes_mod_order(s.to_bytes())
}

pub(crate) fn scalars_to_ng(s: &[Scalar]) -> Vec<NgScalar> {
    s.iter().map(scalar_to_ng).collect()
}

pub(crate) fn point_to_ng(p: &Point) -> NgPoint {
    NgCompressed::from_slice(p.compress().as_bytes())
        .decompress()
        .expect("valid curve25519-dalek point decompresses under curve25519-dalek-ng")
}

pub(crate) fn compressed_to_ng(c: &Compressed) -> NgCompressed {
    NgCompressed::from_slice(c.as_bytes())
}

pub(crate) fn compressed_slice_to_ng(c: &[Compressed]) -> Vec<NgCompressed> {
    c.iter().map(compressed_to_ng).collect()
}

pub(crate) fn point_from_ng(p: &NgPoint) -> Point {
    Compressed::from_slice(p.compress().as_bytes())
        .expect("32-byte compressed point")
        .decompress()
        .expect("valid curve25519-dalek-ng point decompresses under curve25519-dalek")
}
