//! Bounded discrete-log recovery of decrypted amounts.
//!
//! Decryption yields `m·G`; the amount `m` is recovered with a
//! baby-step/giant-step search over `[0, 2^max_bits)`. The baby-step table
//! maps `i·G → i` for `i ∈ [0, 2^(max_bits/2))` and is built once per
//! process, then shared read-only by every operation.

use std::collections::HashMap;

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, traits::Identity,
};

use crate::CHUNK_BITS;

lazy_static::lazy_static! {
    /// Table for 16-bit chunk decryption.
    static ref CHUNK_TABLE: DiscreteLog = DiscreteLog::new(CHUNK_BITS);

    /// Table for 32-bit reads of unnormalized chunks. Built on first use.
    static ref WIDE_TABLE: DiscreteLog = DiscreteLog::new(2 * CHUNK_BITS);
}

/// Baby-step/giant-step decoder for a fixed bit range.
pub struct DiscreteLog {
    half_bits: u32,
    giant_step: RistrettoPoint,
    baby_steps: HashMap<[u8; 32], u64>,
}

impl DiscreteLog {
    /// Precompute the baby-step table for a `max_bits` search range.
    /// `max_bits` must be even; the table holds `2^(max_bits/2)` entries.
    pub fn new(max_bits: u32) -> Self {
        debug_assert!(max_bits % 2 == 0 && max_bits <= 48);
        let half_bits = max_bits / 2;
        let count = 1u64 << half_bits;

        let mut baby_steps = HashMap::with_capacity(count as usize);
        let mut current = RistrettoPoint::identity();
        for i in 0..count {
            baby_steps.insert(current.compress().to_bytes(), i);
            current += RISTRETTO_BASEPOINT_POINT;
        }

        // After the loop `current` is `2^half_bits · G`, the giant step.
        DiscreteLog {
            half_bits,
            giant_step: current,
            baby_steps,
        }
    }

    pub fn max_bits(&self) -> u32 {
        self.half_bits * 2
    }

    /// Find `m` such that `target = m·G`, if `m < 2^max_bits`.
    pub fn decode(&self, target: RistrettoPoint) -> Option<u64> {
        let mut current = target;
        for j in 0..(1u64 << self.half_bits) {
            if let Some(i) = self.baby_steps.get(&current.compress().to_bytes()) {
                return Some((j << self.half_bits) + i);
            }
            current -= self.giant_step;
        }
        None
    }
}

/// Decode against the shared process-wide tables.
///
/// 16-bit and 32-bit ranges hit the precomputed tables; any other even
/// range pays for a one-off table.
pub fn decode_with_bits(target: RistrettoPoint, max_bits: u32) -> Option<u64> {
    match max_bits {
        bits if bits == CHUNK_TABLE.max_bits() => CHUNK_TABLE.decode(target),
        bits if bits == WIDE_TABLE.max_bits() => WIDE_TABLE.decode(target),
        bits => DiscreteLog::new(bits).decode(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::scalar::Scalar;

    #[test]
    fn decodes_boundaries() {
        let table = DiscreteLog::new(16);
        for value in [0u64, 1, 255, 256, 65_534, 65_535] {
            let target = Scalar::from(value) * RISTRETTO_BASEPOINT_POINT;
            assert_eq!(table.decode(target), Some(value));
        }
    }

    #[test]
    fn rejects_values_outside_the_range() {
        let table = DiscreteLog::new(16);
        for value in [65_536u64, 1 << 20] {
            let target = Scalar::from(value) * RISTRETTO_BASEPOINT_POINT;
            assert_eq!(table.decode(target), None);
        }
    }

    #[test]
    fn shared_tables_agree_with_ad_hoc_tables() {
        let value = 40_000u64;
        let target = Scalar::from(value) * RISTRETTO_BASEPOINT_POINT;
        assert_eq!(decode_with_bits(target, 16), Some(value));
        assert_eq!(decode_with_bits(target, 32), Some(value));

        let wide = (1u64 << 16) + 17;
        let target = Scalar::from(wide) * RISTRETTO_BASEPOINT_POINT;
        assert_eq!(decode_with_bits(target, 16), None);
        assert_eq!(decode_with_bits(target, 32), Some(wide));
    }
}
