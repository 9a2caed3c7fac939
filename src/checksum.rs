// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! ISYS target list checksum.
//!
//! The sensor sums every byte of the target region as an unsigned 8-bit
//! value into a 32-bit accumulator that wraps on overflow.  This is not a
//! CRC and it is not interchangeable with the bytewise XOR used by early
//! prototype firmware, which this crate does not support.

use std::num::Wrapping;

/// Running byte-sum accumulator.
///
/// Multi-packet frames feed the target region of each payload datagram in
/// arrival order so the final value covers the whole frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    sum: Wrapping<u32>,
}

impl Checksum {
    /// Starts a sum at zero.
    pub fn new() -> Checksum {
        Checksum::default()
    }

    /// Continues a sum from a previously computed value.
    pub fn resume(value: u32) -> Checksum {
        Checksum {
            sum: Wrapping(value),
        }
    }

    /// Adds every byte of `data` to the sum.
    pub fn update(&mut self, data: &[u8]) {
        for byte in data {
            self.sum += Wrapping(*byte as u32);
        }
    }

    /// Current 32-bit sum.
    #[inline]
    pub fn value(&self) -> u32 {
        self.sum.0
    }
}

/// Computes the checksum of `data` in one pass.
pub fn checksum(data: &[u8]) -> u32 {
    let mut sum = Checksum::new();
    sum.update(data);
    sum.value()
}

/// Compares the checksum carried in a header against a computed one.
#[inline]
pub fn verify(expected: u32, computed: u32) -> bool {
    expected == computed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
        assert_eq!(checksum(&[0xFF; 4]), 4 * 255);
        // XOR would give zero for two equal bytes, the sum does not.
        assert_eq!(checksum(&[0x41, 0x41]), 0x82);
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<u8> = (0..1008).map(|i| (i * 7 % 256) as u8).collect();
        let first = checksum(&data);
        assert_eq!(first, checksum(&data));
        assert_eq!(first, data.iter().map(|b| *b as u32).sum::<u32>());
    }

    #[test]
    fn test_wraparound() {
        let start = u32::MAX - 10;
        let mut sum = Checksum::resume(start);
        sum.update(&[255; 5]);
        assert_eq!(sum.value(), start.wrapping_add(5 * 255));
        assert_eq!(sum.value(), 1264);
    }

    #[test]
    fn test_split_updates() {
        let data = [9u8, 200, 17, 255, 0, 3, 44];
        let mut sum = Checksum::new();
        sum.update(&data[..3]);
        sum.update(&data[3..]);
        assert_eq!(sum.value(), checksum(&data));
    }

    #[test]
    fn test_verify() {
        assert!(verify(0x1234, 0x1234));
        assert!(!verify(0x1234, 0x1235));
    }
}
