//! Bit-level recovery statistics
//!
//! Compares an original buffer against a corrupted and/or repaired version.
//! Inputs of unequal length are truncated to the shortest one and the
//! truncation is reported alongside the numbers, never hidden.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Record of an unequal-length comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    /// Lengths of the inputs, in argument order
    pub input_lengths: Vec<usize>,
    /// Bytes actually compared
    pub compared_len: usize,
}

impl Truncation {
    fn detect(lengths: &[usize]) -> Option<Self> {
        let min = lengths.iter().copied().min().unwrap_or(0);
        if lengths.iter().all(|&l| l == min) {
            return None;
        }
        warn!(
            lengths = ?lengths,
            compared = min,
            "input lengths differ, truncating to shortest"
        );
        Some(Self {
            input_lengths: lengths.to_vec(),
            compared_len: min,
        })
    }
}

/// Two-buffer comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitDiffStats {
    pub total_bits: u64,
    pub matching_bits: u64,
    pub differing_bits: u64,
    pub truncation: Option<Truncation>,
}

impl BitDiffStats {
    /// `100 * matching / total`; NaN for empty inputs
    pub fn match_percent(&self) -> f64 {
        percent(self.matching_bits, self.total_bits)
    }

    pub fn differ_percent(&self) -> f64 {
        percent(self.differing_bits, self.total_bits)
    }
}

/// Three-buffer comparison (original / corrupted / repaired)
///
/// `matching_bits` and `differing_bits` compare original against repaired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStatistics {
    pub total_bits: u64,
    pub matching_bits: u64,
    pub differing_bits: u64,
    /// Bits that corruption flipped
    pub flipped_by_corruption: u64,
    /// Flipped bits restored to the original value by the repair
    pub recovered_bits: u64,
    /// Bits corruption left alone but the repair changed
    pub falsely_altered_bits: u64,
    pub truncation: Option<Truncation>,
}

impl RecoveryStatistics {
    /// `100 * recovered / flipped`; NaN when nothing was flipped
    pub fn recovery_rate(&self) -> f64 {
        percent(self.recovered_bits, self.flipped_by_corruption)
    }

    /// Corruption-flipped bits still wrong after repair
    pub fn unrecovered_bits(&self) -> u64 {
        self.flipped_by_corruption - self.recovered_bits
    }

    pub fn match_percent(&self) -> f64 {
        percent(self.matching_bits, self.total_bits)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        f64::NAN
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn word(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Walk aligned 8-byte words of up to three equal-length slices
fn for_each_word(a: &[u8], b: &[u8], c: &[u8], mut f: impl FnMut(u64, u64, u64)) {
    let mut ai = a.chunks(8);
    let mut bi = b.chunks(8);
    let mut ci = c.chunks(8);
    while let (Some(x), Some(y)) = (ai.next(), bi.next()) {
        let z = ci.next().map(word).unwrap_or(0);
        f(word(x), word(y), z);
    }
}

/// Bit-level comparison of `original` against `test`
pub fn bit_diff_stats(original: &[u8], test: &[u8]) -> BitDiffStats {
    let truncation = Truncation::detect(&[original.len(), test.len()]);
    let len = original.len().min(test.len());
    let (o, t) = (&original[..len], &test[..len]);

    let mut differing_bits = 0u64;
    for_each_word(o, t, &[], |x, y, _| {
        differing_bits += (x ^ y).count_ones() as u64;
    });

    let total_bits = len as u64 * 8;
    BitDiffStats {
        total_bits,
        matching_bits: total_bits - differing_bits,
        differing_bits,
        truncation,
    }
}

/// Classify every bit of a corrupt-then-repair cycle
pub fn recovery_stats(original: &[u8], corrupted: &[u8], repaired: &[u8]) -> RecoveryStatistics {
    let truncation =
        Truncation::detect(&[original.len(), corrupted.len(), repaired.len()]);
    let len = original.len().min(corrupted.len()).min(repaired.len());
    let (o, c, r) = (&original[..len], &corrupted[..len], &repaired[..len]);

    let mut flipped = 0u64;
    let mut recovered = 0u64;
    let mut falsely_altered = 0u64;
    let mut differing = 0u64;

    // Walk original/corrupted and fetch the repaired word alongside.
    for_each_word(o, c, r, |ow, cw, rw| {
        let diff_corrupt = ow ^ cw;
        let diff_repair = ow ^ rw;
        flipped += diff_corrupt.count_ones() as u64;
        recovered += (diff_corrupt & !diff_repair).count_ones() as u64;
        falsely_altered += (!diff_corrupt & diff_repair).count_ones() as u64;
        differing += diff_repair.count_ones() as u64;
    });

    let total_bits = len as u64 * 8;
    RecoveryStatistics {
        total_bits,
        matching_bits: total_bits - differing,
        differing_bits: differing,
        flipped_by_corruption: flipped,
        recovered_bits: recovered,
        falsely_altered_bits: falsely_altered,
        truncation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flipper::flip_bit_positions;

    #[test]
    fn test_bit_diff_three_bits() {
        let original = vec![0u8; 1000];
        let mut corrupted = original.clone();
        flip_bit_positions(&mut corrupted, [3, 17, 900]);

        let stats = bit_diff_stats(&original, &corrupted);
        assert_eq!(stats.total_bits, 8000);
        assert_eq!(stats.differing_bits, 3);
        assert_eq!(stats.matching_bits, 7997);
        assert!((stats.match_percent() - 99.9625).abs() < 1e-9);
        assert!(stats.truncation.is_none());
    }

    #[test]
    fn test_recovery_partial_with_false_alteration() {
        let original = vec![0u8; 200];
        let mut corrupted = original.clone();
        flip_bit_positions(&mut corrupted, [5, 50]);
        let mut repaired = corrupted.clone();
        flip_bit_positions(&mut repaired, [5, 900]);

        let stats = recovery_stats(&original, &corrupted, &repaired);
        assert_eq!(stats.flipped_by_corruption, 2);
        assert_eq!(stats.recovered_bits, 1);
        assert_eq!(stats.falsely_altered_bits, 1);
        assert_eq!(stats.unrecovered_bits(), 1);
        // bits 50 and 900 are still wrong
        assert_eq!(stats.differing_bits, 2);
        assert!((stats.recovery_rate() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_repair() {
        let original: Vec<u8> = (0..=255).collect();
        let mut corrupted = original.clone();
        flip_bit_positions(&mut corrupted, [1, 2, 3, 1000, 2047]);

        let stats = recovery_stats(&original, &corrupted, &original);
        assert_eq!(stats.flipped_by_corruption, 5);
        assert_eq!(stats.recovered_bits, 5);
        assert_eq!(stats.falsely_altered_bits, 0);
        assert_eq!(stats.matching_bits, stats.total_bits);
    }

    #[test]
    fn test_no_corruption_rate_is_nan() {
        let data = vec![0x5Au8; 32];
        let stats = recovery_stats(&data, &data, &data);
        assert_eq!(stats.flipped_by_corruption, 0);
        assert!(stats.recovery_rate().is_nan());
    }

    #[test]
    fn test_empty_inputs() {
        let stats = bit_diff_stats(&[], &[]);
        assert_eq!(stats.total_bits, 0);
        assert!(stats.match_percent().is_nan());
    }

    #[test]
    fn test_truncation_reported() {
        let original = vec![0u8; 10];
        let test = vec![0xFFu8; 7];
        let stats = bit_diff_stats(&original, &test);
        assert_eq!(stats.total_bits, 56);
        assert_eq!(stats.differing_bits, 56);
        assert_eq!(
            stats.truncation,
            Some(Truncation {
                input_lengths: vec![10, 7],
                compared_len: 7,
            })
        );

        let stats = recovery_stats(&[0u8; 9], &[0u8; 9], &[1u8; 4]);
        assert_eq!(stats.total_bits, 32);
        assert_eq!(stats.falsely_altered_bits, 4);
        assert_eq!(stats.truncation.unwrap().compared_len, 4);
    }

    #[test]
    fn test_odd_length_tail_words() {
        // 13 bytes: one full word plus a 5-byte tail
        let original = vec![0u8; 13];
        let mut corrupted = original.clone();
        flip_bit_positions(&mut corrupted, [0, 64, 103]);
        let stats = bit_diff_stats(&original, &corrupted);
        assert_eq!(stats.differing_bits, 3);
        assert_eq!(stats.total_bits, 104);
    }
}
