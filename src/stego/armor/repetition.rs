// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Repetition coding with soft majority voting.
//!
//! Lays out `r` copies of RS-encoded bits sequentially across embedding
//! positions. On extraction, soft majority voting using STDM log-likelihood
//! ratios combines redundant copies for dramatically improved robustness.

/// Compute the repetition factor from RS bit count and total embedding units.
///
/// Forces `r` to be odd (for clean majority voting) unless `r < 2`.
/// Caps at 255 (fits in a u8).
pub fn compute_r(rs_bit_count: usize, num_units: usize) -> usize {
    if rs_bit_count == 0 {
        return 1;
    }
    let r = num_units / rs_bit_count;
    let r = r.min(255);
    if r >= 3 {
        // Force odd, but don't exceed what fits
        let r_odd = r | 1;
        if r_odd * rs_bit_count <= num_units {
            r_odd
        } else {
            // r was even, r|1 = r+1 which overflows — use r-1 (odd)
            (r - 1).max(1)
        }
    } else if r >= 2 {
        // r=2: can't force odd to 3 if it doesn't fit, use as-is
        if 3 * rs_bit_count <= num_units { 3 } else { 1 }
    } else {
        1
    }
}

/// Lay out `r` copies of RS-encoded bits across `num_units` embedding positions.
///
/// Uses sequential layout — copy `j` of the RS bitstream starts at offset
/// `j * rs_bits.len()`. Each copy is a contiguous block.
///
/// Returns (output_bits, r_used). Any remaining positions are zero-padded.
pub fn repetition_encode(rs_bits: &[u8], num_units: usize) -> (Vec<u8>, usize) {
    let r = compute_r(rs_bits.len(), num_units);
    let mut output = vec![0u8; num_units];

    for copy in 0..r {
        let start = copy * rs_bits.len();
        for (i, &bit) in rs_bits.iter().enumerate() {
            if start + i < num_units {
                output[start + i] = bit;
            }
        }
    }

    (output, r)
}

/// Soft majority voting across `r` copies of RS-encoded bits.
///
/// Uses sequential layout — copy `j` of bit `i` is at position
/// `j * rs_bit_count + i`. Sums LLR across all copies and decides:
/// positive total → bit 0, negative → bit 1.
#[cfg(test)]
pub fn repetition_decode_soft(llrs: &[f64], rs_bit_count: usize) -> Vec<u8> {
    if rs_bit_count == 0 {
        return Vec::new();
    }

    let r = llrs.len() / rs_bit_count;
    let mut voted = Vec::with_capacity(rs_bit_count);

    for i in 0..rs_bit_count {
        let mut total_llr = 0.0;
        for copy in 0..r {
            let idx = copy * rs_bit_count + i;
            if idx < llrs.len() {
                total_llr += llrs[idx];
            }
        }
        voted.push(if total_llr >= 0.0 { 0 } else { 1 });
    }

    voted
}

/// Stats from repetition decode for signal quality measurement.
#[derive(Debug, Clone)]
pub struct RepetitionQuality {
    /// Average |LLR| per copy per bit position.
    ///
    /// For each bit position, we sum the LLR across r copies, take the absolute
    /// value, divide by r to get the per-copy average, then average across all
    /// bit positions. This normalizes out the repetition factor so the reference
    /// value is always `delta/2` (STDM) or `step/2` (QIM) regardless of r.
    pub avg_abs_llr_per_copy: f64,
}

/// Soft majority voting with quality statistics.
///
/// Same logic as `repetition_decode_soft`, but also tracks the average |LLR|
/// per copy per bit position for signal quality measurement.
pub fn repetition_decode_soft_with_quality(
    llrs: &[f64],
    rs_bit_count: usize,
) -> (Vec<u8>, RepetitionQuality) {
    if rs_bit_count == 0 {
        return (
            Vec::new(),
            RepetitionQuality {
                avg_abs_llr_per_copy: 0.0,
            },
        );
    }

    let r = llrs.len() / rs_bit_count;
    let mut voted = Vec::with_capacity(rs_bit_count);
    let mut sum_abs_llr_per_copy = 0.0;

    for i in 0..rs_bit_count {
        let mut total_llr = 0.0;
        for copy in 0..r {
            let idx = copy * rs_bit_count + i;
            if idx < llrs.len() {
                total_llr += llrs[idx];
            }
        }
        voted.push(if total_llr >= 0.0 { 0 } else { 1 });
        // |summed_LLR| / r gives per-copy average for this bit position
        if r > 0 {
            sum_abs_llr_per_copy += total_llr.abs() / r as f64;
        }
    }

    let avg_abs_llr_per_copy = if rs_bit_count > 0 {
        sum_abs_llr_per_copy / rs_bit_count as f64
    } else {
        0.0
    };

    (
        voted,
        RepetitionQuality {
            avg_abs_llr_per_copy,
        },
    )
}
