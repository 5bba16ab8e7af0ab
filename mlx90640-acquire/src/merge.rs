// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Combining two subpages into one full frame.
//!
//! In the chess pattern each subpage only measures half of the pixels, alternating like the
//! squares of a checkerboard. Pixel (row, column) belongs to subpage `(row + column) % 2`.
use crate::mlx90640::{NUM_PIXELS, WIDTH};
use crate::register::Subpage;

/// Generate the checkerboard parity for every pixel of an image `width` pixels wide.
///
/// Each entry is 0 or 1, matching the [parity][Subpage::parity] of the subpage that measures that
/// pixel.
pub const fn chess_pattern<const N: usize>(width: usize) -> [u8; N] {
    let mut pattern = [0u8; N];
    let mut index = 0;
    while index < N {
        let row = index / width;
        let column = index % width;
        pattern[index] = ((row + column) % 2) as u8;
        index += 1;
    }
    pattern
}

/// The checkerboard parity of every pixel on an MLX90640, in row-major order.
pub static CHESS_PATTERN: [u8; NUM_PIXELS] = chess_pattern::<NUM_PIXELS>(WIDTH);

/// Pick every pixel from either `a` or `b`, depending on its parity.
///
/// Pixels with a parity of `a_parity` are taken from `a`, the rest from `b`. Nothing is averaged;
/// every output pixel is copied from exactly one input.
///
/// # Panics
///
/// All four slices must be the same length.
pub fn merge_subpages(pattern: &[u8], a_parity: u8, a: &[f32], b: &[f32], merged: &mut [f32]) {
    assert!(
        pattern.len() == merged.len() && a.len() == merged.len() && b.len() == merged.len(),
        "The pattern, both subpages and the merged frame must be the same length"
    );
    pattern
        .iter()
        .zip(a.iter().zip(b.iter()))
        .zip(merged.iter_mut())
        .for_each(|((parity, (a, b)), merged)| {
            *merged = if *parity == a_parity { *a } else { *b };
        });
}

/// Merge the converted subpages of an MLX90640 frame.
pub fn merge_frame(
    subpage_zero: &[f32; NUM_PIXELS],
    subpage_one: &[f32; NUM_PIXELS],
    merged: &mut [f32; NUM_PIXELS],
) {
    merge_subpages(
        &CHESS_PATTERN,
        Subpage::Zero.parity(),
        subpage_zero,
        subpage_one,
        merged,
    );
}
