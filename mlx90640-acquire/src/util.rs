// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The word size of the camera in terms of 8-bit bytes.
pub(crate) const WORD_SIZE: usize = (u16::BITS / u8::BITS) as usize;

/// Check if the n-th bit is set.
///
/// Bits are 0-indexed, from the LSB.
pub(crate) fn is_bit_set<B>(value: B, index: usize) -> bool
where
    B: num_traits::PrimInt + num_traits::Unsigned,
{
    (value & (B::one() << index)) > B::zero()
}

/// Unpack big-endian 16-bit words from `bytes` into `words`.
///
/// Only as many words as fit in both buffers are converted.
pub(crate) fn words_from_be_bytes(bytes: &[u8], words: &mut [u16]) {
    bytes
        .chunks_exact(WORD_SIZE)
        .zip(words.iter_mut())
        .for_each(|(chunk, word)| *word = u16::from_be_bytes([chunk[0], chunk[1]]));
}
