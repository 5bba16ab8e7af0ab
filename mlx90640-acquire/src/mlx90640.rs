// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Geometry and memory map of the MLX90640.
use crate::bus::Address;
use crate::util::WORD_SIZE;

/// The height of the image captured by sensor in pixels.
pub const HEIGHT: usize = 24;

/// The width of the image captured by the sensor in pixels.
pub const WIDTH: usize = 32;

/// The total number of pixels an MLX90640 has.
pub const NUM_PIXELS: usize = HEIGHT * WIDTH;

/// The start of RAM, where the pixel data begins.
pub const RAM_BASE: Address = Address::new(0x0400);

/// The number of words of pixel and auxiliary data read out of RAM for each subpage.
///
/// RAM runs from 0x0400 through 0x073F: 768 pixels followed by 64 auxiliary words (ambient
/// temperature, gain, compensation pixels and so on).
pub const RAM_WINDOW_WORDS: usize = 0x0740 - 0x0400;

/// The number of words the controller appends after the RAM window.
pub const METADATA_WORDS: usize = 2;

/// The length of a raw subpage buffer in words.
pub const RAW_SUBPAGE_WORDS: usize = RAM_WINDOW_WORDS + METADATA_WORDS;

/// The start of the factory calibration data in EEPROM.
pub const EEPROM_BASE: Address = Address::new(0x2400);

/// The number of words in EEPROM (0x2400 through 0x273F).
pub const EEPROM_WORDS: usize = 0x2740 - 0x2400;

/// The size of the byte buffer needed to read either the RAM window or the EEPROM in one go.
pub(crate) const TRANSFER_BYTES: usize = RAM_WINDOW_WORDS * WORD_SIZE;
