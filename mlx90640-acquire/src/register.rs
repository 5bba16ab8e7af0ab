// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Register layouts for the status (0x8000) and control (0x800D) registers.
//!
//! Both registers are 16 bits wide and big-endian on the wire. The types here only deal with the
//! decoded values; moving them across the bus is handled by [`SensorBus`][crate::bus::SensorBus].
use core::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bus::Address;
use crate::error::LibraryError;
use crate::util::is_bit_set;

/// Trait for common register functionality.
pub trait Register: From<u16> + Into<u16> {
    /// A bit mask of which bits can be modified by the controller.
    ///
    /// When changing register values on the camera, the current value should be read, then
    /// bitwise-ANDed with the complement of this mask, then bitwise-ORd with the new value. This
    /// preserves the values of any reserved bits in the registers.
    fn write_mask() -> u16;

    /// The address of this register in the camera's memory map.
    fn address() -> Address;
}

/// Bit 3 of the status register, set by the camera when a subpage has been written to RAM.
pub const STATUS_NEW_DATA: u16 = 1 << 3;

/// Bit 4 of the status register, set when newer data overwrote an unread subpage.
pub const STATUS_OVERRUN: u16 = 1 << 4;

/// The three least significant bits of the status register hold the subpage field.
const STATUS_SUBPAGE_FIELD: u16 = 0x0007;

/// A decoded sample of the status register (0x8000).
///
/// This is a snapshot: it has no lifecycle of its own and is recomputed on every poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct StatusRegister {
    /// The raw subpage field. Only 0 and 1 are meaningful, the other values are reserved.
    pub(crate) subpage_field: u8,

    /// Set when there is new data available in RAM.
    ///
    /// This flag is set to true by the camera, and can only be reset by the controller.
    pub(crate) new_data: bool,

    /// Set when the camera wrote a subpage before the previous one was acknowledged.
    pub(crate) overrun: bool,

    /// The camera is busy measuring.
    pub(crate) measurement_in_progress: bool,

    /// The camera flagged an error on its I²C interface.
    pub(crate) interface_error: bool,
}

impl StatusRegister {
    /// Decode a raw status word.
    pub fn decode(raw: u16) -> Self {
        Self {
            subpage_field: (raw & STATUS_SUBPAGE_FIELD) as u8,
            new_data: is_bit_set(raw, 3),
            overrun: is_bit_set(raw, 4),
            measurement_in_progress: is_bit_set(raw, 5),
            interface_error: is_bit_set(raw, 15),
        }
    }

    /// The raw three bit subpage field, including reserved values.
    pub fn subpage_field(&self) -> u8 {
        self.subpage_field
    }

    /// The subpage that was last updated by the camera.
    ///
    /// Values other than 0 and 1 are reserved by the datasheet, and are reported as an error.
    pub fn subpage(&self) -> Result<Subpage, LibraryError> {
        Subpage::try_from_primitive(self.subpage_field as usize)
            .map_err(|_| LibraryError::InvalidData("Reserved subpage value in status register"))
    }

    pub fn new_data(&self) -> bool {
        self.new_data
    }

    pub fn overrun(&self) -> bool {
        self.overrun
    }

    pub fn measurement_in_progress(&self) -> bool {
        self.measurement_in_progress
    }

    pub fn interface_error(&self) -> bool {
        self.interface_error
    }

    /// The value written back to the status register to acknowledge a subpage.
    ///
    /// Writing the new data and overrun bits clears both of them, releasing the camera to
    /// produce the next subpage.
    pub const fn acknowledge_mask() -> u16 {
        STATUS_NEW_DATA | STATUS_OVERRUN
    }
}

impl Register for StatusRegister {
    fn write_mask() -> u16 {
        // The subpage field (the three least significant bits) is read-only.
        0x0038
    }

    fn address() -> Address {
        Address::new(0x8000)
    }
}

impl From<u16> for StatusRegister {
    fn from(raw: u16) -> Self {
        Self::decode(raw)
    }
}

impl From<StatusRegister> for u16 {
    fn from(status: StatusRegister) -> Self {
        let mut raw = u16::from(status.subpage_field) & STATUS_SUBPAGE_FIELD;
        raw |= (status.new_data as u16) << 3;
        raw |= (status.overrun as u16) << 4;
        raw |= (status.measurement_in_progress as u16) << 5;
        raw |= (status.interface_error as u16) << 15;
        raw
    }
}

/// Represents the possible states of the control register (0x800D).
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
// skip formatting in here as rustfmt will remove the extra blank lines around the "extra" bit
// comments.
#[rustfmt::skip]
pub struct ControlRegister {
    // The fields in this struct are laid out in least to most significant bits they occupy in the
    // control register.

    /// Whether or not to use subpages.
    ///
    /// If subpages are disabled, only one page will be updated. The default is enabled.
    pub(crate) use_subpages: bool,

    /// Enabled data hold.
    ///
    /// By default data is transferred into RAM for each frame, but if this flag is enabled, data
    /// will only be written into RAM when the controller asks for it.
    pub(crate) data_hold: bool,

    /// Whether or not to stay on one subpage instead of alternating.
    pub(crate) subpage_repeat: bool,

    /// Which subpage to use when `subpage_repeat` is enabled.
    pub(crate) subpage: Subpage,

    // `subpage` takes up three bits.

    /// The refresh rate, bits 7 through 9.
    pub(crate) frame_rate: FrameRate,

    /// The resolution to run the internal ADC at, bits 10 and 11.
    pub(crate) resolution: Resolution,

    /// Which access pattern to use.
    ///
    /// The default for the MLX90640 is the [chess pattern][AccessPattern::Chess] mode.
    pub(crate) access_pattern: AccessPattern,

    // The rest of the bits are reserved.
}

impl ControlRegister {
    pub fn use_subpages(&self) -> bool {
        self.use_subpages
    }

    pub fn set_use_subpages(&mut self, value: bool) {
        self.use_subpages = value;
    }

    pub fn data_hold(&self) -> bool {
        self.data_hold
    }

    pub fn set_data_hold(&mut self, value: bool) {
        self.data_hold = value;
    }

    pub fn subpage_repeat(&self) -> bool {
        self.subpage_repeat
    }

    pub fn set_subpage_repeat(&mut self, value: bool) {
        self.subpage_repeat = value;
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, value: FrameRate) {
        self.frame_rate = value;
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn access_pattern(&self) -> AccessPattern {
        self.access_pattern
    }

    pub fn set_access_pattern(&mut self, value: AccessPattern) {
        self.access_pattern = value;
    }
}

impl Default for ControlRegister {
    /// The power-on settings documented in the datasheet.
    fn default() -> Self {
        Self {
            use_subpages: true,
            data_hold: false,
            subpage_repeat: false,
            subpage: Subpage::Zero,
            frame_rate: FrameRate::default(),
            resolution: Resolution::default(),
            access_pattern: AccessPattern::Chess,
        }
    }
}

impl Register for ControlRegister {
    fn write_mask() -> u16 {
        // *Technically* it's 0x1FFD, but the second bit is documented to always be 0
        0x1FFF
    }

    fn address() -> Address {
        Address::new(0x800D)
    }
}

impl From<u16> for ControlRegister {
    fn from(raw: u16) -> Self {
        let subpage = if is_bit_set(raw, 4) {
            Subpage::One
        } else {
            Subpage::Zero
        };
        // Masking to three bits means every value maps to a variant.
        let frame_rate = FrameRate::from_raw((raw & 0x0380) >> 7).unwrap_or_default();
        let resolution = Resolution::from_raw((raw & 0x0C00) >> 10).unwrap_or_default();
        let access_pattern = if is_bit_set(raw, 12) {
            AccessPattern::Chess
        } else {
            AccessPattern::Interleave
        };
        Self {
            use_subpages: is_bit_set(raw, 0),
            data_hold: is_bit_set(raw, 2),
            subpage_repeat: is_bit_set(raw, 3),
            subpage,
            frame_rate,
            resolution,
            access_pattern,
        }
    }
}

impl From<ControlRegister> for u16 {
    fn from(register: ControlRegister) -> Self {
        let mut raw = 0u16;
        raw |= register.use_subpages as u16;
        raw |= (register.data_hold as u16) << 2;
        raw |= (register.subpage_repeat as u16) << 3;
        let subpage_int: usize = register.subpage.into();
        raw |= (subpage_int as u16) << 4;
        raw |= register.frame_rate.as_raw() << 7;
        raw |= register.resolution.as_raw() << 10;
        if register.access_pattern == AccessPattern::Chess {
            raw |= 1u16 << 12;
        }
        raw
    }
}

/// Identify which subpage to access.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum Subpage {
    Zero = 0,
    One = 1,
}

impl Subpage {
    /// The subpage the camera measures after this one.
    pub fn other(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    /// The checkerboard parity of the pixels this subpage covers.
    pub fn parity(self) -> u8 {
        self as u8
    }
}

/// The possible refresh rates supported by the camera. Before using the higher refresh rates,
/// ensure your I²C bus is fast enough. A quick rundown of the the maximum frame rate some common
/// I²C bus speeds can support:
///
/// * 100kHz: [4Hz][FrameRate::Four]
/// * 400kHz: [16Hz][FrameRate::Sixteen]
/// * 1MHz: [64Hz][FrameRate::SixtyFour] (barely, [32Hz][FrameRate::ThirtyTwo] is safer)
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum FrameRate {
    /// 0.5 Hz, one frame every two seconds.
    Half,

    /// 1Hz.
    One,

    /// 2Hz, which is also the default.
    Two,

    /// 4Hz.
    Four,

    /// 8Hz.
    Eight,

    /// 16Hz.
    Sixteen,

    /// 32Hz.
    ThirtyTwo,

    /// 64Hz.
    SixtyFour,
}

impl FrameRate {
    /// Attempt to create a `FrameRate` from a raw refresh-rate code.
    pub fn from_raw(raw_value: u16) -> Result<Self, LibraryError> {
        match raw_value {
            0 => Ok(Self::Half),
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Four),
            4 => Ok(Self::Eight),
            5 => Ok(Self::Sixteen),
            6 => Ok(Self::ThirtyTwo),
            7 => Ok(Self::SixtyFour),
            _ => Err(LibraryError::InvalidData("Invalid frame rate given")),
        }
    }

    /// Map a frame rate variant into the refresh-rate code used by the camera.
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Half => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 3,
            Self::Eight => 4,
            Self::Sixteen => 5,
            Self::ThirtyTwo => 6,
            Self::SixtyFour => 7,
        }
    }

    /// Seconds between two subpages. Each full frame is two subpages.
    pub fn subpage_period(&self) -> f32 {
        (f32::from(*self) * 2f32).recip()
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::Two
    }
}

impl TryFrom<f32> for FrameRate {
    type Error = LibraryError;

    /// Attempt to create a `FrameRate` from a number.
    ///
    /// This will only work if the source number *exactly* matches one of the values named as a
    /// variant.
    /// ```
    /// # use core::convert::TryFrom;
    /// # use mlx90640_acquire::FrameRate;
    /// assert_eq!(FrameRate::try_from(0.5), Ok(FrameRate::Half));
    /// let almost_half = 0.50001;
    /// assert!(FrameRate::try_from(almost_half).is_err());
    /// ```
    #[allow(clippy::float_cmp)]
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        (0..8)
            .filter_map(|code| Self::from_raw(code).ok())
            .find(|rate| f32::from(*rate) == value)
            .ok_or(LibraryError::InvalidData(
                "The given number does not match a valid frame rate",
            ))
    }
}

impl TryFrom<u8> for FrameRate {
    type Error = LibraryError;

    /// Attempt to create a `FrameRate` from a whole number of frames per second.
    ///
    /// 0.5Hz can't be created this way, use [`FrameRate::Half`] directly.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            32 => Ok(Self::ThirtyTwo),
            64 => Ok(Self::SixtyFour),
            _ => Err(LibraryError::InvalidData(
                "The given number does not match a valid frame rate",
            )),
        }
    }
}

impl From<FrameRate> for f32 {
    fn from(frame_rate: FrameRate) -> Self {
        match frame_rate {
            FrameRate::Half => 0.5,
            FrameRate::One => 1f32,
            FrameRate::Two => 2f32,
            FrameRate::Four => 4f32,
            FrameRate::Eight => 8f32,
            FrameRate::Sixteen => 16f32,
            FrameRate::ThirtyTwo => 32f32,
            FrameRate::SixtyFour => 64f32,
        }
    }
}

/// The resolution of the internal [ADC][adc].
///
/// [adc]: https://en.wikipedia.org/wiki/Analog-to-digital_converter
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Resolution {
    Sixteen,
    Seventeen,
    /// 18-bit, the default.
    Eighteen,
    Nineteen,
}

impl Resolution {
    pub(crate) fn from_raw(raw_value: u16) -> Result<Self, LibraryError> {
        match raw_value {
            0 => Ok(Self::Sixteen),
            1 => Ok(Self::Seventeen),
            2 => Ok(Self::Eighteen),
            3 => Ok(Self::Nineteen),
            _ => Err(LibraryError::InvalidData(
                "Invalid raw resolution value given",
            )),
        }
    }

    pub(crate) fn as_raw(&self) -> u16 {
        match self {
            Self::Sixteen => 0,
            Self::Seventeen => 1,
            Self::Eighteen => 2,
            Self::Nineteen => 3,
        }
    }
}

impl From<Resolution> for u8 {
    fn from(resolution: Resolution) -> Self {
        16 + resolution.as_raw() as u8
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Eighteen
    }
}

/// The pixel access pattern used by the camera.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessPattern {
    /// Pixels alternate between subpages, resulting in a chess or checker board pattern.
    ///
    /// This is the default (and strongly recommended value) for the MLX90640, and the only
    /// pattern frame merging supports.
    Chess = 1,

    /// Each row of pixels is in the same subpage, with the rows alternating between subpages.
    Interleave = 0,
}
