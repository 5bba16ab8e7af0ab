// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Register-level access to the camera over a borrowed I²C bus.
//!
//! The bus itself is an [`embedded-hal`][embedded-hal] blocking I²C implementation. Opening and
//! closing it is the job of whoever created it (for `linux-embedded-hal` that's
//! `I2cdev::new` and `Drop`); everything in this module only borrows it.
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/0.2/embedded_hal/blocking/i2c/index.html
use core::fmt;

use embedded_hal::blocking::i2c;
use paste::paste;

use crate::error::Error;
use crate::register::*;
use crate::util::{words_from_be_bytes, WORD_SIZE};

/// Marker newtype for addresses accessible over I<sup>2</sup>C.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
pub struct Address(u16);

impl Address {
    /// Wrap the given address in an `Address`.
    pub const fn new(address: u16) -> Self {
        Self(address)
    }

    pub(crate) fn as_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#X})", self.0)
    }
}

impl From<u16> for Address {
    fn from(raw_address: u16) -> Self {
        Self::new(raw_address)
    }
}

impl From<Address> for u16 {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// DRY macro for the set_* methods in `SensorBus` that modify a control register field.
///
/// The register is only written if the field actually changes.
macro_rules! set_register_field {
    { $register:ty, $field:ident, $typ:ty, $doc:literal } => {
    paste! {
        #[doc = $doc]
        pub fn [< set_ $field >](&mut self, new_value: $typ) -> Result<(), Error<I2C>> {
            let mut current: $register = self.read_register()?;
            if current.$field() != new_value {
                current.[< set_ $field >](new_value);
                self.write_register(current)
            } else {
                Ok(())
            }
        }
    }};
}

/// A borrowed I²C bus paired with the address of one camera on it.
pub struct SensorBus<'a, I2C> {
    bus: &'a mut I2C,
    address: u8,
}

impl<'a, I2C> SensorBus<'a, I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Borrow `bus` to talk to the camera at `address`.
    ///
    /// The default address for the MLX90640 is 0x33.
    pub fn new(bus: &'a mut I2C, address: u8) -> Self {
        Self { bus, address }
    }

    /// The I²C address of the camera.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read one 16-bit word.
    pub fn read_word(&mut self, register_address: Address) -> Result<u16, Error<I2C>> {
        let mut register_bytes = [0u8; WORD_SIZE];
        self.bus
            .write_read(
                self.address,
                &register_address.as_bytes(),
                &mut register_bytes,
            )
            .map_err(Error::I2cWriteReadError)?;
        Ok(u16::from_be_bytes(register_bytes))
    }

    /// Write one 16-bit word.
    pub fn write_word(&mut self, register_address: Address, value: u16) -> Result<(), Error<I2C>> {
        let address_bytes = register_address.as_bytes();
        let value_bytes = value.to_be_bytes();
        let combined: [u8; 4] = [
            address_bytes[0],
            address_bytes[1],
            value_bytes[0],
            value_bytes[1],
        ];
        self.bus
            .write(self.address, &combined)
            .map_err(Error::I2cWriteError)
    }

    /// Read a contiguous block of words starting at `start` in a single transaction.
    ///
    /// `scratch` must hold at least two bytes for every word in `words`.
    pub fn read_words(
        &mut self,
        start: Address,
        scratch: &mut [u8],
        words: &mut [u16],
    ) -> Result<(), Error<I2C>> {
        let byte_count = words.len() * WORD_SIZE;
        let scratch = &mut scratch[..byte_count];
        self.bus
            .write_read(self.address, &start.as_bytes(), scratch)
            .map_err(Error::I2cWriteReadError)?;
        words_from_be_bytes(scratch, words);
        Ok(())
    }

    pub fn read_register<R: Register>(&mut self) -> Result<R, Error<I2C>> {
        self.read_word(R::address()).map(R::from)
    }

    pub fn write_register<R: Register>(&mut self, register: R) -> Result<(), Error<I2C>> {
        self.write_word(R::address(), register.into())
    }

    /// Take one sample of the status register.
    pub fn status(&mut self) -> Result<StatusRegister, Error<I2C>> {
        self.read_register()
    }

    /// Clear the new data and overrun flags in the status register.
    pub fn acknowledge(&mut self) -> Result<(), Error<I2C>> {
        self.write_word(StatusRegister::address(), StatusRegister::acknowledge_mask())
    }

    pub fn control(&mut self) -> Result<ControlRegister, Error<I2C>> {
        self.read_register()
    }

    set_register_field! {
        ControlRegister,
        frame_rate,
        FrameRate,
        "Set the camera's refresh rate."
    }

    set_register_field! {
        ControlRegister,
        use_subpages,
        bool,
        "Enable (or disable) the use of subpages."
    }

    set_register_field! {
        ControlRegister,
        subpage_repeat,
        bool,
        "Enable (or disable) subpage repeat mode."
    }

    set_register_field! {
        ControlRegister,
        access_pattern,
        AccessPattern,
        "Set the access pattern used by the camera."
    }
}

#[cfg(test)]
mod test {
    use mlx90640_acquire_test_data::{I2cOperation, MockSensorBus};

    use super::*;

    #[test]
    fn read_register() {
        // Specifically using a non-default address to make sure assumptions aren't being made
        // about the address.
        let address = 0x10;
        let mut mock_bus = MockSensorBus::new(address);
        let control: ControlRegister = SensorBus::new(&mut mock_bus, address)
            .read_register()
            .unwrap();
        assert_eq!(control, ControlRegister::default());
        let ops = mock_bus.recent_operations();
        assert_eq!(
            ops.len(),
            1,
            "Only one operation should be performed to read a register"
        )
    }

    #[test]
    fn wrong_address_is_bus_error() {
        let mut mock_bus = MockSensorBus::new(0x33);
        let result = SensorBus::new(&mut mock_bus, 0x34).status();
        assert!(matches!(result, Err(Error::I2cWriteReadError(_))));
    }

    #[test]
    fn acknowledge_writes_mask() {
        let address = 0x42;
        let mut mock_bus = MockSensorBus::new(address);
        SensorBus::new(&mut mock_bus, address).acknowledge().unwrap();
        let ops = mock_bus.recent_operations();
        assert_eq!(
            ops[0],
            I2cOperation::Write {
                address: 0x8000,
                value: 0x0018
            }
        );
    }

    #[test]
    fn read_words_single_burst() {
        let address = 0x33;
        let mut mock_bus = MockSensorBus::new(address);
        mock_bus.fill_ram(0x0261);
        let mut scratch = [0u8; 16];
        let mut words = [0u16; 8];
        SensorBus::new(&mut mock_bus, address)
            .read_words(Address::new(0x0400), &mut scratch, &mut words)
            .unwrap();
        assert_eq!(words, [0x0261; 8]);
        assert_eq!(mock_bus.recent_operations().len(), 1);
    }

    #[test]
    fn set_register_flag_minimal_operations() {
        let address = 0x49;
        let mut mock_bus = MockSensorBus::new(address);
        let mut bus = SensorBus::new(&mut mock_bus, address);
        bus.set_frame_rate(FrameRate::SixtyFour).unwrap();
        // Setting it to the same value again should only read.
        bus.set_frame_rate(FrameRate::SixtyFour).unwrap();
        assert_eq!(
            mock_bus.recent_operations().len(),
            3,
            "There should only be two operations to update a register, and one to check it"
        );
        assert_eq!(mock_bus.control_register() & 0x0380, 0x0380);
    }

    #[test]
    fn set_control_flags() {
        let address = 0x33;
        let mut mock_bus = MockSensorBus::new(address);
        let mut bus = SensorBus::new(&mut mock_bus, address);
        bus.set_access_pattern(AccessPattern::Interleave).unwrap();
        bus.set_subpage_repeat(true).unwrap();
        bus.set_use_subpages(false).unwrap();
        let control = bus.control().unwrap();
        assert_eq!(control.access_pattern(), AccessPattern::Interleave);
        assert!(control.subpage_repeat());
        assert!(!control.use_subpages());
        assert_eq!(mock_bus.control_register(), 0x0908);
    }
}
