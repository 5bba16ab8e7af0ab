// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Capabilities for turning raw subpage data into temperatures.
//!
//! Extracting the calibration constants from the factory EEPROM data, and the formulas that use
//! them, are not implemented in this crate. Instead they are plugged in through the two traits in
//! this module, which keeps the acquisition logic testable without a camera (or a datasheet).
use embedded_hal::blocking::i2c;

use crate::bus::SensorBus;
use crate::capture::RawSubpage;
use crate::error::{Error, LibraryError};
use crate::mlx90640::{EEPROM_BASE, EEPROM_WORDS, NUM_PIXELS};

/// Access to the camera-specific calibration data.
///
/// Each MLX90640 has calibration data from the factory stored on its EEPROM. This data is only
/// processed once per session, and the resulting parameters are then shared (read-only) by every
/// conversion afterwards.
pub trait CalibrationProvider {
    /// The processed calibration parameters.
    type Parameters;

    /// Process the raw EEPROM contents into calibration parameters.
    fn extract_parameters(
        &self,
        eeprom: &[u16; EEPROM_WORDS],
    ) -> Result<Self::Parameters, LibraryError>;

    /// Estimate the ambient temperature (T<sub>a</sub>) from the auxiliary data in one subpage.
    ///
    /// A non-finite value means the subpage can't be used as an ambient reference.
    fn ambient_temperature(&self, raw: &RawSubpage, parameters: &Self::Parameters) -> f32;
}

/// Convert one subpage of raw data to per-pixel temperatures.
pub trait Conversion<P> {
    /// Write a temperature for every pixel to `destination`.
    ///
    /// Only the pixels belonging to the subpage in `raw` are meaningful; the others will be
    /// replaced when the two subpages are merged.
    fn to_temperatures(
        &self,
        raw: &RawSubpage,
        parameters: &P,
        emissivity: f32,
        ambient_temperature: f32,
        destination: &mut [f32; NUM_PIXELS],
    );
}

impl<P, C> Conversion<P> for &C
where
    C: Conversion<P> + ?Sized,
{
    fn to_temperatures(
        &self,
        raw: &RawSubpage,
        parameters: &P,
        emissivity: f32,
        ambient_temperature: f32,
        destination: &mut [f32; NUM_PIXELS],
    ) {
        (**self).to_temperatures(
            raw,
            parameters,
            emissivity,
            ambient_temperature,
            destination,
        )
    }
}

/// Read the entire EEPROM in one transaction.
///
/// `scratch` needs to be at least twice as long as the EEPROM is in words.
pub fn dump_eeprom<I2C>(
    bus: &mut SensorBus<'_, I2C>,
    scratch: &mut [u8],
    eeprom: &mut [u16; EEPROM_WORDS],
) -> Result<(), Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    bus.read_words(EEPROM_BASE, scratch, &mut eeprom[..])
}
