// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Full-frame acquisition for the MLX90640 thermal camera over I²C.
//!
//! The MLX90640 doesn't update its whole image at once. The imaging area is divided into two
//! [subpages][Subpage], and in the default chess pattern the pixels alternate between subpages in
//! both the X and Y axes:
//! ```text
//! 0 1 0 1 0 1 0 1
//! 1 0 1 0 1 0 1 0
//! 0 1 0 1 0 1 0 1
//! 1 0 1 0 1 0 1 0
//! ```
//! Getting a complete image means waiting for subpage 0, reading it out and acknowledging it,
//! then doing the same for subpage 1, all within the timing budget set by the camera's refresh
//! rate. The camera may also skip ahead or repeat a subpage, which has to be detected and
//! recovered from rather than merged into a nonsense frame. [`AcquisitionSession`] handles all
//! of this, handing back one [`FullFrame`] per call or a typed [`Error`] explaining why it
//! couldn't.
//!
//! Turning raw readings into temperatures needs the camera's factory calibration and a fair bit
//! of math, neither of which is implemented here. They are plugged in through the
//! [`CalibrationProvider`] and [`Conversion`] traits.
//!
//! This library uses the [`embedded-hal`][embedded-hal] I²C and delay traits, so it should work
//! on any platform with an `embedded-hal` implementation. It is also `no_std` compatible.
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/0.2/embedded_hal/blocking/i2c/index.html
//!
//! # Example
//! ```no_run
//! use linux_embedded_hal::{Delay, I2cdev};
//! use mlx90640_acquire::{
//!     AcquisitionConfig, AcquisitionSession, CalibrationProvider, Conversion, FrameRate,
//!     LibraryError, RawSubpage, EEPROM_WORDS, NUM_PIXELS,
//! };
//!
//! // Stand-ins for a real calibration and conversion implementation.
//! struct Calibration;
//!
//! impl CalibrationProvider for Calibration {
//!     type Parameters = ();
//!
//!     fn extract_parameters(&self, _: &[u16; EEPROM_WORDS]) -> Result<(), LibraryError> {
//!         Ok(())
//!     }
//!
//!     fn ambient_temperature(&self, _: &RawSubpage, _: &()) -> f32 {
//!         25.0
//!     }
//! }
//!
//! struct Raw;
//!
//! impl Conversion<()> for Raw {
//!     fn to_temperatures(
//!         &self,
//!         raw: &RawSubpage,
//!         _: &(),
//!         _emissivity: f32,
//!         _ambient: f32,
//!         destination: &mut [f32; NUM_PIXELS],
//!     ) {
//!         for (pixel, raw) in destination.iter_mut().zip(raw.pixels()) {
//!             *pixel = f32::from(*raw);
//!         }
//!     }
//! }
//!
//! let mut i2c_bus = I2cdev::new("/dev/i2c-1").expect("/dev/i2c-1 needs to be an I2C controller");
//! let config = AcquisitionConfig::default().with_frame_rate(FrameRate::Four);
//! // Default address for these cameras is 0x33
//! let mut session =
//!     AcquisitionSession::new(&mut i2c_bus, 0x33, Delay, Calibration, Raw, config)?;
//! let frame = session.acquire_frame()?;
//! println!("Ambient temperature: {}", frame.ambient_temperature());
//! # Ok::<(), mlx90640_acquire::Error<I2cdev>>(())
//! ```

#![no_std]

pub mod acquisition;
pub mod bus;
pub mod calibration;
pub mod capture;
pub mod config;
pub mod error;
pub mod merge;
pub mod mlx90640;
pub mod register;
pub mod timing;
mod util;

pub use acquisition::{
    AcquisitionSession, AcquisitionState, AcquisitionStats, FrameSummary, FullFrame,
};
pub use bus::{Address, SensorBus};
pub use calibration::{CalibrationProvider, Conversion};
pub use capture::RawSubpage;
pub use config::AcquisitionConfig;
pub use error::{Error, ErrorKind, LibraryError};
pub use mlx90640::{EEPROM_WORDS, HEIGHT, NUM_PIXELS, RAM_WINDOW_WORDS, RAW_SUBPAGE_WORDS, WIDTH};
pub use register::*;
pub use timing::{RefreshInfo, RetryPolicy};

/// The default I²C address of the MLX90640.
pub const DEFAULT_ADDRESS: u8 = 0x33;
