// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
#[cfg(feature = "std")]
extern crate std;

use core::fmt;

use embedded_hal::blocking::i2c;

use crate::register::{FrameRate, Subpage};

/// Errors that don't involve I²C.
#[derive(Clone, Debug, PartialEq)]
pub enum LibraryError {
    /// When a value from the camera (or given to this library) is malformed in some way.
    InvalidData(&'static str),

    Other(&'static str),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::InvalidData(msg) => write!(f, "{}", msg),
            LibraryError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LibraryError {}

/// The broad category of an [`Error`], without any of the data attached to it.
///
/// This is what a failed [acquisition][crate::AcquisitionState::Failed] records.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The I²C transport failed.
    Bus,

    /// The camera never reported new data within the poll budget.
    Timeout,

    /// The camera reported a different subpage than the one expected.
    Sequencing,

    /// The status register held a reserved value.
    Protocol,

    /// No usable ambient temperature, or the calibration data could not be used.
    Calibration,

    /// The camera's refresh rate is not the one that was requested.
    RefreshRate,

    /// Invalid configuration or other errors from within this library.
    Library,
}

pub enum Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Errors originating from the I²C implementation during a write-read transaction.
    I2cWriteReadError(<I2C as i2c::WriteRead>::Error),

    /// Errors originating from the I²C implementation during a write transaction.
    I2cWriteError(<I2C as i2c::Write>::Error),

    /// The camera did not report new data before the poll budget ran out.
    Timeout {
        /// How many times the status register was checked.
        attempts: u32,

        /// The total time spent sleeping between checks, in microseconds.
        waited_us: u64,
    },

    /// A subpage other than the expected one was reported.
    Sequencing {
        expected: Subpage,
        observed: Subpage,

        /// The observed subpage is the same one that was acknowledged last.
        duplicate: bool,
    },

    /// The status register reported a reserved subpage value.
    Protocol {
        /// The raw status register value.
        status: u16,
    },

    /// Neither subpage produced a finite ambient temperature, or the calibration parameters
    /// could not be extracted.
    Calibration(LibraryError),

    /// The camera is running at a different refresh rate than requested.
    RefreshRateMismatch {
        requested: FrameRate,
        configured: FrameRate,
    },

    /// Errors originating from within this library.
    LibraryError(LibraryError),
}

impl<I2C> Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::I2cWriteReadError(_) | Error::I2cWriteError(_) => ErrorKind::Bus,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Sequencing { .. } => ErrorKind::Sequencing,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Calibration(_) => ErrorKind::Calibration,
            Error::RefreshRateMismatch { .. } => ErrorKind::RefreshRate,
            Error::LibraryError(_) => ErrorKind::Library,
        }
    }
}

// Custom Debug implementation so that I2C doesn't need to implement Debug (like the one from
// linux-embedded-hal).
impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2cWriteReadError(i2c_error) => f
                .debug_tuple("Error::I2cWriteReadError")
                .field(i2c_error)
                .finish(),
            Error::I2cWriteError(i2c_error) => f
                .debug_tuple("Error::I2cWriteError")
                .field(i2c_error)
                .finish(),
            Error::Timeout {
                attempts,
                waited_us,
            } => f
                .debug_struct("Error::Timeout")
                .field("attempts", attempts)
                .field("waited_us", waited_us)
                .finish(),
            Error::Sequencing {
                expected,
                observed,
                duplicate,
            } => f
                .debug_struct("Error::Sequencing")
                .field("expected", expected)
                .field("observed", observed)
                .field("duplicate", duplicate)
                .finish(),
            Error::Protocol { status } => f
                .debug_struct("Error::Protocol")
                .field("status", status)
                .finish(),
            Error::Calibration(err) => f.debug_tuple("Error::Calibration").field(err).finish(),
            Error::RefreshRateMismatch {
                requested,
                configured,
            } => f
                .debug_struct("Error::RefreshRateMismatch")
                .field("requested", requested)
                .field("configured", configured)
                .finish(),
            Error::LibraryError(err) => f.debug_tuple("Error::LibraryError").field(err).finish(),
        }
    }
}

impl<I2C> fmt::Display for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2cWriteReadError(i2c_error) => write!(f, "I2C Error: {:?}", i2c_error),
            Error::I2cWriteError(i2c_error) => write!(f, "I2C Error: {:?}", i2c_error),
            Error::Timeout {
                attempts,
                waited_us,
            } => write!(
                f,
                "No new data after {} polls ({}µs)",
                attempts, waited_us
            ),
            Error::Sequencing {
                expected,
                observed,
                duplicate,
            } => {
                write!(
                    f,
                    "Expected subpage {:?}, camera reported {:?}",
                    expected, observed
                )?;
                if *duplicate {
                    write!(f, " again")?;
                }
                Ok(())
            }
            Error::Protocol { status } => {
                write!(f, "Reserved subpage value in status {:#06X}", status)
            }
            Error::Calibration(err) => write!(f, "Calibration Error: {}", err),
            Error::RefreshRateMismatch {
                requested,
                configured,
            } => write!(
                f,
                "Requested {}Hz, camera is running at {}Hz",
                f32::from(*requested),
                f32::from(*configured)
            ),
            Error::LibraryError(err) => write!(f, "Library Error: {:?}", err),
        }
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: std::error::Error + 'static,
    <I2C as i2c::Write>::Error: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::I2cWriteReadError(i2c_error) => Some(i2c_error),
            Error::I2cWriteError(i2c_error) => Some(i2c_error),
            Error::Calibration(lib_err) | Error::LibraryError(lib_err) => Some(lib_err),
            _ => None,
        }
    }
}

impl<I2C> From<LibraryError> for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    fn from(lib_err: LibraryError) -> Self {
        Self::LibraryError(lib_err)
    }
}
