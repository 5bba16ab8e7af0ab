// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Capturing a single subpage: wait for new data, read RAM, then acknowledge.
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::i2c;
use log::{debug, trace, warn};

use crate::bus::SensorBus;
use crate::error::Error;
use crate::mlx90640::{
    NUM_PIXELS, RAM_BASE, RAM_WINDOW_WORDS, RAW_SUBPAGE_WORDS, TRANSFER_BYTES,
};
use crate::register::{ControlRegister, Subpage};
use crate::timing::{PollOutcome, RetryPolicy};

/// The raw contents of RAM for one subpage, followed by two words of metadata.
///
/// The layout is:
/// * words 0 through 767: the raw pixel readings.
/// * words 768 through 831: the auxiliary data (ambient sensor, gain and the like).
/// * word 832: the subpage this data belongs to.
/// * word 833: the control register at the time of capture.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSubpage {
    words: [u16; RAW_SUBPAGE_WORDS],
}

impl RawSubpage {
    pub const fn new() -> Self {
        Self {
            words: [0u16; RAW_SUBPAGE_WORDS],
        }
    }

    /// Build a raw subpage from the RAM contents, tagging it with `subpage` and `control`.
    pub fn from_ram(ram: &[u16; RAM_WINDOW_WORDS], subpage: Subpage, control: u16) -> Self {
        let mut raw = Self::new();
        raw.words[..RAM_WINDOW_WORDS].copy_from_slice(ram);
        raw.set_metadata(subpage, control);
        raw
    }

    pub fn words(&self) -> &[u16; RAW_SUBPAGE_WORDS] {
        &self.words
    }

    /// The raw pixel readings, in row-major order.
    pub fn pixels(&self) -> &[u16] {
        &self.words[..NUM_PIXELS]
    }

    /// The auxiliary data following the pixels in RAM.
    pub fn auxiliary(&self) -> &[u16] {
        &self.words[NUM_PIXELS..RAM_WINDOW_WORDS]
    }

    /// The subpage this data was captured for.
    ///
    /// `None` is only possible for a buffer that was never filled in.
    pub fn subpage(&self) -> Option<Subpage> {
        Subpage::try_from(usize::from(self.words[RAM_WINDOW_WORDS])).ok()
    }

    /// The control register contents when this subpage was captured.
    pub fn control_register(&self) -> ControlRegister {
        ControlRegister::from(self.words[RAM_WINDOW_WORDS + 1])
    }

    fn ram_window_mut(&mut self) -> &mut [u16] {
        &mut self.words[..RAM_WINDOW_WORDS]
    }

    fn set_metadata(&mut self, subpage: Subpage, control: u16) {
        self.words[RAM_WINDOW_WORDS] = usize::from(subpage) as u16;
        self.words[RAM_WINDOW_WORDS + 1] = control;
    }
}

impl Default for RawSubpage {
    fn default() -> Self {
        Self::new()
    }
}

/// Details about a successful capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureOutcome {
    /// The subpage that was captured. Always the expected one.
    pub subpage: Subpage,

    /// The camera flagged that it had overwritten unread data.
    pub overrun: bool,

    /// How many times the status register was polled before data was ready.
    pub polls: u32,
}

/// Reads subpages out of the camera, reusing a single transfer buffer.
pub struct SubpageCapture {
    scratch: [u8; TRANSFER_BYTES],
}

impl SubpageCapture {
    pub const fn new() -> Self {
        Self {
            scratch: [0u8; TRANSFER_BYTES],
        }
    }

    /// The transfer buffer, for other bulk reads (like dumping the EEPROM).
    pub(crate) fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    /// Wait for the camera to report `expected` as ready, then copy it into `raw`.
    ///
    /// The status register is polled according to `policy`. Once new data is flagged:
    ///
    /// * A reserved subpage value is an [`Error::Protocol`], and nothing is acknowledged.
    /// * A subpage other than `expected` is acknowledged (without reading RAM) so the camera can
    ///   move on, and an [`Error::Sequencing`] is returned. `last_consumed` is used to flag
    ///   whether the camera repeated itself.
    /// * Otherwise the entire RAM window is read in one transaction and acknowledged, then the
    ///   metadata words are filled in. `control` is recorded as-is, nothing else is read.
    ///
    /// `raw` is only modified when the expected subpage is captured.
    pub fn capture<I2C, D>(
        &mut self,
        bus: &mut SensorBus<'_, I2C>,
        delay: &mut D,
        policy: &RetryPolicy,
        expected: Subpage,
        last_consumed: Option<Subpage>,
        control: ControlRegister,
        raw: &mut RawSubpage,
    ) -> Result<CaptureOutcome, Error<I2C>>
    where
        I2C: i2c::WriteRead + i2c::Write,
        D: DelayUs<u32>,
    {
        let (status, polls) = match policy.poll(delay, |_, _| -> Result<_, Error<I2C>> {
            let status = bus.status()?;
            trace!("Polled {:?}", status);
            if status.interface_error() {
                warn!("Camera flagged an I²C interface error");
            }
            Ok(if status.new_data() { Some(status) } else { None })
        })? {
            PollOutcome::Ready { value, attempts } => (value, attempts),
            PollOutcome::Exhausted {
                attempts,
                waited_us,
            } => {
                debug!(
                    "No data for {:?} after {} polls ({}µs)",
                    expected, attempts, waited_us
                );
                return Err(Error::Timeout {
                    attempts,
                    waited_us,
                });
            }
        };
        let observed = status.subpage().map_err(|_| Error::Protocol {
            status: status.into(),
        })?;
        trace!("{:?} ready after {} polls", observed, polls);
        if observed != expected {
            bus.acknowledge()?;
            return Err(Error::Sequencing {
                expected,
                observed,
                duplicate: last_consumed == Some(observed),
            });
        }
        bus.read_words(RAM_BASE, &mut self.scratch, raw.ram_window_mut())?;
        bus.acknowledge()?;
        raw.set_metadata(observed, control.into());
        if status.overrun() {
            warn!("Overrun while capturing {:?}, older data was lost", observed);
        }
        Ok(CaptureOutcome {
            subpage: observed,
            overrun: status.overrun(),
            polls,
        })
    }
}

impl Default for SubpageCapture {
    fn default() -> Self {
        Self::new()
    }
}
