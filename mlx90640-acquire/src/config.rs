// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use crate::error::LibraryError;
use crate::register::FrameRate;

/// Settings for an [`AcquisitionSession`][crate::AcquisitionSession].
///
/// ```
/// # use mlx90640_acquire::{AcquisitionConfig, FrameRate};
/// let config = AcquisitionConfig::default()
///     .with_frame_rate(FrameRate::Eight)
///     .with_poll_delay_us(2000);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.emissivity(), 0.95);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcquisitionConfig {
    emissivity: f32,
    poll_delay_us: u32,
    sequencing_attempts: u32,
    sequencing_delay_us: u32,
    frame_rate: Option<FrameRate>,
}

impl AcquisitionConfig {
    pub const DEFAULT_EMISSIVITY: f32 = 0.95;
    pub const DEFAULT_POLL_DELAY_US: u32 = 5000;
    pub const DEFAULT_SEQUENCING_ATTEMPTS: u32 = 40;
    pub const DEFAULT_SEQUENCING_DELAY_US: u32 = 1000;

    /// The emissivity used until it is overridden on the session.
    pub fn with_emissivity(mut self, emissivity: f32) -> Self {
        self.emissivity = emissivity;
        self
    }

    /// How long to sleep between status register polls.
    pub fn with_poll_delay_us(mut self, delay_us: u32) -> Self {
        self.poll_delay_us = delay_us;
        self
    }

    /// How many times a subpage is waited for when the camera keeps reporting the other one.
    pub fn with_sequencing_attempts(mut self, attempts: u32) -> Self {
        self.sequencing_attempts = attempts;
        self
    }

    /// How long to sleep before waiting for a subpage again after a sequencing error.
    pub fn with_sequencing_delay_us(mut self, delay_us: u32) -> Self {
        self.sequencing_delay_us = delay_us;
        self
    }

    /// Request a refresh rate when the session is created.
    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn emissivity(&self) -> f32 {
        self.emissivity
    }

    pub fn poll_delay_us(&self) -> u32 {
        self.poll_delay_us
    }

    pub fn sequencing_attempts(&self) -> u32 {
        self.sequencing_attempts
    }

    pub fn sequencing_delay_us(&self) -> u32 {
        self.sequencing_delay_us
    }

    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.frame_rate
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<(), LibraryError> {
        validate_emissivity(self.emissivity)?;
        if self.poll_delay_us == 0 {
            return Err(LibraryError::InvalidData("The poll delay must be non-zero"));
        }
        // Every frame takes at least two captures
        if self.sequencing_attempts < 2 {
            return Err(LibraryError::InvalidData(
                "At least two sequencing attempts are required",
            ));
        }
        if self.sequencing_delay_us == 0 {
            return Err(LibraryError::InvalidData(
                "The sequencing delay must be non-zero",
            ));
        }
        Ok(())
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            emissivity: Self::DEFAULT_EMISSIVITY,
            poll_delay_us: Self::DEFAULT_POLL_DELAY_US,
            sequencing_attempts: Self::DEFAULT_SEQUENCING_ATTEMPTS,
            sequencing_delay_us: Self::DEFAULT_SEQUENCING_DELAY_US,
            frame_rate: None,
        }
    }
}

/// Emissivity has to be in (0, 1].
pub(crate) fn validate_emissivity(emissivity: f32) -> Result<(), LibraryError> {
    if emissivity > 0.0 && emissivity <= 1.0 {
        Ok(())
    } else {
        Err(LibraryError::InvalidData(
            "Emissivity must be greater than 0 and at most 1",
        ))
    }
}
