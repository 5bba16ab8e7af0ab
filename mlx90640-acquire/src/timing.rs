// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Refresh timing, and the bounded poll-and-sleep policy derived from it.
use embedded_hal::blocking::delay::DelayUs;
use num_traits::float::FloatCore;

use crate::error::LibraryError;
use crate::register::{ControlRegister, FrameRate};

/// How much longer than one subpage period the camera is given to produce new data.
const POLL_SAFETY_MARGIN: f32 = 1.25;

const MICROSECONDS_PER_SECOND: f32 = 1_000_000f32;

/// The refresh configuration of the camera, as read back from the control register.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefreshInfo {
    frame_rate: FrameRate,
    full_frame_hz: f32,
    subpage_period_s: f32,
}

impl RefreshInfo {
    /// Derive the timing for a raw refresh-rate code (0 through 7).
    pub fn from_code(code: u16) -> Result<Self, LibraryError> {
        FrameRate::from_raw(code).map(Self::from)
    }

    /// Derive the timing from the current control register contents.
    pub fn from_control(control: &ControlRegister) -> Self {
        Self::from(control.frame_rate())
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// The raw refresh-rate code.
    pub fn code(&self) -> u8 {
        self.frame_rate.as_raw() as u8
    }

    /// Full frames (both subpages) per second.
    pub fn full_frame_hz(&self) -> f32 {
        self.full_frame_hz
    }

    /// Seconds between two consecutive subpages.
    pub fn subpage_period_s(&self) -> f32 {
        self.subpage_period_s
    }
}

impl From<FrameRate> for RefreshInfo {
    fn from(frame_rate: FrameRate) -> Self {
        Self {
            frame_rate,
            full_frame_hz: f32::from(frame_rate),
            subpage_period_s: frame_rate.subpage_period(),
        }
    }
}

/// The result of running a [`RetryPolicy`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PollOutcome<T> {
    /// An attempt produced a value.
    Ready {
        value: T,
        /// The number of attempts made, including the successful one.
        attempts: u32,
    },

    /// Every attempt came up empty.
    Exhausted { attempts: u32, waited_us: u64 },
}

/// A bounded number of attempts with a fixed sleep between them.
///
/// The sleep only happens *between* attempts, so the total time slept is at most
/// `(max_attempts - 1) * delay_us`, which is always within [`budget_us`][RetryPolicy::budget_us].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay_us: u32,
}

impl RetryPolicy {
    /// Create a new policy. At least one attempt is always made.
    pub const fn new(max_attempts: u32, delay_us: u32) -> Self {
        let max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        Self {
            max_attempts,
            delay_us,
        }
    }

    /// The poll budget for waiting on one subpage.
    ///
    /// One immediate poll, followed by `ceil(subpage period × 1.25 / delay)` more, each after a
    /// sleep. The time slept before giving up is always at least 1.25 subpage periods.
    pub fn for_subpage(refresh: &RefreshInfo, delay_us: u32) -> Self {
        let delay_us = delay_us.max(1);
        let budget_us = refresh.subpage_period_s() * POLL_SAFETY_MARGIN * MICROSECONDS_PER_SECOND;
        let sleeps = FloatCore::ceil(budget_us / delay_us as f32) as u32;
        Self::new(sleeps.saturating_add(1), delay_us)
    }

    /// The most time this policy will sleep before reporting exhaustion.
    pub fn max_wait_us(&self) -> u64 {
        u64::from(self.max_attempts - 1) * u64::from(self.delay_us)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_us(&self) -> u32 {
        self.delay_us
    }

    /// The upper bound on time spent by this policy, in microseconds.
    pub fn budget_us(&self) -> u64 {
        u64::from(self.max_attempts) * u64::from(self.delay_us)
    }

    /// Run `attempt` until it yields a value, an error, or the attempts run out.
    ///
    /// `attempt` is given the 0-based attempt number and the delay, so it can do its own
    /// sleeping if it needs to.
    pub fn poll<D, T, E, F>(&self, delay: &mut D, mut attempt: F) -> Result<PollOutcome<T>, E>
    where
        D: DelayUs<u32>,
        F: FnMut(u32, &mut D) -> Result<Option<T>, E>,
    {
        let mut waited_us = 0u64;
        for n in 0..self.max_attempts {
            if n > 0 {
                delay.delay_us(self.delay_us);
                waited_us += u64::from(self.delay_us);
            }
            if let Some(value) = attempt(n, delay)? {
                return Ok(PollOutcome::Ready {
                    value,
                    attempts: n + 1,
                });
            }
        }
        Ok(PollOutcome::Exhausted {
            attempts: self.max_attempts,
            waited_us,
        })
    }
}
