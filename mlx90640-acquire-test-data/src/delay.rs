// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayUs;

/// A delay that doesn't actually sleep, it just keeps track of how long it would have.
///
/// Clones share the same counters, so a clone can be kept around to inspect a delay that has been
/// moved into something else.
#[derive(Clone, Debug, Default)]
pub struct MockDelay {
    total_us: Rc<Cell<u64>>,
    calls: Rc<Cell<u32>>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// The total number of microseconds slept.
    pub fn total_us(&self) -> u64 {
        self.total_us.get()
    }

    /// The number of times `delay_us` was called.
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub fn reset(&self) {
        self.total_us.set(0);
        self.calls.set(0);
    }
}

impl DelayUs<u32> for MockDelay {
    fn delay_us(&mut self, us: u32) {
        self.total_us.set(self.total_us.get() + u64::from(us));
        self.calls.set(self.calls.get() + 1);
    }
}
