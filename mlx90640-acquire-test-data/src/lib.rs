// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Test doubles for `mlx90640-acquire`: a scriptable MLX90640 on a mock I²C bus, and a delay that
//! only records how long it was asked to sleep.
mod delay;
mod mock_bus;

pub use delay::MockDelay;
pub use mock_bus::{
    I2cOperation, MockError, MockSensorBus, ScriptedSubpage, DEFAULT_CONTROL_REGISTER,
    EEPROM_WORDS, RAM_WORDS,
};
