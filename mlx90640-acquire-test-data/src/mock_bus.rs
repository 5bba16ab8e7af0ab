// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeInclusive;
use std::rc::Rc;

use embedded_hal::blocking::i2c;

/// The number of words of RAM read for each subpage (0x0400 through 0x073F).
pub const RAM_WORDS: usize = 0x0740 - 0x0400;

/// The number of words of EEPROM (0x2400 through 0x273F).
pub const EEPROM_WORDS: usize = 0x2740 - 0x2400;

/// The control register value the camera powers up with: chess pattern, 18-bit ADC, 2Hz and
/// subpage mode enabled.
pub const DEFAULT_CONTROL_REGISTER: u16 = 0x1901;

const RAM_RANGE: RangeInclusive<u16> = 0x0400..=0x073F;

const EEPROM_RANGE: RangeInclusive<u16> = 0x2400..=0x273F;

const STATUS_REGISTER_ADDRESS: u16 = 0x8000;

// The lowest 6 bits are documented. The subpage field (bits 0-2) is read-only, and is ignored
// when written.
const STATUS_REGISTER_WRITE_MASK: u16 = 0x003F;

const STATUS_NEW_DATA: u16 = 0x0008;

const STATUS_OVERRUN: u16 = 0x0010;

const STATUS_BUSY: u16 = 0x0020;

const CONTROL_REGISTER_ADDRESS: u16 = 0x800D;

// Only the top three bits of control register 1 are reserved.
const CONTROL_REGISTER_WRITE_MASK: u16 = 0x1FFF;

const RECENT_OPERATIONS_QUEUE_LENGTH: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    /// The given address should not be written to.
    IllegalWriteAddress(u16),

    /// The given value is illegal for the given location.
    IllegalWriteValue(u16, u16),

    /// A read would run off the end of a memory region.
    IllegalAccess(u16),

    /// The given address isn't valid for the camera.
    UnknownMemoryAddress(u16),

    /// An unknown I2C address was given.
    UnknownI2cAddress(u8),

    /// The requested operation is not allowed.
    ///
    /// This covers things such as:
    /// * A write-read transaction writing more than just an address.
    /// * A write-read transaction with a 0-length read (which causes the camera to reject the next
    ///   operation).
    /// * Transfers that aren't a whole number of words (each word is two bytes).
    IllegalOperation,

    /// A failure was requested for this address with
    /// [`fail_writes_to`][MockSensorBus::fail_writes_to] or
    /// [`fail_reads_from`][MockSensorBus::fail_reads_from].
    InjectedFailure(u16),
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockError::IllegalWriteAddress(address) => {
                write!(f, "{:#06X} is not writeable", address)
            }
            MockError::IllegalWriteValue(address, value) => {
                write!(f, "{:#06X} can't be written to {:#06X}", value, address)
            }
            MockError::IllegalAccess(address) => write!(f, "{:#06X} can't be read", address),
            MockError::UnknownMemoryAddress(address) => {
                write!(f, "Unknown memory address {:#06X}", address)
            }
            MockError::UnknownI2cAddress(address) => {
                write!(f, "Nothing at I2C address {:#04X}", address)
            }
            MockError::IllegalOperation => write!(f, "Illegal I2C operation"),
            MockError::InjectedFailure(address) => {
                write!(f, "Injected failure at {:#06X}", address)
            }
        }
    }
}

impl std::error::Error for MockError {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cOperation {
    /// A single word was written.
    Write { address: u16, value: u16 },

    /// `length` words were read, starting at `address`.
    Read { address: u16, length: usize },
}

/// One subpage the mock camera will produce.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScriptedSubpage {
    status: u16,
    fill: u16,
    polls_before_ready: u32,
}

impl ScriptedSubpage {
    /// New data for `subpage`, with every word of RAM set to `fill`.
    pub fn ready(subpage: u16, fill: u16) -> Self {
        Self::raw_status((subpage & 0x0007) | STATUS_NEW_DATA, fill)
    }

    /// Present `status` as-is once this subpage comes up, with every word of RAM set to `fill`.
    pub fn raw_status(status: u16, fill: u16) -> Self {
        Self {
            status,
            fill,
            polls_before_ready: 0,
        }
    }

    /// Report no new data for `polls` status reads before this subpage is ready.
    pub fn after_polls(mut self, polls: u32) -> Self {
        self.polls_before_ready = polls;
        self
    }

    /// Also flag an overrun.
    pub fn with_overrun(mut self) -> Self {
        self.status |= STATUS_OVERRUN;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn fill(&self) -> u16 {
        self.fill
    }
}

#[derive(Debug)]
struct MockState {
    status_register: u16,
    control_register: u16,
    ram: [u16; RAM_WORDS],
    eeprom: [u16; EEPROM_WORDS],
    script: VecDeque<ScriptedSubpage>,
    repeat_script: bool,
    recent_operations: VecDeque<I2cOperation>,
    status_reads: u32,
    fail_writes_to: Option<u16>,
    fail_reads_from: Option<u16>,
}

impl MockState {
    /// Sample the status register, bringing in the next scripted subpage if the previous one has
    /// been acknowledged.
    fn sample_status(&mut self) -> u16 {
        self.status_reads += 1;
        if self.status_register & STATUS_NEW_DATA == 0 {
            if let Some(next) = self.script.front_mut() {
                if next.polls_before_ready > 0 {
                    next.polls_before_ready -= 1;
                } else if let Some(next) = self.script.pop_front() {
                    self.status_register = next.status;
                    self.ram.fill(next.fill);
                    if self.repeat_script {
                        self.script.push_back(next);
                    }
                }
            }
        }
        self.status_register
    }

    fn read(&mut self, start: u16, words: &mut [u16]) -> Result<(), MockError> {
        let length = words.len() as u16;
        match start {
            STATUS_REGISTER_ADDRESS | CONTROL_REGISTER_ADDRESS if length != 1 => {
                Err(MockError::IllegalAccess(start + 1))
            }
            STATUS_REGISTER_ADDRESS => {
                words[0] = self.sample_status();
                Ok(())
            }
            CONTROL_REGISTER_ADDRESS => {
                words[0] = self.control_register;
                Ok(())
            }
            _ if RAM_RANGE.contains(&start) => {
                let end = start + length - 1;
                if !RAM_RANGE.contains(&end) {
                    return Err(MockError::IllegalAccess(end));
                }
                let offset = (start - RAM_RANGE.start()) as usize;
                words.copy_from_slice(&self.ram[offset..(offset + words.len())]);
                Ok(())
            }
            _ if EEPROM_RANGE.contains(&start) => {
                let end = start + length - 1;
                if !EEPROM_RANGE.contains(&end) {
                    return Err(MockError::IllegalAccess(end));
                }
                let offset = (start - EEPROM_RANGE.start()) as usize;
                words.copy_from_slice(&self.eeprom[offset..(offset + words.len())]);
                Ok(())
            }
            _ => Err(MockError::UnknownMemoryAddress(start)),
        }
    }

    fn write(&mut self, address: u16, value: u16) -> Result<(), MockError> {
        match address {
            STATUS_REGISTER_ADDRESS => {
                if value & !STATUS_REGISTER_WRITE_MASK != 0 {
                    return Err(MockError::IllegalWriteValue(address, value));
                }
                // New data and overrun are cleared by writing a 1 to them.
                self.status_register &= !(value & (STATUS_NEW_DATA | STATUS_OVERRUN));
                if value & STATUS_BUSY != 0 {
                    self.status_register |= STATUS_BUSY;
                } else {
                    self.status_register &= !STATUS_BUSY;
                }
                Ok(())
            }
            CONTROL_REGISTER_ADDRESS => {
                if !check_new_against_mask(
                    self.control_register,
                    CONTROL_REGISTER_WRITE_MASK,
                    value,
                ) {
                    return Err(MockError::IllegalWriteValue(address, value));
                }
                self.control_register = value;
                Ok(())
            }
            // Only the camera writes to RAM, and EEPROM writes aren't needed.
            _ if RAM_RANGE.contains(&address) || EEPROM_RANGE.contains(&address) => {
                Err(MockError::IllegalWriteAddress(address))
            }
            _ => Err(MockError::UnknownMemoryAddress(address)),
        }
    }

    fn add_operation(&mut self, operation: I2cOperation) {
        self.recent_operations.push_front(operation);
        self.recent_operations
            .truncate(RECENT_OPERATIONS_QUEUE_LENGTH);
    }
}

/// An MLX90640 on an I²C bus.
///
/// The subpages the camera produces are scripted with [`push_subpage`][Self::push_subpage]: each
/// time the status register is read after the previous subpage was acknowledged, the next
/// scripted subpage is brought in (RAM is filled and the status register updated).
///
/// Clones share the same camera, so a clone can be used to inspect the camera while the original
/// is borrowed.
#[derive(Clone, Debug)]
pub struct MockSensorBus {
    i2c_address: u8,
    state: Rc<RefCell<MockState>>,
}

impl MockSensorBus {
    pub fn new(i2c_address: u8) -> Self {
        Self {
            i2c_address,
            state: Rc::new(RefCell::new(MockState {
                status_register: 0,
                control_register: DEFAULT_CONTROL_REGISTER,
                ram: [0u16; RAM_WORDS],
                eeprom: [0u16; EEPROM_WORDS],
                script: VecDeque::new(),
                repeat_script: false,
                recent_operations: VecDeque::new(),
                status_reads: 0,
                fail_writes_to: None,
                fail_reads_from: None,
            })),
        }
    }

    pub fn i2c_address(&self) -> u8 {
        self.i2c_address
    }

    /// Queue up the next subpage for the camera to produce.
    pub fn push_subpage(&self, subpage: ScriptedSubpage) {
        self.state.borrow_mut().script.push_back(subpage);
    }

    /// Queue up several subpages.
    pub fn extend_script<I>(&self, subpages: I)
    where
        I: IntoIterator<Item = ScriptedSubpage>,
    {
        self.state.borrow_mut().script.extend(subpages);
    }

    /// When enabled, every scripted subpage is put back at the end of the queue once it has been
    /// produced, so the camera keeps running forever.
    pub fn set_repeat_script(&self, repeat: bool) {
        self.state.borrow_mut().repeat_script = repeat;
    }

    /// The number of scripted subpages still waiting to be produced.
    pub fn pending_subpages(&self) -> usize {
        self.state.borrow().script.len()
    }

    /// Set every word of RAM to `value`.
    pub fn fill_ram(&self, value: u16) {
        self.state.borrow_mut().ram.fill(value);
    }

    /// Set every word of EEPROM to `value`.
    pub fn fill_eeprom(&self, value: u16) {
        self.state.borrow_mut().eeprom.fill(value);
    }

    /// Replace the start of EEPROM with `words`.
    pub fn set_eeprom(&self, words: &[u16]) {
        self.state.borrow_mut().eeprom[..words.len()].copy_from_slice(words);
    }

    pub fn status_register(&self) -> u16 {
        self.state.borrow().status_register
    }

    /// Overwrite the status register directly, bypassing the write rules.
    pub fn set_status_register(&self, value: u16) {
        self.state.borrow_mut().status_register = value;
    }

    pub fn control_register(&self) -> u16 {
        self.state.borrow().control_register
    }

    /// Overwrite the control register directly, bypassing the write mask.
    pub fn set_control_register(&self, value: u16) {
        self.state.borrow_mut().control_register = value;
    }

    /// The number of times the status register has been read.
    pub fn status_reads(&self) -> u32 {
        self.state.borrow().status_reads
    }

    /// Fail every write to `address` (or stop failing them with `None`).
    pub fn fail_writes_to(&self, address: Option<u16>) {
        self.state.borrow_mut().fail_writes_to = address;
    }

    /// Fail every read starting at `address` (or stop failing them with `None`).
    pub fn fail_reads_from(&self, address: Option<u16>) {
        self.state.borrow_mut().fail_reads_from = address;
    }

    /// The most recent operations, newest first.
    pub fn recent_operations(&self) -> Ref<VecDeque<I2cOperation>> {
        Ref::map(self.state.borrow(), |state| &state.recent_operations)
    }

    pub fn clear_recent_operations(&self) {
        self.state.borrow_mut().recent_operations.clear()
    }

    fn check_i2c_address(&self, i2c_address: u8) -> Result<(), MockError> {
        if i2c_address == self.i2c_address {
            Ok(())
        } else {
            Err(MockError::UnknownI2cAddress(i2c_address))
        }
    }
}

impl i2c::Write for MockSensorBus {
    type Error = MockError;

    fn write(&mut self, i2c_address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.check_i2c_address(i2c_address)?;
        // Only single word writes are supported: two bytes of address, two of data.
        if bytes.len() != 4 {
            return Err(MockError::IllegalOperation);
        }
        let address = u16::from_be_bytes([bytes[0], bytes[1]]);
        let value = u16::from_be_bytes([bytes[2], bytes[3]]);
        let mut state = self.state.borrow_mut();
        if state.fail_writes_to == Some(address) {
            return Err(MockError::InjectedFailure(address));
        }
        state.write(address, value)?;
        state.add_operation(I2cOperation::Write { address, value });
        Ok(())
    }
}

impl i2c::WriteRead for MockSensorBus {
    type Error = MockError;

    fn write_read(
        &mut self,
        i2c_address: u8,
        write_buffer: &[u8],
        out_buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.check_i2c_address(i2c_address)?;
        // Write-reads should only be writing the address, so write_buffer should only be two bytes
        if write_buffer.len() != 2 || out_buffer.is_empty() || out_buffer.len() % 2 != 0 {
            return Err(MockError::IllegalOperation);
        }
        let address = u16::from_be_bytes([write_buffer[0], write_buffer[1]]);
        let mut state = self.state.borrow_mut();
        if state.fail_reads_from == Some(address) {
            return Err(MockError::InjectedFailure(address));
        }
        let mut words = vec![0u16; out_buffer.len() / 2];
        state.add_operation(I2cOperation::Read {
            address,
            length: words.len(),
        });
        state.read(address, &mut words)?;
        out_buffer
            .chunks_exact_mut(2)
            .zip(words.iter())
            .for_each(|(bytes, word)| bytes.copy_from_slice(&word.to_be_bytes()));
        Ok(())
    }
}

fn check_new_against_mask(existing: u16, mask: u16, new: u16) -> bool {
    (new & !mask) == (existing & !mask)
}
