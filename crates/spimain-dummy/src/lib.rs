//! spimain-dummy - Emulated SPI subordinate for testing
//!
//! This crate provides a register-file subordinate that speaks the
//! controller's frame format at the pin level, plus a clocked [`Testbench`]
//! that wires it to a [`SpiHost`](spimain_core::SpiHost). It's useful for
//! testing and development without real hardware.
//!
//! The subordinate is built from the same [`EdgeTable`] and
//! [`BitShifter`] primitives as the controller, so a frame shifted out by one
//! side reassembles to the same value on the other.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod testbench;
#[cfg(feature = "alloc")]
mod trace;

#[cfg(feature = "alloc")]
pub use testbench::Testbench;
#[cfg(feature = "alloc")]
pub use trace::{Trace, TraceEntry};

#[cfg(feature = "alloc")]
use alloc::collections::BTreeMap;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use core::cell::Cell;

use spimain_core::bitbang::BitbangSpiMaster;
use spimain_core::config::Config;
use spimain_core::shifter::BitShifter;
use spimain_core::timing::{Edge, EdgeRole, EdgeTable};
use spimain_core::{BusLines, Direction};

/// Activity counters for the emulated subordinate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Completed read frames
    pub reads: u32,
    /// Completed write frames
    pub writes: u32,
    /// Frames cut short by chip select going high
    pub aborted: u32,
}

/// Register-file subordinate
///
/// Holds `2^address_width` registers of `data_width` bits, all reading as
/// `fill` until written. Registers are stored sparsely.
#[cfg(feature = "alloc")]
pub struct DummyRegisters {
    config: Config,
    timing: EdgeTable,
    registers: BTreeMap<u32, u32>,
    fill: u32,
    selected: bool,
    sclk: bool,
    miso: bool,
    sampled: u32,
    direction: Direction,
    address: BitShifter,
    rx: BitShifter,
    tx: BitShifter,
    frame: Vec<bool>,
    last_frame: Vec<bool>,
    stats: DummyStats,
}

#[cfg(feature = "alloc")]
impl DummyRegisters {
    /// Create a subordinate with all registers reading as zero
    ///
    /// Uses the SPI mode and bit order from `config`; a real peripheral has a
    /// fixed mode, so changing the controller's mode afterwards desynchronizes
    /// the two, as it would on hardware.
    pub fn new(config: Config) -> Self {
        let timing = EdgeTable::new(config.spi_mode);
        Self {
            config,
            timing,
            registers: BTreeMap::new(),
            fill: 0,
            selected: false,
            sclk: timing.idle_level(),
            miso: false,
            sampled: 0,
            direction: Direction::Read,
            address: BitShifter::receive(config.address_width, config.bit_order),
            rx: BitShifter::receive(config.data_width, config.bit_order),
            tx: BitShifter::transmit(0, config.data_width, config.bit_order),
            frame: Vec::new(),
            last_frame: Vec::new(),
            stats: DummyStats::default(),
        }
    }

    /// Set the value unwritten registers read as
    pub fn with_fill(mut self, fill: u32) -> Self {
        self.fill = fill & self.config.data_mask();
        self
    }

    /// Read a register directly
    pub fn register(&self, address: u32) -> u32 {
        let address = address & self.config.address_mask();
        self.registers.get(&address).copied().unwrap_or(self.fill)
    }

    /// Write a register directly
    pub fn set_register(&mut self, address: u32, value: u32) {
        let address = address & self.config.address_mask();
        self.registers.insert(address, value & self.config.data_mask());
    }

    /// Configuration the subordinate was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current MISO level
    pub fn miso(&self) -> bool {
        self.miso
    }

    /// MOSI bits sampled during the most recent complete or aborted frame
    pub fn last_frame(&self) -> &[bool] {
        &self.last_frame
    }

    /// Activity counters
    pub fn stats(&self) -> DummyStats {
        self.stats
    }

    /// Returns true while chip select is asserted
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// React to the bus levels after one host cycle
    pub fn observe(&mut self, lines: BusLines) {
        if !lines.selected() {
            if self.selected {
                self.end_frame();
            }
            self.sclk = lines.sclk();
            return;
        }

        if !self.selected {
            self.begin_frame();
            self.sclk = lines.sclk();
            return;
        }

        if lines.sclk() != self.sclk {
            self.sclk = lines.sclk();
            match self.timing.classify(Edge::towards(self.sclk)) {
                EdgeRole::Sample => self.sample(lines.mosi()),
                EdgeRole::Shift => self.shift(),
            }
        }
    }

    fn frame_bits(&self) -> u32 {
        self.config.frame_bits()
    }

    fn begin_frame(&mut self) {
        self.selected = true;
        self.sampled = 0;
        self.frame.clear();
        self.address = BitShifter::receive(self.config.address_width, self.config.bit_order);
        self.rx = BitShifter::receive(self.config.data_width, self.config.bit_order);
    }

    fn end_frame(&mut self) {
        if self.sampled < self.frame_bits() {
            self.stats.aborted += 1;
            log::debug!("dummy: frame aborted after {} bits", self.sampled);
        }
        self.selected = false;
        self.miso = false;
        self.last_frame = core::mem::take(&mut self.frame);
    }

    fn sample(&mut self, mosi: bool) {
        let index = self.sampled;
        let aw = self.config.address_width as u32;
        if index >= self.frame_bits() {
            return;
        }
        self.frame.push(mosi);
        self.sampled += 1;

        if index == 0 {
            self.direction = Direction::from_bit(mosi);
        } else if index <= aw {
            self.address.sample_in(mosi);
        } else {
            match self.direction {
                Direction::Write => {
                    if self.rx.sample_in(mosi) {
                        let address = self.address.value();
                        let value = self.rx.value();
                        log::debug!("dummy: write 0x{:X} <- 0x{:X}", address, value);
                        self.registers.insert(address, value);
                        self.stats.writes += 1;
                    }
                }
                Direction::Read => {
                    if self.sampled == self.frame_bits() {
                        self.stats.reads += 1;
                    }
                }
            }
        }
    }

    fn shift(&mut self) {
        let index = self.sampled;
        let aw = self.config.address_width as u32;
        if self.direction != Direction::Read || index <= aw || index >= self.frame_bits() {
            self.miso = false;
            return;
        }
        if index == aw + 1 {
            let value = self.register(self.address.value());
            log::debug!("dummy: read 0x{:X} -> 0x{:X}", self.address.value(), value);
            self.tx = BitShifter::transmit(value, self.config.data_width, self.config.bit_order);
        }
        self.miso = self.tx.shift_out().unwrap_or(false);
    }
}

/// GPIO-level view of a [`DummyRegisters`]
///
/// Implements [`BitbangSpiMaster`] so the emulated subordinate can sit
/// behind the bitbang adapter exactly like a real chip on GPIO pins.
#[cfg(feature = "alloc")]
pub struct DummyPins {
    lines: BusLines,
    device: DummyRegisters,
    delays: Cell<u64>,
}

#[cfg(feature = "alloc")]
impl DummyPins {
    /// Wire up a subordinate; chip select starts released, clock idle
    pub fn new(device: DummyRegisters) -> Self {
        let mut lines = BusLines::CS;
        lines.set(BusLines::SCLK, device.config().spi_mode.cpol());
        Self {
            lines,
            device,
            delays: Cell::new(0),
        }
    }

    /// The emulated subordinate
    pub fn device(&self) -> &DummyRegisters {
        &self.device
    }

    /// Mutable access to the emulated subordinate
    pub fn device_mut(&mut self) -> &mut DummyRegisters {
        &mut self.device
    }

    /// Host cycles elapsed on this bus, counted by `half_period_delay`
    pub fn delays(&self) -> u64 {
        self.delays.get()
    }

    fn update(&mut self, line: BusLines, high: bool) {
        if self.lines.contains(line) != high {
            self.lines.set(line, high);
            self.device.observe(self.lines);
        }
    }
}

#[cfg(feature = "alloc")]
impl BitbangSpiMaster for DummyPins {
    fn set_cs(&mut self, active: bool) {
        self.update(BusLines::CS, !active);
    }

    fn set_sck(&mut self, high: bool) {
        self.update(BusLines::SCLK, high);
    }

    fn set_mosi(&mut self, high: bool) {
        self.update(BusLines::MOSI, high);
    }

    fn get_miso(&self) -> bool {
        self.device.miso()
    }

    fn half_period_delay(&self) {
        // No delay needed for in-memory operations, just count the cycle
        self.delays.set(self.delays.get() + 1);
    }
}
