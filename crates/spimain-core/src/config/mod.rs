//! Controller configuration
//!
//! A [`Config`] fixes the frame geometry (address and data field widths),
//! the SPI mode and bit order, the serial clock divider and the cooldown
//! period. It is validated once, before a controller is built from it.
//!
//! With the `std` feature, configurations can be loaded from TOML:
//!
//! ```toml
//! [bus]
//! address_width = 6
//! data_width = 8
//! spi_mode = 0
//! bit_order = "msb"
//! cooldown_cycles = 4
//! clock_divider = 1
//! clk_period_ns = 10
//! ```

#[cfg(feature = "std")]
mod toml;

#[cfg(feature = "std")]
pub use self::toml::ConfigFileError;

use crate::error::{ConfigFault, Result};

/// Widest field the controller can carry
pub const MAX_FIELD_WIDTH: u8 = 32;

/// SPI mode, encoding clock polarity (CPOL) and clock phase (CPHA)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// All four modes, in numeric order
    pub const ALL: [SpiMode; 4] = [Self::Mode0, Self::Mode1, Self::Mode2, Self::Mode3];

    /// Decode a mode number (0-3)
    pub const fn from_number(mode: u8) -> core::result::Result<Self, ConfigFault> {
        match mode {
            0 => Ok(Self::Mode0),
            1 => Ok(Self::Mode1),
            2 => Ok(Self::Mode2),
            3 => Ok(Self::Mode3),
            _ => Err(ConfigFault::SpiMode(mode)),
        }
    }

    /// Decode the two-bit `spi_mode` input; upper bits are ignored
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Mode0,
            1 => Self::Mode1,
            2 => Self::Mode2,
            _ => Self::Mode3,
        }
    }

    /// Mode number (0-3)
    pub const fn number(&self) -> u8 {
        *self as u8
    }

    /// Clock polarity: idle level of the serial clock
    pub const fn cpol(&self) -> bool {
        (self.number() >> 1) & 1 != 0
    }

    /// Clock phase
    pub const fn cpha(&self) -> bool {
        self.number() & 1 != 0
    }
}

/// Order in which field bits appear on the wire
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BitOrder {
    /// Most significant bit first
    #[default]
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

impl BitOrder {
    /// Decode the `msb_first` input
    pub const fn from_msb_first(msb_first: bool) -> Self {
        if msb_first {
            Self::MsbFirst
        } else {
            Self::LsbFirst
        }
    }

    /// Returns true for MSB-first ordering
    pub const fn is_msb_first(&self) -> bool {
        matches!(self, Self::MsbFirst)
    }
}

/// Controller configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Address field width in bits (1..=32)
    pub address_width: u8,
    /// Data field width in bits (1..=32)
    pub data_width: u8,
    /// SPI mode (CPOL/CPHA)
    pub spi_mode: SpiMode,
    /// Bit order for address and data fields
    pub bit_order: BitOrder,
    /// Host cycles the bus stays idle after chip select is released
    pub cooldown_cycles: u32,
    /// Host cycles per serial-clock half-period
    pub clock_divider: u32,
    /// Host clock period, used as waveform timescale
    pub clk_period_ns: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address_width: 6,
            data_width: 8,
            spi_mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
            cooldown_cycles: 4,
            clock_divider: 1,
            clk_period_ns: 10,
        }
    }
}

impl Config {
    /// Create a configuration with the given field widths and defaults otherwise
    pub fn new(address_width: u8, data_width: u8) -> Self {
        Self {
            address_width,
            data_width,
            ..Default::default()
        }
    }

    /// Set the SPI mode
    pub fn with_spi_mode(mut self, mode: SpiMode) -> Self {
        self.spi_mode = mode;
        self
    }

    /// Set the bit order
    pub fn with_bit_order(mut self, order: BitOrder) -> Self {
        self.bit_order = order;
        self
    }

    /// Set the cooldown period in host cycles
    pub fn with_cooldown(mut self, cycles: u32) -> Self {
        self.cooldown_cycles = cycles;
        self
    }

    /// Set the serial clock divider (host cycles per half-period)
    pub fn with_clock_divider(mut self, divider: u32) -> Self {
        self.clock_divider = divider;
        self
    }

    /// Check that the configuration describes a buildable controller
    pub fn validate(&self) -> Result<()> {
        if self.address_width == 0 || self.address_width > MAX_FIELD_WIDTH {
            return Err(ConfigFault::AddressWidth(self.address_width).into());
        }
        if self.data_width == 0 || self.data_width > MAX_FIELD_WIDTH {
            return Err(ConfigFault::DataWidth(self.data_width).into());
        }
        if self.clock_divider == 0 {
            return Err(ConfigFault::ClockDivider(self.clock_divider).into());
        }
        Ok(())
    }

    /// Bits in one frame: direction, address and data
    pub fn frame_bits(&self) -> u32 {
        1 + self.address_width as u32 + self.data_width as u32
    }

    /// Mask selecting the low `address_width` bits
    pub fn address_mask(&self) -> u32 {
        width_mask(self.address_width)
    }

    /// Mask selecting the low `data_width` bits
    pub fn data_mask(&self) -> u32 {
        width_mask(self.data_width)
    }

    /// Number of addressable registers on the subordinate
    pub fn address_space(&self) -> u64 {
        1u64 << self.address_width
    }

    /// Host cycles for one transaction, from the accepting tick up to and
    /// including the tick that returns the controller to idle
    ///
    /// Covers the chip-select setup period, the frame itself, the deselect
    /// hold and the cooldown.
    pub fn transaction_cycles(&self) -> u64 {
        let d = self.clock_divider as u64;
        let half_periods = 2 + 2 * self.frame_bits() as u64 + 1;
        1 + half_periods * d + self.cooldown_cycles.max(1) as u64
    }
}

/// Mask covering the low `width` bits (width <= 32)
pub const fn width_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}
