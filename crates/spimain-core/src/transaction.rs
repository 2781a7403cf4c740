//! Transaction request and result types

use crate::config::Config;

/// Transfer direction, sent as the first bit of every frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Main reads a register (direction bit 0)
    #[default]
    Read,
    /// Main writes a register (direction bit 1)
    Write,
}

impl Direction {
    /// Decode the `mode` input (0 = read, 1 = write)
    pub const fn from_bit(bit: bool) -> Self {
        if bit {
            Self::Write
        } else {
            Self::Read
        }
    }

    /// Value driven on MOSI for the direction bit
    pub const fn bit(&self) -> bool {
        matches!(self, Self::Write)
    }
}

/// A single register access
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Read or write
    pub direction: Direction,
    /// Register address
    pub address: u32,
    /// Payload for writes (ignored for reads)
    pub write_data: u32,
}

impl TransactionRequest {
    /// Create a read request
    pub const fn read(address: u32) -> Self {
        Self {
            direction: Direction::Read,
            address,
            write_data: 0,
        }
    }

    /// Create a write request
    pub const fn write(address: u32, data: u32) -> Self {
        Self {
            direction: Direction::Write,
            address,
            write_data: data,
        }
    }

    /// Truncate address and payload to the configured widths
    ///
    /// Out-of-range fields are reduced modulo 2^width rather than rejected.
    pub fn masked(&self, config: &Config) -> Self {
        Self {
            direction: self.direction,
            address: self.address & config.address_mask(),
            write_data: match self.direction {
                Direction::Write => self.write_data & config.data_mask(),
                Direction::Read => 0,
            },
        }
    }

    /// Returns true if this is a read
    pub fn is_read(&self) -> bool {
        self.direction == Direction::Read
    }
}

/// Outcome of a completed transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionResult {
    /// The request as it went out on the wire (after masking)
    pub request: TransactionRequest,
    /// Captured payload, present for reads only
    pub read_data: Option<u32>,
}
