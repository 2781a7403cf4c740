//! Error types for spimain-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.
//!
//! The controller itself has no runtime failure states: abnormal conditions
//! on the bus are handled by reset and a fresh request. Errors only arise
//! when building a controller from a bad configuration, or when a host tries
//! to start a transaction while another one is still on the wire.

use core::fmt;

/// The configuration parameter that was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFault {
    /// Address width outside 1..=32
    AddressWidth(u8),
    /// Data width outside 1..=32
    DataWidth(u8),
    /// Clock divider must be at least one host cycle per half-period
    ClockDivider(u32),
    /// SPI mode outside 0..=3
    SpiMode(u8),
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration rejected before the state machine was built
    InvalidConfig(ConfigFault),
    /// A transaction is already in flight or cooling down
    Busy,
    /// A driver loop ran past the cycle bound for the configured frame
    Timeout,
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressWidth(w) => write!(f, "address width {} not in 1..=32", w),
            Self::DataWidth(w) => write!(f, "data width {} not in 1..=32", w),
            Self::ClockDivider(d) => write!(f, "clock divider {} must be at least 1", d),
            Self::SpiMode(m) => write!(f, "SPI mode {} not in 0..=3", m),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(fault) => write!(f, "invalid configuration: {}", fault),
            Self::Busy => write!(f, "controller busy: transaction in progress"),
            Self::Timeout => write!(f, "transaction did not complete in time"),
        }
    }
}

impl From<ConfigFault> for Error {
    fn from(fault: ConfigFault) -> Self {
        Self::InvalidConfig(fault)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
