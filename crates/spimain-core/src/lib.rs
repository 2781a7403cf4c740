//! spimain-core - Core library for a clocked SPI main controller
//!
//! This crate models a synchronous SPI main (master) one host-clock cycle at
//! a time. Given an enable signal and a request, the controller drives chip
//! select, the serial clock and MOSI, and samples MISO, performing a
//! register-style read or write frame:
//!
//! ```text
//! cs   ‾‾\___________________________________________/‾‾‾‾‾
//! mosi     | dir | a[n-1] ... a[0] | d[m-1] ... d[0] |
//! ```
//!
//! It is designed to be `no_std` compatible so the same state machine can
//! run inside firmware that bitbangs GPIO pins.
//!
//! # Features
//!
//! - `std` - Enable standard library support (TOML config files,
//!   `std::error::Error` for [`Error`])
//!
//! # Example
//!
//! ```ignore
//! use spimain_core::{Config, SpiHost, TransactionRequest};
//!
//! let config = Config::default();
//! let mut host = SpiHost::new(config)?;
//! host.submit(TransactionRequest::read(0b101010), config)?;
//! loop {
//!     let out = host.tick(miso_line());
//!     if let Some(result) = host.poll() {
//!         println!("read 0x{:02X}", result.read_data.unwrap_or(0));
//!         break;
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bitbang;
pub mod config;
pub mod error;
pub mod host;
pub mod lines;
pub mod machine;
pub mod shifter;
pub mod timing;
pub mod transaction;

pub use config::{BitOrder, Config, SpiMode};
pub use error::{ConfigFault, Error, Result};
pub use host::{PendingHandle, SpiHost};
pub use lines::BusLines;
pub use machine::{Controller, PinInputs, PinOutputs, State};
pub use transaction::{Direction, TransactionRequest, TransactionResult};
