//! Bitbang GPIO adapter
//!
//! This module lets the controller drive a bus made of software-controlled
//! GPIO pins. Examples include:
//! - Linux GPIO character devices
//! - Raspberry Pi direct GPIO access
//! - Microcontroller GPIO ports
//! - An emulated subordinate wired up in memory (see `spimain-dummy`)
//!
//! ## Architecture
//!
//! 1. **BitbangSpiMaster** exposes the four SPI wires plus a delay
//! 2. **transact()** runs one request through a [`SpiHost`], calling
//!    `half_period_delay` once per host cycle, mirroring every output change
//!    onto the pins and feeding `get_miso()` back into the controller
//!
//! Pins are only written when their level changes, so a slow GPIO backend
//! sees exactly one call per wire transition.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::SpiHost;
use crate::machine::PinOutputs;
use crate::transaction::{TransactionRequest, TransactionResult};

/// Extra host cycles allowed beyond the computed frame length
const CYCLE_SLACK: u64 = 8;

/// Trait for low-level bitbang SPI operations
pub trait BitbangSpiMaster {
    /// Set chip select (CS is active low, so `active=true` means CS=0)
    fn set_cs(&mut self, active: bool);

    /// Set clock line value
    fn set_sck(&mut self, high: bool);

    /// Set MOSI line value
    fn set_mosi(&mut self, high: bool);

    /// Get MISO line value
    fn get_miso(&self) -> bool;

    /// Delay for one host-clock cycle
    ///
    /// The controller toggles the serial clock at most once per host cycle,
    /// so this is at most half a serial-clock period.
    fn half_period_delay(&self);

    /// Optional: Request exclusive bus access
    fn request_bus(&mut self) {}

    /// Optional: Release bus access
    fn release_bus(&mut self) {}
}

/// Mirror output changes onto the pins
///
/// Chip select is written first when asserting and last when releasing, and
/// data before the clock, so a subordinate never sees a clock edge with stale
/// data.
fn apply<M: BitbangSpiMaster + ?Sized>(bus: &mut M, prev: &PinOutputs, out: &PinOutputs) {
    if prev.cs && !out.cs {
        bus.set_cs(true);
    }
    if prev.mosi != out.mosi {
        bus.set_mosi(out.mosi);
    }
    if prev.sclk != out.sclk {
        bus.set_sck(out.sclk);
    }
    if !prev.cs && out.cs {
        bus.set_cs(false);
    }
}

/// Bring the pins to the controller's current output levels
pub fn sync_pins<M: BitbangSpiMaster + ?Sized>(bus: &mut M, host: &SpiHost) {
    let out = host.outputs();
    bus.set_cs(!out.cs);
    bus.set_sck(out.sclk);
    bus.set_mosi(out.mosi);
}

/// Run one transaction over GPIO pins
///
/// Returns once the controller is idle again, so the next call can submit
/// immediately.
pub fn transact<M: BitbangSpiMaster + ?Sized>(
    bus: &mut M,
    host: &mut SpiHost,
    request: TransactionRequest,
    config: Config,
) -> Result<TransactionResult> {
    let handle = host.submit(request, config)?;
    let limit = config.transaction_cycles() + CYCLE_SLACK;

    bus.request_bus();
    let mut prev = host.outputs();
    let mut result = None;
    let mut cycles = 0u64;

    while result.is_none() || !host.is_idle() {
        if cycles >= limit {
            bus.release_bus();
            log::error!(
                "bitbang: transaction #{} stuck in {:?} after {} cycles",
                handle.id(),
                host.state(),
                cycles
            );
            return Err(Error::Timeout);
        }
        let out = host.tick(bus.get_miso());
        apply(bus, &prev, &out);
        bus.half_period_delay();
        prev = out;
        cycles += 1;

        if result.is_none() {
            result = host.poll_handle(handle);
        }
    }
    bus.release_bus();

    log::trace!("bitbang: transaction #{} took {} cycles", handle.id(), cycles);
    result.ok_or(Error::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::State;
    use std::cell::Cell;
    use std::vec::Vec;

    /// Records every pin write; MISO is a fixed level
    #[derive(Default)]
    struct RecordingPins {
        writes: Vec<(&'static str, bool)>,
        miso: bool,
        delays: Cell<u64>,
        requested: bool,
        released: bool,
    }

    impl BitbangSpiMaster for RecordingPins {
        fn set_cs(&mut self, active: bool) {
            self.writes.push(("cs", active));
        }
        fn set_sck(&mut self, high: bool) {
            self.writes.push(("sck", high));
        }
        fn set_mosi(&mut self, high: bool) {
            self.writes.push(("mosi", high));
        }
        fn get_miso(&self) -> bool {
            self.miso
        }
        fn half_period_delay(&self) {
            self.delays.set(self.delays.get() + 1);
        }
        fn request_bus(&mut self) {
            self.requested = true;
        }
        fn release_bus(&mut self) {
            self.released = true;
        }
    }

    #[test]
    fn test_transact_read_all_ones() {
        let config = Config::new(4, 8).with_cooldown(2);
        let mut host = SpiHost::new(config).unwrap();
        let mut pins = RecordingPins {
            miso: true,
            ..Default::default()
        };

        let result = transact(&mut pins, &mut host, TransactionRequest::read(0x9), config).unwrap();
        assert_eq!(result.read_data, Some(0xFF));
        assert_eq!(host.state(), State::Idle);
        assert_eq!(pins.delays.get(), config.transaction_cycles());
        assert!(pins.requested && pins.released);

        // One assert, one release, and every clock write is a real transition
        let cs: Vec<bool> = pins.writes.iter().filter(|w| w.0 == "cs").map(|w| w.1).collect();
        assert_eq!(cs, [true, false]);
        let sck = pins.writes.iter().filter(|w| w.0 == "sck").count();
        assert_eq!(sck as u32, 2 * config.frame_bits());
    }

    #[test]
    fn test_transact_back_to_back() {
        let config = Config::default();
        let mut host = SpiHost::new(config).unwrap();
        let mut pins = RecordingPins::default();
        sync_pins(&mut pins, &host);
        for addr in 0..4 {
            let result =
                transact(&mut pins, &mut host, TransactionRequest::write(addr, addr * 3), config)
                    .unwrap();
            assert_eq!(result.request.write_data, addr * 3);
            assert_eq!(result.read_data, None);
        }
    }

    #[test]
    fn test_transact_busy_host() {
        let config = Config::default();
        let mut host = SpiHost::new(config).unwrap();
        host.submit(TransactionRequest::read(0), config).unwrap();
        let mut pins = RecordingPins::default();
        assert_eq!(
            transact(&mut pins, &mut host, TransactionRequest::read(1), config),
            Err(Error::Busy)
        );
    }
}
