//! Clocked testbench
//!
//! Wires a [`SpiHost`] to a [`DummyRegisters`] and advances both one host
//! cycle at a time. Each cycle the subordinate's MISO level feeds the
//! controller, and the controller's outputs are then shown to the
//! subordinate.

use spimain_core::error::{Error, Result};
use spimain_core::host::RESET_CYCLES;
use spimain_core::{Config, PinOutputs, SpiHost, TransactionRequest, TransactionResult};

use crate::trace::{Trace, TraceEntry};
use crate::DummyRegisters;

/// Extra host cycles allowed beyond the computed frame length
const CYCLE_SLACK: u64 = 8;

/// A controller and an emulated subordinate sharing one clock
pub struct Testbench {
    host: SpiHost,
    device: DummyRegisters,
    trace: Option<Trace>,
    cycle: u64,
}

impl Testbench {
    /// Build a testbench; the subordinate uses the same configuration
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            host: SpiHost::new(config)?,
            device: DummyRegisters::new(config),
            trace: None,
            cycle: 0,
        })
    }

    /// Build a testbench around an existing subordinate
    pub fn with_device(config: Config, device: DummyRegisters) -> Result<Self> {
        Ok(Self {
            host: SpiHost::new(config)?,
            device,
            trace: None,
            cycle: 0,
        })
    }

    /// Start recording a trace of every host cycle
    pub fn record(mut self) -> Self {
        self.trace = Some(Trace::new(self.host.config().clk_period_ns));
        self
    }

    /// The recorded trace, if recording
    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    /// Stop recording and hand over the trace
    pub fn take_trace(&mut self) -> Option<Trace> {
        self.trace.take()
    }

    /// The controller front end
    pub fn host(&self) -> &SpiHost {
        &self.host
    }

    /// Mutable access to the controller front end
    pub fn host_mut(&mut self) -> &mut SpiHost {
        &mut self.host
    }

    /// The emulated subordinate
    pub fn device(&self) -> &DummyRegisters {
        &self.device
    }

    /// Mutable access to the emulated subordinate
    pub fn device_mut(&mut self) -> &mut DummyRegisters {
        &mut self.device
    }

    /// Host cycles elapsed
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Advance one host cycle
    pub fn tick(&mut self) -> PinOutputs {
        let out = self.host.tick(self.device.miso());
        self.device.observe(out.lines(self.device.miso()));
        self.record_cycle(&out);
        out
    }

    /// Advance `cycles` host cycles
    pub fn run_cycles(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    /// Tick until the controller is idle with nothing pending
    pub fn run_until_idle(&mut self) -> Result<()> {
        let limit = self.host.config().transaction_cycles() + CYCLE_SLACK;
        for _ in 0..limit {
            if self.host.is_idle() {
                return Ok(());
            }
            self.tick();
        }
        if self.host.is_idle() {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    /// Assert reset for the host's reset period, then release it
    pub fn reset(&mut self) {
        self.reset_for(RESET_CYCLES);
    }

    /// Assert reset for `cycles` host cycles (at least one), then release it
    ///
    /// The controller is `Idle` afterwards.
    pub fn reset_for(&mut self, cycles: u32) {
        for _ in 0..cycles.max(1) {
            let out = self.host.hold_reset();
            self.device.observe(out.lines(self.device.miso()));
            self.record_cycle(&out);
        }
        self.tick();
    }

    /// Run a request to completion and wait for the bus to go idle
    pub fn transact(&mut self, request: TransactionRequest) -> Result<TransactionResult> {
        let config = *self.host.config();
        let handle = self.host.submit(request, config)?;
        let limit = config.transaction_cycles() + CYCLE_SLACK;

        let mut result = None;
        for _ in 0..limit {
            if result.is_some() && self.host.is_idle() {
                break;
            }
            self.tick();
            if result.is_none() {
                result = self.host.poll_handle(handle);
            }
        }

        match result {
            Some(result) if self.host.is_idle() => Ok(result),
            _ => {
                log::error!("testbench: request stuck in {:?}", self.host.state());
                Err(Error::Timeout)
            }
        }
    }

    /// Read a register over the bus
    pub fn read(&mut self, address: u32) -> Result<u32> {
        let result = self.transact(TransactionRequest::read(address))?;
        Ok(result.read_data.unwrap_or_default())
    }

    /// Write a register over the bus
    pub fn write(&mut self, address: u32, data: u32) -> Result<()> {
        self.transact(TransactionRequest::write(address, data))?;
        Ok(())
    }

    fn record_cycle(&mut self, out: &PinOutputs) {
        let state = self.host.state();
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEntry {
                cycle: self.cycle,
                state,
                lines: out.lines(self.device.miso()),
                done: out.done,
            });
        }
        self.cycle += 1;
    }
}

impl core::fmt::Debug for Testbench {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Testbench")
            .field("cycle", &self.cycle)
            .field("state", &self.host.state())
            .field("stats", &self.device.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use spimain_core::State;
    use proptest::prelude::*;
    use spimain_core::shifter::BitShifter;
    use spimain_core::{BitOrder, SpiMode};

    fn field_bits(value: u32, width: u8, order: BitOrder) -> Vec<bool> {
        let mut shifter = BitShifter::transmit(value, width, order);
        core::iter::from_fn(|| shifter.shift_out()).collect()
    }

    fn in_frame(state: State) -> bool {
        matches!(state, State::Direction | State::Address | State::Data)
    }

    #[test]
    fn test_read_scenario_mode0() {
        let config = Config::new(6, 8);
        let mut bench = Testbench::new(config).unwrap().record();
        bench.device_mut().set_register(0b101010, 0b10101010);
        bench.reset();

        assert_eq!(bench.read(0b101010).unwrap(), 0b10101010);
        assert_eq!(bench.host().outputs().read_data, 0b10101010);

        let trace = bench.trace().unwrap();
        let bits = trace.sampled_mosi(SpiMode::Mode0);
        assert_eq!(&bits[..7], &[false, true, false, true, false, true, false]);
        assert_eq!(bits.len(), 15);
        assert_eq!(trace.entries().iter().filter(|e| e.done).count(), 1);
    }

    #[test]
    fn test_write_then_read_back() {
        let config = Config::new(8, 32).with_spi_mode(SpiMode::Mode3);
        let mut bench = Testbench::new(config).unwrap();
        bench.write(0x80, 0xDEAD_BEEF).unwrap();
        bench.write(0x81, 0x1234_5678).unwrap();
        assert_eq!(bench.read(0x80).unwrap(), 0xDEAD_BEEF);
        assert_eq!(bench.read(0x81).unwrap(), 0x1234_5678);
        assert_eq!(bench.device().stats().writes, 2);
    }

    #[test]
    fn test_read_right_after_reset() {
        let config = Config::new(6, 8);
        let mut bench = Testbench::new(config).unwrap();
        bench.device_mut().set_register(0b101010, 0x3C);
        bench.reset();
        assert_eq!(bench.host().state(), State::Idle);
        assert_eq!(bench.read(0b101010), Ok(0x3C));
        bench.reset_for(1);
        assert_eq!(bench.read(0b101010), Ok(0x3C));
    }

    #[test]
    fn test_out_of_range_fields_are_masked() {
        let config = Config::new(4, 8);
        let mut bench = Testbench::new(config).unwrap();
        bench.write(0x1F, 0x3CC).unwrap();
        assert_eq!(bench.device().register(0xF), 0xCC);
        assert_eq!(bench.read(0xF).unwrap(), 0xCC);
    }

    #[test]
    fn test_reset_mid_address_never_completes() {
        let config = Config::new(6, 8);
        let mut bench = Testbench::new(config).unwrap().record();
        bench
            .host_mut()
            .submit(TransactionRequest::read(0b101010), config)
            .unwrap();
        while bench.host().state() != State::Address {
            bench.tick();
        }
        bench.reset_for(5);
        assert_eq!(bench.host().state(), State::Idle);
        bench.run_cycles(2 * config.transaction_cycles());
        assert_eq!(bench.host().state(), State::Idle);
        assert!(bench.host_mut().poll().is_none());
        assert!(bench.trace().unwrap().entries().iter().all(|e| !e.done));
        assert_eq!(bench.device().stats().aborted, 1);

        // A fresh request goes through normally afterwards
        bench.device_mut().set_register(0b101010, 0x5A);
        assert_eq!(bench.read(0b101010).unwrap(), 0x5A);
    }

    #[test]
    fn test_submit_while_busy() {
        let config = Config::default();
        let mut bench = Testbench::new(config).unwrap();
        bench.host_mut().submit(TransactionRequest::read(1), config).unwrap();
        bench.tick();
        assert_eq!(bench.read(2), Err(Error::Busy));
        bench.run_until_idle().unwrap();
        assert!(bench.read(2).is_ok());
    }

    fn arb_config() -> impl Strategy<Value = Config> {
        (1u8..=12, 1u8..=32, 0u8..4, any::<bool>(), 0u32..6, 1u32..=3).prop_map(
            |(aw, dw, mode, msb, cooldown, divider)| {
                Config::new(aw, dw)
                    .with_spi_mode(SpiMode::from_bits(mode))
                    .with_bit_order(BitOrder::from_msb_first(msb))
                    .with_cooldown(cooldown)
                    .with_clock_divider(divider)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_read_returns_injected_data(
            config in arb_config(),
            address in any::<u32>(),
            data in any::<u32>(),
        ) {
            let mut bench = Testbench::new(config).unwrap().record();
            let address = address & config.address_mask();
            bench.device_mut().set_register(address, data);

            let value = bench.read(address).unwrap();
            prop_assert_eq!(value, data & config.data_mask());

            let mut expected = std::vec![false];
            expected.extend(field_bits(address, config.address_width, config.bit_order));
            let bits = bench.trace().unwrap().sampled_mosi(config.spi_mode);
            prop_assert_eq!(bits.len() as u32, config.frame_bits());
            prop_assert_eq!(&bits[..expected.len()], &expected[..]);
        }

        #[test]
        fn prop_write_frame_is_dir_addr_data(
            config in arb_config(),
            address in any::<u32>(),
            data in any::<u32>(),
        ) {
            let mut bench = Testbench::new(config).unwrap().record();
            bench.write(address, data).unwrap();

            let mut expected = std::vec![true];
            expected.extend(field_bits(address, config.address_width, config.bit_order));
            expected.extend(field_bits(data, config.data_width, config.bit_order));
            prop_assert_eq!(bench.trace().unwrap().sampled_mosi(config.spi_mode), expected);
            prop_assert_eq!(
                bench.device().register(address),
                data & config.data_mask()
            );
        }

        #[test]
        fn prop_chip_select_framing_and_cooldown(
            config in arb_config(),
            requests in proptest::collection::vec((any::<bool>(), any::<u32>(), any::<u32>()), 1..4),
        ) {
            let mut bench = Testbench::new(config).unwrap().record();
            for (write, address, data) in requests {
                if write {
                    bench.write(address, data).unwrap();
                } else {
                    bench.read(address).unwrap();
                }
            }
            let entries = bench.trace().unwrap().entries();

            // Chip select never toggles while the frame is on the wire
            for pair in entries.windows(2) {
                if in_frame(pair[0].state) && in_frame(pair[1].state) {
                    prop_assert!(pair[1].lines.selected());
                }
            }

            // At least cooldown_cycles with chip select high between frames
            let mut released_at = None;
            for (i, pair) in entries.windows(2).enumerate() {
                let (a, b) = (pair[0].lines.selected(), pair[1].lines.selected());
                if a && !b {
                    released_at = Some(i + 1);
                }
                if !a && b {
                    if let Some(r) = released_at {
                        prop_assert!((i + 1 - r) as u32 >= config.cooldown_cycles);
                    }
                }
            }
        }

        #[test]
        fn prop_reset_anywhere_returns_to_idle(
            config in arb_config(),
            address in any::<u32>(),
            write in any::<bool>(),
            at in 0u64..200,
        ) {
            let mut bench = Testbench::new(config).unwrap().record();
            let request = if write {
                TransactionRequest::write(address, 0xFFFF_FFFF)
            } else {
                TransactionRequest::read(address)
            };
            bench.host_mut().submit(request, config).unwrap();
            let at = at % config.transaction_cycles();
            bench.run_cycles(at);
            let mark = bench.trace().unwrap().len();

            bench.reset();
            prop_assert_eq!(bench.host().state(), State::Idle);
            prop_assert!(bench.host_mut().poll().is_none());
            bench.run_cycles(config.transaction_cycles());

            // Nothing completes from the reset onwards, and the bus stays idle
            let after = &bench.trace().unwrap().entries()[mark..];
            prop_assert!(after.iter().all(|e| !e.done));
            prop_assert!(after.iter().all(|e| !e.lines.selected()));
            prop_assert_eq!(bench.host().state(), State::Idle);
        }
    }
}
