//! Transaction state machine
//!
//! [`Controller::tick`] advances the machine by one host-clock rising edge.
//! Inputs are sampled on that edge and the returned [`PinOutputs`] are the
//! registered outputs until the next tick.
//!
//! A frame on the wire looks like this (mode 0, MSB first):
//!
//! ```text
//!          SELECT   DIRECTION  ADDRESS ...  DATA ...   DESELECT COOLDOWN
//! cs   ‾‾‾\_______________________________________________________/‾‾‾‾‾‾‾‾
//! sclk _________/‾‾\__/‾‾\__ ... /‾‾\__ ... /‾‾\________________________
//! mosi ---------< dir >< a[n-1] > ... < d[m-1] > ...
//! ```
//!
//! Chip select is asserted on the accepting tick and held for one full
//! serial-clock period before the direction bit goes out. Each bit then
//! takes one serial-clock period: it is shifted on the shift edge and
//! captured on the sample edge, as classified by [`EdgeTable`]. After the
//! last sample the clock returns to idle, chip select is held for one more
//! half-period, released, and the machine cools down before accepting the
//! next request.
//!
//! Reset overrides everything: a tick with `rst` high drops any in-flight
//! frame without signalling completion.

use crate::config::{BitOrder, Config, SpiMode};
use crate::error::{Error, Result};
use crate::lines::BusLines;
use crate::shifter::BitShifter;
use crate::timing::{EdgeRole, EdgeTable};
use crate::transaction::{Direction, TransactionRequest, TransactionResult};

/// Half-periods chip select is held with the clock idle before the frame
const SETUP_HALF_PERIODS: u8 = 2;

/// Controller states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for a request
    #[default]
    Idle,
    /// Reset asserted
    ResetHold,
    /// Chip select asserted, clock idle
    Select,
    /// Direction bit on the wire
    Direction,
    /// Address field on the wire
    Address,
    /// Data field on the wire
    Data,
    /// Clock idle, chip select still asserted
    Deselect,
    /// Chip select released, waiting out the cooldown
    Cooldown,
}

impl State {
    /// Returns true while chip select is asserted
    pub fn is_selected(&self) -> bool {
        matches!(
            self,
            Self::Select | Self::Direction | Self::Address | Self::Data | Self::Deselect
        )
    }

    /// Short label for traces
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::ResetHold => "RESET",
            Self::Select => "SELECT",
            Self::Direction => "DIR",
            Self::Address => "ADDR",
            Self::Data => "DATA",
            Self::Deselect => "DESELECT",
            Self::Cooldown => "COOLDOWN",
        }
    }
}

/// Levels on the controller's input pins for one host cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PinInputs {
    /// Synchronous reset, active high
    pub rst: bool,
    /// Transaction enable
    pub en: bool,
    /// Transfer direction (`mode` pin: 0 = read, 1 = write)
    pub mode: Direction,
    /// SPI mode select
    pub spi_mode: SpiMode,
    /// Bit order select
    pub msb_first: bool,
    /// Target register address
    pub rw_addr: u32,
    /// Write payload
    pub write_data: u32,
    /// Qualifies `write_data`
    pub write_valid: bool,
    /// Data from the subordinate
    pub miso: bool,
}

impl PinInputs {
    /// Inputs presenting `request` with `en` asserted
    pub fn for_request(request: &TransactionRequest, config: &Config) -> Self {
        Self {
            rst: false,
            en: true,
            mode: request.direction,
            spi_mode: config.spi_mode,
            msb_first: config.bit_order.is_msb_first(),
            rw_addr: request.address,
            write_data: request.write_data,
            write_valid: request.direction == Direction::Write,
            miso: false,
        }
    }

    /// The request presented on the pins, if any
    ///
    /// A write is only present once `write_valid` qualifies the payload.
    pub fn request(&self) -> Option<TransactionRequest> {
        if !self.en || (self.mode == Direction::Write && !self.write_valid) {
            return None;
        }
        Some(TransactionRequest {
            direction: self.mode,
            address: self.rw_addr,
            write_data: self.write_data,
        })
    }
}

/// Registered output levels after a tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PinOutputs {
    /// Chip select, active low
    pub cs: bool,
    /// Serial clock
    pub sclk: bool,
    /// Data to the subordinate
    pub mosi: bool,
    /// Last captured read payload
    pub read_data: u32,
    /// High for exactly one cycle when a frame completes
    pub done: bool,
}

impl PinOutputs {
    /// Snapshot of the bus, combined with the subordinate's MISO level
    pub fn lines(&self, miso: bool) -> BusLines {
        BusLines::from_levels(self.cs, self.sclk, self.mosi, miso)
    }
}

/// An in-flight frame
#[derive(Clone, Copy, Debug)]
struct Frame {
    request: TransactionRequest,
    timing: EdgeTable,
    order: BitOrder,
    tx: BitShifter,
    tx_field: State,
    rx: BitShifter,
    shifted: u32,
    sampled: u32,
}

impl Frame {
    fn new(request: TransactionRequest, timing: EdgeTable, order: BitOrder, config: &Config) -> Self {
        Self {
            request,
            timing,
            order,
            tx: BitShifter::transmit(request.direction.bit() as u32, 1, order),
            tx_field: State::Direction,
            rx: BitShifter::receive(config.data_width, order),
            shifted: 0,
            sampled: 0,
        }
    }

    /// Next bit to drive, loading the following field when one runs out
    fn next_tx_bit(&mut self, config: &Config) -> Option<(State, bool)> {
        if self.shifted >= config.frame_bits() {
            return None;
        }
        if self.tx.is_complete() {
            match self.tx_field {
                State::Direction => {
                    self.tx = BitShifter::transmit(self.request.address, config.address_width, self.order);
                    self.tx_field = State::Address;
                }
                State::Address => {
                    // Reads keep MOSI low during the data field
                    self.tx = BitShifter::transmit(self.request.write_data, config.data_width, self.order);
                    self.tx_field = State::Data;
                }
                _ => return None,
            }
        }
        let bit = self.tx.shift_out()?;
        self.shifted += 1;
        Some((self.tx_field, bit))
    }

    /// Capture a bit; returns true when the last bit of the frame was sampled
    fn sample(&mut self, config: &Config, miso: bool) -> bool {
        let in_data_field = self.sampled > config.address_width as u32;
        if in_data_field && self.request.is_read() {
            self.rx.sample_in(miso);
        }
        self.sampled += 1;
        self.is_complete(config)
    }

    fn is_complete(&self, config: &Config) -> bool {
        self.sampled >= config.frame_bits()
    }

    fn result(&self) -> TransactionResult {
        TransactionResult {
            request: self.request,
            read_data: self.request.is_read().then(|| self.rx.value()),
        }
    }
}

/// Cycle-accurate SPI main controller
#[derive(Clone, Debug)]
pub struct Controller {
    config: Config,
    state: State,
    frame: Option<Frame>,
    half_period_ticks: u32,
    setup_half_periods: u8,
    cooldown_elapsed: u32,
    cs: bool,
    sclk: bool,
    mosi: bool,
    read_data: u32,
    done: bool,
    completed: Option<TransactionResult>,
}

impl Controller {
    /// Build a controller; the configuration is validated first
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: State::Idle,
            frame: None,
            half_period_ticks: 0,
            setup_half_periods: 0,
            cooldown_elapsed: 0,
            cs: true,
            sclk: config.spi_mode.cpol(),
            mosi: false,
            read_data: 0,
            done: false,
            completed: None,
        })
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the configuration
    ///
    /// Only allowed between transactions (in `Idle` or `ResetHold`).
    pub fn reconfigure(&mut self, config: Config) -> Result<()> {
        if !matches!(self.state, State::Idle | State::ResetHold) {
            return Err(Error::Busy);
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns true when a new request would be accepted on the next tick
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Current registered outputs
    pub fn outputs(&self) -> PinOutputs {
        PinOutputs {
            cs: self.cs,
            sclk: self.sclk,
            mosi: self.mosi,
            read_data: self.read_data,
            done: self.done,
        }
    }

    /// Edge table of the in-flight frame, if any
    pub fn timing(&self) -> Option<EdgeTable> {
        self.frame.as_ref().map(|f| f.timing)
    }

    /// Take the result of the most recently completed frame
    pub fn take_completed(&mut self) -> Option<TransactionResult> {
        self.completed.take()
    }

    /// Advance by one host-clock cycle
    pub fn tick(&mut self, inputs: &PinInputs) -> PinOutputs {
        self.done = false;

        if inputs.rst {
            self.hold_reset(inputs.spi_mode);
            return self.outputs();
        }

        match self.state {
            State::ResetHold => {
                log::debug!("reset released");
                self.state = State::Idle;
                self.sclk = inputs.spi_mode.cpol();
            }
            State::Idle => {
                self.sclk = inputs.spi_mode.cpol();
                if let Some(request) = inputs.request() {
                    self.begin(request, inputs);
                }
            }
            State::Select => {
                if self.half_period_elapsed() {
                    self.setup_half_periods += 1;
                    if self.setup_half_periods >= SETUP_HALF_PERIODS {
                        self.start_frame();
                    }
                }
            }
            State::Direction | State::Address | State::Data => {
                if self.half_period_elapsed() {
                    self.clock_edge(inputs.miso);
                }
            }
            State::Deselect => {
                if self.half_period_elapsed() {
                    self.cs = true;
                    self.mosi = false;
                    self.frame = None;
                    self.cooldown_elapsed = 0;
                    self.state = State::Cooldown;
                    log::trace!("chip select released");
                }
            }
            State::Cooldown => {
                self.cooldown_elapsed = self.cooldown_elapsed.saturating_add(1);
                if self.cooldown_elapsed >= self.config.cooldown_cycles {
                    self.state = State::Idle;
                }
            }
        }

        self.outputs()
    }

    fn hold_reset(&mut self, spi_mode: SpiMode) {
        if self.state.is_selected() {
            if let Some(frame) = &self.frame {
                log::warn!(
                    "reset during {:?}: dropping {:?} of address 0x{:X}",
                    self.state,
                    frame.request.direction,
                    frame.request.address
                );
            }
        }
        self.state = State::ResetHold;
        self.frame = None;
        self.half_period_ticks = 0;
        self.setup_half_periods = 0;
        self.cooldown_elapsed = 0;
        self.cs = true;
        self.sclk = spi_mode.cpol();
        self.mosi = false;
        self.read_data = 0;
        self.completed = None;
    }

    fn begin(&mut self, request: TransactionRequest, inputs: &PinInputs) {
        let request = request.masked(&self.config);
        let timing = EdgeTable::new(inputs.spi_mode);
        let order = BitOrder::from_msb_first(inputs.msb_first);
        log::debug!(
            "{:?} 0x{:X} (mode {}, {:?})",
            request.direction,
            request.address,
            inputs.spi_mode.number(),
            order
        );
        self.frame = Some(Frame::new(request, timing, order, &self.config));
        self.state = State::Select;
        self.cs = false;
        self.sclk = timing.idle_level();
        self.mosi = false;
        self.half_period_ticks = 0;
        self.setup_half_periods = 0;
    }

    fn half_period_elapsed(&mut self) -> bool {
        self.half_period_ticks += 1;
        if self.half_period_ticks >= self.config.clock_divider {
            self.half_period_ticks = 0;
            true
        } else {
            false
        }
    }

    fn start_frame(&mut self) {
        self.state = State::Direction;
        let predrive = self.frame.as_ref().is_some_and(|f| f.timing.predrive_first_bit());
        if predrive {
            self.shift_next();
        }
    }

    fn clock_edge(&mut self, miso: bool) {
        let Some(timing) = self.timing() else {
            return;
        };
        let role = timing.classify_toggle(self.sclk);
        self.sclk = !self.sclk;
        log::trace!("{:?} edge, sclk={}", role, self.sclk as u8);

        match role {
            EdgeRole::Shift => self.shift_next(),
            EdgeRole::Sample => self.sample_next(miso),
        }

        let finished = self
            .frame
            .as_ref()
            .is_some_and(|f| f.is_complete(&self.config));
        if finished && self.sclk == timing.idle_level() {
            self.state = State::Deselect;
        }
    }

    fn shift_next(&mut self) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        if let Some((field, bit)) = frame.next_tx_bit(&self.config) {
            self.state = field;
            self.mosi = bit;
        }
    }

    fn sample_next(&mut self, miso: bool) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        if frame.sample(&self.config, miso) {
            let result = frame.result();
            if let Some(data) = result.read_data {
                self.read_data = data;
            }
            self.done = true;
            self.completed = Some(result);
            log::debug!(
                "{:?} 0x{:X} done{}",
                result.request.direction,
                result.request.address,
                if result.read_data.is_some() { " (data captured)" } else { "" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Edge;
    use std::vec::Vec;

    /// Minimal wire-level peer: serves `read_value` and records sampled MOSI bits
    struct Probe {
        config: Config,
        timing: EdgeTable,
        sclk: bool,
        mosi_bits: Vec<bool>,
        read_value: u32,
    }

    impl Probe {
        fn new(config: Config, read_value: u32) -> Self {
            let timing = EdgeTable::new(config.spi_mode);
            Self {
                config,
                timing,
                sclk: timing.idle_level(),
                mosi_bits: Vec::new(),
                read_value,
            }
        }

        /// Watch the outputs of a tick; returns the MISO level for the next one
        fn observe(&mut self, out: &PinOutputs, miso: bool) -> bool {
            let mut miso = miso;
            if out.sclk != self.sclk && !out.cs {
                match self.timing.classify(Edge::towards(out.sclk)) {
                    EdgeRole::Sample => self.mosi_bits.push(out.mosi),
                    EdgeRole::Shift => {
                        let index = self.mosi_bits.len() as i64 - 1 - self.config.address_width as i64;
                        if index >= 0 && (index as u8) < self.config.data_width {
                            let pos = crate::shifter::bit_position(
                                self.config.data_width,
                                self.config.bit_order,
                                index as u8,
                            );
                            miso = (self.read_value >> pos) & 1 != 0;
                        }
                    }
                }
            }
            self.sclk = out.sclk;
            miso
        }
    }

    fn reset(ctrl: &mut Controller, inputs: &PinInputs) {
        let mut rst = *inputs;
        rst.rst = true;
        ctrl.tick(&rst);
        ctrl.tick(&rst);
        assert_eq!(ctrl.state(), State::ResetHold);
    }

    /// Run one request to completion, returning the probe and the result
    fn run(config: Config, request: TransactionRequest, read_value: u32) -> (Probe, TransactionResult) {
        let mut ctrl = Controller::new(config).unwrap();
        let mut inputs = PinInputs::for_request(&request, &config);
        reset(&mut ctrl, &inputs);
        let mut probe = Probe::new(config, read_value);
        for _ in 0..config.transaction_cycles() + 8 {
            let out = ctrl.tick(&inputs);
            inputs.miso = probe.observe(&out, inputs.miso);
            if out.done {
                inputs.en = false;
                let result = ctrl.take_completed().unwrap();
                return (probe, result);
            }
        }
        panic!("transaction never completed");
    }

    fn field_bits(value: u32, width: u8, order: BitOrder) -> Vec<bool> {
        let mut shifter = BitShifter::transmit(value, width, order);
        core::iter::from_fn(|| shifter.shift_out()).collect()
    }

    #[test]
    fn test_read_mode0_msb_scenario() {
        let config = Config::new(6, 8);
        let (probe, result) = run(config, TransactionRequest::read(0b101010), 0b10101010);
        assert_eq!(
            &probe.mosi_bits[..7],
            &[false, true, false, true, false, true, false]
        );
        assert!(probe.mosi_bits[7..].iter().all(|b| !b));
        assert_eq!(probe.mosi_bits.len(), 15);
        assert_eq!(result.read_data, Some(0b10101010));
    }

    #[test]
    fn test_read_all_modes_and_orders() {
        for mode in SpiMode::ALL {
            for order in [BitOrder::MsbFirst, BitOrder::LsbFirst] {
                let config = Config::new(5, 12).with_spi_mode(mode).with_bit_order(order);
                let (probe, result) = run(config, TransactionRequest::read(0b10011), 0xA5C);
                let mut expected = std::vec![false];
                expected.extend(field_bits(0b10011, 5, order));
                assert_eq!(&probe.mosi_bits[..6], &expected[..], "{:?} {:?}", mode, order);
                assert_eq!(result.read_data, Some(0xA5C), "{:?} {:?}", mode, order);
            }
        }
    }

    #[test]
    fn test_write_frame_bits() {
        for mode in SpiMode::ALL {
            let config = Config::new(6, 8).with_spi_mode(mode);
            let (probe, result) = run(config, TransactionRequest::write(0x3F, 0x81), 0);
            let mut expected = std::vec![true];
            expected.extend(field_bits(0x3F, 6, BitOrder::MsbFirst));
            expected.extend(field_bits(0x81, 8, BitOrder::MsbFirst));
            assert_eq!(probe.mosi_bits, expected, "{:?}", mode);
            assert_eq!(result.read_data, None);
        }
    }

    #[test]
    fn test_write_requires_write_valid() {
        let config = Config::default();
        let mut ctrl = Controller::new(config).unwrap();
        let mut inputs = PinInputs::for_request(&TransactionRequest::write(1, 2), &config);
        inputs.write_valid = false;
        for _ in 0..10 {
            ctrl.tick(&inputs);
            assert_eq!(ctrl.state(), State::Idle);
        }
        inputs.write_valid = true;
        ctrl.tick(&inputs);
        assert_eq!(ctrl.state(), State::Select);
    }

    #[test]
    fn test_reset_mid_address_discards_frame() {
        let config = Config::new(6, 8);
        let mut ctrl = Controller::new(config).unwrap();
        let mut inputs = PinInputs::for_request(&TransactionRequest::read(0b101010), &config);

        while ctrl.state() != State::Address {
            assert!(!ctrl.tick(&inputs).done);
        }
        inputs.rst = true;
        for _ in 0..2 {
            let out = ctrl.tick(&inputs);
            assert!(out.cs);
            assert!(!out.done);
            assert_eq!(ctrl.state(), State::ResetHold);
        }
        inputs.rst = false;
        inputs.en = false;
        let out = ctrl.tick(&inputs);
        assert_eq!(ctrl.state(), State::Idle);
        assert!(out.cs);
        assert!(ctrl.take_completed().is_none());
        for _ in 0..50 {
            assert!(!ctrl.tick(&inputs).done);
        }
    }

    #[test]
    fn test_chip_select_framing_and_cooldown() {
        let config = Config::new(4, 4).with_cooldown(6);
        let mut ctrl = Controller::new(config).unwrap();
        let inputs = PinInputs::for_request(&TransactionRequest::read(3), &config);

        let mut cs_trace = std::vec![ctrl.tick(&PinInputs::default()).cs];
        for _ in 0..3 * config.transaction_cycles() {
            cs_trace.push(ctrl.tick(&inputs).cs);
        }
        // Continuous enable produces back-to-back frames
        let falls: Vec<usize> = (1..cs_trace.len())
            .filter(|&i| cs_trace[i - 1] && !cs_trace[i])
            .collect();
        let rises: Vec<usize> = (1..cs_trace.len())
            .filter(|&i| !cs_trace[i - 1] && cs_trace[i])
            .collect();
        assert!(falls.len() >= 2);
        // Chip select low for the whole frame: setup + 2 per bit + hold
        let low = rises[0] - falls[0];
        assert_eq!(low as u32, 2 + 2 * config.frame_bits() + 1);
        // Gap between frames covers the cooldown
        let gap = falls[1] - rises[0];
        assert!(gap as u32 > config.cooldown_cycles);
        assert_eq!((falls[1] - falls[0]) as u64, config.transaction_cycles());
    }

    #[test]
    fn test_zero_cooldown() {
        let config = Config::new(2, 2).with_cooldown(0);
        let mut ctrl = Controller::new(config).unwrap();
        let inputs = PinInputs::for_request(&TransactionRequest::read(1), &config);
        ctrl.tick(&inputs);
        while ctrl.state() != State::Cooldown {
            ctrl.tick(&inputs);
        }
        ctrl.tick(&inputs);
        assert_eq!(ctrl.state(), State::Idle);
    }

    #[test]
    fn test_clock_divider_stretches_half_periods() {
        let config = Config::new(3, 3).with_clock_divider(3);
        let mut ctrl = Controller::new(config).unwrap();
        let inputs = PinInputs::for_request(&TransactionRequest::read(5), &config);
        let mut sclk = Vec::new();
        while sclk.len() < config.transaction_cycles() as usize {
            sclk.push(ctrl.tick(&inputs).sclk);
        }
        let toggles: Vec<usize> = (1..sclk.len()).filter(|&i| sclk[i] != sclk[i - 1]).collect();
        assert_eq!(toggles.len() as u32, 2 * config.frame_bits());
        assert!(toggles.windows(2).all(|w| w[1] - w[0] == 3));
    }

    #[test]
    fn test_done_pulses_once() {
        let config = Config::new(3, 3);
        let mut ctrl = Controller::new(config).unwrap();
        let mut inputs = PinInputs::for_request(&TransactionRequest::write(1, 6), &config);
        let mut pulses = 0;
        for _ in 0..config.transaction_cycles() + 2 {
            let out = ctrl.tick(&inputs);
            if out.done {
                pulses += 1;
                inputs.en = false;
                assert!(!out.cs);
            }
        }
        assert_eq!(pulses, 1);
        assert!(ctrl.is_idle());
    }

    #[test]
    fn test_reconfigure_only_when_idle() {
        let config = Config::default();
        let mut ctrl = Controller::new(config).unwrap();
        ctrl.tick(&PinInputs::for_request(&TransactionRequest::read(0), &config));
        assert_eq!(ctrl.reconfigure(Config::new(8, 8)), Err(Error::Busy));

        let mut idle = Controller::new(config).unwrap();
        assert!(idle.reconfigure(Config::new(8, 16)).is_ok());
        assert!(idle.reconfigure(Config::new(0, 16)).is_err());
        assert_eq!(idle.config().data_width, 16);
    }

    #[test]
    fn test_idle_clock_follows_cpol_input() {
        let config = Config::default();
        let mut ctrl = Controller::new(config).unwrap();
        let inputs = PinInputs {
            spi_mode: SpiMode::Mode2,
            ..Default::default()
        };
        assert!(ctrl.tick(&inputs).sclk);
        let inputs = PinInputs {
            spi_mode: SpiMode::Mode1,
            ..Default::default()
        };
        assert!(!ctrl.tick(&inputs).sclk);
    }
}
