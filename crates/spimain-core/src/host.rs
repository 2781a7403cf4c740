//! Host-facing request/response interface
//!
//! [`SpiHost`] wraps a [`Controller`] behind a submit/poll contract. The host
//! owns the clock: every call to [`SpiHost::tick`] is one host cycle, with the
//! subordinate's MISO level as the only bus input.
//!
//! ```ignore
//! let mut host = SpiHost::new(config)?;
//! let handle = host.submit(TransactionRequest::write(0x12, 0xAB), config)?;
//! while host.poll().is_none() {
//!     let out = host.tick(subordinate.miso());
//!     subordinate.observe(out.lines(false));
//! }
//! ```

use crate::config::Config;
use crate::error::{Error, Result};
use crate::machine::{Controller, PinInputs, PinOutputs, State};
use crate::transaction::{TransactionRequest, TransactionResult};

/// Host cycles reset is held by [`SpiHost::reset`]
pub const RESET_CYCLES: u32 = 2;

/// Ticket for a submitted transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingHandle {
    id: u32,
}

impl PendingHandle {
    /// Sequence number of the submission
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Request/response front end for a [`Controller`]
#[derive(Clone, Debug)]
pub struct SpiHost {
    controller: Controller,
    inputs: PinInputs,
    pending: Option<PendingHandle>,
    result: Option<(PendingHandle, TransactionResult)>,
    next_id: u32,
}

impl SpiHost {
    /// Create a host around a fresh controller
    pub fn new(config: Config) -> Result<Self> {
        let controller = Controller::new(config)?;
        let inputs = PinInputs {
            spi_mode: config.spi_mode,
            msb_first: config.bit_order.is_msb_first(),
            ..Default::default()
        };
        Ok(Self {
            controller,
            inputs,
            pending: None,
            result: None,
            next_id: 0,
        })
    }

    /// Submit a request
    ///
    /// Accepted only while the controller is idle and nothing is pending.
    /// The configuration is installed for this and later transactions.
    pub fn submit(&mut self, request: TransactionRequest, config: Config) -> Result<PendingHandle> {
        if self.pending.is_some() || !self.controller.is_idle() {
            return Err(Error::Busy);
        }
        self.controller.reconfigure(config)?;

        let handle = PendingHandle { id: self.next_id };
        self.next_id = self.next_id.wrapping_add(1);
        self.inputs = PinInputs::for_request(&request, &config);
        self.pending = Some(handle);
        self.result = None;
        Ok(handle)
    }

    /// Advance one host cycle
    pub fn tick(&mut self, miso: bool) -> PinOutputs {
        self.inputs.miso = miso;
        let out = self.controller.tick(&self.inputs);
        if out.done {
            if let (Some(handle), Some(result)) = (self.pending.take(), self.controller.take_completed()) {
                self.result = Some((handle, result));
            }
            // Drop enable so the request is not replayed after cooldown
            self.inputs.en = false;
            self.inputs.write_valid = false;
        }
        out
    }

    /// Result of the last submission, once it has completed
    ///
    /// Each result is returned exactly once.
    pub fn poll(&mut self) -> Option<TransactionResult> {
        self.result.take().map(|(_, result)| result)
    }

    /// Like [`poll`](Self::poll) but only for a specific submission
    pub fn poll_handle(&mut self, handle: PendingHandle) -> Option<TransactionResult> {
        match self.result {
            Some((done, _)) if done == handle => self.poll(),
            _ => None,
        }
    }

    /// Assert reset for [`RESET_CYCLES`] host cycles, then release it
    ///
    /// Any pending transaction is dropped without a result. The returned
    /// outputs are those of the release cycle, after which the controller is
    /// `Idle` and a new request can be submitted.
    pub fn reset(&mut self) -> PinOutputs {
        self.reset_for(RESET_CYCLES)
    }

    /// Assert reset for `cycles` host cycles (at least one), then release it
    pub fn reset_for(&mut self, cycles: u32) -> PinOutputs {
        for _ in 0..cycles.max(1) {
            self.hold_reset();
        }
        self.tick(false)
    }

    /// Run one host cycle with reset asserted
    ///
    /// Any pending transaction is dropped without a result. The controller
    /// stays in `ResetHold` until the next [`tick`](Self::tick).
    pub fn hold_reset(&mut self) -> PinOutputs {
        if let Some(handle) = self.pending.take() {
            log::debug!("reset drops pending transaction #{}", handle.id);
        }
        self.result = None;
        self.inputs.en = false;
        self.inputs.write_valid = false;
        self.inputs.rst = true;
        let out = self.controller.tick(&self.inputs);
        self.inputs.rst = false;
        out
    }

    /// Returns true while a submission has not yet produced a result
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns true when a new request can be submitted
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.controller.is_idle()
    }

    /// Controller state
    pub fn state(&self) -> State {
        self.controller.state()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        self.controller.config()
    }

    /// Current registered outputs
    pub fn outputs(&self) -> PinOutputs {
        self.controller.outputs()
    }

    /// Underlying controller
    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}
