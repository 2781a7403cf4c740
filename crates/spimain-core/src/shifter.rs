//! Bit-serial field shifter
//!
//! A [`BitShifter`] moves one field (direction bit, address or data) across
//! the wire one bit at a time. The same positional mapping is used for
//! transmit and receive, so a field shifted out by one shifter and sampled by
//! another shifter with the same width and bit order reassembles to the same
//! value.

use crate::config::{width_mask, BitOrder};

/// Bit position on the wire for the `index`-th transferred bit of a field
pub const fn bit_position(width: u8, order: BitOrder, index: u8) -> u8 {
    match order {
        BitOrder::MsbFirst => width - 1 - index,
        BitOrder::LsbFirst => index,
    }
}

/// Serializer/deserializer for a single field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitShifter {
    value: u32,
    width: u8,
    order: BitOrder,
    index: u8,
}

impl BitShifter {
    /// Load a field for transmission; bits above `width` are dropped
    pub fn transmit(value: u32, width: u8, order: BitOrder) -> Self {
        Self {
            value: value & width_mask(width),
            width,
            order,
            index: 0,
        }
    }

    /// Prepare an empty field for reception
    pub fn receive(width: u8, order: BitOrder) -> Self {
        Self::transmit(0, width, order)
    }

    /// Emit the next bit, or `None` once all `width` bits have been shifted
    pub fn shift_out(&mut self) -> Option<bool> {
        if self.is_complete() {
            return None;
        }
        let pos = bit_position(self.width, self.order, self.index);
        self.index += 1;
        Some((self.value >> pos) & 1 != 0)
    }

    /// Capture the next bit; returns true when the field is fully assembled
    ///
    /// Bits offered after completion are ignored.
    pub fn sample_in(&mut self, bit: bool) -> bool {
        if !self.is_complete() {
            let pos = bit_position(self.width, self.order, self.index);
            if bit {
                self.value |= 1 << pos;
            } else {
                self.value &= !(1 << pos);
            }
            self.index += 1;
        }
        self.is_complete()
    }

    /// Returns true once `width` bits have been transferred
    pub fn is_complete(&self) -> bool {
        self.index >= self.width
    }

    /// Bits transferred so far
    pub fn transferred(&self) -> u8 {
        self.index
    }

    /// Field width in bits
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Current field value (complete once `is_complete()`)
    pub fn value(&self) -> u32 {
        self.value
    }
}
