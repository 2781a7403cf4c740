//! Bus line snapshots

use bitflags::bitflags;

bitflags! {
    /// Levels of the four SPI wires at one host cycle
    ///
    /// A set flag means the line is high. Chip select is active low, so an
    /// asserted chip select shows up as `CS` being clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BusLines: u8 {
        /// Chip select (active low)
        const CS   = 1 << 0;
        /// Serial clock
        const SCLK = 1 << 1;
        /// Main out, subordinate in
        const MOSI = 1 << 2;
        /// Main in, subordinate out
        const MISO = 1 << 3;
    }
}

impl BusLines {
    /// Build a snapshot from individual levels
    pub fn from_levels(cs: bool, sclk: bool, mosi: bool, miso: bool) -> Self {
        let mut lines = BusLines::empty();
        lines.set(BusLines::CS, cs);
        lines.set(BusLines::SCLK, sclk);
        lines.set(BusLines::MOSI, mosi);
        lines.set(BusLines::MISO, miso);
        lines
    }

    /// Returns true while a subordinate is selected
    pub fn selected(&self) -> bool {
        !self.contains(BusLines::CS)
    }

    /// Serial clock level
    pub fn sclk(&self) -> bool {
        self.contains(BusLines::SCLK)
    }

    /// MOSI level
    pub fn mosi(&self) -> bool {
        self.contains(BusLines::MOSI)
    }

    /// MISO level
    pub fn miso(&self) -> bool {
        self.contains(BusLines::MISO)
    }
}
