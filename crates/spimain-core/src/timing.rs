//! Serial clock edge classification
//!
//! Every serial-clock period has one shift edge, on which the main changes
//! MOSI, and one sample edge, on which MISO/MOSI are captured. Which of the
//! rising and falling edges plays which role depends only on CPOL and CPHA:
//!
//! | mode | idle | leading | sample  | shift   |
//! |------|------|---------|---------|---------|
//! | 0    | low  | rising  | falling | rising  |
//! | 1    | low  | rising  | rising  | falling |
//! | 2    | high | falling | rising  | falling |
//! | 3    | high | falling | falling | rising  |
//!
//! The rest of the crate asks an [`EdgeTable`] rather than branching on the
//! mode itself.

use crate::config::SpiMode;

/// A transition of the serial clock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Low to high
    Rising,
    /// High to low
    Falling,
}

impl Edge {
    /// The edge produced by driving the clock to `level`
    pub const fn towards(level: bool) -> Self {
        if level {
            Self::Rising
        } else {
            Self::Falling
        }
    }

    /// The other edge
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Rising => Self::Falling,
            Self::Falling => Self::Rising,
        }
    }
}

/// What happens on a given edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeRole {
    /// The transmitter changes its data line
    Shift,
    /// The receiver captures its data line
    Sample,
}

/// Edge classification for one SPI mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeTable {
    idle_level: bool,
    sample: Edge,
}

impl EdgeTable {
    /// Build the table for a mode
    pub const fn new(mode: SpiMode) -> Self {
        let sample_on_rising = mode.cpol() ^ mode.cpha();
        Self {
            idle_level: mode.cpol(),
            sample: Edge::towards(sample_on_rising),
        }
    }

    /// Serial clock level between frames
    pub const fn idle_level(&self) -> bool {
        self.idle_level
    }

    /// Edge on which data is captured
    pub const fn sample_edge(&self) -> Edge {
        self.sample
    }

    /// Edge on which data is changed
    pub const fn shift_edge(&self) -> Edge {
        self.sample.opposite()
    }

    /// First edge of each period, leaving the idle level
    pub const fn leading_edge(&self) -> Edge {
        Edge::towards(!self.idle_level)
    }

    /// Role of an edge
    pub fn classify(&self, edge: Edge) -> EdgeRole {
        if edge == self.sample {
            EdgeRole::Sample
        } else {
            EdgeRole::Shift
        }
    }

    /// Role of the edge caused by driving the clock from `from` to `!from`
    pub fn classify_toggle(&self, from: bool) -> EdgeRole {
        self.classify(Edge::towards(!from))
    }

    /// Returns true if the first bit must be on the wire before the first edge
    ///
    /// This is the case when the leading edge is a sample edge.
    pub fn predrive_first_bit(&self) -> bool {
        self.classify(self.leading_edge()) == EdgeRole::Sample
    }
}

impl From<SpiMode> for EdgeTable {
    fn from(mode: SpiMode) -> Self {
        Self::new(mode)
    }
}
