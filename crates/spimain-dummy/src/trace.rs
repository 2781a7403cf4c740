//! Per-cycle bus trace
//!
//! A [`Trace`] keeps one [`TraceEntry`] per host cycle. With the `std`
//! feature it can be dumped as a Value Change Dump for a waveform viewer.

use alloc::vec::Vec;

use spimain_core::timing::{Edge, EdgeRole, EdgeTable};
use spimain_core::{BusLines, SpiMode, State};

/// Bus levels after one host cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// Host cycle number
    pub cycle: u64,
    /// Controller state after the cycle
    pub state: State,
    /// Wire levels after the cycle
    pub lines: BusLines,
    /// Completion pulse
    pub done: bool,
}

/// Recorded bus activity
#[derive(Debug, Clone, Default)]
pub struct Trace {
    clk_period_ns: u32,
    entries: Vec<TraceEntry>,
}

impl Trace {
    /// Create an empty trace; `clk_period_ns` is the host clock period
    pub fn new(clk_period_ns: u32) -> Self {
        Self {
            clk_period_ns,
            entries: Vec::new(),
        }
    }

    /// Append one cycle
    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    /// All recorded cycles
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Number of recorded cycles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// MOSI level at every sample edge seen while chip select was asserted
    ///
    /// For a well-formed transaction this is exactly the frame the
    /// subordinate receives: direction bit, address field, data field.
    pub fn sampled_mosi(&self, mode: SpiMode) -> Vec<bool> {
        let table = EdgeTable::new(mode);
        self.entries
            .windows(2)
            .filter(|pair| pair[1].lines.selected() && pair[0].lines.sclk() != pair[1].lines.sclk())
            .filter(|pair| table.classify(Edge::towards(pair[1].lines.sclk())) == EdgeRole::Sample)
            .map(|pair| pair[1].lines.mosi())
            .collect()
    }

    /// Write the trace as a Value Change Dump
    ///
    /// Only changed signals are emitted per timestep.
    #[cfg(feature = "std")]
    pub fn write_vcd<W: std::io::Write>(&self, mut out: W) -> std::io::Result<()> {
        const SIGNALS: [(char, &str); 5] = [
            ('!', "cs"),
            ('"', "sclk"),
            ('#', "mosi"),
            ('$', "miso"),
            ('%', "done"),
        ];

        writeln!(out, "$timescale {}ns $end", self.clk_period_ns.max(1))?;
        writeln!(out, "$scope module spimain $end")?;
        for (id, name) in SIGNALS {
            writeln!(out, "$var wire 1 {} {} $end", id, name)?;
        }
        writeln!(out, "$upscope $end")?;
        writeln!(out, "$enddefinitions $end")?;

        let mut prev: Option<[bool; 5]> = None;
        for entry in &self.entries {
            let levels = [
                entry.lines.contains(BusLines::CS),
                entry.lines.sclk(),
                entry.lines.mosi(),
                entry.lines.miso(),
                entry.done,
            ];
            if prev == Some(levels) {
                continue;
            }
            writeln!(out, "#{}", entry.cycle)?;
            for (i, (id, _)) in SIGNALS.iter().enumerate() {
                if prev.map_or(true, |p| p[i] != levels[i]) {
                    writeln!(out, "{}{}", u8::from(levels[i]), id)?;
                }
            }
            prev = Some(levels);
        }
        if let Some(last) = self.entries.last() {
            writeln!(out, "#{}", last.cycle + 1)?;
        }
        Ok(())
    }
}
