//! CLI command implementations
//!
//! Every command builds a [`Testbench`](spimain_dummy::Testbench) from the
//! effective configuration, so the controller always talks to an emulated
//! register-file subordinate.

pub mod register;
pub mod soak;
pub mod trace;

use spimain_core::timing::{Edge, EdgeRole, EdgeTable};
use spimain_core::Config;

/// Failures detected by the commands themselves
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A register did not read back what was written
    #[error("read back 0x{read:X} from 0x{address:X}, expected 0x{expected:X}")]
    Readback { address: u32, expected: u32, read: u32 },

    /// The soak campaign found disagreements with the shadow model
    #[error("{failures} of {count} transactions disagreed with the shadow model")]
    Soak { failures: u32, count: u32 },

    /// The subordinate saw a different frame than the one requested
    #[error("subordinate received {received} bits, expected {expected}")]
    FrameLength { expected: u32, received: usize },
}

fn edge_name(rising: bool) -> &'static str {
    if rising {
        "rising"
    } else {
        "falling"
    }
}

/// Print the edge assignment of the configured mode
pub fn print_edges(config: &Config) {
    let table = EdgeTable::new(config.spi_mode);
    let mode = config.spi_mode;

    println!(
        "SPI mode {} (CPOL={}, CPHA={})",
        mode.number(),
        u8::from(mode.cpol()),
        u8::from(mode.cpha())
    );
    println!("  Idle clock:     {}", if table.idle_level() { "high" } else { "low" });
    println!("  Leading edge:   {}", edge_name(!table.idle_level()));
    for rising in [true, false] {
        let role = match table.classify(Edge::towards(rising)) {
            EdgeRole::Shift => "shift (MOSI changes)",
            EdgeRole::Sample => "sample (MISO captured)",
        };
        println!("  {:<15} {}", format!("{} edge:", edge_name(rising)), role);
    }
    if table.predrive_first_bit() {
        println!("  First bit is driven before the leading edge");
    }
    println!(
        "  Frame:          1 + {} + {} bits, {} first",
        config.address_width,
        config.data_width,
        if config.bit_order.is_msb_first() { "MSB" } else { "LSB" }
    );
    println!("  Host cycles:    {} per transaction", config.transaction_cycles());
}

/// Print the effective configuration as TOML
pub fn print_config(config: &Config) {
    print!("{}", config.to_toml_string());
}
