//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use spimain_core::{BitOrder, Config, SpiMode};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2).map_err(|e| format!("Invalid binary value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "spimain")]
#[command(author, version, about = "SPI main controller model", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML, `[bus]` table)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub bus: BusArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Bus parameters; each one overrides the configuration file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BusArgs {
    /// Address field width in bits
    #[arg(long, global = true)]
    pub address_width: Option<u8>,

    /// Data field width in bits
    #[arg(long, global = true)]
    pub data_width: Option<u8>,

    /// SPI mode (0-3)
    #[arg(long, global = true)]
    pub mode: Option<u8>,

    /// Shift fields least significant bit first
    #[arg(long, global = true, conflicts_with = "msb_first")]
    pub lsb_first: bool,

    /// Shift fields most significant bit first
    #[arg(long, global = true)]
    pub msb_first: bool,

    /// Host cycles to keep the bus idle after each transaction
    #[arg(long, global = true)]
    pub cooldown: Option<u32>,

    /// Host cycles per serial clock half-period
    #[arg(long, global = true)]
    pub divider: Option<u32>,
}

impl BusArgs {
    /// Apply the overrides on top of `config`
    pub fn apply(&self, mut config: Config) -> spimain_core::Result<Config> {
        if let Some(width) = self.address_width {
            config.address_width = width;
        }
        if let Some(width) = self.data_width {
            config.data_width = width;
        }
        if let Some(mode) = self.mode {
            config.spi_mode = SpiMode::from_number(mode)?;
        }
        if self.lsb_first {
            config.bit_order = BitOrder::LsbFirst;
        }
        if self.msb_first {
            config.bit_order = BitOrder::MsbFirst;
        }
        if let Some(cycles) = self.cooldown {
            config.cooldown_cycles = cycles;
        }
        if let Some(divider) = self.divider {
            config.clock_divider = divider;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Transaction kind for the trace command
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Read,
    Write,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read a register from the emulated subordinate
    Read {
        /// Register address
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Value to place in the register before reading
        #[arg(long, value_parser = parse_hex_u32)]
        preload: Option<u32>,
    },

    /// Write a register, then read it back
    Write {
        /// Register address
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Value to write
        #[arg(value_parser = parse_hex_u32)]
        data: u32,
    },

    /// Run one transaction and print every host cycle
    Trace {
        /// Transaction direction
        #[arg(value_enum)]
        kind: TraceKind,

        /// Register address
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Write data, or the register preload for a read
        #[arg(value_parser = parse_hex_u32)]
        data: Option<u32>,

        /// Also write the waveform as a VCD file
        #[arg(long)]
        vcd: Option<PathBuf>,
    },

    /// Run a randomized read/write campaign against a shadow model
    Soak {
        /// Number of transactions
        #[arg(short = 'n', long, default_value = "100")]
        count: u32,

        /// RNG seed (random if not given)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the clock edge assignment for the configured mode
    Edges,

    /// Print the effective configuration as TOML
    Config,
}
