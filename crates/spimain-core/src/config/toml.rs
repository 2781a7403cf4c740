//! TOML configuration file parsing
//!
//! Parses configuration files of the form:
//!
//! ```toml
//! [bus]
//! address_width = 6
//! data_width = 8
//! spi_mode = 0
//! bit_order = "msb"     # or msb_first = true
//! cooldown_cycles = 4
//! clock_divider = 1
//! clk_period_ns = 10
//! ```
//!
//! Every key is optional; missing keys keep their default.

use std::format;
use std::fs;
use std::path::Path;
use std::string::String;

use super::{BitOrder, Config, SpiMode};
use crate::error::Error;

/// Errors from loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// The file could not be read or written
    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or has unexpected keys
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// The file parsed but describes an unusable controller
    #[error("{0}")]
    Invalid(#[from] Error),
}

/// TOML file structure
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfigFile {
    bus: Option<TomlBus>,
}

/// The `[bus]` table
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlBus {
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    address_width: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    data_width: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    spi_mode: Option<u32>,
    bit_order: Option<String>,
    msb_first: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    cooldown_cycles: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    clock_divider: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    clk_period_ns: Option<u32>,
}

/// Deserialize an optional u32 that can be hex (0x...) or decimal
fn deserialize_opt_hex_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(Some(n)),
        HexOrInt::Str(s) => parse_number(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub(crate) fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

fn parse_bit_order(s: &str) -> Result<BitOrder, ConfigFileError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "msb" | "msb_first" | "msb-first" => Ok(BitOrder::MsbFirst),
        "lsb" | "lsb_first" | "lsb-first" => Ok(BitOrder::LsbFirst),
        other => Err(ConfigFileError::Parse(format!(
            "bit_order must be \"msb\" or \"lsb\", got \"{}\"",
            other
        ))),
    }
}

/// Narrow a width to u8; anything too large is reported by `validate` as-is
fn width(value: u32) -> u8 {
    value.min(u8::MAX as u32) as u8
}

impl Config {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigFileError> {
        let file: TomlConfigFile =
            toml::from_str(content).map_err(|e| ConfigFileError::Parse(format!("{}", e)))?;
        let bus = file.bus.unwrap_or_default();

        let mut config = Config::default();
        if let Some(w) = bus.address_width {
            config.address_width = width(w);
        }
        if let Some(w) = bus.data_width {
            config.data_width = width(w);
        }
        if let Some(mode) = bus.spi_mode {
            let mode = u8::try_from(mode).unwrap_or(u8::MAX);
            config.spi_mode = SpiMode::from_number(mode).map_err(Error::from)?;
        }
        match (bus.bit_order, bus.msb_first) {
            (Some(_), Some(_)) => {
                return Err(ConfigFileError::Parse(
                    "specify either bit_order or msb_first, not both".into(),
                ))
            }
            (Some(order), None) => config.bit_order = parse_bit_order(&order)?,
            (None, Some(msb)) => config.bit_order = BitOrder::from_msb_first(msb),
            (None, None) => {}
        }
        if let Some(c) = bus.cooldown_cycles {
            config.cooldown_cycles = c;
        }
        if let Some(d) = bus.clock_divider {
            config.clock_divider = d;
        }
        if let Some(p) = bus.clk_period_ns {
            config.clk_period_ns = p;
        }

        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file
    pub fn to_toml_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigFileError> {
        fs::write(path, self.to_toml_string())?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> String {
        let mut output = String::new();
        output.push_str("[bus]\n");
        output.push_str(&format!("address_width = {}\n", self.address_width));
        output.push_str(&format!("data_width = {}\n", self.data_width));
        output.push_str(&format!("spi_mode = {}\n", self.spi_mode.number()));
        output.push_str(&format!(
            "bit_order = \"{}\"\n",
            if self.bit_order.is_msb_first() { "msb" } else { "lsb" }
        ));
        output.push_str(&format!("cooldown_cycles = {}\n", self.cooldown_cycles));
        output.push_str(&format!("clock_divider = {}\n", self.clock_divider));
        output.push_str(&format!("clk_period_ns = {}\n", self.clk_period_ns));
        output
    }
}
