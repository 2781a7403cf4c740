//! spimain - SPI main controller model
//!
//! Drives the cycle-accurate controller from `spimain-core` against the
//! emulated register-file subordinate from `spimain-dummy`.
//!
//! # Configuration
//!
//! The bus is described by a [`Config`], taken from (in increasing order of
//! precedence) the built-in defaults, a `--config` TOML file and the
//! individual command-line overrides.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use spimain_core::Config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let base = match &cli.config {
        Some(path) => {
            let config = Config::from_toml_file(path)?;
            log::info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };
    let config = cli.bus.apply(base)?;
    log::debug!("Effective configuration: {:?}", config);

    match cli.command {
        Commands::Read { address, preload } => commands::register::run_read(config, address, preload),
        Commands::Write { address, data } => commands::register::run_write(config, address, data),
        Commands::Trace {
            kind,
            address,
            data,
            vcd,
        } => commands::trace::run_trace(config, kind, address, data, vcd.as_deref()),
        Commands::Soak { count, seed } => commands::soak::run_soak(config, count, seed),
        Commands::Edges => {
            commands::print_edges(&config);
            Ok(())
        }
        Commands::Config => {
            commands::print_config(&config);
            Ok(())
        }
    }
}
