//! Randomized soak command
//!
//! Issues random reads and writes against the emulated subordinate and
//! checks every read against a shadow copy of the register file.

use std::collections::HashMap;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spimain_core::Config;
use spimain_dummy::Testbench;

use super::CommandError;

/// Percentage of transactions that are writes
const WRITE_PERCENT: u32 = 50;

/// Run the soak command
pub fn run_soak(config: Config, count: u32, seed: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
    log::info!("Soak: {} transactions, seed {}", count, seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut bench = Testbench::new(config)?;
    let mut shadow: HashMap<u32, u32> = HashMap::new();
    let mut failures = 0u32;
    let (mut reads, mut writes) = (0u32, 0u32);

    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    for _ in 0..count {
        let address = rng.gen::<u32>() & config.address_mask();
        if rng.gen_range(0..100) < WRITE_PERCENT {
            let data = rng.gen::<u32>();
            bench.write(address, data)?;
            shadow.insert(address, data & config.data_mask());
            writes += 1;
        } else {
            let value = bench.read(address)?;
            let expected = shadow.get(&address).copied().unwrap_or(0);
            if value != expected {
                let err = CommandError::Readback {
                    address,
                    expected,
                    read: value,
                };
                pb.suspend(|| log::error!("{}", err));
                failures += 1;
            }
            reads += 1;
        }
        pb.inc(1);
    }
    pb.finish_with_message("Soak complete");

    let stats = bench.device().stats();
    println!(
        "{} reads, {} writes, {} host cycles, {} aborted frames",
        reads,
        writes,
        bench.cycle(),
        stats.aborted
    );

    if failures > 0 || stats.reads != reads || stats.writes != writes {
        return Err(CommandError::Soak { failures, count }.into());
    }
    println!("All {} transactions matched (seed {})", count, seed);
    Ok(())
}
