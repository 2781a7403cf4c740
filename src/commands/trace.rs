//! Per-cycle trace command

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use spimain_core::{Config, TransactionRequest};
use spimain_dummy::{Testbench, Trace};

use crate::cli::TraceKind;

fn level(high: bool) -> char {
    if high {
        '1'
    } else {
        '0'
    }
}

/// Print one row per host cycle
pub fn print_trace(trace: &Trace) {
    println!("{:>6}  {:<9} CS SCLK MOSI MISO DONE", "cycle", "state");
    for entry in trace.entries() {
        let lines = entry.lines;
        println!(
            "{:>6}  {:<9} {}  {}    {}    {}    {}",
            entry.cycle,
            entry.state.label(),
            level(!lines.selected()),
            level(lines.sclk()),
            level(lines.mosi()),
            level(lines.miso()),
            if entry.done { "*" } else { "" }
        );
    }
}

/// Run the trace command
pub fn run_trace(
    config: Config,
    kind: TraceKind,
    address: u32,
    data: Option<u32>,
    vcd: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = Testbench::new(config)?.record();

    let request = match kind {
        TraceKind::Read => {
            if let Some(value) = data {
                bench.device_mut().set_register(address, value);
            }
            TransactionRequest::read(address)
        }
        TraceKind::Write => {
            let data = data.ok_or("write trace needs a data value")?;
            TransactionRequest::write(address, data)
        }
    };

    // One idle cycle first so the chip-select edge is visible
    bench.tick();
    let result = bench.transact(request)?;

    let trace = bench.take_trace().ok_or("trace recording was not enabled")?;
    print_trace(&trace);

    let frame: String = trace
        .sampled_mosi(config.spi_mode)
        .into_iter()
        .map(level)
        .collect();
    println!();
    println!("MOSI frame: {}", frame);
    if let Some(value) = result.read_data {
        println!("Read data:  0x{:X}", value);
    }

    if let Some(path) = vcd {
        let mut out = BufWriter::new(File::create(path)?);
        trace.write_vcd(&mut out)?;
        out.flush()?;
        log::info!("Wrote {} cycles to {:?}", trace.len(), path);
    }
    Ok(())
}
