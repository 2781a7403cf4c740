//! Single register read and write commands

use spimain_core::Config;
use spimain_dummy::Testbench;

use super::CommandError;

/// Check that the subordinate saw a whole frame
fn check_frame(bench: &Testbench) -> Result<(), CommandError> {
    let expected = bench.host().config().frame_bits();
    let received = bench.device().last_frame().len();
    if received as u32 != expected {
        return Err(CommandError::FrameLength { expected, received });
    }
    Ok(())
}

/// Run the read command
pub fn run_read(
    config: Config,
    address: u32,
    preload: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = Testbench::new(config)?;
    let address = address & config.address_mask();
    if let Some(value) = preload {
        bench.device_mut().set_register(address, value);
        log::debug!("Preloaded 0x{:X} with 0x{:X}", address, value & config.data_mask());
    }

    let value = bench.read(address)?;
    check_frame(&bench)?;

    println!("0x{:X}: 0x{:X}", address, value);
    log::info!("Read took {} host cycles", bench.cycle());
    Ok(())
}

/// Run the write command, reading the register back afterwards
pub fn run_write(config: Config, address: u32, data: u32) -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = Testbench::new(config)?;
    let address = address & config.address_mask();
    let expected = data & config.data_mask();
    if expected != data {
        log::warn!("Data 0x{:X} truncated to {} bits: 0x{:X}", data, config.data_width, expected);
    }

    bench.write(address, data)?;
    check_frame(&bench)?;
    let read = bench.read(address)?;

    if read != expected {
        return Err(CommandError::Readback {
            address,
            expected,
            read,
        }
        .into());
    }

    println!("0x{:X}: wrote 0x{:X}, read back 0x{:X}", address, expected, read);
    log::info!("Write and readback took {} host cycles", bench.cycle());
    Ok(())
}
