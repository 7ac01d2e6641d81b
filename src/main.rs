use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use blue_terminal::{
    ble::BtlePeripheral, config::TerminalConfig, console::StdConsole, peripheral::Peripheral,
    session::StopReason, terminal::Terminal,
};
#[cfg(feature = "colored-output")]
use colored::*;
use log::*;

fn main() -> Result<ExitCode> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp(None)
        .init();

    let config = match TerminalConfig::from_args(std::env::args()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", highlight(&e.to_string()));
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("Connecting to {}...", config.device);

    let peripheral = match BtlePeripheral::connect(&config.device, config.scan_timeout) {
        Ok(peripheral) => Arc::new(peripheral),
        Err(e) => {
            eprintln!(
                "{}",
                highlight(&format!("could not open device '{}': {}", config.device, e))
            );
            return Ok(ExitCode::FAILURE);
        }
    };

    let terminal = match Terminal::open(peripheral.clone(), config.clone()) {
        Ok(terminal) => terminal,
        Err(e) => {
            eprintln!(
                "{}",
                highlight(&format!("could not open device '{}': {}", config.device, e))
            );
            if let Err(e) = peripheral.disconnect() {
                warn!("disconnect failed: {}", e);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("Connected. Type a command, 'q' to quit.");

    let token = terminal.token();
    let waker = terminal.waker();
    ctrlc::set_handler(move || {
        token.interrupt();
        waker.wake();
    })
    .context("failed to install the interrupt handler")?;

    // The command loop may still be blocked on stdin; returning from main
    // ends it.
    match terminal
        .run(StdConsole::new())
        .context("failed to start the command loop")?
    {
        StopReason::Interrupted => println!("keyboard interrupt"),
        StopReason::Finished => {}
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "colored-output")]
fn highlight(message: &str) -> String {
    message.red().to_string()
}

#[cfg(not(feature = "colored-output"))]
fn highlight(message: &str) -> String {
    message.to_string()
}
