// Runs the terminal against an in-memory device that echoes every command.
// From the crate directory, run:
// cargo run --example simulator

use std::{sync::Arc, time::Duration};

use blue_terminal::{
    config::TerminalConfig,
    console::StdConsole,
    session::StopReason,
    simulator::{Packet, SimulatedPeripheral},
    terminal::Terminal,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp_millis()
        .init();

    println!("BLE terminal simulator");
    println!("----------------------");
    println!("Commands are echoed back. 'slow' answers in the second window,");
    println!("'mute' never terminates its answer, 'q' quits.");

    let device = SimulatedPeripheral::new(|command: &[u8]| match command {
        b"slow\r" => vec![
            Packet::new(Duration::from_millis(20), "sl"),
            Packet::new(Duration::from_millis(250), "ow\r"),
        ],
        b"mute\r" => vec![Packet::new(Duration::from_millis(20), "mu")],
        _ => vec![Packet::new(Duration::from_millis(30), command)],
    });

    let terminal = Terminal::open(Arc::new(device), TerminalConfig::default())?;

    let token = terminal.token();
    let waker = terminal.waker();
    ctrlc::set_handler(move || {
        token.interrupt();
        waker.wake();
    })?;

    if terminal.run(StdConsole::new())? == StopReason::Interrupted {
        println!("keyboard interrupt");
    }

    Ok(())
}
