//! The interactive read-write-print loop.
//!
//! One command is outstanding at a time: a line is read, written with the
//! terminator, and its response is collected from the [`ResponseBuffer`]
//! before the next line is read.

use std::{io, string::FromUtf8Error, sync::Arc};

use log::*;
use thiserror::Error;

use crate::{
    config::ResponseTiming,
    console::Console,
    peripheral::{Characteristic, Peripheral, PeripheralError},
    protocol::{frame_command, render_response},
    response_buffer::ResponseBuffer,
    session::SessionToken,
};

/// Lines starting with this end the session.
pub const QUIT: char = 'q';

#[derive(Error, Debug)]
pub enum IterationError {
    #[error("console error: {0}")]
    Console(#[from] io::Error),
    #[error("write failed: {0}")]
    Write(#[from] PeripheralError),
    #[error("response is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Empty line, nothing was sent.
    Skipped,
    /// Quit sentinel or end of input.
    Quit,
    Response(Response),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub text: String,
    /// `false` if the terminator never arrived and `text` is partial.
    pub complete: bool,
    pub waited_second: bool,
}

pub struct CommandLoop<P: Peripheral + ?Sized, C: Console> {
    peripheral: Arc<P>,
    command: Characteristic,
    buffer: Arc<ResponseBuffer>,
    console: C,
    token: SessionToken,
    timing: ResponseTiming,
    write_with_response: bool,
}

impl<P: Peripheral + ?Sized, C: Console> CommandLoop<P, C> {
    pub fn new(
        peripheral: Arc<P>,
        command: Characteristic,
        buffer: Arc<ResponseBuffer>,
        console: C,
        token: SessionToken,
    ) -> Self {
        Self {
            peripheral,
            command,
            buffer,
            console,
            token,
            timing: ResponseTiming::default(),
            write_with_response: false,
        }
    }

    pub fn timing(mut self, timing: ResponseTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn write_with_response(mut self, write_with_response: bool) -> Self {
        self.write_with_response = write_with_response;
        self
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    /// Runs until the quit sentinel, end of input, an error, or until the
    /// session is stopped elsewhere. Finishes the session token on exit.
    pub fn run(&mut self) {
        info!("command loop started");
        while self.token.is_alive() {
            match self.step() {
                Ok(Step::Quit) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("command loop: {}", e);
                    break;
                }
            }
        }
        self.token.finish();
        info!("command loop exiting");
    }

    /// Reads one line and, unless it is empty or the quit sentinel, sends it
    /// and prints its response.
    pub fn step(&mut self) -> Result<Step, IterationError> {
        let line = match self.console.read_line()? {
            Some(line) => line,
            None => {
                info!("end of input");
                return Ok(Step::Quit);
            }
        };

        if line.is_empty() {
            return Ok(Step::Skipped);
        }
        if line.starts_with(QUIT) {
            return Ok(Step::Quit);
        }

        let stale = self.buffer.snapshot_and_clear();
        if !stale.is_empty() {
            warn!(
                "discarding {} unsolicited bytes: {:?}",
                stale.len(),
                String::from_utf8_lossy(&stale)
            );
        }

        self.peripheral
            .write(&self.command, &frame_command(&line), self.write_with_response)?;

        let collected = self
            .buffer
            .collect(self.timing.first_wait, self.timing.second_wait);
        if !collected.complete {
            debug!(
                "no terminator after {:?}, printing {} bytes as they are",
                self.timing.first_wait + self.timing.second_wait,
                collected.bytes.len()
            );
        }

        let text = render_response(collected.bytes)?;
        self.console.write_line(&text)?;

        Ok(Step::Response(Response {
            text,
            complete: collected.complete,
            waited_second: collected.waited_second,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{SERIAL_PORT_UUID, SERIAL_SERVICE_UUID},
        simulator::{Packet, ScriptedConsole, SimulatedPeripheral},
    };
    use std::{
        thread::{self, JoinHandle},
        time::Duration,
    };

    const FIRST: Duration = Duration::from_millis(100);
    const SECOND: Duration = Duration::from_millis(300);

    struct Harness {
        sim: Arc<SimulatedPeripheral>,
        buffer: Arc<ResponseBuffer>,
        token: SessionToken,
        pump: Option<JoinHandle<()>>,
        command_loop: CommandLoop<SimulatedPeripheral, ScriptedConsole>,
    }

    impl Harness {
        fn new(sim: SimulatedPeripheral, lines: &[&str]) -> Self {
            let sim = Arc::new(sim);
            let serial = sim
                .characteristic(SERIAL_SERVICE_UUID, SERIAL_PORT_UUID)
                .unwrap();
            let buffer = Arc::new(ResponseBuffer::new());
            sim.subscribe(&serial, buffer.clone()).unwrap();

            let token = SessionToken::new();
            let pump = {
                let sim = sim.clone();
                let token = token.clone();
                thread::spawn(move || {
                    while token.is_alive() {
                        let _ = sim.pump_events(Duration::from_millis(10));
                    }
                })
            };

            let command_loop = CommandLoop::new(
                sim.clone(),
                serial,
                buffer.clone(),
                ScriptedConsole::new(lines.iter().copied()),
                token.clone(),
            )
            .timing(ResponseTiming {
                first_wait: FIRST,
                second_wait: SECOND,
            });

            Self {
                sim,
                buffer,
                token,
                pump: Some(pump),
                command_loop,
            }
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.token.finish();
            if let Some(pump) = self.pump.take() {
                let _ = pump.join();
            }
        }
    }

    fn reply(packets: Vec<Packet>) -> impl Fn(&[u8]) -> Vec<Packet> + Send + Sync {
        move |_| packets.clone()
    }

    #[test]
    fn test_version_in_first_window() {
        let sim = SimulatedPeripheral::new(reply(vec![Packet::new(
            Duration::from_millis(10),
            "v1.0\r",
        )]));
        let mut h = Harness::new(sim, &["AT+VERSION"]);

        let step = h.command_loop.step().unwrap();

        assert_eq!(
            step,
            Step::Response(Response {
                text: "v1.0".to_string(),
                complete: true,
                waited_second: false,
            })
        );
        assert_eq!(h.command_loop.console().output(), vec!["v1.0"]);
        assert_eq!(h.sim.writes()[0].1, b"AT+VERSION\r".to_vec());
        assert!(h.buffer.is_empty());
    }

    #[test]
    fn test_multi_line_response_within_first_window() {
        let sim = SimulatedPeripheral::new(|command: &[u8]| {
            if command == b"HELP\r" {
                vec![
                    Packet::new(Duration::from_millis(5), "line1\r"),
                    Packet::new(Duration::from_millis(30), "line2\r"),
                ]
            } else {
                vec![Packet::new(Duration::from_millis(5), "ok\r")]
            }
        });
        let mut h = Harness::new(sim, &["HELP", "X"]);

        let help = h.command_loop.step().unwrap();
        h.command_loop.step().unwrap();

        assert!(matches!(
            help,
            Step::Response(Response { complete: true, waited_second: false, .. })
        ));
        assert_eq!(
            h.command_loop.console().output(),
            vec!["line1\nline2", "ok"]
        );
    }

    #[test]
    fn test_unsolicited_bytes_are_discarded_before_write() {
        let sim = SimulatedPeripheral::loopback(Duration::from_millis(5));
        let mut h = Harness::new(sim, &["AT"]);
        h.sim.notify(b"late\r");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while h.buffer.is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(h.buffer.snapshot(), b"late\r".to_vec());

        let step = h.command_loop.step().unwrap();

        assert!(matches!(step, Step::Response(Response { ref text, .. }) if text == "AT"));
        assert_eq!(h.command_loop.console().output(), vec!["AT"]);
        assert!(h.buffer.is_empty());
    }

    #[test]
    fn test_ping_completes_in_second_window() {
        let sim = SimulatedPeripheral::new(reply(vec![
            Packet::new(Duration::from_millis(10), "P"),
            Packet::new(FIRST + Duration::from_millis(100), "ONG\r"),
        ]));
        let mut h = Harness::new(sim, &["PING"]);

        let step = h.command_loop.step().unwrap();

        assert_eq!(
            step,
            Step::Response(Response {
                text: "PONG".to_string(),
                complete: true,
                waited_second: true,
            })
        );
        assert_eq!(h.command_loop.console().output(), vec!["PONG"]);
        assert!(h.buffer.is_empty());
    }

    #[test]
    fn test_partial_response_is_printed() {
        let sim = SimulatedPeripheral::new(reply(vec![Packet::new(
            Duration::from_millis(10),
            "PAR",
        )]));
        let mut h = Harness::new(sim, &["STATUS"]);

        let step = h.command_loop.step().unwrap();

        assert_eq!(
            step,
            Step::Response(Response {
                text: "PAR".to_string(),
                complete: false,
                waited_second: true,
            })
        );
        assert_eq!(h.command_loop.console().output(), vec!["PAR"]);
    }

    #[test]
    fn test_silent_device_prints_empty_text() {
        let sim = SimulatedPeripheral::new(|_: &[u8]| Vec::new());
        let mut h = Harness::new(sim, &["HELLO"]);

        let step = h.command_loop.step().unwrap();

        assert!(matches!(
            step,
            Step::Response(Response { ref text, complete: false, .. }) if text.is_empty()
        ));
        assert_eq!(h.command_loop.console().output(), vec![""]);
    }

    #[test]
    fn test_empty_line_is_skipped() {
        let sim = SimulatedPeripheral::loopback(Duration::ZERO);
        let mut h = Harness::new(sim, &[""]);
        h.buffer.append(b"untouched");

        assert_eq!(h.command_loop.step().unwrap(), Step::Skipped);
        assert!(h.sim.writes().is_empty());
        assert_eq!(h.buffer.snapshot(), b"untouched".to_vec());
        assert!(h.command_loop.console().output().is_empty());
    }

    #[test]
    fn test_quit_sentinel() {
        let sim = SimulatedPeripheral::loopback(Duration::ZERO);
        let mut h = Harness::new(sim, &["quit", "AT"]);
        h.buffer.append(b"left over");

        assert_eq!(h.command_loop.step().unwrap(), Step::Quit);
        assert!(h.sim.writes().is_empty());
        assert_eq!(h.buffer.snapshot(), b"left over".to_vec());
    }

    #[test]
    fn test_run_until_quit() {
        let sim = SimulatedPeripheral::loopback(Duration::from_millis(5));
        let mut h = Harness::new(sim, &["one", "", "two", "q", "three"]);

        h.command_loop.run();

        assert!(!h.token.is_alive());
        assert_eq!(h.command_loop.console().output(), vec!["one", "two"]);
        assert_eq!(h.sim.writes().len(), 2);
    }

    #[test]
    fn test_run_until_end_of_input() {
        let sim = SimulatedPeripheral::loopback(Duration::from_millis(5));
        let mut h = Harness::new(sim, &["only"]);

        h.command_loop.run();

        assert!(!h.token.is_alive());
        assert_eq!(h.command_loop.console().output(), vec!["only"]);
    }

    #[test]
    fn test_write_failure_ends_loop() {
        let sim = SimulatedPeripheral::loopback(Duration::ZERO);
        sim.fail_writes();
        let mut h = Harness::new(sim, &["AT", "AT"]);

        assert!(matches!(
            h.command_loop.step(),
            Err(IterationError::Write(PeripheralError::Transport(_)))
        ));

        h.command_loop.run();
        assert!(!h.token.is_alive());
        assert!(h.command_loop.console().output().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_an_iteration_error() {
        let sim = SimulatedPeripheral::new(reply(vec![Packet::new(
            Duration::from_millis(5),
            vec![0xff, b'\r'],
        )]));
        let mut h = Harness::new(sim, &["BIN"]);

        assert!(matches!(
            h.command_loop.step(),
            Err(IterationError::Decode(_))
        ));
        assert!(h.buffer.is_empty());
    }

    #[test]
    fn test_stopped_session_does_not_read() {
        let sim = SimulatedPeripheral::loopback(Duration::ZERO);
        let mut h = Harness::new(sim, &["AT"]);
        h.token.interrupt();

        h.command_loop.run();

        assert!(h.sim.writes().is_empty());
    }
}
