//! Wires the command loop and the connection pump into one session.

use std::{io, sync::Arc, thread};

use log::*;

use crate::{
    command_loop::CommandLoop,
    config::TerminalConfig,
    console::Console,
    peripheral::{Characteristic, Peripheral, PeripheralError, Waker},
    protocol::{DEVICE_INFORMATION_SERVICE_UUID, MODEL_NUMBER_UUID},
    pump::ConnectionPump,
    response_buffer::ResponseBuffer,
    session::{SessionToken, StopReason},
};

pub struct Terminal<P: Peripheral + ?Sized> {
    peripheral: Arc<P>,
    command: Characteristic,
    buffer: Arc<ResponseBuffer>,
    token: SessionToken,
    config: TerminalConfig,
}

impl<P: Peripheral + ?Sized + 'static> Terminal<P> {
    /// Looks up the command and notify characteristics and subscribes the
    /// response buffer.
    pub fn open(peripheral: Arc<P>, config: TerminalConfig) -> Result<Self, PeripheralError> {
        let command = peripheral.characteristic(config.service, config.command_characteristic)?;
        let notify = peripheral.characteristic(config.service, config.notify_characteristic)?;

        let buffer = Arc::new(ResponseBuffer::new());
        peripheral.subscribe(&notify, buffer.clone())?;
        info!("writing to {}, listening on {}", command, notify);

        log_model_number(peripheral.as_ref());

        Ok(Self {
            peripheral,
            command,
            buffer,
            token: SessionToken::new(),
            config,
        })
    }

    pub fn token(&self) -> SessionToken {
        self.token.clone()
    }

    pub fn waker(&self) -> Waker {
        self.peripheral.waker()
    }

    /// Runs the command loop on its own thread and pumps events on the
    /// current one until the session ends. The peripheral is disconnected
    /// before this returns.
    ///
    /// A response wait still in progress is cut short. After an interrupt the
    /// command loop thread may still be blocked on input; it is left to
    /// process shutdown.
    pub fn run<C: Console + Send + 'static>(self, console: C) -> io::Result<StopReason> {
        let mut command_loop = CommandLoop::new(
            self.peripheral.clone(),
            self.command,
            self.buffer.clone(),
            console,
            self.token.clone(),
        )
        .timing(self.config.timing)
        .write_with_response(self.config.write_with_response);

        let handle = thread::Builder::new()
            .name("command-loop".into())
            .spawn(move || command_loop.run())?;

        let mut pump = ConnectionPump::new(
            self.peripheral.clone(),
            self.token.clone(),
            self.config.pump_timeout,
        );
        let reason = pump.run(&handle);
        self.buffer.close();

        if handle.is_finished() {
            if handle.join().is_err() {
                error!("command loop panicked");
            }
        } else {
            debug!("command loop still waiting for input, leaving it to process exit");
        }

        Ok(reason)
    }
}

fn log_model_number<P: Peripheral + ?Sized>(peripheral: &P) {
    let model = peripheral
        .characteristic(DEVICE_INFORMATION_SERVICE_UUID, MODEL_NUMBER_UUID)
        .and_then(|characteristic| peripheral.read(&characteristic));

    match model {
        Ok(value) => info!(
            "model number: {}",
            String::from_utf8_lossy(&value).trim_end_matches('\0')
        ),
        Err(e) => warn!("could not read model number: {}", e),
    }
}
