//! Keeps the peripheral's events flowing while the command loop runs.

use std::{sync::Arc, thread::JoinHandle, time::Duration};

use log::*;

use crate::{
    peripheral::Peripheral,
    session::{SessionToken, StopReason},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Connected,
    Pumping,
    CommandLoopExited,
    InterruptReceived,
    Disconnecting,
    Terminated,
}

pub struct ConnectionPump<P: Peripheral + ?Sized> {
    peripheral: Arc<P>,
    token: SessionToken,
    timeout: Duration,
    state: PumpState,
}

impl<P: Peripheral + ?Sized> ConnectionPump<P> {
    pub fn new(peripheral: Arc<P>, token: SessionToken, timeout: Duration) -> Self {
        Self {
            peripheral,
            token,
            timeout,
            state: PumpState::Connected,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    fn transition(&mut self, next: PumpState) {
        debug!("pump: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Pumps events until the command loop exits or the session is
    /// interrupted, then disconnects the peripheral.
    ///
    /// A lost connection ends the session like an exited command loop.
    pub fn run(&mut self, command_loop: &JoinHandle<()>) -> StopReason {
        if self.state != PumpState::Connected {
            warn!("pump already ran, state {:?}", self.state);
            return self.token.stop_reason().unwrap_or(StopReason::Finished);
        }
        self.transition(PumpState::Pumping);

        let reason = loop {
            if let Err(e) = self.peripheral.pump_events(self.timeout) {
                error!("connection lost: {}", e);
                self.token.finish();
            }

            match self.token.stop_reason() {
                Some(reason) => break reason,
                None if command_loop.is_finished() => {
                    self.token.finish();
                    break StopReason::Finished;
                }
                None => {}
            }
        };

        self.transition(match reason {
            StopReason::Finished => PumpState::CommandLoopExited,
            StopReason::Interrupted => PumpState::InterruptReceived,
        });

        self.transition(PumpState::Disconnecting);
        match self.peripheral.disconnect() {
            Ok(()) => info!("disconnected"),
            Err(e) => warn!("disconnect failed: {}", e),
        }
        self.transition(PumpState::Terminated);

        reason
    }
}
