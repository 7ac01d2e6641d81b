//! Session liveness shared by the command loop, the pump and the interrupt
//! handler.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

const ALIVE: u8 = 0;
const FINISHED: u8 = 1;
const INTERRUPTED: u8 = 2;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The command loop ended, by the quit sentinel, end of input or an error.
    Finished,
    /// The user pressed Ctrl-C.
    Interrupted,
}

/// Cancellation token for one terminal session.
///
/// The first stop wins; later calls do not change the reason.
#[derive(Debug, Clone, Default)]
pub struct SessionToken {
    state: Arc<AtomicU8>,
}

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ALIVE
    }

    pub fn finish(&self) {
        self.stop(FINISHED);
    }

    pub fn interrupt(&self) {
        self.stop(INTERRUPTED);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.state.load(Ordering::SeqCst) {
            FINISHED => Some(StopReason::Finished),
            INTERRUPTED => Some(StopReason::Interrupted),
            _ => None,
        }
    }

    fn stop(&self, reason: u8) {
        let _ = self
            .state
            .compare_exchange(ALIVE, reason, Ordering::SeqCst, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_stop_wins() {
        let token = SessionToken::new();
        assert!(token.is_alive());
        assert_eq!(token.stop_reason(), None);

        let shared = token.clone();
        shared.interrupt();
        token.finish();

        assert!(!token.is_alive());
        assert_eq!(token.stop_reason(), Some(StopReason::Interrupted));
    }
}
