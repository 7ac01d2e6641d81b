//! Event queue behind [`Peripheral::pump_events`](crate::peripheral::Peripheral::pump_events).
//!
//! Producers (the BLE runtime, the simulator) push notifications into the
//! queue from any thread. Sinks only run on the thread that pumps it.

use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use log::*;
use uuid::Uuid;

use crate::peripheral::{NotificationSink, Waker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEvent {
    Notification { uuid: Uuid, value: Vec<u8> },
    Wake,
    Disconnected,
}

pub struct EventQueue {
    tx: Sender<PumpEvent>,
    rx: Mutex<Receiver<PumpEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn sender(&self) -> Sender<PumpEvent> {
        self.tx.clone()
    }

    pub fn waker(&self) -> Waker {
        let tx = self.tx.clone();
        Waker::new(move || {
            let _ = tx.send(PumpEvent::Wake);
        })
    }

    /// Waits up to `timeout` for the next event.
    pub fn wait(&self, timeout: Duration) -> Option<PumpEvent> {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            // `self.tx` keeps the channel open.
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Sinks registered per characteristic.
#[derive(Default)]
pub struct Subscriptions {
    sinks: Mutex<Vec<(Uuid, Arc<dyn NotificationSink>)>>,
}

impl Subscriptions {
    pub fn add(&self, uuid: Uuid, sink: Arc<dyn NotificationSink>) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((uuid, sink));
    }

    /// Hands `value` to every sink subscribed to `uuid`.
    ///
    /// Returns `true` if any sink received it.
    pub fn dispatch(&self, uuid: Uuid, value: &[u8]) -> bool {
        let sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = false;
        for (_, sink) in sinks.iter().filter(|(subscribed, _)| *subscribed == uuid) {
            sink.on_receive(value);
            delivered = true;
        }
        if !delivered {
            debug!("dropping {} bytes from unsubscribed {}", value.len(), uuid);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response_buffer::ResponseBuffer;

    #[test]
    fn test_wait_times_out() {
        let queue = EventQueue::new();
        assert_eq!(queue.wait(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_waker_interrupts_wait() {
        let queue = Arc::new(EventQueue::new());
        let waker = queue.waker();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            waker.wake();
        });

        let start = std::time::Instant::now();
        assert_eq!(queue.wait(Duration::from_secs(5)), Some(PumpEvent::Wake));
        assert!(start.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }

    #[test]
    fn test_dispatch_by_uuid() {
        let serial = Uuid::from_u128(1);
        let other = Uuid::from_u128(2);
        let buffer = Arc::new(ResponseBuffer::new());
        let subscriptions = Subscriptions::default();
        subscriptions.add(serial, buffer.clone());

        assert!(subscriptions.dispatch(serial, b"ab"));
        assert!(!subscriptions.dispatch(other, b"zz"));
        assert!(subscriptions.dispatch(serial, b"c\r"));

        assert_eq!(buffer.snapshot_and_clear(), b"abc\r".to_vec());
    }
}
