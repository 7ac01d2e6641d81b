//! Accumulation point between notification delivery and the command loop.

use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use log::*;

use crate::{peripheral::NotificationSink, protocol::is_complete};

/// Result of waiting for one command's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    pub bytes: Vec<u8>,
    /// Whether the response ended with the terminator when it was consumed.
    pub complete: bool,
    /// Whether the second wait was needed.
    pub waited_second: bool,
}

/// Byte buffer shared by one appender and one consumer.
///
/// Every append and [`ResponseBuffer::close`] wakes a consumer blocked in
/// [`ResponseBuffer::collect`].
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    bytes: Mutex<Vec<u8>>,
    arrived: Condvar,
    closed: AtomicBool,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.lock().extend_from_slice(chunk);
        self.arrived.notify_all();
    }

    /// Copies the current contents without consuming them.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Takes everything accumulated since the previous clear.
    pub fn snapshot_and_clear(&self) -> Vec<u8> {
        mem::take(&mut *self.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        is_complete(&self.lock())
    }

    /// Ends any pending and future wait in [`ResponseBuffer::collect`] early.
    pub fn close(&self) {
        let _bytes = self.lock();
        self.closed.store(true, Ordering::SeqCst);
        self.arrived.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits for a complete response in two stages, then consumes the buffer.
    ///
    /// The first stage always lasts `first`, so every line the device sends
    /// within it belongs to this response. If the buffer is not complete by
    /// then, the second stage waits up to `second` more and returns as soon
    /// as it is. Both stages end early once the buffer is closed. The buffer
    /// is cleared in every case and the bytes are returned even if no
    /// terminator ever arrived.
    pub fn collect(&self, first: Duration, second: Duration) -> Collected {
        let (guard, _) = self
            .arrived
            .wait_timeout_while(self.lock(), first, |_| !self.is_closed())
            .unwrap_or_else(PoisonError::into_inner);

        let (mut guard, waited_second) = if is_complete(&guard) || self.is_closed() {
            (guard, false)
        } else {
            debug!(
                "response incomplete after {:?} ({} bytes), waiting {:?} more",
                first,
                guard.len(),
                second
            );
            let (guard, _) = self
                .arrived
                .wait_timeout_while(guard, second, |bytes| {
                    !is_complete(bytes) && !self.is_closed()
                })
                .unwrap_or_else(PoisonError::into_inner);
            (guard, true)
        };

        let complete = is_complete(&guard);
        Collected {
            bytes: mem::take(&mut *guard),
            complete,
            waited_second,
        }
    }
}

impl NotificationSink for ResponseBuffer {
    fn on_receive(&self, chunk: &[u8]) {
        self.append(chunk);
    }
}
