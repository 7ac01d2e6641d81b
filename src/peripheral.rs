//! Boundary to the BLE library.
//!
//! The terminal only needs a handful of capabilities from a connected
//! peripheral: look up characteristics, subscribe to notifications, write,
//! and keep the event loop ticking so notification callbacks fire.

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PeripheralError {
    #[error("invalid device address '{0}'")]
    InvalidAddress(String),
    #[error("no bluetooth adapter found")]
    NoAdapter,
    #[error("device {address} not found within {timeout:?}")]
    NotFound { address: String, timeout: Duration },
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("peripheral disconnected")]
    Disconnected,
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = core::result::Result<T, PeripheralError>;

/// Reference to one GATT characteristic, obtained once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Characteristic {
    pub service: Uuid,
    pub uuid: Uuid,
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.uuid)
    }
}

/// Receives the bytes of every notification on a subscribed characteristic.
///
/// Called from whichever thread pumps the peripheral's events, so
/// implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn on_receive(&self, chunk: &[u8]);
}

/// Interrupts a pending [`Peripheral::pump_events`] wait.
#[derive(Clone)]
pub struct Waker(Arc<dyn Fn() + Send + Sync>);

impl Waker {
    pub fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(wake))
    }

    pub fn wake(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Waker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Waker")
    }
}

/// A connected BLE peripheral.
///
/// Notification callbacks registered with [`Peripheral::subscribe`] only run
/// while [`Peripheral::pump_events`] is being called.
pub trait Peripheral: Send + Sync {
    /// Looks up a characteristic discovered on the device.
    fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic>;

    fn subscribe(
        &self,
        characteristic: &Characteristic,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<()>;

    fn write(&self, characteristic: &Characteristic, data: &[u8], with_response: bool)
        -> Result<()>;

    /// Reads the current value of a characteristic.
    fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>>;

    /// Waits up to `timeout` for an event and dispatches it.
    ///
    /// Returns `true` if at least one notification was delivered to a sink.
    fn pump_events(&self, timeout: Duration) -> Result<bool>;

    fn waker(&self) -> Waker;

    fn disconnect(&self) -> Result<()>;
}
