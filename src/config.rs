use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{DEFAULT_DEVICE, SERIAL_PORT_UUID, SERIAL_SERVICE_UUID};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("Usage: blueTerminal [device]")]
    TooManyArguments,
}

/// Timing of the two-stage response wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseTiming {
    /// Wait right after a command is written.
    pub first_wait: Duration,
    /// Final wait if the response is still incomplete.
    pub second_wait: Duration,
}

impl Default for ResponseTiming {
    fn default() -> Self {
        Self {
            first_wait: Duration::from_millis(100),
            second_wait: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    pub device: String,
    pub service: Uuid,
    /// Characteristic commands are written to.
    pub command_characteristic: Uuid,
    /// Characteristic responses are notified on.
    pub notify_characteristic: Uuid,
    pub write_with_response: bool,
    pub timing: ResponseTiming,
    /// Bound of a single idle wait of the connection pump.
    pub pump_timeout: Duration,
    pub scan_timeout: Duration,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            service: SERIAL_SERVICE_UUID,
            command_characteristic: SERIAL_PORT_UUID,
            notify_characteristic: SERIAL_PORT_UUID,
            write_with_response: false,
            timing: ResponseTiming::default(),
            pump_timeout: Duration::from_millis(500),
            scan_timeout: Duration::from_secs(10),
        }
    }
}

impl TerminalConfig {
    /// Builds the configuration from the process arguments, program name
    /// first.
    ///
    /// Accepts at most one positional argument, the device address.
    pub fn from_args<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let args: Vec<String> = args.into_iter().skip(1).map(Into::into).collect();

        match args.as_slice() {
            [] => Ok(Self::default()),
            [device] => Ok(Self {
                device: device.clone(),
                ..Self::default()
            }),
            _ => Err(UsageError::TooManyArguments),
        }
    }
}
