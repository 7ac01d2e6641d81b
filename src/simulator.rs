//! In-memory stand-ins for the peripheral and the terminal.
//!
//! [`SimulatedPeripheral`] answers every write with packets chosen by a
//! responder function, delivered from a background thread after the
//! requested latency, just like a real device answering over the air.

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use log::*;
use uuid::Uuid;

use crate::{
    console::Console,
    events::{EventQueue, PumpEvent, Subscriptions},
    peripheral::{Characteristic, NotificationSink, Peripheral, PeripheralError, Result, Waker},
    protocol::{
        DEVICE_INFORMATION_SERVICE_UUID, MIN_MTU_PAYLOAD, MODEL_NUMBER_UUID, SERIAL_PORT_UUID,
        SERIAL_SERVICE_UUID,
    },
};

/// One notification, sent `at` after the write that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub at: Duration,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(at: Duration, data: impl Into<Vec<u8>>) -> Self {
        Self {
            at,
            data: data.into(),
        }
    }
}

type Responder = dyn Fn(&[u8]) -> Vec<Packet> + Send + Sync;

pub struct SimulatedPeripheral {
    characteristics: Vec<Characteristic>,
    notify: Uuid,
    values: HashMap<Uuid, Vec<u8>>,
    responder: Box<Responder>,
    events: EventQueue,
    subscriptions: Subscriptions,
    writes: Mutex<Vec<(Characteristic, Vec<u8>)>>,
    fail_writes: AtomicBool,
    connected: AtomicBool,
}

impl SimulatedPeripheral {
    /// A Bluno-like device exposing the serial characteristic, answering
    /// each write with the packets `responder` returns.
    pub fn new(responder: impl Fn(&[u8]) -> Vec<Packet> + Send + Sync + 'static) -> Self {
        Self {
            characteristics: vec![Characteristic {
                service: SERIAL_SERVICE_UUID,
                uuid: SERIAL_PORT_UUID,
            }],
            notify: SERIAL_PORT_UUID,
            values: HashMap::new(),
            responder: Box::new(responder),
            events: EventQueue::new(),
            subscriptions: Subscriptions::default(),
            writes: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    /// Echoes every command back, split into MTU sized packets.
    pub fn loopback(latency: Duration) -> Self {
        Self::new(move |command| {
            command
                .chunks(MIN_MTU_PAYLOAD)
                .enumerate()
                .map(|(i, chunk)| Packet::new(latency + Duration::from_millis(5 * i as u64), chunk))
                .collect()
        })
        .with_characteristic(
            DEVICE_INFORMATION_SERVICE_UUID,
            MODEL_NUMBER_UUID,
            b"Bluno Simulator".to_vec(),
        )
    }

    /// Adds a readable characteristic.
    pub fn with_characteristic(mut self, service: Uuid, uuid: Uuid, value: Vec<u8>) -> Self {
        self.characteristics.push(Characteristic { service, uuid });
        self.values.insert(uuid, value);
        self
    }

    /// Makes every following write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Simulates the device going away.
    pub fn drop_connection(&self) {
        let _ = self.events.sender().send(PumpEvent::Disconnected);
    }

    /// Pushes an unsolicited notification.
    pub fn notify(&self, data: &[u8]) {
        let _ = self.events.sender().send(PumpEvent::Notification {
            uuid: self.notify,
            value: data.to_vec(),
        });
    }

    /// Everything written so far.
    pub fn writes(&self) -> Vec<(Characteristic, Vec<u8>)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Peripheral for SimulatedPeripheral {
    fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.service == service && c.uuid == characteristic)
            .copied()
            .ok_or(PeripheralError::CharacteristicNotFound {
                service,
                characteristic,
            })
    }

    fn subscribe(
        &self,
        characteristic: &Characteristic,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<()> {
        self.subscriptions.add(characteristic.uuid, sink);
        Ok(())
    }

    fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        _with_response: bool,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(PeripheralError::Disconnected);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PeripheralError::Transport("simulated write failure".into()));
        }

        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((*characteristic, data.to_vec()));

        let mut packets = (self.responder)(data);
        packets.sort_by_key(|packet| packet.at);

        let tx = self.events.sender();
        let uuid = self.notify;
        let start = Instant::now();
        thread::spawn(move || {
            for packet in packets {
                let elapsed = start.elapsed();
                if packet.at > elapsed {
                    thread::sleep(packet.at - elapsed);
                }
                if tx
                    .send(PumpEvent::Notification {
                        uuid,
                        value: packet.data,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(())
    }

    fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        self.values
            .get(&characteristic.uuid)
            .cloned()
            .ok_or_else(|| {
                PeripheralError::Transport(format!("{} is not readable", characteristic))
            })
    }

    fn pump_events(&self, timeout: Duration) -> Result<bool> {
        if !self.is_connected() {
            return Err(PeripheralError::Disconnected);
        }

        match self.events.wait(timeout) {
            Some(PumpEvent::Notification { uuid, value }) => {
                Ok(self.subscriptions.dispatch(uuid, &value))
            }
            Some(PumpEvent::Wake) | None => Ok(false),
            Some(PumpEvent::Disconnected) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(PeripheralError::Disconnected)
            }
        }
    }

    fn waker(&self) -> Waker {
        self.events.waker()
    }

    fn disconnect(&self) -> Result<()> {
        info!("simulated peripheral disconnected");
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Console fed from a fixed list of lines, recording everything printed.
#[derive(Debug, Default, Clone)]
pub struct ScriptedConsole {
    input: Arc<Mutex<VecDeque<String>>>,
    output: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConsole {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: Arc::new(Mutex::new(lines.into_iter().map(Into::into).collect())),
            output: Arc::default(),
        }
    }

    pub fn output(&self) -> Vec<String> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for ScriptedConsole {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front())
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}
