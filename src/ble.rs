#![cfg(feature = "btleplug")]

//! [`Peripheral`] backed by the platform BLE stack through `btleplug`.
//!
//! `btleplug` is async, the terminal is not: the adapter owns a tokio
//! runtime and blocks on it for every request. Notifications are forwarded
//! by a runtime task into the event queue and reach the sinks only when
//! [`Peripheral::pump_events`] is called.

use std::{
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use btleplug::api::{
    BDAddr, Central, Characteristic as GattCharacteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral};
use futures_util::StreamExt;
use log::*;
use tokio::{runtime::Runtime, task::JoinHandle};
use uuid::Uuid;

use crate::{
    events::{EventQueue, PumpEvent, Subscriptions},
    peripheral::{Characteristic, NotificationSink, Peripheral, PeripheralError, Result, Waker},
};

fn transport(e: btleplug::Error) -> PeripheralError {
    PeripheralError::Transport(e.to_string())
}

pub struct BtlePeripheral {
    runtime: Runtime,
    peripheral: PlatformPeripheral,
    events: EventQueue,
    subscriptions: Subscriptions,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BtlePeripheral {
    /// Scans for the device with the given address and connects to it.
    pub fn connect(address: &str, scan_timeout: Duration) -> Result<Self> {
        let address = BDAddr::from_str(address)
            .map_err(|_| PeripheralError::InvalidAddress(address.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| PeripheralError::Transport(e.to_string()))?;

        let peripheral = runtime.block_on(Self::find_and_connect(address, scan_timeout))?;
        info!("connected to {}", address);

        let events = EventQueue::new();
        let mut notifications = runtime
            .block_on(peripheral.notifications())
            .map_err(transport)?;
        let tx = events.sender();
        let forwarder = runtime.spawn(async move {
            while let Some(notification) = notifications.next().await {
                let event = PumpEvent::Notification {
                    uuid: notification.uuid,
                    value: notification.value,
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            let _ = tx.send(PumpEvent::Disconnected);
        });

        Ok(Self {
            runtime,
            peripheral,
            events,
            subscriptions: Subscriptions::default(),
            forwarder: Mutex::new(Some(forwarder)),
        })
    }

    async fn find_and_connect(
        address: BDAddr,
        scan_timeout: Duration,
    ) -> Result<PlatformPeripheral> {
        let manager = Manager::new().await.map_err(transport)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(transport)?
            .into_iter()
            .next()
            .ok_or(PeripheralError::NoAdapter)?;

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(transport)?;
        let found = Self::find_device(&adapter, address, scan_timeout).await;
        if let Err(e) = adapter.stop_scan().await {
            warn!("failed to stop scanning: {}", e);
        }
        let peripheral = found?;

        peripheral.connect().await.map_err(transport)?;
        peripheral.discover_services().await.map_err(transport)?;

        Ok(peripheral)
    }

    async fn find_device(
        adapter: &Adapter,
        address: BDAddr,
        scan_timeout: Duration,
    ) -> Result<PlatformPeripheral> {
        let start = Instant::now();

        while start.elapsed() < scan_timeout {
            let peripherals = adapter.peripherals().await.map_err(transport)?;
            if let Some(peripheral) = peripherals.into_iter().find(|p| p.address() == address) {
                return Ok(peripheral);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(PeripheralError::NotFound {
            address: address.to_string(),
            timeout: scan_timeout,
        })
    }

    fn gatt(&self, characteristic: &Characteristic) -> Result<GattCharacteristic> {
        self.find(characteristic.service, characteristic.uuid)
    }

    fn find(&self, service: Uuid, uuid: Uuid) -> Result<GattCharacteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == uuid)
            .ok_or(PeripheralError::CharacteristicNotFound {
                service,
                characteristic: uuid,
            })
    }
}

impl Peripheral for BtlePeripheral {
    fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic> {
        let gatt = self.find(service, characteristic)?;
        debug!("{} has properties {:?}", gatt.uuid, gatt.properties);
        Ok(Characteristic {
            service,
            uuid: characteristic,
        })
    }

    fn subscribe(
        &self,
        characteristic: &Characteristic,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<()> {
        let gatt = self.gatt(characteristic)?;
        self.runtime
            .block_on(self.peripheral.subscribe(&gatt))
            .map_err(transport)?;
        self.subscriptions.add(characteristic.uuid, sink);
        Ok(())
    }

    fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        with_response: bool,
    ) -> Result<()> {
        let gatt = self.gatt(characteristic)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        debug!("writing {} bytes to {}", data.len(), characteristic);
        self.runtime
            .block_on(self.peripheral.write(&gatt, data, write_type))
            .map_err(transport)
    }

    fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        let gatt = self.gatt(characteristic)?;
        self.runtime
            .block_on(self.peripheral.read(&gatt))
            .map_err(transport)
    }

    fn pump_events(&self, timeout: Duration) -> Result<bool> {
        match self.events.wait(timeout) {
            Some(PumpEvent::Notification { uuid, value }) => {
                Ok(self.subscriptions.dispatch(uuid, &value))
            }
            Some(PumpEvent::Wake) | None => Ok(false),
            Some(PumpEvent::Disconnected) => Err(PeripheralError::Disconnected),
        }
    }

    fn waker(&self) -> Waker {
        self.events.waker()
    }

    fn disconnect(&self) -> Result<()> {
        if let Some(forwarder) = self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            forwarder.abort();
        }
        self.runtime
            .block_on(self.peripheral.disconnect())
            .map_err(transport)
    }
}
