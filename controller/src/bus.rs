use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::debug;

use remote_hvac_common::{
    BusConfig, ConditioningMode, Connectivity, FanState, SensorSample, ShadowDelta,
};

use crate::connector::ConnectorRequest;

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub name: &'static str,
    pub capacity: usize,
    pub sent: u64,
    pub dropped: u64,
}

pub struct Outlet<T> {
    name: &'static str,
    capacity: usize,
    tx: mpsc::Sender<T>,
    counters: Arc<Counters>,
}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T> Outlet<T> {
    /// Enqueues `value` if there is room. Returns false when it was dropped.
    pub fn try_send(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(channel = self.name, "channel full, value dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            name: self.name,
            capacity: self.capacity,
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct Inlet<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Inlet<T> {
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

pub fn channel<T>(name: &'static str, capacity: usize) -> (Outlet<T>, Inlet<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        Outlet {
            name,
            capacity,
            tx,
            counters: Arc::new(Counters::default()),
        },
        Inlet { rx },
    )
}

pub type BusGuard = OwnedMutexGuard<()>;

#[derive(Clone)]
pub struct SharedBus {
    name: &'static str,
    lock: Arc<Mutex<()>>,
}

impl SharedBus {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn try_acquire(&self) -> Option<BusGuard> {
        Arc::clone(&self.lock).try_lock_owned().ok()
    }

    pub async fn acquire_within(&self, wait: Duration) -> Option<BusGuard> {
        tokio::time::timeout(wait, Arc::clone(&self.lock).lock_owned())
            .await
            .ok()
    }
}

#[derive(Clone)]
pub struct DisplayOutlets {
    pub fan: Outlet<FanState>,
    pub conditioning: Outlet<ConditioningMode>,
    pub sensor: Outlet<SensorSample>,
    pub target: Outlet<f32>,
    pub connection: Outlet<Connectivity>,
}

#[derive(Clone)]
pub struct ConnectorOutlets {
    pub fan: Outlet<FanState>,
    pub conditioning: Outlet<ConditioningMode>,
    pub sensor: Outlet<SensorSample>,
    pub target: Outlet<f32>,
}

#[derive(Clone)]
pub struct BusOutlets {
    pub hvac_fan: Outlet<FanState>,
    pub hvac_sensor: Outlet<SensorSample>,
    pub hvac_target: Outlet<f32>,
    pub connector: ConnectorOutlets,
    pub display: DisplayOutlets,
    pub shadow_delta: Outlet<ShadowDelta>,
    pub dial_target: Outlet<f32>,
    pub connector_requests: Outlet<ConnectorRequest>,
}

impl BusOutlets {
    pub fn stats(&self) -> Vec<ChannelStats> {
        vec![
            self.hvac_fan.stats(),
            self.hvac_sensor.stats(),
            self.hvac_target.stats(),
            self.connector.fan.stats(),
            self.connector.conditioning.stats(),
            self.connector.sensor.stats(),
            self.connector.target.stats(),
            self.display.fan.stats(),
            self.display.conditioning.stats(),
            self.display.sensor.stats(),
            self.display.target.stats(),
            self.display.connection.stats(),
            self.shadow_delta.stats(),
            self.dial_target.stats(),
            self.connector_requests.stats(),
        ]
    }
}

pub struct ControlInlets {
    pub fan: Inlet<FanState>,
    pub sensor: Inlet<SensorSample>,
    pub target: Inlet<f32>,
}

pub struct ConnectorInlets {
    pub fan: Inlet<FanState>,
    pub conditioning: Inlet<ConditioningMode>,
    pub sensor: Inlet<SensorSample>,
    pub target: Inlet<f32>,
    pub requests: Inlet<ConnectorRequest>,
}

pub struct DisplayInlets {
    pub fan: Inlet<FanState>,
    pub conditioning: Inlet<ConditioningMode>,
    pub sensor: Inlet<SensorSample>,
    pub target: Inlet<f32>,
    pub connection: Inlet<Connectivity>,
}

pub struct Bus {
    pub outlets: BusOutlets,
    pub control: ControlInlets,
    pub connector: ConnectorInlets,
    pub display: DisplayInlets,
    pub shadow_delta: Inlet<ShadowDelta>,
    pub dial_target: Inlet<f32>,
    pub spi1: SharedBus,
    pub spi2: SharedBus,
}

impl Bus {
    pub fn new(config: &BusConfig) -> Self {
        let depth = config.channel_depth;

        let (hvac_fan, control_fan) = channel("hvac_fan", depth);
        let (hvac_sensor, control_sensor) = channel("hvac_sensor", depth);
        let (hvac_target, control_target) = channel("hvac_target", depth);

        let (conn_fan, conn_fan_in) = channel("conn_fan", depth);
        let (conn_conditioning, conn_conditioning_in) = channel("conn_conditioning", depth);
        let (conn_sensor, conn_sensor_in) = channel("conn_sensor", depth);
        let (conn_target, conn_target_in) = channel("conn_target", depth);
        let (connector_requests, requests_in) = channel("connector_requests", depth);

        let (display_fan, display_fan_in) = channel("display_fan", depth);
        let (display_conditioning, display_conditioning_in) =
            channel("display_conditioning", depth);
        let (display_sensor, display_sensor_in) = channel("display_sensor", depth);
        let (display_target, display_target_in) = channel("display_target", depth);
        let (display_connection, display_connection_in) = channel("display_connection", depth);

        let (shadow_delta, shadow_delta_in) = channel("shadow_delta", config.shadow_depth);
        let (dial_target, dial_target_in) = channel("dial_target", depth);

        Self {
            outlets: BusOutlets {
                hvac_fan,
                hvac_sensor,
                hvac_target,
                connector: ConnectorOutlets {
                    fan: conn_fan,
                    conditioning: conn_conditioning,
                    sensor: conn_sensor,
                    target: conn_target,
                },
                display: DisplayOutlets {
                    fan: display_fan,
                    conditioning: display_conditioning,
                    sensor: display_sensor,
                    target: display_target,
                    connection: display_connection,
                },
                shadow_delta,
                dial_target,
                connector_requests,
            },
            control: ControlInlets {
                fan: control_fan,
                sensor: control_sensor,
                target: control_target,
            },
            connector: ConnectorInlets {
                fan: conn_fan_in,
                conditioning: conn_conditioning_in,
                sensor: conn_sensor_in,
                target: conn_target_in,
                requests: requests_in,
            },
            display: DisplayInlets {
                fan: display_fan_in,
                conditioning: display_conditioning_in,
                sensor: display_sensor_in,
                target: display_target_in,
                connection: display_connection_in,
            },
            shadow_delta: shadow_delta_in,
            dial_target: dial_target_in,
            spi1: SharedBus::new("spi1"),
            spi2: SharedBus::new("spi2"),
        }
    }
}
