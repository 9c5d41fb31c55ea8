use serde::Serialize;
use tracing::{debug, info};

use remote_hvac_common::{ConditioningMode, Connectivity, FanState, SensorSample};

use crate::{
    bus::{DisplayInlets, SharedBus},
    peripherals::DisplayDriver,
};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DisplaySnapshot {
    pub fan: FanState,
    pub conditioning: ConditioningMode,
    pub sensor: Option<SensorSample>,
    pub target: Option<f32>,
    pub connectivity: Connectivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPhase {
    Init,
    Active,
}

pub struct DisplaySink<D> {
    phase: DisplayPhase,
    driver: D,
    inlets: DisplayInlets,
    bus: SharedBus,
    snapshot: DisplaySnapshot,
    dirty: bool,
}

impl<D: DisplayDriver> DisplaySink<D> {
    pub fn new(driver: D, inlets: DisplayInlets, bus: SharedBus) -> Self {
        Self {
            phase: DisplayPhase::Init,
            driver,
            inlets,
            bus,
            snapshot: DisplaySnapshot::default(),
            dirty: false,
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &DisplaySnapshot {
        &self.snapshot
    }

    pub fn tick(&mut self) {
        match self.phase {
            DisplayPhase::Init => {
                info!("display ready");
                self.phase = DisplayPhase::Active;
                self.dirty = true;
            }
            DisplayPhase::Active => {
                self.collect();
                if self.dirty {
                    self.redraw();
                }
            }
        }
    }

    fn collect(&mut self) {
        if let Some(fan) = self.inlets.fan.try_recv() {
            self.snapshot.fan = fan;
            self.dirty = true;
        }
        if let Some(mode) = self.inlets.conditioning.try_recv() {
            self.snapshot.conditioning = mode;
            self.dirty = true;
        }
        if let Some(sample) = self.inlets.sensor.try_recv() {
            self.snapshot.sensor = Some(sample);
            self.dirty = true;
        }
        if let Some(target) = self.inlets.target.try_recv() {
            self.snapshot.target = Some(target);
            self.dirty = true;
        }
        if let Some(connectivity) = self.inlets.connection.try_recv() {
            self.snapshot.connectivity = connectivity;
            self.dirty = true;
        }
    }

    fn redraw(&mut self) {
        let Some(_guard) = self.bus.try_acquire() else {
            debug!(bus = self.bus.name(), "display bus busy, redraw deferred");
            return;
        };
        self.driver.draw_state(&self.snapshot);
        self.dirty = false;
    }
}
