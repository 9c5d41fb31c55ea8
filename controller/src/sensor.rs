use tracing::{debug, info, warn};

use remote_hvac_common::SensorSample;

use crate::{
    bus::{Outlet, SharedBus},
    peripherals::WeatherSensor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Init,
    PreActive,
    Active,
}

pub struct SensorFeed<S> {
    phase: FeedPhase,
    sensor: S,
    bus: SharedBus,
    hvac_sensor: Outlet<SensorSample>,
    hvac_target: Outlet<f32>,
    seed_target: bool,
}

impl<S: WeatherSensor> SensorFeed<S> {
    pub fn new(
        sensor: S,
        bus: SharedBus,
        hvac_sensor: Outlet<SensorSample>,
        hvac_target: Outlet<f32>,
        seed_target: bool,
    ) -> Self {
        Self {
            phase: FeedPhase::Init,
            sensor,
            bus,
            hvac_sensor,
            hvac_target,
            seed_target,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> FeedPhase {
        self.phase
    }

    pub fn tick(&mut self) {
        match self.phase {
            FeedPhase::Init => {
                info!("sensor feed configured");
                self.phase = FeedPhase::PreActive;
            }
            FeedPhase::PreActive => {
                let Some(sample) = self.sample() else {
                    return;
                };
                self.hvac_sensor.try_send(sample);
                if self.seed_target {
                    info!(setpoint = sample.temperature, "seeding setpoint from first sample");
                    self.hvac_target.try_send(sample.temperature);
                }
                self.phase = FeedPhase::Active;
            }
            FeedPhase::Active => {
                if let Some(sample) = self.sample() {
                    self.hvac_sensor.try_send(sample);
                }
            }
        }
    }

    fn sample(&mut self) -> Option<SensorSample> {
        let Some(_guard) = self.bus.try_acquire() else {
            debug!(bus = self.bus.name(), "sensor bus busy, sample skipped");
            return None;
        };
        match self.sensor.read_sample() {
            Some(sample) if sample.is_valid() => Some(sample),
            Some(_) => {
                warn!("discarding non-finite sensor sample");
                None
            }
            None => {
                warn!("sensor read failed");
                None
            }
        }
    }
}
