use std::time::Duration;

use tracing::{debug, info, warn};

use remote_hvac_common::{ConditioningMode, FanState, ShadowDelta};

use crate::bus::{Inlet, Outlet};

pub struct ShadowApplier {
    deltas: Inlet<ShadowDelta>,
    hvac_fan: Outlet<FanState>,
    hvac_target: Outlet<f32>,
    pacing: Duration,
}

impl ShadowApplier {
    pub fn new(
        deltas: Inlet<ShadowDelta>,
        hvac_fan: Outlet<FanState>,
        hvac_target: Outlet<f32>,
        pacing: Duration,
    ) -> Self {
        Self {
            deltas,
            hvac_fan,
            hvac_target,
            pacing,
        }
    }

    pub async fn run(mut self) {
        while let Some(delta) = self.deltas.recv().await {
            self.apply(delta).await;
        }
        debug!("shadow delta queue closed");
    }

    pub async fn apply(&self, delta: ShadowDelta) {
        if let Some(request) = delta.fan_request {
            match FanState::from_index(request) {
                Some(fan) => {
                    info!(fan = fan.as_str(), "applying shadow fan request");
                    self.hvac_fan.try_send(fan);
                }
                None => warn!(request, "ignoring out of range fan request"),
            }
        }

        tokio::time::sleep(self.pacing).await;

        if let Some(target) = delta.target_temperature {
            info!(setpoint = target, "applying shadow target");
            self.hvac_target.try_send(target as f32);
        }

        if let Some(request) = delta.conditioning_request {
            match ConditioningMode::from_index(request) {
                Some(mode) => info!(mode = mode.as_str(), "conditioning request is reported only"),
                None => warn!(request, "ignoring out of range conditioning request"),
            }
        }
    }
}
