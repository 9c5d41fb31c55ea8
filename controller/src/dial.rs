use std::time::Duration;

use tracing::{debug, info};

use remote_hvac_common::{
    dial::{RING_ENGAGED, RING_OFF},
    DialAccumulator, QuadratureDecoder,
};

use crate::{
    bus::{BusGuard, Inlet, Outlet, SharedBus},
    peripherals::RotaryEncoder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialPhase {
    Init,
    Inactive,
    PreActive,
    Active,
    PostActive,
}

pub struct DialInput<R> {
    phase: DialPhase,
    encoder: R,
    decoder: QuadratureDecoder,
    accumulator: DialAccumulator,
    bus: SharedBus,
    guard: Option<BusGuard>,
    lock_wait: Duration,
    current_target: f32,
    target_updates: Inlet<f32>,
    hvac_target: Outlet<f32>,
}

impl<R: RotaryEncoder> DialInput<R> {
    pub fn new(
        mut encoder: R,
        bus: SharedBus,
        lock_wait: Duration,
        target_updates: Inlet<f32>,
        hvac_target: Outlet<f32>,
    ) -> Self {
        let (a, b) = encoder.read_lines();
        Self {
            phase: DialPhase::Init,
            encoder,
            decoder: QuadratureDecoder::new(a, b),
            accumulator: DialAccumulator::default(),
            bus,
            guard: None,
            lock_wait,
            current_target: 0.0,
            target_updates,
            hvac_target,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> DialPhase {
        self.phase
    }

    #[cfg(test)]
    pub fn accumulator(&self) -> &DialAccumulator {
        &self.accumulator
    }

    pub async fn tick(&mut self) {
        while let Some(target) = self.target_updates.try_recv() {
            self.current_target = target;
        }

        // The decoder tracks every edge so the first engaged step has a
        // valid history.
        let (a, b) = self.encoder.read_lines();
        let rotation = self.decoder.decode(a, b);
        let pressed = self.encoder.take_stick_press();

        match self.phase {
            DialPhase::Init => self.enter(DialPhase::Inactive),
            DialPhase::Inactive => {
                if pressed {
                    self.enter(DialPhase::PreActive);
                }
            }
            DialPhase::PreActive => {
                let Some(guard) = self.bus.acquire_within(self.lock_wait).await else {
                    debug!(bus = self.bus.name(), "dial bus busy, engage retried");
                    return;
                };
                self.guard = Some(guard);
                self.encoder.set_enabled(true);
                self.encoder.write_ring(RING_ENGAGED);
                self.accumulator.engage(self.current_target);
                self.enter(DialPhase::Active);
            }
            DialPhase::Active => {
                if pressed {
                    self.enter(DialPhase::PostActive);
                } else if self.accumulator.apply(rotation) {
                    let input = self.accumulator.input();
                    debug!(rotation = ?input.rotation, position = input.position, "dial step");
                    self.encoder.write_ring(self.accumulator.ring_pattern());
                }
            }
            DialPhase::PostActive => {
                self.encoder.write_ring(RING_OFF);
                self.encoder.set_enabled(false);
                let target = self.accumulator.target();
                info!(setpoint = target, "dial released");
                self.hvac_target.try_send(target);
                self.accumulator.reset();
                self.guard = None;
                self.enter(DialPhase::Inactive);
            }
        }
    }

    fn enter(&mut self, next: DialPhase) {
        info!(from = ?self.phase, to = ?next, "dial phase change");
        self.phase = next;
    }
}
