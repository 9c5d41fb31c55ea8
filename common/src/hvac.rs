use crate::{
    types::{ConditioningMode, FanState, SensorSample},
    wire::StatusUpdate,
};

/// Band for switching an active mode off.
pub const ACTIVE_THRESHOLD: f32 = 0.5;
/// Band for switching a mode on.
pub const INACTIVE_THRESHOLD: f32 = ACTIVE_THRESHOLD + 1.0;
/// A pass that switches a mode off is followed by exactly one more pass.
const EVALUATION_PASSES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Init,
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    pub fan: FanState,
    pub conditioning: ConditioningMode,
    pub enabled: bool,
    pub target_temperature: f32,
    pub last_sample: SensorSample,
    pub fan_backup: FanState,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            fan: FanState::Off,
            conditioning: ConditioningMode::Off,
            enabled: false,
            target_temperature: 0.0,
            last_sample: SensorSample::default(),
            fan_backup: FanState::Off,
        }
    }
}

/// One hysteresis pass. Never moves directly between heating and cooling.
pub fn conditioning_step(mode: ConditioningMode, current: f32, target: f32) -> ConditioningMode {
    match mode {
        ConditioningMode::Off => {
            if current + INACTIVE_THRESHOLD < target {
                ConditioningMode::Heating
            } else if current - INACTIVE_THRESHOLD > target {
                ConditioningMode::Cooling
            } else {
                ConditioningMode::Off
            }
        }
        ConditioningMode::Cooling => {
            if current + ACTIVE_THRESHOLD < target {
                ConditioningMode::Off
            } else {
                ConditioningMode::Cooling
            }
        }
        ConditioningMode::Heating => {
            if current - ACTIVE_THRESHOLD > target {
                ConditioningMode::Off
            } else {
                ConditioningMode::Heating
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct HvacEngine {
    phase: LoopPhase,
    state: ControlState,
}

impl Default for HvacEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HvacEngine {
    pub fn new() -> Self {
        Self {
            phase: LoopPhase::Init,
            state: ControlState::default(),
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn start(&mut self) {
        self.phase = LoopPhase::Active;
    }

    pub fn on_power_button(&mut self) -> Vec<StatusUpdate> {
        let mut updates = Vec::new();

        if self.state.enabled {
            self.state.enabled = false;
            self.state.fan = FanState::Off;
            self.state.conditioning = ConditioningMode::Off;
            updates.push(StatusUpdate::Fan(self.state.fan));
            updates.push(StatusUpdate::Conditioning(self.state.conditioning));
        } else {
            self.state.enabled = true;
            self.state.fan = self.state.fan_backup;
            updates.push(StatusUpdate::Fan(self.state.fan));
            self.push_conditioning_if_changed(&mut updates);
        }

        updates
    }

    pub fn on_fan_button(&mut self) -> Vec<StatusUpdate> {
        self.state.enabled = true;
        self.state.fan = self.state.fan.next();
        self.state.fan_backup = self.state.fan;
        vec![StatusUpdate::Fan(self.state.fan)]
    }

    pub fn apply_fan_directive(&mut self, fan: FanState) -> Vec<StatusUpdate> {
        self.state.enabled = true;
        self.state.fan = fan;
        self.state.fan_backup = fan;
        vec![StatusUpdate::Fan(fan)]
    }

    pub fn update_sensor(&mut self, sample: SensorSample) -> Vec<StatusUpdate> {
        if !sample.is_valid() {
            return Vec::new();
        }

        self.state.last_sample = sample;
        let mut updates = vec![StatusUpdate::Sensor(sample)];
        self.push_conditioning_if_changed(&mut updates);
        updates
    }

    pub fn set_target(&mut self, target: f32) -> Vec<StatusUpdate> {
        if !target.is_finite() {
            return Vec::new();
        }

        self.state.target_temperature = target;
        let mut updates = vec![StatusUpdate::Target(target)];
        self.push_conditioning_if_changed(&mut updates);
        updates
    }

    pub fn evaluate_conditioning(&mut self) -> bool {
        if !self.state.enabled {
            return false;
        }

        let before = self.state.conditioning;
        let current = self.state.last_sample.temperature;
        let target = self.state.target_temperature;

        for _ in 0..EVALUATION_PASSES {
            let mode = self.state.conditioning;
            let next = conditioning_step(mode, current, target);
            self.state.conditioning = next;
            if !(mode != ConditioningMode::Off && next == ConditioningMode::Off) {
                break;
            }
        }

        self.state.conditioning != before
    }

    fn push_conditioning_if_changed(&mut self, updates: &mut Vec<StatusUpdate>) {
        if self.evaluate_conditioning() {
            updates.push(StatusUpdate::Conditioning(self.state.conditioning));
        }
    }
}
