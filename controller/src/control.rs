use tracing::info;

use remote_hvac_common::{HvacEngine, LoopPhase, StatusUpdate};

use crate::{
    bus::{ConnectorOutlets, ControlInlets, DisplayOutlets, Outlet},
    peripherals::ButtonPanel,
};

#[derive(Debug, Default)]
pub struct ButtonEdge {
    pressed: bool,
}

impl ButtonEdge {
    pub fn update(&mut self, level: bool) -> bool {
        let released = self.pressed && !level;
        self.pressed = level;
        released
    }
}

pub struct StatusSinks {
    pub display: DisplayOutlets,
    pub connector: ConnectorOutlets,
    pub dial_target: Outlet<f32>,
}

impl StatusSinks {
    fn publish(&self, update: StatusUpdate) {
        info!("{}", update.log_line());
        match update {
            StatusUpdate::Fan(fan) => {
                self.display.fan.try_send(fan);
                self.connector.fan.try_send(fan);
            }
            StatusUpdate::Conditioning(mode) => {
                self.display.conditioning.try_send(mode);
                self.connector.conditioning.try_send(mode);
            }
            StatusUpdate::Sensor(sample) => {
                self.display.sensor.try_send(sample);
                self.connector.sensor.try_send(sample);
            }
            StatusUpdate::Target(target) => {
                self.display.target.try_send(target);
                self.connector.target.try_send(target);
                self.dial_target.try_send(target);
            }
        }
    }
}

pub struct ControlLoop<B> {
    engine: HvacEngine,
    buttons: B,
    power: ButtonEdge,
    fan: ButtonEdge,
    inlets: ControlInlets,
    sinks: StatusSinks,
}

impl<B: ButtonPanel> ControlLoop<B> {
    pub fn new(buttons: B, inlets: ControlInlets, sinks: StatusSinks) -> Self {
        Self {
            engine: HvacEngine::new(),
            buttons,
            power: ButtonEdge::default(),
            fan: ButtonEdge::default(),
            inlets,
            sinks,
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> &HvacEngine {
        &self.engine
    }

    pub fn tick(&mut self) {
        if self.engine.phase() == LoopPhase::Init {
            self.engine.start();
            info!("control loop active");
            return;
        }

        let mut updates = Vec::new();

        if self.power.update(self.buttons.power_level()) {
            updates.extend(self.engine.on_power_button());
        }
        if self.fan.update(self.buttons.fan_level()) {
            updates.extend(self.engine.on_fan_button());
        }
        if let Some(fan) = self.inlets.fan.try_recv() {
            updates.extend(self.engine.apply_fan_directive(fan));
        }
        if let Some(sample) = self.inlets.sensor.try_recv() {
            updates.extend(self.engine.update_sensor(sample));
        }
        if let Some(target) = self.inlets.target.try_recv() {
            updates.extend(self.engine.set_target(target));
        }

        for update in updates {
            self.sinks.publish(update);
        }
    }
}
