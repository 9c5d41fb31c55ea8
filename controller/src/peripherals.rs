use std::sync::{
    atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, AtomicU64, Ordering},
    Arc, Mutex,
};

use remote_hvac_common::SensorSample;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::display::DisplaySnapshot;

pub trait WeatherSensor: Send {
    fn read_sample(&mut self) -> Option<SensorSample>;
}

pub trait ButtonPanel: Send {
    fn power_level(&mut self) -> bool;
    fn fan_level(&mut self) -> bool;
}

pub trait RotaryEncoder: Send {
    fn read_lines(&mut self) -> (bool, bool);
    fn take_stick_press(&mut self) -> bool;
    fn write_ring(&mut self, pattern: u16);
    fn set_enabled(&mut self, enabled: bool);
}

pub trait DisplayDriver: Send {
    fn draw_state(&mut self, snapshot: &DisplaySnapshot);
}

const BASE_TEMPERATURE: f32 = 21.0;
const BASE_HUMIDITY: f32 = 42.0;
pub const BASE_PRESSURE: f32 = 1013.25;

#[derive(Debug, Default)]
pub struct VirtualHardware {
    power_clicks: AtomicU32,
    fan_clicks: AtomicU32,
    stick_presses: AtomicU32,
    pending_steps: AtomicI32,
    ring: AtomicU16,
    ring_enabled: AtomicBool,
    sensor_override: Mutex<Option<SensorSample>>,
    frames: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingView {
    pub enabled: bool,
    pub pattern: u16,
}

impl VirtualHardware {
    pub fn click_power(&self) {
        self.power_clicks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn click_fan(&self) {
        self.fan_clicks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn press_stick(&self) {
        self.stick_presses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rotate(&self, steps: i32) {
        self.pending_steps.fetch_add(steps, Ordering::Relaxed);
    }

    pub fn set_sensor_override(&self, sample: Option<SensorSample>) {
        *self
            .sensor_override
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = sample;
    }

    pub fn ring(&self) -> RingView {
        RingView {
            enabled: self.ring_enabled.load(Ordering::Relaxed),
            pattern: self.ring.load(Ordering::Relaxed),
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn sensor_override(&self) -> Option<SensorSample> {
        *self
            .sensor_override
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| count.checked_sub(1))
        .is_ok()
}

pub struct SimulatedWeather {
    hardware: Arc<VirtualHardware>,
    tick: u32,
}

impl SimulatedWeather {
    pub fn new(hardware: Arc<VirtualHardware>) -> Self {
        Self { hardware, tick: 0 }
    }
}

impl WeatherSensor for SimulatedWeather {
    fn read_sample(&mut self) -> Option<SensorSample> {
        if let Some(sample) = self.hardware.sensor_override() {
            return Some(sample);
        }

        self.tick = self.tick.wrapping_add(1);
        let temperature = BASE_TEMPERATURE + (self.tick % 8) as f32 * 0.2;
        let humidity = BASE_HUMIDITY + (self.tick % 6) as f32 * 0.5;
        Some(SensorSample::new(temperature, humidity, BASE_PRESSURE))
    }
}

pub struct VirtualButtons {
    hardware: Arc<VirtualHardware>,
    power_down: bool,
    fan_down: bool,
}

impl VirtualButtons {
    pub fn new(hardware: Arc<VirtualHardware>) -> Self {
        Self {
            hardware,
            power_down: false,
            fan_down: false,
        }
    }
}

fn click_level(pending: &AtomicU32, down: &mut bool) -> bool {
    if *down {
        *down = false;
        return false;
    }
    *down = take_one(pending);
    *down
}

impl ButtonPanel for VirtualButtons {
    fn power_level(&mut self) -> bool {
        click_level(&self.hardware.power_clicks, &mut self.power_down)
    }

    fn fan_level(&mut self) -> bool {
        click_level(&self.hardware.fan_clicks, &mut self.fan_down)
    }
}

/// Gray-code sequence for clockwise rotation: 00 -> 10 -> 11 -> 01 -> 00.
const CW_SEQUENCE: [(bool, bool); 4] = [(false, false), (true, false), (true, true), (false, true)];

pub struct VirtualRotary {
    hardware: Arc<VirtualHardware>,
    phase: usize,
}

impl VirtualRotary {
    pub fn new(hardware: Arc<VirtualHardware>) -> Self {
        Self { hardware, phase: 0 }
    }
}

impl RotaryEncoder for VirtualRotary {
    fn read_lines(&mut self) -> (bool, bool) {
        let pending = &self.hardware.pending_steps;
        let step = pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |steps| match steps {
                0 => None,
                s if s > 0 => Some(s - 1),
                s => Some(s + 1),
            })
            .ok();

        match step {
            Some(previous) if previous > 0 => self.phase = (self.phase + 1) % CW_SEQUENCE.len(),
            Some(_) => self.phase = (self.phase + CW_SEQUENCE.len() - 1) % CW_SEQUENCE.len(),
            None => {}
        }
        CW_SEQUENCE[self.phase]
    }

    fn take_stick_press(&mut self) -> bool {
        take_one(&self.hardware.stick_presses)
    }

    fn write_ring(&mut self, pattern: u16) {
        self.hardware.ring.store(pattern, Ordering::Relaxed);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.hardware.ring_enabled.store(enabled, Ordering::Relaxed);
    }
}

pub struct LogDisplay {
    hardware: Arc<VirtualHardware>,
    frames: watch::Sender<DisplaySnapshot>,
}

impl LogDisplay {
    pub fn new(
        hardware: Arc<VirtualHardware>,
        frames: watch::Sender<DisplaySnapshot>,
    ) -> Self {
        Self { hardware, frames }
    }
}

impl DisplayDriver for LogDisplay {
    fn draw_state(&mut self, snapshot: &DisplaySnapshot) {
        info!(
            fan = snapshot.fan.as_str(),
            conditioning = snapshot.conditioning.as_str(),
            temperature = snapshot.sensor.map(|sample| sample.temperature),
            setpoint = snapshot.target,
            connectivity = ?snapshot.connectivity,
            "display frame"
        );
        self.hardware.frames.fetch_add(1, Ordering::Relaxed);
        self.frames.send_replace(*snapshot);
    }
}
