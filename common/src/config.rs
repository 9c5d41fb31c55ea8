use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Flat,
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowSection {
    #[default]
    Desired,
    Reported,
}

impl ShadowSection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desired => "desired",
            Self::Reported => "reported",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RearmPolicy {
    #[default]
    Terminal,
    AfterDelay { delay_ms: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub thing_name: String,
    pub client_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            thing_name: "RemoteHVAC".to_string(),
            client_id: "RemoteHVAC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub sync_mode: SyncMode,
    pub shadow_section: ShadowSection,
    pub qos: u8,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    pub rearm: RearmPolicy,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Flat,
            shadow_section: ShadowSection::Desired,
            qos: 1,
            connect_timeout_ms: 12_000,
            operation_timeout_ms: 5_000,
            rearm: RearmPolicy::Terminal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub sensor_period_ms: u64,
    pub control_period_ms: u64,
    pub dial_period_ms: u64,
    pub display_period_ms: u64,
    pub connector_period_ms: u64,
    pub shadow_pacing_ms: u64,
    pub dial_lock_wait_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sensor_period_ms: 5_000,
            control_period_ms: 1,
            dial_period_ms: 1,
            display_period_ms: 1,
            connector_period_ms: 1,
            shadow_pacing_ms: 50,
            dial_lock_wait_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub channel_depth: usize,
    pub shadow_depth: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_depth: 4,
            shadow_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub seed_target_from_first_sample: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            seed_target_from_first_sample: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.connector.sanitize();
        self.timing.sanitize();
        self.bus.sanitize();
        if self.device.client_id.trim().is_empty() {
            self.device.client_id = self.device.thing_name.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let thing = self.device.thing_name.as_str();
        if thing.is_empty() || thing.contains(['/', '+', '#']) {
            return Err(ConfigError::InvalidThingName(thing.to_string()));
        }
        if self.network.mqtt_host.trim().is_empty() {
            return Err(ConfigError::EmptyMqttHost);
        }
        Ok(())
    }
}

impl ConnectorConfig {
    pub fn sanitize(&mut self) {
        self.qos = self.qos.min(1);
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(100, 120_000);
        self.operation_timeout_ms = self.operation_timeout_ms.clamp(50, 60_000);
    }
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        self.sensor_period_ms = self.sensor_period_ms.clamp(100, 3_600_000);
        self.control_period_ms = self.control_period_ms.clamp(1, 1_000);
        self.dial_period_ms = self.dial_period_ms.clamp(1, 1_000);
        self.display_period_ms = self.display_period_ms.clamp(1, 1_000);
        self.connector_period_ms = self.connector_period_ms.clamp(1, 1_000);
        self.shadow_pacing_ms = self.shadow_pacing_ms.min(10_000);
        self.dial_lock_wait_ms = self.dial_lock_wait_ms.min(1_000);
    }
}

impl BusConfig {
    pub fn sanitize(&mut self) {
        self.channel_depth = self.channel_depth.clamp(1, 64);
        self.shadow_depth = self.shadow_depth.clamp(1, 64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let raw = r#"{"device":{"thing_name":"Kitchen","client_id":""},
            "connector":{"sync_mode":"shadow","shadow_section":"reported","qos":2,
            "connect_timeout_ms":1,"operation_timeout_ms":500,
            "rearm":{"policy":"after_delay","delay_ms":2000}}}"#;
        let mut config: RuntimeConfig = serde_json::from_str(raw).unwrap();
        config.sanitize();

        assert_eq!(config.device.client_id, "Kitchen");
        assert_eq!(config.connector.sync_mode, SyncMode::Shadow);
        assert_eq!(config.connector.shadow_section, ShadowSection::Reported);
        assert_eq!(config.connector.qos, 1);
        assert_eq!(config.connector.connect_timeout_ms, 100);
        assert_eq!(
            config.connector.rearm,
            RearmPolicy::AfterDelay { delay_ms: 2_000 }
        );
        assert_eq!(config.bus.channel_depth, 4);
        assert_eq!(config.timing.sensor_period_ms, 5_000);
    }

    #[test]
    fn thing_name_must_be_topic_safe() {
        let mut config = RuntimeConfig::default();
        assert!(config.validate().is_ok());

        config.device.thing_name = "lab/#".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThingName("lab/#".to_string()))
        );
    }

    #[test]
    fn zero_depth_is_raised_to_one() {
        let mut bus = BusConfig {
            channel_depth: 0,
            shadow_depth: 500,
        };
        bus.sanitize();
        assert_eq!(bus.channel_depth, 1);
        assert_eq!(bus.shadow_depth, 64);
    }
}
