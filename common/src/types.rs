use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanState {
    #[default]
    Off,
    Low,
    High,
}

impl FanState {
    pub const ALL: [FanState; 3] = [Self::Off, Self::Low, Self::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Low => "low",
            Self::High => "high",
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Self::Off),
            1 => Some(Self::Low),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|fan| fan.as_str() == label)
    }

    /// Off -> Low -> High -> Off.
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Low,
            Self::Low => Self::High,
            Self::High => Self::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditioningMode {
    #[default]
    Off,
    Heating,
    Cooling,
}

impl ConditioningMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heating => "heat",
            Self::Cooling => "cool",
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Self::Off),
            1 => Some(Self::Heating),
            2 => Some(Self::Cooling),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSample {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
}

impl SensorSample {
    pub fn new(temperature: f32, humidity: f32, pressure: f32) -> Self {
        Self {
            temperature,
            humidity,
            pressure,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.temperature.is_finite() && self.humidity.is_finite() && self.pressure.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionPhase {
    #[default]
    Init,
    PreActive,
    Active,
    PostActive,
    Inactive,
}

impl ConnectionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::PreActive => "PRE_ACTIVE",
            Self::Active => "ACTIVE",
            Self::PostActive => "POST_ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ShadowDelta {
    #[serde(rename = "targetTemperature")]
    pub target_temperature: Option<i32>,
    #[serde(rename = "fanRequest")]
    pub fan_request: Option<i32>,
    #[serde(rename = "conditioningRequest")]
    pub conditioning_request: Option<i32>,
}

impl ShadowDelta {
    pub fn is_empty(&self) -> bool {
        self.target_temperature.is_none()
            && self.fan_request.is_none()
            && self.conditioning_request.is_none()
    }
}
