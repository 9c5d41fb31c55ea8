use crate::{
    config::ShadowSection,
    extract::FieldExtractor,
    json::Tokenizer,
    types::{ConditioningMode, FanState, SensorSample},
};

pub const FAN_LABEL: &str = "FAN";
pub const AIRCON_LABEL: &str = "AIRCON";
pub const SENSOR_T_LABEL: &str = "SENSOR_T";
pub const SENSOR_H_LABEL: &str = "SENSOR_H";
pub const TARGET_T_LABEL: &str = "TARGET_T";

/// Inbound payloads at or above this size are dropped unparsed.
pub const MAX_INBOUND_PAYLOAD_BYTES: usize = 256;
pub const MAX_FIELD_VALUE_LEN: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusUpdate {
    Fan(FanState),
    Conditioning(ConditioningMode),
    Sensor(SensorSample),
    Target(f32),
}

impl StatusUpdate {
    fn fields(&self) -> String {
        match self {
            Self::Fan(fan) => format!("\"{FAN_LABEL}\":\"{}\"", fan.as_str()),
            Self::Conditioning(mode) => format!("\"{AIRCON_LABEL}\":\"{}\"", mode.as_str()),
            Self::Sensor(sample) => format!(
                "\"{SENSOR_T_LABEL}\":\"{:.1}\", \"{SENSOR_H_LABEL}\":\"{:.1}\"",
                sample.temperature, sample.humidity
            ),
            Self::Target(target) => format!("\"{TARGET_T_LABEL}\":\"{target:.1}\""),
        }
    }

    pub fn to_flat_payload(&self) -> String {
        format!("{{{}}}", self.fields())
    }

    pub fn to_shadow_payload(&self, section: ShadowSection) -> String {
        format!(
            "{{\"state\":{{\"{}\":{{{}}}}}}}",
            section.as_str(),
            self.fields()
        )
    }

    pub fn log_line(&self) -> String {
        format!("<{}>", self.fields())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Directive {
    pub target: Option<f32>,
    pub fan: Option<FanState>,
}

impl Directive {
    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.fan.is_none()
    }
}

pub fn parse_directive(tokenizer: &impl Tokenizer, payload: &str) -> Directive {
    let Ok(tokens) = tokenizer.tokenize(payload) else {
        return Directive::default();
    };
    let extractor = FieldExtractor::new(&tokens);
    let Some(root) = extractor.root() else {
        return Directive::default();
    };

    let target = extractor
        .field(root, TARGET_T_LABEL, MAX_FIELD_VALUE_LEN)
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|value| value.is_finite());
    let fan = extractor
        .field(root, FAN_LABEL, MAX_FIELD_VALUE_LEN)
        .and_then(FanState::from_label);

    Directive { target, fan }
}
