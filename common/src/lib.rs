pub mod config;
pub mod dial;
pub mod error;
pub mod extract;
pub mod hvac;
pub mod json;
pub mod shadow;
pub mod topics;
pub mod types;
pub mod wire;

pub use config::{
    BusConfig, ConnectorConfig, ControlConfig, DeviceConfig, NetworkConfig, RearmPolicy,
    RuntimeConfig, ShadowSection, SyncMode, TimingConfig,
};
pub use dial::{DialAccumulator, QuadratureDecoder, Rotation, ThermostatInputState};
pub use error::{ConfigError, TokenizeError, TransportError};
pub use extract::FieldExtractor;
pub use hvac::{ControlState, HvacEngine, LoopPhase};
pub use json::{JsonTokenizer, Token, TokenKind, Tokenizer};
pub use shadow::parse_shadow_delta;
pub use topics::*;
pub use types::{ConditioningMode, Connectivity, ConnectionPhase, FanState, SensorSample, ShadowDelta};
pub use wire::{parse_directive, Directive, StatusUpdate};
