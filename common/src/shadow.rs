use crate::{
    extract::FieldExtractor,
    json::Tokenizer,
    types::ShadowDelta,
    wire::{AIRCON_LABEL, FAN_LABEL, MAX_FIELD_VALUE_LEN, TARGET_T_LABEL},
};

pub const DELTA_PARENT_KEY: &str = "state";
pub const DESIRED_PARENT_KEY: &str = "desired";

pub fn parse_shadow_delta(
    tokenizer: &impl Tokenizer,
    payload: &str,
    parent_key: &str,
) -> Option<ShadowDelta> {
    let tokens = tokenizer.tokenize(payload).ok()?;
    let extractor = FieldExtractor::new(&tokens);
    let scope = extractor.object_after_key(parent_key)?;

    let int_field = |key: &str| {
        extractor
            .field(scope, key, MAX_FIELD_VALUE_LEN)
            .and_then(|raw| raw.trim().parse::<i32>().ok())
    };

    let delta = ShadowDelta {
        target_temperature: int_field(TARGET_T_LABEL),
        fan_request: int_field(FAN_LABEL),
        conditioning_request: int_field(AIRCON_LABEL),
    };

    (!delta.is_empty()).then_some(delta)
}
