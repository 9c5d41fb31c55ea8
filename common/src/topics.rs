pub const FLAT_TOPIC_ROOT: &str = "clickdemo";
pub const SHADOW_TOPIC_ROOT: &str = "$aws/things";

pub fn status_topic(thing_name: &str) -> String {
    format!("{FLAT_TOPIC_ROOT}/{}/status", thing_name.to_ascii_lowercase())
}

pub fn directive_topic(thing_name: &str) -> String {
    format!("{FLAT_TOPIC_ROOT}/{}/config", thing_name.to_ascii_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopics {
    pub get: String,
    pub get_accepted: String,
    pub update: String,
    pub update_accepted: String,
    pub update_rejected: String,
    pub update_delta: String,
}

impl ShadowTopics {
    pub fn for_thing(thing_name: &str) -> Self {
        let base = format!("{SHADOW_TOPIC_ROOT}/{thing_name}/shadow");
        Self {
            get: format!("{base}/get"),
            get_accepted: format!("{base}/get/accepted"),
            update: format!("{base}/update"),
            update_accepted: format!("{base}/update/accepted"),
            update_rejected: format!("{base}/update/rejected"),
            update_delta: format!("{base}/update/delta"),
        }
    }
}
