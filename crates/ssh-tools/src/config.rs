use serde::{Deserialize, Serialize};

/// Device login material. Shared by every host this adapter reaches; the
/// target host itself arrives per call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceConfig {
    pub username: String,
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect/read timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    60
}
