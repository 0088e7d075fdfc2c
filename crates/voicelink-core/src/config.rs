use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub recognition: Option<ServiceConfig>,

    #[serde(default)]
    pub synthesis: Option<ServiceConfig>,

    #[serde(default)]
    pub providers: Option<toml::Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_frame_size")]
    pub frame_size: u32,

    #[serde(default = "default_wire_rate")]
    pub target_sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            frame_size: default_frame_size(),
            target_sample_rate: default_wire_rate(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaybackConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_wire_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            sample_rate: default_wire_rate(),
            channels: default_channels(),
        }
    }
}

/// What `open()` does when a session is already active. The two observed
/// provider frontends disagree here, so the choice is explicit per install.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Fully close the existing session, then open the new one.
    Preempt,
    /// Refuse the new session while one is active.
    Reject,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_busy_policy")]
    pub on_busy: BusyPolicy,

    /// When false, provider failures are logged but not surfaced as events.
    #[serde(default = "default_true")]
    pub surface_failures: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            on_busy: default_busy_policy(),
            surface_failures: default_true(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub provider: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_name() -> String {
    "default".to_string()
}

fn default_frame_size() -> u32 {
    4096
}

fn default_wire_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_busy_policy() -> BusyPolicy {
    BusyPolicy::Preempt
}

fn default_true() -> bool {
    true
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                errors.push(var_name.to_string());
            }
        }
    }

    if let Some(first_missing) = errors.into_iter().next() {
        return Err(ConfigError::EnvVarNotFound(first_missing));
    }

    Ok(result)
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let interpolated = interpolate_env_vars(&content)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (for testing).
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }

    /// The opaque `[providers.<name>]` table for one adapter, or an empty
    /// table when none is configured.
    pub fn provider_config(&self, name: &str) -> toml::Value {
        self.providers
            .as_ref()
            .and_then(|p| p.get(name))
            .cloned()
            .unwrap_or_else(|| toml::Value::Table(Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse_valid_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[capture]
device_name = "USB Microphone"
frame_size = 2048
target_sample_rate = 8000

[playback]
device_name = "speakers"
sample_rate = 24000
channels = 2

[session]
on_busy = "reject"
surface_failures = false

[recognition]
provider = "aliyun-asr"

[synthesis]
provider = "aliyun-tts"

[providers.aliyun-asr]
token = "tok"
app_key = "key"
"#;
        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.capture.device_name, "USB Microphone");
        assert_eq!(config.capture.frame_size, 2048);
        assert_eq!(config.capture.target_sample_rate, 8000);
        assert_eq!(config.playback.sample_rate, 24000);
        assert_eq!(config.playback.channels, 2);
        assert_eq!(config.session.on_busy, BusyPolicy::Reject);
        assert!(!config.session.surface_failures);
        assert_eq!(config.recognition.unwrap().provider, "aliyun-asr");
        assert_eq!(config.synthesis.unwrap().provider, "aliyun-tts");
    }

    #[test]
    fn test_config_parse_minimal_toml() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.capture.device_name, "default");
        assert_eq!(config.capture.frame_size, 4096);
        assert_eq!(config.capture.target_sample_rate, 16000);
        assert_eq!(config.playback.sample_rate, 16000);
        assert_eq!(config.playback.channels, 1);
        assert_eq!(config.session.on_busy, BusyPolicy::Preempt);
        assert!(config.session.surface_failures);
        assert!(config.recognition.is_none());
        assert!(config.synthesis.is_none());
    }

    #[test]
    fn test_config_env_var_interpolation() {
        std::env::set_var("VOICELINK_TEST_TOKEN", "secret123");
        let toml_str = r#"
[providers.aliyun-asr]
token = "${VOICELINK_TEST_TOKEN}"
"#;
        let config = AppConfig::from_toml_str(toml_str).unwrap();
        let provider = config.provider_config("aliyun-asr");
        assert_eq!(
            provider.get("token").and_then(|v| v.as_str()),
            Some("secret123")
        );
        std::env::remove_var("VOICELINK_TEST_TOKEN");
    }

    #[test]
    fn test_config_missing_env_var_fails() {
        let toml_str = r#"
[providers.aliyun-asr]
token = "${VOICELINK_TEST_MISSING_VAR}"
"#;
        let result = AppConfig::from_toml_str(toml_str);
        match result {
            Err(ConfigError::EnvVarNotFound(name)) => {
                assert_eq!(name, "VOICELINK_TEST_MISSING_VAR");
            }
            _ => panic!("expected EnvVarNotFound"),
        }
    }

    #[test]
    fn test_provider_config_missing_returns_empty_table() {
        let config = AppConfig::from_toml_str("").unwrap();
        let value = config.provider_config("baidu-asr");
        assert!(value.as_table().map(|t| t.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_config_invalid_busy_policy_fails() {
        let toml_str = r#"
[session]
on_busy = "queue"
"#;
        assert!(AppConfig::from_toml_str(toml_str).is_err());
    }
}
