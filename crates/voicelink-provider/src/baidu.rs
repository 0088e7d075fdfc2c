//! Baidu speech adapters. These services use flat `{type, data|payload}`
//! frames; recognition reports errors through `err_no`, synthesis through
//! `code`.

use crate::adapter::{ControlKind, ProviderAdapter};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use voicelink_core::{ProtocolEvent, ProviderError};

const DEFAULT_ASR_ENDPOINT: &str = "wss://vop.baidu.com/realtime_asr";
const DEFAULT_TTS_ENDPOINT: &str = "wss://aip.baidubce.com/ws/2.0/speech/publiccloudspeech/v1/tts";

fn parse(raw: &str) -> Result<serde_json::Value, ProviderError> {
    serde_json::from_str(raw).map_err(|e| ProviderError::MalformedMessage(e.to_string()))
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

// ── Recognition ───────────────────────────────────────────────

pub struct BaiduRecognizer {
    endpoint: String,
    app_id: Option<i64>,
    app_key: Option<String>,
    dev_pid: i64,
    cuid: String,
    sample_rate: u32,
}

impl BaiduRecognizer {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ASR_ENDPOINT.to_string(),
            app_id: None,
            app_key: None,
            dev_pid: 15372,
            cuid: "voicelink".to_string(),
            sample_rate: 16000,
        }
    }
}

impl Default for BaiduRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for BaiduRecognizer {
    fn name(&self) -> &str {
        "baidu-asr"
    }

    fn initialize(&mut self, config: toml::Value) -> Result<(), ProviderError> {
        let app_id = config
            .get("app_id")
            .and_then(|v| v.as_integer())
            .ok_or_else(|| {
                ProviderError::InitializationFailed("missing 'app_id' in config".to_string())
            })?;
        let app_key = config
            .get("app_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::InitializationFailed("missing 'app_key' in config".to_string())
            })?;

        self.app_id = Some(app_id);
        self.app_key = Some(app_key.to_string());
        if let Some(endpoint) = config.get("endpoint").and_then(|v| v.as_str()) {
            self.endpoint = endpoint.to_string();
        }
        if let Some(dev_pid) = config.get("dev_pid").and_then(|v| v.as_integer()) {
            self.dev_pid = dev_pid;
        }
        if let Some(cuid) = config.get("cuid").and_then(|v| v.as_str()) {
            self.cuid = cuid.to_string();
        }
        if let Some(rate) = config.get("sample_rate").and_then(|v| v.as_integer()) {
            self.sample_rate = rate as u32;
        }

        tracing::debug!(app_id, "BaiduRecognizer initialized");
        Ok(())
    }

    fn endpoint(&self) -> Result<String, ProviderError> {
        if self.app_id.is_none() {
            return Err(ProviderError::InitializationFailed(
                "adapter not initialized".to_string(),
            ));
        }
        Ok(format!("{}?sn={}", self.endpoint, epoch_millis()))
    }

    // The service sends no start acknowledgment; the session is live once
    // the START frame is on the wire.
    fn starts_on_open(&self) -> bool {
        true
    }

    fn control_message(&self, kind: ControlKind<'_>) -> Result<String, ProviderError> {
        let envelope = match kind {
            ControlKind::Start => json!({
                "type": "START",
                "data": {
                    "appid": self.app_id,
                    "appkey": self.app_key,
                    "dev_pid": self.dev_pid,
                    "cuid": self.cuid,
                    "format": "pcm",
                    "sample": self.sample_rate,
                },
            }),
            ControlKind::Stop => json!({ "type": "CANCEL" }),
            ControlKind::Text(_) => {
                return Err(ProviderError::UnsupportedControl(
                    "recognition sessions take audio, not text".to_string(),
                ))
            }
        };
        Ok(envelope.to_string())
    }

    fn classify(&self, raw: &str) -> Result<Option<ProtocolEvent>, ProviderError> {
        let value = parse(raw)?;
        let err_no = value.get("err_no").and_then(|v| v.as_i64()).unwrap_or(0);
        if err_no != 0 {
            let message = value
                .get("err_msg")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            return Ok(Some(ProtocolEvent::Failed {
                code: err_no,
                message,
            }));
        }

        let result = value
            .get("result")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let event = match value.get("type").and_then(|v| v.as_str()) {
            Some("MID_TEXT") => Some(ProtocolEvent::Interim(result)),
            Some("FIN_TEXT") => Some(ProtocolEvent::Final(result)),
            _ => None,
        };
        Ok(event)
    }
}

// ── Synthesis ─────────────────────────────────────────────────

pub struct BaiduSynthesizer {
    endpoint: String,
    access_token: Option<String>,
    voice: i64,
    speed: i64,
    pitch: i64,
    volume: i64,
    format: i64,
}

impl BaiduSynthesizer {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            access_token: None,
            voice: 0,
            speed: 5,
            pitch: 5,
            volume: 5,
            // 4 = 16kHz PCM
            format: 4,
        }
    }
}

impl Default for BaiduSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for BaiduSynthesizer {
    fn name(&self) -> &str {
        "baidu-tts"
    }

    fn initialize(&mut self, config: toml::Value) -> Result<(), ProviderError> {
        let access_token = config
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::InitializationFailed("missing 'access_token' in config".to_string())
            })?;

        self.access_token = Some(access_token.to_string());
        if let Some(endpoint) = config.get("endpoint").and_then(|v| v.as_str()) {
            self.endpoint = endpoint.to_string();
        }
        if let Some(voice) = config.get("voice").and_then(|v| v.as_integer()) {
            self.voice = voice;
        }
        if let Some(speed) = config.get("speed").and_then(|v| v.as_integer()) {
            self.speed = speed;
        }
        if let Some(pitch) = config.get("pitch").and_then(|v| v.as_integer()) {
            self.pitch = pitch;
        }
        if let Some(volume) = config.get("volume").and_then(|v| v.as_integer()) {
            self.volume = volume;
        }
        if let Some(format) = config.get("format").and_then(|v| v.as_integer()) {
            self.format = format;
        }

        tracing::debug!(voice = self.voice, "BaiduSynthesizer initialized");
        Ok(())
    }

    fn endpoint(&self) -> Result<String, ProviderError> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            ProviderError::InitializationFailed("adapter not initialized".to_string())
        })?;
        Ok(format!(
            "{}?access_token={}&per={}",
            self.endpoint, token, self.voice
        ))
    }

    fn control_message(&self, kind: ControlKind<'_>) -> Result<String, ProviderError> {
        let envelope = match kind {
            ControlKind::Start => json!({
                "type": "system.start",
                "payload": {
                    "spd": self.speed,
                    "pid": self.pitch,
                    "vol": self.volume,
                    "aue": self.format,
                },
            }),
            ControlKind::Stop => json!({ "type": "system.finish" }),
            ControlKind::Text(text) => json!({
                "type": "text",
                "payload": { "text": text },
            }),
        };
        Ok(envelope.to_string())
    }

    fn classify(&self, raw: &str) -> Result<Option<ProtocolEvent>, ProviderError> {
        let value = parse(raw)?;
        let code = value.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
        if code != 0 {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            return Ok(Some(ProtocolEvent::Failed { code, message }));
        }

        let event = match value.get("type").and_then(|v| v.as_str()) {
            Some("system.started") => Some(ProtocolEvent::Started),
            Some("system.finished") => Some(ProtocolEvent::Completed),
            _ => None,
        };
        Ok(event)
    }
}
