//! Aliyun NLS adapters. Control envelopes carry a
//! `{message_id, task_id, namespace, name, appkey}` header; `20000000` is
//! the service's success status.

use crate::adapter::{simple_uuid, ControlKind, ProviderAdapter};
use serde_json::json;
use voicelink_core::{ProtocolEvent, ProviderError};

const STATUS_OK: i64 = 20000000;
const DEFAULT_ASR_GATEWAY: &str = "wss://nls-gateway.cn-shanghai.aliyuncs.com/ws/v1";
const DEFAULT_TTS_GATEWAY: &str = "wss://nls-gateway-cn-beijing.aliyuncs.com/ws/v1";

fn required_str(config: &toml::Value, key: &str) -> Result<String, ProviderError> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::InitializationFailed(format!("missing '{}' in config", key)))
}

struct Envelope {
    status: i64,
    status_text: String,
    name: String,
    payload: serde_json::Value,
}

/// Split one inbound NLS envelope into its header fields and payload.
fn parse_envelope(raw: &str) -> Result<Envelope, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ProviderError::MalformedMessage(e.to_string()))?;
    let header = value
        .get("header")
        .ok_or_else(|| ProviderError::MalformedMessage("missing header".to_string()))?;
    let status = header
        .get("status")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ProviderError::MalformedMessage("missing header.status".to_string()))?;
    let status_text = header
        .get("status_text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let name = header
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let payload = value.get("payload").cloned().unwrap_or(serde_json::Value::Null);
    Ok(Envelope {
        status,
        status_text,
        name,
        payload,
    })
}

fn payload_result(payload: &serde_json::Value) -> String {
    payload
        .get("result")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

// ── Recognition ───────────────────────────────────────────────

pub struct AliyunRecognizer {
    gateway: String,
    token: Option<String>,
    app_key: Option<String>,
    sample_rate: u32,
    task_id: Option<String>,
}

impl AliyunRecognizer {
    pub fn new() -> Self {
        Self {
            gateway: DEFAULT_ASR_GATEWAY.to_string(),
            token: None,
            app_key: None,
            sample_rate: 16000,
            task_id: None,
        }
    }

    fn header(&self, name: &str) -> Result<serde_json::Value, ProviderError> {
        let task_id = self.task_id.as_deref().ok_or_else(|| {
            ProviderError::InitializationFailed("adapter not initialized".to_string())
        })?;
        Ok(json!({
            "message_id": simple_uuid(),
            "task_id": task_id,
            "namespace": "SpeechTranscriber",
            "name": name,
            "appkey": self.app_key.as_deref().unwrap_or_default(),
        }))
    }
}

impl Default for AliyunRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for AliyunRecognizer {
    fn name(&self) -> &str {
        "aliyun-asr"
    }

    fn initialize(&mut self, config: toml::Value) -> Result<(), ProviderError> {
        self.token = Some(required_str(&config, "token")?);
        self.app_key = Some(required_str(&config, "app_key")?);
        if let Some(gateway) = config.get("gateway").and_then(|v| v.as_str()) {
            self.gateway = gateway.to_string();
        }
        if let Some(rate) = config.get("sample_rate").and_then(|v| v.as_integer()) {
            self.sample_rate = rate as u32;
        }
        self.task_id = Some(simple_uuid());

        tracing::debug!(task_id = ?self.task_id, "AliyunRecognizer initialized");
        Ok(())
    }

    fn endpoint(&self) -> Result<String, ProviderError> {
        let token = self.token.as_deref().ok_or_else(|| {
            ProviderError::InitializationFailed("adapter not initialized".to_string())
        })?;
        Ok(format!("{}?token={}", self.gateway, token))
    }

    fn control_message(&self, kind: ControlKind<'_>) -> Result<String, ProviderError> {
        let envelope = match kind {
            ControlKind::Start => json!({
                "header": self.header("StartTranscription")?,
                "payload": {
                    "format": "PCM",
                    "sample_rate": self.sample_rate,
                    "enable_intermediate_result": true,
                    "enable_punctuation_prediction": true,
                    "enable_inverse_text_normalization": true,
                },
            }),
            ControlKind::Stop => json!({
                "header": self.header("StopTranscription")?,
            }),
            ControlKind::Text(_) => {
                return Err(ProviderError::UnsupportedControl(
                    "recognition sessions take audio, not text".to_string(),
                ))
            }
        };
        Ok(envelope.to_string())
    }

    fn classify(&self, raw: &str) -> Result<Option<ProtocolEvent>, ProviderError> {
        let envelope = parse_envelope(raw)?;
        if envelope.status != STATUS_OK {
            return Ok(Some(ProtocolEvent::Failed {
                code: envelope.status,
                message: envelope.status_text,
            }));
        }

        let event = match envelope.name.as_str() {
            "TranscriptionStarted" => Some(ProtocolEvent::Started),
            "TranscriptionResultChanged" => {
                Some(ProtocolEvent::Interim(payload_result(&envelope.payload)))
            }
            "SentenceEnd" => Some(ProtocolEvent::Final(payload_result(&envelope.payload))),
            "TranscriptionCompleted" => Some(ProtocolEvent::Completed),
            // SentenceBegin and anything unrecognized carry no transcript
            _ => None,
        };
        Ok(event)
    }
}

// ── Synthesis ─────────────────────────────────────────────────

pub struct AliyunSynthesizer {
    gateway: String,
    token: Option<String>,
    app_key: Option<String>,
    sample_rate: u32,
    voice: String,
    volume: i64,
    speech_rate: i64,
    pitch_rate: i64,
    task_id: Option<String>,
}

impl AliyunSynthesizer {
    pub fn new() -> Self {
        Self {
            gateway: DEFAULT_TTS_GATEWAY.to_string(),
            token: None,
            app_key: None,
            sample_rate: 16000,
            voice: "xiaoyun".to_string(),
            volume: 100,
            speech_rate: 0,
            pitch_rate: 0,
            task_id: None,
        }
    }

    fn header(&self, name: &str) -> Result<serde_json::Value, ProviderError> {
        let task_id = self.task_id.as_deref().ok_or_else(|| {
            ProviderError::InitializationFailed("adapter not initialized".to_string())
        })?;
        Ok(json!({
            "message_id": simple_uuid(),
            "task_id": task_id,
            "namespace": "FlowingSpeechSynthesizer",
            "name": name,
            "appkey": self.app_key.as_deref().unwrap_or_default(),
        }))
    }
}

impl Default for AliyunSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for AliyunSynthesizer {
    fn name(&self) -> &str {
        "aliyun-tts"
    }

    fn initialize(&mut self, config: toml::Value) -> Result<(), ProviderError> {
        self.token = Some(required_str(&config, "token")?);
        self.app_key = Some(required_str(&config, "app_key")?);
        if let Some(gateway) = config.get("gateway").and_then(|v| v.as_str()) {
            self.gateway = gateway.to_string();
        }
        if let Some(rate) = config.get("sample_rate").and_then(|v| v.as_integer()) {
            self.sample_rate = rate as u32;
        }
        if let Some(voice) = config.get("voice").and_then(|v| v.as_str()) {
            self.voice = voice.to_string();
        }
        if let Some(volume) = config.get("volume").and_then(|v| v.as_integer()) {
            self.volume = volume;
        }
        if let Some(rate) = config.get("speech_rate").and_then(|v| v.as_integer()) {
            self.speech_rate = rate;
        }
        if let Some(rate) = config.get("pitch_rate").and_then(|v| v.as_integer()) {
            self.pitch_rate = rate;
        }
        self.task_id = Some(simple_uuid());

        tracing::debug!(voice = %self.voice, "AliyunSynthesizer initialized");
        Ok(())
    }

    fn endpoint(&self) -> Result<String, ProviderError> {
        let token = self.token.as_deref().ok_or_else(|| {
            ProviderError::InitializationFailed("adapter not initialized".to_string())
        })?;
        Ok(format!("{}?token={}", self.gateway, token))
    }

    fn control_message(&self, kind: ControlKind<'_>) -> Result<String, ProviderError> {
        let envelope = match kind {
            ControlKind::Start => json!({
                "header": self.header("StartSynthesis")?,
                "payload": {
                    "format": "PCM",
                    "sample_rate": self.sample_rate,
                    "voice": self.voice,
                    "volume": self.volume,
                    "speech_rate": self.speech_rate,
                    "pitch_rate": self.pitch_rate,
                },
            }),
            ControlKind::Stop => json!({
                "header": self.header("StopSynthesis")?,
            }),
            ControlKind::Text(text) => json!({
                "header": self.header("RunSynthesis")?,
                "payload": { "text": text },
            }),
        };
        Ok(envelope.to_string())
    }

    fn classify(&self, raw: &str) -> Result<Option<ProtocolEvent>, ProviderError> {
        let envelope = parse_envelope(raw)?;
        if envelope.status != STATUS_OK {
            return Ok(Some(ProtocolEvent::Failed {
                code: envelope.status,
                message: envelope.status_text,
            }));
        }

        let event = match envelope.name.as_str() {
            "SynthesisStarted" => Some(ProtocolEvent::Started),
            "SynthesisCompleted" => Some(ProtocolEvent::Completed),
            _ => None,
        };
        Ok(event)
    }
}
