use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    #[error("failed to build stream: {0}")]
    StreamBuild(String),

    #[error("malformed audio payload: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider initialization failed: {0}")]
    InitializationFailed(String),

    #[error("provider not found: {0}")]
    NotFound(String),

    #[error("malformed provider message: {0}")]
    MalformedMessage(String),

    #[error("control message not supported: {0}")]
    UnsupportedControl(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("provider reported failure ({code}): {message}")]
    Protocol { code: i64, message: String },

    #[error("malformed inbound payload: {0}")]
    Decode(String),

    #[error("a session is already active")]
    Busy,
}
