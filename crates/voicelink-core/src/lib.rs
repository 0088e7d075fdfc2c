pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, BusyPolicy, CaptureConfig, PlaybackConfig, SessionConfig};
pub use error::{AudioError, ConfigError, ProviderError, SessionError};
pub use types::{
    AudioChunk, ChunkSnapshot, PlaybackEvent, ProtocolEvent, SessionEvent, TranscriptResult,
};
