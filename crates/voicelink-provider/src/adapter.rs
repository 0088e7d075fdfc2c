use voicelink_core::{ProtocolEvent, ProviderError};

/// Outbound control messages the session can ask an adapter to build.
#[derive(Debug, Clone, Copy)]
pub enum ControlKind<'a> {
    /// Session handshake, sent right after the connection opens.
    Start,
    /// Finish/cancel request, sent when the caller stops the session.
    Stop,
    /// Synthesis input text. Recognition adapters reject this.
    Text(&'a str),
}

/// Translation layer between the generic streaming session and one remote
/// service's message format.
///
/// Implementations are registered via [`ProviderRegistry`](crate::ProviderRegistry)
/// and configured from an opaque `[providers.<name>]` TOML table. New
/// services are added by implementing this trait, never by branching inside
/// the session state machine.
pub trait ProviderAdapter: Send + Sync {
    /// Returns the adapter's registry name (e.g. `"aliyun-asr"`).
    fn name(&self) -> &str;

    /// One-time initialisation with provider-specific TOML configuration.
    /// Mints the task identifier used in subsequent control messages.
    fn initialize(&mut self, config: toml::Value) -> Result<(), ProviderError>;

    /// The connection URL, including any credential query parameters.
    fn endpoint(&self) -> Result<String, ProviderError>;

    /// Whether the session becomes active as soon as the handshake is sent,
    /// for services that never acknowledge the start explicitly.
    fn starts_on_open(&self) -> bool {
        false
    }

    /// Serialize one outbound control envelope.
    fn control_message(&self, kind: ControlKind<'_>) -> Result<String, ProviderError>;

    /// Map one inbound text frame onto the normalized event enum.
    /// `Ok(None)` marks messages the protocol deliberately ignores.
    fn classify(&self, raw: &str) -> Result<Option<ProtocolEvent>, ProviderError>;
}

/// Dash-less v4 UUID, the format both observed services accept for task and
/// message identifiers.
pub(crate) fn simple_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
