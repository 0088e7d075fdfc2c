use crate::transport::{Frame, Transport, WsTransport};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voicelink_core::{BusyPolicy, ProtocolEvent, SessionError, SessionEvent, TranscriptResult};
use voicelink_provider::{ControlKind, ProviderAdapter};

const STATE_CLOSED: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_ACTIVE: u8 = 2;
const STATE_FINALIZING: u8 = 3;
const STATE_FAILED: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    Active,
    Finalizing,
    Failed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_CONNECTING => SessionState::Connecting,
            STATE_ACTIVE => SessionState::Active,
            STATE_FINALIZING => SessionState::Finalizing,
            STATE_FAILED => SessionState::Failed,
            _ => SessionState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub on_busy: BusyPolicy,
    /// When false, provider failures are logged but no `Failed` event is
    /// delivered to the consumer.
    pub surface_failures: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            on_busy: BusyPolicy::Preempt,
            surface_failures: true,
        }
    }
}

impl From<&voicelink_core::SessionConfig> for SessionOptions {
    fn from(config: &voicelink_core::SessionConfig) -> Self {
        Self {
            on_busy: config.on_busy,
            surface_failures: config.surface_failures,
        }
    }
}

enum Command {
    Audio(Vec<u8>),
    Text(String),
    Stop,
    Close,
}

/// Provider-agnostic streaming session.
///
/// One driver task owns the connection for the session's whole life. All
/// inbound frames funnel through a single consumer channel, so results reach
/// the caller in exactly the order the provider emitted them. At most one
/// session is live per instance; `open` enforces the configured busy policy.
pub struct StreamingSession {
    options: SessionOptions,
    state: Arc<AtomicU8>,
    cmd_tx: Option<mpsc::UnboundedSender<Command>>,
    driver: Option<JoinHandle<()>>,
}

impl StreamingSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: Arc::new(AtomicU8::new(STATE_CLOSED)),
            cmd_tx: None,
            driver: None,
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Connect to the adapter's endpoint and run the session over it.
    /// The adapter must already be initialized.
    pub async fn open(
        &mut self,
        adapter: Box<dyn ProviderAdapter>,
    ) -> Result<mpsc::UnboundedReceiver<SessionEvent>, SessionError> {
        self.resolve_busy().await?;
        let url = adapter
            .endpoint()
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        let transport = WsTransport::connect(&url).await?;
        self.attach(Box::new(transport), adapter).await
    }

    /// Run the session over an already-established transport.
    pub async fn attach(
        &mut self,
        transport: Box<dyn Transport>,
        adapter: Box<dyn ProviderAdapter>,
    ) -> Result<mpsc::UnboundedReceiver<SessionEvent>, SessionError> {
        self.resolve_busy().await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        self.state.store(STATE_CONNECTING, Ordering::Release);
        let driver = tokio::spawn(drive(
            transport,
            adapter,
            Arc::clone(&self.state),
            cmd_rx,
            event_tx,
            self.options.surface_failures,
        ));

        self.cmd_tx = Some(cmd_tx);
        self.driver = Some(driver);
        Ok(event_rx)
    }

    /// Forward one binary audio frame. A silent no-op unless the session is
    /// Active.
    pub fn send_audio(&self, bytes: Vec<u8>) {
        if self.state() != SessionState::Active {
            return;
        }
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(Command::Audio(bytes));
        }
    }

    /// Forward one text input (synthesis). A silent no-op unless Active.
    pub fn send_text(&self, text: &str) {
        if self.state() != SessionState::Active {
            return;
        }
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(Command::Text(text.to_string()));
        }
    }

    /// Ask the provider to finish. The session completes its own transition
    /// to Closed on the completion acknowledgment or connection close.
    pub fn stop(&self) {
        if !matches!(
            self.state(),
            SessionState::Active | SessionState::Connecting
        ) {
            return;
        }
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(Command::Stop);
        }
    }

    /// Tear the session down and wait for the driver to release the
    /// connection. Idempotent; safe when nothing is open.
    pub async fn close(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Close);
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }

    /// Apply the busy policy before opening a new session. A driver that
    /// already reached a terminal state is reaped, not counted as busy.
    async fn resolve_busy(&mut self) -> Result<(), SessionError> {
        if self.driver.is_none() {
            return Ok(());
        }
        if matches!(self.state(), SessionState::Closed | SessionState::Failed) {
            self.close().await;
            return Ok(());
        }
        match self.options.on_busy {
            BusyPolicy::Reject => Err(SessionError::Busy),
            BusyPolicy::Preempt => {
                tracing::debug!("preempting active session");
                self.close().await;
                Ok(())
            }
        }
    }
}

/// What one turn of the driver loop observed. Extracted so the handler can
/// use the transport mutably after the select completes.
enum Step {
    Cmd(Option<Command>),
    Inbound(Option<Result<Frame, SessionError>>),
}

async fn drive(
    mut transport: Box<dyn Transport>,
    adapter: Box<dyn ProviderAdapter>,
    state: Arc<AtomicU8>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    surface_failures: bool,
) {
    let mut failed = false;

    // Start handshake goes out as soon as the connection is up
    match adapter.control_message(ControlKind::Start) {
        Ok(message) => {
            if let Err(e) = transport.send(Frame::Text(message)).await {
                emit_failure(&events, surface_failures, &mut failed, -1, e.to_string());
            }
        }
        Err(e) => emit_failure(&events, surface_failures, &mut failed, -1, e.to_string()),
    }

    if !failed && adapter.starts_on_open() {
        if mark_active(&state) {
            let _ = events.send(SessionEvent::Started);
        }
    }

    while !failed {
        let step = tokio::select! {
            cmd = cmd_rx.recv() => Step::Cmd(cmd),
            frame = transport.next() => Step::Inbound(frame),
        };

        match step {
            Step::Cmd(Some(Command::Audio(bytes))) => {
                if state.load(Ordering::Acquire) != STATE_ACTIVE {
                    continue;
                }
                if let Err(e) = transport.send(Frame::Binary(bytes)).await {
                    emit_failure(&events, surface_failures, &mut failed, -1, e.to_string());
                    break;
                }
            }
            Step::Cmd(Some(Command::Text(text))) => {
                if state.load(Ordering::Acquire) != STATE_ACTIVE {
                    continue;
                }
                match adapter.control_message(ControlKind::Text(&text)) {
                    Ok(message) => {
                        if let Err(e) = transport.send(Frame::Text(message)).await {
                            emit_failure(&events, surface_failures, &mut failed, -1, e.to_string());
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("text input rejected: {e}"),
                }
            }
            Step::Cmd(Some(Command::Stop)) => {
                let current = state.load(Ordering::Acquire);
                if current != STATE_ACTIVE && current != STATE_CONNECTING {
                    continue;
                }
                state.store(STATE_FINALIZING, Ordering::Release);
                match adapter.control_message(ControlKind::Stop) {
                    Ok(message) => {
                        if let Err(e) = transport.send(Frame::Text(message)).await {
                            emit_failure(&events, surface_failures, &mut failed, -1, e.to_string());
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("stop message rejected: {e}"),
                }
            }
            Step::Cmd(Some(Command::Close)) | Step::Cmd(None) => break,
            Step::Inbound(None) => break,
            Step::Inbound(Some(Err(e))) => {
                emit_failure(&events, surface_failures, &mut failed, -1, e.to_string());
                break;
            }
            Step::Inbound(Some(Ok(Frame::Binary(bytes)))) => {
                let _ = events.send(SessionEvent::Audio(bytes));
            }
            Step::Inbound(Some(Ok(Frame::Text(raw)))) => match adapter.classify(&raw) {
                Ok(Some(ProtocolEvent::Started)) => {
                    if mark_active(&state) {
                        let _ = events.send(SessionEvent::Started);
                    }
                }
                Ok(Some(ProtocolEvent::Interim(text))) => {
                    let _ = events.send(SessionEvent::Result(TranscriptResult {
                        text,
                        is_final: false,
                    }));
                }
                Ok(Some(ProtocolEvent::Final(text))) => {
                    let _ = events.send(SessionEvent::Result(TranscriptResult {
                        text,
                        is_final: true,
                    }));
                }
                Ok(Some(ProtocolEvent::Completed)) => {
                    let _ = events.send(SessionEvent::Completed);
                    break;
                }
                Ok(Some(ProtocolEvent::Failed { code, message })) => {
                    emit_failure(&events, surface_failures, &mut failed, code, message);
                    break;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("dropping unclassifiable message: {e}"),
            },
        }
    }

    // Self-terminating: the session owns the connection teardown regardless
    // of which side ended it
    transport.close().await;
    state.store(
        if failed { STATE_FAILED } else { STATE_CLOSED },
        Ordering::Release,
    );
    tracing::debug!(failed, provider = adapter.name(), "session closed");
}

/// Connecting → Active. Ignored once the session started finalizing.
fn mark_active(state: &AtomicU8) -> bool {
    state
        .compare_exchange(
            STATE_CONNECTING,
            STATE_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok()
}

/// At most one failure is reported per session.
fn emit_failure(
    events: &mpsc::UnboundedSender<SessionEvent>,
    surface: bool,
    failed: &mut bool,
    code: i64,
    message: String,
) {
    if *failed {
        return;
    }
    *failed = true;
    tracing::error!(code, %message, "session failed");
    if surface {
        let _ = events.send(SessionEvent::Failed { code, message });
    }
}
