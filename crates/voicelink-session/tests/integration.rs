use std::time::Duration;
use tokio::sync::mpsc;
use voicelink_core::{BusyPolicy, SessionError, SessionEvent, TranscriptResult};
use voicelink_provider::{ProviderAdapter, ProviderRegistry};
use voicelink_session::{ChannelHandle, ChannelTransport, Frame, SessionOptions, SessionState, StreamingSession};

const TIMEOUT: Duration = Duration::from_secs(2);

fn recognizer() -> Box<dyn ProviderAdapter> {
    let registry = ProviderRegistry::new();
    let mut adapter = registry.create("aliyun-asr").unwrap();
    let mut table = toml::map::Map::new();
    table.insert("token".to_string(), toml::Value::String("tok".to_string()));
    table.insert("app_key".to_string(), toml::Value::String("key".to_string()));
    adapter.initialize(toml::Value::Table(table)).unwrap();
    adapter
}

fn synthesizer() -> Box<dyn ProviderAdapter> {
    let registry = ProviderRegistry::new();
    let mut adapter = registry.create("aliyun-tts").unwrap();
    let mut table = toml::map::Map::new();
    table.insert("token".to_string(), toml::Value::String("tok".to_string()));
    table.insert("app_key".to_string(), toml::Value::String("key".to_string()));
    adapter.initialize(toml::Value::Table(table)).unwrap();
    adapter
}

async fn recv_event(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Option<SessionEvent> {
    tokio::time::timeout(TIMEOUT, rx.recv()).await.expect("timed out")
}

async fn recv_frame(handle: &mut ChannelHandle) -> Option<Frame> {
    tokio::time::timeout(TIMEOUT, handle.sent.recv())
        .await
        .expect("timed out")
}

fn inject(handle: &ChannelHandle, raw: &str) {
    handle
        .inject
        .send(Ok(Frame::Text(raw.to_string())))
        .unwrap();
}

#[tokio::test]
async fn test_handshake_sent_on_attach() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let _events = session.attach(Box::new(transport), recognizer()).await.unwrap();

    match recv_frame(&mut handle).await {
        Some(Frame::Text(raw)) => {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["header"]["name"], "StartTranscription");
        }
        other => panic!("expected handshake frame, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Connecting);

    session.close().await;
}

#[tokio::test]
async fn test_started_ack_activates_session() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    inject(&handle, r#"{"header":{"name":"TranscriptionStarted","status":20000000}}"#);
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));
    assert_eq!(session.state(), SessionState::Active);

    session.close().await;
}

#[tokio::test]
async fn test_send_audio_only_when_active() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    // Connecting: dropped without error
    session.send_audio(vec![1, 1]);

    inject(&handle, r#"{"header":{"name":"TranscriptionStarted","status":20000000}}"#);
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));

    session.send_audio(vec![2, 2]);
    assert_eq!(recv_frame(&mut handle).await, Some(Frame::Binary(vec![2, 2])));

    session.close().await;

    // Closed: still a silent no-op
    session.send_audio(vec![3, 3]);
}

#[tokio::test]
async fn test_results_relayed_in_provider_order() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    inject(&handle, r#"{"header":{"name":"TranscriptionStarted","status":20000000}}"#);
    inject(&handle, r#"{"header":{"name":"TranscriptionResultChanged","status":20000000},"payload":{"result":"one"}}"#);
    inject(&handle, r#"{"header":{"name":"TranscriptionResultChanged","status":20000000},"payload":{"result":"one two"}}"#);
    inject(&handle, r#"{"header":{"name":"SentenceEnd","status":20000000},"payload":{"result":"one two three"}}"#);

    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));
    assert_eq!(
        recv_event(&mut events).await,
        Some(SessionEvent::Result(TranscriptResult {
            text: "one".to_string(),
            is_final: false
        }))
    );
    assert_eq!(
        recv_event(&mut events).await,
        Some(SessionEvent::Result(TranscriptResult {
            text: "one two".to_string(),
            is_final: false
        }))
    );
    assert_eq!(
        recv_event(&mut events).await,
        Some(SessionEvent::Result(TranscriptResult {
            text: "one two three".to_string(),
            is_final: true
        }))
    );

    session.close().await;
}

#[tokio::test]
async fn test_completed_self_terminates() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    inject(&handle, r#"{"header":{"name":"TranscriptionStarted","status":20000000}}"#);
    inject(&handle, r#"{"header":{"name":"TranscriptionCompleted","status":20000000}}"#);

    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Completed));
    // Channel closes once the driver has released the connection
    assert_eq!(recv_event(&mut events).await, None);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_failure_status_reports_once_and_closes() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    inject(&handle, r#"{"header":{"name":"TranscriptionStarted","status":20000000}}"#);
    inject(&handle, r#"{"header":{"name":"TaskFailed","status":40000004,"status_text":"idle too long"}}"#);

    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));
    match recv_event(&mut events).await {
        Some(SessionEvent::Failed { code, message }) => {
            assert_eq!(code, 40000004);
            assert_eq!(message, "idle too long");
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    // Exactly one failure event, then the channel closes
    assert_eq!(recv_event(&mut events).await, None);
    assert_eq!(session.state(), SessionState::Failed);

    // Sends after failure stay silent
    session.send_audio(vec![9, 9]);
}

#[tokio::test]
async fn test_suppressed_failures_are_not_surfaced() {
    let mut session = StreamingSession::new(SessionOptions {
        surface_failures: false,
        ..Default::default()
    });
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    inject(&handle, r#"{"header":{"name":"TaskFailed","status":41010105,"status_text":"bad request"}}"#);

    // No Failed event: the channel just closes
    assert_eq!(recv_event(&mut events).await, None);
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_transport_error_is_undifferentiated_failure() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    handle
        .inject
        .send(Err(SessionError::Connection("reset by peer".to_string())))
        .unwrap();

    match recv_event(&mut events).await {
        Some(SessionEvent::Failed { code, .. }) => assert_eq!(code, -1),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(recv_event(&mut events).await, None);
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_stop_sends_finish_and_completes() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    inject(&handle, r#"{"header":{"name":"TranscriptionStarted","status":20000000}}"#);
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));

    session.stop();
    match recv_frame(&mut handle).await {
        Some(Frame::Text(raw)) => {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["header"]["name"], "StopTranscription");
        }
        other => panic!("expected stop frame, got {:?}", other),
    }

    inject(&handle, r#"{"header":{"name":"TranscriptionCompleted","status":20000000}}"#);
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Completed));
    assert_eq!(recv_event(&mut events).await, None);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_remote_close_ends_session() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    // Provider closes the connection without any completion message
    drop(handle);
    assert_eq!(recv_event(&mut events).await, None);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_busy_reject_policy() {
    let mut session = StreamingSession::new(SessionOptions {
        on_busy: BusyPolicy::Reject,
        ..Default::default()
    });
    let (transport, mut handle) = ChannelTransport::pair();
    let _events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    let (second, _second_handle) = ChannelTransport::pair();
    match session.attach(Box::new(second), recognizer()).await {
        Err(SessionError::Busy) => {}
        other => panic!("expected Busy, got {:?}", other.map(|_| ())),
    }

    session.close().await;
}

#[tokio::test]
async fn test_busy_preempt_closes_previous_session() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (first, mut first_handle) = ChannelTransport::pair();
    let _first_events = session.attach(Box::new(first), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut first_handle).await;

    let (second, mut second_handle) = ChannelTransport::pair();
    let _second_events = session
        .attach(Box::new(second), recognizer())
        .await
        .unwrap();

    // The first connection was fully torn down before the second opened:
    // its outbound stream ends
    assert_eq!(recv_frame(&mut first_handle).await, None);
    // And the second session runs its own handshake
    assert!(matches!(
        recv_frame(&mut second_handle).await,
        Some(Frame::Text(_))
    ));

    session.close().await;
}

#[tokio::test]
async fn test_starts_on_open_adapter_is_active_immediately() {
    let registry = ProviderRegistry::new();
    let mut adapter = registry.create("baidu-asr").unwrap();
    let mut table = toml::map::Map::new();
    table.insert("app_id".to_string(), toml::Value::Integer(42));
    table.insert("app_key".to_string(), toml::Value::String("bk".to_string()));
    adapter.initialize(toml::Value::Table(table)).unwrap();

    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), adapter).await.unwrap();

    match recv_frame(&mut handle).await {
        Some(Frame::Text(raw)) => {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["type"], "START");
        }
        other => panic!("expected START frame, got {:?}", other),
    }
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));
    assert_eq!(session.state(), SessionState::Active);

    session.close().await;
}

#[tokio::test]
async fn test_synthesis_audio_fragments_relayed_in_order() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), synthesizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    inject(&handle, r#"{"header":{"name":"SynthesisStarted","status":20000000}}"#);
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));

    session.send_text("hello");
    match recv_frame(&mut handle).await {
        Some(Frame::Text(raw)) => {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["header"]["name"], "RunSynthesis");
            assert_eq!(value["payload"]["text"], "hello");
        }
        other => panic!("expected RunSynthesis frame, got {:?}", other),
    }

    handle.inject.send(Ok(Frame::Binary(vec![1, 0]))).unwrap();
    handle.inject.send(Ok(Frame::Binary(vec![2, 0]))).unwrap();
    inject(&handle, r#"{"header":{"name":"SynthesisCompleted","status":20000000}}"#);

    assert_eq!(
        recv_event(&mut events).await,
        Some(SessionEvent::Audio(vec![1, 0]))
    );
    assert_eq!(
        recv_event(&mut events).await,
        Some(SessionEvent::Audio(vec![2, 0]))
    );
    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Completed));
    assert_eq!(recv_event(&mut events).await, None);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let mut session = StreamingSession::new(SessionOptions::default());
    session.close().await;

    let (transport, _handle) = ChannelTransport::pair();
    let _events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    session.close().await;
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_unclassifiable_message_is_dropped() {
    let mut session = StreamingSession::new(SessionOptions::default());
    let (transport, mut handle) = ChannelTransport::pair();
    let mut events = session.attach(Box::new(transport), recognizer()).await.unwrap();
    let _handshake = recv_frame(&mut handle).await;

    // Garbage in between does not kill the session or reorder results
    inject(&handle, "not json at all");
    inject(&handle, r#"{"header":{"name":"TranscriptionStarted","status":20000000}}"#);

    assert_eq!(recv_event(&mut events).await, Some(SessionEvent::Started));
    assert_eq!(session.state(), SessionState::Active);

    session.close().await;
}
