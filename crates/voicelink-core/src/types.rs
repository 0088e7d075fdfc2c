/// One microphone frame at the device's native rate, plus its offset
/// (seconds) from the start of the capture session.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub captured_at: f64,
}

/// Per-chunk progress snapshot handed to the capture callback.
#[derive(Debug, Clone)]
pub struct ChunkSnapshot {
    pub samples: Vec<f32>,
    pub native_rate: u32,
    /// Peak absolute level of this chunk, scaled to 0..100.
    pub level: f32,
    pub total_samples: usize,
    pub duration_secs: f64,
}

/// A recognition transcript segment. Interim segments may still be revised
/// by the provider; final segments are settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptResult {
    pub text: String,
    pub is_final: bool,
}

/// Normalized classification of one inbound provider control message.
///
/// Adapters map provider-specific envelopes onto this enum; the session
/// state machine never inspects raw provider JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    Started,
    Interim(String),
    Final(String),
    Completed,
    Failed { code: i64, message: String },
}

/// What a streaming session surfaces to its consumer channel. Binary audio
/// fragments ride alongside the classified control events, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started,
    Result(TranscriptResult),
    Audio(Vec<u8>),
    Completed,
    Failed { code: i64, message: String },
}

/// Episode boundary signals from the playback engine. `Started` fires on
/// the silence→speech transition, `Finished` on speech→silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_chunk_creation() {
        let chunk = AudioChunk {
            samples: vec![0.0, 0.5, -0.5, 1.0],
            captured_at: 0.25,
        };
        assert_eq!(chunk.samples.len(), 4);
        assert_eq!(chunk.captured_at, 0.25);
    }

    #[test]
    fn test_transcript_result_fields() {
        let result = TranscriptResult {
            text: "hello world".to_string(),
            is_final: true,
        };
        assert_eq!(result.text, "hello world");
        assert!(result.is_final);
    }

    #[test]
    fn test_protocol_event_equality() {
        assert_eq!(
            ProtocolEvent::Interim("a".to_string()),
            ProtocolEvent::Interim("a".to_string())
        );
        assert_ne!(
            ProtocolEvent::Interim("a".to_string()),
            ProtocolEvent::Final("a".to_string())
        );
    }

    #[test]
    fn test_session_event_audio_carries_bytes() {
        let event = SessionEvent::Audio(vec![1, 2, 3, 4]);
        match event {
            SessionEvent::Audio(bytes) => assert_eq!(bytes.len(), 4),
            _ => panic!("expected Audio"),
        }
    }
}
