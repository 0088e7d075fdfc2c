use crate::device::DeviceManager;
use crate::resample::{encode_pcm16, resample};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use voicelink_core::{AudioChunk, AudioError, ChunkSnapshot};

// ── CaptureSession ────────────────────────────────────────────

/// Accumulates native-rate chunks for one recording. Invariant: the total
/// sample count equals the sum of the stored chunk lengths.
pub struct CaptureSession {
    chunks: Vec<AudioChunk>,
    native_rate: u32,
    total_samples: usize,
    duration_secs: f64,
    peak_level: f32,
}

impl CaptureSession {
    pub fn new(native_rate: u32) -> Self {
        Self {
            chunks: Vec::new(),
            native_rate,
            total_samples: 0,
            duration_secs: 0.0,
            peak_level: 0.0,
        }
    }

    /// Append one device frame and return the running snapshot handed to
    /// the chunk callback.
    pub fn push_chunk(&mut self, samples: &[f32]) -> ChunkSnapshot {
        let level = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs())) * 100.0;

        self.chunks.push(AudioChunk {
            samples: samples.to_vec(),
            captured_at: self.duration_secs,
        });
        self.total_samples += samples.len();
        self.duration_secs += samples.len() as f64 / self.native_rate as f64;
        self.peak_level = self.peak_level.max(level);

        ChunkSnapshot {
            samples: samples.to_vec(),
            native_rate: self.native_rate,
            level,
            total_samples: self.total_samples,
            duration_secs: self.duration_secs,
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_samples = 0;
        self.duration_secs = 0.0;
        self.peak_level = 0.0;
    }

    /// All accumulated samples, flattened in arrival order.
    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.total_samples);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.samples);
        }
        out
    }

    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn peak_level(&self) -> f32 {
        self.peak_level
    }
}

// ── CaptureEngine ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub device_name: String,
    pub frame_size: u32,
    pub target_sample_rate: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            frame_size: 4096,
            target_sample_rate: 16000,
        }
    }
}

/// Owns the microphone stream and the accumulator for the current
/// recording. Capturing and encoding are mutually exclusive: `to_pcm`
/// stops the stream before packing the payload.
pub struct CaptureEngine {
    options: CaptureOptions,
    session: Arc<Mutex<CaptureSession>>,
    stream: Option<Stream>,
}

impl CaptureEngine {
    pub fn new(options: CaptureOptions) -> Self {
        let placeholder_rate = options.target_sample_rate;
        Self {
            options,
            session: Arc::new(Mutex::new(CaptureSession::new(placeholder_rate))),
            stream: None,
        }
    }

    /// Resolve the configured input device.
    pub fn open(&self) -> Result<Device, AudioError> {
        DeviceManager::new().get_input_device(&self.options.device_name)
    }

    /// Begin capturing. Any previous stream is fully stopped first, and the
    /// accumulator is reset. Each device frame is appended to the session
    /// and mirrored to `chunk_tx` as a [`ChunkSnapshot`].
    pub fn start(
        &mut self,
        device: &Device,
        chunk_tx: mpsc::UnboundedSender<ChunkSnapshot>,
    ) -> Result<(), AudioError> {
        self.stop();

        let native_rate = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
            .sample_rate()
            .0;

        if let Ok(mut session) = self.session.lock() {
            *session = CaptureSession::new(native_rate);
        }

        let config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(native_rate),
            buffer_size: cpal::BufferSize::Fixed(self.options.frame_size),
        };

        let session = Arc::clone(&self.session);
        let err_callback = move |err: cpal::StreamError| {
            tracing::error!("capture stream error: {}", err);
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let snapshot = match session.lock() {
                        Ok(mut s) => s.push_chunk(data),
                        Err(_) => return,
                    };
                    let _ = chunk_tx.send(snapshot);
                },
                err_callback,
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(native_rate, frame_size = self.options.frame_size, "capture started");
        Ok(())
    }

    /// Release the device stream. Safe to call at any time, repeatedly.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("capture stopped");
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    pub fn clear(&self) {
        if let Ok(mut session) = self.session.lock() {
            session.clear();
        }
    }

    /// Flatten the accumulated chunks and convert to the target rate.
    pub fn compress(&self) -> Vec<f32> {
        match self.session.lock() {
            Ok(session) => resample(
                &session.flatten(),
                session.native_rate(),
                self.options.target_sample_rate,
            ),
            Err(_) => Vec::new(),
        }
    }

    /// Stop capture and emit the whole recording as a PCM16 payload.
    pub fn to_pcm(&mut self) -> Vec<u8> {
        let samples = self.compress();
        self.stop();
        encode_pcm16(&samples)
    }

    pub fn duration_secs(&self) -> f64 {
        self.session.lock().map(|s| s.duration_secs()).unwrap_or(0.0)
    }

    pub fn peak_level(&self) -> f32 {
        self.session.lock().map(|s| s.peak_level()).unwrap_or(0.0)
    }
}
