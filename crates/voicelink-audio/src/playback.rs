use crate::device::DeviceManager;
use crate::resample::decode_pcm16;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use voicelink_core::{AudioError, PlaybackEvent};

// ── PlaybackSink ──────────────────────────────────────────────

/// Where decoded playback units go. The production implementation drives a
/// cpal output stream; tests substitute a recording sink. Sinks hold device
/// stream handles, so like the engine itself they stay on one thread.
pub trait PlaybackSink {
    /// Queue one decoded unit for output. Units are submitted strictly one
    /// at a time; the sink signals completion through its hook.
    fn play(&mut self, samples: &[f32]) -> Result<(), AudioError>;
    /// Stop output and release the device. Callable from any state.
    fn stop(&mut self);
}

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            sample_rate: 16000,
            channels: 1,
        }
    }
}

// Ring capacity in seconds of audio. Units longer than this lose their
// tail, which is logged.
const BUFFER_SECS: usize = 60;

/// cpal-backed sink. The output callback drains a ring buffer and invokes
/// the completion hook when the pending-sample count reaches zero.
pub struct CpalSink {
    options: PlaybackOptions,
    on_unit_complete: Arc<dyn Fn() + Send + Sync>,
    pending: Arc<AtomicUsize>,
    producer: Option<HeapProd<f32>>,
    stream: Option<Stream>,
}

impl CpalSink {
    pub fn new(
        options: PlaybackOptions,
        on_unit_complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            options,
            on_unit_complete: Arc::new(on_unit_complete),
            pending: Arc::new(AtomicUsize::new(0)),
            producer: None,
            stream: None,
        }
    }

    /// Open the output device lazily, on first use after construction or
    /// after `stop`.
    fn ensure_stream(&mut self) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = DeviceManager::new().get_output_device(&self.options.device_name)?;
        let channels = self.options.channels.max(1);
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(self.options.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = self.options.sample_rate as usize * BUFFER_SECS;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let consumer = Arc::new(Mutex::new(consumer));

        let pending = Arc::clone(&self.pending);
        let hook = Arc::clone(&self.on_unit_complete);
        let frame_width = channels as usize;

        let err_callback = move |err: cpal::StreamError| {
            tracing::error!("output stream error: {}", err);
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut cons) = consumer.lock() {
                        for frame in data.chunks_mut(frame_width) {
                            match cons.try_pop() {
                                Some(sample) => {
                                    for out in frame.iter_mut() {
                                        *out = sample;
                                    }
                                    if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                                        hook();
                                    }
                                }
                                None => {
                                    for out in frame.iter_mut() {
                                        *out = 0.0;
                                    }
                                }
                            }
                        }
                    } else {
                        data.fill(0.0);
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        self.producer = Some(producer);
        self.stream = Some(stream);
        Ok(())
    }
}

impl PlaybackSink for CpalSink {
    fn play(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        self.ensure_stream()?;

        let producer = self.producer.as_mut().expect("stream open implies producer");
        self.pending.fetch_add(samples.len(), Ordering::AcqRel);
        let pushed = producer.push_slice(samples);
        if pushed < samples.len() {
            let dropped = samples.len() - pushed;
            tracing::warn!(dropped, "playback unit exceeds buffer, tail dropped");
            if self.pending.fetch_sub(dropped, Ordering::AcqRel) == dropped {
                (self.on_unit_complete)();
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("playback stopped");
        }
        self.producer = None;
        self.pending.store(0, Ordering::Release);
    }
}

// ── PlaybackEngine ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Accumulating,
    Playing,
}

/// Ordered fragment queue with gapless sequential playback.
///
/// Fragments accumulate while a unit is playing; on unit completion the
/// queue is coalesced into the next unit. `PlaybackEvent::Started` fires
/// once per silence→speech transition and `Finished` once per
/// speech→silence transition.
pub struct PlaybackEngine {
    sink: Box<dyn PlaybackSink>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    queue: Vec<Vec<u8>>,
    playing: bool,
    in_episode: bool,
}

impl PlaybackEngine {
    pub fn new(sink: Box<dyn PlaybackSink>, events: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self {
            sink,
            events,
            queue: Vec::new(),
            playing: false,
            in_episode: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.playing {
            PlaybackState::Playing
        } else if !self.queue.is_empty() {
            PlaybackState::Accumulating
        } else {
            PlaybackState::Idle
        }
    }

    /// Append one raw PCM16 fragment. A fragment that cannot hold whole
    /// samples is dropped without touching the rest of the queue.
    pub fn enqueue(&mut self, fragment: Vec<u8>) {
        if fragment.len() % 2 != 0 {
            tracing::warn!(len = fragment.len(), "dropping malformed audio fragment");
            return;
        }
        self.queue.push(fragment);
        self.advance();
    }

    /// Start the next unit if idle: coalesce every queued fragment in
    /// arrival order, decode, and hand the unit to the sink.
    pub fn advance(&mut self) {
        if !self.queue.is_empty() && !self.playing {
            let total: usize = self.queue.iter().map(|f| f.len()).sum();
            let mut unit = Vec::with_capacity(total);
            for fragment in self.queue.drain(..) {
                unit.extend_from_slice(&fragment);
            }

            match decode_pcm16(&unit) {
                Ok(samples) if samples.is_empty() => {}
                Ok(samples) => match self.sink.play(&samples) {
                    Ok(()) => {
                        if !self.in_episode {
                            self.in_episode = true;
                            let _ = self.events.send(PlaybackEvent::Started);
                        }
                        self.playing = true;
                    }
                    Err(e) => tracing::error!("playback failed: {e}"),
                },
                Err(e) => tracing::warn!("dropping undecodable playback unit: {e}"),
            }
        }

        if self.queue.is_empty() && !self.playing && self.in_episode {
            self.in_episode = false;
            let _ = self.events.send(PlaybackEvent::Finished);
        }
    }

    /// Sink completion callback: the current unit finished, drain whatever
    /// arrived in the meantime.
    pub fn handle_unit_complete(&mut self) {
        self.playing = false;
        self.advance();
    }

    /// Stop any in-flight playback, release the output device, and drop all
    /// queued fragments. Safe from any state, repeatedly.
    pub fn reset(&mut self) {
        self.sink.stop();
        self.queue.clear();
        self.playing = false;
        self.in_episode = false;
    }
}
