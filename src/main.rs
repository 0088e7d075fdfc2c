use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voicelink_audio::{
    encode_pcm16, resample, CaptureEngine, CaptureOptions, CpalSink, PlaybackEngine,
    PlaybackOptions,
};
use voicelink_core::{AppConfig, ChunkSnapshot, PlaybackEvent, SessionEvent};
use voicelink_provider::{ProviderAdapter, ProviderRegistry};
use voicelink_session::{SessionOptions, StreamingSession};

#[derive(Parser)]
#[command(name = "voicelink", about = "Streaming speech loop for avatar frontends")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream microphone audio to the recognition provider and print transcripts
    Listen,
    /// Synthesize text and play it through the output device
    Speak { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;

    let env_filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Listen => listen(config).await,
        Command::Speak { text } => speak(config, text).await,
    }
}

fn make_adapter(config: &AppConfig, provider: &str) -> Result<Box<dyn ProviderAdapter>> {
    let registry = ProviderRegistry::new();
    let mut adapter = registry
        .create(provider)
        .with_context(|| format!("unknown provider '{}'", provider))?;
    adapter
        .initialize(config.provider_config(provider))
        .with_context(|| format!("failed to initialize provider '{}'", provider))?;
    Ok(adapter)
}

// ── listen ────────────────────────────────────────────────────

/// Microphone worker. Device stream handles are not Send, so the engine
/// lives on its own thread and reports chunks through a channel.
struct CaptureWorker {
    stop: std::sync::mpsc::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

impl CaptureWorker {
    async fn start(
        options: CaptureOptions,
        chunk_tx: mpsc::UnboundedSender<ChunkSnapshot>,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let thread = std::thread::spawn(move || {
            let mut engine = CaptureEngine::new(options);
            let result = match engine.open() {
                Ok(device) => engine.start(&device, chunk_tx),
                Err(e) => Err(e),
            };
            let started = result.is_ok();
            let _ = ready_tx.send(result);
            if started {
                // Hold the device stream open until told to stop
                let _ = stop_rx.recv();
                engine.stop();
            }
        });

        ready_rx.await.context("capture worker exited")??;
        Ok(Self {
            stop: stop_tx,
            thread,
        })
    }

    fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.thread.join();
    }
}

async fn listen(config: AppConfig) -> Result<()> {
    let service = config
        .recognition
        .clone()
        .context("no [recognition] provider configured")?;
    let adapter = make_adapter(&config, &service.provider)?;

    let mut session = StreamingSession::new(SessionOptions::from(&config.session));
    let mut events = session.open(adapter).await?;
    tracing::info!(provider = %service.provider, "recognition session opening");

    let capture_options = CaptureOptions {
        device_name: config.capture.device_name.clone(),
        frame_size: config.capture.frame_size,
        target_sample_rate: config.capture.target_sample_rate,
    };
    let target_rate = config.capture.target_sample_rate;
    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<ChunkSnapshot>();
    let mut capture: Option<CaptureWorker> = None;
    let mut stopping = false;

    loop {
        tokio::select! {
            maybe_chunk = chunk_rx.recv() => match maybe_chunk {
                Some(chunk) => {
                    let wire = resample(&chunk.samples, chunk.native_rate, target_rate);
                    session.send_audio(encode_pcm16(&wire));
                }
                None => break,
            },
            maybe_event = events.recv() => match maybe_event {
                Some(SessionEvent::Started) => {
                    tracing::info!("session active, opening microphone");
                    capture = Some(
                        CaptureWorker::start(capture_options.clone(), chunk_tx.clone()).await?,
                    );
                }
                Some(SessionEvent::Result(result)) => {
                    if result.is_final {
                        println!("\r{}", result.text);
                    } else {
                        print!("\r{}", result.text);
                        let _ = std::io::stdout().flush();
                    }
                }
                Some(SessionEvent::Completed) => {
                    tracing::info!("session completed");
                    break;
                }
                Some(SessionEvent::Failed { code, message }) => {
                    tracing::error!(code, %message, "recognition failed");
                    break;
                }
                // Recognition sessions carry no inbound audio
                Some(SessionEvent::Audio(_)) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if stopping {
                    break;
                }
                stopping = true;
                tracing::info!("stopping");
                if let Some(worker) = capture.take() {
                    worker.stop();
                }
                session.stop();
            }
        }
    }

    if let Some(worker) = capture.take() {
        worker.stop();
    }
    session.close().await;
    Ok(())
}

// ── speak ─────────────────────────────────────────────────────

enum PlaybackCmd {
    Fragment(Vec<u8>),
    UnitComplete,
    Shutdown,
}

async fn speak(config: AppConfig, text: String) -> Result<()> {
    let service = config
        .synthesis
        .clone()
        .context("no [synthesis] provider configured")?;
    let adapter = make_adapter(&config, &service.provider)?;

    let mut session = StreamingSession::new(SessionOptions::from(&config.session));
    let mut events = session.open(adapter).await?;
    tracing::info!(provider = %service.provider, "synthesis session opening");

    // Playback worker thread, same ownership story as capture: the output
    // stream stays on one thread, fragments and completions arrive over a
    // command channel.
    let (play_tx, mut play_rx) = mpsc::unbounded_channel::<PlaybackCmd>();
    let (playback_events_tx, mut playback_events) = mpsc::unbounded_channel();
    let playback_options = PlaybackOptions {
        device_name: config.playback.device_name.clone(),
        sample_rate: config.playback.sample_rate,
        channels: config.playback.channels,
    };
    let completion_tx = play_tx.clone();
    let playback_thread = std::thread::spawn(move || {
        let sink = CpalSink::new(playback_options, move || {
            let _ = completion_tx.send(PlaybackCmd::UnitComplete);
        });
        let mut engine = PlaybackEngine::new(Box::new(sink), playback_events_tx);
        while let Some(cmd) = play_rx.blocking_recv() {
            match cmd {
                PlaybackCmd::Fragment(bytes) => engine.enqueue(bytes),
                PlaybackCmd::UnitComplete => engine.handle_unit_complete(),
                PlaybackCmd::Shutdown => {
                    engine.reset();
                    break;
                }
            }
        }
    });

    let mut synthesis_done = false;
    let mut speaking = false;

    loop {
        tokio::select! {
            maybe_event = events.recv(), if !synthesis_done => match maybe_event {
                Some(SessionEvent::Started) => {
                    // Queue the whole input, then ask the provider to finish
                    session.send_text(&text);
                    session.stop();
                }
                Some(SessionEvent::Audio(bytes)) => {
                    let _ = play_tx.send(PlaybackCmd::Fragment(bytes));
                }
                Some(SessionEvent::Completed) => synthesis_done = true,
                Some(SessionEvent::Failed { code, message }) => {
                    tracing::error!(code, %message, "synthesis failed");
                    synthesis_done = true;
                }
                Some(SessionEvent::Result(_)) => {}
                None => synthesis_done = true,
            },
            maybe_playback = playback_events.recv() => match maybe_playback {
                Some(PlaybackEvent::Started) => {
                    speaking = true;
                    tracing::info!("avatar speaking");
                }
                Some(PlaybackEvent::Finished) => {
                    speaking = false;
                    tracing::info!("avatar idle");
                    if synthesis_done {
                        break;
                    }
                }
                None => break,
            },
            // Synthesis ended with no (more) audio in flight
            _ = tokio::time::sleep(Duration::from_millis(200)), if synthesis_done && !speaking => {
                break;
            }
        }
    }

    let _ = play_tx.send(PlaybackCmd::Shutdown);
    let _ = playback_thread.join();
    session.close().await;
    Ok(())
}
