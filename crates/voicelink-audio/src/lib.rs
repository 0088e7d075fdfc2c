pub mod capture;
pub mod device;
pub mod playback;
pub mod resample;

pub use capture::{CaptureEngine, CaptureOptions, CaptureSession};
pub use device::DeviceManager;
pub use playback::{CpalSink, PlaybackEngine, PlaybackOptions, PlaybackSink, PlaybackState};
pub use resample::{decode_pcm16, encode_pcm16, resample};
