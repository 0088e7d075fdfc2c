use voicelink_core::AudioError;

/// Nearest-neighbor rate conversion, no anti-aliasing filter.
///
/// Output length is `floor(len / (source / target))`; equal rates return
/// the input unchanged.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src = (i as f64 * ratio).round() as usize;
        out.push(samples[src.min(samples.len() - 1)]);
    }

    out
}

/// Pack float samples into little-endian signed 16-bit PCM. Samples are
/// clamped to [-1, 1]; negative values scale by 0x8000, non-negative by
/// 0x7FFF, so both endpoints land exactly on the i16 range.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = sample.clamp(-1.0, 1.0);
        let scaled = if value < 0.0 {
            value * 0x8000 as f32
        } else {
            value * 0x7FFF as f32
        } as i16;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

/// Unpack little-endian signed 16-bit PCM into float samples (`i16 / 32768`).
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, AudioError> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::Decode(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        out.push(value as f32 / 32768.0);
    }
    Ok(out)
}
