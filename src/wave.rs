//! Canonical WAVE ingestion.
//!
//! Reads the fixed-offset canonical layout: channel count at byte 22,
//! sample rate at byte 24, bits per sample at byte 34, data-chunk length at
//! byte 40, samples from byte 44 as signed little-endian integers of width
//! `bits / 8`, normalized by `2^(bits - 1)` into `f64`. This layout is a
//! bit-exact contract; files carrying extra chunks before `data` are
//! misread by design, and no resampling or channel conversion happens here.

use std::fs;
use std::path::Path;

use crate::error::EngineError;

/// Byte offset of the first sample in the canonical layout.
const DATA_OFFSET: usize = 44;

/// Decoded, normalized PCM with its source metadata.
#[derive(Debug, Clone)]
pub struct SampleData {
    /// Interleaved samples in [-1, +1], in source channel order.
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl SampleData {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// Reads and parses a canonical WAVE file.
pub fn read_wave_file(path: impl AsRef<Path>) -> Result<SampleData, EngineError> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| EngineError::SourceOpenFailed(format!("{}: {e}", path.display())))?;
    parse_wave(&bytes)
}

/// Parses an in-memory canonical WAVE image.
pub fn parse_wave(bytes: &[u8]) -> Result<SampleData, EngineError> {
    if bytes.len() < DATA_OFFSET {
        return Err(EngineError::SourceMalformed(format!(
            "header needs {DATA_OFFSET} bytes, got {}",
            bytes.len()
        )));
    }

    let channels = u16::from_le_bytes([bytes[22], bytes[23]]);
    let sample_rate = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    let bits_per_sample = u16::from_le_bytes([bytes[34], bytes[35]]);
    let data_len = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]) as usize;

    if bits_per_sample == 0 || bits_per_sample > 32 || bits_per_sample % 8 != 0 {
        return Err(EngineError::SourceMalformed(format!(
            "unsupported bits per sample: {bits_per_sample}"
        )));
    }

    let bytes_per_sample = bits_per_sample as usize / 8;
    let sample_count = data_len / bytes_per_sample;
    if DATA_OFFSET + sample_count * bytes_per_sample > bytes.len() {
        return Err(EngineError::SourceMalformed(format!(
            "data chunk claims {data_len} bytes past offset {DATA_OFFSET}, file has {}",
            bytes.len()
        )));
    }

    let full_scale = (1i64 << (bits_per_sample - 1)) as f64;
    let mut samples = Vec::with_capacity(sample_count);
    for n in 0..sample_count {
        let at = DATA_OFFSET + n * bytes_per_sample;
        let raw = sign_extend_le(&bytes[at..at + bytes_per_sample]);
        samples.push(raw as f64 / full_scale);
    }

    Ok(SampleData {
        samples,
        sample_rate,
        channels,
        bits_per_sample,
    })
}

/// Little-endian signed read of 1..=8 bytes into an i64.
fn sign_extend_le(raw: &[u8]) -> i64 {
    let mut value = 0i64;
    for (i, byte) in raw.iter().enumerate() {
        value |= (*byte as i64) << (8 * i);
    }
    let unused = 64 - 8 * raw.len() as u32;
    (value << unused) >> unused
}
