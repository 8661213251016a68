//! Configuration types for the velours audio engine.

use crate::device::StreamSpec;
use crate::error::EngineError;

/// Output format and block geometry for an [`Engine`](crate::Engine).
///
/// A block holds `block_samples` interleaved samples, so it must be a
/// multiple of `channels`; the submission ring holds `block_count` blocks.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Output device name (exact match). `None` binds the backend default.
    pub device: Option<String>,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: u16,
    /// Number of blocks in the submission ring.
    pub block_count: usize,
    /// Samples per block, all channels interleaved.
    pub block_samples: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48_000,
            channels: 1,
            block_count: 16,
            block_samples: 256,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_block_count(mut self, block_count: usize) -> Self {
        self.block_count = block_count;
        self
    }

    pub fn with_block_samples(mut self, block_samples: usize) -> Self {
        self.block_samples = block_samples;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.channels == 0 {
            return Err(EngineError::InvalidLayout(
                "channel count must be at least 1".into(),
            ));
        }
        if self.block_count < 2 {
            return Err(EngineError::InvalidLayout(format!(
                "block count must be at least 2, got {}",
                self.block_count
            )));
        }
        if self.block_samples < self.channels as usize
            || self.block_samples % self.channels as usize != 0
        {
            return Err(EngineError::InvalidLayout(format!(
                "samples per block ({}) must be a nonzero multiple of the channel count ({})",
                self.block_samples, self.channels
            )));
        }
        Ok(())
    }

    pub(crate) fn stream_spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            block_count: self.block_count,
            block_samples: self.block_samples,
        }
    }
}
