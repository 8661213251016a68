//! Output device seam.
//!
//! The engine consumes the platform audio stack through three narrow
//! traits: [`OutputBackend`] enumerates devices and opens one,
//! [`DeviceHandle`] is the control-thread side (reset at teardown), and
//! [`BlockSink`] is the mixer side (block submission). Completion flows the
//! other way: the backend invokes the [`EventHandler`] installed at open
//! time once per fully consumed block, from whatever thread the platform
//! callback runs on.

use std::sync::Arc;

use crate::error::EngineError;

mod offline;
mod stream;

pub use offline::OfflineBackend;
pub use stream::CpalBackend;

/// Events delivered by a backend to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A previously submitted block has been consumed.
    BlockDone,
    /// The device is shutting down; no further events will follow.
    Closing,
}

/// Callback installed at open time. Invoked from arbitrary threads.
pub type EventHandler = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// Output format and block geometry requested from a backend.
#[derive(Debug, Clone, Copy)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_count: usize,
    pub block_samples: usize,
}

/// Mixer-side submission path. Moved into the mixer thread.
pub trait BlockSink: Send {
    /// Hands one composed block (`block_samples` interleaved i32 samples)
    /// to the device. Free-block accounting guarantees the sink has room
    /// for it; a refusal is a backend defect surfaced as [`EngineError::SinkStalled`].
    fn submit(&mut self, block: &[i32]) -> Result<(), EngineError>;
}

/// Control-thread side of an opened device.
pub trait DeviceHandle {
    /// Stops playback and abandons any queued audio. Emits
    /// [`DeviceEvent::Closing`]; no event follows it.
    fn reset(&mut self);
}

/// An opened output: the two halves of the device connection.
pub struct OpenOutput {
    pub handle: Box<dyn DeviceHandle>,
    pub sink: Box<dyn BlockSink>,
}

/// Access to an audio backend: device enumeration and stream creation.
pub trait OutputBackend {
    /// Display names of the available output devices, in backend order.
    /// Devices whose name cannot be read are skipped.
    fn device_names(&self) -> Vec<String>;

    /// Opens the device at `device_index` (or the backend default for
    /// `None`) for PCM int32 output at the spec's rate and channel count.
    fn open(
        &self,
        device_index: Option<usize>,
        spec: &StreamSpec,
        on_event: EventHandler,
    ) -> Result<OpenOutput, EngineError>;
}
