//! cpal-backed output: an int32 stream fed from a lock-free SPSC ring.
//!
//! `submit` pushes one block into the ring; the stream callback drains it
//! into the device buffer and emits one `BlockDone` per `block_samples`
//! consumed. The ring holds `block_count` blocks, so with free-block
//! accounting upstream it can never overflow.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};

use super::{
    BlockSink, DeviceEvent, DeviceHandle, EventHandler, OpenOutput, OutputBackend, StreamSpec,
};
use crate::error::EngineError;

/// Production backend over the platform's default audio host.
pub struct CpalBackend;

impl OutputBackend for CpalBackend {
    fn device_names(&self) -> Vec<String> {
        let Ok(devices) = cpal::default_host().output_devices() else {
            return Vec::new();
        };
        devices.filter_map(|d| d.name().ok()).collect()
    }

    fn open(
        &self,
        device_index: Option<usize>,
        spec: &StreamSpec,
        on_event: EventHandler,
    ) -> Result<OpenOutput, EngineError> {
        let host = cpal::default_host();
        let device = match device_index {
            Some(index) => host
                .output_devices()
                .map_err(|e| EngineError::DeviceOpenFailed(e.to_string()))?
                .nth(index)
                .ok_or_else(|| {
                    EngineError::DeviceOpenFailed(format!("output device {index} vanished"))
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| EngineError::DeviceOpenFailed("no default output device".into()))?,
        };

        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: spec.sample_rate as SampleRate,
            buffer_size: BufferSize::Default,
        };

        let ring = HeapRb::<i32>::new(spec.block_count * spec.block_samples);
        let (producer, mut consumer) = ring.split();

        let block_samples = spec.block_samples;
        let events = Arc::clone(&on_event);
        let mut drained = 0usize;
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i32], _: &cpal::OutputCallbackInfo| {
                    let got = consumer.pop_slice(data);
                    // underrun: the device hears silence
                    data[got..].fill(0);
                    drained += got;
                    while drained >= block_samples {
                        drained -= block_samples;
                        events(DeviceEvent::BlockDone);
                    }
                },
                |err| eprintln!("output stream error: {err}"),
                None,
            )
            .map_err(|e| EngineError::DeviceOpenFailed(e.to_string()))?;
        stream
            .play()
            .map_err(|e| EngineError::DeviceOpenFailed(e.to_string()))?;

        Ok(OpenOutput {
            handle: Box::new(StreamHandle { stream, on_event }),
            sink: Box::new(RingSink { producer }),
        })
    }
}

struct StreamHandle {
    stream: cpal::Stream,
    on_event: EventHandler,
}

impl DeviceHandle for StreamHandle {
    fn reset(&mut self) {
        let _ = self.stream.pause();
        (self.on_event)(DeviceEvent::Closing);
    }
}

struct RingSink {
    producer: HeapProd<i32>,
}

impl BlockSink for RingSink {
    fn submit(&mut self, block: &[i32]) -> Result<(), EngineError> {
        if self.producer.push_slice(block) < block.len() {
            return Err(EngineError::SinkStalled);
        }
        Ok(())
    }
}
