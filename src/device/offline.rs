//! In-memory output for headless rendering, benchmarks and tests.
//!
//! Captures every submitted block. Completion is metered by a budget: each
//! submission is acknowledged with `BlockDone` while budget remains, so a
//! budget of `n` lets the mixer produce exactly `n` blocks beyond the
//! ring's initial credit before parking on the free-block wait. An
//! unbudgeted backend acknowledges everything and the mixer free-runs.

use std::sync::{Arc, Mutex};

use super::{
    BlockSink, DeviceEvent, DeviceHandle, EventHandler, OpenOutput, OutputBackend, StreamSpec,
};
use crate::error::EngineError;

struct OfflineState {
    captured: Vec<Vec<i32>>,
    /// Submissions not yet acknowledged with `BlockDone`.
    unacked: usize,
    /// Remaining acknowledgements; `None` is unlimited.
    remaining: Option<usize>,
    on_event: Option<EventHandler>,
}

impl OfflineState {
    /// Consumes budget against unacknowledged submissions; returns how many
    /// `BlockDone` events the caller must fire after releasing the lock.
    fn take_acks(&mut self) -> usize {
        let grantable = match self.remaining {
            Some(ref mut remaining) => {
                let n = self.unacked.min(*remaining);
                *remaining -= n;
                n
            }
            None => self.unacked,
        };
        self.unacked -= grantable;
        grantable
    }
}

/// Offline backend: captures blocks instead of playing them.
pub struct OfflineBackend {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineBackend {
    /// Unlimited completion budget; the mixer free-runs.
    pub fn new() -> Self {
        Self::with_remaining(None)
    }

    /// Acknowledges only the first `blocks` submissions; afterwards the
    /// mixer parks once the ring's credit is spent.
    pub fn with_budget(blocks: usize) -> Self {
        Self::with_remaining(Some(blocks))
    }

    fn with_remaining(remaining: Option<usize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(OfflineState {
                captured: Vec::new(),
                unacked: 0,
                remaining,
                on_event: None,
            })),
        }
    }

    /// Extends a budgeted backend by `blocks` further acknowledgements,
    /// releasing any submissions already waiting on budget.
    pub fn grant(&self, blocks: usize) {
        let (acks, on_event) = {
            let mut state = self.state.lock().unwrap();
            if let Some(ref mut remaining) = state.remaining {
                *remaining += blocks;
            }
            (state.take_acks(), state.on_event.clone())
        };
        if let Some(events) = on_event {
            for _ in 0..acks {
                events(DeviceEvent::BlockDone);
            }
        }
    }

    /// Snapshot of every captured block, in submission order.
    pub fn blocks(&self) -> Vec<Vec<i32>> {
        self.state.lock().unwrap().captured.clone()
    }

    pub fn block_count(&self) -> usize {
        self.state.lock().unwrap().captured.len()
    }

    /// Interleaved samples of every captured block, in submission order.
    pub fn samples(&self) -> Vec<i32> {
        self.state
            .lock()
            .unwrap()
            .captured
            .iter()
            .flatten()
            .copied()
            .collect()
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for OfflineBackend {
    fn device_names(&self) -> Vec<String> {
        vec!["offline".to_string()]
    }

    fn open(
        &self,
        _device_index: Option<usize>,
        _spec: &StreamSpec,
        on_event: EventHandler,
    ) -> Result<OpenOutput, EngineError> {
        self.state.lock().unwrap().on_event = Some(Arc::clone(&on_event));
        Ok(OpenOutput {
            handle: Box::new(OfflineHandle {
                state: Arc::clone(&self.state),
                on_event,
            }),
            sink: Box::new(OfflineSink {
                state: Arc::clone(&self.state),
            }),
        })
    }
}

struct OfflineHandle {
    state: Arc<Mutex<OfflineState>>,
    on_event: EventHandler,
}

impl DeviceHandle for OfflineHandle {
    fn reset(&mut self) {
        self.state.lock().unwrap().on_event = None;
        (self.on_event)(DeviceEvent::Closing);
    }
}

struct OfflineSink {
    state: Arc<Mutex<OfflineState>>,
}

impl BlockSink for OfflineSink {
    fn submit(&mut self, block: &[i32]) -> Result<(), EngineError> {
        let (acks, on_event) = {
            let mut state = self.state.lock().unwrap();
            state.captured.push(block.to_vec());
            state.unacked += 1;
            (state.take_acks(), state.on_event.clone())
        };
        if let Some(events) = on_event {
            for _ in 0..acks {
                events(DeviceEvent::BlockDone);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec() -> StreamSpec {
        StreamSpec {
            sample_rate: 48_000,
            channels: 1,
            block_count: 4,
            block_samples: 8,
        }
    }

    fn counting_handler() -> (EventHandler, Arc<AtomicUsize>) {
        let done = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&done);
        let handler: EventHandler = Arc::new(move |event| {
            if event == DeviceEvent::BlockDone {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        (handler, done)
    }

    #[test]
    fn unbudgeted_acks_every_submission() {
        let backend = OfflineBackend::new();
        let (handler, done) = counting_handler();
        let mut output = backend.open(None, &spec(), handler).unwrap();
        for _ in 0..3 {
            output.sink.submit(&[0; 8]).unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(backend.block_count(), 3);
    }

    #[test]
    fn budget_meters_acks_and_grant_releases_backlog() {
        let backend = OfflineBackend::with_budget(1);
        let (handler, done) = counting_handler();
        let mut output = backend.open(None, &spec(), handler).unwrap();
        output.sink.submit(&[1; 8]).unwrap();
        output.sink.submit(&[2; 8]).unwrap();
        output.sink.submit(&[3; 8]).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        backend.grant(2);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(backend.blocks()[2], vec![3; 8]);
    }

    #[test]
    fn reset_stops_event_delivery() {
        let backend = OfflineBackend::with_budget(0);
        let (handler, done) = counting_handler();
        let mut output = backend.open(None, &spec(), handler).unwrap();
        output.sink.submit(&[0; 8]).unwrap();
        output.handle.reset();
        backend.grant(5);
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn samples_flattens_in_order() {
        let backend = OfflineBackend::new();
        let (handler, _done) = counting_handler();
        let mut output = backend.open(None, &spec(), handler).unwrap();
        output.sink.submit(&[1, 2]).unwrap();
        output.sink.submit(&[3, 4]).unwrap();
        assert_eq!(backend.samples(), vec![1, 2, 3, 4]);
    }
}
