//! The mixing loop: block ring, free-block pacing and voice summation.
//!
//! One iteration claims a free-block credit, drains pending control
//! commands, prunes exhausted voices, composes one block by summing every
//! needle of every active voice, clips, scales to int32 and submits. The
//! device-side completion handler returns credits; the counter plus the
//! condvar form a counting semaphore of capacity `block_count`.

use std::sync::atomic::Ordering;
use std::sync::{Arc, MutexGuard};

use crossbeam_channel::Receiver;

use crate::device::BlockSink;
use crate::engine::EngineShared;
use crate::report::{Origin, Reporter, Severity};
use crate::voice::{Filter, VoiceCore};

/// Largest magnitude representable after scaling: 2^31 - 1.
pub(crate) const MAX_SAMPLE: f64 = 2_147_483_647.0;

/// Control messages routed from voice handles to the mixer thread.
pub(crate) enum Command {
    Play(Arc<VoiceCore>),
    Stop(Arc<VoiceCore>),
}

/// Saturates an amplitude to [-1, +1] before integer scaling.
#[inline]
pub(crate) fn clip(amplitude: f64) -> f64 {
    if amplitude >= 0.0 {
        amplitude.min(1.0)
    } else {
        amplitude.max(-1.0)
    }
}

/// The ring of output blocks: `block_count` fixed slots of `block_samples`
/// zero-initialised int32 samples, with a prepared marker per slot.
pub(crate) struct BlockRing {
    samples: Box<[i32]>,
    prepared: Box<[bool]>,
    block_count: usize,
    block_samples: usize,
    current: usize,
}

impl BlockRing {
    pub(crate) fn new(block_count: usize, block_samples: usize) -> Self {
        Self {
            samples: vec![0; block_count * block_samples].into_boxed_slice(),
            prepared: vec![false; block_count].into_boxed_slice(),
            block_count,
            block_samples,
            current: 0,
        }
    }

    fn current_mut(&mut self) -> &mut [i32] {
        let at = self.current * self.block_samples;
        &mut self.samples[at..at + self.block_samples]
    }

    fn current_block(&self) -> &[i32] {
        let at = self.current * self.block_samples;
        &self.samples[at..at + self.block_samples]
    }

    /// Clears the prepared marker left by the slot's previous submission.
    /// The credit claimed for this iteration guarantees the device is done
    /// with it.
    fn reclaim(&mut self) {
        if self.prepared[self.current] {
            self.prepared[self.current] = false;
        }
    }

    fn mark_prepared(&mut self) {
        self.prepared[self.current] = true;
    }

    fn advance(&mut self) {
        self.current = (self.current + 1) % self.block_count;
    }
}

pub(crate) struct Mixer {
    shared: Arc<EngineShared>,
    commands: Receiver<Command>,
    active: Vec<Arc<VoiceCore>>,
    ring: BlockRing,
    sink: Box<dyn BlockSink>,
    reporter: Arc<dyn Reporter>,
    origin: Origin,
}

impl Mixer {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        commands: Receiver<Command>,
        ring: BlockRing,
        sink: Box<dyn BlockSink>,
        reporter: Arc<dyn Reporter>,
        origin: Origin,
    ) -> Self {
        Self {
            shared,
            commands,
            active: Vec::new(),
            ring,
            sink,
            reporter,
            origin,
        }
    }

    /// Thread main: one block per claimed credit until the engine powers
    /// off. Exiting drops the sink and releases any still-active cores.
    pub(crate) fn run(mut self) {
        while self.claim_block() {
            self.produce_block();
        }
        for core in &self.active {
            core.active.store(false, Ordering::Release);
        }
    }

    /// Claims one free-block credit, sleeping on the wait condvar while
    /// none is available. Returns false once the engine powers off.
    fn claim_block(&self) -> bool {
        loop {
            if !self.shared.is_powered() {
                return false;
            }
            if self.shared.try_claim_block() {
                return true;
            }
            self.shared.wait_for_block();
        }
    }

    /// One iteration minus the pacing: reclaim the slot, drain commands,
    /// prune, compose, submit, advance.
    pub(crate) fn produce_block(&mut self) {
        self.ring.reclaim();
        self.drain_commands();
        self.prune();
        self.compose();
        if let Err(e) = self.sink.submit(self.ring.current_block()) {
            self.reporter.report(
                Severity::Fault,
                &self.origin,
                &format!("block submission failed: {e}"),
            );
        }
        self.ring.mark_prepared();
        self.ring.advance();
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Play(core) => {
                    if core.stream.is_empty() {
                        continue;
                    }
                    core.needles.lock().unwrap().push(0);
                    if !core.active.swap(true, Ordering::AcqRel) {
                        self.active.push(core);
                    }
                }
                Command::Stop(core) => core.needles.lock().unwrap().clear(),
            }
        }
    }

    fn prune(&mut self) {
        self.active.retain(|core| {
            let keep = !core.needles.lock().unwrap().is_empty();
            if !keep {
                core.active.store(false, Ordering::Release);
            }
            keep
        });
    }

    fn compose(&mut self) {
        let Mixer {
            shared,
            active,
            ring,
            ..
        } = self;
        let spec = shared.spec();
        let channels = spec.channels as usize;
        let block = ring.current_mut();

        // Engine pause freezes every needle; the device keeps eating blocks.
        if shared.is_paused() {
            block.fill(0);
            return;
        }

        let engine_gain = shared.volume() * if shared.is_muted() { 0.0 } else { 1.0 };
        let engine_filter = shared.filter();

        // One strip per active voice. Flags, volume and filter are sampled
        // once per block (a one-block lag on a racing write is inaudible);
        // the needle locks are held for the whole composition.
        struct Strip<'a> {
            stream: &'a [f64],
            needles: MutexGuard<'a, Vec<usize>>,
            gain: f64,
            paused: bool,
            looping: bool,
            filter: Option<Arc<Filter>>,
        }

        let mut strips: Vec<Strip<'_>> = active
            .iter()
            .map(|core| Strip {
                stream: &core.stream[..],
                needles: core.needles.lock().unwrap(),
                gain: core.volume() * if core.muted.load(Ordering::Relaxed) { 0.0 } else { 1.0 },
                paused: core.paused.load(Ordering::Relaxed),
                looping: core.looping.load(Ordering::Relaxed),
                filter: core.filter.load_full(),
            })
            .collect();

        for frame in (0..spec.block_samples).step_by(channels) {
            for channel in 0..channels {
                let mut amplitude = 0.0;
                for strip in strips.iter_mut() {
                    if strip.paused {
                        continue;
                    }
                    let stream = strip.stream;
                    let looping = strip.looping;
                    let gain = strip.gain * engine_gain;
                    let filter = &strip.filter;
                    strip.needles.retain_mut(|needle| {
                        let sample = stream[*needle];
                        amplitude += match filter {
                            Some(f) => f.apply(sample, channel),
                            None => sample,
                        } * gain;
                        *needle += 1;
                        if *needle >= stream.len() {
                            *needle = 0;
                            looping
                        } else {
                            true
                        }
                    });
                }
                if let Some(f) = &engine_filter {
                    amplitude = f.apply(amplitude, channel);
                }
                block[frame + channel] = (clip(amplitude) * MAX_SAMPLE) as i32;
            }
        }
    }
}
