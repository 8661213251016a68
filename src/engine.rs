//! Engine: one output device, one mixer thread, many voices.
//!
//! Construction resolves the device by exact name over the backend's
//! enumeration, opens it for PCM int32 output, allocates the block ring and
//! spawns the mixer. Teardown powers the engine off, wakes and joins the
//! mixer, then resets the device. Engine-wide pause, mute, volume and the
//! filter are shared atomically with the mixer and sampled once per block.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Sender};

use crate::config::EngineConfig;
use crate::device::{
    CpalBackend, DeviceEvent, DeviceHandle, EventHandler, OutputBackend, StreamSpec,
};
use crate::error::EngineError;
use crate::mixer::{BlockRing, Command, Mixer};
use crate::report::{Origin, Reporter, Severity};
use crate::voice::Filter;

/// Capacity of the control command queue feeding the mixer.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// State shared between the engine handle, the mixer thread and the
/// device-completion handler.
pub(crate) struct EngineShared {
    spec: StreamSpec,
    powered: AtomicBool,
    /// Blocks the mixer may claim; with the condvar below this forms a
    /// counting semaphore of capacity `spec.block_count`.
    free_blocks: AtomicUsize,
    wake: Mutex<()>,
    wake_cond: Condvar,
    paused: AtomicBool,
    muted: AtomicBool,
    volume_bits: AtomicU64,
    filter: ArcSwapOption<Filter>,
}

impl EngineShared {
    pub(crate) fn new(spec: StreamSpec) -> Self {
        Self {
            free_blocks: AtomicUsize::new(spec.block_count),
            spec,
            powered: AtomicBool::new(false),
            wake: Mutex::new(()),
            wake_cond: Condvar::new(),
            paused: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            volume_bits: AtomicU64::new(1.0f64.to_bits()),
            filter: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn spec(&self) -> StreamSpec {
        self.spec
    }

    pub(crate) fn is_powered(&self) -> bool {
        self.powered.load(Ordering::Acquire)
    }

    pub(crate) fn power_on(&self) {
        self.powered.store(true, Ordering::Release);
    }

    /// Clears powered and wakes the mixer out of any free-block wait.
    pub(crate) fn power_off(&self) {
        self.powered.store(false, Ordering::Release);
        let _guard = self.wake.lock().unwrap();
        self.wake_cond.notify_all();
    }

    /// Device-completion path: returns one block credit and wakes the mixer.
    /// Idempotent in effect: back-to-back signals collapse into the counter.
    pub(crate) fn signal_block_done(&self) {
        self.free_blocks.fetch_add(1, Ordering::Release);
        let _guard = self.wake.lock().unwrap();
        self.wake_cond.notify_one();
    }

    /// Claims one credit if any is available. Only the mixer calls this, so
    /// a nonzero observation cannot be raced below zero.
    pub(crate) fn try_claim_block(&self) -> bool {
        if self.free_blocks.load(Ordering::Acquire) > 0 {
            self.free_blocks.fetch_sub(1, Ordering::AcqRel);
            return true;
        }
        false
    }

    /// Parks until a completion signal or teardown. Spurious wakes are
    /// handled by the caller re-checking.
    pub(crate) fn wait_for_block(&self) {
        let guard = self.wake.lock().unwrap();
        if self.free_blocks.load(Ordering::Acquire) == 0 && self.is_powered() {
            let _unused = self.wake_cond.wait(guard).unwrap();
        }
    }

    /// One courtesy wake after spawn so the mixer starts promptly.
    fn nudge(&self) {
        let _guard = self.wake.lock().unwrap();
        self.wake_cond.notify_one();
    }

    pub(crate) fn free_blocks(&self) -> usize {
        self.free_blocks.load(Ordering::Acquire)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub(crate) fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub(crate) fn volume(&self) -> f64 {
        f64::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f64) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn filter(&self) -> Option<Arc<Filter>> {
        self.filter.load_full()
    }

    pub(crate) fn set_filter(&self, filter: Option<Arc<Filter>>) {
        self.filter.store(filter);
    }
}

/// A running audio engine bound to one output device.
///
/// Dropping the engine joins the mixer and releases the device. Voices may
/// outlive it; their operations then become no-ops.
pub struct Engine {
    shared: Arc<EngineShared>,
    commands: Sender<Command>,
    handle: Box<dyn DeviceHandle>,
    mixer: Option<JoinHandle<()>>,
    device_name: Option<String>,
    reporter: Arc<dyn Reporter>,
    origin: Origin,
}

impl Engine {
    /// Opens the engine on the platform audio stack.
    pub fn new(config: EngineConfig, reporter: Arc<dyn Reporter>) -> Result<Engine, EngineError> {
        Self::with_backend(config, &CpalBackend, reporter)
    }

    /// Opens the engine against a caller-supplied backend (offline
    /// rendering, benches, tests).
    pub fn with_backend(
        config: EngineConfig,
        backend: &dyn OutputBackend,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Engine, EngineError> {
        let spec = config.stream_spec();
        let shared = Arc::new(EngineShared::new(spec));
        let origin = Origin::new("Engine", Arc::as_ptr(&shared) as usize);

        if let Err(e) = config.validate() {
            reporter.report(Severity::Fault, &origin, &e.to_string());
            return Err(e);
        }

        let device_index = match &config.device {
            Some(name) => {
                let names = backend.device_names();
                match names.iter().position(|candidate| candidate == name) {
                    Some(index) => Some(index),
                    None => {
                        let err = EngineError::DeviceNotFound(name.clone());
                        reporter.report(Severity::Fault, &origin, &err.to_string());
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        reporter.report(Severity::Pending, &origin, "opening output device");
        let on_event: EventHandler = {
            let shared = Arc::clone(&shared);
            Arc::new(move |event| {
                if event == DeviceEvent::BlockDone {
                    shared.signal_block_done();
                }
            })
        };
        let output = match backend.open(device_index, &spec, on_event) {
            Ok(output) => output,
            Err(e) => {
                reporter.report(Severity::Fault, &origin, &e.to_string());
                return Err(e);
            }
        };

        let ring = BlockRing::new(spec.block_count, spec.block_samples);
        let (commands, command_rx) = bounded(COMMAND_QUEUE_DEPTH);

        shared.power_on();
        let mixer = Mixer::new(
            Arc::clone(&shared),
            command_rx,
            ring,
            output.sink,
            Arc::clone(&reporter),
            origin.clone(),
        );
        let thread = match thread::Builder::new()
            .name("velours-mixer".into())
            .spawn(move || mixer.run())
        {
            Ok(thread) => thread,
            Err(e) => {
                shared.power_off();
                let err = EngineError::ThreadStartFailed(e.to_string());
                reporter.report(Severity::Fault, &origin, &err.to_string());
                return Err(err);
            }
        };
        shared.nudge();
        reporter.report(Severity::Ok, &origin, "running");

        Ok(Engine {
            shared,
            commands,
            handle: output.handle,
            mixer: Some(thread),
            device_name: config.device,
            reporter,
            origin,
        })
    }

    pub fn pause(&self) -> &Self {
        self.shared.set_paused(true);
        self
    }

    pub fn resume(&self) -> &Self {
        self.shared.set_paused(false);
        self
    }

    pub fn swap_pause(&self) -> &Self {
        self.shared.paused.fetch_xor(true, Ordering::Relaxed);
        self
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn mute(&self) -> &Self {
        self.shared.set_muted(true);
        self
    }

    pub fn unmute(&self) -> &Self {
        self.shared.set_muted(false);
        self
    }

    pub fn swap_mute(&self) -> &Self {
        self.shared.muted.fetch_xor(true, Ordering::Relaxed);
        self
    }

    pub fn is_muted(&self) -> bool {
        self.shared.is_muted()
    }

    pub fn volume_to(&self, volume: f64) -> &Self {
        self.shared.set_volume(volume);
        self
    }

    pub fn volume(&self) -> f64 {
        self.shared.volume()
    }

    pub fn filter_to(&self, f: impl Fn(f64, usize) -> f64 + Send + Sync + 'static) -> &Self {
        self.shared.set_filter(Some(Arc::new(Filter::new(f))));
        self
    }

    pub fn drop_filter(&self) -> &Self {
        self.shared.set_filter(None);
        self
    }

    pub fn filter(&self) -> Option<Arc<Filter>> {
        self.shared.filter()
    }

    /// The device name this engine was bound with; `None` means the
    /// backend's default device.
    pub fn device(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn is_powered(&self) -> bool {
        self.shared.is_powered()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.spec.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.shared.spec.channels
    }

    pub fn block_count(&self) -> usize {
        self.shared.spec.block_count
    }

    pub fn block_samples(&self) -> usize {
        self.shared.spec.block_samples
    }

    /// Display names of the platform's output devices, in platform order.
    pub fn devices() -> Vec<String> {
        CpalBackend.device_names()
    }

    pub(crate) fn command_sender(&self) -> Sender<Command> {
        self.commands.clone()
    }

    pub(crate) fn reporter(&self) -> Arc<dyn Reporter> {
        Arc::clone(&self.reporter)
    }

    pub(crate) fn origin(&self) -> &Origin {
        &self.origin
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.reporter
            .report(Severity::Headsup, &self.origin, "powering down");
        self.shared.power_off();
        if let Some(thread) = self.mixer.take() {
            let _ = thread.join();
        }
        self.handle.reset();
    }
}
