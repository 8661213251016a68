//! Voices: one decoded sample buffer plus its playback state.
//!
//! A [`Voice`] owns an immutable, shareable sample buffer and a set of
//! `needles`, independent read positions into it. Every `play` stacks one
//! more needle at position 0, so overlapping one-shots come for free. The
//! handle never touches the engine's active list directly: `play` and
//! `stop` are routed to the mixer thread as commands, while loop, pause,
//! mute, volume and the filter are shared atomically and sampled by the
//! mixer once per block.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Sender, TrySendError};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::mixer::Command;
use crate::report::{Origin, Reporter, Severity};
use crate::wave::{self, SampleData};

/// A user-supplied per-sample transform `(amplitude, channel) -> amplitude`.
pub struct Filter {
    f: Box<dyn Fn(f64, usize) -> f64 + Send + Sync>,
}

impl Filter {
    pub fn new(f: impl Fn(f64, usize) -> f64 + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    #[inline]
    pub fn apply(&self, amplitude: f64, channel: usize) -> f64 {
        (self.f)(amplitude, channel)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter")
    }
}

/// State shared between a [`Voice`] handle and the mixer thread.
///
/// The needle list is written only by the mixer (advance during
/// composition, push on Play, clear on Stop); handles take the lock for
/// read snapshots. Everything else is atomics or `ArcSwap`, so a handle
/// mutation lands within one block of composition.
pub(crate) struct VoiceCore {
    pub(crate) stream: Arc<[f64]>,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
    pub(crate) bits_per_sample: u16,
    pub(crate) needles: Mutex<Vec<usize>>,
    pub(crate) looping: AtomicBool,
    pub(crate) paused: AtomicBool,
    pub(crate) muted: AtomicBool,
    volume_bits: AtomicU64,
    pub(crate) filter: ArcSwapOption<Filter>,
    /// True iff the mixer currently holds this core in its active list.
    pub(crate) active: AtomicBool,
}

impl VoiceCore {
    pub(crate) fn new(
        stream: Arc<[f64]>,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    ) -> Self {
        Self {
            stream,
            sample_rate,
            channels,
            bits_per_sample,
            needles: Mutex::new(Vec::new()),
            looping: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            volume_bits: AtomicU64::new(1.0f64.to_bits()),
            filter: ArcSwapOption::empty(),
            active: AtomicBool::new(false),
        }
    }

    pub(crate) fn volume(&self) -> f64 {
        f64::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f64) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }
}

/// One playable sound bound to an [`Engine`].
pub struct Voice {
    core: Arc<VoiceCore>,
    commands: Sender<Command>,
    reporter: Arc<dyn Reporter>,
    origin: Origin,
}

impl Voice {
    /// Wraps already-decoded samples. Rate or channel mismatch against the
    /// engine is reported as a warning; the voice stays usable.
    pub fn from_data(engine: &Engine, data: SampleData) -> Voice {
        let voice = Self::build(engine, data);
        voice.reporter.report(
            Severity::Ok,
            &voice.origin,
            &format!("loaded {} samples", voice.sample_count()),
        );
        voice
    }

    /// Loads a canonical WAVE file (see [`crate::wave`]).
    pub fn from_wave_file(engine: &Engine, path: impl AsRef<Path>) -> Result<Voice, EngineError> {
        let path = path.as_ref();
        let data = match wave::read_wave_file(path) {
            Ok(data) => data,
            Err(e) => {
                engine.reporter().report(
                    Severity::Fault,
                    &engine.origin().nested("Voice", 0),
                    &e.to_string(),
                );
                return Err(e);
            }
        };
        let voice = Self::build(engine, data);
        voice.reporter.report(
            Severity::Ok,
            &voice.origin,
            &format!("loaded {} ({} samples)", path.display(), voice.sample_count()),
        );
        Ok(voice)
    }

    fn build(engine: &Engine, data: SampleData) -> Voice {
        let SampleData {
            samples,
            sample_rate,
            channels,
            bits_per_sample,
        } = data;
        let core = Arc::new(VoiceCore::new(
            samples.into(),
            sample_rate,
            channels,
            bits_per_sample,
        ));
        let origin = engine
            .origin()
            .nested("Voice", Arc::as_ptr(&core) as usize);
        let reporter = engine.reporter();

        if sample_rate != engine.sample_rate() {
            reporter.report(
                Severity::Warning,
                &origin,
                &format!(
                    "sample rate {sample_rate} Hz does not match the engine's {} Hz",
                    engine.sample_rate()
                ),
            );
        }
        if channels != engine.channels() {
            reporter.report(
                Severity::Warning,
                &origin,
                &format!(
                    "channel count {channels} does not match the engine's {}",
                    engine.channels()
                ),
            );
        }

        Voice {
            core,
            commands: engine.command_sender(),
            reporter,
            origin,
        }
    }

    /// Starts one more playback of this voice from the beginning. Each call
    /// stacks an independent needle; on an empty voice this is a no-op.
    pub fn play(&self) -> &Self {
        if self.core.stream.is_empty() {
            return self;
        }
        self.send(Command::Play(Arc::clone(&self.core)), "play");
        self
    }

    /// Ends every playback of this voice. The mixer drops it from the
    /// active list no later than its next iteration.
    pub fn stop(&self) -> &Self {
        self.send(Command::Stop(Arc::clone(&self.core)), "stop");
        self
    }

    fn send(&self, command: Command, what: &str) {
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.reporter.report(
                Severity::Warning,
                &self.origin,
                &format!("command queue full, {what} dropped"),
            ),
            // engine is stopping; dropped silently
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn looped(&self) -> &Self {
        self.core.looping.store(true, Ordering::Relaxed);
        self
    }

    pub fn unloop(&self) -> &Self {
        self.core.looping.store(false, Ordering::Relaxed);
        self
    }

    pub fn swap_loop(&self) -> &Self {
        self.core.looping.fetch_xor(true, Ordering::Relaxed);
        self
    }

    pub fn is_looping(&self) -> bool {
        self.core.looping.load(Ordering::Relaxed)
    }

    pub fn pause(&self) -> &Self {
        self.core.paused.store(true, Ordering::Relaxed);
        self
    }

    pub fn resume(&self) -> &Self {
        self.core.paused.store(false, Ordering::Relaxed);
        self
    }

    pub fn swap_pause(&self) -> &Self {
        self.core.paused.fetch_xor(true, Ordering::Relaxed);
        self
    }

    pub fn is_paused(&self) -> bool {
        self.core.paused.load(Ordering::Relaxed)
    }

    pub fn mute(&self) -> &Self {
        self.core.muted.store(true, Ordering::Relaxed);
        self
    }

    pub fn unmute(&self) -> &Self {
        self.core.muted.store(false, Ordering::Relaxed);
        self
    }

    pub fn swap_mute(&self) -> &Self {
        self.core.muted.fetch_xor(true, Ordering::Relaxed);
        self
    }

    pub fn is_muted(&self) -> bool {
        self.core.muted.load(Ordering::Relaxed)
    }

    pub fn volume_to(&self, volume: f64) -> &Self {
        self.core.set_volume(volume);
        self
    }

    pub fn volume(&self) -> f64 {
        self.core.volume()
    }

    pub fn filter_to(&self, f: impl Fn(f64, usize) -> f64 + Send + Sync + 'static) -> &Self {
        self.core.filter.store(Some(Arc::new(Filter::new(f))));
        self
    }

    pub fn drop_filter(&self) -> &Self {
        self.core.filter.store(None);
        self
    }

    pub fn filter(&self) -> Option<Arc<Filter>> {
        self.core.filter.load_full()
    }

    /// Rebinds this voice to another engine. Only valid while the voice is
    /// not playing; a playing voice keeps sounding on the old engine until
    /// its needles run out.
    pub fn lock_on(&mut self, engine: &Engine) -> &mut Self {
        self.commands = engine.command_sender();
        self.reporter = engine.reporter();
        self.origin = engine
            .origin()
            .nested("Voice", Arc::as_ptr(&self.core) as usize);
        self
    }

    /// True iff the mixer currently holds this voice in its active list.
    pub fn is_playing(&self) -> bool {
        self.core.active.load(Ordering::Acquire)
    }

    /// Snapshot of the current needle positions.
    pub fn needles(&self) -> Vec<usize> {
        self.core.needles.lock().unwrap().clone()
    }

    pub fn sample_count(&self) -> usize {
        self.core.stream.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.core.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.core.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.core.bits_per_sample
    }
}

impl Clone for Voice {
    /// An independent voice over the same sample buffer: control state is
    /// copied, the needle set starts empty.
    fn clone(&self) -> Self {
        let core = Arc::new(VoiceCore {
            stream: Arc::clone(&self.core.stream),
            sample_rate: self.core.sample_rate,
            channels: self.core.channels,
            bits_per_sample: self.core.bits_per_sample,
            needles: Mutex::new(Vec::new()),
            looping: AtomicBool::new(self.core.looping.load(Ordering::Relaxed)),
            paused: AtomicBool::new(self.core.paused.load(Ordering::Relaxed)),
            muted: AtomicBool::new(self.core.muted.load(Ordering::Relaxed)),
            volume_bits: AtomicU64::new(self.core.volume_bits.load(Ordering::Relaxed)),
            filter: ArcSwapOption::new(self.core.filter.load_full()),
            active: AtomicBool::new(false),
        });
        let origin = self.origin.peer(Arc::as_ptr(&core) as usize);
        Voice {
            core,
            commands: self.commands.clone(),
            reporter: Arc::clone(&self.reporter),
            origin,
        }
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{MemoReporter, NullReporter};
    use crossbeam_channel::{bounded, Receiver};

    fn rig(samples: &[f64], capacity: usize) -> (Voice, Receiver<Command>, Arc<MemoReporter>) {
        let (tx, rx) = bounded(capacity);
        let memo = Arc::new(MemoReporter::new());
        let core = Arc::new(VoiceCore::new(samples.into(), 48_000, 1, 16));
        let voice = Voice {
            core,
            commands: tx,
            reporter: Arc::clone(&memo) as Arc<dyn Reporter>,
            origin: Origin::new("Voice", 0),
        };
        (voice, rx, memo)
    }

    #[test]
    fn defaults() {
        let (voice, _rx, _memo) = rig(&[0.5], 4);
        assert_eq!(voice.volume(), 1.0);
        assert!(!voice.is_looping());
        assert!(!voice.is_paused());
        assert!(!voice.is_muted());
        assert!(!voice.is_playing());
        assert!(voice.needles().is_empty());
        assert!(voice.filter().is_none());
        assert_eq!(voice.sample_count(), 1);
    }

    #[test]
    fn chained_controls() {
        let (voice, _rx, _memo) = rig(&[0.5], 4);
        voice.looped().pause().mute().volume_to(0.25);
        assert!(voice.is_looping());
        assert!(voice.is_paused());
        assert!(voice.is_muted());
        assert_eq!(voice.volume(), 0.25);
        voice.unloop().resume().unmute();
        assert!(!voice.is_looping() && !voice.is_paused() && !voice.is_muted());
        voice.swap_loop().swap_pause().swap_mute();
        assert!(voice.is_looping() && voice.is_paused() && voice.is_muted());
        voice.swap_loop();
        assert!(!voice.is_looping());
    }

    #[test]
    fn play_sends_a_command_per_call() {
        let (voice, rx, _memo) = rig(&[0.5, -0.5], 4);
        voice.play().play();
        assert!(matches!(rx.try_recv(), Ok(Command::Play(_))));
        assert!(matches!(rx.try_recv(), Ok(Command::Play(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn play_on_empty_voice_is_a_no_op() {
        let (voice, rx, _memo) = rig(&[], 4);
        voice.play();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_sends_and_drop_stops() {
        let (voice, rx, _memo) = rig(&[0.5], 4);
        voice.stop();
        assert!(matches!(rx.try_recv(), Ok(Command::Stop(_))));
        drop(voice);
        assert!(matches!(rx.try_recv(), Ok(Command::Stop(_))));
    }

    #[test]
    fn full_queue_drops_with_a_warning() {
        let (voice, rx, memo) = rig(&[0.5], 1);
        voice.play().play();
        assert!(memo.has(Severity::Warning, "command queue full"));
        // the first command is still there, the second is gone
        assert!(matches!(rx.try_recv(), Ok(Command::Play(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn filter_receives_channel_index() {
        let (voice, _rx, _memo) = rig(&[0.5], 4);
        voice.filter_to(|amplitude, channel| amplitude * channel as f64);
        assert_eq!(voice.filter().unwrap().apply(2.0, 3), 6.0);
        voice.drop_filter();
        assert!(voice.filter().is_none());
    }

    #[test]
    fn clone_shares_samples_but_not_needles() {
        let (voice, _rx, _memo) = rig(&[0.5, -0.5], 4);
        voice.looped().volume_to(0.5);
        voice.core.needles.lock().unwrap().push(1);

        let twin = voice.clone();
        assert!(Arc::ptr_eq(&voice.core.stream, &twin.core.stream));
        assert!(twin.is_looping());
        assert_eq!(twin.volume(), 0.5);
        assert!(twin.needles().is_empty());
        assert_eq!(voice.needles(), vec![1]);
    }

    #[test]
    fn unbound_after_engine_side_drop_is_silent() {
        let (voice, rx, memo) = rig(&[0.5], 4);
        drop(rx);
        voice.play().stop();
        assert!(!memo.has(Severity::Warning, "command queue full"));
    }
}
