//! velours: a small real-time PCM mixing engine.
//!
//! One [`Engine`] per output device, any number of [`Voice`]s per engine.
//! The engine's mixer thread sums every active voice sample-by-sample into
//! fixed-size int32 blocks and feeds them to the device, paced by the
//! device's own completion signals. Voices stack overlapping playbacks,
//! loop, pause, mute, scale and transform their samples independently.
//!
//! ```no_run
//! use std::sync::Arc;
//! use velours::report::ConsoleReporter;
//! use velours::{Engine, EngineConfig, Voice};
//!
//! let engine = Engine::new(EngineConfig::default(), Arc::new(ConsoleReporter))?;
//! let voice = Voice::from_wave_file(&engine, "kick.wav")?;
//! voice.looped().volume_to(0.8).play();
//! # Ok::<(), velours::EngineError>(())
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
mod mixer;
pub mod report;
pub mod voice;
pub mod wave;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use voice::{Filter, Voice};
pub use wave::SampleData;
