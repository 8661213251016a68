//! velours demo player.
//!
//! Lists output devices or mixes canonical WAVE files through one engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use velours::report::ConsoleReporter;
use velours::{Engine, EngineConfig, Voice};

/// Command-line arguments for the velours player.
#[derive(Parser)]
#[command(name = "velours")]
#[command(about = "Mix and play WAVE files through one output device", long_about = None)]
struct Args {
    /// WAVE files to play, mixed together.
    files: Vec<PathBuf>,

    /// List available output devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Output device name (exact match). Default: system default output.
    #[arg(short, long)]
    device: Option<String>,

    /// Output sample rate in Hz.
    #[arg(short, long, default_value = "48000")]
    rate: u32,

    /// Output channel count.
    #[arg(short, long, default_value = "1")]
    channels: u16,

    /// Blocks in the submission ring.
    #[arg(long, default_value = "16")]
    blocks: usize,

    /// Samples per block (must be a multiple of the channel count).
    #[arg(long, default_value = "256")]
    block_samples: usize,

    /// Gain applied to every file.
    #[arg(short, long, default_value = "1.0")]
    gain: f64,

    /// Loop the mix until interrupted.
    #[arg(long)]
    looped: bool,
}

fn main() {
    let args = Args::parse();

    if args.list_devices {
        let devices = Engine::devices();
        if devices.is_empty() {
            println!("(no output devices available)");
        }
        for (index, name) in devices.iter().enumerate() {
            println!("  {index}: {name}");
        }
        return;
    }

    if args.files.is_empty() {
        eprintln!("nothing to play (pass WAVE files, or --list-devices)");
        std::process::exit(2);
    }

    let mut config = EngineConfig::new()
        .with_sample_rate(args.rate)
        .with_channels(args.channels)
        .with_block_count(args.blocks)
        .with_block_samples(args.block_samples);
    if let Some(device) = &args.device {
        config = config.with_device(device.clone());
    }

    let engine = match Engine::new(config, Arc::new(ConsoleReporter)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let samples_per_second = f64::from(args.rate) * f64::from(args.channels);
    let mut voices = Vec::new();
    let mut longest = Duration::ZERO;
    for path in &args.files {
        match Voice::from_wave_file(&engine, path) {
            Ok(voice) => {
                voice.volume_to(args.gain);
                if args.looped {
                    voice.looped();
                }
                let seconds = voice.sample_count() as f64 / samples_per_second;
                longest = longest.max(Duration::from_secs_f64(seconds));
                voice.play();
                voices.push(voice);
            }
            Err(e) => eprintln!("skipping {}: {e}", path.display()),
        }
    }
    if voices.is_empty() {
        std::process::exit(1);
    }

    if args.looped {
        println!("looping {} file(s), Ctrl+C to stop", voices.len());
        loop {
            std::thread::sleep(Duration::from_secs(3600));
        }
    }

    // one extra ring of latency so the tail drains before teardown
    let tail =
        Duration::from_secs_f64((args.blocks * args.block_samples) as f64 / samples_per_second);
    std::thread::sleep(longest + tail);
}
