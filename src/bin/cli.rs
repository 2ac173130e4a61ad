use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use log::info;

use fxrack::engine::Waveform;
use fxrack::io::AudioManager;

#[derive(Parser, Debug)]
#[command(name = "fxrack")]
#[command(about = "A modular JACK signal chain: source, effect stages, meters.")]
struct Args {
    /// Oscillator waveform: sine, square, sawtooth or triangle.
    #[arg(long, default_value = "sine")]
    waveform: String,

    /// Oscillator frequency in Hz.
    #[arg(long, default_value_t = 440.0)]
    frequency: f32,

    /// Comma-separated stage kinds, source to sink. E.g. "drive,delay,gain".
    #[arg(long, default_value = "")]
    stages: String,

    /// Use the hardware input instead of the oscillator.
    #[arg(long)]
    mic: bool,

    /// Skip auto-connecting to the system capture/playback ports.
    #[arg(long)]
    no_connect: bool,
}

fn parse_waveform(s: &str) -> Result<Waveform> {
    Ok(match s {
        "sine" => Waveform::Sine,
        "square" => Waveform::Square,
        "sawtooth" => Waveform::Sawtooth,
        "triangle" => Waveform::Triangle,
        other => bail!("unknown waveform '{other}'"),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let waveform = parse_waveform(&args.waveform)?;

    let mut manager = AudioManager::new(!args.no_connect)?;

    {
        let engine = manager.engine();
        for kind in args.stages.split(',').filter(|s| !s.is_empty()) {
            let id = engine.add_stage(kind, None)?;
            info!("stage {id}: {kind}");
        }
        if args.mic {
            engine.enable_microphone()?;
        } else {
            engine.set_waveform(waveform);
            engine.set_frequency(args.frequency);
            engine.start_oscillator();
        }
    }

    let meter = manager.engine().meter();

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nshutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    println!("fxrack running, ctrl-c to quit");
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));
        let levels = meter.levels();
        println!(
            "peak {:>7.2} dB  rms {:>7.2} dB{}",
            levels.peak_db,
            levels.rms_db,
            if levels.is_clipping { "  CLIP" } else { "" }
        );
    }

    Ok(())
}
