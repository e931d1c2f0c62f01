//! Live wake-word listener.
//!
//! ```text
//! listen --models ./models --keyword hey_jarvis --keyword alexa
//! listen --models ./models --wav clip.wav      # offline peak score
//! ```
//!
//! Events are printed as JSON lines so the output can be piped into a
//! relay or a test harness.

use std::path::PathBuf;

use hark_core::{EngineConfig, HarkEngine, StartOptions};

#[derive(Debug)]
struct Args {
    models_dir: PathBuf,
    keywords: Vec<String>,
    threshold: f32,
    cooldown_ms: u64,
    device: Option<String>,
    gain: f32,
    wav: Option<PathBuf>,
    debug: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        models_dir: PathBuf::from("models"),
        keywords: Vec::new(),
        threshold: 0.5,
        cooldown_ms: 2_000,
        device: None,
        gain: 1.0,
        wav: None,
        debug: false,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| {
            it.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        };
        match arg.as_str() {
            "--models" => args.models_dir = PathBuf::from(value("--models")?),
            "--keyword" => args.keywords.push(value("--keyword")?),
            "--threshold" => {
                args.threshold = value("--threshold")?
                    .parse()
                    .map_err(|e| format!("bad --threshold: {e}"))?
            }
            "--cooldown-ms" => {
                args.cooldown_ms = value("--cooldown-ms")?
                    .parse()
                    .map_err(|e| format!("bad --cooldown-ms: {e}"))?
            }
            "--device" => args.device = Some(value("--device")?),
            "--gain" => {
                args.gain = value("--gain")?
                    .parse()
                    .map_err(|e| format!("bad --gain: {e}"))?
            }
            "--wav" => args.wav = Some(PathBuf::from(value("--wav")?)),
            "--debug" => args.debug = true,
            "--help" | "-h" => {
                return Err(
                    "usage: listen [--models DIR] [--keyword NAME]... [--threshold F] \
                     [--cooldown-ms N] [--device NAME] [--gain F] [--wav FILE] [--debug]"
                        .into(),
                )
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let mut config = EngineConfig {
        asset_dir: args.models_dir,
        detection_threshold: args.threshold,
        cooldown_ms: args.cooldown_ms,
        debug: args.debug,
        ..EngineConfig::default()
    };
    if !args.keywords.is_empty() {
        config.keywords = args.keywords;
    }

    let engine = HarkEngine::new(config);
    let mut events = engine.subscribe();
    engine.load()?;

    if let Some(wav) = args.wav {
        let peak = engine.evaluate_wav(&wav)?;
        println!("{}", serde_json::json!({ "file": wav, "peakScore": peak }));
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        engine.start(StartOptions {
            preferred_device: args.device,
            gain: args.gain,
        })?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        eprintln!("warning: dropped {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        engine.stop();
        Ok::<_, anyhow::Error>(())
    })?;

    Ok(())
}
