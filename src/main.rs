mod audio;
mod cli;
mod config;
mod render;
mod visualizer;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use audio::capture::{CaptureSource, SourceFactory, StartupSignal};
use audio::device::DeviceSource;
use audio::file::FileSource;
use audio::producer::spawn_producer;
use audio::queue::AudioQueue;
use audio::tone::ToneSource;
use cli::Cli;
use config::VisualizerConfig;
use render::headless::HeadlessSink;
use render::terminal::TerminalSink;
use visualizer::{run_render_loop, LoopLimits, Visualizer};

const TONE_AMPLITUDE: f32 = 0.5;

fn main() -> Result<()> {
    let mut cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), cli.headless)?;

    // Load config: explicit --config path, or auto-detect barscope.toml / global config
    let config_path = cli.config.clone().or_else(config::discover_config);
    if let Some(ref path) = config_path {
        match config::load_config(path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cli.apply_config(cfg);
            }
            Err(err) => log::warn!("Ignoring config: {:#}", err),
        }
    }

    if cli.list_devices {
        println!("Input devices:");
        for name in DeviceSource::list_inputs() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let config = cli.visualizer_config().context("Invalid configuration")?;
    if let Some(frequency) = cli.tone {
        if !(frequency > 0.0 && frequency < config.sample_rate as f32 / 2.0) {
            bail!(
                "Tone frequency {}Hz must lie between 0 and {}Hz",
                frequency,
                config.sample_rate / 2
            );
        }
    }
    let run_for = cli.run_duration()?;
    log::info!(
        "barscope: {}Hz/{}ch requested, {} bands, {}x{}, decay {}",
        config.sample_rate,
        config.channels,
        config.bands(),
        config.width,
        config.height,
        config.decay
    );

    let queue = Arc::new(AudioQueue::new(config.ready_threshold()));
    let startup = Arc::new(StartupSignal::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    if cli.headless {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .context("Failed to install Ctrl-C handler")?;
    }

    let producer = spawn_producer(
        source_factory(&cli, &config),
        Arc::clone(&queue),
        Arc::clone(&startup),
        Arc::clone(&shutdown),
        config.resolution_hz,
    )
    .context("Failed to start capture thread")?;

    let format = match startup.wait() {
        Ok(format) => format,
        Err(err) => {
            shutdown.store(true, Ordering::Relaxed);
            let _ = producer.join();
            return Err(err).context("Audio capture unavailable");
        }
    };
    if format != config.format() {
        log::warn!(
            "Source delivers {}Hz/{}ch instead of the configured {}Hz/{}ch",
            format.sample_rate,
            format.channels,
            config.sample_rate,
            config.channels
        );
    }

    let mut visualizer = Visualizer::new(&config, format.sample_rate);
    let limits = LoopLimits {
        deadline: run_for.and_then(|duration| Instant::now().checked_add(duration)),
    };

    let outcome = if cli.headless {
        let mut sink = HeadlessSink::new();
        let outcome = run_render_loop(
            &config,
            &mut visualizer,
            &queue,
            &mut sink,
            &shutdown,
            limits,
            |v| producer.is_finished() && v.is_settled(),
        );
        log::info!("Headless run presented {} frames", sink.frames());
        outcome
    } else {
        TerminalSink::new(config.bar_char, config.empty_char).and_then(|mut sink| {
            run_render_loop(
                &config,
                &mut visualizer,
                &queue,
                &mut sink,
                &shutdown,
                limits,
                |_| false,
            )
        })
    };

    shutdown.store(true, Ordering::Relaxed);
    match producer.join() {
        Ok(stats) if stats.ended => log::info!("Source finished after {} frames", stats.frames),
        Ok(_) => {}
        Err(err) => log::warn!("Capture ended with error: {}", err),
    }

    let stats = outcome?;
    log::info!(
        "Done: {} ticks, {} analysis passes ({} empty)",
        stats.ticks,
        stats.passes,
        stats.empty_passes
    );
    Ok(())
}

fn init_logging(log_file: Option<&Path>, headless: bool) -> Result<()> {
    // Keep stderr quiet while the terminal display owns the screen.
    let default_filter = if log_file.is_some() || headless { "info" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    builder.format_timestamp_millis();

    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn source_factory(cli: &Cli, config: &VisualizerConfig) -> SourceFactory {
    let format = config.format();

    if let Some(path) = cli.file.clone() {
        let looping = cli.loop_file;
        return Box::new(move || {
            Ok(Box::new(FileSource::open(&path, looping, true)?) as Box<dyn CaptureSource>)
        });
    }

    if let Some(frequency) = cli.tone {
        return Box::new(move || {
            Ok(Box::new(ToneSource::new(format, frequency, TONE_AMPLITUDE, true))
                as Box<dyn CaptureSource>)
        });
    }

    let selection = cli.device_selection();
    Box::new(move || Ok(Box::new(DeviceSource::open(&selection, format)?) as Box<dyn CaptureSource>))
}
