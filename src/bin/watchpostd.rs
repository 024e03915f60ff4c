//! watchpostd - camera monitor daemon
//!
//! This daemon:
//! 1. Loads configuration (file from WATCHPOST_CONFIG, then env overrides)
//! 2. Opens the camera and the detector backend
//! 3. Runs the detection loop; with auto-record on, a detected person starts
//!    a clip that stops itself after the configured duration
//! 4. Saves clips and stills into the output directory
//!
//! Commands are read from stdin, one per line:
//! `r` record toggle, `s` still, `m` mirror, `a` auto-record,
//! `v <0..1>` volume, `d <secs>` recording duration, `q` quit.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use watchpost::ui::{Ui, UiMode};
use watchpost::{
    open_camera, BackendRegistry, BoxRenderer, ChunkRecorder, Command, DirectorySink, LogNotifier,
    Monitor, MonitorConfig, MonitorParts, SharedBackend, StubBackend, SystemClock, TerminalBell,
};

#[derive(Parser, Debug)]
#[command(name = "watchpostd", about = "Watch a camera and record clips when a person appears")]
struct Args {
    /// Stop after this many seconds (runs until Ctrl-C or `q` otherwise)
    #[arg(long, value_name = "SECS", env = "WATCHPOST_RUN_SECS")]
    seconds: Option<u64>,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: UiMode,

    /// Do not read commands from stdin
    #[arg(long)]
    no_stdin: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        MonitorConfig::load()?
    };

    let sink = {
        let _stage = ui.stage("Prepare output directory");
        DirectorySink::new(&cfg.output_dir)?
    };

    let camera = {
        let _stage = ui.stage("Open camera");
        match open_camera(&cfg.camera) {
            Ok(camera) => Some(camera),
            Err(e) => {
                log::warn!("camera {} unavailable: {:#}", cfg.camera.url, e);
                None
            }
        }
    };

    let mut monitor = Monitor::new(MonitorParts {
        clock: Box::new(SystemClock::new()),
        camera: None,
        renderer: Box::new(BoxRenderer::new().with_target_label(cfg.settings.target_label.clone())),
        recorder: Box::new(ChunkRecorder::new()),
        notifier: Box::new(LogNotifier),
        cue: Box::new(TerminalBell),
        sink: Box::new(sink),
        settings: cfg.settings.clone(),
    })?;

    let changes = monitor.subscribe();
    let mut status = ui.status_line();
    let status_thread = std::thread::spawn(move || {
        for change in changes {
            status.update(&change);
        }
        status.finish();
    });

    if let Some(camera) = camera {
        monitor.attach_camera(camera);
    }

    {
        let _stage = ui.stage("Load detector");
        match load_model(&cfg) {
            Ok(model) => monitor.install_model(model),
            Err(e) => monitor.model_failed(&e),
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let (tx, rx) = mpsc::channel();
    if !args.no_stdin {
        spawn_stdin_reader(tx);
    } else {
        drop(tx);
    }

    log::info!(
        "watchpostd running. saving to {} (auto-record {}, limit {}s)",
        cfg.output_dir.display(),
        if cfg.settings.auto_record { "on" } else { "off" },
        cfg.settings.recording_duration.as_secs()
    );
    monitor.run(&shutdown, &rx, args.seconds.map(Duration::from_secs))?;
    log::info!(
        "watchpostd stopped. {} clip(s) recorded",
        monitor.recordings().clips_saved()
    );

    drop(monitor);
    if status_thread.join().is_err() {
        log::warn!("status display thread panicked");
    }
    Ok(())
}

fn load_model(cfg: &MonitorConfig) -> Result<SharedBackend> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());

    #[cfg(feature = "backend-tract")]
    if let Some(path) = &cfg.detector.model_path {
        let backend =
            watchpost::TractBackend::new(path, cfg.camera.width, cfg.camera.height)?;
        registry.register(backend);
        registry.set_default("tract")?;
    }
    #[cfg(not(feature = "backend-tract"))]
    if let Some(path) = &cfg.detector.model_path {
        log::warn!(
            "model {} ignored: built without the backend-tract feature",
            path.display()
        );
    }

    log::info!("detector backends: {}", registry.list().join(", "));
    registry.load(cfg.detector.backend.as_deref())
}

fn spawn_stdin_reader(tx: Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Ok(command) => {
                    let quit = command == Command::Quit;
                    if tx.send(command).is_err() || quit {
                        break;
                    }
                }
                Err(e) => log::warn!("{:#}", e),
            }
        }
    });
}
