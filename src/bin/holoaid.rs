//! holoaid - live detection overlay
//!
//! This binary:
//! 1. Resolves configuration (file, `HOLO_*` env, CLI flags)
//! 2. Opens the environment-facing camera, then loads the detector
//! 3. Runs the detection loop, painting the flat overlay and (optionally)
//!    placing markers in the spatial scene
//! 4. Stops on Ctrl-C or after `--seconds`, releasing the camera

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use holoaid_overlay::config::OverlayConfig;
use holoaid_overlay::cue::LogPlayer;
use holoaid_overlay::ingest::device_for;
use holoaid_overlay::ui::Ui;
use holoaid_overlay::{
    Announcer, BackendRegistry, FlatOverlay, FrameSource, HeadlessScene, Pipeline, RasterCanvas,
    SpatialOverlay, StatusBoard, StubBackend,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run object detection on a camera feed and overlay the results"
)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "HOLO_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many seconds (runs until Ctrl-C when omitted).
    #[arg(long)]
    seconds: Option<u64>,

    /// Enable the spatial (3D) overlay once the loop is running.
    #[arg(long)]
    overlay: bool,

    /// Speak the label of each new top detection.
    #[arg(long)]
    narrate: bool,

    /// Write the final flat overlay to this PNG on exit.
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Status output: plain or pretty (auto-detected when omitted).
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = OverlayConfig::load_from(args.config.as_deref())?;
    if args.narrate {
        cfg.cues.narrate = true;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args, cfg))
}

async fn run(args: Args, cfg: OverlayConfig) -> Result<()> {
    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());
    let status = StatusBoard::new();
    let status_view = ui.follow(status.subscribe());

    let registry = build_registry(&cfg)?;
    log::info!("detector backends: {}", registry.list().join(", "));
    let oracle = registry.oracle(Some(&cfg.detector.backend), cfg.detector.limits)?;

    let source = FrameSource::new(device_for(cfg.camera.clone()));
    let flat = FlatOverlay::new(RasterCanvas::new(), cfg.flat.style()?);
    let spatial = SpatialOverlay::with_ready_callback(
        HeadlessScene::new(cfg.mount_delay),
        cfg.spatial,
        || log::info!("spatial overlay ready"),
    );

    let mut pipeline = Pipeline::new(source, oracle, flat, spatial.clone(), status.clone())
        .with_tick(cfg.tick);
    if cfg.cues.enabled {
        let announcer = Announcer::new(cfg.cues.sounds.clone(), Box::new(LogPlayer))
            .with_volume(cfg.cues.volume);
        let announcer = if cfg.cues.narrate {
            // No speech engine is linked into the CLI; narration degrades to a warning.
            announcer.with_narration(None)
        } else {
            announcer
        };
        pipeline = pipeline.with_cues(Box::new(announcer));
    }

    let handle = match pipeline.start().await {
        Ok(handle) => handle,
        Err(e) => {
            drop(status);
            let _ = status_view.await;
            return Err(e.into());
        }
    };

    let token = handle.cancel_token();
    ctrlc::set_handler(move || {
        if token.cancel() {
            log::info!("interrupt received, stopping");
        }
    })
    .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    if args.overlay {
        spatial.enable();
    }

    match args.seconds {
        Some(secs) => {
            let cancel = handle.cancel_token();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => handle.cancel(),
                _ = cancel.cancelled() => {}
            }
        }
        None => handle.cancel_token().cancelled().await,
    }

    let latest = handle.latest();
    let report = handle.shutdown().await?;
    spatial.disable();
    let _ = status_view.await;

    log::info!(
        "ticks={} inferences={} published={} failures={} not_ready={} frames_served={}",
        report.stats.ticks,
        report.stats.inferences,
        report.stats.published,
        report.stats.inference_failures,
        report.stats.frames_not_ready,
        report.source.frames_served
    );
    if let Some(label) = latest.top_label() {
        log::info!("last top detection: {}", label);
    }
    if let Some(path) = &args.dump {
        report.flat.canvas().save_png(path)?;
        log::info!("flat overlay written to {}", path.display());
    }
    Ok(())
}

fn build_registry(cfg: &OverlayConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::default());
    register_tract(&mut registry, cfg);

    if registry.get(&cfg.detector.backend).is_none() {
        return Err(anyhow!(
            "detector backend '{}' is not available (built with: {})",
            cfg.detector.backend,
            registry.list().join(", ")
        ));
    }
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, cfg: &OverlayConfig) {
    if let Some(model_path) = &cfg.detector.model_path {
        registry.register(holoaid_overlay::detect::TractBackend::new(
            model_path,
            cfg.camera.width,
            cfg.camera.height,
        ));
    }
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, _cfg: &OverlayConfig) {}
