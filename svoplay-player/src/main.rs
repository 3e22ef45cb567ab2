//! # SVOPlay Player
//!
//! Plays a recorded stereo capture through svoplay-core, either in a window
//! (egui's per-frame update drives the session) or headless (a tokio
//! interval drives it).

use anyhow::Result;
use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use svoplay_core::color::ColorCorrection;
use svoplay_core::config::{PlaybackConfig, Resolution, ViewBinding};
use svoplay_core::provider::{CaptureProvider, ViewId};
use svoplay_core::providers::{ImageSequenceProvider, SyntheticProvider};
use svoplay_core::session::{PlaybackSession, PlaybackState, SessionStats, TickOutcome};
use svoplay_core::sink::{SharedSurface, SinkSet, SnapshotSink};

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Options {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
    loop_enabled: Option<bool>,
    speed: Option<f64>,
    resolution: Option<Resolution>,
    views: Option<Vec<ViewId>>,
    color_correction: Option<ColorCorrection>,
    headless: bool,
    ticks: Option<u64>,
    tick_rate: f64,
    synthetic: Option<u64>,
    fail_every: u64,
    snapshot_dir: Option<PathBuf>,
    snapshot_every: u64,
    save_config: Option<PathBuf>,
    /// Arguments that matched no flag, reported once logging is up
    unrecognized: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options {
        tick_rate: 60.0,
        snapshot_every: 30,
        ..Default::default()
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--headless" | "headless" => {
                options.headless = true;
                i += 1;
                continue;
            }
            "--loop" => {
                options.loop_enabled = Some(true);
                i += 1;
                continue;
            }
            "--no-loop" => {
                options.loop_enabled = Some(false);
                i += 1;
                continue;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => {}
        }

        match flag {
            "--config" | "-c" => options.config = Some(PathBuf::from(arg_value(args, i, flag)?)),
            "--input" | "-i" => options.input = Some(PathBuf::from(arg_value(args, i, flag)?)),
            "--speed" | "-s" => {
                let v = arg_value(args, i, flag)?;
                options.speed = Some(
                    v.parse::<f64>()
                        .map_err(|e| anyhow::anyhow!("Invalid speed {}: {}", v, e))?,
                );
            }
            "--resolution" | "-r" => options.resolution = Some(parse_resolution(arg_value(args, i, flag)?)?),
            "--views" => options.views = Some(parse_views(arg_value(args, i, flag)?)?),
            "--color-correction" => {
                let v = arg_value(args, i, flag)?;
                let mode = v
                    .parse::<u8>()
                    .map_err(|e| anyhow::anyhow!("Invalid colour correction {}: {}", v, e))?;
                options.color_correction = Some(ColorCorrection::try_from(mode)?);
            }
            "--ticks" | "-n" => options.ticks = Some(parse_count(arg_value(args, i, flag)?, flag)?),
            "--tick-rate" => {
                let v = arg_value(args, i, flag)?;
                let rate = v
                    .parse::<f64>()
                    .map_err(|e| anyhow::anyhow!("Invalid tick rate {}: {}", v, e))?;
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(anyhow::anyhow!("Tick rate must be positive, got {}", v));
                }
                options.tick_rate = rate;
            }
            "--synthetic" => options.synthetic = Some(parse_count(arg_value(args, i, flag)?, flag)?),
            "--fail-every" => options.fail_every = parse_count(arg_value(args, i, flag)?, flag)?,
            "--snapshot-dir" => options.snapshot_dir = Some(PathBuf::from(arg_value(args, i, flag)?)),
            "--snapshot-every" => options.snapshot_every = parse_count(arg_value(args, i, flag)?, flag)?,
            "--save-config" => options.save_config = Some(PathBuf::from(arg_value(args, i, flag)?)),
            _ => {
                options.unrecognized.push(args[i].clone());
                i += 1;
                continue;
            }
        }
        i += 2;
    }

    if options.input.is_none() && options.config.is_none() && options.synthetic.is_none() {
        print_usage();
        return Err(anyhow::anyhow!(
            "Nothing to play: pass --input, --config or --synthetic"
        ));
    }

    Ok(options)
}

fn arg_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))
}

fn parse_count(value: &str, flag: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {} {}: {}", flag, value, e))
}

fn parse_resolution(value: &str) -> Result<Resolution> {
    match value.to_lowercase().as_str() {
        "native" => Ok(Resolution::Native),
        "hd2k" | "2k" => Ok(Resolution::HD2K),
        "hd1080" | "1080" => Ok(Resolution::HD1080),
        "hd720" | "720" => Ok(Resolution::HD720),
        "vga" => Ok(Resolution::VGA),
        other => Err(anyhow::anyhow!("Unknown resolution {:?}", other)),
    }
}

fn parse_views(value: &str) -> Result<Vec<ViewId>> {
    match value.to_lowercase().as_str() {
        "left" => Ok(vec![ViewId::Left]),
        "right" => Ok(vec![ViewId::Right]),
        "both" | "stereo" => Ok(ViewId::ALL.to_vec()),
        other => Err(anyhow::anyhow!("Unknown view selection {:?}", other)),
    }
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  svoplay --input <frame dir> [options]\n  svoplay --config <playback.json> [options]\n  svoplay --synthetic <frames> [options]\n\n\
         Options:\n  --loop | --no-loop         loop at end of capture\n  --speed <x>                playback speed (1.0 = 30 fps)\n  \
         --resolution <r>           native | hd2k | hd1080 | hd720 | vga\n  --views <v>                left | right | both\n  \
         --color-correction <0-5>   channel permutation applied before display\n  --headless                 no window\n  \
         --ticks <n>                stop after n host ticks (headless)\n  --tick-rate <hz>           host tick rate (headless, default 60)\n  \
         --fail-every <n>           synthetic: fail every nth grab\n  --snapshot-dir <dir>       write presented frames as PNG\n  \
         --snapshot-every <n>       snapshot every nth presented frame (default 30)\n  --save-config <file>       write the effective config and exit\n"
    );
}

/// File config first, then command line overrides
fn build_config(options: &Options) -> Result<PlaybackConfig> {
    let mut config = match &options.config {
        Some(path) => PlaybackConfig::load(path)?,
        None => PlaybackConfig::default(),
    };

    if let Some(input) = &options.input {
        config.source = input.clone();
    }
    if options.synthetic.is_some() && config.source.as_os_str().is_empty() {
        config.source = PathBuf::from("synthetic");
    }
    if let Some(loop_enabled) = options.loop_enabled {
        config.loop_enabled = loop_enabled;
    }
    if let Some(speed) = options.speed {
        config.playback_speed = speed;
    }
    if let Some(resolution) = options.resolution {
        config.resolution = resolution;
    }
    if let Some(views) = &options.views {
        config.views = views.iter().map(|v| ViewBinding::new(*v)).collect();
    }
    if let Some(correction) = options.color_correction {
        for binding in &mut config.views {
            binding.color_correction = correction;
        }
    }

    config.validate()?;
    Ok(config)
}

fn make_provider(options: &Options) -> Box<dyn CaptureProvider> {
    match options.synthetic {
        Some(frames) => Box::new(SyntheticProvider::new(frames, 640, 360).with_failure_every(options.fail_every)),
        None => Box::new(ImageSequenceProvider::new()),
    }
}

// ============================================================================
// Entry
// ============================================================================

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    let default_filter = if options.headless {
        "svoplay=info"
    } else {
        "svoplay=debug,wgpu=warn,eframe=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("SVOPlay v{}", svoplay_core::VERSION);
    for arg in &options.unrecognized {
        tracing::warn!("Ignoring unrecognized argument {:?}", arg);
    }

    let config = build_config(&options)?;
    if let Some(path) = &options.save_config {
        config.save(path)?;
        tracing::info!("Config written to {}", path.display());
        return Ok(());
    }

    if options.headless {
        run_headless(&options, config)
    } else {
        run_window(&options, config)
    }
}

// ============================================================================
// Headless
// ============================================================================

fn run_headless(options: &Options, config: PlaybackConfig) -> Result<()> {
    let mut sinks = SinkSet::new();
    for binding in &config.views {
        match &options.snapshot_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                sinks.bind(binding.view, Box::new(SnapshotSink::new(dir, options.snapshot_every)));
            }
            None => sinks.bind(binding.view, Box::new(SharedSurface::new())),
        }
    }

    let mut session = PlaybackSession::start(make_provider(options), config, sinks)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let started = Instant::now();
    let ticks = runtime.block_on(drive_headless(&mut session, options.tick_rate, options.ticks));
    session.close();

    log_stats(&session.stats(), ticks, started.elapsed());
    Ok(())
}

/// Tick the session at `tick_rate` Hz until it stops, the limit is hit, or Ctrl-C
async fn drive_headless(session: &mut PlaybackSession, tick_rate: f64, limit: Option<u64>) -> u64 {
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / tick_rate));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let mut ticks = 0u64;
    while session.is_playing() && limit.map_or(true, |n| ticks < n) {
        tokio::select! {
            _ = interval.tick() => {
                ticks += 1;
                match session.tick(started.elapsed().as_secs_f64()) {
                    TickOutcome::Stopped => tracing::info!("Capture finished"),
                    TickOutcome::ProviderClosed => {
                        tracing::error!("Provider closed during playback");
                        session.stop();
                    }
                    _ => {}
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                session.stop();
            }
        }
    }
    ticks
}

fn log_stats(stats: &SessionStats, ticks: u64, elapsed: Duration) {
    tracing::info!(
        "Playback complete: ticks={}, frames={}, views_presented={}, recreated={}, skipped={}, grab_failures={}, loops={}+{}, elapsed_ms={}",
        ticks,
        stats.frames_grabbed,
        stats.views_presented,
        stats.view_recreations,
        stats.view_skips,
        stats.grab_failures,
        stats.early_loops,
        stats.end_of_stream_loops,
        elapsed.as_millis()
    );
}

// ============================================================================
// Window
// ============================================================================

fn run_window(options: &Options, config: PlaybackConfig) -> Result<()> {
    if let Some(dir) = &options.snapshot_dir {
        tracing::warn!(
            "--snapshot-dir {} only applies with --headless, ignoring",
            dir.display()
        );
    }

    let mut sinks = SinkSet::new();
    let mut panes = Vec::new();
    for binding in &config.views {
        let surface = SharedSurface::new();
        sinks.bind(binding.view, Box::new(surface.clone()));
        panes.push(ViewPane::new(binding.view, surface));
    }

    // Open failures are fatal before any window appears
    let session = PlaybackSession::start(make_provider(options), config, sinks)?;

    let native = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("SVOPlay")
            .with_inner_size([1280.0, 480.0])
            .with_min_inner_size([640.0, 240.0]),
        ..Default::default()
    };

    eframe::run_native(
        "SVOPlay",
        native,
        Box::new(move |_cc| Ok(Box::new(SvoPlayApp::new(session, panes)))),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {}", e))?;

    Ok(())
}

/// One view's texture slot
struct ViewPane {
    view: ViewId,
    surface: SharedSurface,
    texture: Option<TextureHandle>,
    seen: u64,
    size: [usize; 2],
}

impl ViewPane {
    fn new(view: ViewId, surface: SharedSurface) -> Self {
        Self {
            view,
            surface,
            texture: None,
            seen: 0,
            size: [0, 0],
        }
    }

    /// Upload the latest presented buffer if it changed
    fn refresh(&mut self, ctx: &egui::Context) {
        let Some((generation, buffer)) = self.surface.newer_than(self.seen) else {
            return;
        };
        self.seen = generation;
        if !buffer.is_well_formed() {
            tracing::warn!("Ignoring malformed {} buffer", self.view);
            return;
        }

        let size = [buffer.width as usize, buffer.height as usize];
        let image = ColorImage::from_rgba_unmultiplied(size, &buffer.data);
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture(
                    format!("{}_view", self.view),
                    image,
                    TextureOptions::LINEAR,
                ));
            }
        }
        self.size = size;
    }

    fn show(&self, ui: &mut egui::Ui, rect: egui::Rect) {
        let Some(texture) = &self.texture else {
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                format!("Waiting for {} view...", self.view),
                egui::FontId::proportional(18.0),
                egui::Color32::GRAY,
            );
            return;
        };

        let aspect = self.size[0] as f32 / self.size[1].max(1) as f32;
        let (w, h) = if aspect > rect.width() / rect.height() {
            (rect.width(), rect.width() / aspect)
        } else {
            (rect.height() * aspect, rect.height())
        };
        let view_rect = egui::Rect::from_center_size(rect.center(), egui::vec2(w, h));

        ui.painter().image(
            texture.id(),
            view_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }
}

struct SvoPlayApp {
    session: PlaybackSession,
    panes: Vec<ViewPane>,
    started: Instant,
    last_failure: Option<i32>,
}

impl SvoPlayApp {
    fn new(session: PlaybackSession, panes: Vec<ViewPane>) -> Self {
        Self {
            session,
            panes,
            started: Instant::now(),
            last_failure: None,
        }
    }

    fn status_line(&self) -> String {
        let state = match self.session.state() {
            PlaybackState::Idle => "Idle",
            PlaybackState::Playing => "Playing",
            PlaybackState::Stopped => "Stopped",
        };
        let stats = self.session.stats();
        let mut line = format!(
            "{}  |  frame {} / {}  |  {:.2}x  |  loop {}  |  grabbed {}  recreated {}  skipped {}",
            state,
            self.session.current_position(),
            self.session.total_frames(),
            self.session.playback_speed(),
            if self.session.config().loop_enabled { "on" } else { "off" },
            stats.frames_grabbed,
            stats.view_recreations,
            stats.view_skips,
        );
        if let Some(code) = self.last_failure {
            line.push_str(&format!("  |  last grab error {}", code));
        }
        line
    }
}

impl eframe::App for SvoPlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        match self.session.tick(self.started.elapsed().as_secs_f64()) {
            TickOutcome::GrabFailed(code) => self.last_failure = Some(code),
            TickOutcome::Advanced { .. } => self.last_failure = None,
            _ => {}
        }
        for pane in &mut self.panes {
            pane.refresh(ctx);
        }
        if self.session.is_playing() {
            let now = self.started.elapsed().as_secs_f64();
            ctx.request_repaint_after(Duration::from_secs_f64(self.session.time_until_next(now)));
        }

        egui::TopBottomPanel::bottom("controls")
            .frame(egui::Frame::none()
                .fill(egui::Color32::from_rgb(25, 25, 28))
                .inner_margin(egui::Margin::symmetric(12.0, 6.0)))
            .show(ctx, |ui| {
                let total = self.session.total_frames();
                if self.session.is_playing() && total > 0 {
                    let mut frame = self.session.current_position();
                    let slider = egui::Slider::new(&mut frame, 0..=total - 1).show_value(false);
                    if ui.add_sized([ui.available_width(), 12.0], slider).changed() {
                        if let Err(e) = self.session.seek(frame) {
                            tracing::warn!("Seek failed: {}", e);
                        }
                    }
                }

                ui.horizontal(|ui| {
                    let stop = ui.add_enabled(self.session.is_playing(), egui::Button::new("Stop"));
                    if stop.clicked() {
                        self.session.close();
                    }
                    ui.label(
                        egui::RichText::new(self.status_line())
                            .color(egui::Color32::from_gray(200))
                            .monospace(),
                    );
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                let count = self.panes.len().max(1) as f32;
                let pane_width = rect.width() / count;
                for (i, pane) in self.panes.iter().enumerate() {
                    let pane_rect = egui::Rect::from_min_size(
                        egui::pos2(rect.min.x + pane_width * i as f32, rect.min.y),
                        egui::vec2(pane_width, rect.height()),
                    );
                    pane.show(ui, pane_rect);
                }
            });
    }
}
