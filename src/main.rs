//! panotour command line
//!
//! - `validate` loads a catalog and lists everything the loader skipped
//! - `resolve` shows which panorama a floor/time/direction request lands on
//! - `probe` runs every view through the preloader fallback chain
//! - `tour` drives a headless tour session from a script or stdin

use clap::{Parser, Subcommand};
use panotour::app::coordinator::CoordinatorState;
use panotour::app::inactivity::EnvMotionPreference;
use panotour::assets::{Preloader, RenderableImage};
use panotour::camera::compass_heading;
use panotour::config::AssetConfig;
use panotour::scene::resolver::resolve;
use panotour::scene::serialization::{load_catalog_from_file, CatalogError};
use panotour::scene::{Direction, SceneCatalog, TimeKey};
use panotour::{Command, HeadlessEngine, PanoramaEngine, TourSession};

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about = "Panorama tour catalog tools and headless viewer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Load a catalog and report invalid or skipped entries
    Validate {
        catalog: PathBuf,
    },
    /// Show which view a request resolves to, and why
    Resolve {
        catalog: PathBuf,
        /// Floor id (falls back to matching the floor number)
        #[arg(long)]
        floor: u32,
        #[arg(long, default_value = "noon")]
        time: TimeKey,
        #[arg(long, default_value = "central-sea")]
        direction: Direction,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch every single-image view through the preloader fallback chain
    Probe {
        catalog: PathBuf,
        /// Directory local asset paths are read from (defaults to PANOTOUR_ASSET_ROOT or ./public)
        #[arg(long)]
        asset_root: Option<PathBuf>,
        /// Only probe this floor id
        #[arg(long)]
        floor: Option<u32>,
    },
    /// Run a headless tour session; commands come from --script or stdin
    Tour {
        catalog: PathBuf,
        #[arg(long)]
        script: Option<PathBuf>,
        #[arg(long)]
        asset_root: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no floor with id or number {0}")]
    UnknownFloor(u32),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        CliCommand::Validate { catalog } => validate(&catalog),
        CliCommand::Resolve {
            catalog,
            floor,
            time,
            direction,
            json,
        } => resolve_view(&catalog, floor, time, direction, json),
        CliCommand::Probe {
            catalog,
            asset_root,
            floor,
        } => probe(&catalog, asset_config(asset_root), floor),
        CliCommand::Tour {
            catalog,
            script,
            asset_root,
        } => tour(&catalog, script.as_deref(), asset_config(asset_root)),
    }
}

fn asset_config(asset_root: Option<PathBuf>) -> AssetConfig {
    let config = AssetConfig::from_env();
    match asset_root {
        Some(root) => config.with_asset_root(root),
        None => config,
    }
}

fn load(path: &Path) -> Result<SceneCatalog, CliError> {
    let (mut catalog, _) = load_catalog_from_file(path)?;
    catalog.viewer.apply_env_overrides();
    Ok(catalog)
}

fn validate(path: &Path) -> Result<ExitCode, CliError> {
    let (catalog, report) = load_catalog_from_file(path)?;
    println!(
        "{} floors, {} views",
        catalog.floors().len(),
        catalog.view_count()
    );
    for floor in catalog.floors() {
        let marker = if floor.is_selectable() { "" } else { " (not selectable)" };
        println!(
            "  {:>3}  {:<20} {:>2} views{}",
            floor.id,
            floor.label,
            floor.view_count(),
            marker
        );
    }
    if report.is_clean() {
        println!("No issues");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{} issues:", report.issues.len());
    for issue in &report.issues {
        println!("  - {}", issue);
    }
    Ok(ExitCode::from(2))
}

fn resolve_view(
    path: &Path,
    floor_key: u32,
    time: TimeKey,
    direction: Direction,
    json: bool,
) -> Result<ExitCode, CliError> {
    let catalog = load(path)?;
    let floor = catalog
        .floor(floor_key)
        .or_else(|| catalog.floor_by_number(floor_key))
        .ok_or(CliError::UnknownFloor(floor_key))?;
    let resolution = resolve(floor.id, time, direction, floor);

    if json {
        let shown = resolution.shown.map(|(time, direction)| {
            serde_json::json!({ "time": time, "direction": direction })
        });
        let output = serde_json::json!({
            "floor": floor.id,
            "requested": { "time": time, "direction": direction },
            "shown": shown,
            "view": resolution.view,
            "fallback_reason": resolution.fallback_reason(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match (resolution.view, resolution.shown) {
            (Some(view), Some((shown_time, shown_direction))) => {
                let location = view.image().unwrap_or("(multires tiles)");
                println!("{} {} {} -> {}", floor.label, shown_time, shown_direction, location);
            }
            _ => println!("{}: nothing to show", floor.label),
        }
        if let Some(reason) = resolution.fallback_reason() {
            println!("note: {}", reason);
        }
    }

    Ok(if resolution.view.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn probe(path: &Path, config: AssetConfig, only: Option<u32>) -> Result<ExitCode, CliError> {
    let catalog = load(path)?;
    let preloader = Preloader::new(&config);
    let mut unresolved = 0usize;

    for floor in catalog.floors() {
        if only.is_some_and(|id| id != floor.id) {
            continue;
        }
        for (time, direction, view) in floor.cells() {
            let started = Instant::now();
            if view.is_tiled() {
                println!("floor {} {} {}: tiled, fetched by the engine", floor.id, time, direction);
                continue;
            }
            match preloader.materialize(view) {
                RenderableImage::Decoded(decoded) => println!(
                    "floor {} {} {}: {} ({}x{}, {} ms)",
                    floor.id,
                    time,
                    direction,
                    decoded.location,
                    decoded.width,
                    decoded.height,
                    started.elapsed().as_millis()
                ),
                RenderableImage::Unresolved { location } => {
                    unresolved += 1;
                    println!("floor {} {} {}: UNRESOLVED {}", floor.id, time, direction, location);
                }
            }
        }
    }

    if unresolved > 0 {
        log::warn!("{} views could not be loaded from any source", unresolved);
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn tour(path: &Path, script: Option<&Path>, config: AssetConfig) -> Result<ExitCode, CliError> {
    let catalog = Arc::new(load(path)?);
    let settle_timeout = config.remote_timeout;
    let preloader = Preloader::new(&config);
    // Virtual clock so `idle` can skip ahead without sleeping.
    let mut now = Instant::now();
    let mut session = TourSession::start(
        Arc::clone(&catalog),
        Ok(HeadlessEngine::new()),
        preloader,
        Box::new(EnvMotionPreference),
        now,
    );
    session.settle(settle_timeout, now);
    print_status(&session);

    let reader: Box<dyn BufRead> = match script {
        Some(script) => Box::new(BufReader::new(std::fs::File::open(script)?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            [] => continue,
            [first, ..] if first.starts_with('#') => continue,
            ["quit"] | ["exit"] => break,
            ["status"] => {
                print_status(&session);
                continue;
            }
            ["idle", seconds] => {
                let Some(elapsed) = seconds
                    .parse::<f32>()
                    .ok()
                    .and_then(|seconds| Duration::try_from_secs_f32(seconds).ok())
                else {
                    log::warn!("line {}: bad duration {:?}", index + 1, seconds);
                    continue;
                };
                now += elapsed;
                if let Some(engine) = session.engine_mut() {
                    engine.advance(elapsed.as_secs_f32());
                }
                session.update(now);
                continue;
            }
            ["floor", key] => match key.parse::<u32>() {
                Ok(key) => {
                    let id = catalog
                        .floor(key)
                        .or_else(|| catalog.floor_by_number(key))
                        .map_or(key, |floor| floor.id);
                    Command::SelectFloor(id)
                }
                Err(_) => {
                    log::warn!("line {}: bad floor {:?}", index + 1, key);
                    continue;
                }
            },
            ["time", value] => match value.parse::<TimeKey>() {
                Ok(time) => Command::SelectTime(time),
                Err(err) => {
                    log::warn!("line {}: {}", index + 1, err);
                    continue;
                }
            },
            ["direction", value] => match value.parse::<Direction>() {
                Ok(direction) => Command::SelectDirection(direction),
                Err(err) => {
                    log::warn!("line {}: {}", index + 1, err);
                    continue;
                }
            },
            ["zoom", "in"] => Command::ZoomIn,
            ["zoom", "out"] => Command::ZoomOut,
            ["look", yaw, pitch] => {
                match (yaw.parse::<f32>(), pitch.parse::<f32>()) {
                    (Ok(yaw), Ok(pitch)) => {
                        if let Some(engine) = session.engine_mut() {
                            engine.set_yaw(yaw);
                            engine.set_pitch(pitch);
                        }
                        // Dragging the view counts as activity.
                        session.handle_input(&[egui::Event::PointerMoved(egui::Pos2::ZERO)], now);
                    }
                    _ => log::warn!("line {}: bad angles", index + 1),
                }
                continue;
            }
            ["reset"] => Command::ResetView,
            ["fullscreen"] => Command::ToggleFullscreen,
            ["rotate"] => Command::ToggleAutoRotate,
            ["gyro"] => Command::ToggleOrientation,
            _ => {
                log::warn!("line {}: unknown command {:?}", index + 1, line.trim());
                continue;
            }
        };
        session.apply(command, now);
        session.settle(settle_timeout, now);
        print_status(&session);
    }

    session.teardown();
    Ok(ExitCode::SUCCESS)
}

fn print_status(session: &TourSession<HeadlessEngine>) {
    let coordinator = session.coordinator();
    let state = match coordinator.state() {
        CoordinatorState::Uninitialized => "uninitialized".to_string(),
        CoordinatorState::Ready => "ready".to_string(),
        CoordinatorState::Switching { handle, .. } => format!("loading {}", handle),
        CoordinatorState::NoContent { reason } => format!("no content: {}", reason),
        CoordinatorState::Failed { message } => format!("failed: {}", message),
        CoordinatorState::Destroyed => "destroyed".to_string(),
    };
    println!("[{}]", state);
    if let Some(selection) = coordinator.selection() {
        println!("  selected  {}", selection);
    }
    if let Some((time, direction)) = coordinator.shown() {
        println!("  showing   {} / {}", time, direction);
    }
    if let Some(view) = coordinator.current_view() {
        println!("  image     {}", view.image().unwrap_or("(multires tiles)"));
    }
    if let Some(camera) = coordinator.camera() {
        println!(
            "  camera    yaw {:.1} pitch {:.1} hfov {:.1} (heading {:.0})",
            camera.yaw,
            camera.pitch,
            camera.hfov,
            compass_heading(camera.yaw)
        );
    }
    if session.inactivity().is_rotating() {
        println!("  auto-rotating");
    }
    if let Some(notice) = session.notice() {
        println!("  notice    {}", notice.message);
    }
    if let Some(error) = coordinator.error() {
        println!("  error     {}", error);
    }
}
