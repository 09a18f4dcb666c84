use crate::assets::is_remote;
use crate::camera::CameraAngles;
use crate::config::ViewerDefaults;
use crate::scene::{
    Direction, FloorCatalog, Marker, Projection, PropertyMetadata, SceneCatalog, TimeKey,
    ViewDescriptor,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(serde::Deserialize)]
struct RawCatalog {
    #[serde(default)]
    property: Option<PropertyMetadata>,
    #[serde(default)]
    viewer: ViewerDefaults,
    floors: Vec<RawFloor>,
}

// Cells stay untyped until validation so one malformed view cannot sink the whole file.
#[derive(serde::Deserialize)]
struct RawFloor {
    id: u32,
    label: String,
    #[serde(default)]
    floor_number: Option<u32>,
    #[serde(default)]
    elevation: Option<f32>,
    #[serde(default)]
    views: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

/// Something the loader skipped or repaired.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub floor: u32,
    pub cell: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell {
            Some(cell) => write!(f, "floor {} [{}]: {}", self.floor, cell, self.message),
            None => write!(f, "floor {}: {}", self.floor, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, floor: u32, cell: Option<String>, message: impl Into<String>) {
        let issue = ValidationIssue {
            floor,
            cell,
            message: message.into(),
        };
        log::warn!("Catalog: {}", issue);
        self.issues.push(issue);
    }
}

pub fn load_catalog_from_file(path: &Path) -> Result<(SceneCatalog, ValidationReport)> {
    let json = std::fs::read_to_string(path)?;
    let loaded = parse_catalog(&json)?;
    log::info!(
        "Loaded catalog {} ({} floors, {} views)",
        path.display(),
        loaded.0.floors().len(),
        loaded.0.view_count()
    );
    Ok(loaded)
}

pub fn parse_catalog(json: &str) -> Result<(SceneCatalog, ValidationReport)> {
    let raw: RawCatalog = serde_json::from_str(json)?;
    let mut report = ValidationReport::default();
    let mut seen = HashSet::new();
    let mut floors = Vec::with_capacity(raw.floors.len());

    for raw_floor in raw.floors {
        if !seen.insert(raw_floor.id) {
            report.push(raw_floor.id, None, "duplicate floor id, later entry skipped");
            continue;
        }
        let floor = build_floor(raw_floor, &mut report);
        if !floor.is_selectable() {
            report.push(floor.id, None, "no usable views, floor will not be selectable");
        }
        floors.push(floor);
    }

    let mut viewer = raw.viewer;
    if viewer.min_hfov > viewer.max_hfov {
        std::mem::swap(&mut viewer.min_hfov, &mut viewer.max_hfov);
    }

    let catalog = SceneCatalog {
        property: raw.property,
        viewer,
        floors,
    };
    Ok((catalog, report))
}

fn build_floor(raw: RawFloor, report: &mut ValidationReport) -> FloorCatalog {
    let mut floor = FloorCatalog::new(raw.id, raw.label, raw.floor_number.unwrap_or(raw.id));
    floor.elevation = raw.elevation;

    for (time_key, row) in raw.views {
        let Ok(time) = time_key.parse::<TimeKey>() else {
            report.push(raw.id, Some(time_key), "unknown time of day, row skipped");
            continue;
        };
        for (direction_key, value) in row {
            let cell = format!("{time}/{direction_key}");
            let Ok(direction) = direction_key.parse::<Direction>() else {
                report.push(raw.id, Some(cell), "unknown direction, view skipped");
                continue;
            };
            let mut view: ViewDescriptor = match serde_json::from_value(value) {
                Ok(view) => view,
                Err(err) => {
                    report.push(raw.id, Some(cell), format!("malformed view: {err}"));
                    continue;
                }
            };
            if let Err(message) = validate_view(&mut view, raw.id, &cell, report) {
                report.push(raw.id, Some(cell), format!("view excluded: {message}"));
                continue;
            }
            floor.insert_view(time, direction, view);
        }
    }
    floor
}

/// Rejects views without a renderable source; drops bad alternates and markers in place.
fn validate_view(
    view: &mut ViewDescriptor,
    floor: u32,
    cell: &str,
    report: &mut ValidationReport,
) -> std::result::Result<(), String> {
    match &view.projection {
        Projection::Equirectangular { image } => validate_location(image)?,
        Projection::Multires(tiles) => {
            validate_location(&tiles.base_path)?;
            if tiles.path.trim().is_empty() {
                return Err("multires path template is empty".to_string());
            }
            if tiles.extension.trim().is_empty() {
                return Err("multires tile extension is empty".to_string());
            }
            if tiles.tile_resolution == 0 || tiles.max_level == 0 || tiles.cube_resolution == 0 {
                return Err("multires resolutions and levels must be positive".to_string());
            }
        }
    }
    validate_camera(&mut view.camera, floor, cell)?;

    view.alternates.retain(|location| match validate_location(location) {
        Ok(()) => true,
        Err(message) => {
            report.push(
                floor,
                Some(cell.to_string()),
                format!("alternate dropped: {message}"),
            );
            false
        }
    });
    if let Some(local) = &view.fallback_local {
        if let Err(message) = validate_location(local) {
            report.push(
                floor,
                Some(cell.to_string()),
                format!("local fallback dropped: {message}"),
            );
            view.fallback_local = None;
        }
    }
    view.markers.retain(|marker| match validate_marker(marker) {
        Ok(()) => true,
        Err(message) => {
            report.push(
                floor,
                Some(cell.to_string()),
                format!("marker '{}' dropped: {message}", marker.label),
            );
            false
        }
    });
    Ok(())
}

pub fn validate_location(location: &str) -> std::result::Result<(), String> {
    if location.trim().is_empty() {
        return Err("empty location".to_string());
    }
    if location.chars().any(char::is_whitespace) {
        return Err(format!("location '{location}' contains whitespace"));
    }
    if is_remote(location) {
        let rest = location
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let valid_host = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'));
        if !valid_host {
            return Err(format!("remote location '{location}' has no valid host"));
        }
    } else if location.contains("://") {
        return Err(format!("unsupported scheme in '{location}'"));
    }
    Ok(())
}

/// Out-of-range default angles are wrapped; only the field of view can reject a view.
fn validate_camera(
    camera: &mut CameraAngles,
    floor: u32,
    cell: &str,
) -> std::result::Result<(), String> {
    if !camera.yaw.is_finite() || !camera.pitch.is_finite() {
        return Err(format!("camera angles {}/{} are not finite", camera.yaw, camera.pitch));
    }
    if validate_angles(camera.yaw, camera.pitch).is_err() {
        let wrapped = camera.wrapped();
        log::warn!(
            "Floor {} {}: camera yaw/pitch {}/{} wrapped to {}/{}",
            floor,
            cell,
            camera.yaw,
            camera.pitch,
            wrapped.yaw,
            wrapped.pitch
        );
        *camera = wrapped;
    }
    if !(30.0..=150.0).contains(&camera.hfov) {
        return Err(format!("hfov {} outside [30, 150]", camera.hfov));
    }
    Ok(())
}

fn validate_marker(marker: &Marker) -> std::result::Result<(), String> {
    validate_angles(marker.yaw, marker.pitch)?;
    if marker.label.trim().is_empty() {
        return Err("empty label".to_string());
    }
    Ok(())
}

fn validate_angles(yaw: f32, pitch: f32) -> std::result::Result<(), String> {
    if !(-180.0..=180.0).contains(&yaw) {
        return Err(format!("yaw {yaw} outside [-180, 180]"));
    }
    if !(-90.0..=90.0).contains(&pitch) {
        return Err(format!("pitch {pitch} outside [-90, 90]"));
    }
    Ok(())
}
