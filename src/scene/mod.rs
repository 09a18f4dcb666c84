pub mod resolver;
pub mod serialization;

use crate::camera::CameraAngles;
use crate::config::ViewerDefaults;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lighting variant of a panorama.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum TimeKey {
    Sunrise,
    Noon,
    Sunset,
    Night,
}

impl TimeKey {
    /// Natural order, as shown in the time selector.
    pub const ALL: [TimeKey; 4] = [
        TimeKey::Sunrise,
        TimeKey::Noon,
        TimeKey::Sunset,
        TimeKey::Night,
    ];

    /// Most representative lighting first; used when substituting a missing time.
    pub const PRIORITY: [TimeKey; 4] = [
        TimeKey::Noon,
        TimeKey::Sunset,
        TimeKey::Sunrise,
        TimeKey::Night,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeKey::Sunrise => "sunrise",
            TimeKey::Noon => "noon",
            TimeKey::Sunset => "sunset",
            TimeKey::Night => "night",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeKey::Sunrise => "Sunrise",
            TimeKey::Noon => "Noon",
            TimeKey::Sunset => "Sunset",
            TimeKey::Night => "Night",
        }
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TimeKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown time of day '{value}'"))
    }
}

/// Compass direction a panorama faces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    CentralSea,
    MarineLine,
    Stadium,
}

impl Direction {
    /// Primary view type first; doubles as the selector order.
    pub const PRIORITY: [Direction; 3] = [
        Direction::CentralSea,
        Direction::MarineLine,
        Direction::Stadium,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::CentralSea => "central-sea",
            Direction::MarineLine => "marine-line",
            Direction::Stadium => "stadium",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::CentralSea => "Central Sea",
            Direction::MarineLine => "Marine Line",
            Direction::Stadium => "Stadium",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Direction::PRIORITY
            .into_iter()
            .find(|direction| direction.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown direction '{value}'"))
    }
}

/// Tile pyramid served by the engine lazily, one cube face tile at a time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MultiresDescriptor {
    pub base_path: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_path: Option<String>,
    pub extension: String,
    pub tile_resolution: u32,
    pub max_level: u32,
    pub cube_resolution: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "projection", rename_all = "kebab-case")]
pub enum Projection {
    Equirectangular { image: String },
    Multires(MultiresDescriptor),
}

/// Display-only point of interest pinned to the panorama.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Marker {
    pub yaw: f32,
    pub pitch: f32,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One concrete panorama for one (floor, time, direction) cell.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ViewDescriptor {
    #[serde(flatten)]
    pub projection: Projection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_local: Option<String>,
    #[serde(default)]
    pub camera: CameraAngles,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<Marker>,
}

impl ViewDescriptor {
    pub fn equirectangular(image: impl Into<String>) -> Self {
        Self {
            projection: Projection::Equirectangular {
                image: image.into(),
            },
            alternates: Vec::new(),
            fallback_local: None,
            camera: CameraAngles::default(),
            markers: Vec::new(),
        }
    }

    pub fn multires(descriptor: MultiresDescriptor) -> Self {
        Self {
            projection: Projection::Multires(descriptor),
            alternates: Vec::new(),
            fallback_local: None,
            camera: CameraAngles::default(),
            markers: Vec::new(),
        }
    }

    /// Primary image location; `None` for tiled views.
    pub fn image(&self) -> Option<&str> {
        match &self.projection {
            Projection::Equirectangular { image } => Some(image.as_str()),
            Projection::Multires(_) => None,
        }
    }

    pub fn is_tiled(&self) -> bool {
        matches!(self.projection, Projection::Multires(_))
    }

    /// Alternates in order, then the explicit local fallback.
    pub fn fallback_chain(&self) -> impl Iterator<Item = &str> {
        self.alternates
            .iter()
            .map(String::as_str)
            .chain(self.fallback_local.as_deref())
    }
}

pub type ViewGrid = BTreeMap<TimeKey, BTreeMap<Direction, ViewDescriptor>>;

#[derive(Debug, Clone, PartialEq)]
pub struct FloorCatalog {
    pub id: u32,
    pub label: String,
    pub floor_number: u32,
    pub elevation: Option<f32>,
    views: ViewGrid,
}

impl FloorCatalog {
    pub fn new(id: u32, label: impl Into<String>, floor_number: u32) -> Self {
        Self {
            id,
            label: label.into(),
            floor_number,
            elevation: None,
            views: BTreeMap::new(),
        }
    }

    pub fn with_elevation(mut self, elevation: f32) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_view(mut self, time: TimeKey, direction: Direction, view: ViewDescriptor) -> Self {
        self.insert_view(time, direction, view);
        self
    }

    pub fn insert_view(&mut self, time: TimeKey, direction: Direction, view: ViewDescriptor) {
        self.views.entry(time).or_default().insert(direction, view);
    }

    pub fn view(&self, time: TimeKey, direction: Direction) -> Option<&ViewDescriptor> {
        self.views.get(&time)?.get(&direction)
    }

    pub fn has_view(&self, time: TimeKey, direction: Direction) -> bool {
        self.view(time, direction).is_some()
    }

    pub fn view_count(&self) -> usize {
        self.views.values().map(BTreeMap::len).sum()
    }

    /// A floor with no populated cell cannot be offered in the floor selector.
    pub fn is_selectable(&self) -> bool {
        self.view_count() > 0
    }

    /// Directions populated at `time`, in direction priority order.
    pub fn available_directions(&self, time: TimeKey) -> Vec<Direction> {
        Direction::PRIORITY
            .into_iter()
            .filter(|direction| self.has_view(time, *direction))
            .collect()
    }

    /// Times populated for `direction`, in natural order.
    pub fn available_times(&self, direction: Direction) -> Vec<TimeKey> {
        TimeKey::ALL
            .into_iter()
            .filter(|time| self.has_view(*time, direction))
            .collect()
    }

    pub fn cells(&self) -> impl Iterator<Item = (TimeKey, Direction, &ViewDescriptor)> {
        self.views.iter().flat_map(|(time, row)| {
            row.iter()
                .map(move |(direction, view)| (*time, *direction, view))
        })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PropertyMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
}

/// Immutable catalog of every floor, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneCatalog {
    pub property: Option<PropertyMetadata>,
    pub viewer: ViewerDefaults,
    floors: Vec<FloorCatalog>,
}

impl SceneCatalog {
    pub fn new(floors: Vec<FloorCatalog>) -> Self {
        Self {
            property: None,
            viewer: ViewerDefaults::default(),
            floors,
        }
    }

    pub fn floors(&self) -> &[FloorCatalog] {
        &self.floors
    }

    pub fn floor(&self, id: u32) -> Option<&FloorCatalog> {
        self.floors.iter().find(|floor| floor.id == id)
    }

    pub fn floor_by_number(&self, floor_number: u32) -> Option<&FloorCatalog> {
        self.floors
            .iter()
            .find(|floor| floor.floor_number == floor_number)
    }

    pub fn selectable_floors(&self) -> impl Iterator<Item = &FloorCatalog> {
        self.floors.iter().filter(|floor| floor.is_selectable())
    }

    pub fn view(&self, selection: &Selection) -> Option<&ViewDescriptor> {
        self.floor(selection.floor)?
            .view(selection.time, selection.direction)
    }

    pub fn view_count(&self) -> usize {
        self.floors.iter().map(FloorCatalog::view_count).sum()
    }

    /// First selectable floor at noon facing the primary direction.
    pub fn default_selection(&self) -> Option<Selection> {
        let floor = self.selectable_floors().next()?;
        Some(Selection::new(floor.id, TimeKey::Noon, Direction::CentralSea))
    }
}

/// The triple a visitor asked for; may point at an empty cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    pub floor: u32,
    pub time: TimeKey,
    pub direction: Direction,
}

impl Selection {
    pub fn new(floor: u32, time: TimeKey, direction: Direction) -> Self {
        Self {
            floor,
            time,
            direction,
        }
    }

    pub fn handle(&self) -> SceneHandle {
        SceneHandle::from_selection(self)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "floor {} / {} / {}", self.floor, self.time, self.direction)
    }
}

/// Engine-side scene id for a requested selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneHandle(String);

impl SceneHandle {
    pub fn from_selection(selection: &Selection) -> Self {
        Self(format!(
            "floor-{}-{}-{}",
            selection.floor, selection.time, selection.direction
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, FloorCatalog, SceneCatalog, Selection, TimeKey, ViewDescriptor};

    fn sparse_floor() -> FloorCatalog {
        FloorCatalog::new(1, "44th Floor", 44)
            .with_view(
                TimeKey::Noon,
                Direction::Stadium,
                ViewDescriptor::equirectangular("/assets/44/noon/stadium.jpg"),
            )
            .with_view(
                TimeKey::Noon,
                Direction::CentralSea,
                ViewDescriptor::equirectangular("/assets/44/noon/central-sea.jpg"),
            )
            .with_view(
                TimeKey::Night,
                Direction::Stadium,
                ViewDescriptor::equirectangular("/assets/44/night/stadium.jpg"),
            )
    }

    #[test]
    fn available_directions_follow_priority_order() {
        let floor = sparse_floor();
        assert_eq!(
            floor.available_directions(TimeKey::Noon),
            vec![Direction::CentralSea, Direction::Stadium]
        );
        assert!(floor.available_directions(TimeKey::Sunrise).is_empty());
    }

    #[test]
    fn available_times_follow_natural_order() {
        let floor = sparse_floor();
        assert_eq!(
            floor.available_times(Direction::Stadium),
            vec![TimeKey::Noon, TimeKey::Night]
        );
    }

    #[test]
    fn empty_floors_are_not_selectable() {
        let catalog = SceneCatalog::new(vec![FloorCatalog::new(7, "Empty", 40), sparse_floor()]);
        let selectable: Vec<u32> = catalog.selectable_floors().map(|floor| floor.id).collect();
        assert_eq!(selectable, vec![1]);
        assert_eq!(
            catalog.default_selection(),
            Some(Selection::new(1, TimeKey::Noon, Direction::CentralSea))
        );
    }

    #[test]
    fn fallback_chain_lists_alternates_before_local() {
        let mut view = ViewDescriptor::equirectangular("https://cdn.example.com/a.jpg");
        view.alternates = vec!["https://mirror.example.com/a.jpg".to_string()];
        view.fallback_local = Some("/assets/a.jpg".to_string());
        let chain: Vec<&str> = view.fallback_chain().collect();
        assert_eq!(
            chain,
            vec!["https://mirror.example.com/a.jpg", "/assets/a.jpg"]
        );
    }

    #[test]
    fn keys_parse_case_insensitively() {
        assert_eq!("Night".parse::<TimeKey>(), Ok(TimeKey::Night));
        assert_eq!(" marine-line".parse::<Direction>(), Ok(Direction::MarineLine));
        assert!("dusk".parse::<TimeKey>().is_err());
    }

    #[test]
    fn scene_handle_names_the_requested_triple() {
        let selection = Selection::new(3, TimeKey::Sunset, Direction::MarineLine);
        assert_eq!(selection.handle().as_str(), "floor-3-sunset-marine-line");
    }
}
