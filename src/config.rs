use std::path::PathBuf;
use std::time::Duration;

pub const ENV_ASSET_ROOT: &str = "PANOTOUR_ASSET_ROOT";
pub const ENV_REDUCED_MOTION: &str = "PANOTOUR_REDUCED_MOTION";
pub const ENV_AUTO_ROTATE: &str = "PANOTOUR_AUTO_ROTATE";

/// Viewer behavior shared by every floor; the `viewer` section of the catalog file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerDefaults {
    pub default_hfov: f32,
    pub min_hfov: f32,
    pub max_hfov: f32,
    pub zoom_step: f32,
    /// Start rotating as soon as the first scene is up.
    pub auto_rotate_on_start: bool,
    /// Degrees per second; negative turns right.
    pub auto_rotate_speed: f32,
    pub auto_rotate_yaw: f32,
    pub auto_rotate_pitch: f32,
    pub auto_rotate_hfov: f32,
    pub idle_auto_rotate: bool,
    pub inactivity_timeout_ms: u64,
    pub notice_duration_ms: u64,
}

impl Default for ViewerDefaults {
    fn default() -> Self {
        Self {
            default_hfov: 90.0,
            min_hfov: 50.0,
            max_hfov: 120.0,
            zoom_step: 8.0,
            auto_rotate_on_start: false,
            auto_rotate_speed: -2.0,
            auto_rotate_yaw: 0.0,
            auto_rotate_pitch: 0.0,
            auto_rotate_hfov: 90.0,
            idle_auto_rotate: true,
            inactivity_timeout_ms: 8_000,
            notice_duration_ms: 3_000,
        }
    }
}

impl ViewerDefaults {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notice_duration_ms)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_flag(ENV_AUTO_ROTATE) {
            self.idle_auto_rotate = enabled;
        }
    }
}

/// Where panoramas come from and how long each attempt may take.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetConfig {
    /// Local locations such as `/assets/panoramas/x.jpg` are read relative to this directory.
    pub asset_root: PathBuf,
    pub remote_timeout: Duration,
    pub local_timeout: Duration,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("public"),
            remote_timeout: Duration::from_secs(180),
            local_timeout: Duration::from_secs(60),
        }
    }
}

impl AssetConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ENV_ASSET_ROOT) {
            if !root.trim().is_empty() {
                config.asset_root = PathBuf::from(root);
            }
        }
        config
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }
}

/// Parses `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`; anything else is unset.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().as_deref().and_then(parse_flag)
}
