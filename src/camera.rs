use glam::Vec3;

pub const DEFAULT_HFOV: f32 = 90.0;

fn default_hfov() -> f32 {
    DEFAULT_HFOV
}

/// Camera orientation in degrees, as the panorama engine understands it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CameraAngles {
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default = "default_hfov")]
    pub hfov: f32,
}

impl Default for CameraAngles {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            hfov: DEFAULT_HFOV,
        }
    }
}

impl CameraAngles {
    pub fn new(yaw: f32, pitch: f32, hfov: f32) -> Self {
        Self { yaw, pitch, hfov }
    }

    /// Yaw folded into [-180, 180), pitch clamped to [-90, 90].
    pub fn wrapped(self) -> Self {
        let mut yaw = self.yaw;
        let mut pitch = self.pitch;
        wrap_angles(&mut yaw, &mut pitch);
        Self {
            yaw,
            pitch,
            hfov: self.hfov,
        }
    }

    pub fn forward(&self) -> Vec3 {
        direction_vector(self.yaw, self.pitch)
    }

    /// True when the point at `yaw`/`pitch` falls inside half the horizontal field of view.
    pub fn sees(&self, yaw: f32, pitch: f32) -> bool {
        let target = direction_vector(yaw, pitch);
        let angle = self.forward().angle_between(target).to_degrees();
        angle.is_finite() && angle <= self.hfov * 0.5
    }
}

/// Steps a field of view by `delta`, keeping it inside `[min, max]`.
pub fn step_hfov(current: f32, delta: f32, min: f32, max: f32) -> f32 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let base = if current.is_finite() { current } else { DEFAULT_HFOV };
    (base + delta).clamp(lo, hi)
}

/// Compass heading in [0, 360) for an engine yaw that may be negative or exceed a full turn.
pub fn compass_heading(yaw: f32) -> f32 {
    if !yaw.is_finite() {
        return 0.0;
    }
    let heading = yaw.rem_euclid(360.0);
    if heading >= 360.0 {
        0.0
    } else {
        heading
    }
}

/// Rotation of the compass rose so north stays fixed while the view turns.
pub fn compass_rotation(yaw: f32) -> f32 {
    -compass_heading(yaw)
}

fn direction_vector(yaw_deg: f32, pitch_deg: f32) -> Vec3 {
    let (yaw, pitch) = (yaw_deg.to_radians(), pitch_deg.to_radians());
    let cos_pitch = pitch.cos();
    Vec3::new(yaw.sin() * cos_pitch, pitch.sin(), yaw.cos() * cos_pitch)
}

fn wrap_angles(yaw: &mut f32, pitch: &mut f32) {
    if yaw.is_finite() {
        *yaw = (*yaw + 180.0).rem_euclid(360.0) - 180.0;
    }
    if pitch.is_finite() {
        *pitch = pitch.clamp(-90.0, 90.0);
    }
}

#[cfg(test)]
mod tests {
    use super::{compass_heading, step_hfov, CameraAngles};

    #[test]
    fn wrapped_keeps_finite_values_in_range() {
        let camera = CameraAngles::new(540.0, -120.0, 75.0).wrapped();
        assert!((camera.yaw + 180.0).abs() < 1e-4);
        assert_eq!(camera.pitch, -90.0);
        assert_eq!(camera.hfov, 75.0);
    }

    #[test]
    fn hfov_steps_are_clamped() {
        assert_eq!(step_hfov(90.0, -8.0, 50.0, 120.0), 82.0);
        assert_eq!(step_hfov(52.0, -8.0, 50.0, 120.0), 50.0);
        assert_eq!(step_hfov(118.0, 8.0, 50.0, 120.0), 120.0);
        assert_eq!(step_hfov(f32::NAN, 8.0, 50.0, 120.0), 98.0);
    }

    #[test]
    fn compass_heading_normalizes_negative_yaw() {
        assert!((compass_heading(-90.0) - 270.0).abs() < 1e-4);
        assert!((compass_heading(725.0) - 5.0).abs() < 1e-3);
        assert_eq!(compass_heading(f32::INFINITY), 0.0);
    }

    #[test]
    fn sees_points_inside_field_of_view_only() {
        let camera = CameraAngles::new(0.0, 0.0, 90.0);
        assert!(camera.sees(30.0, 10.0));
        assert!(!camera.sees(120.0, 0.0));
        assert!(!camera.sees(180.0, 0.0));
    }
}
