//! Capability interface to the embedded panorama engine.
//!
//! Engines differ in what they support, so every method has a do-nothing
//! default and a host only implements what its engine actually offers.
//! [`HeadlessEngine`] keeps the whole model in memory and backs the CLI.

use crate::assets::DecodedPanorama;
use crate::camera::CameraAngles;
use crate::scene::{Marker, MultiresDescriptor, SceneHandle};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("panorama engine failed to start: {0}")]
    Init(String),
    #[error("scene {0} is not registered")]
    UnknownScene(String),
    #[error("scene {handle} failed: {message}")]
    Scene { handle: String, message: String },
    #[error("engine has been destroyed")]
    Destroyed,
}

/// What the engine should draw for a scene.
#[derive(Debug, Clone)]
pub enum SceneSource {
    /// Tile pyramid; the engine fetches tiles lazily.
    Tiles(MultiresDescriptor),
    /// Remote or unresolved location; the engine fetches it and reports failures itself.
    Url(String),
    /// Pixels already decoded by the preloader.
    Image(DecodedPanorama),
}

impl SceneSource {
    pub fn kind(&self) -> &'static str {
        match self {
            SceneSource::Tiles(_) => "multires",
            SceneSource::Url(_) => "url",
            SceneSource::Image(_) => "image",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub source: SceneSource,
    pub camera: CameraAngles,
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Loaded(SceneHandle),
    Error(String),
}

pub trait PanoramaEngine {
    fn register_scene(
        &mut self,
        _handle: &SceneHandle,
        _config: SceneConfig,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// `camera` overrides the scene's configured angles when present.
    fn load_scene(
        &mut self,
        _handle: &SceneHandle,
        _camera: Option<CameraAngles>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn yaw(&self) -> Option<f32> {
        None
    }

    fn set_yaw(&mut self, _yaw: f32) {}

    fn pitch(&self) -> Option<f32> {
        None
    }

    fn set_pitch(&mut self, _pitch: f32) {}

    fn hfov(&self) -> Option<f32> {
        None
    }

    fn set_hfov(&mut self, _hfov: f32) {}

    /// Current orientation; missing getters read as yaw 0, pitch 0, hfov 90.
    fn camera(&self) -> CameraAngles {
        let fallback = CameraAngles::default();
        CameraAngles {
            yaw: self.yaw().unwrap_or(fallback.yaw),
            pitch: self.pitch().unwrap_or(fallback.pitch),
            hfov: self.hfov().unwrap_or(fallback.hfov),
        }
    }

    fn start_auto_rotate(&mut self, _speed: f32) {}

    fn stop_auto_rotate(&mut self) {}

    fn start_orientation(&mut self) {}

    fn stop_orientation(&mut self) {}

    fn toggle_fullscreen(&mut self) {}

    /// Load and error notifications since the last call.
    fn drain_events(&mut self) -> Vec<EngineEvent> {
        Vec::new()
    }

    fn destroy(&mut self) {}
}

/// Engine that tracks scenes and camera state without drawing anything.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    scenes: BTreeMap<SceneHandle, SceneConfig>,
    current: Option<SceneHandle>,
    camera: CameraAngles,
    auto_rotate: Option<f32>,
    orientation: bool,
    fullscreen: bool,
    events: Vec<EngineEvent>,
    loads: usize,
    destroyed: bool,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_scene(&self) -> Option<&SceneHandle> {
        self.current.as_ref()
    }

    pub fn scene(&self, handle: &SceneHandle) -> Option<&SceneConfig> {
        self.scenes.get(handle)
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn load_count(&self) -> usize {
        self.loads
    }

    pub fn auto_rotate_speed(&self) -> Option<f32> {
        self.auto_rotate
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn orientation_active(&self) -> bool {
        self.orientation
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Applies auto-rotation for `seconds` of wall time.
    pub fn advance(&mut self, seconds: f32) {
        if let Some(speed) = self.auto_rotate {
            self.camera.yaw += speed * seconds;
            self.camera = self.camera.wrapped();
        }
    }
}

impl PanoramaEngine for HeadlessEngine {
    fn register_scene(
        &mut self,
        handle: &SceneHandle,
        config: SceneConfig,
    ) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        log::debug!("Registered scene {} ({})", handle, config.source.kind());
        self.scenes.insert(handle.clone(), config);
        Ok(())
    }

    fn load_scene(
        &mut self,
        handle: &SceneHandle,
        camera: Option<CameraAngles>,
    ) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        let config = self
            .scenes
            .get(handle)
            .ok_or_else(|| EngineError::UnknownScene(handle.to_string()))?;
        self.camera = camera.unwrap_or(config.camera).wrapped();
        self.current = Some(handle.clone());
        self.loads += 1;
        self.events.push(EngineEvent::Loaded(handle.clone()));
        Ok(())
    }

    fn yaw(&self) -> Option<f32> {
        Some(self.camera.yaw)
    }

    fn set_yaw(&mut self, yaw: f32) {
        self.camera.yaw = yaw;
        self.camera = self.camera.wrapped();
    }

    fn pitch(&self) -> Option<f32> {
        Some(self.camera.pitch)
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.camera.pitch = pitch;
        self.camera = self.camera.wrapped();
    }

    fn hfov(&self) -> Option<f32> {
        Some(self.camera.hfov)
    }

    fn set_hfov(&mut self, hfov: f32) {
        self.camera.hfov = hfov;
    }

    fn start_auto_rotate(&mut self, speed: f32) {
        self.auto_rotate = Some(speed);
    }

    fn stop_auto_rotate(&mut self) {
        self.auto_rotate = None;
    }

    fn start_orientation(&mut self) {
        self.orientation = true;
    }

    fn stop_orientation(&mut self) {
        self.orientation = false;
    }

    fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    fn destroy(&mut self) {
        self.scenes.clear();
        self.current = None;
        self.auto_rotate = None;
        self.destroyed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, HeadlessEngine, PanoramaEngine, SceneConfig, SceneSource};
    use crate::camera::CameraAngles;
    use crate::scene::{Direction, Selection, TimeKey};

    struct BareEngine;

    impl PanoramaEngine for BareEngine {}

    fn url_scene(camera: CameraAngles) -> SceneConfig {
        SceneConfig {
            source: SceneSource::Url("https://cdn.example.com/a.jpg".to_string()),
            camera,
            markers: Vec::new(),
        }
    }

    #[test]
    fn bare_engine_tolerates_every_call() {
        let mut engine = BareEngine;
        let handle = Selection::new(1, TimeKey::Noon, Direction::Stadium).handle();
        assert!(engine
            .register_scene(&handle, url_scene(CameraAngles::default()))
            .is_ok());
        assert!(engine.load_scene(&handle, None).is_ok());
        engine.set_yaw(10.0);
        engine.start_auto_rotate(-2.0);
        engine.toggle_fullscreen();
        engine.destroy();
        assert_eq!(engine.camera(), CameraAngles::default());
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn headless_load_uses_scene_defaults_unless_overridden() {
        let mut engine = HeadlessEngine::new();
        let handle = Selection::new(1, TimeKey::Noon, Direction::Stadium).handle();
        engine
            .register_scene(&handle, url_scene(CameraAngles::new(40.0, 5.0, 80.0)))
            .unwrap();
        engine.load_scene(&handle, None).unwrap();
        assert_eq!(engine.camera(), CameraAngles::new(40.0, 5.0, 80.0));

        engine
            .load_scene(&handle, Some(CameraAngles::new(-10.0, 0.0, 100.0)))
            .unwrap();
        assert_eq!(engine.camera(), CameraAngles::new(-10.0, 0.0, 100.0));
        assert_eq!(engine.load_count(), 2);
        assert_eq!(engine.drain_events().len(), 2);
    }

    #[test]
    fn headless_rejects_unknown_and_destroyed() {
        let mut engine = HeadlessEngine::new();
        let handle = Selection::new(2, TimeKey::Night, Direction::MarineLine).handle();
        assert_eq!(
            engine.load_scene(&handle, None),
            Err(EngineError::UnknownScene(handle.to_string()))
        );
        engine.destroy();
        assert_eq!(
            engine.register_scene(&handle, url_scene(CameraAngles::default())),
            Err(EngineError::Destroyed)
        );
    }

    #[test]
    fn auto_rotation_advances_yaw() {
        let mut engine = HeadlessEngine::new();
        engine.start_auto_rotate(-2.0);
        engine.advance(5.0);
        assert!((engine.camera().yaw + 10.0).abs() < 1e-4);
        engine.stop_auto_rotate();
        engine.advance(5.0);
        assert!((engine.camera().yaw + 10.0).abs() < 1e-4);
    }
}
