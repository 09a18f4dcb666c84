use crate::assets::{is_remote, PreloadRequest, PreloadResult, RenderableImage};
use crate::camera::{step_hfov, CameraAngles};
use crate::engine::{EngineError, EngineEvent, PanoramaEngine, SceneConfig, SceneSource};
use crate::scene::resolver::{self, Fallback};
use crate::scene::{
    Direction, Projection, SceneCatalog, SceneHandle, Selection, TimeKey, ViewDescriptor,
};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorState {
    Uninitialized,
    Ready,
    /// Waiting on the preloader for `handle`.
    Switching {
        generation: u64,
        handle: SceneHandle,
    },
    NoContent {
        reason: String,
    },
    Failed {
        message: String,
    },
    Destroyed,
}

/// What the host should do after a selection.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub fallback_reason: Option<String>,
    pub preload: Option<PreloadRequest>,
    pub selection_changed: bool,
}

pub struct SceneCoordinator<E: PanoramaEngine> {
    catalog: Arc<SceneCatalog>,
    engine: Option<E>,
    state: CoordinatorState,
    selection: Option<Selection>,
    shown: Option<(TimeKey, Direction)>,
    generation: u64,
    registered: HashSet<SceneHandle>,
    current: Option<SceneHandle>,
    current_view: Option<ViewDescriptor>,
    error: Option<String>,
}

impl<E: PanoramaEngine> SceneCoordinator<E> {
    pub fn new(catalog: Arc<SceneCatalog>) -> Self {
        Self {
            catalog,
            engine: None,
            state: CoordinatorState::Uninitialized,
            selection: None,
            shown: None,
            generation: 0,
            registered: HashSet::new(),
            current: None,
            current_view: None,
            error: None,
        }
    }

    pub fn catalog(&self) -> &SceneCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Cell actually on screen, which differs from the selection after a time substitution.
    pub fn shown(&self) -> Option<(TimeKey, Direction)> {
        self.shown
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_scene(&self) -> Option<&SceneHandle> {
        self.current.as_ref()
    }

    pub fn current_view(&self) -> Option<&ViewDescriptor> {
        self.current_view.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        match self.state {
            CoordinatorState::Failed { .. } | CoordinatorState::Destroyed => None,
            _ => self.engine.as_mut(),
        }
    }

    pub fn is_registered(&self, handle: &SceneHandle) -> bool {
        self.registered.contains(handle)
    }

    pub fn camera(&self) -> Option<CameraAngles> {
        self.engine.as_ref().map(PanoramaEngine::camera)
    }

    pub fn initialize(&mut self, engine: Result<E, EngineError>, initial: Selection) -> Outcome {
        if self.state != CoordinatorState::Uninitialized {
            log::warn!("Coordinator already initialized, ignoring");
            return Outcome::default();
        }
        match engine {
            Ok(engine) => {
                log::info!("Panorama engine ready, opening {}", initial);
                self.engine = Some(engine);
                self.state = CoordinatorState::Ready;
                self.select(initial)
            }
            Err(err) => {
                log::error!("{}", err);
                self.state = CoordinatorState::Failed {
                    message: err.to_string(),
                };
                Outcome::default()
            }
        }
    }

    pub fn select(&mut self, requested: Selection) -> Outcome {
        match self.state {
            CoordinatorState::Uninitialized
            | CoordinatorState::Failed { .. }
            | CoordinatorState::Destroyed => {
                log::debug!("Ignoring selection {} in state {:?}", requested, self.state);
                return Outcome::default();
            }
            _ => {}
        }

        let catalog = Arc::clone(&self.catalog);
        let resolution = match catalog.floor(requested.floor) {
            Some(floor) => resolver::resolve(
                requested.floor,
                requested.time,
                requested.direction,
                floor,
            ),
            None => resolver::Resolution {
                view: None,
                shown: None,
                fallback: Some(Fallback::NoViews {
                    floor: requested.floor,
                }),
            },
        };

        let mut effective = requested;
        if let Some(Fallback::DirectionSubstituted { shown, .. }) = &resolution.fallback {
            effective.direction = *shown;
        }
        let handle = effective.handle();

        if self.selection == Some(effective)
            && self.state == CoordinatorState::Ready
            && self.current.as_ref() == Some(&handle)
        {
            return Outcome {
                fallback_reason: resolution.fallback_reason(),
                ..Outcome::default()
            };
        }

        self.generation += 1;
        self.selection = Some(effective);
        let fallback_reason = resolution.fallback_reason();

        let (Some(view), Some(shown)) = (resolution.view, resolution.shown) else {
            let reason = fallback_reason
                .clone()
                .unwrap_or_else(|| format!("No views available for floor {}", requested.floor));
            log::warn!("{}", reason);
            self.state = CoordinatorState::NoContent { reason };
            self.shown = None;
            self.current = None;
            self.current_view = None;
            return Outcome {
                fallback_reason,
                preload: None,
                selection_changed: true,
            };
        };
        if let Some(reason) = &fallback_reason {
            log::info!("{}", reason);
        }
        self.shown = Some(shown);

        let view = view.clone();
        let preserved = self.preserved_camera();
        let mut preload = None;

        if self.registered.contains(&handle) {
            log::debug!("Switching to registered scene {}", handle);
            self.load(&handle, &view, preserved);
        } else {
            match &view.projection {
                Projection::Multires(tiles) => {
                    let source = SceneSource::Tiles(tiles.clone());
                    if self.register(&handle, &view, source) {
                        self.load(&handle, &view, preserved);
                    }
                }
                Projection::Equirectangular { image } if is_remote(image) => {
                    let source = SceneSource::Url(image.clone());
                    if self.register(&handle, &view, source) {
                        self.load(&handle, &view, preserved);
                    }
                }
                Projection::Equirectangular { .. } => {
                    log::debug!("Preloading {} (generation {})", handle, self.generation);
                    self.state = CoordinatorState::Switching {
                        generation: self.generation,
                        handle: handle.clone(),
                    };
                    preload = Some(PreloadRequest {
                        generation: self.generation,
                        handle,
                        view: view.clone(),
                    });
                }
            }
        }

        Outcome {
            fallback_reason,
            preload,
            selection_changed: true,
        }
    }

    /// Returns false when the result belongs to a superseded selection.
    pub fn complete_preload(&mut self, result: PreloadResult) -> bool {
        let current = match &self.state {
            CoordinatorState::Switching { generation, handle } => {
                *generation == result.generation && *handle == result.handle
            }
            _ => false,
        };
        if !current {
            log::debug!(
                "Discarding stale preload {} (generation {}, now {})",
                result.handle,
                result.generation,
                self.generation
            );
            return false;
        }

        let source = match result.image {
            RenderableImage::Decoded(decoded) => SceneSource::Image(decoded),
            RenderableImage::Unresolved { location } => SceneSource::Url(location),
        };
        let preserved = self.preserved_camera();
        self.state = CoordinatorState::Ready;
        if self.register(&result.handle, &result.view, source) {
            self.load(&result.handle, &result.view, preserved);
        }
        true
    }

    /// Drains engine notifications; load errors become the error overlay.
    pub fn pump_engine_events(&mut self) -> Vec<EngineEvent> {
        let Some(engine) = self.engine_mut() else {
            return Vec::new();
        };
        let events = engine.drain_events();
        for event in &events {
            match event {
                EngineEvent::Loaded(handle) => log::debug!("Scene {} loaded", handle),
                EngineEvent::Error(message) => {
                    log::error!("Panorama engine error: {}", message);
                    self.error = Some(message.clone());
                }
            }
        }
        events
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn zoom_in(&mut self) {
        self.step_zoom(-self.catalog.viewer.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.step_zoom(self.catalog.viewer.zoom_step);
    }

    fn step_zoom(&mut self, delta: f32) {
        let viewer = self.catalog.viewer.clone();
        let Some(engine) = self.engine_mut() else {
            return;
        };
        if let Some(hfov) = engine.hfov() {
            engine.set_hfov(step_hfov(hfov, delta, viewer.min_hfov, viewer.max_hfov));
        }
    }

    pub fn reset_view(&mut self) {
        let hfov = self.catalog.viewer.default_hfov;
        if let Some(engine) = self.engine_mut() {
            engine.set_yaw(0.0);
            engine.set_pitch(0.0);
            engine.set_hfov(hfov);
        }
    }

    pub fn toggle_fullscreen(&mut self) {
        if let Some(engine) = self.engine_mut() {
            engine.toggle_fullscreen();
        }
    }

    pub fn set_orientation_tracking(&mut self, on: bool) {
        if let Some(engine) = self.engine_mut() {
            if on {
                engine.start_orientation();
            } else {
                engine.stop_orientation();
            }
        }
    }

    pub fn teardown(&mut self) {
        if self.state == CoordinatorState::Destroyed {
            return;
        }
        self.generation += 1;
        if let Some(engine) = self.engine.as_mut() {
            engine.destroy();
        }
        self.registered.clear();
        self.current = None;
        self.current_view = None;
        self.state = CoordinatorState::Destroyed;
        log::info!("Panorama engine destroyed");
    }

    fn preserved_camera(&self) -> Option<CameraAngles> {
        self.current.as_ref()?;
        self.camera()
    }

    fn register(
        &mut self,
        handle: &SceneHandle,
        view: &ViewDescriptor,
        source: SceneSource,
    ) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };
        let config = SceneConfig {
            source,
            camera: view.camera,
            markers: view.markers.clone(),
        };
        match engine.register_scene(handle, config) {
            Ok(()) => {
                self.registered.insert(handle.clone());
                true
            }
            Err(err) => {
                log::error!("Failed to register {}: {}", handle, err);
                self.error = Some(err.to_string());
                self.state = CoordinatorState::Ready;
                false
            }
        }
    }

    fn load(&mut self, handle: &SceneHandle, view: &ViewDescriptor, camera: Option<CameraAngles>) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let loaded = match engine.load_scene(handle, camera) {
            Err(err) if camera.is_some() => {
                log::warn!(
                    "Loading {} with kept camera failed ({}), retrying with scene defaults",
                    handle,
                    err
                );
                engine.load_scene(handle, None)
            }
            other => other,
        };
        self.state = CoordinatorState::Ready;
        match loaded {
            Ok(()) => {
                self.error = None;
                self.current = Some(handle.clone());
                self.current_view = Some(view.clone());
            }
            Err(err) => {
                log::error!("Failed to load {}: {}", handle, err);
                self.error = Some(err.to_string());
            }
        }
    }
}
