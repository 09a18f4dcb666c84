pub mod coordinator;
pub mod inactivity;
pub mod input;

use crate::assets::{AssetSource, DefaultAssetSource, PreloadRequest, PreloadWorker, Preloader};
use crate::engine::{EngineError, PanoramaEngine};
use crate::scene::{resolver, Direction, SceneCatalog, Selection, TimeKey};
use crate::ui::ShellView;
use coordinator::{CoordinatorState, Outcome, SceneCoordinator};
use inactivity::{InactivityController, MotionPreference};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything a visitor can ask the tour to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectFloor(u32),
    SelectTime(TimeKey),
    SelectDirection(Direction),
    ZoomIn,
    ZoomOut,
    ResetView,
    ToggleFullscreen,
    ToggleAutoRotate,
    ToggleOrientation,
    /// Pointer is resting on a selector; warm the asset behind it.
    HoverPreview(Selection),
    DismissNotice,
}

/// Transient message shown over the panorama.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
    pub expires_at: Instant,
}

/// Per-frame driver tying the coordinator, preload worker, idle timer and notices together.
pub struct TourSession<E: PanoramaEngine, S: AssetSource = DefaultAssetSource> {
    coordinator: SceneCoordinator<E>,
    preloader: Preloader<S>,
    worker: Option<PreloadWorker>,
    inactivity: InactivityController,
    notice: Option<Notice>,
    notice_duration: Duration,
    orientation: bool,
    prefetched: HashSet<String>,
    torn_down: bool,
}

impl<E: PanoramaEngine, S: AssetSource> TourSession<E, S> {
    pub fn start(
        catalog: Arc<SceneCatalog>,
        engine: Result<E, EngineError>,
        preloader: Preloader<S>,
        preference: Box<dyn MotionPreference>,
        now: Instant,
    ) -> Self {
        let worker = match PreloadWorker::spawn(preloader.clone()) {
            Ok(worker) => Some(worker),
            Err(err) => {
                log::warn!("Preload worker unavailable, loading inline: {}", err);
                None
            }
        };
        let initial = catalog.default_selection().unwrap_or_else(|| {
            let floor = catalog.floors().first().map_or(0, |floor| floor.id);
            Selection::new(floor, TimeKey::Noon, Direction::CentralSea)
        });

        let mut session = Self {
            coordinator: SceneCoordinator::new(Arc::clone(&catalog)),
            preloader,
            worker,
            inactivity: InactivityController::new(&catalog.viewer, preference),
            notice: None,
            notice_duration: catalog.viewer.notice_duration(),
            orientation: false,
            prefetched: HashSet::new(),
            torn_down: false,
        };

        let outcome = session.coordinator.initialize(engine, initial);
        session.handle_outcome(outcome, now);
        if catalog.viewer.auto_rotate_on_start {
            if let Some(engine) = session.coordinator.engine_mut() {
                session.inactivity.set_rotation(engine, true, now);
            }
        }
        session
    }

    pub fn coordinator(&self) -> &SceneCoordinator<E> {
        &self.coordinator
    }

    pub fn inactivity(&self) -> &InactivityController {
        &self.inactivity
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn orientation_active(&self) -> bool {
        self.orientation
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.coordinator.engine_mut()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.coordinator.state(), CoordinatorState::Switching { .. })
    }

    /// Earliest moment `update` has something to do, for hosts that sleep between frames.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let notice = self.notice.as_ref().map(|notice| notice.expires_at);
        match (self.inactivity.deadline(), notice) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn update(&mut self, now: Instant) {
        if self.torn_down {
            return;
        }
        if let Some(worker) = &self.worker {
            for result in worker.drain() {
                self.coordinator.complete_preload(result);
            }
        }
        self.coordinator.pump_engine_events();
        if let Some(engine) = self.coordinator.engine_mut() {
            self.inactivity.tick(engine, now);
        }
        if self
            .notice
            .as_ref()
            .is_some_and(|notice| now >= notice.expires_at)
        {
            self.notice = None;
        }
    }

    /// Feeds raw host input: qualifying events reset the idle timer and shortcuts run.
    pub fn handle_input(&mut self, events: &[egui::Event], now: Instant) {
        if self.torn_down {
            return;
        }
        let mut active = false;
        let mut commands = Vec::new();
        for event in events {
            active |= input::classify(event).is_some();
            commands.extend(input::shortcut(event));
        }
        if active {
            if let Some(engine) = self.coordinator.engine_mut() {
                self.inactivity.on_activity(engine, now);
            }
        }
        for command in commands {
            self.apply(command, now);
        }
    }

    pub fn apply(&mut self, command: Command, now: Instant) {
        if self.torn_down {
            return;
        }
        match command {
            Command::SelectFloor(floor) => {
                let current = self.current_or_default();
                self.select(Selection { floor, ..current }, now);
            }
            Command::SelectTime(time) => {
                let current = self.current_or_default();
                self.select(Selection { time, ..current }, now);
            }
            Command::SelectDirection(direction) => {
                let current = self.current_or_default();
                self.select(Selection { direction, ..current }, now);
            }
            Command::ZoomIn => self.coordinator.zoom_in(),
            Command::ZoomOut => self.coordinator.zoom_out(),
            Command::ResetView => self.coordinator.reset_view(),
            Command::ToggleFullscreen => self.coordinator.toggle_fullscreen(),
            Command::ToggleAutoRotate => {
                if let Some(engine) = self.coordinator.engine_mut() {
                    self.inactivity.toggle_rotation(engine, now);
                }
            }
            Command::ToggleOrientation => {
                self.orientation = !self.orientation;
                self.coordinator.set_orientation_tracking(self.orientation);
            }
            Command::HoverPreview(selection) => self.prefetch(selection),
            Command::DismissNotice => self.notice = None,
        }
    }

    pub fn select(&mut self, selection: Selection, now: Instant) -> Outcome {
        let outcome = self.coordinator.select(selection);
        self.handle_outcome(outcome.clone(), now);
        outcome
    }

    /// Blocks until the pending preload lands or `timeout` elapses; returns true when nothing is pending.
    pub fn settle(&mut self, timeout: Duration, now: Instant) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_loading() {
            let Some(worker) = &self.worker else {
                break;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Some(result) = worker.wait(remaining) {
                self.coordinator.complete_preload(result);
            }
        }
        self.update(now);
        !self.is_loading()
    }

    pub fn shell_view(&self) -> ShellView {
        ShellView::capture(self)
    }

    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.inactivity.teardown();
        self.coordinator.teardown();
        self.worker = None;
        self.notice = None;
    }

    fn current_or_default(&self) -> Selection {
        self.coordinator
            .selection()
            .or_else(|| self.coordinator.catalog().default_selection())
            .unwrap_or_else(|| Selection::new(0, TimeKey::Noon, Direction::CentralSea))
    }

    fn handle_outcome(&mut self, outcome: Outcome, now: Instant) {
        if let Some(reason) = outcome.fallback_reason {
            self.notice = Some(Notice {
                message: reason,
                expires_at: now + self.notice_duration,
            });
        }
        if let Some(request) = outcome.preload {
            self.dispatch_preload(request);
        }
        if outcome.selection_changed {
            if let Some(engine) = self.coordinator.engine_mut() {
                self.inactivity.on_selection_changed(engine, now);
            }
        }
    }

    fn dispatch_preload(&mut self, request: PreloadRequest) {
        if let Some(worker) = &self.worker {
            if worker.submit(request.clone()) {
                return;
            }
            log::warn!("Preload worker stopped, loading {} inline", request.handle);
        }
        let image = self.preloader.materialize(&request.view);
        self.coordinator.complete_preload(crate::assets::PreloadResult {
            generation: request.generation,
            handle: request.handle,
            view: request.view,
            image,
        });
    }

    fn prefetch(&mut self, selection: Selection) {
        let catalog = self.coordinator.catalog();
        let Some(floor) = catalog.floor(selection.floor) else {
            return;
        };
        let resolution =
            resolver::resolve(selection.floor, selection.time, selection.direction, floor);
        let Some(view) = resolution.view else {
            return;
        };
        if self.coordinator.is_registered(&selection.handle()) {
            return;
        }
        let Some(location) = view.image() else {
            return;
        };
        if self.prefetched.insert(location.to_string()) {
            log::debug!("Prefetching {}", location);
            self.preloader.prefetch(view);
        }
    }
}
