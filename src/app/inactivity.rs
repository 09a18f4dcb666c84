use crate::camera::CameraAngles;
use crate::config::{env_flag, ViewerDefaults, ENV_REDUCED_MOTION};
use crate::engine::PanoramaEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A toggle this soon after input stopped the rotation still counts as turning it off.
const TOGGLE_GRACE: Duration = Duration::from_millis(800);

pub trait MotionPreference {
    fn prefers_reduced_motion(&self) -> bool;
}

impl MotionPreference for bool {
    fn prefers_reduced_motion(&self) -> bool {
        *self
    }
}

impl MotionPreference for Arc<AtomicBool> {
    fn prefers_reduced_motion(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Reads `PANOTOUR_REDUCED_MOTION` on every check.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvMotionPreference;

impl MotionPreference for EnvMotionPreference {
    fn prefers_reduced_motion(&self) -> bool {
        env_flag(ENV_REDUCED_MOTION).unwrap_or(false)
    }
}

/// Single-deadline idle timer that engages auto-rotation.
pub struct InactivityController {
    timeout: Duration,
    speed: f32,
    focus: CameraAngles,
    enabled: bool,
    deadline: Option<Instant>,
    rotating: bool,
    interrupted_at: Option<Instant>,
    torn_down: bool,
    preference: Box<dyn MotionPreference>,
}

impl InactivityController {
    pub fn new(defaults: &ViewerDefaults, preference: Box<dyn MotionPreference>) -> Self {
        Self {
            timeout: defaults.inactivity_timeout(),
            speed: defaults.auto_rotate_speed,
            focus: CameraAngles::new(
                defaults.auto_rotate_yaw,
                defaults.auto_rotate_pitch,
                defaults.auto_rotate_hfov,
            ),
            enabled: defaults.idle_auto_rotate,
            deadline: None,
            rotating: false,
            interrupted_at: None,
            torn_down: false,
            preference,
        }
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Replaces any pending deadline with a fresh countdown from `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = None;
        if self.torn_down || !self.enabled {
            return;
        }
        if self.preference.prefers_reduced_motion() {
            return;
        }
        self.deadline = Some(now + self.timeout);
    }

    pub fn on_activity<E: PanoramaEngine>(&mut self, engine: &mut E, now: Instant) {
        if self.torn_down {
            return;
        }
        if self.rotating {
            engine.stop_auto_rotate();
            self.rotating = false;
            self.interrupted_at = Some(now);
        }
        self.schedule(now);
    }

    /// A new scene starts a new idle countdown.
    pub fn on_selection_changed<E: PanoramaEngine>(&mut self, engine: &mut E, now: Instant) {
        if self.torn_down {
            return;
        }
        if self.rotating && self.preference.prefers_reduced_motion() {
            engine.stop_auto_rotate();
            self.rotating = false;
        }
        self.schedule(now);
    }

    /// Returns true when auto-rotation was engaged by this call.
    pub fn tick<E: PanoramaEngine>(&mut self, engine: &mut E, now: Instant) -> bool {
        if self.torn_down {
            return false;
        }
        if self.preference.prefers_reduced_motion() {
            self.deadline = None;
            if self.rotating {
                engine.stop_auto_rotate();
                self.rotating = false;
            }
            return false;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                engine.set_yaw(self.focus.yaw);
                engine.set_pitch(self.focus.pitch);
                engine.set_hfov(self.focus.hfov);
                engine.start_auto_rotate(self.speed);
                self.rotating = true;
                self.interrupted_at = None;
                log::debug!("Idle for {} ms, auto-rotating", self.timeout.as_millis());
                true
            }
            _ => false,
        }
    }

    /// Manual auto-rotate toggle; refuses to start under reduced motion.
    pub fn set_rotation<E: PanoramaEngine>(&mut self, engine: &mut E, on: bool, now: Instant) {
        if self.torn_down {
            return;
        }
        self.interrupted_at = None;
        if on {
            if self.preference.prefers_reduced_motion() {
                log::info!("Reduced motion requested, auto-rotate stays off");
                return;
            }
            engine.start_auto_rotate(self.speed);
            self.rotating = true;
            self.deadline = None;
        } else {
            engine.stop_auto_rotate();
            self.rotating = false;
            self.schedule(now);
        }
    }

    /// Flips rotation, treating a rotation that input stopped moments ago as still on.
    pub fn toggle_rotation<E: PanoramaEngine>(&mut self, engine: &mut E, now: Instant) {
        let interrupted = self
            .interrupted_at
            .is_some_and(|at| now.saturating_duration_since(at) <= TOGGLE_GRACE);
        let on = !(self.rotating || interrupted);
        self.set_rotation(engine, on, now);
    }

    pub fn teardown(&mut self) {
        self.deadline = None;
        self.rotating = false;
        self.interrupted_at = None;
        self.torn_down = true;
    }
}
