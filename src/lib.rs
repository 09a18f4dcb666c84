//! Panorama tour core: scene catalog, view resolution with fallbacks,
//! asset preloading, scene coordination and the idle auto-rotate timer,
//! driven against any engine that implements [`engine::PanoramaEngine`].

pub mod app;
pub mod assets;
pub mod camera;
pub mod config;
pub mod engine;
pub mod scene;
pub mod ui;

pub use app::{Command, TourSession};
pub use engine::{HeadlessEngine, PanoramaEngine};
pub use scene::{Direction, SceneCatalog, Selection, TimeKey};
