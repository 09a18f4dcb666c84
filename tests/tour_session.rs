use panotour::app::coordinator::CoordinatorState;
use panotour::assets::Preloader;
use panotour::config::AssetConfig;
use panotour::engine::SceneSource;
use panotour::scene::serialization::load_catalog_from_file;
use panotour::{Command, Direction, HeadlessEngine, PanoramaEngine, Selection, TimeKey, TourSession};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CATALOG: &str = r#"{
  "property": { "name": "Marina Heights" },
  "viewer": { "inactivity_timeout_ms": 8000 },
  "floors": [
    {
      "id": 44,
      "label": "44th Floor",
      "floor_number": 44,
      "views": {
        "noon": {
          "central-sea": { "projection": "equirectangular", "image": "/assets/44/noon-sea.png" },
          "marine-line": {
            "projection": "equirectangular",
            "image": "/assets/44/noon-marine.png",
            "camera": { "yaw": 30, "pitch": 0, "hfov": 100 }
          }
        },
        "sunset": {
          "stadium": { "projection": "equirectangular", "image": "/assets/44/sunset-stadium.jpg" }
        },
        "night": {
          "stadium": {
            "projection": "equirectangular",
            "image": "/assets/44/night-stadium.png",
            "camera": { "yaw": 0, "pitch": 0, "hfov": 200 }
          }
        }
      }
    },
    { "id": 9, "label": "9th Floor", "floor_number": 9, "views": {} }
  ]
}"#;

fn write_png(root: &Path, location: &str) {
    let path = root.join(location.trim_start_matches('/'));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::new(8, 4).save(&path).unwrap();
}

fn start(root: &Path) -> TourSession<HeadlessEngine> {
    let catalog_path = root.join("tour.json");
    std::fs::write(&catalog_path, CATALOG).unwrap();
    write_png(root, "/assets/44/noon-sea.png");
    write_png(root, "/assets/44/noon-marine.png");
    // Catalog says .jpg; only the .png exists.
    write_png(root, "/assets/44/sunset-stadium.png");

    let (catalog, report) = load_catalog_from_file(&catalog_path).unwrap();
    assert_eq!(report.issues.len(), 2, "{:?}", report.issues);

    let config = AssetConfig {
        local_timeout: Duration::from_secs(5),
        ..AssetConfig::default()
    }
    .with_asset_root(root);
    let mut session = TourSession::start(
        Arc::new(catalog),
        Ok(HeadlessEngine::new()),
        Preloader::new(&config),
        Box::new(false),
        Instant::now(),
    );
    assert!(session.settle(Duration::from_secs(10), Instant::now()));
    session
}

#[test]
fn night_stadium_request_lands_on_sunset_with_notice() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start(dir.path());
    let now = Instant::now();

    session.select(Selection::new(44, TimeKey::Night, Direction::Stadium), now);
    assert!(session.settle(Duration::from_secs(10), now));

    assert_eq!(
        session.notice().map(|notice| notice.message.as_str()),
        Some("night view not available for stadium, showing sunset instead")
    );
    let coordinator = session.coordinator();
    assert_eq!(coordinator.shown(), Some((TimeKey::Sunset, Direction::Stadium)));
    let engine = coordinator.engine().unwrap();
    let scene = engine.scene(coordinator.current_scene().unwrap()).unwrap();
    match &scene.source {
        SceneSource::Image(decoded) => {
            assert_eq!(decoded.location, "/assets/44/sunset-stadium.png");
            assert_eq!((decoded.width, decoded.height), (8, 4));
        }
        other => panic!("expected preloaded image, got {:?}", other),
    }
}

#[test]
fn switching_keeps_the_camera_and_idle_rotation_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start(dir.path());
    let now = Instant::now();

    {
        let engine = session.engine_mut().unwrap();
        engine.set_yaw(-60.0);
        engine.set_hfov(70.0);
    }
    session.apply(Command::SelectDirection(Direction::MarineLine), now);
    assert!(session.settle(Duration::from_secs(10), now));
    let camera = session.coordinator().camera().unwrap();
    assert_eq!((camera.yaw, camera.hfov), (-60.0, 70.0));

    session.update(now + Duration::from_millis(7_999));
    assert!(!session.inactivity().is_rotating());
    session.update(now + Duration::from_millis(8_000));
    assert!(session.inactivity().is_rotating());
    let camera = session.coordinator().camera().unwrap();
    assert_eq!((camera.yaw, camera.pitch, camera.hfov), (0.0, 0.0, 90.0));
}

#[test]
fn empty_floor_shows_placeholder_then_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start(dir.path());
    let now = Instant::now();

    session.apply(Command::SelectFloor(9), now);
    assert!(matches!(
        session.coordinator().state(),
        CoordinatorState::NoContent { reason } if reason == "No views available for floor 9"
    ));
    assert_eq!(
        session.shell_view().no_content.as_deref(),
        Some("No views available for floor 9")
    );

    session.apply(Command::SelectFloor(44), now);
    assert!(session.settle(Duration::from_secs(10), now));
    assert_eq!(session.coordinator().state(), &CoordinatorState::Ready);
    session.teardown();
}
