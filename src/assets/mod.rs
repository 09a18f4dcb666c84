use crate::config::AssetConfig;
use crate::scene::{SceneHandle, ViewDescriptor};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAX_IMAGE_BYTES: u64 = 256 * 1024 * 1024;
/// Timed-out fetch threads run to completion; past this many, new attempts are skipped.
const MAX_FETCHES_IN_FLIGHT: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {location} failed: {message}")]
    Http { location: String, message: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: image::ImageError,
    },
}

pub fn is_remote(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Object-storage CDN hosts serve exactly what was uploaded; swapping extensions there only wastes a round trip.
pub fn is_cdn_hosted(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.contains("r2.dev") || lower.contains("r2.cloudflarestorage.com")
}

/// `.jpg`/`.jpeg` becomes `.png` and `.png` becomes `.jpg`; other extensions have no swap.
pub fn swap_extension(location: &str) -> Option<String> {
    let lower = location.to_ascii_lowercase();
    let (stem_len, replacement) = if lower.ends_with(".jpeg") {
        (location.len() - 5, ".png")
    } else if lower.ends_with(".jpg") {
        (location.len() - 4, ".png")
    } else if lower.ends_with(".png") {
        (location.len() - 4, ".jpg")
    } else {
        return None;
    };
    Some(format!("{}{}", &location[..stem_len], replacement))
}

/// Maps site-absolute paths such as `/assets/panoramas/a.jpg` under `root`.
pub fn resolve_local_path(root: &Path, location: &str) -> PathBuf {
    let trimmed = location.trim_start_matches('/');
    root.join(trimmed)
}

/// Byte source for panorama images.
pub trait AssetSource: Send + Sync + 'static {
    fn fetch(&self, location: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// HTTP(S) through `ureq` for remote locations, the filesystem for everything else.
pub struct DefaultAssetSource {
    asset_root: PathBuf,
}

impl DefaultAssetSource {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }
}

impl AssetSource for DefaultAssetSource {
    fn fetch(&self, location: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        if is_remote(location) {
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            let response = agent.get(location).call().map_err(|err| FetchError::Http {
                location: location.to_string(),
                message: err.to_string(),
            })?;
            let mut bytes = Vec::new();
            response
                .into_reader()
                .take(MAX_IMAGE_BYTES)
                .read_to_end(&mut bytes)
                .map_err(|source| FetchError::Read {
                    path: location.to_string(),
                    source,
                })?;
            Ok(bytes)
        } else {
            let path = resolve_local_path(&self.asset_root, location);
            std::fs::read(&path).map_err(|source| FetchError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    }
}

/// Pixels ready to hand to the engine without another network round trip.
#[derive(Clone)]
pub struct DecodedPanorama {
    pub location: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<image::RgbaImage>,
}

impl std::fmt::Debug for DecodedPanorama {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedPanorama")
            .field("location", &self.location)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum RenderableImage {
    Decoded(DecodedPanorama),
    /// Nothing loaded; the engine gets the original location and reports the failure itself.
    Unresolved { location: String },
}

impl RenderableImage {
    pub fn location(&self) -> &str {
        match self {
            RenderableImage::Decoded(decoded) => &decoded.location,
            RenderableImage::Unresolved { location } => location,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, RenderableImage::Decoded(_))
    }
}

pub struct Preloader<S: AssetSource = DefaultAssetSource> {
    source: Arc<S>,
    in_flight: Arc<AtomicUsize>,
    remote_timeout: Duration,
    local_timeout: Duration,
}

impl<S: AssetSource> Clone for Preloader<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            in_flight: Arc::clone(&self.in_flight),
            remote_timeout: self.remote_timeout,
            local_timeout: self.local_timeout,
        }
    }
}

impl Preloader<DefaultAssetSource> {
    pub fn new(config: &AssetConfig) -> Self {
        Self::with_source(DefaultAssetSource::new(config.asset_root.clone()), config)
    }
}

impl<S: AssetSource> Preloader<S> {
    pub fn with_source(source: S, config: &AssetConfig) -> Self {
        Self {
            source: Arc::new(source),
            in_flight: Arc::new(AtomicUsize::new(0)),
            remote_timeout: config.remote_timeout,
            local_timeout: config.local_timeout,
        }
    }

    pub fn timeout_for(&self, location: &str) -> Duration {
        if is_remote(location) {
            self.remote_timeout
        } else {
            self.local_timeout
        }
    }

    /// Locations `materialize` tries, in order.
    pub fn candidates(view: &ViewDescriptor) -> Vec<String> {
        let Some(primary) = view.image() else {
            return Vec::new();
        };
        let mut candidates = vec![primary.to_string()];
        if !is_cdn_hosted(primary) {
            if let Some(swapped) = swap_extension(primary) {
                candidates.push(swapped);
            }
        }
        for location in view.fallback_chain() {
            if !candidates.iter().any(|known| known == location) {
                candidates.push(location.to_string());
            }
        }
        candidates
    }

    /// Always returns; worst case an unresolved handle at the primary location.
    pub fn materialize(&self, view: &ViewDescriptor) -> RenderableImage {
        let Some(primary) = view.image() else {
            let location = match &view.projection {
                crate::scene::Projection::Multires(tiles) => tiles.base_path.clone(),
                crate::scene::Projection::Equirectangular { image } => image.clone(),
            };
            log::debug!("Tiled view {} needs no preload", location);
            return RenderableImage::Unresolved { location };
        };

        for location in Self::candidates(view) {
            if let Some(decoded) = self.attempt(&location) {
                if location != primary {
                    log::info!("Panorama {} served from fallback {}", primary, location);
                }
                return RenderableImage::Decoded(decoded);
            }
        }

        log::warn!("Panorama asset missing or failed to preload: {}", primary);
        RenderableImage::Unresolved {
            location: primary.to_string(),
        }
    }

    /// Fetch threads still running, including ones whose attempt already timed out.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Fetch and decode on a helper thread, giving up after the location's timeout.
    fn attempt(&self, location: &str) -> Option<DecodedPanorama> {
        if self.in_flight() >= MAX_FETCHES_IN_FLIGHT {
            log::warn!(
                "{} abandoned fetches still running, skipping {}",
                MAX_FETCHES_IN_FLIGHT,
                location
            );
            return None;
        }
        let timeout = self.timeout_for(location);
        let (tx, rx) = mpsc::channel();
        let source = Arc::clone(&self.source);
        let owned = location.to_string();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name("panotour_fetch".to_string())
            .spawn(move || {
                let _ = tx.send(fetch_and_decode(source.as_ref(), &owned, timeout));
                in_flight.fetch_sub(1, Ordering::AcqRel);
            });
        if let Err(err) = spawned {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            log::warn!("Could not start fetch for {}: {}", location, err);
            return None;
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(decoded)) => Some(decoded),
            Ok(Err(err)) => {
                log::debug!("Preload attempt failed: {}", err);
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Image load timeout ({} ms): {}", timeout.as_millis(), location);
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Warms the transport for a view the visitor is hovering; errors are swallowed.
    pub fn prefetch(&self, view: &ViewDescriptor) {
        let Some(location) = view.image().map(str::to_string) else {
            return;
        };
        let timeout = self.timeout_for(&location);
        let source = Arc::clone(&self.source);
        let _ = thread::Builder::new()
            .name("panotour_prefetch".to_string())
            .spawn(move || {
                let _ = source.fetch(&location, timeout);
            });
    }
}

fn fetch_and_decode<S: AssetSource>(
    source: &S,
    location: &str,
    timeout: Duration,
) -> Result<DecodedPanorama, FetchError> {
    let bytes = source.fetch(location, timeout)?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| FetchError::Decode {
        location: location.to_string(),
        source,
    })?;
    let pixels = decoded.to_rgba8();
    Ok(DecodedPanorama {
        location: location.to_string(),
        width: pixels.width(),
        height: pixels.height(),
        pixels: Arc::new(pixels),
    })
}

#[derive(Debug, Clone)]
pub struct PreloadRequest {
    pub generation: u64,
    pub handle: SceneHandle,
    pub view: ViewDescriptor,
}

#[derive(Debug, Clone)]
pub struct PreloadResult {
    pub generation: u64,
    pub handle: SceneHandle,
    pub view: ViewDescriptor,
    pub image: RenderableImage,
}

/// Runs `materialize` off the UI thread; results come back tagged with their generation.
pub struct PreloadWorker {
    requests: Option<Sender<PreloadRequest>>,
    results: Receiver<PreloadResult>,
}

impl PreloadWorker {
    pub fn spawn<S: AssetSource>(preloader: Preloader<S>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<PreloadRequest>();
        let (result_tx, result_rx) = mpsc::channel();
        thread::Builder::new()
            .name("panotour_preload".to_string())
            .spawn(move || preload_loop(preloader, request_rx, result_tx))?;
        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
        })
    }

    pub fn submit(&self, request: PreloadRequest) -> bool {
        match &self.requests {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }

    /// Non-blocking; everything finished since the last call.
    pub fn drain(&self) -> Vec<PreloadResult> {
        let mut finished = Vec::new();
        loop {
            match self.results.try_recv() {
                Ok(result) => finished.push(result),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        finished
    }

    pub fn wait(&self, timeout: Duration) -> Option<PreloadResult> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for PreloadWorker {
    fn drop(&mut self) {
        // Closing the channel ends the loop once the current job finishes.
        self.requests.take();
    }
}

fn preload_loop<S: AssetSource>(
    preloader: Preloader<S>,
    requests: Receiver<PreloadRequest>,
    results: Sender<PreloadResult>,
) {
    while let Ok(mut request) = requests.recv() {
        // Only the newest queued request can still matter.
        while let Ok(newer) = requests.try_recv() {
            log::debug!(
                "Skipping superseded preload {} (generation {})",
                request.handle,
                request.generation
            );
            request = newer;
        }
        let image = preloader.materialize(&request.view);
        let finished = PreloadResult {
            generation: request.generation,
            handle: request.handle,
            view: request.view,
            image,
        };
        if results.send(finished).is_err() {
            break;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        is_cdn_hosted, resolve_local_path, swap_extension, AssetSource, FetchError, Preloader,
        PreloadRequest, PreloadWorker, RenderableImage,
    };
    use crate::config::AssetConfig;
    use crate::scene::{Direction, Selection, TimeKey, ViewDescriptor};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
        let mut bytes = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// In-memory source that records every location asked for.
    #[derive(Default)]
    pub(crate) struct MapSource {
        pub files: HashMap<String, Vec<u8>>,
        pub delay: Option<Duration>,
        pub requested: Mutex<Vec<String>>,
    }

    impl MapSource {
        pub(crate) fn with(files: &[(&str, Vec<u8>)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(location, bytes)| (location.to_string(), bytes.clone()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl AssetSource for MapSource {
        fn fetch(&self, location: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
            self.requested.lock().unwrap().push(location.to_string());
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.files
                .get(location)
                .cloned()
                .ok_or_else(|| FetchError::Http {
                    location: location.to_string(),
                    message: "404".to_string(),
                })
        }
    }

    fn quick_config() -> AssetConfig {
        AssetConfig {
            remote_timeout: Duration::from_millis(200),
            local_timeout: Duration::from_millis(100),
            ..AssetConfig::default()
        }
    }

    #[test]
    fn extension_swap_covers_jpeg_and_png() {
        assert_eq!(swap_extension("/a/b.jpg").as_deref(), Some("/a/b.png"));
        assert_eq!(swap_extension("/a/b.JPEG").as_deref(), Some("/a/b.png"));
        assert_eq!(swap_extension("/a/b.png").as_deref(), Some("/a/b.jpg"));
        assert_eq!(swap_extension("/a/b.webp"), None);
    }

    #[test]
    fn cdn_locations_skip_extension_swap() {
        let view = ViewDescriptor::equirectangular("https://pub-1.r2.dev/44f/noon.jpg");
        assert!(is_cdn_hosted(view.image().unwrap()));
        assert_eq!(
            Preloader::<super::DefaultAssetSource>::candidates(&view),
            vec!["https://pub-1.r2.dev/44f/noon.jpg".to_string()]
        );
    }

    #[test]
    fn candidates_follow_fallback_order() {
        let mut view = ViewDescriptor::equirectangular("/assets/44f-noon.jpg");
        view.alternates = vec!["https://mirror.example.com/44f-noon.jpg".to_string()];
        view.fallback_local = Some("/assets/local/44f-noon.jpg".to_string());
        assert_eq!(
            Preloader::<super::DefaultAssetSource>::candidates(&view),
            vec![
                "/assets/44f-noon.jpg".to_string(),
                "/assets/44f-noon.png".to_string(),
                "https://mirror.example.com/44f-noon.jpg".to_string(),
                "/assets/local/44f-noon.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn primary_location_is_used_when_available() {
        let source = MapSource::with(&[("/assets/a.jpg", png_bytes(8, 4))]);
        let preloader = Preloader::with_source(source, &quick_config());
        let image = preloader.materialize(&ViewDescriptor::equirectangular("/assets/a.jpg"));
        match image {
            RenderableImage::Decoded(decoded) => {
                assert_eq!(decoded.location, "/assets/a.jpg");
                assert_eq!((decoded.width, decoded.height), (8, 4));
            }
            other => panic!("expected decoded image, got {:?}", other),
        }
    }

    #[test]
    fn swapped_extension_recovers_mismatched_asset() {
        let source = MapSource::with(&[("/assets/a.png", png_bytes(2, 1))]);
        let preloader = Preloader::with_source(source, &quick_config());
        let image = preloader.materialize(&ViewDescriptor::equirectangular("/assets/a.jpg"));
        assert_eq!(image.location(), "/assets/a.png");
        assert!(image.is_decoded());
    }

    #[test]
    fn local_fallback_is_tried_last() {
        let source = MapSource::with(&[("/local/a.jpg", png_bytes(2, 1))]);
        let preloader = Preloader::with_source(source, &quick_config());
        let mut view = ViewDescriptor::equirectangular("https://pub-1.r2.dev/a.jpg");
        view.fallback_local = Some("/local/a.jpg".to_string());
        let image = preloader.materialize(&view);
        assert_eq!(image.location(), "/local/a.jpg");
        let requested = preloader.source.requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            vec![
                "https://pub-1.r2.dev/a.jpg".to_string(),
                "/local/a.jpg".to_string()
            ]
        );
    }

    #[test]
    fn undecodable_bytes_fall_through() {
        let source = MapSource::with(&[
            ("/assets/a.jpg", b"not an image".to_vec()),
            ("/assets/a.png", png_bytes(1, 1)),
        ]);
        let preloader = Preloader::with_source(source, &quick_config());
        let image = preloader.materialize(&ViewDescriptor::equirectangular("/assets/a.jpg"));
        assert_eq!(image.location(), "/assets/a.png");
    }

    #[test]
    fn total_failure_still_resolves_within_timeouts() {
        let source = MapSource {
            delay: Some(Duration::from_secs(2)),
            ..MapSource::default()
        };
        let config = AssetConfig {
            remote_timeout: Duration::from_millis(60),
            local_timeout: Duration::from_millis(30),
            ..AssetConfig::default()
        };
        let preloader = Preloader::with_source(source, &config);
        let mut view = ViewDescriptor::equirectangular("/assets/a.jpg");
        view.alternates = vec!["https://mirror.example.com/a.jpg".to_string()];
        view.fallback_local = Some("/local/a.jpg".to_string());

        let started = Instant::now();
        let image = preloader.materialize(&view);
        let elapsed = started.elapsed();

        // Three local attempts plus one remote attempt.
        assert!(elapsed < Duration::from_millis(30 * 3 + 60 + 500), "{elapsed:?}");
        match image {
            RenderableImage::Unresolved { location } => assert_eq!(location, "/assets/a.jpg"),
            other => panic!("expected unresolved handle, got {:?}", other),
        }
    }

    #[test]
    fn abandoned_fetches_cap_new_attempts() {
        let source = MapSource {
            delay: Some(Duration::from_secs(5)),
            ..MapSource::default()
        };
        let config = AssetConfig {
            local_timeout: Duration::from_millis(20),
            ..AssetConfig::default()
        };
        let preloader = Preloader::with_source(source, &config);
        for name in ["a", "b", "c", "d"] {
            let view = ViewDescriptor::equirectangular(format!("/slow/{name}.webp"));
            assert!(!preloader.materialize(&view).is_decoded());
        }
        assert_eq!(preloader.in_flight(), 4);

        let skipped = preloader.materialize(&ViewDescriptor::equirectangular("/slow/e.webp"));
        assert_eq!(skipped.location(), "/slow/e.webp");
        std::thread::sleep(Duration::from_millis(50));
        assert!(!preloader
            .source
            .requested
            .lock()
            .unwrap()
            .contains(&"/slow/e.webp".to_string()));
    }

    #[test]
    fn local_paths_resolve_under_asset_root() {
        assert_eq!(
            resolve_local_path(Path::new("public"), "/assets/panoramas/a.jpg"),
            Path::new("public").join("assets/panoramas/a.jpg")
        );
    }

    #[test]
    fn default_source_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/a.png"), png_bytes(3, 3)).unwrap();
        let config = quick_config().with_asset_root(dir.path());
        let preloader = Preloader::new(&config);
        let image = preloader.materialize(&ViewDescriptor::equirectangular("/assets/a.png"));
        assert!(image.is_decoded());
    }

    #[test]
    fn worker_returns_results_tagged_with_generation() {
        let source = MapSource::with(&[("/assets/a.png", png_bytes(2, 2))]);
        let worker = PreloadWorker::spawn(Preloader::with_source(source, &quick_config())).unwrap();
        let selection = Selection::new(1, TimeKey::Noon, Direction::Stadium);
        assert!(worker.submit(PreloadRequest {
            generation: 7,
            handle: selection.handle(),
            view: ViewDescriptor::equirectangular("/assets/a.png"),
        }));
        let result = worker.wait(Duration::from_secs(5)).expect("preload result");
        assert_eq!(result.generation, 7);
        assert_eq!(result.handle, selection.handle());
        assert!(result.image.is_decoded());
        assert!(worker.drain().is_empty());
    }
}
