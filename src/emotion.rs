//! Best-effort emotion sensor: grab a camera frame, ask the backend for a label,
//! publish the latest sample. Failures are logged and the prior label is kept.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::models::EmotionSample;
use crate::scheduler::Periodic;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("no frames found in {0}")]
    NoFrames(PathBuf),

    #[error("camera returned an empty frame")]
    EmptyFrame,

    #[error("camera I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An acquired camera. Dropping it releases the device.
#[async_trait]
pub trait Camera: Send {
    async fn grab_frame(&mut self) -> Result<Vec<u8>, CameraError>;
}

pub trait CameraDevice: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn Camera>, CameraError>;
}

/// Runs an external frame grabber that writes one JPEG to stdout.
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
}

impl CommandCamera {
    pub fn new(command: &[String]) -> Result<Self, CameraError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| CameraError::Unavailable("no camera command configured".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

struct CommandCameraHandle {
    program: PathBuf,
    args: Vec<String>,
}

impl CameraDevice for CommandCamera {
    fn acquire(&self) -> Result<Box<dyn Camera>, CameraError> {
        let program = which::which(&self.program)
            .map_err(|e| CameraError::Unavailable(format!("{}: {e}", self.program)))?;
        Ok(Box::new(CommandCameraHandle {
            program,
            args: self.args.clone(),
        }))
    }
}

#[async_trait]
impl Camera for CommandCameraHandle {
    async fn grab_frame(&mut self) -> Result<Vec<u8>, CameraError> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::Unavailable(stderr.trim().to_string()));
        }
        if output.stdout.is_empty() {
            return Err(CameraError::EmptyFrame);
        }
        Ok(output.stdout)
    }
}

/// Replays `*.jpg` files from a directory, in name order, looping.
pub struct DirectoryCamera {
    dir: PathBuf,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

struct DirectoryCameraHandle {
    frames: Vec<PathBuf>,
    next: usize,
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

impl CameraDevice for DirectoryCamera {
    fn acquire(&self) -> Result<Box<dyn Camera>, CameraError> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(|e| CameraError::Unavailable(format!("{}: {e}", self.dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_jpeg(path))
            .collect();
        if frames.is_empty() {
            return Err(CameraError::NoFrames(self.dir.clone()));
        }
        frames.sort();
        Ok(Box::new(DirectoryCameraHandle { frames, next: 0 }))
    }
}

#[async_trait]
impl Camera for DirectoryCameraHandle {
    async fn grab_frame(&mut self) -> Result<Vec<u8>, CameraError> {
        let path = &self.frames[self.next % self.frames.len()];
        self.next = (self.next + 1) % self.frames.len();
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(CameraError::EmptyFrame);
        }
        Ok(bytes)
    }
}

struct CaptureState {
    enabled: bool,
    minimized: bool,
    camera: Option<Box<dyn Camera>>,
}

pub struct EmotionCapture {
    device: Arc<dyn CameraDevice>,
    backend: Arc<dyn Backend>,
    state: Mutex<CaptureState>,
    latest: watch::Sender<Option<EmotionSample>>,
}

impl EmotionCapture {
    pub async fn new(
        device: Arc<dyn CameraDevice>,
        backend: Arc<dyn Backend>,
        enabled: bool,
    ) -> Arc<Self> {
        let (latest, _) = watch::channel(None);
        let capture = Arc::new(Self {
            device,
            backend,
            state: Mutex::new(CaptureState {
                enabled: false,
                minimized: false,
                camera: None,
            }),
            latest,
        });
        if enabled {
            capture.enable().await;
        }
        capture
    }

    fn acquire_into(&self, state: &mut CaptureState) {
        if state.camera.is_some() {
            return;
        }
        match self.device.acquire() {
            Ok(camera) => {
                info!("Camera acquired");
                state.camera = Some(camera);
            }
            Err(e) => warn!(error = %e, "Camera unavailable; emotion capture degraded"),
        }
    }

    pub async fn enable(&self) {
        let mut state = self.state.lock().await;
        state.enabled = true;
        self.acquire_into(&mut state);
    }

    /// Stops capturing and releases the camera.
    pub async fn disable(&self) {
        let mut state = self.state.lock().await;
        state.enabled = false;
        if state.camera.take().is_some() {
            info!("Camera released");
        }
    }

    /// Returns the new enabled state.
    pub async fn toggle_capture(&self) -> bool {
        if self.is_enabled().await {
            self.disable().await;
            false
        } else {
            self.enable().await;
            true
        }
    }

    pub async fn minimize(&self) {
        self.state.lock().await.minimized = true;
    }

    pub async fn restore(&self) {
        let mut state = self.state.lock().await;
        state.minimized = false;
        if state.enabled {
            self.acquire_into(&mut state);
        }
    }

    /// Returns the new minimized state.
    pub async fn toggle_minimize(&self) -> bool {
        if self.is_minimized().await {
            self.restore().await;
            false
        } else {
            self.minimize().await;
            true
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    pub async fn is_minimized(&self) -> bool {
        self.state.lock().await.minimized
    }

    pub async fn holds_camera(&self) -> bool {
        self.state.lock().await.camera.is_some()
    }

    pub fn current(&self) -> Option<EmotionSample> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<EmotionSample>> {
        self.latest.subscribe()
    }

    /// One capture cycle. `None` when skipped or failed; the prior label stays.
    pub async fn capture_once(&self) -> Option<EmotionSample> {
        let frame = {
            let mut state = self.state.lock().await;
            if !state.enabled || state.minimized {
                return None;
            }
            let Some(camera) = state.camera.as_mut() else {
                debug!("No camera held; skipping capture");
                return None;
            };
            match camera.grab_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Frame capture failed");
                    return None;
                }
            }
        };

        match self.backend.detect_emotion(frame).await {
            Ok(emotion) => {
                let sample = EmotionSample::now(emotion);
                debug!(emotion = %emotion, "Emotion detected");
                self.latest.send_replace(Some(sample));
                Some(sample)
            }
            Err(e) => {
                warn!(error = %e, "Emotion detection failed");
                None
            }
        }
    }

    pub fn spawn(self: &Arc<Self>, interval: Duration, parent: &CancellationToken) -> Periodic {
        let capture = Arc::clone(self);
        Periodic::spawn("emotion-capture", interval, parent, move || {
            let capture = Arc::clone(&capture);
            async move {
                capture.capture_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Emotion;
    use crate::testing::{FakeBackend, FakeCamera};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn camera(deny: bool) -> (Arc<FakeCamera>, Arc<AtomicUsize>) {
        let acquired = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(FakeCamera {
                acquired: acquired.clone(),
                deny,
            }),
            acquired,
        )
    }

    #[tokio::test]
    async fn success_publishes_and_failure_keeps_prior_label() {
        let (device, _) = camera(false);
        let backend = Arc::new(FakeBackend::with_emotions(vec![Ok(Emotion::Happy), Err(500)]));
        let capture = EmotionCapture::new(device, backend, true).await;
        let mut rx = capture.subscribe();

        let sample = capture.capture_once().await.unwrap();
        assert_eq!(sample.emotion, Emotion::Happy);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().unwrap().emotion, Emotion::Happy);

        assert!(capture.capture_once().await.is_none());
        assert_eq!(capture.current().unwrap().emotion, Emotion::Happy);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn denied_camera_never_produces_a_label() {
        let (device, _) = camera(true);
        let backend = Arc::new(FakeBackend::with_emotions(vec![Ok(Emotion::Sad)]));
        let capture = EmotionCapture::new(device, backend.clone(), true).await;

        for _ in 0..3 {
            assert!(capture.capture_once().await.is_none());
        }
        assert!(capture.current().is_none());
        assert_eq!(backend.detections.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disable_releases_camera_and_minimize_pauses() {
        let (device, acquired) = camera(false);
        let backend = Arc::new(FakeBackend::with_emotions(vec![Ok(Emotion::Neutral)]));
        let capture = EmotionCapture::new(device, backend.clone(), true).await;
        assert!(capture.holds_camera().await);

        assert!(capture.toggle_minimize().await);
        assert!(capture.capture_once().await.is_none());
        assert!(!capture.toggle_minimize().await);

        assert!(!capture.toggle_capture().await);
        assert!(!capture.holds_camera().await);
        assert!(capture.capture_once().await.is_none());
        assert_eq!(backend.detections.load(Ordering::SeqCst), 0);

        assert!(capture.toggle_capture().await);
        assert!(capture.holds_camera().await);
        assert_eq!(acquired.load(Ordering::SeqCst), 2);
        assert_eq!(capture.capture_once().await.unwrap().emotion, Emotion::Neutral);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_capture_runs_on_interval() {
        let (device, _) = camera(false);
        let backend = Arc::new(FakeBackend::with_emotions(vec![Ok(Emotion::Surprised), Ok(Emotion::Happy)]));
        let capture = EmotionCapture::new(device, backend.clone(), true).await;
        let root = CancellationToken::new();
        let task = capture.spawn(Duration::from_secs(5), &root);

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(backend.detections.load(Ordering::SeqCst), 2);
        assert_eq!(capture.current().unwrap().emotion, Emotion::Happy);

        task.shutdown().await;
    }

    #[test]
    fn directory_camera_requires_jpegs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let device = DirectoryCamera::new(dir.path());
        assert!(matches!(device.acquire(), Err(CameraError::NoFrames(_))));

        std::fs::write(dir.path().join("frame1.JPG"), b"\xFF\xD8").unwrap();
        assert!(device.acquire().is_ok());
    }

    #[test]
    fn command_camera_needs_a_program() {
        assert!(CommandCamera::new(&[]).is_err());
        let device = CommandCamera::new(&["definitely-not-a-real-grabber-binary".to_string()]).unwrap();
        assert!(matches!(device.acquire(), Err(CameraError::Unavailable(_))));
    }
}
