//! Terminal front-ends for each subcommand.

pub mod assess;
pub mod auth;
pub mod history;
pub mod lesson;

use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::warn;

use crate::backend::{Backend, HttpBackend};
use crate::config::Config;
use crate::emotion::{CameraDevice, CommandCamera, DirectoryCamera, EmotionCapture};
use crate::error::AuthError;
use crate::models::EmotionSample;
use crate::session::{self, Credential, CredentialStore};

pub struct Context {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub store: CredentialStore,
}

impl Context {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend = HttpBackend::new(&config.backend.base_url, config.backend.timeout())
            .context("failed to build the HTTP client")?;
        let store = CredentialStore::new(config.auth.token_path());
        Ok(Self {
            config,
            backend: Arc::new(backend),
            store,
        })
    }

    /// The login gate for every protected command.
    pub fn credential(&self) -> Result<Credential, AuthError> {
        session::require(&self.store, Utc::now())
    }

    /// `None` when capture is switched off in the config.
    pub async fn emotion_capture(&self) -> Option<Arc<EmotionCapture>> {
        let config = &self.config.emotion;
        if !config.enabled {
            return None;
        }
        let device: Arc<dyn CameraDevice> = match &config.frames_dir {
            Some(dir) => Arc::new(DirectoryCamera::new(dir)),
            None => match CommandCamera::new(&config.camera_command) {
                Ok(camera) => Arc::new(camera),
                Err(e) => {
                    warn!(error = %e, "Emotion capture disabled");
                    return None;
                }
            },
        };
        Some(EmotionCapture::new(device, Arc::clone(&self.backend), true).await)
    }
}

/// Resolves at `deadline`, or never when there is none.
pub(crate) async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Next published emotion, or never when capture is off or gone.
pub(crate) async fn next_emotion(
    rx: &mut Option<watch::Receiver<Option<EmotionSample>>>,
) -> Option<EmotionSample> {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    if receiver.changed().await.is_err() {
        *rx = None;
        return std::future::pending().await;
    }
    *receiver.borrow_and_update()
}

/// Shared camera commands: `camera` toggles capture, `hide` toggles the preview.
pub(crate) async fn camera_command(capture: Option<&Arc<EmotionCapture>>, word: &str) {
    let Some(capture) = capture else {
        println!("Emotion capture is turned off in the config.");
        return;
    };
    match word {
        "camera" => {
            if !capture.toggle_capture().await {
                println!("Camera off.");
            } else if capture.holds_camera().await {
                println!("Camera on.");
            } else {
                println!("Camera on, but no camera could be opened.");
            }
        }
        _ => {
            if capture.toggle_minimize().await {
                println!("Camera minimized; capture paused.");
            } else {
                match capture.current() {
                    Some(sample) => println!("Camera restored; last seen {}.", sample.emotion),
                    None => println!("Camera restored."),
                }
            }
        }
    }
}

pub(crate) fn announce_emotion(sample: &EmotionSample) {
    match sample.emotion.encouragement() {
        Some(line) => println!("[camera] {}: {line}", sample.emotion),
        None => println!("[camera] {}", sample.emotion),
    }
}
