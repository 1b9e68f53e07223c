//! In-memory stand-ins for the backend and the camera.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{validate_assessment, Backend, RlAction};
use crate::emotion::{Camera, CameraDevice, CameraError};
use crate::error::ApiError;
use crate::lesson::speech::{SpeechError, Speaker};
use crate::lesson::Heartbeat;
use crate::models::{AssessmentSubmission, Emotion, Profile, SaveReceipt, StoredAssessment};
use crate::session::Credential;

pub struct FakeCamera {
    pub acquired: Arc<AtomicUsize>,
    pub deny: bool,
}

struct FakeHandle;

#[async_trait]
impl Camera for FakeHandle {
    async fn grab_frame(&mut self) -> Result<Vec<u8>, CameraError> {
        Ok(vec![0xFF, 0xD8, 0xFF])
    }
}

impl CameraDevice for FakeCamera {
    fn acquire(&self) -> Result<Box<dyn Camera>, CameraError> {
        if self.deny {
            return Err(CameraError::Unavailable("permission denied".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle))
    }
}

/// Remembers every utterance it was asked to speak.
#[derive(Default)]
pub struct RecordingSpeaker {
    pub spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBackend {
    /// Detection script; `Err(status)` answers with that HTTP status.
    pub emotions: Mutex<VecDeque<Result<Emotion, u16>>>,
    pub detections: AtomicUsize,
    /// Statuses for successive saves; 201 once the queue is empty.
    pub save_statuses: Mutex<VecDeque<u16>>,
    pub saved: Mutex<Vec<AssessmentSubmission>>,
    pub heartbeats: Mutex<Vec<Heartbeat>>,
    pub heartbeat_fails: AtomicBool,
    pub assessments: Mutex<Vec<serde_json::Value>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emotions(emotions: Vec<Result<Emotion, u16>>) -> Self {
        Self {
            emotions: Mutex::new(emotions.into()),
            ..Self::default()
        }
    }

    pub fn with_save_statuses(statuses: Vec<u16>) -> Self {
        Self {
            save_statuses: Mutex::new(statuses.into()),
            ..Self::default()
        }
    }
}

fn status(endpoint: &'static str, status: u16) -> ApiError {
    ApiError::Status {
        endpoint,
        status,
        message: "fake backend".to_string(),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        if password.is_empty() {
            return Err(status("/login", 400));
        }
        Ok(format!("token-for-{email}"))
    }

    async fn detect_emotion(&self, _jpeg: Vec<u8>) -> Result<Emotion, ApiError> {
        self.detections.fetch_add(1, Ordering::SeqCst);
        match self.emotions.lock().unwrap().pop_front() {
            Some(Ok(emotion)) => Ok(emotion),
            Some(Err(code)) => Err(status("/facedetection", code)),
            None => Err(status("/facedetection", 503)),
        }
    }

    async fn report_progress(&self, heartbeat: &Heartbeat) -> Result<RlAction, ApiError> {
        self.heartbeats.lock().unwrap().push(heartbeat.clone());
        if self.heartbeat_fails.load(Ordering::SeqCst) {
            return Err(status("/rl_action", 500));
        }
        Ok(RlAction::default())
    }

    async fn save_assessment(
        &self,
        _credential: &Credential,
        submission: &AssessmentSubmission,
    ) -> Result<SaveReceipt, ApiError> {
        let code = self.save_statuses.lock().unwrap().pop_front().unwrap_or(201);
        if code != 201 {
            return Err(status("/save-assessment", code));
        }
        self.saved.lock().unwrap().push(submission.clone());
        Ok(SaveReceipt {
            message: Some("Assessment saved successfully".to_string()),
            assessment_id: Some("fake-id".to_string()),
        })
    }

    async fn fetch_profile(&self, credential: &Credential) -> Result<Profile, ApiError> {
        Ok(Profile {
            username: Some("avery".to_string()),
            email: credential
                .email
                .clone()
                .unwrap_or_else(|| "avery@example.com".to_string()),
            created_at: None,
        })
    }

    async fn fetch_assessments(
        &self,
        _credential: &Credential,
    ) -> Result<Vec<StoredAssessment>, ApiError> {
        self.assessments
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(validate_assessment)
            .collect()
    }
}
