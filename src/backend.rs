use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::lesson::Heartbeat;
use crate::models::{
    AssessmentSubmission, Emotion, EmotionLogEntry, Profile, SaveReceipt, StoredAssessment,
    TaskResult,
};
use crate::session::Credential;

const LOGIN: &str = "/login";
const RL_ACTION: &str = "/rl_action";
const FACE_DETECTION: &str = "/facedetection";
const SAVE_ASSESSMENT: &str = "/save-assessment";
const PROFILE: &str = "/api/user/profile";
const ASSESSMENTS: &str = "/assessments";

/// What the server suggests after a heartbeat; logged only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RlAction {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub avatar_message: Option<String>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError>;

    async fn detect_emotion(&self, jpeg: Vec<u8>) -> Result<Emotion, ApiError>;

    async fn report_progress(&self, heartbeat: &Heartbeat) -> Result<RlAction, ApiError>;

    async fn save_assessment(
        &self,
        credential: &Credential,
        submission: &AssessmentSubmission,
    ) -> Result<SaveReceipt, ApiError>;

    async fn fetch_profile(&self, credential: &Credential) -> Result<Profile, ApiError>;

    async fn fetch_assessments(
        &self,
        credential: &Credential,
    ) -> Result<Vec<StoredAssessment>, ApiError>;
}

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: "client",
                source,
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;
        debug!(endpoint, status = %response.status(), "Backend responded");
        Ok(response)
    }

    async fn expect_status(
        endpoint: &'static str,
        response: reqwest::Response,
        accepted: impl Fn(StatusCode) -> bool,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if accepted(status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            endpoint,
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn json<T: for<'de> Deserialize<'de>>(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Malformed {
                endpoint,
                message: e.to_string(),
            })
    }
}

/// Pulls `message` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            email: &'a str,
            password: &'a str,
        }
        #[derive(Deserialize)]
        struct LoginResponse {
            token: String,
        }

        let request = self
            .client
            .post(self.url(LOGIN))
            .json(&LoginRequest { email, password });
        let response = Self::send(LOGIN, request).await?;
        let response = Self::expect_status(LOGIN, response, |s| s.is_success()).await?;
        let body: LoginResponse = Self::json(LOGIN, response).await?;
        Ok(body.token)
    }

    async fn detect_emotion(&self, jpeg: Vec<u8>) -> Result<Emotion, ApiError> {
        #[derive(Deserialize)]
        struct DetectionResponse {
            emotion: Option<String>,
            message: Option<String>,
        }

        let part = multipart::Part::bytes(jpeg)
            .file_name(format!("capture-{}.jpg", Uuid::new_v4()))
            .mime_str("image/jpeg")
            .map_err(|source| ApiError::Transport {
                endpoint: FACE_DETECTION,
                source,
            })?;
        let form = multipart::Form::new().part("image", part);

        let request = self.client.post(self.url(FACE_DETECTION)).multipart(form);
        let response = Self::send(FACE_DETECTION, request).await?;
        let response = Self::expect_status(FACE_DETECTION, response, |s| s.is_success()).await?;
        let body: DetectionResponse = Self::json(FACE_DETECTION, response).await?;

        match body.emotion {
            Some(label) => Ok(Emotion::from_label(&label)),
            None => Err(ApiError::Malformed {
                endpoint: FACE_DETECTION,
                message: body
                    .message
                    .unwrap_or_else(|| "no emotion in response".to_string()),
            }),
        }
    }

    async fn report_progress(&self, heartbeat: &Heartbeat) -> Result<RlAction, ApiError> {
        let request = self.client.post(self.url(RL_ACTION)).json(heartbeat);
        let response = Self::send(RL_ACTION, request).await?;
        let response = Self::expect_status(RL_ACTION, response, |s| s.is_success()).await?;
        Self::json(RL_ACTION, response).await
    }

    async fn save_assessment(
        &self,
        credential: &Credential,
        submission: &AssessmentSubmission,
    ) -> Result<SaveReceipt, ApiError> {
        let request = self
            .client
            .post(self.url(SAVE_ASSESSMENT))
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .json(submission);
        let response = Self::send(SAVE_ASSESSMENT, request).await?;
        let response =
            Self::expect_status(SAVE_ASSESSMENT, response, |s| s == StatusCode::CREATED).await?;
        Self::json(SAVE_ASSESSMENT, response).await
    }

    async fn fetch_profile(&self, credential: &Credential) -> Result<Profile, ApiError> {
        let request = self
            .client
            .get(self.url(PROFILE))
            .header(reqwest::header::AUTHORIZATION, credential.bearer());
        let response = Self::send(PROFILE, request).await?;
        let response = Self::expect_status(PROFILE, response, |s| s.is_success()).await?;
        Self::json(PROFILE, response).await
    }

    async fn fetch_assessments(
        &self,
        credential: &Credential,
    ) -> Result<Vec<StoredAssessment>, ApiError> {
        let request = self
            .client
            .get(self.url(ASSESSMENTS))
            .header(reqwest::header::AUTHORIZATION, credential.bearer());
        let response = Self::send(ASSESSMENTS, request).await?;
        let response = Self::expect_status(ASSESSMENTS, response, |s| s.is_success()).await?;
        let records: Vec<serde_json::Value> = Self::json(ASSESSMENTS, response).await?;

        let mut assessments = Vec::with_capacity(records.len());
        for record in records {
            match validate_assessment(record) {
                Ok(assessment) => assessments.push(assessment),
                Err(e) => warn!(error = %e, "Skipping assessment with unexpected shape"),
            }
        }
        Ok(assessments)
    }
}

/// Checks every task slot holds the variant its key promises.
pub fn validate_assessment(record: serde_json::Value) -> Result<StoredAssessment, ApiError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawAssessment {
        #[serde(rename = "_id", default)]
        id: Option<String>,
        #[serde(rename = "created_at", default)]
        created_at: Option<String>,
        #[serde(default)]
        completed_at: Option<String>,
        #[serde(default)]
        number_comparison: Option<TaskResult>,
        #[serde(default)]
        handwriting: Option<TaskResult>,
        #[serde(default)]
        letter_arrangement: Option<TaskResult>,
        #[serde(default)]
        emotion_tracking_data: Vec<EmotionLogEntry>,
        #[serde(rename = "gemini_response", default)]
        analysis: Option<serde_json::Value>,
    }

    fn mismatch(slot: &str, found: &TaskResult) -> ApiError {
        ApiError::Malformed {
            endpoint: ASSESSMENTS,
            message: format!("{slot} holds a {} result", found.task_type()),
        }
    }

    let raw: RawAssessment = serde_json::from_value(record).map_err(|e| ApiError::Malformed {
        endpoint: ASSESSMENTS,
        message: e.to_string(),
    })?;

    let number_comparison = match raw.number_comparison {
        None => None,
        Some(TaskResult::NumberComparison(result)) => Some(result),
        Some(other) => return Err(mismatch("numberComparison", &other)),
    };
    let handwriting = match raw.handwriting {
        None => None,
        Some(TaskResult::Handwriting(result)) => Some(result),
        Some(other) => return Err(mismatch("handwriting", &other)),
    };
    let letter_arrangement = match raw.letter_arrangement {
        None => None,
        Some(TaskResult::LetterArrangement(result)) => Some(result),
        Some(other) => return Err(mismatch("letterArrangement", &other)),
    };

    Ok(StoredAssessment {
        id: raw.id,
        created_at: raw.created_at,
        completed_at: raw.completed_at,
        number_comparison,
        handwriting,
        letter_arrangement,
        emotion_tracking_data: raw.emotion_tracking_data,
        analysis: raw.analysis,
    })
}
