use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Neutral,
    Unknown,
}

impl Emotion {
    /// Maps a classifier label onto the closed set, case-insensitively.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "angry" => Emotion::Angry,
            "surprised" | "surprise" => Emotion::Surprised,
            "fearful" | "fear" => Emotion::Fearful,
            "neutral" => Emotion::Neutral,
            _ => Emotion::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Fearful => "fearful",
            Emotion::Neutral => "neutral",
            Emotion::Unknown => "unknown",
        }
    }

    /// Sad or angry: the signals that make the lesson player back off.
    pub fn is_distressed(&self) -> bool {
        matches!(self, Emotion::Sad | Emotion::Angry)
    }

    /// Distressed or fearful: the learner gets the simplest wording on replay.
    pub fn wants_simplest_content(&self) -> bool {
        self.is_distressed() || matches!(self, Emotion::Fearful)
    }

    /// Short line shown next to the detected label.
    pub fn encouragement(&self) -> Option<&'static str> {
        match self {
            Emotion::Happy => Some("Great! Keep going!"),
            Emotion::Sad | Emotion::Angry => Some("Take a deep breath, you're doing great!"),
            _ => None,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionSample {
    pub emotion: Emotion,
    pub captured_at: DateTime<Utc>,
}

impl EmotionSample {
    pub fn now(emotion: Emotion) -> Self {
        Self {
            emotion,
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionLogEntry {
    pub emotion: Emotion,
    pub timestamp: DateTime<Utc>,
    pub task_context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberTrial {
    pub operand_a: u32,
    pub operand_b: u32,
    pub correct_choice: Choice,
    pub user_choice: Choice,
    pub response_time_seconds: f64,
    pub correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceTier {
    Strong,
    Developing,
    NeedsPractice,
}

impl PerformanceTier {
    pub fn label(&self) -> &'static str {
        match self {
            PerformanceTier::Strong => "strong",
            PerformanceTier::Developing => "developing",
            PerformanceTier::NeedsPractice => "needs practice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberSummary {
    pub total_trials: usize,
    pub correct_count: usize,
    /// Fraction of correct trials in `0.0..=1.0`.
    pub accuracy: f64,
    pub accuracy_percentage: f64,
    pub average_response_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberComparisonResult {
    pub summary: NumberSummary,
    pub tier: PerformanceTier,
    pub interpretation: String,
    pub detailed_trials: Vec<NumberTrial>,
    pub suggested_next_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorCategory {
    #[serde(rename = "Fine Motor Area")]
    FineMotor,
    #[serde(rename = "Visual-Motor Area")]
    VisualMotor,
}

impl IndicatorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            IndicatorCategory::FineMotor => "Fine Motor Area",
            IndicatorCategory::VisualMotor => "Visual-Motor Area",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(rename = "type")]
    pub category: IndicatorCategory,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandwritingResult {
    pub characteristics: Vec<String>,
    pub indicator: Option<Indicator>,
    pub interpretation: String,
    pub suggested_next_steps: Vec<String>,
    /// `data:image/...` URL of the drawing; the server swaps it for a file name.
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterArrangementResult {
    pub original_word: String,
    pub user_arrangement: String,
    pub correct: bool,
    pub transpositions: usize,
    pub correct_placement: usize,
    pub interpretation: String,
    pub suggested_next_steps: Vec<String>,
}

/// One task's outcome, tagged with the shared `taskType` discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "taskType")]
pub enum TaskResult {
    #[serde(rename = "Number Comparison")]
    NumberComparison(NumberComparisonResult),
    #[serde(rename = "Handwriting")]
    Handwriting(HandwritingResult),
    #[serde(rename = "Letter Arrangement")]
    LetterArrangement(LetterArrangementResult),
}

impl TaskResult {
    pub fn task_type(&self) -> &'static str {
        match self {
            TaskResult::NumberComparison(_) => "Number Comparison",
            TaskResult::Handwriting(_) => "Handwriting",
            TaskResult::LetterArrangement(_) => "Letter Arrangement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSubmission {
    pub number_comparison: TaskResult,
    pub handwriting: TaskResult,
    pub letter_arrangement: TaskResult,
    pub emotion_tracking_data: Vec<EmotionLogEntry>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub assessment_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub username: Option<String>,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// An assessment read back from the server after the task slots were validated.
#[derive(Debug, Clone)]
pub struct StoredAssessment {
    pub id: Option<String>,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
    pub number_comparison: Option<NumberComparisonResult>,
    pub handwriting: Option<HandwritingResult>,
    pub letter_arrangement: Option<LetterArrangementResult>,
    pub emotion_tracking_data: Vec<EmotionLogEntry>,
    pub analysis: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_map_onto_closed_set() {
        assert_eq!(Emotion::from_label("Happy"), Emotion::Happy);
        assert_eq!(Emotion::from_label(" ANGRY "), Emotion::Angry);
        assert_eq!(Emotion::from_label("fear"), Emotion::Fearful);
        assert_eq!(Emotion::from_label("disgust"), Emotion::Unknown);
    }

    #[test]
    fn task_results_carry_discriminant() {
        let result = TaskResult::LetterArrangement(LetterArrangementResult {
            original_word: "cat".to_string(),
            user_arrangement: "act".to_string(),
            correct: false,
            transpositions: 1,
            correct_placement: 1,
            interpretation: String::new(),
            suggested_next_steps: vec![],
        });

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["taskType"], "Letter Arrangement");
        assert_eq!(json["originalWord"], "cat");

        let parsed: TaskResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn distressed_emotions() {
        assert!(Emotion::Sad.is_distressed());
        assert!(Emotion::Angry.is_distressed());
        assert!(!Emotion::Fearful.is_distressed());
        assert!(Emotion::Fearful.wants_simplest_content());
    }
}
