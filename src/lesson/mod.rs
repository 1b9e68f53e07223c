//! Adaptive lesson player.
//!
//! [`LessonFlow`] is a plain state machine over the catalog: step, attempts,
//! difficulty and feedback. Narration and the heartbeat watch it from the
//! outside; the advance delay after a correct answer is the caller's timer.

pub mod catalog;
pub mod speech;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::LessonConfig;
use crate::models::Emotion;
use crate::scheduler::Periodic;

use catalog::{Catalog, Lesson};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Introduction,
    Example,
    Exercise,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Introduction => "introduction",
            Step::Example => "example",
            Step::Exercise => "exercise",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Standard,
    Simplified,
    Basic,
}

impl Difficulty {
    /// One tier easier; `Basic` stays `Basic`.
    pub fn lower(self) -> Self {
        match self {
            Difficulty::Standard => Difficulty::Simplified,
            Difficulty::Simplified | Difficulty::Basic => Difficulty::Basic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Standard => "standard",
            Difficulty::Simplified => "simplified",
            Difficulty::Basic => "basic",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Success,
    Retry,
    Hint,
    Encouragement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Not on the exercise step, or a correct answer is already pending.
    Ignored,
    NoSelection,
    Correct,
    Incorrect { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonProgress {
    Next(usize),
    Completed,
}

/// Telemetry posted to `/rl_action`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub student_name: String,
    pub lesson_id: String,
    pub lesson_title: String,
    pub current_step: Step,
    pub difficulty: Difficulty,
    pub emotion: Option<Emotion>,
    pub timestamp: DateTime<Utc>,
}

pub struct LessonFlow {
    catalog: Catalog,
    module_title: String,
    student_name: String,
    lesson_index: usize,
    step: Step,
    attempts: u32,
    difficulty: Difficulty,
    selected: Option<String>,
    feedback: Option<Feedback>,
    feedback_serial: u64,
    last_emotion: Option<Emotion>,
    awaiting_advance: bool,
    completed: bool,
    encouragements: usize,
}

impl LessonFlow {
    pub fn new(catalog: Catalog, config: &LessonConfig) -> Self {
        Self {
            catalog,
            module_title: config.module_title.clone(),
            student_name: config.student_name.clone(),
            lesson_index: 0,
            step: Step::Introduction,
            attempts: 0,
            difficulty: config.initial_difficulty,
            selected: None,
            feedback: None,
            feedback_serial: 0,
            last_emotion: None,
            awaiting_advance: false,
            completed: false,
            encouragements: 0,
        }
    }

    pub fn lesson(&self) -> &Lesson {
        &self.catalog.lessons()[self.lesson_index]
    }

    pub fn lesson_index(&self) -> usize {
        self.lesson_index
    }

    pub fn lesson_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn last_emotion(&self) -> Option<Emotion> {
        self.last_emotion
    }

    pub fn is_awaiting_advance(&self) -> bool {
        self.awaiting_advance
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn header(&self) -> String {
        format!("{}: {}", self.module_title, self.lesson().title)
    }

    fn is_frozen(&self) -> bool {
        self.awaiting_advance || self.completed
    }

    fn set_feedback(&mut self, kind: FeedbackKind, message: String) {
        self.feedback = Some(Feedback { kind, message });
        self.feedback_serial += 1;
    }

    fn clear_feedback(&mut self) {
        if self.feedback.take().is_some() {
            self.feedback_serial += 1;
        }
    }

    fn lower_to(&mut self, difficulty: Difficulty) {
        if difficulty > self.difficulty {
            debug!(from = %self.difficulty, to = %difficulty, "Difficulty lowered");
            self.difficulty = difficulty;
        }
    }

    /// introduction → example → exercise; stays on exercise.
    pub fn next_step(&mut self) -> Step {
        if self.is_frozen() {
            return self.step;
        }
        self.step = match self.step {
            Step::Introduction => Step::Example,
            Step::Example | Step::Exercise => Step::Exercise,
        };
        self.clear_feedback();
        self.step
    }

    /// Picks one of the exercise options. `false` for anything else.
    pub fn select_answer(&mut self, option: &str) -> bool {
        if self.step != Step::Exercise || self.is_frozen() {
            return false;
        }
        let known = self.lesson().exercise.options.iter().any(|o| o == option);
        if known {
            self.selected = Some(option.to_string());
        }
        known
    }

    pub fn submit_answer(&mut self) -> AnswerOutcome {
        if self.step != Step::Exercise || self.is_frozen() {
            return AnswerOutcome::Ignored;
        }
        let Some(answer) = self.selected.take() else {
            return AnswerOutcome::NoSelection;
        };

        let lesson = self.lesson().clone();
        if answer == lesson.exercise.answer {
            let message = format!(
                "Great job, {}! That's correct! {} starts with {}.",
                self.student_name,
                lesson.exercise.question.replacen('?', "", 1),
                lesson.exercise.answer
            );
            self.set_feedback(FeedbackKind::Success, message);
            self.awaiting_advance = true;
            info!(lesson = %lesson.id, attempts = self.attempts, "Exercise answered correctly");
            return AnswerOutcome::Correct;
        }

        self.attempts += 1;
        match self.attempts {
            1 => {
                let message = format!("Not quite. {} Let's try again.", lesson.hint(0));
                self.set_feedback(FeedbackKind::Retry, message);
                self.step = Step::Example;
            }
            2 => {
                let lowered = self.difficulty.lower();
                self.lower_to(lowered);
                let message = format!("Let's try a different way. {}", lesson.hint(1));
                self.set_feedback(FeedbackKind::Retry, message);
                self.step = Step::Introduction;
            }
            _ => {
                let message = format!("Here's a big hint: {} Try once more!", lesson.hint(2));
                self.set_feedback(FeedbackKind::Hint, message);
            }
        }
        self.apply_emotion_pressure();
        info!(lesson = %lesson.id, attempts = self.attempts, answer = %answer, "Exercise answered incorrectly");
        AnswerOutcome::Incorrect {
            attempts: self.attempts,
        }
    }

    fn apply_emotion_pressure(&mut self) {
        let distressed = self.last_emotion.is_some_and(|e| e.is_distressed());
        if distressed && self.attempts > 1 {
            self.lower_to(Difficulty::Basic);
        }
    }

    /// Reacts to a detected emotion. Only sad or angry learners change anything.
    pub fn on_emotion(&mut self, emotion: Emotion) {
        self.last_emotion = Some(emotion);
        if !emotion.is_distressed() || self.completed {
            return;
        }

        if self.feedback.is_none() {
            let messages = [
                format!(
                    "You're doing great, {}! Let's try a different approach.",
                    self.student_name
                ),
                "Learning new sounds can be tricky. Take a deep breath!".to_string(),
                "Don't worry! We'll figure this out together.".to_string(),
            ];
            let message = messages[self.encouragements % messages.len()].clone();
            self.encouragements += 1;
            self.set_feedback(FeedbackKind::Encouragement, message);
        }

        if self.attempts > 1 {
            self.lower_to(Difficulty::Basic);
        } else if self.difficulty == Difficulty::Standard {
            self.lower_to(Difficulty::Simplified);
        }
    }

    /// Fired by the advance timer after a correct answer.
    pub fn advance_lesson(&mut self) -> Option<LessonProgress> {
        if !self.awaiting_advance {
            return None;
        }
        self.awaiting_advance = false;

        if self.lesson_index + 1 >= self.catalog.len() {
            self.completed = true;
            info!("All lessons completed");
            return Some(LessonProgress::Completed);
        }

        self.lesson_index += 1;
        self.step = Step::Introduction;
        self.attempts = 0;
        self.selected = None;
        self.clear_feedback();
        info!(lesson = %self.lesson().id, "Lesson started");
        Some(LessonProgress::Next(self.lesson_index))
    }

    /// What the current step says at the current difficulty.
    pub fn narration_text(&self) -> String {
        let lesson = self.lesson();
        match self.step {
            Step::Introduction => lesson.introduction.get(self.difficulty).clone(),
            Step::Example => format!("Examples: {}", lesson.examples.get(self.difficulty).join(". ")),
            Step::Exercise => lesson.exercise.question.clone(),
        }
    }

    /// Introduction wording tuned to the learner's last emotion.
    pub fn adapted_content(&self) -> &str {
        let lesson = self.lesson();
        let difficulty = match self.last_emotion {
            Some(emotion) if emotion.wants_simplest_content() => Difficulty::Basic,
            _ => self.difficulty,
        };
        lesson.introduction.get(difficulty)
    }

    /// What the replay control speaks: like narration, but emotion-adapted.
    pub fn replay_text(&self) -> String {
        match self.step {
            Step::Introduction => self.adapted_content().to_string(),
            _ => self.narration_text(),
        }
    }

    pub fn snapshot(&self) -> Heartbeat {
        let lesson = self.lesson();
        Heartbeat {
            student_name: self.student_name.clone(),
            lesson_id: lesson.id.clone(),
            lesson_title: lesson.title.clone(),
            current_step: self.step,
            difficulty: self.difficulty,
            emotion: self.last_emotion,
            timestamp: Utc::now(),
        }
    }
}

/// Decides what to speak after each state change. New feedback wins over
/// content; unchanged state says nothing.
#[derive(Debug, Default)]
pub struct NarrationCue {
    content: Option<(usize, Step, Difficulty)>,
    feedback_serial: u64,
}

impl NarrationCue {
    pub fn next(&mut self, flow: &LessonFlow) -> Option<String> {
        let content = (flow.lesson_index, flow.step, flow.difficulty);
        let content_changed = self.content != Some(content);
        let feedback_changed = self.feedback_serial != flow.feedback_serial;
        self.content = Some(content);
        self.feedback_serial = flow.feedback_serial;

        if feedback_changed {
            if let Some(feedback) = flow.feedback() {
                return Some(feedback.message.clone());
            }
        }
        content_changed.then(|| flow.narration_text())
    }
}

/// Posts the latest snapshot every `period`; failures are only logged.
pub fn spawn_heartbeat(
    backend: Arc<dyn Backend>,
    snapshots: watch::Receiver<Heartbeat>,
    period: Duration,
    parent: &CancellationToken,
) -> Periodic {
    Periodic::spawn("heartbeat", period, parent, move || {
        let backend = Arc::clone(&backend);
        let mut heartbeat = snapshots.borrow().clone();
        heartbeat.timestamp = Utc::now();
        async move {
            match backend.report_progress(&heartbeat).await {
                Ok(action) => debug!(
                    state = ?action.state,
                    action = ?action.action,
                    message = ?action.avatar_message,
                    "Heartbeat acknowledged"
                ),
                Err(e) => warn!(error = %e, lesson = %heartbeat.lesson_id, "Heartbeat failed"),
            }
        }
    })
}
