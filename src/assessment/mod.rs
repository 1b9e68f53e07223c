//! The three-task assessment: number comparison, handwriting, letter arrangement.
//!
//! [`Orchestrator`] walks a strict linear progression and refuses anything
//! out of order with a typed [`AssessmentError`]. Timers live with the caller;
//! the orchestrator only exposes the transitions they trigger.

pub mod handwriting;
pub mod letters;
pub mod number;

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::AssessmentConfig;
use crate::error::{ApiError, AuthError};
use crate::models::{
    AssessmentSubmission, Choice, EmotionLogEntry, EmotionSample, HandwritingResult,
    LetterArrangementResult, NumberComparisonResult, SaveReceipt, TaskResult,
};
use crate::session::Credential;

use handwriting::{Canvas, Point};
use letters::LetterTask;
use number::{NumberPair, NumberTask, TrialOutcome};

const NUMBER_PRACTICE_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Progress {
    NotStarted,
    NumberInProgress,
    NumberComplete,
    HandwritingInProgress,
    HandwritingComplete,
    LetterInProgress,
    Complete,
}

impl Progress {
    pub fn as_str(&self) -> &'static str {
        match self {
            Progress::NotStarted => "not-started",
            Progress::NumberInProgress => "number-in-progress",
            Progress::NumberComplete => "number-complete",
            Progress::HandwritingInProgress => "handwriting-in-progress",
            Progress::HandwritingComplete => "handwriting-complete",
            Progress::LetterInProgress => "letter-in-progress",
            Progress::Complete => "complete",
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    NumberComparison,
    Handwriting,
    LetterArrangement,
}

impl Tab {
    /// Same wording as the `taskType` tag of the task's result.
    pub fn task_type(&self) -> &'static str {
        match self {
            Tab::NumberComparison => "Number Comparison",
            Tab::Handwriting => "Handwriting",
            Tab::LetterArrangement => "Letter Arrangement",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_type())
    }
}

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("cannot {action} while the assessment is {progress}")]
    InvalidTransition {
        action: &'static str,
        progress: Progress,
    },

    #[error("the {0} task is locked until the previous task is finished")]
    TabLocked(Tab),

    #[error("no number trials were recorded")]
    NoTrialData,

    #[error("please draw something first")]
    EmptyDrawing,

    #[error("please arrange the letters first")]
    EmptyArrangement,

    #[error("no number pair is on screen")]
    NotRunning,

    #[error("there is no letter at position {0}")]
    InvalidIndex(usize),

    #[error("finish all three tasks before submitting")]
    NotComplete,

    #[error("could not save the assessment: {0}")]
    Submission(#[from] ApiError),
}

impl AssessmentError {
    /// Submission failures leave the results intact, so the user may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssessmentError::Submission(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedResults {
    pub number_comparison: Option<NumberComparisonResult>,
    pub handwriting: Option<HandwritingResult>,
    pub letter_arrangement: Option<LetterArrangementResult>,
}

pub struct Orchestrator {
    rng: StdRng,
    max_number: u32,
    words: Vec<String>,
    progress: Progress,
    active_tab: Tab,
    number: NumberTask,
    canvas: Canvas,
    letters: Option<LetterTask>,
    results: CollectedResults,
    emotion_log: Vec<EmotionLogEntry>,
    last_error: Option<String>,
}

impl Orchestrator {
    pub fn new(config: &AssessmentConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: &AssessmentConfig, rng: StdRng) -> Self {
        Self {
            rng,
            max_number: config.max_number,
            words: config.words.clone(),
            progress: Progress::NotStarted,
            active_tab: Tab::NumberComparison,
            number: NumberTask::new(),
            canvas: Canvas::new(),
            letters: None,
            results: CollectedResults::default(),
            emotion_log: Vec::new(),
            last_error: None,
        }
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    pub fn results(&self) -> &CollectedResults {
        &self.results
    }

    pub fn emotion_log(&self) -> &[EmotionLogEntry] {
        &self.emotion_log
    }

    /// Message from the most recent refused action, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn number_task(&self) -> &NumberTask {
        &self.number
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn letters(&self) -> Option<&LetterTask> {
        self.letters.as_ref()
    }

    fn refuse(&mut self, err: AssessmentError) -> AssessmentError {
        debug!(error = %err, progress = %self.progress, "Assessment action refused");
        self.last_error = Some(err.to_string());
        err
    }

    fn require(&mut self, expected: Progress, action: &'static str) -> Result<(), AssessmentError> {
        if self.progress == expected {
            return Ok(());
        }
        let progress = self.progress;
        Err(self.refuse(AssessmentError::InvalidTransition { action, progress }))
    }

    /// Starts (or restarts) the number stage and shows the first pair.
    pub fn start_number_task(&mut self, now: Instant) -> Result<NumberPair, AssessmentError> {
        if self.progress > Progress::NumberInProgress {
            let progress = self.progress;
            return Err(self.refuse(AssessmentError::InvalidTransition {
                action: "start the number task",
                progress,
            }));
        }

        self.number = NumberTask::new();
        let pair = NumberPair::random(&mut self.rng, self.max_number);
        self.number.present(pair, now);
        self.progress = Progress::NumberInProgress;
        self.active_tab = Tab::NumberComparison;
        self.last_error = None;
        info!(max = self.max_number, "Number comparison started");
        Ok(pair)
    }

    pub fn select_number(
        &mut self,
        choice: Choice,
        now: Instant,
    ) -> Result<TrialOutcome, AssessmentError> {
        self.require(Progress::NumberInProgress, "answer a number trial")?;
        let Some(trial) = self.number.answer(choice, now) else {
            return Err(self.refuse(AssessmentError::NotRunning));
        };
        debug!(
            trial = self.number.trials().len(),
            correct = trial.correct,
            seconds = trial.response_time_seconds,
            "Number trial recorded"
        );
        self.last_error = None;

        if !self.number.is_finished() {
            let pair = NumberPair::random(&mut self.rng, self.max_number);
            self.number.present(pair, now);
            return Ok(TrialOutcome::Next(pair));
        }

        let Some(result) = number::analyze(self.number.trials()) else {
            return Err(self.refuse(AssessmentError::NoTrialData));
        };
        info!(
            accuracy = result.summary.accuracy,
            tier = result.tier.label(),
            "Number comparison complete"
        );
        self.results.number_comparison = Some(result.clone());
        self.progress = Progress::NumberComplete;
        Ok(TrialOutcome::Finished(result))
    }

    /// Fired by the display timer after a task completes.
    pub fn advance_after_display(&mut self) -> Result<Progress, AssessmentError> {
        match self.progress {
            Progress::NumberComplete => self.begin_handwriting(),
            Progress::HandwritingComplete => self.begin_letters(),
            progress => {
                return Err(self.refuse(AssessmentError::InvalidTransition {
                    action: "advance to the next task",
                    progress,
                }))
            }
        }
        self.last_error = None;
        Ok(self.progress)
    }

    fn begin_handwriting(&mut self) {
        self.canvas.clear();
        self.progress = Progress::HandwritingInProgress;
        self.active_tab = Tab::Handwriting;
        info!("Handwriting task started");
    }

    fn begin_letters(&mut self) {
        self.letters = LetterTask::random(&mut self.rng, &self.words);
        if let Some(task) = &self.letters {
            debug!(word = task.original(), "Word picked");
        }
        self.progress = Progress::LetterInProgress;
        self.active_tab = Tab::LetterArrangement;
        info!("Letter arrangement started");
    }

    /// Switching to a task whose predecessor just finished starts it.
    pub fn switch_tab(&mut self, tab: Tab) -> Result<(), AssessmentError> {
        let unlocked_at = match tab {
            Tab::NumberComparison => Progress::NumberInProgress,
            Tab::Handwriting => Progress::NumberComplete,
            Tab::LetterArrangement => Progress::HandwritingComplete,
        };
        if self.progress < unlocked_at {
            return Err(self.refuse(AssessmentError::TabLocked(tab)));
        }

        match (tab, self.progress) {
            (Tab::Handwriting, Progress::NumberComplete) => self.begin_handwriting(),
            (Tab::LetterArrangement, Progress::HandwritingComplete) => self.begin_letters(),
            _ => self.active_tab = tab,
        }
        self.last_error = None;
        Ok(())
    }

    pub fn begin_stroke(&mut self, at: Point) -> Result<(), AssessmentError> {
        self.require(Progress::HandwritingInProgress, "draw")?;
        self.canvas.begin_stroke(at);
        Ok(())
    }

    pub fn extend_stroke(&mut self, to: Point) -> Result<(), AssessmentError> {
        self.require(Progress::HandwritingInProgress, "draw")?;
        self.canvas.extend_stroke(to);
        Ok(())
    }

    pub fn end_stroke(&mut self) -> Result<(), AssessmentError> {
        self.require(Progress::HandwritingInProgress, "draw")?;
        self.canvas.end_stroke();
        self.last_error = None;
        Ok(())
    }

    /// One whole stroke. An empty list draws nothing.
    pub fn draw(&mut self, points: &[Point]) -> Result<(), AssessmentError> {
        let Some((first, rest)) = points.split_first() else {
            return self.require(Progress::HandwritingInProgress, "draw");
        };
        self.begin_stroke(*first)?;
        for point in rest {
            self.extend_stroke(*point)?;
        }
        self.end_stroke()
    }

    pub fn clear_canvas(&mut self) -> Result<(), AssessmentError> {
        self.require(Progress::HandwritingInProgress, "clear the drawing")?;
        self.canvas.clear();
        Ok(())
    }

    pub fn submit_handwriting(&mut self) -> Result<HandwritingResult, AssessmentError> {
        self.require(Progress::HandwritingInProgress, "submit a drawing")?;
        let Some(result) = handwriting::analyze(&mut self.rng, &self.canvas) else {
            return Err(self.refuse(AssessmentError::EmptyDrawing));
        };
        info!(
            strokes = self.canvas.strokes().len(),
            indicator = result.indicator.as_ref().map(|i| i.category.label()),
            "Handwriting analyzed"
        );
        self.results.handwriting = Some(result.clone());
        self.progress = Progress::HandwritingComplete;
        self.last_error = None;
        Ok(result)
    }

    fn letter_task(&mut self, action: &'static str) -> Result<&mut LetterTask, AssessmentError> {
        self.require(Progress::LetterInProgress, action)?;
        if self.letters.is_none() {
            let progress = self.progress;
            return Err(self.refuse(AssessmentError::InvalidTransition { action, progress }));
        }
        self.letters
            .as_mut()
            .ok_or(AssessmentError::InvalidTransition {
                action,
                progress: Progress::LetterInProgress,
            })
    }

    pub fn move_letter(&mut self, bank_index: usize) -> Result<char, AssessmentError> {
        let moved = self.letter_task("move a letter")?.move_to_arrangement(bank_index);
        match moved {
            Some(letter) => {
                self.last_error = None;
                Ok(letter)
            }
            None => Err(self.refuse(AssessmentError::InvalidIndex(bank_index))),
        }
    }

    pub fn return_letter(&mut self, arrangement_index: usize) -> Result<char, AssessmentError> {
        let returned = self
            .letter_task("return a letter")?
            .return_to_bank(arrangement_index);
        match returned {
            Some(letter) => {
                self.last_error = None;
                Ok(letter)
            }
            None => Err(self.refuse(AssessmentError::InvalidIndex(arrangement_index))),
        }
    }

    /// Replaces the word with a fresh random one.
    pub fn new_word(&mut self) -> Result<&LetterTask, AssessmentError> {
        self.letter_task("pick a new word")?;
        self.letters = LetterTask::random(&mut self.rng, &self.words);
        if let Some(task) = &self.letters {
            debug!(word = task.original(), "Word replaced");
        }
        self.last_error = None;
        self.letters.as_ref().ok_or(AssessmentError::InvalidTransition {
            action: "pick a new word",
            progress: Progress::LetterInProgress,
        })
    }

    pub fn submit_letters(&mut self) -> Result<LetterArrangementResult, AssessmentError> {
        let evaluated = self.letter_task("submit the word")?.evaluate();
        let Some(result) = evaluated else {
            return Err(self.refuse(AssessmentError::EmptyArrangement));
        };
        info!(
            word = %result.original_word,
            correct = result.correct,
            transpositions = result.transpositions,
            "Letter arrangement evaluated"
        );
        self.results.letter_arrangement = Some(result.clone());
        self.progress = Progress::Complete;
        self.last_error = None;
        Ok(result)
    }

    /// Logs a sample against the task currently on screen.
    pub fn record_emotion(&mut self, sample: EmotionSample) {
        self.emotion_log.push(EmotionLogEntry {
            emotion: sample.emotion,
            timestamp: sample.captured_at,
            task_context: self.active_tab.task_type().to_string(),
        });
    }

    pub fn practice_areas(&self) -> Vec<&'static str> {
        let mut areas = Vec::new();
        if let Some(number) = &self.results.number_comparison {
            if number.summary.accuracy_percentage < NUMBER_PRACTICE_THRESHOLD {
                areas.push("comparing numbers");
            }
        }
        if let Some(handwriting) = &self.results.handwriting {
            if handwriting.indicator.is_some() {
                areas.push("drawing smooth lines and shapes");
            }
        }
        if let Some(letters) = &self.results.letter_arrangement {
            if !letters.correct {
                areas.push("putting letters in the right order for words");
            }
        }
        areas
    }

    pub fn combined_interpretation(&self) -> String {
        let areas = self.practice_areas();
        if areas.is_empty() {
            return "Looking at all your work: You showed good skills in numbers, drawing, and word puzzles!".to_string();
        }
        format!(
            "Looking at all your work: It looks like practicing {} could be helpful. Everyone has things they are learning!",
            areas.join(" and ")
        )
    }

    pub fn submission(
        &self,
        completed_at: DateTime<Utc>,
    ) -> Result<AssessmentSubmission, AssessmentError> {
        if self.progress != Progress::Complete {
            return Err(AssessmentError::NotComplete);
        }
        let CollectedResults {
            number_comparison: Some(number),
            handwriting: Some(handwriting),
            letter_arrangement: Some(letters),
        } = &self.results
        else {
            return Err(AssessmentError::NotComplete);
        };

        Ok(AssessmentSubmission {
            number_comparison: TaskResult::NumberComparison(number.clone()),
            handwriting: TaskResult::Handwriting(handwriting.clone()),
            letter_arrangement: TaskResult::LetterArrangement(letters.clone()),
            emotion_tracking_data: self.emotion_log.clone(),
            completed_at,
        })
    }

    /// Posts the aggregate. On failure the orchestrator stays `complete`
    /// with every result intact so the caller can retry.
    pub async fn submit(
        &mut self,
        backend: &dyn Backend,
        credential: Option<&Credential>,
    ) -> Result<SaveReceipt, AssessmentError> {
        let submission = match self.submission(Utc::now()) {
            Ok(submission) => submission,
            Err(e) => return Err(self.refuse(e)),
        };
        let Some(credential) = credential else {
            let err = AssessmentError::Submission(ApiError::Auth(AuthError::MissingToken));
            return Err(self.refuse(err));
        };

        match backend.save_assessment(credential, &submission).await {
            Ok(receipt) => {
                info!(
                    id = receipt.assessment_id.as_deref().unwrap_or("-"),
                    emotions = submission.emotion_tracking_data.len(),
                    "Assessment saved"
                );
                self.last_error = None;
                Ok(receipt)
            }
            Err(e) => {
                warn!(error = %e, "Assessment submission failed");
                Err(self.refuse(AssessmentError::Submission(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Emotion, PerformanceTier};
    use crate::testing::FakeBackend;
    use std::time::Duration;

    fn config() -> AssessmentConfig {
        AssessmentConfig {
            words: vec!["cat".to_string()],
            ..AssessmentConfig::default()
        }
    }

    fn orchestrator(seed: u64) -> Orchestrator {
        Orchestrator::with_rng(&config(), StdRng::seed_from_u64(seed))
    }

    fn finish_numbers(orch: &mut Orchestrator, right_answers: usize) -> NumberComparisonResult {
        let start = Instant::now();
        orch.start_number_task(start).unwrap();
        for i in 0..number::NUM_TRIALS {
            let pair = orch.number_task().current_pair().unwrap();
            let choice = if i < right_answers {
                pair.correct_choice()
            } else {
                match pair.correct_choice() {
                    Choice::A => Choice::B,
                    Choice::B => Choice::A,
                }
            };
            let at = start + Duration::from_secs(i as u64 + 1);
            match orch.select_number(choice, at).unwrap() {
                TrialOutcome::Next(_) => assert!(i + 1 < number::NUM_TRIALS),
                TrialOutcome::Finished(result) => return result,
            }
        }
        panic!("number task never finished");
    }

    fn finish_drawing(orch: &mut Orchestrator) {
        orch.advance_after_display().unwrap();
        orch.draw(&[Point::new(1.0, 1.0), Point::new(30.0, 30.0)]).unwrap();
        orch.submit_handwriting().unwrap();
    }

    fn spell(orch: &mut Orchestrator, word: &str) {
        for wanted in word.chars() {
            let index = orch
                .letters()
                .unwrap()
                .bank()
                .iter()
                .position(|c| *c == wanted)
                .unwrap();
            orch.move_letter(index).unwrap();
        }
    }

    fn complete(orch: &mut Orchestrator) {
        finish_numbers(orch, 5);
        finish_drawing(orch);
        orch.advance_after_display().unwrap();
        spell(orch, "cat");
        orch.submit_letters().unwrap();
    }

    #[test]
    fn stages_run_in_order() {
        let mut orch = orchestrator(1);
        assert_eq!(orch.progress(), Progress::NotStarted);

        let result = finish_numbers(&mut orch, 5);
        assert_eq!(result.summary.total_trials, 5);
        assert_eq!(orch.progress(), Progress::NumberComplete);

        assert_eq!(orch.advance_after_display().unwrap(), Progress::HandwritingInProgress);
        assert_eq!(orch.active_tab(), Tab::Handwriting);
        orch.draw(&[Point::new(5.0, 5.0), Point::new(9.0, 9.0)]).unwrap();
        orch.submit_handwriting().unwrap();
        assert_eq!(orch.progress(), Progress::HandwritingComplete);

        assert_eq!(orch.advance_after_display().unwrap(), Progress::LetterInProgress);
        assert_eq!(orch.letters().unwrap().original(), "cat");
        spell(&mut orch, "cat");
        let letters = orch.submit_letters().unwrap();
        assert!(letters.correct);
        assert_eq!(orch.progress(), Progress::Complete);
        assert!(orch.advance_after_display().is_err());
    }

    #[test]
    fn one_right_out_of_five_needs_practice() {
        let mut orch = orchestrator(2);
        let result = finish_numbers(&mut orch, 1);
        assert_eq!(result.summary.correct_count, 1);
        assert_eq!(result.tier, PerformanceTier::NeedsPractice);
        assert_eq!(orch.practice_areas(), vec!["comparing numbers"]);
    }

    #[test]
    fn restart_is_only_possible_during_number_stage() {
        let mut orch = orchestrator(3);
        let now = Instant::now();
        orch.start_number_task(now).unwrap();
        orch.select_number(Choice::A, now).unwrap();
        orch.start_number_task(now).unwrap();
        assert!(orch.number_task().trials().is_empty());

        finish_numbers(&mut orch, 5);
        let err = orch.start_number_task(now).unwrap_err();
        assert!(matches!(err, AssessmentError::InvalidTransition { .. }));
    }

    #[test]
    fn number_tab_opens_once_started() {
        let mut orch = orchestrator(4);
        let err = orch.switch_tab(Tab::NumberComparison).unwrap_err();
        assert!(matches!(err, AssessmentError::TabLocked(Tab::NumberComparison)));
        assert_eq!(orch.progress(), Progress::NotStarted);

        orch.start_number_task(Instant::now()).unwrap();
        orch.switch_tab(Tab::NumberComparison).unwrap();
        assert_eq!(orch.active_tab(), Tab::NumberComparison);
    }

    #[test]
    fn draw_records_one_stroke_per_call() {
        let mut orch = orchestrator(6);
        assert!(orch.draw(&[Point::new(1.0, 1.0)]).is_err());

        finish_numbers(&mut orch, 5);
        orch.advance_after_display().unwrap();
        orch.draw(&[]).unwrap();
        assert!(orch.canvas().strokes().is_empty());
        orch.draw(&[Point::new(1.0, 1.0), Point::new(4.0, 4.0)]).unwrap();
        orch.draw(&[Point::new(9.0, 9.0)]).unwrap();
        assert_eq!(orch.canvas().strokes().len(), 2);
        assert_eq!(orch.canvas().strokes()[0].len(), 2);
    }

    #[test]
    fn later_tabs_stay_locked_until_predecessor_completes() {
        let mut orch = orchestrator(4);
        orch.start_number_task(Instant::now()).unwrap();

        let err = orch.switch_tab(Tab::Handwriting).unwrap_err();
        assert!(matches!(err, AssessmentError::TabLocked(Tab::Handwriting)));
        assert!(orch.last_error().is_some());
        assert!(orch.switch_tab(Tab::LetterArrangement).is_err());

        finish_numbers(&mut orch, 5);
        orch.switch_tab(Tab::Handwriting).unwrap();
        assert_eq!(orch.progress(), Progress::HandwritingInProgress);
        assert!(orch.last_error().is_none());
        assert!(orch.switch_tab(Tab::LetterArrangement).is_err());

        // Looking back at a finished task is fine.
        orch.switch_tab(Tab::NumberComparison).unwrap();
        assert_eq!(orch.progress(), Progress::HandwritingInProgress);
    }

    #[test]
    fn empty_submissions_are_refused() {
        let mut orch = orchestrator(5);
        finish_numbers(&mut orch, 5);
        orch.advance_after_display().unwrap();

        let err = orch.submit_handwriting().unwrap_err();
        assert!(matches!(err, AssessmentError::EmptyDrawing));
        assert_eq!(orch.last_error(), Some("please draw something first"));
        assert_eq!(orch.progress(), Progress::HandwritingInProgress);

        orch.draw(&[Point::new(2.0, 2.0)]).unwrap();
        orch.clear_canvas().unwrap();
        assert!(orch.submit_handwriting().is_err());

        orch.draw(&[Point::new(2.0, 2.0), Point::new(8.0, 3.0)]).unwrap();
        orch.submit_handwriting().unwrap();
        orch.advance_after_display().unwrap();

        let err = orch.submit_letters().unwrap_err();
        assert!(matches!(err, AssessmentError::EmptyArrangement));
        assert!(matches!(
            orch.move_letter(9).unwrap_err(),
            AssessmentError::InvalidIndex(9)
        ));
    }

    #[test]
    fn returning_letters_and_new_word_keep_letters_consistent() {
        let mut orch = orchestrator(6);
        finish_numbers(&mut orch, 5);
        finish_drawing(&mut orch);
        orch.advance_after_display().unwrap();

        let letter = orch.move_letter(0).unwrap();
        assert_eq!(orch.return_letter(0).unwrap(), letter);
        assert_eq!(orch.letters().unwrap().bank().len(), 3);

        orch.move_letter(0).unwrap();
        let fresh = orch.new_word().unwrap();
        assert!(fresh.arrangement().is_empty());
        assert_eq!(fresh.bank().len(), 3);
    }

    #[test]
    fn emotions_are_tagged_with_active_task() {
        let mut orch = orchestrator(7);
        orch.record_emotion(EmotionSample::now(Emotion::Neutral));
        finish_numbers(&mut orch, 5);
        orch.advance_after_display().unwrap();
        orch.record_emotion(EmotionSample::now(Emotion::Sad));

        let contexts: Vec<&str> = orch
            .emotion_log()
            .iter()
            .map(|e| e.task_context.as_str())
            .collect();
        assert_eq!(contexts, vec!["Number Comparison", "Handwriting"]);
    }

    #[test]
    fn combined_interpretation_lists_practice_areas() {
        let mut orch = orchestrator(8);
        finish_numbers(&mut orch, 5);
        assert_eq!(
            orch.combined_interpretation(),
            "Looking at all your work: You showed good skills in numbers, drawing, and word puzzles!"
        );

        finish_drawing(&mut orch);
        orch.advance_after_display().unwrap();
        orch.move_letter(0).unwrap();
        orch.submit_letters().unwrap();

        let text = orch.combined_interpretation();
        assert!(text.contains("putting letters in the right order for words"));
        assert!(text.ends_with("Everyone has things they are learning!"));
    }

    #[test]
    fn submission_requires_every_task() {
        let mut orch = orchestrator(9);
        finish_numbers(&mut orch, 5);
        assert!(matches!(
            orch.submission(Utc::now()).unwrap_err(),
            AssessmentError::NotComplete
        ));

        finish_drawing(&mut orch);
        orch.advance_after_display().unwrap();
        spell(&mut orch, "cat");
        orch.submit_letters().unwrap();

        let submission = orch.submission(Utc::now()).unwrap();
        assert_eq!(submission.number_comparison.task_type(), "Number Comparison");
        assert_eq!(submission.handwriting.task_type(), "Handwriting");
        assert_eq!(submission.letter_arrangement.task_type(), "Letter Arrangement");
    }

    #[tokio::test]
    async fn failed_save_keeps_results_for_retry() {
        let mut orch = orchestrator(10);
        complete(&mut orch);
        let backend = FakeBackend::with_save_statuses(vec![500]);
        let credential = Credential::issue("token", None);

        let err = orch.submit(&backend, Some(&credential)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(orch.progress(), Progress::Complete);
        assert!(orch.results().letter_arrangement.is_some());
        assert!(orch.last_error().is_some());

        let receipt = orch.submit(&backend, Some(&credential)).await.unwrap();
        assert_eq!(receipt.assessment_id.as_deref(), Some("fake-id"));
        assert!(orch.last_error().is_none());
        assert_eq!(backend.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn submitting_without_credential_is_an_auth_error() {
        let mut orch = orchestrator(11);
        complete(&mut orch);
        let backend = FakeBackend::new();

        let err = orch.submit(&backend, None).await.unwrap_err();
        match err {
            AssessmentError::Submission(api) => assert!(api.is_unauthorized()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(backend.saved.lock().unwrap().is_empty());
        assert_eq!(orch.progress(), Progress::Complete);
    }
}
