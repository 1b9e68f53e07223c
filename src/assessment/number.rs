use std::time::{Duration, Instant};

use rand::Rng;

use crate::models::{
    Choice, NumberComparisonResult, NumberSummary, NumberTrial, PerformanceTier,
};

pub const NUM_TRIALS: usize = 5;

const STRONG_ACCURACY: f64 = 0.8;
const STRONG_MEAN_SECONDS: f64 = 2.5;
const DEVELOPING_ACCURACY: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberPair {
    pub a: u32,
    pub b: u32,
}

impl NumberPair {
    /// `None` when the operands are equal.
    pub fn new(a: u32, b: u32) -> Option<Self> {
        (a != b).then_some(Self { a, b })
    }

    /// Two distinct operands in `1..=max`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, max: u32) -> Self {
        let max = max.max(2);
        let a = rng.gen_range(1..=max);
        let mut b = rng.gen_range(1..=max);
        while b == a {
            b = rng.gen_range(1..=max);
        }
        Self { a, b }
    }

    pub fn correct_choice(&self) -> Choice {
        if self.a > self.b {
            Choice::A
        } else {
            Choice::B
        }
    }

    pub fn value(&self, choice: Choice) -> u32 {
        match choice {
            Choice::A => self.a,
            Choice::B => self.b,
        }
    }
}

/// Five strictly sequential trials; the next pair exists only once the
/// previous one was answered.
#[derive(Debug, Clone, Default)]
pub struct NumberTask {
    trials: Vec<NumberTrial>,
    current: Option<(NumberPair, Instant)>,
}

pub enum TrialOutcome {
    Next(NumberPair),
    Finished(NumberComparisonResult),
}

impl NumberTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trials(&self) -> &[NumberTrial] {
        &self.trials
    }

    pub fn current_pair(&self) -> Option<NumberPair> {
        self.current.map(|(pair, _)| pair)
    }

    /// 1-based index of the trial on screen.
    pub fn trial_number(&self) -> usize {
        self.trials.len() + 1
    }

    pub(crate) fn present(&mut self, pair: NumberPair, shown_at: Instant) {
        self.current = Some((pair, shown_at));
    }

    /// Records an answer for the pair on screen. `None` when no pair is shown.
    pub(crate) fn answer(&mut self, choice: Choice, answered_at: Instant) -> Option<NumberTrial> {
        let (pair, shown_at) = self.current.take()?;
        let elapsed = answered_at.saturating_duration_since(shown_at);
        let trial = record_trial(pair, choice, elapsed);
        self.trials.push(trial.clone());
        Some(trial)
    }

    pub fn is_finished(&self) -> bool {
        self.trials.len() >= NUM_TRIALS
    }
}

pub fn record_trial(pair: NumberPair, choice: Choice, elapsed: Duration) -> NumberTrial {
    let correct_choice = pair.correct_choice();
    NumberTrial {
        operand_a: pair.a,
        operand_b: pair.b,
        correct_choice,
        user_choice: choice,
        response_time_seconds: elapsed.as_secs_f64(),
        correct: choice == correct_choice,
    }
}

pub fn classify(accuracy: f64, mean_seconds: f64) -> PerformanceTier {
    if accuracy >= STRONG_ACCURACY && mean_seconds < STRONG_MEAN_SECONDS {
        PerformanceTier::Strong
    } else if accuracy >= DEVELOPING_ACCURACY {
        PerformanceTier::Developing
    } else {
        PerformanceTier::NeedsPractice
    }
}

/// `None` when there are no trials to analyze.
pub fn analyze(trials: &[NumberTrial]) -> Option<NumberComparisonResult> {
    if trials.is_empty() {
        return None;
    }

    let total = trials.len();
    let correct_count = trials.iter().filter(|t| t.correct).count();
    let accuracy = correct_count as f64 / total as f64;
    let mean = trials.iter().map(|t| t.response_time_seconds).sum::<f64>() / total as f64;
    let tier = classify(accuracy, mean);
    let percentage = accuracy * 100.0;

    let interpretation = match tier {
        PerformanceTier::Strong => {
            "Great job! You're quick and accurate at finding the bigger number.".to_string()
        }
        PerformanceTier::Developing => format!(
            "Good work! You got {percentage:.0}% right. Sometimes picking the bigger number takes a little extra thought."
        ),
        PerformanceTier::NeedsPractice => format!(
            "Finding the bigger number seemed a bit tricky ({percentage:.0}% correct). Keep practicing, number games can help!"
        ),
    };

    let first_step = if accuracy < STRONG_ACCURACY {
        "Play games comparing groups of objects (more/less)."
    } else {
        "Try simple counting games."
    };

    Some(NumberComparisonResult {
        summary: NumberSummary {
            total_trials: total,
            correct_count,
            accuracy,
            accuracy_percentage: percentage,
            average_response_time_seconds: mean,
        },
        tier,
        interpretation,
        detailed_trials: trials.to_vec(),
        suggested_next_steps: vec![
            first_step.to_string(),
            "Use number lines to see which numbers are bigger.".to_string(),
            "Talk about numbers during everyday activities (like counting snacks).".to_string(),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pair(a: u32, b: u32) -> NumberPair {
        NumberPair::new(a, b).unwrap()
    }

    #[test]
    fn random_pairs_are_distinct_and_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let p = NumberPair::random(&mut rng, 20);
            assert_ne!(p.a, p.b);
            assert!((1..=20).contains(&p.a));
            assert!((1..=20).contains(&p.b));
            let greater = p.value(p.correct_choice());
            assert_eq!(greater, p.a.max(p.b));
        }
    }

    #[test]
    fn tiny_range_still_yields_distinct_pair() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = NumberPair::random(&mut rng, 1);
        assert_ne!(p.a, p.b);
    }

    #[test]
    fn equal_operands_are_rejected() {
        assert!(NumberPair::new(5, 5).is_none());
        assert_eq!(pair(3, 7).correct_choice(), Choice::B);
        assert_eq!(pair(10, 2).correct_choice(), Choice::A);
    }

    #[test]
    fn one_correct_out_of_five_needs_practice() {
        let inputs = [
            (pair(3, 7), Choice::B),
            (pair(10, 2), Choice::B),
            (pair(5, 6), Choice::A),
            (pair(12, 4), Choice::B),
            (pair(1, 9), Choice::A),
        ];
        let trials: Vec<NumberTrial> = inputs
            .iter()
            .map(|(p, c)| record_trial(*p, *c, Duration::from_millis(1500)))
            .collect();

        let result = analyze(&trials).unwrap();
        assert_eq!(result.summary.correct_count, 1);
        assert!((result.summary.accuracy - 0.2).abs() < 1e-9);
        assert_eq!(result.tier, PerformanceTier::NeedsPractice);
        assert!(result.interpretation.contains("20%"));
    }

    #[test]
    fn mean_response_time_is_arithmetic_mean() {
        let times = [1.0, 2.0, 3.0, 4.0, 5.0];
        let trials: Vec<NumberTrial> = times
            .iter()
            .map(|s| record_trial(pair(2, 1), Choice::A, Duration::from_secs_f64(*s)))
            .collect();

        let result = analyze(&trials).unwrap();
        assert!((result.summary.average_response_time_seconds - 3.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&result.summary.accuracy));
        // Perfect but slow lands in the middle tier.
        assert_eq!(result.tier, PerformanceTier::Developing);
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(classify(0.8, 2.4), PerformanceTier::Strong);
        assert_eq!(classify(0.8, 2.5), PerformanceTier::Developing);
        assert_eq!(classify(0.6, 1.0), PerformanceTier::Developing);
        assert_eq!(classify(0.4, 1.0), PerformanceTier::NeedsPractice);
    }

    #[test]
    fn empty_trials_have_no_analysis() {
        assert!(analyze(&[]).is_none());
    }

    #[test]
    fn task_answers_only_the_pair_on_screen() {
        let mut task = NumberTask::new();
        let shown = Instant::now();
        assert!(task.answer(Choice::A, shown).is_none());

        task.present(pair(4, 9), shown);
        let trial = task.answer(Choice::B, shown + Duration::from_millis(1250)).unwrap();
        assert!(trial.correct);
        assert!((trial.response_time_seconds - 1.25).abs() < 1e-9);
        assert!(task.current_pair().is_none());
        assert!(task.answer(Choice::B, shown).is_none());
        assert_eq!(task.trials().len(), 1);
        assert_eq!(task.trial_number(), 2);
    }
}
