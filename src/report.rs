use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::number::NumberPair;
use crate::models::{Choice, EmotionLogEntry, NumberTrial, Profile, StoredAssessment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionCount {
    pub emotion: String,
    pub count: usize,
}

/// The server-side analysis attached to a stored assessment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default)]
    pub learning_disabilities: BTreeMap<String, LearningIndicator>,
    #[serde(default)]
    pub emotion_analysis: Option<EmotionAnalysis>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningIndicator {
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionAnalysis {
    #[serde(default)]
    pub dominant_emotions: Vec<String>,
    #[serde(default)]
    pub emotion_occurrences: BTreeMap<String, u64>,
}

/// `None` when the assessment carries no analysis or it has another shape.
pub fn parse_analysis(assessment: &StoredAssessment) -> Option<Analysis> {
    let value = assessment.analysis.as_ref()?;
    serde_json::from_value(value.clone()).ok()
}

/// Counts from the server's analysis, for assessments saved without a log.
pub fn analyzed_occurrences(analysis: &EmotionAnalysis) -> Vec<EmotionCount> {
    let mut counts: Vec<EmotionCount> = analysis
        .emotion_occurrences
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(emotion, count)| EmotionCount {
            emotion: emotion.clone(),
            count: usize::try_from(*count).unwrap_or(usize::MAX),
        })
        .collect();

    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emotion.cmp(&b.emotion)));
    counts
}

pub fn emotion_occurrences(entries: &[EmotionLogEntry]) -> Vec<EmotionCount> {
    let mut map: HashMap<&'static str, usize> = HashMap::new();
    for entry in entries {
        *map.entry(entry.emotion.as_str()).or_insert(0) += 1;
    }

    let mut counts: Vec<EmotionCount> = map
        .into_iter()
        .map(|(emotion, count)| EmotionCount {
            emotion: emotion.to_string(),
            count,
        })
        .collect();

    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emotion.cmp(&b.emotion)));
    counts
}

fn assessment_label(index: usize, assessment: &StoredAssessment) -> String {
    let when = assessment
        .completed_at
        .as_deref()
        .or(assessment.created_at.as_deref())
        .unwrap_or("date unknown");
    format!("Assessment {} ({when})", index + 1)
}

fn picked_value(trial: &NumberTrial) -> u32 {
    NumberPair::new(trial.operand_a, trial.operand_b)
        .map_or(trial.operand_a, |pair| pair.value(trial.user_choice))
}

pub fn build_report(
    profile: &Profile,
    assessments: &[StoredAssessment],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let name = profile.username.as_deref().unwrap_or("Learner");

    let _ = writeln!(output, "# Learning Diagnostics Report");
    let _ = writeln!(output, "Learner: {} ({})", name, profile.email);
    if let Some(since) = &profile.created_at {
        let _ = writeln!(output, "Member since {since}");
    }
    let _ = writeln!(
        output,
        "Generated {} from {} assessments",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        assessments.len()
    );

    if assessments.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No assessments recorded yet.");
        return output;
    }

    for (index, assessment) in assessments.iter().enumerate() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", assessment_label(index, assessment));

        if let Some(number) = &assessment.number_comparison {
            let summary = &number.summary;
            let _ = writeln!(output);
            let _ = writeln!(output, "### Number Comparison");
            let _ = writeln!(
                output,
                "- Accuracy: {:.0}% ({}/{} correct, {})",
                summary.accuracy_percentage,
                summary.correct_count,
                summary.total_trials,
                number.tier.label()
            );
            let _ = writeln!(
                output,
                "- Average response time: {:.2}s",
                summary.average_response_time_seconds
            );
            let _ = writeln!(output, "- {}", number.interpretation);
            if !number.detailed_trials.is_empty() {
                let _ = writeln!(output);
                let _ = writeln!(output, "| Trial | Pair | Picked | Correct | Seconds |");
                let _ = writeln!(output, "|---|---|---|---|---|");
                for (i, trial) in number.detailed_trials.iter().enumerate() {
                    let _ = writeln!(
                        output,
                        "| {} | {} vs {} | {} | {} | {:.2} |",
                        i + 1,
                        trial.operand_a,
                        trial.operand_b,
                        picked_value(trial),
                        if trial.correct { "yes" } else { "no" },
                        trial.response_time_seconds
                    );
                }
            }
        }

        if let Some(handwriting) = &assessment.handwriting {
            let _ = writeln!(output);
            let _ = writeln!(output, "### Handwriting");
            for characteristic in &handwriting.characteristics {
                let _ = writeln!(output, "- {characteristic}");
            }
            if let Some(indicator) = &handwriting.indicator {
                let _ = writeln!(
                    output,
                    "- {}: {}",
                    indicator.category.label(),
                    indicator.description
                );
            }
            let _ = writeln!(output, "- {}", handwriting.interpretation);
        }

        if let Some(letters) = &assessment.letter_arrangement {
            let _ = writeln!(output);
            let _ = writeln!(output, "### Letter Arrangement");
            let _ = writeln!(
                output,
                "- Word: {} (arranged as {}, {})",
                letters.original_word,
                letters.user_arrangement,
                if letters.correct { "correct" } else { "incorrect" }
            );
            let _ = writeln!(
                output,
                "- Letters in place: {}, swapped pairs: {}",
                letters.correct_placement, letters.transpositions
            );
            let _ = writeln!(output, "- {}", letters.interpretation);
        }

        let analysis = parse_analysis(assessment);
        let emotions = analysis.as_ref().and_then(|a| a.emotion_analysis.as_ref());
        let mut occurrences = emotion_occurrences(&assessment.emotion_tracking_data);
        if occurrences.is_empty() {
            occurrences = emotions.map(analyzed_occurrences).unwrap_or_default();
        }
        let dominant = emotions
            .map(|e| e.dominant_emotions.clone())
            .unwrap_or_default();

        let _ = writeln!(output);
        let _ = writeln!(output, "### Emotions");
        if occurrences.is_empty() {
            let _ = writeln!(output, "No emotions captured during this assessment.");
        } else {
            for entry in &occurrences {
                let _ = writeln!(output, "- {}: {}", entry.emotion, entry.count);
            }
        }
        if !dominant.is_empty() {
            let _ = writeln!(output, "Dominant: {}", dominant.join(", "));
        }

        if let Some(analysis) = analysis.filter(|a| !a.learning_disabilities.is_empty()) {
            let _ = writeln!(output);
            let _ = writeln!(output, "### Learning Profile");
            for (area, indicator) in &analysis.learning_disabilities {
                let _ = write!(
                    output,
                    "- {}: {:.0}% confidence",
                    area,
                    indicator.confidence_score * 100.0
                );
                if !indicator.indicators.is_empty() {
                    let _ = write!(output, " ({})", indicator.indicators.join("; "));
                }
                let _ = writeln!(output);
            }
        }
    }

    output
}

/// One line per assessment for the terminal.
pub fn console_summary(assessments: &[StoredAssessment]) -> Vec<String> {
    assessments
        .iter()
        .enumerate()
        .map(|(index, assessment)| {
            let mut parts = Vec::new();
            if let Some(number) = &assessment.number_comparison {
                parts.push(format!(
                    "numbers {:.0}% ({})",
                    number.summary.accuracy_percentage,
                    number.tier.label()
                ));
            }
            if let Some(handwriting) = &assessment.handwriting {
                let note = handwriting
                    .indicator
                    .as_ref()
                    .map(|i| i.category.label())
                    .unwrap_or("no concerns");
                parts.push(format!("handwriting {note}"));
            }
            if let Some(letters) = &assessment.letter_arrangement {
                let verdict = if letters.correct { "correct" } else { "incorrect" };
                parts.push(format!("word '{}' {verdict}", letters.original_word));
            }
            if parts.is_empty() {
                parts.push("no task results".to_string());
            }
            format!("- {}: {}", assessment_label(index, assessment), parts.join(", "))
        })
        .collect()
}

#[derive(Serialize)]
struct TrialRow<'a> {
    assessment_id: &'a str,
    completed_at: &'a str,
    trial: usize,
    operand_a: u32,
    operand_b: u32,
    correct_choice: Choice,
    user_choice: Choice,
    correct: bool,
    response_time_seconds: f64,
}

/// Writes every number trial as CSV. Returns the number of rows.
pub fn write_trials_csv<W: std::io::Write>(
    writer: W,
    assessments: &[StoredAssessment],
) -> Result<usize, csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut rows = 0;

    for assessment in assessments {
        let Some(number) = &assessment.number_comparison else {
            continue;
        };
        for (i, trial) in number.detailed_trials.iter().enumerate() {
            csv.serialize(TrialRow {
                assessment_id: assessment.id.as_deref().unwrap_or(""),
                completed_at: assessment.completed_at.as_deref().unwrap_or(""),
                trial: i + 1,
                operand_a: trial.operand_a,
                operand_b: trial.operand_b,
                correct_choice: trial.correct_choice,
                user_choice: trial.user_choice,
                correct: trial.correct,
                response_time_seconds: trial.response_time_seconds,
            })?;
            rows += 1;
        }
    }

    csv.flush()?;
    Ok(rows)
}
