use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Difficulty;
use crate::error::ConfigError;

const HINT_COUNT: usize = 3;

/// One value per difficulty tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tiered<T> {
    pub standard: T,
    pub simplified: T,
    pub basic: T,
}

impl<T> Tiered<T> {
    pub fn get(&self, difficulty: Difficulty) -> &T {
        match difficulty {
            Difficulty::Standard => &self.standard,
            Difficulty::Simplified => &self.simplified,
            Difficulty::Basic => &self.basic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    /// Gentle, stronger, strongest.
    pub hints: Vec<String>,
    pub introduction: Tiered<String>,
    pub examples: Tiered<Vec<String>>,
    pub exercise: Exercise,
}

impl Lesson {
    pub fn hint(&self, level: usize) -> &str {
        self.hints
            .get(level)
            .or_else(|| self.hints.last())
            .map_or("", String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hints.len() < HINT_COUNT {
            return Err(ConfigError::Invalid(format!(
                "lesson {} needs {HINT_COUNT} hints, found {}",
                self.id,
                self.hints.len()
            )));
        }
        if !self.exercise.options.contains(&self.exercise.answer) {
            return Err(ConfigError::Invalid(format!(
                "lesson {}: answer {:?} is not one of the options",
                self.id, self.exercise.answer
            )));
        }
        Ok(())
    }
}

/// Ordered lessons of one module. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    lessons: Vec<Lesson>,
}

impl Catalog {
    pub fn new(lessons: Vec<Lesson>) -> Result<Self, ConfigError> {
        if lessons.is_empty() {
            return Err(ConfigError::Invalid(
                "lesson catalog has no lessons".to_string(),
            ));
        }
        for lesson in &lessons {
            lesson.validate()?;
        }
        Ok(Self { lessons })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: Catalog = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(parsed.lessons)
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    /// The "Sound Starters" module: beginning and ending sounds.
    pub fn sound_starters() -> Self {
        Self {
            lessons: vec![
                Lesson {
                    id: "lesson1".to_string(),
                    title: "Beginning Sounds".to_string(),
                    introduction: Tiered {
                        standard: "Let's learn about beginning sounds! Every word starts with a specific sound. For example, 'ball' starts with the /b/ sound.".to_string(),
                        simplified: "Words have starting sounds! Like 'ball' starts with /b/. Let's learn these sounds!".to_string(),
                        basic: "Listen: /b/ is for ball. The first sound in ball is /b/.".to_string(),
                    },
                    examples: Tiered {
                        standard: strings(&["'Ball' starts with /b/", "'Dog' starts with /d/", "'Cat' starts with /k/"]),
                        simplified: strings(&["Ball → /b/", "Dog → /d/", "Cat → /k/"]),
                        basic: strings(&["Ball - /b/", "Dog - /d/"]),
                    },
                    exercise: Exercise {
                        question: "What sound does 'Fish' start with?".to_string(),
                        options: strings(&["/f/", "/s/", "/t/", "/p/"]),
                        answer: "/f/".to_string(),
                    },
                    hints: strings(&[
                        "Listen to the first sound when I say 'fish'.",
                        "It's the same sound as in 'fun'.",
                        "It sounds like /ffff/.",
                    ]),
                },
                Lesson {
                    id: "lesson2".to_string(),
                    title: "Ending Sounds".to_string(),
                    introduction: Tiered {
                        standard: "Now let's learn about ending sounds! Every word ends with a specific sound too. For example, 'dog' ends with the /g/ sound.".to_string(),
                        simplified: "Words have ending sounds! Like 'dog' ends with /g/. Let's learn these sounds!".to_string(),
                        basic: "Listen: /g/ is at the end of dog. The last sound in dog is /g/.".to_string(),
                    },
                    examples: Tiered {
                        standard: strings(&["'Dog' ends with /g/", "'Cat' ends with /t/", "'Bus' ends with /s/"]),
                        simplified: strings(&["Dog → /g/", "Cat → /t/", "Bus → /s/"]),
                        basic: strings(&["Dog - /g/", "Cat - /t/"]),
                    },
                    exercise: Exercise {
                        question: "What sound does 'Map' end with?".to_string(),
                        options: strings(&["/p/", "/m/", "/a/", "/t/"]),
                        answer: "/p/".to_string(),
                    },
                    hints: strings(&[
                        "Listen to the last sound when I say 'map'.",
                        "It's the same sound as at the end of 'hop'.",
                        "It sounds like /p/.",
                    ]),
                },
            ],
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
