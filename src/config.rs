use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::lesson::Difficulty;

pub const APP_DIR: &str = "learning-diagnostics";
pub const BACKEND_URL_ENV: &str = "LEARNING_DIAGNOSTICS_BACKEND_URL";
const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

pub const DEFAULT_WORDS: &[&str] = &[
    "cat", "dog", "sun", "run", "big", "top", "sit", "man", "bed", "red", "pig", "hat", "cup",
    "pen", "map", "bus", "fly", "sky", "and", "the", "see", "you", "was", "for",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub auth: AuthConfig,
    pub assessment: AssessmentConfig,
    pub lesson: LessonConfig,
    pub emotion: EmotionConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Where the credential is kept; defaults to the platform data dir.
    pub token_path: Option<PathBuf>,
}

impl AuthConfig {
    pub fn token_path(&self) -> PathBuf {
        self.token_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("credential.json")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub max_number: u32,
    pub display_delay_ms: u64,
    pub words: Vec<String>,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            max_number: 20,
            display_delay_ms: 2000,
            words: DEFAULT_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl AssessmentConfig {
    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.display_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LessonConfig {
    pub student_name: String,
    pub module_title: String,
    pub initial_difficulty: Difficulty,
    pub advance_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Optional TOML file replacing the built-in lesson catalog.
    pub catalog: Option<PathBuf>,
}

impl Default for LessonConfig {
    fn default() -> Self {
        Self {
            student_name: "Learner".to_string(),
            module_title: "Sound Starters".to_string(),
            initial_difficulty: Difficulty::Standard,
            advance_delay_ms: 4000,
            heartbeat_interval_ms: 3000,
            catalog: None,
        }
    }
}

impl LessonConfig {
    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    pub enabled: bool,
    pub capture_interval_ms: u64,
    /// Frame grabber writing one JPEG to stdout.
    pub camera_command: Vec<String>,
    /// Replay JPEG files from this directory instead of running the grabber.
    pub frames_dir: Option<PathBuf>,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_interval_ms: 5000,
            camera_command: ["fswebcam", "--no-banner", "-q", "-r", "240x180", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            frames_dir: None,
        }
    }
}

impl EmotionConfig {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// Speech command; the utterance is appended as the last argument.
    pub command: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec!["espeak".to_string(), "-s".to_string(), "150".to_string()],
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Built-in defaults, then the user config, then `explicit`, then the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let mut merged = toml::Table::new();

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                merge_tables(&mut merged, Self::read_table(&user_path)?);
            }
        }

        if let Some(path) = explicit {
            merge_tables(&mut merged, Self::read_table(path)?);
        }

        let mut config: Config =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|source| ConfigError::Parse {
                    path: "merged configuration".to_string(),
                    source,
                })?;

        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                config.backend.base_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
        debug!(path = %path.display(), "Loading config layer");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.assessment.max_number < 2 {
            return Err(ConfigError::Invalid(
                "assessment.max_number must be at least 2".to_string(),
            ));
        }
        if self.assessment.words.is_empty() {
            return Err(ConfigError::Invalid(
                "assessment.words must contain at least one word".to_string(),
            ));
        }
        for word in &self.assessment.words {
            if !can_scramble(word.trim()) {
                return Err(ConfigError::Invalid(format!(
                    "assessment.words entry {word:?} needs at least two different letters"
                )));
            }
        }
        Ok(())
    }
}

fn can_scramble(word: &str) -> bool {
    let mut letters = word.chars();
    letters
        .next()
        .is_some_and(|first| letters.any(|c| c != first))
}

/// Overlay values win; nested tables merge key by key.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let incoming = match value {
            toml::Value::Table(table) => table,
            other => {
                base.insert(key, other);
                continue;
            }
        };
        match base.get_mut(&key) {
            Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
            _ => {
                base.insert(key, toml::Value::Table(incoming));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_timings() {
        let config = Config::default();
        assert_eq!(config.assessment.max_number, 20);
        assert_eq!(config.assessment.display_delay(), Duration::from_secs(2));
        assert_eq!(config.lesson.advance_delay(), Duration::from_secs(4));
        assert_eq!(config.lesson.heartbeat_interval(), Duration::from_secs(3));
        assert_eq!(config.emotion.capture_interval(), Duration::from_secs(5));
        assert_eq!(config.assessment.words.len(), DEFAULT_WORDS.len());
    }

    #[test]
    fn explicit_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[assessment]\nmax_number = 25\n\n[lesson]\nstudent_name = \"Avery\"\ninitial_difficulty = \"simplified\""
        )
        .unwrap();

        let mut base = toml::Table::new();
        merge_tables(&mut base, ConfigLoader::read_table(file.path()).unwrap());
        let config: Config = toml::Value::Table(base).try_into().unwrap();

        assert_eq!(config.assessment.max_number, 25);
        assert_eq!(config.assessment.display_delay_ms, 2000);
        assert_eq!(config.lesson.student_name, "Avery");
        assert_eq!(config.lesson.initial_difficulty, Difficulty::Simplified);
        assert_eq!(config.backend.base_url, DEFAULT_BACKEND_URL);
    }

    #[test]
    fn nested_tables_merge_key_by_key() {
        let mut base: toml::Table = toml::from_str("[backend]\nbase_url = \"http://a\"\ntimeout_secs = 3").unwrap();
        let overlay: toml::Table = toml::from_str("[backend]\ntimeout_secs = 7").unwrap();
        merge_tables(&mut base, overlay);

        let config: Config = toml::Value::Table(base).try_into().unwrap();
        assert_eq!(config.backend.base_url, "http://a");
        assert_eq!(config.backend.timeout_secs, 7);
    }

    #[test]
    fn rejects_tiny_number_range() {
        let mut config = Config::default();
        config.assessment.max_number = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_words_that_cannot_be_scrambled() {
        for bad in [vec![], vec!["cat".to_string(), "  ".to_string()], vec!["aa".to_string()]] {
            let mut config = Config::default();
            config.assessment.words = bad;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        let mut config = Config::default();
        config.assessment.words = vec![" dog ".to_string(), "aab".to_string()];
        config.validate().unwrap();
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::read_table(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
