//! Narration through an external speech engine, one utterance at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("speech engine exited with {0}")]
    Failed(std::process::ExitStatus),

    #[error("speech engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speaks one utterance to completion. Dropping the future must stop it.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Runs the configured command with the utterance as its last argument.
pub struct CommandSpeaker {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(command: &[String]) -> Result<Self, SpeechError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SpeechError::Unavailable("no speech command configured".to_string()))?;
        let program = which::which(program)
            .map_err(|e| SpeechError::Unavailable(format!("{program}: {e}")))?;
        Ok(Self {
            program,
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .kill_on_drop(true)
            .status()
            .await?;
        if !status.success() {
            return Err(SpeechError::Failed(status));
        }
        Ok(())
    }
}

/// Writes utterances to the log; used when speech is disabled or missing.
pub struct LogSpeaker;

#[async_trait]
impl Speaker for LogSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        info!(text, "Narration");
        Ok(())
    }
}

struct Utterance {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Utterance {
    fn halt(&self) {
        self.cancel.cancel();
    }
}

/// Keeps at most one utterance in flight. A new one cancels the old and
/// starts only after the old task has finished, so engine processes never
/// overlap.
pub struct Narrator {
    speaker: Arc<dyn Speaker>,
    current: Mutex<Option<Utterance>>,
    generation: Arc<AtomicU64>,
    speaking: Arc<watch::Sender<bool>>,
}

impl Narrator {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        let (speaking, _) = watch::channel(false);
        Self {
            speaker,
            current: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            speaking: Arc::new(speaking),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<Utterance>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn speak(&self, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }

        let mut current = self.current();
        let previous = current.take();
        if let Some(previous) = &previous {
            previous.halt();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.speaking.send_replace(true);

        let speaker = Arc::clone(&self.speaker);
        let latest = Arc::clone(&self.generation);
        let speaking = Arc::clone(&self.speaking);
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.task.await;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => debug!("Utterance cancelled"),
                result = speaker.speak(&text) => {
                    if let Err(e) = result {
                        warn!(error = %e, "Speech failed");
                    }
                }
            }
            if latest.load(Ordering::SeqCst) == generation {
                speaking.send_replace(false);
            }
        });
        *current = Some(Utterance { cancel, task });
    }

    /// Returns whether something was playing.
    pub fn stop(&self) -> bool {
        let was_speaking = self.is_speaking();
        self.generation.fetch_add(1, Ordering::SeqCst);
        // Stays current: the next utterance waits on its task.
        if let Some(current) = self.current().as_ref() {
            current.halt();
        }
        self.speaking.send_replace(false);
        was_speaking
    }

    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        if let Some(current) = self.current().as_ref() {
            current.halt();
        }
    }
}
