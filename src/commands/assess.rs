use std::time::Instant as StdInstant;

use anyhow::Context as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{announce_emotion, camera_command, next_emotion, wait_until, Context};
use crate::assessment::handwriting::Point;
use crate::assessment::number::{NumberPair, TrialOutcome};
use crate::assessment::{AssessmentError, Orchestrator, Progress, Tab};
use crate::models::Choice;
use crate::session::Credential;

const HELP: &str = "\
Commands:
  start                 begin the number comparison
  a | b                 pick the bigger number
  draw X,Y X,Y ...      draw one stroke on the 400x200 canvas
  clear | done          clear the canvas / submit the drawing
  move N | back N       move letter N to the word / back to the bank
  new | check           new word / submit the word
  tab numbers|handwriting|letters
  submit                save the finished assessment
  status                show progress and finished tasks
  camera | hide         toggle emotion capture / minimize the camera
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum AssessInput {
    Start,
    Pick(Choice),
    Draw(Vec<Point>),
    Clear,
    Done,
    Move(usize),
    Back(usize),
    NewWord,
    Check,
    Tab(Tab),
    Submit,
    Status,
    Camera(&'static str),
    Help,
    Quit,
}

fn parse_point(raw: &str) -> Result<Point, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got {raw:?}"))?;
    let x: f32 = x.trim().parse().map_err(|_| format!("bad x in {raw:?}"))?;
    let y: f32 = y.trim().parse().map_err(|_| format!("bad y in {raw:?}"))?;
    Ok(Point::new(x, y))
}

/// Positions are 1-based on screen.
fn parse_position(raw: Option<&str>) -> Result<usize, String> {
    let raw = raw.ok_or("which letter? give its number")?;
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("{raw:?} is not a letter number")),
    }
}

pub fn parse_input(line: &str) -> Result<AssessInput, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err("type a command, or `help`".to_string());
    };

    let input = match command.to_ascii_lowercase().as_str() {
        "start" => AssessInput::Start,
        "a" => AssessInput::Pick(Choice::A),
        "b" => AssessInput::Pick(Choice::B),
        "draw" => {
            let points = words.map(parse_point).collect::<Result<Vec<_>, _>>()?;
            if points.is_empty() {
                return Err("draw needs at least one X,Y point".to_string());
            }
            AssessInput::Draw(points)
        }
        "clear" => AssessInput::Clear,
        "done" => AssessInput::Done,
        "move" => AssessInput::Move(parse_position(words.next())?),
        "back" => AssessInput::Back(parse_position(words.next())?),
        "new" => AssessInput::NewWord,
        "check" => AssessInput::Check,
        "tab" => match words.next() {
            Some("numbers") => AssessInput::Tab(Tab::NumberComparison),
            Some("handwriting") => AssessInput::Tab(Tab::Handwriting),
            Some("letters") => AssessInput::Tab(Tab::LetterArrangement),
            _ => return Err("tab numbers|handwriting|letters".to_string()),
        },
        "submit" => AssessInput::Submit,
        "status" => AssessInput::Status,
        "camera" => AssessInput::Camera("camera"),
        "hide" => AssessInput::Camera("hide"),
        "help" | "?" => AssessInput::Help,
        "quit" | "exit" => AssessInput::Quit,
        other => return Err(format!("unknown command {other:?}; try `help`")),
    };
    Ok(input)
}

fn show_letters(orch: &Orchestrator) {
    let Some(task) = orch.letters() else {
        return;
    };
    let bank: Vec<String> = task
        .bank()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}:{c}", i + 1))
        .collect();
    let word = if task.arrangement().is_empty() {
        "_".to_string()
    } else {
        task.arranged_word()
    };
    println!("Letters: [{}]   Word: {word}", bank.join(" "));
}

fn show_pair(trial: usize, pair: NumberPair) {
    println!("Trial {trial}: which is bigger?  a) {}   b) {}", pair.a, pair.b);
}

fn show_stage(orch: &Orchestrator) {
    match orch.progress() {
        Progress::NumberInProgress => {
            if let Some(pair) = orch.number_task().current_pair() {
                show_pair(orch.number_task().trial_number(), pair);
            }
        }
        Progress::HandwritingInProgress => {
            println!("Handwriting: draw a letter or shape with `draw`, then `done`.");
        }
        Progress::LetterInProgress => {
            println!("Put the letters in order to make a word.");
            show_letters(orch);
        }
        _ => {}
    }
}

fn show_status(orch: &Orchestrator) {
    println!("Stage: {} (on the {} tab)", orch.progress(), orch.active_tab());
    let results = orch.results();
    let finished: Vec<&str> = [
        results.number_comparison.as_ref().map(|_| "numbers"),
        results.handwriting.as_ref().map(|_| "handwriting"),
        results.letter_arrangement.as_ref().map(|_| "letters"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if finished.is_empty() {
        println!("No tasks finished yet.");
    } else {
        println!("Finished: {}", finished.join(", "));
    }
    println!("Emotions logged: {}", orch.emotion_log().len());
    if let Some(error) = orch.last_error() {
        println!("Last refused: {error}");
    }
}

enum Next {
    Continue,
    /// A task finished; advance after the display delay.
    TaskFinished,
    Stop,
}

async fn handle(
    ctx: &Context,
    orch: &mut Orchestrator,
    input: AssessInput,
    credential: &Credential,
) -> Next {
    let outcome: Result<Next, AssessmentError> = match input {
        AssessInput::Start => orch.start_number_task(StdInstant::now()).map(|_| {
            show_stage(orch);
            Next::Continue
        }),
        AssessInput::Pick(choice) => {
            orch.select_number(choice, StdInstant::now())
                .map(|outcome| match outcome {
                    TrialOutcome::Next(pair) => {
                        show_pair(orch.number_task().trial_number(), pair);
                        Next::Continue
                    }
                    TrialOutcome::Finished(result) => {
                        println!("{}", result.interpretation);
                        Next::TaskFinished
                    }
                })
        }
        AssessInput::Draw(points) => orch.draw(&points).map(|_| {
            println!("Stroke {} drawn.", orch.canvas().strokes().len());
            Next::Continue
        }),
        AssessInput::Clear => orch.clear_canvas().map(|_| {
            println!("Canvas cleared.");
            Next::Continue
        }),
        AssessInput::Done => orch.submit_handwriting().map(|result| {
            println!("{}", result.interpretation);
            Next::TaskFinished
        }),
        AssessInput::Move(index) => orch.move_letter(index).map(|_| {
            show_letters(orch);
            Next::Continue
        }),
        AssessInput::Back(index) => orch.return_letter(index).map(|_| {
            show_letters(orch);
            Next::Continue
        }),
        AssessInput::NewWord => {
            let replaced = orch.new_word().map(|_| ());
            replaced.map(|_| {
                show_letters(orch);
                Next::Continue
            })
        }
        AssessInput::Check => orch.submit_letters().map(|result| {
            println!("{}", result.interpretation);
            println!("{}", orch.combined_interpretation());
            println!("All tasks done. Type `submit` to save your results.");
            Next::Continue
        }),
        AssessInput::Tab(tab) => orch.switch_tab(tab).map(|_| {
            show_stage(orch);
            Next::Continue
        }),
        AssessInput::Submit => orch
            .submit(ctx.backend.as_ref(), Some(credential))
            .await
            .map(|receipt| {
                println!(
                    "{}",
                    receipt.message.as_deref().unwrap_or("Assessment saved.")
                );
                println!("Run `learning-diagnostics history` to see your results.");
                Next::Stop
            }),
        AssessInput::Status => {
            show_status(orch);
            Ok(Next::Continue)
        }
        AssessInput::Camera(_) | AssessInput::Help | AssessInput::Quit => Ok(Next::Continue),
    };

    match outcome {
        Ok(next) => next,
        Err(e) => {
            match &e {
                AssessmentError::Submission(api) if api.is_unauthorized() => println!(
                    "{e}. Your answers are kept; log in again in another terminal, then type `submit`."
                ),
                _ if e.is_retryable() => {
                    println!("{e}. Your answers are kept; type `submit` to try again.")
                }
                _ => println!("{e}."),
            }
            Next::Continue
        }
    }
}

pub async fn run<R: AsyncBufRead + Unpin>(ctx: &Context, input: R) -> anyhow::Result<()> {
    let credential = ctx.credential()?;
    let mut orch = Orchestrator::new(&ctx.config.assessment);
    let display_delay = ctx.config.assessment.display_delay();

    let root = CancellationToken::new();
    let capture = ctx.emotion_capture().await;
    let capture_task = capture
        .as_ref()
        .map(|c| c.spawn(ctx.config.emotion.capture_interval(), &root));
    let mut emotions = capture.as_ref().map(|c| c.subscribe());

    println!("{HELP}");
    println!("Type `start` when you are ready.");

    let mut lines = input.lines();
    let mut advance_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = wait_until(advance_at) => {
                advance_at = None;
                if matches!(orch.progress(), Progress::NumberComplete | Progress::HandwritingComplete) {
                    if orch.advance_after_display().is_ok() {
                        show_stage(&orch);
                    }
                }
            }
            Some(sample) = next_emotion(&mut emotions) => {
                orch.record_emotion(sample);
                announce_emotion(&sample);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                let input = match parse_input(&line) {
                    Ok(input) => input,
                    Err(message) => {
                        println!("{message}");
                        continue;
                    }
                };
                match &input {
                    AssessInput::Help => println!("{HELP}"),
                    AssessInput::Quit => break,
                    AssessInput::Camera(word) => camera_command(capture.as_ref(), word).await,
                    _ => {}
                }
                let before = orch.progress();
                match handle(ctx, &mut orch, input, &credential).await {
                    Next::Continue => {}
                    Next::TaskFinished => advance_at = Some(Instant::now() + display_delay),
                    Next::Stop => break,
                }
                // A manual tab switch already started the next task.
                if orch.progress() != before && advance_at.is_some()
                    && !matches!(orch.progress(), Progress::NumberComplete | Progress::HandwritingComplete)
                {
                    advance_at = None;
                }
            }
        }
    }

    root.cancel();
    if let Some(task) = capture_task {
        task.shutdown().await;
    }
    if let Some(capture) = &capture {
        capture.disable().await;
    }
    info!(progress = %orch.progress(), "Assessment session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::testing::FakeBackend;
    use std::sync::Arc;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_input("A").unwrap(), AssessInput::Pick(Choice::A));
        assert_eq!(parse_input("move 2").unwrap(), AssessInput::Move(1));
        assert_eq!(
            parse_input("tab letters").unwrap(),
            AssessInput::Tab(Tab::LetterArrangement)
        );
        assert_eq!(
            parse_input("draw 1,2 3.5,4").unwrap(),
            AssessInput::Draw(vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)])
        );
        assert_eq!(parse_input("status").unwrap(), AssessInput::Status);
        assert!(parse_input("move 0").is_err());
        assert!(parse_input("draw").is_err());
        assert!(parse_input("draw 1;2").is_err());
        assert!(parse_input("   ").is_err());
        assert!(parse_input("dance").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_session_saves_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::with_save_statuses(vec![503]));
        let mut ctx = context(backend.clone(), dir.path());
        ctx.config.assessment.words = vec!["ab".to_string()];

        // "ab" always shuffles to "ba": letter 2 then letter 1 spells it.
        let script = "\
start
a
b
a
b
a
tab handwriting
draw 10,10 40,60 90,20
done
tab letters
move 2
move 1
check
submit
submit
";
        run(&ctx, script.as_bytes()).await.unwrap();

        let saved = backend.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        match &saved[0].letter_arrangement {
            crate::models::TaskResult::LetterArrangement(result) => {
                assert!(result.correct);
                assert_eq!(result.user_arrangement, "ab");
            }
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[tokio::test]
    async fn refuses_to_start_without_login() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(FakeBackend::new()), dir.path());
        ctx.store.clear().unwrap();
        assert!(run(&ctx, &b"start\n"[..]).await.is_err());
    }
}
