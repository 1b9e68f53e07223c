use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{announce_emotion, camera_command, next_emotion, wait_until, Context};
use crate::lesson::catalog::Catalog;
use crate::lesson::speech::{CommandSpeaker, LogSpeaker, Narrator, Speaker};
use crate::lesson::{
    spawn_heartbeat, AnswerOutcome, LessonFlow, LessonProgress, NarrationCue, Step,
};

const HELP: &str = "\
Commands:
  next              go to the next step
  pick N            choose answer N on the exercise
  submit            check the chosen answer
  replay | stop     read the current step aloud / stop reading
  camera | hide     toggle emotion capture / minimize the camera
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonInput {
    Next,
    Pick(usize),
    Submit,
    Replay,
    Stop,
    Camera(&'static str),
    Help,
    Quit,
}

pub fn parse_input(line: &str) -> Result<LessonInput, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err("type a command, or `help`".to_string());
    };
    let input = match command.to_ascii_lowercase().as_str() {
        "next" | "n" => LessonInput::Next,
        "pick" => {
            let raw = words.next().ok_or("pick which answer? give its number")?;
            match raw.parse::<usize>() {
                Ok(n) if n >= 1 => LessonInput::Pick(n - 1),
                _ => return Err(format!("{raw:?} is not an answer number")),
            }
        }
        "submit" => LessonInput::Submit,
        "replay" => LessonInput::Replay,
        "stop" => LessonInput::Stop,
        "camera" => LessonInput::Camera("camera"),
        "hide" => LessonInput::Camera("hide"),
        "help" | "?" => LessonInput::Help,
        "quit" | "exit" => LessonInput::Quit,
        other => return Err(format!("unknown command {other:?}; try `help`")),
    };
    Ok(input)
}

fn speaker(ctx: &Context) -> Arc<dyn Speaker> {
    if !ctx.config.speech.enabled {
        return Arc::new(LogSpeaker);
    }
    match CommandSpeaker::new(&ctx.config.speech.command) {
        Ok(speaker) => Arc::new(speaker),
        Err(e) => {
            warn!(error = %e, "Narration falls back to the log");
            Arc::new(LogSpeaker)
        }
    }
}

fn show(flow: &LessonFlow) {
    println!();
    println!(
        "== {} ({} of {}) [{}] ==",
        flow.header(),
        flow.lesson_index() + 1,
        flow.lesson_count(),
        flow.difficulty()
    );
    println!("{}", flow.narration_text());
    if flow.step() == Step::Exercise {
        for (i, option) in flow.lesson().exercise.options.iter().enumerate() {
            let mark = if flow.selected() == Some(option.as_str()) { '*' } else { ' ' };
            println!(" {mark}{}) {option}", i + 1);
        }
        if flow.attempts() > 0 {
            println!("Tries so far: {}", flow.attempts());
        }
    }
    if let Some(emotion) = flow.last_emotion() {
        println!("(camera sees: {emotion})");
    }
}

pub async fn run<R: AsyncBufRead + Unpin>(ctx: &Context, input: R) -> anyhow::Result<()> {
    drive(ctx, input, speaker(ctx)).await
}

async fn drive<R: AsyncBufRead + Unpin>(
    ctx: &Context,
    input: R,
    speaker: Arc<dyn Speaker>,
) -> anyhow::Result<()> {
    ctx.credential()?;
    let catalog = match &ctx.config.lesson.catalog {
        Some(path) => Catalog::load(path).context("failed to load the lesson catalog")?,
        None => Catalog::sound_starters(),
    };
    let mut flow = LessonFlow::new(catalog, &ctx.config.lesson);
    let narrator = Narrator::new(speaker);
    let mut cue = NarrationCue::default();

    let root = CancellationToken::new();
    let (snapshots, snapshot_rx) = watch::channel(flow.snapshot());
    let heartbeat = spawn_heartbeat(
        Arc::clone(&ctx.backend),
        snapshot_rx,
        ctx.config.lesson.heartbeat_interval(),
        &root,
    );
    let capture = ctx.emotion_capture().await;
    let capture_task = capture
        .as_ref()
        .map(|c| c.spawn(ctx.config.emotion.capture_interval(), &root));
    let mut emotions = capture.as_ref().map(|c| c.subscribe());

    println!("{HELP}");
    info!(lesson = %flow.lesson().id, difficulty = %flow.difficulty(), "Lesson started");
    show(&flow);
    if let Some(text) = cue.next(&flow) {
        narrator.speak(text);
    }

    let mut lines = input.lines();
    let mut advance_at: Option<Instant> = None;

    loop {
        let before = (flow.lesson_index(), flow.step(), flow.difficulty());

        tokio::select! {
            _ = wait_until(advance_at) => {
                advance_at = None;
                match flow.advance_lesson() {
                    Some(LessonProgress::Completed) => {
                        println!("You finished every lesson. Well done!");
                        break;
                    }
                    Some(LessonProgress::Next(index)) => {
                        println!("On to lesson {} of {}.", index + 1, flow.lesson_count());
                    }
                    None => {}
                }
            }
            Some(sample) = next_emotion(&mut emotions) => {
                announce_emotion(&sample);
                flow.on_emotion(sample.emotion);
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
                match input {
                    LessonInput::Next if flow.is_awaiting_advance() => {
                        println!("Well done! The next lesson starts in a moment.");
                    }
                    LessonInput::Next => {
                        flow.next_step();
                    }
                    LessonInput::Pick(index) => {
                        let option = flow.lesson().exercise.options.get(index).cloned();
                        match option {
                            Some(option) if flow.select_answer(&option) => {
                                println!("Chose {option}. Type `submit` to check.");
                            }
                            Some(_) => println!("Answers can be picked on the exercise step."),
                            None => println!("There is no answer {}.", index + 1),
                        }
                    }
                    LessonInput::Submit => match flow.submit_answer() {
                        AnswerOutcome::Correct => {
                            advance_at = Some(Instant::now() + ctx.config.lesson.advance_delay());
                        }
                        AnswerOutcome::NoSelection => println!("Pick an answer first."),
                        AnswerOutcome::Ignored => println!("Nothing to submit right now."),
                        AnswerOutcome::Incorrect { attempts } => {
                            debug!(attempts, "Answer was not correct");
                            if attempts >= 3 {
                                println!("Type `replay` to hear the question again.");
                            }
                        }
                    },
                    LessonInput::Replay => narrator.speak(flow.replay_text()),
                    LessonInput::Stop => {
                        if !narrator.stop() {
                            println!("Nothing is playing.");
                        }
                    }
                    LessonInput::Camera(word) => camera_command(capture.as_ref(), word).await,
                    LessonInput::Help => println!("{HELP}"),
                    LessonInput::Quit => break,
                }
            }
        }

        snapshots.send_replace(flow.snapshot());
        if (flow.lesson_index(), flow.step(), flow.difficulty()) != before {
            show(&flow);
        }
        if let Some(text) = cue.next(&flow) {
            if let Some(feedback) = flow.feedback() {
                if feedback.message == text {
                    println!("{text}");
                }
            }
            narrator.speak(text);
        }
    }

    root.cancel();
    heartbeat.shutdown().await;
    if let Some(task) = capture_task {
        task.shutdown().await;
    }
    if let Some(capture) = &capture {
        capture.disable().await;
    }
    narrator.stop();
    info!(
        lesson = %flow.lesson().id,
        completed = flow.is_completed(),
        "Lesson session ended"
    );
    Ok(())
}
