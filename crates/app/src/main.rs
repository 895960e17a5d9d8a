use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiz_core::hearts::MAX_HEARTS;
use quiz_core::model::{Challenge, ChallengeSet, GradingRule, LearnerId, LessonId};
use quiz_core::progression::AttemptStatus;
use services::{
    CheckOutcome, Clock, FeedbackEvent, FeedbackSink, LessonLoopService, SessionController,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    MissingFile,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingFile => write!(f, "import requires --file <path>"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(flag: &'static str, value: String) -> Result<T, ArgsError> {
    value
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn env_id<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

struct Args {
    db_url: String,
    learner_id: LearnerId,
    lesson_id: LessonId,
    file: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- play   [--db <sqlite_url>] [--learner-id <id>] [--lesson-id <id>]");
    eprintln!("  cargo run -p app -- import --file <lesson.json> [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:quiz.sqlite3");
    eprintln!("  --learner-id 1");
    eprintln!("  --lesson-id 1");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_LEARNER_ID, QUIZ_LESSON_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Import,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "play" => Some(Self::Play),
            "import" => Some(Self::Import),
            _ => None,
        }
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("quiz.sqlite3".into()), normalize_sqlite_url);
        let mut learner_id = env_id("QUIZ_LEARNER_ID").unwrap_or_else(|| LearnerId::new(1));
        let mut lesson_id = env_id("QUIZ_LESSON_ID").unwrap_or_else(|| LessonId::new(1));
        let mut file = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--learner-id" => {
                    let value = require_value(args, "--learner-id")?;
                    learner_id = parse_id("--learner-id", value)?;
                }
                "--lesson-id" => {
                    let value = require_value(args, "--lesson-id")?;
                    lesson_id = parse_id("--lesson-id", value)?;
                }
                "--file" => {
                    file = Some(PathBuf::from(require_value(args, "--file")?));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            learner_id,
            lesson_id,
            file,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn import_lesson(storage: &Storage, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(file)?;
    let set: ChallengeSet = serde_json::from_str(&raw)?;
    storage.lessons.upsert_lesson(&set).await?;
    println!(
        "imported lesson {} with {} challenges",
        set.lesson_id(),
        set.len()
    );
    Ok(())
}

//
// ─── PLAY ──────────────────────────────────────────────────────────────────────
//

fn render_challenge(session: &SessionController, challenge: &Challenge) {
    let state = session.state();
    println!();
    println!(
        "[{}/{}] hearts: {}{}",
        state.active_index + 1,
        state.total,
        state.hearts,
        if state.is_practice { " (practice)" } else { "" }
    );
    println!("{}", challenge.question);
    match challenge.grading_rule() {
        GradingRule::Option => {
            for (idx, option) in challenge.options.iter().enumerate() {
                println!("  {}) {}", idx + 1, option.text);
            }
            println!("pick a number:");
        }
        GradingRule::Text => println!("type your answer:"),
        GradingRule::Ungraded => {
            for option in challenge.options_in_order() {
                println!("  - {}", option.text);
            }
            println!("press enter to continue:");
        }
    }
}

fn drain_feedback(rx: &mut UnboundedReceiver<FeedbackEvent>) {
    while let Ok(event) = rx.try_recv() {
        let line = match event {
            FeedbackEvent::Correct => "correct!",
            FeedbackEvent::Incorrect => "not quite.",
            FeedbackEvent::HeartsDepleted => "you ran out of hearts. type `refill` to keep going.",
            FeedbackEvent::UnlimitedHearts => "unlimited hearts: no heart lost.",
        };
        println!("{line}");
    }
}

fn reveal(challenge: &Challenge) {
    let answer = challenge
        .correct_answer
        .clone()
        .or_else(|| challenge.correct_option().map(|option| option.text.clone()));
    if let Some(answer) = answer {
        println!("the answer is: {answer}");
    }
}

async fn play(
    service: &LessonLoopService,
    mut rx: UnboundedReceiver<FeedbackEvent>,
    learner: LearnerId,
    lesson: LessonId,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = service.start_lesson(learner, lesson).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while !session.is_completed() {
        let Some(challenge) = session.active_challenge().cloned() else {
            break;
        };

        if session.awaiting_refill() {
            println!("out of hearts: `refill` or `quit`");
        } else {
            render_challenge(&session, &challenge);
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "quit" | "q" => break,
            "refill" => {
                let hearts = service.refill_hearts(&mut session).await?;
                println!("hearts refilled: {hearts}");
                if session.progression().status() == AttemptStatus::Wrong {
                    session.on_continue();
                }
                continue;
            }
            _ if session.awaiting_refill() => continue,
            _ => {}
        }

        let outcome = match challenge.grading_rule() {
            GradingRule::Option => {
                let picked = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| challenge.options.get(idx));
                let Some(option) = picked else {
                    println!("unknown choice: {input}");
                    continue;
                };
                session.on_select(option.id);
                session.on_check().await?
            }
            GradingRule::Text => {
                session.on_text_input(input);
                session.on_check().await?
            }
            GradingRule::Ungraded => {
                session.on_skip_ungraded().await;
                CheckOutcome::Ungraded
            }
        };

        session.settle().await;
        drain_feedback(&mut rx);

        match outcome {
            CheckOutcome::Dropped | CheckOutcome::Ignored => continue,
            CheckOutcome::Graded { .. } | CheckOutcome::Ungraded => {}
        }
        if session.progression().reveal_answer() {
            reveal(&challenge);
        }
        if !session.awaiting_refill() {
            session.on_continue();
        }
    }

    if session.is_completed() {
        let summary = service.finish(&mut session).await?;
        println!();
        println!(
            "lesson complete: {} challenges, {} wrong attempts, {:.0}% accuracy, {} hearts left",
            summary.total_challenges(),
            summary.wrong_attempts(),
            summary.accuracy(),
            summary.hearts_remaining()
        );
    } else {
        session.settle().await;
        println!("see you next time");
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: play when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Play,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Play,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    log::debug!("opened {}", parsed.db_url);

    match cmd {
        Command::Import => {
            let file = parsed.file.ok_or(ArgsError::MissingFile)?;
            import_lesson(&storage, &file).await
        }
        Command::Play => {
            storage
                .hearts
                .init_learner(parsed.learner_id, MAX_HEARTS)
                .await?;
            let (tx, rx) = mpsc::unbounded_channel();
            let feedback: Arc<dyn FeedbackSink> = Arc::new(tx);
            let service = LessonLoopService::new(Clock::system(), storage).with_feedback(feedback);
            play(&service, rx, parsed.learner_id, parsed.lesson_id).await
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
