//! unison-drive
//!
//! A console front-end for Unison's `-dumbtty` mode: shows status and
//! progress, lists the plan as a tree, and asks on the terminal whenever
//! Unison wants an answer.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use unison_drive::config::Config;
use unison_drive::plan::{Column, SortRule};
use unison_drive::session::{self, Session};
use unison_drive::transcript::{Transcript, TranscriptRecorder};
use unison_drive::{Action, Alert, AlertKind, Engine, Importance, Operation, State, Update};

const UNEXPECTED_EXIT: &str = "Unison exited unexpectedly";

/// Drive Unison's text UI from the terminal.
#[derive(Parser, Debug)]
#[command(name = "unison-drive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Arguments passed to Unison before -dumbtty (usually a profile name)
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Unison executable
    #[arg(long, env = "UNISON_DRIVE_BACKEND")]
    backend: Option<String>,

    /// Config file (default: <config dir>/unison-drive/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Synchronize as soon as the plan is ready
    #[arg(short, long)]
    yes: bool,

    /// Replay a recorded transcript instead of running Unison
    #[arg(long, conflicts_with = "record")]
    replay: Option<PathBuf>,

    /// Record the session to a transcript file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Plan order: plan, path, action, left or right (prefix '-' to reverse)
    #[arg(long, default_value = "plan")]
    sort: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("unison_drive=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let sort = parse_sort(&cli.sort)?;

    if let Some(path) = &cli.replay {
        let transcript = Transcript::load(path)
            .with_context(|| format!("Failed to load transcript {}", path.display()))?;
        return Ok(replay(&transcript, sort));
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if !cli.args.is_empty() {
        config.extra_args = cli.args;
    }
    config.auto_sync |= cli.yes;
    config.validate()?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(drive(config, cli.record, sort))
}

fn parse_sort(spec: &str) -> Result<SortRule> {
    let (descending, name) = match spec.strip_prefix('-') {
        Some(name) => (true, name),
        None => (false, spec),
    };
    let column = match name {
        "plan" => Column::Plan,
        "path" => Column::Path,
        "action" => Column::Action,
        "left" => Column::Left,
        "right" => Column::Right,
        other => anyhow::bail!("Unknown sort column: {}", other),
    };
    Ok(SortRule::new(column, descending))
}

/// Feed a transcript through the engine and print what a user would see.
fn replay(transcript: &Transcript, sort: SortRule) -> bool {
    let mut engine = Engine::new();
    let mut console = Console::new();
    for update in transcript.replay(&mut engine) {
        console.render(&engine, &update, sort);
        if let Some(alert) = &update.alert {
            console.say(&format!("(replay) {}", alert.text()));
        }
    }
    console.finish(&engine);
    engine.status() != UNEXPECTED_EXIT
}

async fn drive(config: Config, record: Option<PathBuf>, sort: SortRule) -> Result<bool> {
    let mut engine = Engine::new();
    let mut console = Console::new();
    let mut session = Session::spawn(&config)?;
    let mut recorder = record.as_deref().map(TranscriptRecorder::create).transpose()?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let event = tokio::select! {
            event = session.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                let op = if engine.is_enabled(Operation::Abort) {
                    engine.abort()
                } else {
                    engine.interrupt()
                };
                match op {
                    Ok(update) => {
                        perform(&mut session, &mut engine, &mut console, update, sort).await;
                    }
                    Err(e) => warn!("{}", e),
                }
                continue;
            }
        };
        let Some(event) = event else { break };
        if let Some(recorder) = recorder.as_mut() {
            recorder.record(&event)?;
        }

        let update = session::feed(&mut engine, &event);
        let alert = perform(&mut session, &mut engine, &mut console, update, sort).await;
        if let Some(alert) = alert {
            let answer = ask_alert(&mut console, &mut stdin, &alert).await?;
            let update = if answer {
                alert.proceed(&mut engine)
            } else {
                alert.abort(&mut engine)
            };
            perform(&mut session, &mut engine, &mut console, update, sort).await;
        }

        if engine.state() == &State::PlanReady && !engine.is_busy() {
            let update = choose(&mut engine, &mut console, &mut stdin, config.auto_sync).await?;
            perform(&mut session, &mut engine, &mut console, update, sort).await;
        }
    }

    if let Some(recorder) = recorder {
        let path = recorder.finish()?;
        info!(path = %path.display(), "Transcript saved");
    }
    console.finish(&engine);
    Ok(engine.status() != UNEXPECTED_EXIT)
}

/// Render an update and carry it out, following up on write failures.
/// Returns the alert, if the update raised one.
async fn perform(
    session: &mut Session,
    engine: &mut Engine,
    console: &mut Console,
    mut update: Update,
    sort: SortRule,
) -> Option<Alert> {
    let alert = update.alert.take();
    console.render(engine, &update, sort);
    let follow = session.apply(engine, &update).await;
    if !follow.is_empty() {
        console.render(engine, &follow, sort);
    }
    alert
}

async fn read_answer(stdin: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    Ok(stdin
        .next_line()
        .await
        .context("Failed to read from the terminal")?
        .map(|line| line.trim().to_string()))
}

async fn ask_alert(
    console: &mut Console,
    stdin: &mut Lines<BufReader<Stdin>>,
    alert: &Alert,
) -> Result<bool> {
    let hint = match alert.kind {
        AlertKind::YesNo => "[y/N]",
        AlertKind::PressReturn | AlertKind::PressSpace => "[Enter to continue, q to quit]",
    };
    console.message(alert.importance(), alert.text());
    console.prompt(hint);
    let answer = read_answer(stdin).await?;
    Ok(match (alert.kind, answer.as_deref()) {
        (_, None) => false,
        (AlertKind::YesNo, Some(a)) => matches!(a, "y" | "Y" | "yes"),
        (_, Some(a)) => a != "q",
    })
}

/// Ask what to do with a ready plan until an operation goes through.
async fn choose(
    engine: &mut Engine,
    console: &mut Console,
    stdin: &mut Lines<BufReader<Stdin>>,
    auto_sync: bool,
) -> Result<Update> {
    if auto_sync {
        return Ok(engine.sync()?);
    }
    loop {
        console.prompt("[s]ync, [d]iff <path>, [k]eep <index…>, [q]uit:");
        let Some(answer) = read_answer(stdin).await? else {
            return Ok(engine.quit()?);
        };
        let (word, rest) = answer.split_once(' ').unwrap_or((answer.as_str(), ""));
        let update = match word {
            "s" | "sync" => engine.sync()?,
            "q" | "quit" => engine.quit()?,
            "d" | "diff" => engine.diff(rest)?,
            "k" | "keep" => {
                let indices: Vec<usize> = rest
                    .split_whitespace()
                    .filter_map(|n| n.parse().ok())
                    .collect();
                match engine.set_action(&indices, Action::Skip) {
                    Ok(()) => console.say(&format!("Skipping {} item(s)", indices.len())),
                    Err(e) => console.message(Importance::Error, &e.to_string()),
                }
                continue;
            }
            _ => continue,
        };
        if engine.state() == &State::PlanReady && update.input.is_empty() {
            // Nothing happened (unknown diff path); show why and ask again.
            console.render_messages(&update);
            continue;
        }
        return Ok(update);
    }
}

/// Terminal rendering.
struct Console {
    bar: ProgressBar,
}

impl Console {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn render(&mut self, engine: &Engine, update: &Update, sort: SortRule) {
        if update.progressed {
            let line = match engine.progress() {
                Some(p) => match p.fraction {
                    Some(f) => format!("{}: {} ({:.0}%)", engine.status(), p.text, f * 100.0),
                    None => format!("{}: {}", engine.status(), p.text),
                },
                None => engine.status().to_string(),
            };
            self.bar.set_message(line);
        }
        self.render_messages(update);
        if update.plan_ready {
            if let Some(tree) = engine.tree(sort) {
                let mut lines = vec![format!(
                    "{} {} {}",
                    engine.left().bold(),
                    "<->".dimmed(),
                    engine.right().bold()
                )];
                if let Some(items) = engine.items() {
                    for (depth, node) in tree.walk() {
                        let index = node
                            .item
                            .map(|i| format!("{:>4}", i))
                            .unwrap_or_else(|| "    ".to_string());
                        let marker = match node.item.map(|i| &items[i]) {
                            Some(item) => {
                                format!("{:<8} {:<8}", item.left.status.as_str(), item.right.status.as_str())
                            }
                            None => " ".repeat(17),
                        };
                        lines.push(format!(
                            "{} {} {} {}{}",
                            index.dimmed(),
                            marker,
                            paint_action(node.action),
                            "  ".repeat(depth),
                            node.name
                        ));
                    }
                }
                self.bar.suspend(|| {
                    for line in &lines {
                        println!("{}", line);
                    }
                });
            }
        }
        if let Some(diff) = &update.diff {
            self.bar.suspend(|| {
                println!("{}", format!("diff {}", diff.path).bold());
                for line in diff.text.lines() {
                    if line.starts_with('+') {
                        println!("{}", line.green());
                    } else if line.starts_with('-') {
                        println!("{}", line.red());
                    } else {
                        println!("{}", line);
                    }
                }
            });
        }
    }

    fn render_messages(&self, update: &Update) {
        for message in &update.messages {
            self.message(message.importance, &message.text);
        }
    }

    fn message(&self, importance: Importance, text: &str) {
        let label = match importance {
            Importance::Info => "info:".blue().bold(),
            Importance::Warning => "warning:".yellow().bold(),
            Importance::Error => "error:".red().bold(),
        };
        self.bar.suspend(|| eprintln!("{} {}", label, text));
    }

    fn say(&self, text: &str) {
        self.bar.suspend(|| eprintln!("{}", text));
    }

    fn prompt(&self, text: &str) {
        self.bar.suspend(|| eprintln!("{}", text.bold()));
    }

    fn finish(&self, engine: &Engine) {
        self.bar.finish_and_clear();
        let status = if engine.status() == UNEXPECTED_EXIT {
            engine.status().red().bold()
        } else {
            engine.status().green()
        };
        eprintln!("{}", status);
    }
}

fn paint_action(action: Action) -> colored::ColoredString {
    let arrow = format!("{:<5}", action.arrow());
    match action {
        Action::LeftToRight | Action::RightToLeft => arrow.green(),
        Action::MaybeLeftToRight | Action::MaybeRightToLeft => arrow.yellow(),
        Action::Merge => arrow.cyan(),
        Action::Skip => arrow.dimmed(),
        Action::Mixed => arrow.magenta(),
        Action::Error => arrow.red().bold(),
    }
}
