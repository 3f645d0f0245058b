use clap::{Parser, Subcommand};
use mindful_core::store::{CSV_FILE, WAL_FILE};
use mindful_core::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mindful")]
#[command(about = "Guided mindfulness practice sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use a practice service at this URL instead of the local store
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available exercises (default)
    List,

    /// Run a guided exercise
    Run {
        /// Exercise name or alias (e.g. reframe, journal, awareness)
        exercise: String,

        /// Pre-fill answers from a JSON object file
        #[arg(long)]
        answers: Option<PathBuf>,

        /// Advance through every step and complete without prompting
        #[arg(long)]
        auto: bool,
    },

    /// Show recently completed practices
    History {
        /// How many days back to look
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Roll up WAL completions to CSV
    Rollup {
        /// Clean up processed WAL files after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    mindful_core::logging::init()?;

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    match cli.command {
        Some(Commands::Run {
            exercise,
            answers,
            auto,
        }) => cmd_run(&exercise, answers.as_deref(), auto, data_dir, cli.api_url, &config).await,
        Some(Commands::History { days }) => cmd_history(&data_dir, days),
        Some(Commands::Rollup { cleanup }) => cmd_rollup(&data_dir, cleanup),
        Some(Commands::List) | None => cmd_list(),
    }
}

fn checked_catalog() -> Result<&'static Catalog> {
    let catalog = get_default_catalog();
    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::Catalog("Invalid catalog".into()));
    }
    Ok(catalog)
}

fn cmd_list() -> Result<()> {
    let catalog = checked_catalog()?;
    for def in &catalog.exercises {
        println!("{:<22} {} ({} steps)", def.label(), def.title, def.total_steps);
        if !def.aliases.is_empty() {
            println!("{:<22} aliases: {}", "", def.aliases.join(", "));
        }
    }
    Ok(())
}

/// Pick the remote service when a URL is configured, the local store otherwise
fn practice_api(
    config: &Config,
    data_dir: &Path,
    api_url: Option<String>,
) -> Result<Arc<dyn PracticeApi>> {
    match api_url.or_else(|| config.api.base_url.clone()) {
        Some(url) => {
            tracing::info!("Using practice service at {}", url);
            Ok(Arc::new(HttpPracticeApi::new(
                url,
                config.api.token.clone(),
                config.api.timeout(),
            )?))
        }
        None => {
            std::fs::create_dir_all(data_dir)?;
            Ok(Arc::new(LocalPracticeStore::new(data_dir)))
        }
    }
}

async fn cmd_run(
    name: &str,
    answers_file: Option<&Path>,
    auto: bool,
    data_dir: PathBuf,
    api_url: Option<String>,
    config: &Config,
) -> Result<()> {
    let catalog = checked_catalog()?;
    let definition = catalog
        .resolve(name)
        .ok_or_else(|| Error::Catalog(format!("Unknown exercise: {}", name)))?;
    let cadence = config.session.cadence_for(definition);
    let api = practice_api(config, &data_dir, api_url)?;

    let mut session = PracticeSession::new(Arc::new(definition.clone()), api, cadence);
    match session.initialize().await {
        InitOutcome::Fresh => {}
        InitOutcome::Resumed => println!(
            "Resuming {} at step {} ({}s so far)",
            definition.title,
            session.step_index() + 1,
            session.elapsed_seconds()
        ),
        InitOutcome::Offline(reason) => {
            eprintln!("Practice service unavailable ({}); progress will not be saved.", reason)
        }
    }

    if let Some(path) = answers_file {
        prefill_answers(&session, path)?;
    }

    let finished = if auto {
        run_auto(&session)?;
        true
    } else {
        run_interactive(&session).await?
    };

    if !finished {
        match session.autosave().await {
            SaveOutcome::Saved => println!("Progress saved. Run the exercise again to resume."),
            SaveOutcome::Skipped(_) => println!("Leaving without saving."),
            SaveOutcome::Failed(e) => eprintln!("Could not save progress: {}", e),
        }
        session.close();
        return Ok(());
    }

    let result = session.complete().await;
    let route = ExitRoute::after_completion(&result);
    session.close();

    match result {
        Ok(receipt) => {
            println!(
                "\n✓ {} complete ({} min)",
                definition.title, receipt.payload.duration_minutes
            );
            if let ExitRoute::Journal {
                highlight: Some(id),
            } = route
            {
                println!("  Journal entry: {}", id);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("\n✗ {}", e);
            Err(Error::Session(e.to_string()))
        }
    }
}

fn prefill_answers(session: &PracticeSession, path: &Path) -> Result<()> {
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let answers = Answers::from_raw(&raw)
        .ok_or_else(|| Error::Other(format!("{:?} is not a JSON object of answers", path)))?;
    for (field, value) in answers.iter() {
        session.record_answer(field.clone(), value.clone());
    }
    tracing::debug!("Pre-filled {} answers from {:?}", answers.len(), path);
    Ok(())
}

/// Walk forward to the completion page, failing on the first unsatisfied step
fn run_auto(session: &PracticeSession) -> Result<()> {
    while !session.snapshot().at_terminal(session.definition()) {
        if !session.next() {
            let step = session
                .current_step()
                .map(|s| s.id.clone())
                .unwrap_or_default();
            return Err(Error::Session(format!("Step '{}' needs an answer", step)));
        }
    }
    Ok(())
}

enum Command {
    Input(String),
    Back,
    Quit,
}

/// Returns `true` once the user reaches the completion page
async fn run_interactive(session: &PracticeSession) -> Result<bool> {
    loop {
        let Some(step) = session.current_step().cloned() else {
            return Ok(false);
        };
        display_step(session, &step);

        if step.terminal {
            return match prompt("Press Enter to finish, 'q' to leave").await? {
                Command::Input(_) => Ok(true),
                Command::Back | Command::Quit => Ok(false),
            };
        }

        let mut leave = false;
        let mut went_back = false;
        for input in &step.inputs {
            let Some(field) = input_field(input) else {
                continue;
            };
            show_input(session, input);
            match prompt(field).await? {
                Command::Input(line) => {
                    if let Some(value) = parse_input(input, &line) {
                        session.record_answer(field, value);
                    }
                }
                Command::Back => {
                    went_back = true;
                    break;
                }
                Command::Quit => {
                    leave = true;
                    break;
                }
            }
        }

        if leave {
            return Ok(false);
        }
        if !went_back {
            match prompt("Enter to continue, 'b' back, 'q' quit").await? {
                Command::Input(_) => {
                    if !session.next() {
                        println!("  This step needs an answer before moving on.");
                    }
                    continue;
                }
                Command::Back => {}
                Command::Quit => return Ok(false),
            }
        }

        if session.back() == BackOutcome::Exit {
            return Ok(false);
        }
    }
}

fn display_step(session: &PracticeSession, step: &StepDefinition) {
    let def = session.definition();
    println!("\n╭─────────────────────────────────────────╮");
    println!(
        "│  {} · {}/{}",
        def.title,
        step.progress.min(def.total_steps),
        def.total_steps
    );
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  {}", step.title);
    println!("  {}", step.prompt);
    println!();
}

fn input_field(input: &StepInput) -> Option<&str> {
    match input {
        StepInput::Info => None,
        StepInput::Text { field }
        | StepInput::MultiSelect { field, .. }
        | StepInput::SingleSelect { field, .. }
        | StepInput::Score { field, .. } => Some(field),
    }
}

fn show_input(session: &PracticeSession, input: &StepInput) {
    let answers = session.snapshot().answers;
    match input {
        StepInput::Info => {}
        StepInput::Text { field } => {
            if let Some(current) = answers.text(field).filter(|t| !t.is_empty()) {
                println!("  (current: {})", current);
            }
        }
        StepInput::MultiSelect {
            field,
            options,
            allow_custom,
        } => {
            for (i, option) in options.iter().enumerate() {
                println!("  {:>2}. {}", i + 1, option);
            }
            let hint = if *allow_custom {
                "numbers separated by commas, or your own words"
            } else {
                "numbers separated by commas"
            };
            println!("  ({}; current: {})", hint, answers.selection(field).join(", "));
        }
        StepInput::SingleSelect { options, .. } => {
            for (i, option) in options.iter().enumerate() {
                println!("  {:>2}. {}", i + 1, option);
            }
        }
        StepInput::Score { field, min, max } => {
            let current = answers
                .get(field)
                .and_then(AnswerValue::as_number)
                .map(|n| n.to_string())
                .unwrap_or_default();
            println!("  ({}-{}, current: {})", min, max, current);
        }
    }
}

/// Interpret a line for an input; empty input keeps the current answer
fn parse_input(input: &StepInput, line: &str) -> Option<AnswerValue> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match input {
        StepInput::Info => None,
        StepInput::Text { .. } => Some(AnswerValue::text(line)),
        StepInput::MultiSelect {
            options,
            allow_custom,
            ..
        } => {
            let picked: Vec<String> = line
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .filter_map(|part| match part.parse::<usize>() {
                    Ok(n) => options.get(n.wrapping_sub(1)).cloned(),
                    Err(_) if *allow_custom => Some(part.to_string()),
                    Err(_) => None,
                })
                .collect();
            Some(AnswerValue::Selection(picked))
        }
        StepInput::SingleSelect { options, .. } => match line.parse::<usize>() {
            Ok(n) => options.get(n.wrapping_sub(1)).cloned().map(AnswerValue::Text),
            Err(_) => options
                .iter()
                .find(|o| o.eq_ignore_ascii_case(line))
                .cloned()
                .map(AnswerValue::Text),
        },
        StepInput::Score { min, max, .. } => line
            .parse::<i64>()
            .ok()
            .map(|n| AnswerValue::Number(n.clamp(*min, *max))),
    }
}

async fn prompt(label: &str) -> Result<Command> {
    let label = label.to_string();
    let line = tokio::task::spawn_blocking(move || -> io::Result<Option<String>> {
        print!("{}> ", label);
        io::stdout().flush()?;
        let mut input = String::new();
        let read = io::stdin().read_line(&mut input)?;
        Ok((read > 0).then_some(input))
    })
    .await
    .map_err(|e| Error::Other(format!("Input task failed: {}", e)))??;

    // End of input leaves the exercise
    let Some(line) = line else {
        return Ok(Command::Quit);
    };
    Ok(match line.trim().to_lowercase().as_str() {
        "b" => Command::Back,
        "q" => Command::Quit,
        _ => Command::Input(line.trim_end_matches(['\r', '\n']).to_string()),
    })
}

fn cmd_history(data_dir: &Path, days: i64) -> Result<()> {
    let records = load_recent_completions(&data_dir.join(WAL_FILE), &data_dir.join(CSV_FILE), days)?;

    if records.is_empty() {
        println!("No practices in the last {} days.", days);
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:<22} {:>3} min  {}",
            record.completed_at.format("%Y-%m-%d %H:%M"),
            record.exercise_type,
            record.duration_minutes,
            record.session_id
        );
    }
    Ok(())
}

fn cmd_rollup(data_dir: &Path, cleanup: bool) -> Result<()> {
    let wal_path = data_dir.join(WAL_FILE);
    let csv_path = data_dir.join(CSV_FILE);

    if !wal_path.exists() {
        println!("No WAL file found - nothing to roll up.");
        return Ok(());
    }

    let count = mindful_core::rollup::wal_to_csv_and_archive(&wal_path, &csv_path)?;

    println!("✓ Rolled up {} practices to CSV", count);
    println!("  CSV: {}", csv_path.display());

    if cleanup {
        let cleaned = mindful_core::rollup::cleanup_processed_wals(data_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed WAL files", cleaned);
        }
    }

    Ok(())
}
