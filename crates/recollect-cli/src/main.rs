//! Recollect CLI
//!
//! Terminal flashcard trainer on top of the FSRS-6 scheduler.

mod config;
mod study;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use recollect_core::{parse_timestamp, Phase};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigArgs};
use crate::study::StudySession;

/// Recollect - spaced repetition flashcards
#[derive(Parser)]
#[command(name = "recollect")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Study flashcard decks on an FSRS-6 schedule")]
#[command(long_about = "Recollect schedules flashcards with the FSRS-6 memory model.\n\nDecks are JSON files mapping each word to its definition and example; progress and the review log live in a local SQLite database.")]
struct Cli {
    /// Directory holding the database
    #[arg(long, global = true, env = "RECOLLECT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory of versioned weight files (<version>.json)
    #[arg(long, global = true, env = "RECOLLECT_WEIGHTS_DIR")]
    weights_dir: Option<PathBuf>,

    /// Learner id
    #[arg(long, global = true, env = "RECOLLECT_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the store from deck files or directories
    Import {
        /// Deck files or directories of decks
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Weight version recorded on cards that carry none
        #[arg(long)]
        w_version: Option<String>,
    },

    /// List stored cards due now
    Due {
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Study decks interactively
    Study {
        /// Deck files or directories of decks
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// New cards introduced this session
        #[arg(long, env = "RECOLLECT_DAILY_NEW_CAP")]
        new_cap: Option<usize>,
    },

    /// Grade one stored card
    Review {
        /// Card id or word
        card: String,
        /// again | hard | good | easy, or 1-4
        grade: String,
        /// Review time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Weight version override
        #[arg(long)]
        weights: Option<String>,
        /// Print the review diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show available weight sets
    Weights {
        /// Version to show in detail
        version: Option<String>,
    },

    /// Show the review log, newest first
    Log {
        /// Only this card
        #[arg(long)]
        card: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Print JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show card and review statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut args = ConfigArgs {
        data_dir: cli.data_dir,
        weights_dir: cli.weights_dir,
        user: cli.user,
        daily_new_cap: None,
    };

    match cli.command {
        Commands::Import { paths, w_version } => {
            run_import(&Config::resolve(args), paths, w_version)
        }
        Commands::Due { limit, json } => run_due(&Config::resolve(args), limit, json),
        Commands::Study { paths, new_cap } => {
            args.daily_new_cap = new_cap;
            run_study(&Config::resolve(args), paths)
        }
        Commands::Review {
            card,
            grade,
            at,
            weights,
            json,
        } => run_review(&Config::resolve(args), &card, &grade, at, weights, json),
        Commands::Weights { version } => run_weights(&Config::resolve(args), version),
        Commands::Log { card, limit, json } => {
            run_log(&Config::resolve(args), card, limit, json)
        }
        Commands::Stats { json } => run_stats(&Config::resolve(args), json),
    }
}

/// Run import command
fn run_import(
    config: &Config,
    paths: Vec<PathBuf>,
    w_version: Option<String>,
) -> anyhow::Result<()> {
    let storage = config.open_storage()?;
    let scheduler = config.scheduler()?;
    // Fail early on an unknown version rather than stamping it on every card
    let version = scheduler.weights().load(w_version.as_deref())?.version.clone();

    let summary = storage.import_decks(&paths, config.user(), Some(version.as_str()), Utc::now())?;
    tracing::info!(
        decks = summary.decks.len(),
        imported = summary.imported,
        skipped = summary.skipped,
        w_version = %version,
        "Import finished"
    );

    println!("{}", "=== Recollect Import ===".cyan().bold());
    println!();
    if summary.decks.is_empty() {
        println!("{}", "No deck files found.".dimmed());
        return Ok(());
    }
    for deck in &summary.decks {
        println!("  {}", deck.display());
    }
    println!();
    println!("{}: {}", "Imported".white().bold(), summary.imported.to_string().green());
    println!("{}: {}", "Already known".white().bold(), summary.skipped);
    println!("{}: {}", "Weights".white().bold(), version);
    Ok(())
}

/// Run due command
fn run_due(config: &Config, limit: usize, json: bool) -> anyhow::Result<()> {
    let storage = config.open_storage()?;
    let scheduler = config.scheduler()?;
    let now = Utc::now();
    let cards = storage.due_cards(config.user(), now, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&cards)?);
        return Ok(());
    }

    println!("{}", "=== Recollect Due Cards ===".cyan().bold());
    println!();
    if cards.is_empty() {
        println!("{}", "Nothing due.".dimmed());
        return Ok(());
    }

    println!(
        "  {:24} {:11} {:>9} {:>7}  {}",
        "Card".bold(),
        "Phase".bold(),
        "Stability".bold(),
        "Recall".bold(),
        "Due".bold()
    );
    for card in &cards {
        let recall = scheduler.retrievability_at(card, now)?;
        let due = card
            .due_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "now".to_string());
        println!(
            "  {:24} {:11} {:>9.2} {:>6.1}%  {}",
            truncate(&card.word, 24),
            phase_label(card.phase),
            card.stability,
            recall * 100.0,
            due.dimmed()
        );
    }
    Ok(())
}

/// Run study command
fn run_study(config: &Config, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let storage = config.open_storage()?;
    let scheduler = config.scheduler()?;
    let cards = storage.session_cards(&paths, config.user())?;
    if cards.is_empty() {
        bail!("no cards found in the given decks");
    }

    println!("{}", "=== Recollect Study ===".cyan().bold());
    println!(
        "{}",
        format!(
            "{} cards, up to {} new, user {}",
            cards.len(),
            config.daily_new_cap,
            config.user_id
        )
        .dimmed()
    );

    let mut session = StudySession::new(
        &storage,
        &scheduler,
        &config.user_id,
        cards,
        Utc::now(),
        config.daily_new_cap,
    );
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();
    let summary = session.run(&mut input, &mut out, Utc::now)?;

    println!();
    println!("{}: {}", "Reviewed".white().bold(), summary.reviewed);
    println!("{}: {}", "Forgotten".white().bold(), summary.lapses);
    Ok(())
}

/// Run review command
fn run_review(
    config: &Config,
    card_id: &str,
    grade: &str,
    at: Option<String>,
    weights: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let storage = config.open_storage()?;
    let scheduler = config.scheduler()?;
    let state = storage.require_card_state(config.user(), card_id)?;
    let event_time = at.as_deref().map(parse_review_time).transpose()?;

    let submitted = storage
        .submit_grade(
            &scheduler,
            &state,
            grade,
            config.user(),
            event_time,
            weights.as_deref(),
        )
        .context("review not recorded")?;
    let diag = &submitted.outcome.diagnostics;

    if json {
        println!("{}", serde_json::to_string_pretty(diag)?);
        return Ok(());
    }

    let grade_label = if diag.success {
        diag.grade.as_str().green()
    } else {
        diag.grade.as_str().red()
    };
    println!("{} {}", state.word.white().bold(), grade_label);
    println!(
        "  {}: {} -> {}",
        "Phase".white().bold(),
        phase_label(diag.previous_phase),
        phase_label(submitted.outcome.state.phase)
    );
    println!("  {}: {:.1}%", "Recall".white().bold(), diag.retrievability * 100.0);
    println!("  {}: {:.2}", "Stability".white().bold(), diag.stability);
    println!("  {}: {:.2}", "Difficulty".white().bold(), diag.difficulty);
    match diag.short_term_delay_seconds {
        Some(secs) => println!("  {}: {} s", "Requeue".white().bold(), secs),
        None => println!("  {}: {} d", "Interval".white().bold(), diag.interval_days),
    }
    println!(
        "  {}: {}",
        "Due".white().bold(),
        diag.due_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

/// Run weights command
fn run_weights(config: &Config, version: Option<String>) -> anyhow::Result<()> {
    let store = config.weight_store()?;

    if let Some(version) = version {
        let weights = store.load(Some(&version))?;
        println!("{}", format!("=== Weights {} ===", weights.version).cyan().bold());
        println!();
        println!("{}: {}", "Request retention".white().bold(), weights.request_retention);
        println!("{}: {} d", "Maximum interval".white().bold(), weights.maximum_interval);
        println!("{}: {:.4}", "Decay".white().bold(), weights.decay());
        for (i, w) in weights.weights.iter().enumerate() {
            println!("  w{:<2} {:>8.4}", i, w);
        }
        return Ok(());
    }

    println!("{}", "=== Recollect Weight Sets ===".cyan().bold());
    println!();
    let versions = store.versions()?;
    if versions.is_empty() {
        println!("{}", "No weight files found.".dimmed());
    }
    for (i, version) in versions.iter().enumerate() {
        let marker = if i == 0 { " (default)".dimmed().to_string() } else { String::new() };
        println!("  {}{}", version, marker);
    }
    Ok(())
}

/// Run log command
fn run_log(
    config: &Config,
    card: Option<String>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let storage = config.open_storage()?;
    let entries = storage.review_log(config.user(), card.as_deref(), limit)?;

    if json {
        let stdout = io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        for entry in &entries {
            serde_json::to_writer(&mut writer, entry)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        return Ok(());
    }

    println!("{}", "=== Recollect Review Log ===".cyan().bold());
    println!();
    if entries.is_empty() {
        println!("{}", "No reviews logged.".dimmed());
        return Ok(());
    }
    for entry in &entries {
        let grade = if entry.success {
            entry.grade.green()
        } else {
            entry.grade.red()
        };
        println!(
            "  {}  {:24} {:6} {:>5} d  {}",
            entry
                .event_time
                .unwrap_or(entry.logged_at)
                .format("%Y-%m-%d %H:%M"),
            truncate(&entry.card_id, 24),
            grade,
            entry.interval_days,
            entry.w_version.dimmed()
        );
    }
    Ok(())
}

/// Run stats command
fn run_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = config.open_storage()?;
    let stats = storage.stats(config.user(), Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "=== Recollect Statistics ===".cyan().bold());
    println!();
    println!("{}: {}", "User".white().bold(), stats.user_id);
    println!("{}: {}", "Data directory".white().bold(), config.data_dir_display());
    println!("{}: {}", "Total Cards".white().bold(), stats.total_cards);
    println!("{}: {}", "Due Now".white().bold(), stats.due_now);
    println!("{}: {}", "Reviews Logged".white().bold(), stats.reviews_logged);
    println!("{}: {}", "Lapses Logged".white().bold(), stats.lapses_logged);
    println!("{}: {}", "Decks Imported".white().bold(), stats.decks_imported);

    println!();
    println!("{}", "=== Phase Distribution ===".yellow().bold());
    let total = stats.total_cards.max(0) as usize;
    if total == 0 {
        println!("{}", "No cards stored.".dimmed());
        return Ok(());
    }
    print_distribution_bar("New", stats.new_cards as usize, total, "white");
    print_distribution_bar("Learning", stats.learning_cards as usize, total, "yellow");
    print_distribution_bar("Review", stats.review_cards as usize, total, "green");
    print_distribution_bar("Relearning", stats.relearning_cards as usize, total, "red");
    Ok(())
}

fn parse_review_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    parse_timestamp("at", &Value::from(raw))?
        .with_context(|| format!("empty review time '{}'", raw))
}

fn phase_label(phase: Phase) -> colored::ColoredString {
    match phase {
        Phase::New => phase.as_str().white(),
        Phase::Learning => phase.as_str().yellow(),
        Phase::Review => phase.as_str().green(),
        Phase::Relearning => phase.as_str().red(),
    }
}

/// Print a distribution bar
fn print_distribution_bar(label: &str, count: usize, total: usize, color: &str) {
    let percentage = if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    let bar_width: usize = 30;
    let filled = ((percentage / 100.0) * bar_width as f64) as usize;
    let empty = bar_width.saturating_sub(filled);

    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(empty));
    let colored_bar = match color {
        "green" => bar.green(),
        "yellow" => bar.yellow(),
        "red" => bar.red(),
        _ => bar.white(),
    };

    println!(
        "  {:12} [{}] {:>5} ({:>5.1}%)",
        label, colored_bar, count, percentage
    );
}

fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
