//! Interactive study session
//!
//! Drives a [`ReviewQueueManager`] from line-based input: each card is shown,
//! revealed on Enter, then graded `1..4` or by name. Grades go through
//! [`Storage::submit_grade`]; a failed grade leaves the card in front of the
//! learner.

use std::io::{BufRead, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use recollect_core::{
    CardState, FSRSScheduler, Rating, ReviewOutcome, ReviewQueueManager, Storage,
};

/// Totals for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub reviewed: usize,
    pub lapses: usize,
    pub rejected: usize,
    pub quit: bool,
}

pub struct StudySession<'a> {
    storage: &'a Storage,
    scheduler: &'a FSRSScheduler,
    user_id: &'a str,
    queue: ReviewQueueManager,
}

enum Reply {
    Line(String),
    Quit,
}

fn read_reply(input: &mut impl BufRead) -> Result<Reply> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(Reply::Quit);
    }
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
        return Ok(Reply::Quit);
    }
    Ok(Reply::Line(line.to_string()))
}

/// Compact "10m" / "5h" / "3d" rendering of the wait an outcome implies
pub fn format_wait(outcome: &ReviewOutcome) -> String {
    match outcome.diagnostics.short_term_delay_seconds {
        Some(secs) if secs < 3600 => format!("{}m", (secs + 59) / 60),
        Some(secs) if secs < 86_400 => format!("{}h", secs / 3600),
        Some(secs) => format!("{}d", secs / 86_400),
        None => format!("{}d", outcome.diagnostics.interval_days),
    }
}

impl<'a> StudySession<'a> {
    pub fn new(
        storage: &'a Storage,
        scheduler: &'a FSRSScheduler,
        user_id: &'a str,
        cards: Vec<CardState>,
        now: DateTime<Utc>,
        daily_new_cap: usize,
    ) -> Self {
        Self {
            storage,
            scheduler,
            user_id,
            queue: ReviewQueueManager::new(cards, now, daily_new_cap),
        }
    }

    pub fn queue(&self) -> &ReviewQueueManager {
        &self.queue
    }

    /// Study until the queue runs dry or the learner quits
    ///
    /// `clock` is read when a card is revealed, at each grade, and after each
    /// recorded review; the event time is when the learner answered.
    pub fn run(
        &mut self,
        input: &mut impl BufRead,
        out: &mut impl Write,
        mut clock: impl FnMut() -> DateTime<Utc>,
    ) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();

        while let Some(card) = self.queue.next_card() {
            let counts = self.queue.queue_counts();
            writeln!(out)?;
            writeln!(
                out,
                "{} {}",
                format!(
                    "[learning {} | review {} | new {}]",
                    counts.learning_due, counts.review_due, counts.new_available
                )
                .dimmed(),
                card.phase.to_string().yellow()
            )?;
            writeln!(out, "{}", card.word.white().bold())?;
            write!(out, "{}", "Press Enter to reveal (q to quit) ".dimmed())?;
            out.flush()?;
            if let Reply::Quit = read_reply(input)? {
                summary.quit = true;
                break;
            }

            if !card.definition.is_empty() {
                writeln!(out, "  {}", card.definition)?;
            }
            if !card.example.is_empty() {
                writeln!(out, "  {}", card.example.italic())?;
            }

            self.queue.advance_clock(clock());
            match self.scheduler.preview(&card, self.queue.now()) {
                Ok(preview) => {
                    let options: Vec<String> = Rating::ALL
                        .iter()
                        .map(|r| {
                            format!("{} {} ({})", r.as_i32(), r.as_str(), format_wait(preview.get(*r)))
                        })
                        .collect();
                    writeln!(out, "  {}", options.join("   ").cyan())?;
                }
                Err(e) => {
                    tracing::warn!(card_id = %card.card_id, error = %e, "Preview failed");
                    writeln!(out, "  {} {} - review not recorded", "✗".red(), e)?;
                }
            }

            loop {
                write!(out, "{}", "Grade: ".bold())?;
                out.flush()?;
                let grade = match read_reply(input)? {
                    Reply::Quit => {
                        summary.quit = true;
                        break;
                    }
                    Reply::Line(grade) => grade,
                };

                self.queue.advance_clock(clock());
                match self.storage.submit_grade(
                    self.scheduler,
                    &card,
                    &grade,
                    Some(self.user_id),
                    Some(self.queue.now()),
                    None,
                ) {
                    Ok(submitted) => {
                        let outcome = &submitted.outcome;
                        summary.reviewed += 1;
                        if !outcome.diagnostics.success {
                            summary.lapses += 1;
                        }
                        writeln!(
                            out,
                            "  {} next in {}",
                            "✓".green(),
                            format_wait(outcome)
                        )?;
                        self.queue.record_outcome(outcome);
                        self.queue.advance_clock(clock());
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(card_id = %card.card_id, grade = %grade, error = %e, "Grade rejected");
                        summary.rejected += 1;
                        writeln!(out, "  {} {} - review not recorded", "✗".red(), e)?;
                    }
                }
            }
            if summary.quit {
                break;
            }
        }

        tracing::info!(
            reviewed = summary.reviewed,
            lapses = summary.lapses,
            rejected = summary.rejected,
            quit = summary.quit,
            "Study session finished"
        );
        if !summary.quit {
            if self.queue.is_exhausted() {
                writeln!(out, "\n{}", "Nothing left to study today.".green())?;
            } else if let Some(due) = self.queue.next_due_at() {
                writeln!(
                    out,
                    "\n{} {}",
                    "Next card due at".dimmed(),
                    due.format("%Y-%m-%d %H:%M UTC")
                )?;
            }
        }
        Ok(summary)
    }
}
