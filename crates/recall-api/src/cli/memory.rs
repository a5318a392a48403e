//! Memory CLI commands: record, summary, context, forget, prune.
//!
//! Styled output uses `console` and `comfy-table`; `--json` prints the
//! underlying data instead.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use recall_types::error::MemoryError;
use recall_types::llm::MessageRole;
use recall_types::memory::{Exchange, UserId};

use crate::state::AppState;

/// Record one exchange for a user and wait for fact extraction to finish.
///
/// # Examples
///
/// ```bash
/// recall record 1001 -p "my cat is called Miso" -r "What a lovely name!"
/// ```
pub async fn record(
    state: &AppState,
    user: &str,
    prompt: String,
    response: String,
    username: Option<&str>,
    json: bool,
) -> Result<()> {
    let user_id = UserId::from(user);
    let known: HashSet<String> = state
        .memory
        .summary(&user_id)
        .await
        .map(|s| s.notes.into_iter().map(|n| n.text).collect())
        .unwrap_or_default();

    state
        .memory
        .record_exchange(&user_id, Exchange::new(prompt, response), username)
        .await;

    // Extraction runs in the background.
    let spinner = (!json).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Extracting notes...");
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    });
    state.drain_extractions().await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let summary = state.memory.summary(&user_id).await?;
    let new_notes: Vec<_> = summary
        .notes
        .iter()
        .filter(|note| !known.contains(&note.text))
        .collect();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "userId": user_id,
                "historyCount": summary.history_count,
                "newNotes": new_notes,
            })
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} Recorded exchange for user {} ({} in history)",
        style("✓").green().bold(),
        style(&user_id).cyan(),
        style(summary.history_count).bold()
    );
    for note in &new_notes {
        println!("    {} {}", style("+").green(), note.text);
    }
    println!();

    Ok(())
}

/// Show everything remembered about a user.
pub async fn summary(state: &AppState, user: &str, json: bool) -> Result<()> {
    let user_id = UserId::from(user);
    let summary = match state.memory.summary(&user_id).await {
        Ok(summary) => summary,
        Err(MemoryError::NotFound(_)) => {
            if json {
                println!("null");
            } else {
                println!();
                println!(
                    "  {} Nothing remembered about user {}.",
                    style("i").blue().bold(),
                    style(&user_id).cyan()
                );
                println!();
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let who = match &summary.username {
        Some(name) => format!("{} ({})", style(name).cyan().bold(), summary.user_id),
        None => format!("{}", style(&summary.user_id).cyan().bold()),
    };

    println!();
    println!("  Memory for {who}");
    println!();
    println!(
        "  {} {}",
        style("Exchanges:").dim(),
        style(summary.history_count).bold()
    );
    println!(
        "  {} {}",
        style("Since:").dim(),
        summary.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "  {} {}",
        style("Updated:").dim(),
        summary.updated_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!();

    if summary.notes.is_empty() {
        println!("  {} No long-term notes yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Note").fg(Color::White),
        Cell::new("Remembered").fg(Color::White),
    ]);
    for note in &summary.notes {
        table.add_row(vec![
            Cell::new(&note.text).fg(Color::White),
            Cell::new(note.created_at.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "  {} note{}",
        style(summary.notes.len()).bold(),
        if summary.notes.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

/// Print the prompt context for a user's next completion request.
pub async fn context(state: &AppState, user: &str, json: bool) -> Result<()> {
    let user_id = UserId::from(user);
    let context = state.memory.context(&user_id).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    println!();
    if context.memory_block.is_empty() {
        println!("  {}", style("(no long-term notes)").dim());
    } else {
        for line in context.memory_block.lines() {
            println!("  {line}");
        }
    }
    println!();

    for message in &context.recent {
        let role = match message.role {
            MessageRole::User => style("user").green().bold(),
            MessageRole::Assistant => style("assistant").magenta().bold(),
            MessageRole::System => style("system").yellow().bold(),
        };
        println!("  {role}: {}", message.content);
    }
    if !context.recent.is_empty() {
        println!();
    }

    Ok(())
}

/// Delete everything remembered about a user.
pub async fn forget(state: &AppState, user: &str, force: bool, json: bool) -> Result<()> {
    let user_id = UserId::from(user);

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Forget everything about user {}? This cannot be undone.",
                style(&user_id).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let removed = state.memory.forget(&user_id).await;

    if json {
        println!(
            "{}",
            serde_json::json!({"userId": user_id, "forgotten": removed})
        );
    } else if removed {
        println!(
            "  {} Forgot user {}.",
            style("✓").green().bold(),
            style(&user_id).cyan()
        );
    } else {
        println!(
            "  {} Nothing remembered about user {}.",
            style("i").blue().bold(),
            style(&user_id).cyan()
        );
    }

    Ok(())
}

/// Remove expired long-term notes from every user.
pub async fn prune(state: &AppState, json: bool) -> Result<()> {
    let removed = state.memory.prune_all().await;
    let ttl_days = state.memory.config().note_ttl_days;

    if json {
        println!(
            "{}",
            serde_json::json!({"removed": removed, "ttlDays": ttl_days})
        );
    } else {
        println!(
            "  {} Removed {} note{} older than {} days.",
            style("✓").green().bold(),
            style(removed).bold(),
            if removed == 1 { "" } else { "s" },
            ttl_days
        );
    }

    Ok(())
}
