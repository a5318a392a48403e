//! Import/export CLI commands.
//!
//! Documents are JSON. Exports go to stdout unless `--output` is given;
//! imports read a file, or stdin when the path is `-`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use recall_types::memory::UserId;

use crate::state::AppState;

/// Export one user's memory.
pub async fn export_user(state: &AppState, user: &str, output: Option<&Path>) -> Result<()> {
    let user_id = UserId::from(user);
    let export = state
        .memory
        .export_user(&user_id)
        .await
        .with_context(|| format!("Cannot export user {user_id}"))?;
    write_document(&export, output).await
}

/// Replace one user's memory with the given document.
pub async fn import_user(state: &AppState, user: &str, file: &Path, json: bool) -> Result<()> {
    let user_id = UserId::from(user);
    let document = read_document(file).await?;
    state
        .memory
        .import_user(&user_id, &document)
        .await
        .with_context(|| format!("Cannot import memory for user {user_id}"))?;

    if json {
        println!("{}", serde_json::json!({"userId": user_id, "imported": true}));
    } else {
        println!(
            "  {} Imported memory for user {}.",
            style("✓").green().bold(),
            style(&user_id).cyan()
        );
    }
    Ok(())
}

/// Export every user's memory. Admin only.
pub async fn export_all(state: &AppState, caller: &str, output: Option<&Path>) -> Result<()> {
    let caller = UserId::from(caller);
    let export = state
        .memory
        .export_all(&caller)
        .await
        .context("Cannot export all memories")?;
    write_document(&export, output).await
}

/// Import a whole-store document. Admin only.
pub async fn import_all(state: &AppState, caller: &str, file: &Path, json: bool) -> Result<()> {
    let caller = UserId::from(caller);
    let document = read_document(file).await?;
    let count = state
        .memory
        .import_all(&caller, &document)
        .await
        .context("Cannot import memories")?;

    if json {
        println!("{}", serde_json::json!({"imported": count}));
    } else {
        println!(
            "  {} Imported memory for {} user{}.",
            style("✓").green().bold(),
            style(count).bold(),
            if count == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

async fn read_document(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read document from stdin")?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

async fn write_document<T: Serialize>(document: &T, output: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(document)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, rendered + "\n")
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "  {} Wrote {}",
                style("✓").green().bold(),
                style(path.display()).cyan()
            );
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("export.json");
        let doc = serde_json::json!({"userId": "7", "rollingHistory": []});

        write_document(&doc, Some(&path)).await.unwrap();
        let read = read_document(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&read).unwrap();
        assert_eq!(parsed, doc);
    }

    #[tokio::test]
    async fn test_read_missing_document_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.json");
        let err = read_document(&path).await.unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }

    #[tokio::test]
    async fn test_import_user_round_trip_through_files() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init(Some(tmp.path().to_path_buf())).await.unwrap();
        state
            .memory
            .merge_facts(&UserId::from("1"), &["Knits scarves".to_string()])
            .await;

        let path = tmp.path().join("one.json");
        export_user(&state, "1", Some(&path)).await.unwrap();
        import_user(&state, "2", &path, true).await.unwrap();

        let summary = state.memory.summary(&UserId::from("2")).await.unwrap();
        assert_eq!(summary.notes[0].text, "Knits scarves");
        state.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_export_all_requires_admin() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init(Some(tmp.path().to_path_buf())).await.unwrap();
        let err = export_all(&state, "not-an-admin", None).await.unwrap_err();
        assert!(format!("{err:#}").contains("not allowed"));
        state.shutdown().await.unwrap();
    }
}
