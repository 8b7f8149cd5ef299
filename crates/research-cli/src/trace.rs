//! Readable transcripts of the research dialog

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

fn banner(out: &mut String, label: &str) {
    let rule = "=".repeat(70);
    out.push_str(&format!("{rule}\n\t\t\t{label}\n{rule}\n"));
}

/// Format a dialog with a banner before each turn.
///
/// The system prompt is replaced by a placeholder unless requested.
pub fn format_dialog(dialog: &[String], show_system_prompt: bool) -> String {
    let mut out = String::new();
    banner(&mut out, "SYSTEM PROMPT");
    out.push('\n');
    match dialog.first() {
        Some(system) if show_system_prompt => out.push_str(system),
        _ => out.push_str("...<system prompt>..."),
    }
    out.push_str("\n\n");

    for (i, turn) in dialog.iter().enumerate().skip(1) {
        banner(&mut out, if i % 2 == 1 { "AGENT" } else { "   MODEL" });
        out.push_str(turn);
        out.push('\n');
    }
    out
}

/// Write the formatted dialog to `<dir>/<stem>.txt`
pub fn write_trace(
    dir: &Path,
    stem: &str,
    dialog: &[String],
    show_system_prompt: bool,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{stem}.txt"));
    fs::write(&path, format_dialog(dialog, show_system_prompt))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Dialog trace written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialog() -> Vec<String> {
        ["You are smart.", "What is 1+1?", "2", "What is 2+3?"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_format_hides_system_prompt() {
        let text = format_dialog(&dialog(), false);
        let rule = "=".repeat(70);
        assert!(text.starts_with(&format!("{rule}\n\t\t\tSYSTEM PROMPT\n{rule}\n\n...<system prompt>...\n\n")));
        assert!(!text.contains("You are smart."));
        assert!(text.contains(&format!("\t\t\tAGENT\n{rule}\nWhat is 1+1?\n")));
        assert!(text.contains(&format!("\t\t\t   MODEL\n{rule}\n2\n")));
        assert!(text.ends_with("What is 2+3?\n"));
    }

    #[test]
    fn test_format_shows_system_prompt() {
        let text = format_dialog(&dialog(), true);
        assert!(text.contains("You are smart."));
    }

    #[test]
    fn test_write_trace() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let path = write_trace(&out, "olmo_01-02-2025_10.30-trace", &dialog(), false).unwrap();
        assert_eq!(path, out.join("olmo_01-02-2025_10.30-trace.txt"));
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, format_dialog(&dialog(), false));
    }
}
