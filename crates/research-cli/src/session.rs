//! Research session state shared by the agent and host functions

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Dialog and bookkeeping for the current research task.
///
/// The dialog is a flat list: element 0 is the system prompt, then agent
/// prompts and model responses alternate.
#[derive(Debug)]
pub struct ResearchSession {
    system_prompt: String,
    dialog: Vec<String>,
    started_at: Instant,
    /// Stem of the last report written, reused for the trace file name
    pub last_report_stem: Option<String>,
    output_dir: PathBuf,
}

impl ResearchSession {
    pub fn new(system_prompt: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            dialog: vec![system_prompt.clone()],
            system_prompt,
            started_at: Instant::now(),
            last_report_stem: None,
            output_dir: output_dir.into(),
        }
    }

    /// Start over with only the system prompt in the dialog
    pub fn reset(&mut self) {
        self.dialog.clear();
        self.dialog.push(self.system_prompt.clone());
        self.started_at = Instant::now();
        self.last_report_stem = None;
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.dialog.push(entry.into());
    }

    pub fn dialog(&self) -> &[String] {
        &self.dialog
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whole minutes since the session started, rounded
    pub fn runtime_minutes(&self) -> u64 {
        (self.started_at.elapsed().as_secs_f64() / 60.0).round() as u64
    }
}
