//! Terminal feedback while waiting on the model

use std::io::{stdout, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

// ANSI escape codes
const CLEAR_LINE: &str = "\x1b[2K\r";
const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ASCII_SPINNER: &[&str] = &["|", "/", "-", "\\"];

/// Animated line shown while a model call is in flight.
///
/// Does nothing when stdout is not a terminal, so transcripts piped to a
/// file stay clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let handle = if stdout().is_terminal() {
            let message = message.into();
            let flag = running.clone();
            Some(tokio::spawn(async move {
                let frames = if supports_unicode() { SPINNER_FRAMES } else { ASCII_SPINNER };
                let mut tick = interval(Duration::from_millis(80));
                let mut idx = 0;

                print!("{}", HIDE_CURSOR);
                while flag.load(Ordering::SeqCst) {
                    print!("{}{}{} {}{}", CLEAR_LINE, CYAN, frames[idx], message, RESET);
                    let _ = stdout().flush();
                    idx = (idx + 1) % frames.len();
                    tick.tick().await;
                }
                print!("{}{}", CLEAR_LINE, SHOW_CURSOR);
                let _ = stdout().flush();
            }))
        } else {
            None
        };

        Self { running, handle }
    }

    /// Stop and erase the spinner line
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if self.handle.is_some() {
            print!("{}", SHOW_CURSOR);
            let _ = stdout().flush();
        }
    }
}

/// Count-based progress for loops over table rows
pub struct ProgressBar {
    total: usize,
    current: usize,
    message: String,
    width: usize,
}

impl ProgressBar {
    pub fn new(total: usize, message: impl Into<String>) -> Self {
        Self {
            total,
            current: 0,
            message: message.into(),
            width: 30,
        }
    }

    pub fn increment(&mut self) {
        self.current = (self.current + 1).min(self.total);
        self.render();
    }

    fn render(&self) {
        let filled = if self.total > 0 {
            self.width * self.current / self.total
        } else {
            0
        };
        let (fill, empty) = if supports_unicode() { ("█", "░") } else { ("#", "-") };
        print!(
            "{}{}{} [{}{}{}{}] {}/{}{}",
            CLEAR_LINE,
            DIM,
            self.message,
            CYAN,
            fill.repeat(filled),
            empty.repeat(self.width - filled),
            DIM,
            self.current,
            self.total,
            RESET
        );
        let _ = stdout().flush();
    }

    pub fn finish(&self) {
        if self.total > 0 {
            println!();
        }
    }
}

fn supports_unicode() -> bool {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .any(|val| val.to_lowercase().contains("utf"))
}
