//! Terminal input for research tasks and step-mode commands

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

// ANSI colors
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const TASK_PROMPT: &str = "----------------------------------------\n\nWhat is the next research task you'd like me to do (or 'q' to quit)? End with a blank line";

const STEP_PROMPT: &str =
    "Press <return> to continue, 'q' to quit, 'a' for auto mode, or enter a Python function> ";

/// What the user asked for between iterations in step mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepCommand {
    Continue,
    Quit,
    Auto,
    /// Python to run in the agent's session before asking again
    Code(String),
}

impl StepCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => StepCommand::Continue,
            "q" => StepCommand::Quit,
            "a" => StepCommand::Auto,
            _ => StepCommand::Code(line.to_string()),
        }
    }
}

/// Source of user input for the agent
pub trait UserInput {
    /// Next research task, or `None` to quit
    fn read_task(&mut self) -> Result<Option<String>>;

    fn read_step_command(&mut self) -> Result<StepCommand>;
}

/// Read lines until a blank line ends the input.
///
/// A blank first line re-prompts with `Please enter something!`. A lone
/// `q` on any line, or end of input, quits (`None`).
pub fn multiline_input<F>(intro: &str, mut read_line: F) -> Result<Option<String>>
where
    F: FnMut(&str) -> Result<Option<String>>,
{
    println!("{}", intro);
    let mut lines: Vec<String> = Vec::new();

    loop {
        let prompt = if lines.is_empty() { "> " } else { "" };
        let Some(line) = read_line(prompt)? else {
            return Ok(None);
        };

        if line.trim().eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        if line.trim().is_empty() {
            if !lines.is_empty() {
                break;
            }
            println!("Please enter something!");
            println!("{}", intro);
            continue;
        }
        lines.push(line);
    }

    Ok(Some(lines.join("\n")))
}

/// Line editor on the controlling terminal
pub struct TerminalInput {
    editor: DefaultEditor,
}

impl TerminalInput {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }

    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}^C{}", DIM, RESET);
                Ok(None)
            }
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl UserInput for TerminalInput {
    fn read_task(&mut self) -> Result<Option<String>> {
        let intro = format!("{}{}{}", CYAN, TASK_PROMPT, RESET);
        multiline_input(&intro, |prompt| self.read_line(prompt))
    }

    fn read_step_command(&mut self) -> Result<StepCommand> {
        Ok(match self.read_line(STEP_PROMPT)? {
            Some(line) => StepCommand::parse(&line),
            None => StepCommand::Quit,
        })
    }
}
