//! Execution of model-generated code in a persistent interpreter session
//!
//! Generated actions are split into top-level statements using the
//! interpreter's own "is this input complete?" check, then executed one at a
//! time so each statement gets its own numbered transcript entry.

mod python;

pub use python::PythonInterpreter;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::research::{table_from_value, Table};

/// Result of asking the interpreter whether a source buffer is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Complete,
    Incomplete,
    Invalid,
}

/// Output of one executed statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    /// Everything the statement wrote to stdout/stderr
    pub output: String,
    /// Exception message if the statement raised
    pub error: Option<String>,
}

/// Arguments of a host function call made from generated code
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    /// Keyword argument `name`, else positional argument `index`
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.kwargs
            .get(name)
            .or_else(|| self.args.get(index))
            .filter(|value| !value.is_null())
    }

    pub fn value(&self, index: usize, name: &str) -> Result<Value> {
        self.get(index, name)
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument '{}'", name))
    }

    pub fn str(&self, index: usize, name: &str) -> Result<String> {
        match self.get(index, name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(anyhow!("argument '{}' must be a string, got {}", name, other)),
            None => Err(anyhow!("missing required argument '{}'", name)),
        }
    }

    pub fn opt_str(&self, index: usize, name: &str) -> Option<String> {
        self.get(index, name).and_then(Value::as_str).map(str::to_string)
    }

    pub fn bool_or(&self, index: usize, name: &str, default: bool) -> bool {
        self.get(index, name).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn f32_or(&self, index: usize, name: &str, default: f32) -> f32 {
        self.get(index, name)
            .and_then(Value::as_f64)
            .map(|f| f as f32)
            .unwrap_or(default)
    }

    pub fn table(&self, index: usize, name: &str) -> Result<Table> {
        table_from_value(self.value(index, name)?)
            .with_context(|| format!("argument '{}' must be a table", name))
    }
}

/// Answers host function calls issued by running code
#[async_trait]
pub trait HostHandler: Send {
    async fn call(&mut self, function: &str, args: CallArgs) -> Result<Value>;

    /// Console text produced by the last call, to be written to the
    /// running code's stdout
    fn take_printed(&mut self) -> String {
        String::new()
    }
}

/// A persistent interpreter session.
///
/// Implementations echo statement output to the console as it is produced
/// and return it in [`ExecOutput`]. `Err` from any method means the session
/// itself failed, not the user code.
#[async_trait]
pub trait Interpreter: Send {
    async fn check(&mut self, source: &str) -> Result<Completeness>;

    async fn execute(&mut self, source: &str, host: &mut dyn HostHandler) -> Result<ExecOutput>;

    /// Discard the session and start with a fresh namespace
    async fn restart(&mut self) -> Result<()>;
}

/// Split code into top-level statements.
///
/// Lines are added to a buffer one at a time; the buffer is emitted whenever
/// the interpreter reports it complete. Incomplete and invalid buffers keep
/// accumulating, and whatever is left at the end is emitted as a final
/// block so its error surfaces when it runs.
pub async fn split_statements(code: &str, interpreter: &mut dyn Interpreter) -> Result<Vec<String>> {
    let code = code.trim_start_matches('\n');
    let mut blocks = Vec::new();
    let mut buffer = String::new();

    for line in code.split('\n') {
        if buffer.is_empty() {
            buffer.push_str(line);
        } else {
            buffer.push('\n');
            buffer.push_str(line);
        }

        if interpreter.check(&buffer).await? == Completeness::Complete {
            blocks.push(std::mem::take(&mut buffer));
        }
    }

    if !buffer.trim().is_empty() {
        blocks.push(buffer);
    }

    blocks.retain(|block| !block.is_empty());
    debug!(blocks = blocks.len(), "Split action into statements");
    Ok(blocks)
}

/// Run an action statement by statement, returning the transcript.
///
/// `cell_number` numbers the `In [n]:` entries across the whole session.
pub async fn execute_action(
    interpreter: &mut dyn Interpreter,
    host: &mut dyn HostHandler,
    cell_number: &mut usize,
    action: Option<&str>,
) -> String {
    let mut observations = String::from("I'll now execute the actions (code) you suggested...\n\n");
    println!("{}", observations);

    let Some(action) = action else {
        let line = "Error: no action (code) was given\n";
        print!("{}", line);
        observations.push_str(line);
        return observations;
    };

    let blocks = match split_statements(action, interpreter).await {
        Ok(blocks) => blocks,
        Err(e) => {
            record_session_failure(interpreter, &mut observations, e).await;
            return observations;
        }
    };

    for block in blocks {
        let cell = format!("In [{}]: {}\n", cell_number, block);
        *cell_number += 1;
        print!("{}", cell);
        observations.push_str(&cell);

        match interpreter.execute(&block, host).await {
            Ok(result) => {
                observations.push_str(&result.output);
                match result.error {
                    None => {
                        println!();
                        observations.push('\n');
                    }
                    Some(error) => {
                        let line = format!("Error: {}\n", error);
                        print!("{}", line);
                        observations.push_str(&line);
                    }
                }
            }
            Err(e) => {
                record_session_failure(interpreter, &mut observations, e).await;
                break;
            }
        }
    }

    observations
}

async fn record_session_failure(
    interpreter: &mut dyn Interpreter,
    observations: &mut String,
    error: anyhow::Error,
) {
    warn!(error = %error, "Interpreter session failed, restarting");
    let line = format!(
        "Error: {:#}\n(The Python session was restarted; variables from earlier steps are gone.)\n",
        error
    );
    print!("{}", line);
    observations.push_str(&line);

    if let Err(e) = interpreter.restart().await {
        let line = format!("Error: could not restart Python: {:#}\n", e);
        print!("{}", line);
        observations.push_str(&line);
    }
}
