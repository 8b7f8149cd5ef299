//! Plan, act, reflect loop

use anyhow::{bail, Context, Result};
use chrono::Local;
use research_core::clean_extract_json;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::executor::{execute_action, ExecOutput, Interpreter};
use crate::host::Workbench;
use crate::input::{StepCommand, UserInput};
use crate::progress::Spinner;
use crate::template::display_value;

use super::prompts::header_and_prompt;
use super::state::{AgentConfig, AgentState, Mode, NextStep, PlanStep, RetryDecision};

// ANSI colors
const GREEN: &str = "\x1b[92m";
const BLUE: &str = "\x1b[94m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

const SEPARATOR: &str = "----------------------------------------";

/// The research agent: drives a model through planning, coding and
/// reflection until the task is done
pub struct ResearchAgent {
    workbench: Workbench,
    interpreter: Box<dyn Interpreter>,
    input: Box<dyn UserInput>,
    config: AgentConfig,
    /// Numbers the `In [n]:` transcript entries for the current task
    cell_number: usize,
}

impl ResearchAgent {
    pub fn new(
        workbench: Workbench,
        interpreter: Box<dyn Interpreter>,
        input: Box<dyn UserInput>,
        config: AgentConfig,
    ) -> Self {
        Self {
            workbench,
            interpreter,
            input,
            config,
            cell_number: 1,
        }
    }

    /// Run the loop.
    ///
    /// With a task, performs it and returns. Interactive sessions ask for a
    /// new task whenever the current one is done, until the user quits.
    #[instrument(skip(self, task))]
    pub async fn run(&mut self, task: Option<String>, interactive: bool) -> Result<()> {
        info!(
            has_task = task.is_some(),
            max_iterations = self.config.max_iterations,
            "Starting research agent"
        );
        let mut state = AgentState::new(task, interactive, &self.config);

        loop {
            state.iteration += 1;
            debug!(iteration = state.iteration, mode = %state.mode, "Starting iteration");

            if !state.auto && self.pause(&mut state).await? {
                return Ok(());
            }

            if state.iteration > self.config.max_iterations {
                let observation = format!(
                    "Yikes!!! Exceeded MAX_ITERATIONS ({}) steps! Giving up!",
                    self.config.max_iterations
                );
                warn!(iterations = state.iteration, "Iteration limit reached");
                println!("{}{}{}", YELLOW, observation, RESET);
                state.observations.push_str(&observation);
                state.mode = Mode::Done;
            }

            if state.mode == Mode::Done && state.interactive {
                match self.input.read_task()? {
                    Some(task) => state = self.start_task(task, state.auto).await?,
                    None => {
                        self.finish(&mut state);
                        return Ok(());
                    }
                }
            }

            if state.mode == Mode::Done {
                self.finish(&mut state);
                return Ok(());
            }

            let (header, mode_prompt) = header_and_prompt(&state)?;
            let prompt = format!("{}{}{}", state.observations, header, mode_prompt);
            print!("{}{}{}", BLUE, header, RESET);

            if let Err(e) = self.step(&mut state, prompt).await {
                warn!(error = %e, mode = %state.mode, "Research step failed");
                let observation = format!("Error: {:#}\n", e);
                print!("{}{}{}", RED, observation, RESET);
                state.observations.push_str(&observation);
                state.mode = Mode::Done;
                if !state.interactive {
                    self.finish(&mut state);
                    return Err(e);
                }
            }
        }
    }

    /// Step mode prompt; returns true when the user quits
    async fn pause(&mut self, state: &mut AgentState) -> Result<bool> {
        loop {
            match self.input.read_step_command()? {
                StepCommand::Continue => return Ok(false),
                StepCommand::Quit => return Ok(true),
                StepCommand::Auto => {
                    state.auto = true;
                    return Ok(false);
                }
                StepCommand::Code(code) => self.run_user_code(&code).await,
            }
        }
    }

    async fn run_user_code(&mut self, code: &str) {
        match self.interpreter.execute(code, &mut self.workbench).await {
            Ok(ExecOutput { error: Some(e), .. }) => println!("Error executing command: {}", e),
            Ok(_) => {}
            Err(e) => {
                println!("Error executing command: {:#}", e);
                if let Err(e) = self.interpreter.restart().await {
                    warn!(error = %e, "Failed to restart interpreter");
                }
            }
        }
    }

    /// Fresh session for a new top-level task
    async fn start_task(&mut self, task: String, auto: bool) -> Result<AgentState> {
        info!(task_len = task.len(), "Starting new research task");
        self.workbench.reset();
        self.interpreter
            .restart()
            .await
            .context("Failed to restart the Python session")?;
        self.cell_number = 1;

        let mut state = AgentState::new(Some(task), true, &self.config);
        state.iteration = 1;
        state.auto = auto;

        let observation = format!(
            "{SEPARATOR}\n     START A NEW RESEARCH TASK\n{SEPARATOR}\n\nNew top-level task: {}\n\n",
            state.task.as_deref().unwrap_or_default()
        );
        println!("{}", observation);
        state.observations.push_str(&observation);
        Ok(state)
    }

    /// Leave the last observations in the dialog
    fn finish(&mut self, state: &mut AgentState) {
        self.workbench
            .session
            .push(std::mem::take(&mut state.observations));
    }

    async fn step(&mut self, state: &mut AgentState, prompt: String) -> Result<()> {
        match state.mode {
            Mode::Plan | Mode::Replan => self.create_plan(state, prompt).await,
            Mode::Act | Mode::Continue | Mode::Debug | Mode::Retry => {
                let (action, think_observations) = self.generate_action(prompt).await?;
                let act_observations = execute_action(
                    self.interpreter.as_mut(),
                    &mut self.workbench,
                    &mut self.cell_number,
                    action.as_deref(),
                )
                .await;
                state.observations = think_observations + &act_observations;
                state.mode = Mode::Reflect;
                Ok(())
            }
            Mode::Reflect => self.reflect(state, prompt).await,
            Mode::Done => bail!("nothing to do in mode '{}'", state.mode),
        }
    }

    /// Send a prompt in JSON mode and parse the reply
    async fn ask_model(&mut self, prompt: String) -> Result<Value> {
        let spinner = self
            .config
            .show_progress
            .then(|| Spinner::start("Waiting for the model..."));
        let response = self.workbench.ask(prompt).await;
        if let Some(spinner) = spinner {
            spinner.stop().await;
        }
        let response = response?;
        clean_extract_json(&response).context("Model reply was not valid JSON")
    }

    async fn create_plan(&mut self, state: &mut AgentState, prompt: String) -> Result<()> {
        println!("Planning...");
        let reply = self.ask_model(prompt).await?;
        let plan: Vec<PlanStep> = serde_json::from_value(reply.get("plan").cloned().unwrap_or_default())
            .context("Model reply has no usable 'plan' list")?;
        debug!(steps = plan.len(), "Plan created");

        state.plan = plan;
        println!("Current plan that you generated:\n{}", state.formatted_plan());
        state.observations.clear();
        state.mode = Mode::Act;
        state.step_number = Some(1);
        Ok(())
    }

    /// Ask for the next thought and code; returns the code and the
    /// observation echoing them back
    async fn generate_action(&mut self, prompt: String) -> Result<(Option<String>, String)> {
        println!("Thinking...");
        let reply = self.ask_model(prompt).await?;
        let thought = field(&reply, "thought", Value::Null);
        let action = reply.get("action").filter(|a| !a.is_null()).map(display_value);

        let observations = format!(
            "\nYou said:\n\nThought: {}\nAction (code):\n{}\n\n{SEPARATOR}\n\n",
            thought,
            action.as_deref().unwrap_or("None")
        );
        println!("{}", observations);
        Ok((action, observations))
    }

    async fn reflect(&mut self, state: &mut AgentState, prompt: String) -> Result<()> {
        println!("Reflecting...");
        let reply = self.ask_model(prompt).await?;
        let thought = field(&reply, "thought", Value::Null);
        let task_complete = field(&reply, "task_complete", Value::Bool(false));
        let step_complete = field(&reply, "current_step_complete", Value::Bool(false));
        let next_step_type = field(&reply, "next_step_type", Value::from("exit"));

        let mut observations = format!(
            "\nYou said:\n\nThought: {}\nOverall task complete? {}\nCurrent step complete? {}\nNext step type: {}\n\n{SEPARATOR}\n\n",
            thought, task_complete, step_complete, next_step_type
        );
        println!("{}", observations);

        let next: NextStep = match next_step_type.parse() {
            Ok(next) => next,
            Err(e) => {
                println!(
                    "{}ERROR! Unrecognized next_step_type '{}'! Yikes!!{}",
                    RED, next_step_type, RESET
                );
                return Err(e);
            }
        };
        debug!(?next, step = %state.step_label(), "Reflection");

        let step = state.step_label();
        match next {
            NextStep::Exit => {
                let conclusion = format!(
                    "Research is done!!! Horray!\n{}\nRuntime: {} minutes.\n",
                    self.workbench.llm.counters().summary(),
                    self.workbench.session.runtime_minutes()
                );
                println!("{}{}{}", GREEN, conclusion, RESET);
                observations.push_str(&conclusion);

                let stem = match self.workbench.session.last_report_stem.take() {
                    Some(report) => format!("{report}-trace"),
                    None => format!("{}-trace", Local::now().format("%m-%d-%Y_%H.%M")),
                };
                if let Some(path) = self.workbench.trace(None, false, Some(&stem))? {
                    info!(path = %path.display(), "Research task complete");
                }
                state.mode = Mode::Done;
            }
            NextStep::NextStep => {
                let observation =
                    format!("Step {} complete. Moving onto the next step in the plan...\n", step);
                println!("{}", observation);
                observations.push_str(&observation);
                state.retries.reset();
                state.mode = Mode::Act;
                state.step_number = Some(state.step_number.map_or(1, |n| n + 1));
            }
            NextStep::Continue => {
                let observation =
                    format!("Step {} not yet complete. Let's continue to work on it...\n", step);
                println!("{}", observation);
                observations.push_str(&observation);
                state.retries.reset();
                state.mode = Mode::Continue;
            }
            NextStep::Debug | NextStep::Retry => match state.retries.record() {
                RetryDecision::Replan => {
                    let observation = format!(
                        "Too many retries! I seem to be stuck on step {}. Let's abandon this effort and replan.\n",
                        step
                    );
                    print!("{}{}{}", YELLOW, observation, RESET);
                    observations.push_str(&observation);
                    state.mode = Mode::Replan;
                }
                RetryDecision::Retry(attempt) => {
                    let observation = format!(
                        "An error occurred doing step {}. Let's try and debug the problem and retry (retry number {}).\n\n",
                        step, attempt
                    );
                    print!("{}{}{}", YELLOW, observation, RESET);
                    observations.push_str(&observation);
                    state.mode = if next == NextStep::Debug {
                        Mode::Debug
                    } else {
                        Mode::Retry
                    };
                }
            },
        }

        state.observations = observations;
        Ok(())
    }
}

/// A reply field rendered for the transcript, with a default when absent
fn field(reply: &Value, key: &str, default: Value) -> String {
    display_value(reply.get(key).unwrap_or(&default))
}
