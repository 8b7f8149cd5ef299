//! Agent state management

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum iterations before giving up on a task
    pub max_iterations: usize,
    /// Debug/retry attempts on one step before replanning
    pub max_retries: usize,
    /// Auto mode (no pause between iterations)
    pub auto_mode: bool,
    /// Show a spinner while waiting on the model
    pub show_progress: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            max_retries: 3,
            auto_mode: true,
            show_progress: true,
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_retries(mut self, max: usize) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_auto_mode(mut self, auto: bool) -> Self {
        self.auto_mode = auto;
        self
    }

    pub fn with_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// What the agent does on the next iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Plan,
    Replan,
    Act,
    Continue,
    Debug,
    Retry,
    Reflect,
    Done,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Plan => "plan",
            Mode::Replan => "replan",
            Mode::Act => "act",
            Mode::Continue => "continue",
            Mode::Debug => "debug",
            Mode::Retry => "retry",
            Mode::Reflect => "reflect",
            Mode::Done => "done",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a model-generated plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(deserialize_with = "step_number_from_any")]
    pub step_number: usize,
    pub step: String,
}

/// Models send step numbers as `1`, `1.0` or `"1"`
fn step_number_from_any<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    number
        .map(|n| n as usize)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid step_number: {}", value)))
}

/// The reflection's verdict on what to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Exit,
    NextStep,
    Continue,
    Debug,
    Retry,
}

impl FromStr for NextStep {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exit" => Ok(NextStep::Exit),
            "next_step" => Ok(NextStep::NextStep),
            "continue" => Ok(NextStep::Continue),
            "debug" => Ok(NextStep::Debug),
            "retry" => Ok(NextStep::Retry),
            _ => anyhow::bail!("next_step_type should be one of 'exit|next_step|continue|debug|retry'"),
        }
    }
}

/// Outcome of recording a debug/retry request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try the step again; carries the retry number
    Retry(usize),
    /// Too many retries on this step
    Replan,
}

/// Counts debug/retry attempts on the current step.
///
/// Progress on the plan resets the count; replanning does not.
#[derive(Debug, Clone)]
pub struct RetryCounter {
    count: usize,
    max: usize,
}

impl RetryCounter {
    pub fn new(max: usize) -> Self {
        Self { count: 0, max }
    }

    pub fn record(&mut self) -> RetryDecision {
        if self.count >= self.max {
            RetryDecision::Replan
        } else {
            self.count += 1;
            RetryDecision::Retry(self.count)
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// State of the agent during a research task
#[derive(Debug, Clone)]
pub struct AgentState {
    pub task: Option<String>,
    pub mode: Mode,
    pub plan: Vec<PlanStep>,
    pub step_number: Option<usize>,
    pub iteration: usize,
    /// Text fed back to the model at the start of the next prompt
    pub observations: String,
    /// Run without pausing for the user between iterations
    pub auto: bool,
    /// Ask for a new task when the current one is done
    pub interactive: bool,
    pub retries: RetryCounter,
}

impl AgentState {
    pub fn new(task: Option<String>, interactive: bool, config: &AgentConfig) -> Self {
        Self {
            mode: if task.is_some() { Mode::Plan } else { Mode::Done },
            task,
            plan: Vec::new(),
            step_number: None,
            iteration: 0,
            observations: String::new(),
            auto: config.auto_mode,
            interactive,
            retries: RetryCounter::new(config.max_retries),
        }
    }

    /// Plan rendered as `N. step` lines
    pub fn formatted_plan(&self) -> String {
        self.plan
            .iter()
            .map(|step| format!("{}. {}\n", step.step_number, step.step))
            .collect()
    }

    pub fn step_description(&self) -> &str {
        self.step_number
            .and_then(|n| self.plan.iter().find(|step| step.step_number == n))
            .map(|step| step.step.as_str())
            .unwrap_or("(no current step)")
    }

    pub fn prev_step_number(&self) -> String {
        match self.step_number {
            Some(n) => (n as i64 - 1).to_string(),
            None => "?".to_string(),
        }
    }

    /// Current step number for display (`None` before planning)
    pub fn step_label(&self) -> String {
        match self.step_number {
            Some(n) => n.to_string(),
            None => "None".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retry_counter_replans_after_max() {
        let mut retries = RetryCounter::new(3);
        assert_eq!(retries.record(), RetryDecision::Retry(1));
        assert_eq!(retries.record(), RetryDecision::Retry(2));
        assert_eq!(retries.record(), RetryDecision::Retry(3));
        assert_eq!(retries.record(), RetryDecision::Replan);
        // Replanning leaves the count alone
        assert_eq!(retries.record(), RetryDecision::Replan);
        assert_eq!(retries.count(), 3);
    }

    #[test]
    fn test_retry_counter_reset() {
        let mut retries = RetryCounter::new(3);
        retries.record();
        retries.record();
        retries.reset();
        assert_eq!(retries.count(), 0);
        assert_eq!(retries.record(), RetryDecision::Retry(1));
    }

    #[test]
    fn test_next_step_parsing() {
        assert_eq!("next_step".parse::<NextStep>().unwrap(), NextStep::NextStep);
        assert_eq!("exit".parse::<NextStep>().unwrap(), NextStep::Exit);
        let err = "give_up".parse::<NextStep>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "next_step_type should be one of 'exit|next_step|continue|debug|retry'"
        );
    }

    #[test]
    fn test_plan_step_accepts_loose_numbers() {
        let plan: Vec<PlanStep> = serde_json::from_value(json!([
            {"step_number": 1, "step": "Generate a dataset"},
            {"step_number": "2", "step": "Ask OLMo"},
            {"step_number": 3.0, "step": "Score answers"}
        ]))
        .unwrap();
        assert_eq!(
            plan.iter().map(|s| s.step_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(serde_json::from_value::<PlanStep>(json!({"step_number": "x", "step": "?"})).is_err());
    }

    #[test]
    fn test_state_helpers() {
        let mut state = AgentState::new(Some("task".into()), false, &AgentConfig::default());
        assert_eq!(state.mode, Mode::Plan);
        assert_eq!(state.step_description(), "(no current step)");
        assert_eq!(state.prev_step_number(), "?");

        state.plan = vec![
            PlanStep { step_number: 1, step: "Generate a dataset".into() },
            PlanStep { step_number: 2, step: "Ask OLMo".into() },
        ];
        state.step_number = Some(2);
        assert_eq!(state.formatted_plan(), "1. Generate a dataset\n2. Ask OLMo\n");
        assert_eq!(state.step_description(), "Ask OLMo");
        assert_eq!(state.prev_step_number(), "1");

        state.step_number = Some(3);
        assert_eq!(state.step_description(), "(no current step)");
    }

    #[test]
    fn test_no_task_starts_done() {
        let state = AgentState::new(None, true, &AgentConfig::default());
        assert_eq!(state.mode, Mode::Done);
        assert_eq!(state.mode.to_string(), "done");
    }
}
