//! Prompt templates for each agent mode
//!
//! Templates use `{name}` placeholders filled from the agent state; literal
//! braces in the JSON reply formats are doubled.

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

use super::state::{AgentState, Mode};
use crate::template::format_template;

pub const PLAN_PROMPT: &str = r#"
Okay! We are ready to get started on a new research task!

Your top-level research task is: {task}

YOUR NEXT INSTRUCTION: generate a plan to perform this research. Return your plan as a JSON object with the following structure:
{{"plan": [{{"step_number":1, "step":DESCRIPTION}}, {{"step_number":2, "step":DESCRIPTION}}, ....]}}
"#;

pub const REPLAN_PROMPT: &str = r#"
As a reminder, your top-level research task is: {task}

According to your last reflection, it looks like the current plan isn't working.

YOUR NEXT INSTRUCTION: Generate a revised plan to perform the research task.
Do not repeat steps that already succeeded: the new plan should continue from the current state of the research rather than start from scratch.
Variables and data structures from the earlier execution are still available and can be reused.
The old plan will be discarded and work continues with your revised plan.

Return your revised plan as a JSON object with the following structure:
{{"plan": [{{"step_number":1, "step":DESCRIPTION}}, {{"step_number":2, "step":DESCRIPTION}}, ....]}}
"#;

pub const FIRST_ACTION_PROMPT: &str = r#"
As a reminder, your top-level research task is: {task}

Here is the current plan we are following:
{formatted_plan}

We will start with the first step, step {step_number}: {step_description}

YOUR NEXT INSTRUCTION: Generate Python code that implements this step. I'll then execute it and show you the results.
Return your answer as a JSON object of the form:
      {{"thought":THOUGHT, "action":PYTHON_CODE}}
"#;

pub const NEXT_ACTION_PROMPT: &str = r#"
As a reminder, your top-level research task is: {task}

Here is the current plan we are following:
{formatted_plan}

We have successfully completed step number {prev_step_number}.
We will now move to step {step_number}: {step_description}

YOUR NEXT INSTRUCTION: Generate Python code that implements this step. I'll then execute it and show you the results.
Return your answer as a JSON object of the form:
      {{"thought":THOUGHT, "action":PYTHON_CODE}}
"#;

pub const CONTINUE_PROMPT: &str = r#"
As a reminder, your top-level research task is: {task}

Here is the current plan we are following:
{formatted_plan}

We are currently on step {step_number}: {step_description}

According to your last reflection, the step is only partially completed.

YOUR NEXT INSTRUCTION: Generate Python code that completes this step. I'll then execute it and show you the results.
Return your answer as a JSON object of the form:
      {{"thought":THOUGHT, "action":PYTHON_CODE}}
"#;

pub const DEBUG_PROMPT: &str = r#"
As a reminder, your top-level research task is: {task}

Here is the current plan we are following:
{formatted_plan}

We are currently on step {step_number}: {step_description}

According to your last reflection, there was a problem implementing/executing this step.

YOUR NEXT INSTRUCTION: Try again, and generate new Python code that implements this step. Take care
to avoid the problem that occurred last time. I'll then execute it and show you the results.
Return your answer as a JSON object of the form:
      {{"thought":THOUGHT, "action":PYTHON_CODE}}
"#;

pub const REFLECTION_PROMPT: &str = r#"
As a reminder, your top-level research task is: {task}

Here is the current plan we are following:
{formatted_plan}

We are currently on step {step_number}: {step_description}

YOUR NEXT INSTRUCTION: Perform a REFLECTION step to assess if top-level task is complete, the current plan step is complete, and what to do next.

Assess:
 - thought: Summarize the progress made so far in the research, and what to do next
 - task_complete: Have you achieved the top-level research task?
 - current_step_complete: Have you successfully completed the current step in the plan?
 - next_step_type:
     - If task_complete is true, then 'exit'
     - If current_step_complete is true, then 'next_step'
     - If the current step was only partially completed, then 'continue'
     - If there was a Python error, and it seems fixable, then 'debug'
     - If you seem to be stuck, looping, or going around in circles, then 'retry'

Return the results as a JSON structure of the form:
   {{"thought": STRING, "task_complete": BOOLEAN, "current_step_complete": BOOLEAN, "next_step_type": one of 'exit', 'next_step', 'continue', 'debug', or 'retry'}}
"#;

/// System prompt used when no `agent.system_prompt_file` is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a research assistant that performs research by writing and running Python code.

You work in a loop. First you make a plan. Then, for each step of the plan, you write Python code, I execute it in a persistent Python session and show you the output, and you reflect on whether the step and the overall task are complete.

Variables you define persist between steps. pandas is available as `pd` when installed. Tables are pandas DataFrames or lists of dicts.

In addition to standard Python, the following research functions are available:

call_llm(question, model='gpt4')
    Ask a language model a question and return its answer as a string. model is one of 'gpt4', 'olmo', 'llama', 'mistral'.
call_gpt4(prompts, response_format='text')
    Query GPT with a prompt or a list of prompts. response_format is 'text' or 'json_object'.
gpt_list(prompt, key)
    Get a list of answers in one call, returned as [{key: ANSWER}, ...].
gpt_list_json(prompt, json_template)
    Get a list of JSON answers in one call, each shaped like json_template.
gpt_json(prompt, json_template)
    Get a single JSON answer shaped like json_template.
map_dataframe(dataframe, prompt_template, output_col, model='gpt4')
    For every row, fill prompt_template from the row's columns ({column} placeholders), query the model, and store the answer in output_col.
map_dataframe_json(dataframe, prompt_template, json_template)
    Like map_dataframe, but collect a JSON answer per row and add each of its keys as a column.
is_in_category(statement, cat_title, cat_description)
    Score 0-1 how well a statement fits a category.
place_items_in_categories(dataset, categories, data_obj_col=..., data_cat_col=..., cat_title_col=..., cat_description_col=...)
    Score every dataset row against every category, storing [{'index': i, 'score': s}, ...] in data_cat_col.
score_categories(dataset, categories, data_cat_col=..., data_metric_col=..., cat_score_col=...)
    Average data_metric_col over the rows in each category, adding n_covered and f_covered columns.
add_signal(categories, score_col, adj_score_col, signal_col, adj_signal_col)
    Compare each category's score with the overall score in row 0.
write_report(filename='report')
    Write up the research conducted so far as HTML and text reports.
read_file_contents(filename), download_file(url, filepath), convert_pdf_to_text(filestem, directory)
    Work with source documents.

Always reply with a single JSON object in exactly the format you are asked for."#;

fn template_for(state: &AgentState) -> Result<(&'static str, String)> {
    let step = state.step_label();
    let (template, title) = match state.mode {
        Mode::Plan => (PLAN_PROMPT, "Generate Initial Plan".to_string()),
        Mode::Replan => (REPLAN_PROMPT, "Replan Task".to_string()),
        Mode::Act => {
            let template = if state.step_number == Some(1) {
                FIRST_ACTION_PROMPT
            } else {
                NEXT_ACTION_PROMPT
            };
            (template, format!("Perform Step {}: {}", step, state.step_description()))
        }
        Mode::Continue => (CONTINUE_PROMPT, format!("Continue Step {}", step)),
        Mode::Debug | Mode::Retry => (
            DEBUG_PROMPT,
            format!(
                "An error occurred doing step {}. Let's try and debug the problem and retry (retry number {}).",
                step,
                state.retries.count()
            ),
        ),
        Mode::Reflect => (REFLECTION_PROMPT, format!("Reflect on Step {}", step)),
        Mode::Done => bail!("no prompt for mode '{}'", state.mode),
    };
    Ok((template, title))
}

/// Banner for the iteration plus the mode's prompt
pub fn header_and_prompt(state: &AgentState) -> Result<(String, String)> {
    let (template, title) = template_for(state)?;
    let rule = "-".repeat(40);
    let header = format!("{rule}\n{}. {}\n{rule}\n", state.iteration, title);

    let mut vars = Map::new();
    vars.insert("task".into(), json!(state.task.as_deref().unwrap_or_default()));
    vars.insert("formatted_plan".into(), json!(state.formatted_plan()));
    vars.insert("step_number".into(), json!(state.step_label()));
    vars.insert("step_description".into(), json!(state.step_description()));
    vars.insert("prev_step_number".into(), json!(state.prev_step_number()));
    vars.insert("iteration".into(), Value::from(state.iteration));
    vars.insert("mode".into(), json!(state.mode.as_str()));

    let prompt = format_template(template, &vars)?;
    Ok((header, prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{AgentConfig, PlanStep};

    fn state_in(mode: Mode, step: Option<usize>) -> AgentState {
        let mut state = AgentState::new(Some("Add numbers".into()), false, &AgentConfig::default());
        state.mode = mode;
        state.step_number = step;
        state.iteration = 4;
        state.plan = vec![
            PlanStep { step_number: 1, step: "Make data".into() },
            PlanStep { step_number: 2, step: "Score it".into() },
        ];
        state
    }

    #[test]
    fn test_plan_prompt() {
        let (header, prompt) = header_and_prompt(&state_in(Mode::Plan, None)).unwrap();
        let rule = "-".repeat(40);
        assert_eq!(header, format!("{rule}\n4. Generate Initial Plan\n{rule}\n"));
        assert!(prompt.contains("Your top-level research task is: Add numbers"));
        assert!(prompt.contains(r#"{"plan": [{"step_number":1, "step":DESCRIPTION}"#));
    }

    #[test]
    fn test_act_uses_first_then_next_prompt() {
        let (header, prompt) = header_and_prompt(&state_in(Mode::Act, Some(1))).unwrap();
        assert!(header.contains("4. Perform Step 1: Make data"));
        assert!(prompt.contains("We will start with the first step, step 1: Make data"));
        assert!(prompt.contains("1. Make data\n2. Score it\n"));

        let (_, prompt) = header_and_prompt(&state_in(Mode::Act, Some(2))).unwrap();
        assert!(prompt.contains("We have successfully completed step number 1."));
        assert!(prompt.contains("We will now move to step 2: Score it"));
    }

    #[test]
    fn test_debug_header_shows_retry_number() {
        let mut state = state_in(Mode::Debug, Some(2));
        state.retries.record();
        let (header, prompt) = header_and_prompt(&state).unwrap();
        assert!(header.contains(
            "4. An error occurred doing step 2. Let's try and debug the problem and retry (retry number 1)."
        ));
        assert!(prompt.contains("there was a problem implementing/executing this step"));
    }

    #[test]
    fn test_reflect_and_continue_headers() {
        let (header, prompt) = header_and_prompt(&state_in(Mode::Reflect, Some(2))).unwrap();
        assert!(header.contains("4. Reflect on Step 2"));
        assert!(prompt.contains(r#""next_step_type": one of 'exit'"#));

        let (header, _) = header_and_prompt(&state_in(Mode::Continue, Some(1))).unwrap();
        assert!(header.contains("4. Continue Step 1"));
    }

    #[test]
    fn test_missing_step_falls_back() {
        let (header, _) = header_and_prompt(&state_in(Mode::Act, Some(9))).unwrap();
        assert!(header.contains("Perform Step 9: (no current step)"));
    }

    #[test]
    fn test_done_has_no_prompt() {
        assert!(header_and_prompt(&state_in(Mode::Done, None)).is_err());
    }
}
