//! Research utilities callable from generated code
//!
//! Tables are lists of records (JSON objects), the shape a pandas DataFrame
//! takes with `to_json(orient="records")`.

pub mod categorize;
pub mod mapping;
pub mod scoring;

use anyhow::{anyhow, Result};
use research_core::GptRequest;
use serde_json::{Map, Value};

pub use categorize::{is_in_category, place_items_in_categories, CategoryColumns};
pub use mapping::{gpt_json, gpt_list, gpt_list_json, map_dataframe, map_dataframe_json};
pub use scoring::{add_signal, score_categories, SignalColumns};

pub type Record = Map<String, Value>;
pub type Table = Vec<Record>;

/// Options shared by the GPT query helpers
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub use_history: bool,
    pub temperature: f32,
    pub cache: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_history: false,
            temperature: 0.0,
            cache: true,
        }
    }
}

impl QueryOptions {
    /// A JSON-mode request for `prompt` with these options
    pub fn json_request(&self, prompt: String) -> GptRequest {
        GptRequest::prompt(prompt)
            .json()
            .with_history(self.use_history)
            .with_temperature(self.temperature)
            .with_cache(self.cache)
    }
}

pub fn table_from_value(value: Value) -> Result<Table> {
    match value {
        Value::Array(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| match row {
                Value::Object(record) => Ok(record),
                other => Err(anyhow!("row {} is not a record: {}", i, other)),
            })
            .collect(),
        other => Err(anyhow!("expected a list of records, got {}", other)),
    }
}

pub fn table_to_value(table: Table) -> Value {
    Value::Array(table.into_iter().map(Value::Object).collect())
}

/// Numeric reading of a cell; booleans count as 0/1
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use research_core::{CallCounters, GptRequest, LanguageModel, LlmError};

    /// Model double that replays canned answers and records prompts
    #[derive(Default)]
    pub struct ScriptedModel {
        pub answers: VecDeque<String>,
        pub requests: Vec<GptRequest>,
        pub questions: Vec<(String, String)>,
        pub counters: CallCounters,
        pub resets: usize,
    }

    impl ScriptedModel {
        pub fn new<I, S>(answers: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                answers: answers.into_iter().map(Into::into).collect(),
                ..Default::default()
            }
        }

        fn next_answer(&mut self) -> String {
            self.answers.pop_front().unwrap_or_else(|| "{}".to_string())
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn call_gpt4(&mut self, request: GptRequest) -> Result<String, LlmError> {
            self.counters.gpt += 1;
            self.requests.push(request);
            Ok(self.next_answer())
        }

        async fn call_llm(&mut self, question: &str, model: &str) -> Result<String, LlmError> {
            match model {
                "olmo" => self.counters.olmo += 1,
                "llama" | "mistral" => self.counters.together += 1,
                _ => self.counters.gpt += 1,
            }
            self.questions.push((question.to_string(), model.to_string()));
            Ok(self.next_answer())
        }

        fn counters(&self) -> CallCounters {
            self.counters
        }

        fn reset(&mut self) {
            self.counters = CallCounters::default();
            self.resets += 1;
        }
    }
}
