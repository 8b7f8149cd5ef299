//! Host functions: the research toolkit generated code calls into
//!
//! The Python session forwards calls such as `map_dataframe(...)` here by
//! name. Tables arrive as lists of records and updated tables are returned
//! the same way for the session to write back into the caller's object.

use std::path::PathBuf;

use anyhow::{bail, Result};
use async_trait::async_trait;
use research_core::{GptRequest, LanguageModel, ResponseFormat};
use serde_json::{json, Value};
use tracing::debug;

use crate::executor::{CallArgs, HostHandler};
use crate::research::{self, table_to_value, CategoryColumns, QueryOptions, SignalColumns};
use crate::session::ResearchSession;
use crate::{files, report, trace};

/// Model access plus the session the agent and generated code share
pub struct Workbench {
    pub llm: Box<dyn LanguageModel>,
    pub session: ResearchSession,
    http: reqwest::Client,
    /// Console text from host functions, handed back to the running code
    printed: String,
}

impl Workbench {
    pub fn new(llm: Box<dyn LanguageModel>, session: ResearchSession) -> Self {
        Self {
            llm,
            session,
            http: reqwest::Client::new(),
            printed: String::new(),
        }
    }

    /// Send `prompt` after the running dialog in JSON mode, recording both
    /// the prompt and the response in the dialog
    pub async fn ask(&mut self, prompt: String) -> Result<String> {
        self.session.push(prompt);
        let request = GptRequest::new(self.session.dialog().to_vec()).json();
        let response = self.llm.call_gpt4(request).await?;
        self.session.push(response.clone());
        Ok(response)
    }

    /// Fresh dialog and zeroed call counters
    pub fn reset(&mut self) {
        self.session.reset();
        self.llm.reset();
    }

    /// Show the dialog to the running code, or write it to `<output>/<stem>.txt`
    pub fn trace(
        &mut self,
        dialog: Option<&[String]>,
        show_system_prompt: bool,
        stem: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let dialog = dialog.unwrap_or(self.session.dialog());
        match stem {
            Some(stem) => Ok(Some(trace::write_trace(
                self.session.output_dir(),
                stem,
                dialog,
                show_system_prompt,
            )?)),
            None => {
                let text = trace::format_dialog(dialog, show_system_prompt);
                self.printed.push_str(&text);
                Ok(None)
            }
        }
    }
}

fn query_options(args: &CallArgs, first: usize) -> QueryOptions {
    let defaults = QueryOptions::default();
    QueryOptions {
        use_history: args.bool_or(first, "use_history", defaults.use_history),
        temperature: args.f32_or(first + 1, "temperature", defaults.temperature),
        cache: args.bool_or(first + 2, "cache", defaults.cache),
    }
}

fn string_list(value: Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => bail!("expected a string, got {}", other),
            })
            .collect(),
        other => bail!("expected a string or list of strings, got {}", other),
    }
}

fn response_format(name: Option<String>) -> Result<ResponseFormat> {
    match name.as_deref() {
        None | Some("text") => Ok(ResponseFormat::Text),
        Some("json_object") => Ok(ResponseFormat::JsonObject),
        Some(other) => bail!("response_format must be 'text' or 'json_object', not '{}'", other),
    }
}

#[async_trait]
impl HostHandler for Workbench {
    async fn call(&mut self, function: &str, args: CallArgs) -> Result<Value> {
        debug!(function, "Host function");
        let llm = self.llm.as_mut();

        match function {
            "call_llm" => {
                let question = args.str(0, "question")?;
                let model = args.opt_str(1, "model").unwrap_or_else(|| "gpt4".to_string());
                Ok(json!(llm.call_llm(&question, &model).await?))
            }
            "call_gpt4" => {
                let prompts = string_list(args.value(0, "prompts")?)?;
                let request = GptRequest::new(prompts)
                    .with_format(response_format(args.opt_str(1, "response_format"))?)
                    .with_temperature(args.f32_or(2, "temperature", 0.0))
                    .with_cache(args.bool_or(3, "cache", true))
                    .with_history(args.bool_or(4, "use_history", false));
                Ok(json!(llm.call_gpt4(request).await?))
            }
            "gpt_list" => {
                let items = research::gpt_list(
                    llm,
                    &args.str(0, "prompt")?,
                    &args.str(1, "key")?,
                    query_options(&args, 2),
                )
                .await?;
                Ok(Value::Array(items))
            }
            "gpt_list_json" => {
                let items = research::gpt_list_json(
                    llm,
                    &args.str(0, "prompt")?,
                    &args.str(1, "json_template")?,
                    query_options(&args, 2),
                )
                .await?;
                Ok(Value::Array(items))
            }
            "gpt_json" => {
                research::gpt_json(
                    llm,
                    &args.str(0, "prompt")?,
                    &args.str(1, "json_template")?,
                    query_options(&args, 2),
                )
                .await
            }
            "is_in_category" => {
                let score = research::is_in_category(
                    llm,
                    &args.str(0, "statement")?,
                    &args.str(1, "cat_title")?,
                    &args.str(2, "cat_description")?,
                    &mut self.printed,
                )
                .await?;
                Ok(json!(score))
            }
            "place_items_in_categories" => {
                let mut dataset = args.table(0, "dataset")?;
                let categories = args.table(1, "categories")?;
                let columns = CategoryColumns {
                    data_obj_col: args.str(2, "data_obj_col")?,
                    data_cat_col: args.str(3, "data_cat_col")?,
                    cat_title_col: args.str(4, "cat_title_col")?,
                    cat_description_col: args.str(5, "cat_description_col")?,
                };
                research::place_items_in_categories(
                    llm,
                    &mut dataset,
                    &categories,
                    &columns,
                    &mut self.printed,
                )
                .await?;
                Ok(table_to_value(dataset))
            }
            "score_categories" => {
                let dataset = args.table(0, "dataset")?;
                let mut categories = args.table(1, "categories")?;
                research::score_categories(
                    &dataset,
                    &mut categories,
                    &args.str(2, "data_cat_col")?,
                    &args.str(3, "data_metric_col")?,
                    &args.str(4, "cat_score_col")?,
                )?;
                Ok(table_to_value(categories))
            }
            "add_signal" => {
                let mut categories = args.table(0, "categories")?;
                let columns = SignalColumns {
                    score_col: args.str(1, "score_col")?,
                    adj_score_col: args.str(2, "adj_score_col")?,
                    signal_col: args.str(3, "signal_col")?,
                    adj_signal_col: args.str(4, "adj_signal_col")?,
                };
                research::add_signal(&mut categories, &columns)?;
                Ok(table_to_value(categories))
            }
            "map_dataframe" => {
                let mut table = args.table(0, "dataframe")?;
                let model = args.opt_str(3, "model").unwrap_or_else(|| "gpt4".to_string());
                research::map_dataframe(
                    llm,
                    &mut table,
                    &args.str(1, "prompt_template")?,
                    &args.str(2, "output_col")?,
                    &model,
                )
                .await?;
                Ok(table_to_value(table))
            }
            "map_dataframe_json" => {
                let mut table = args.table(0, "dataframe")?;
                research::map_dataframe_json(
                    llm,
                    &mut table,
                    &args.str(1, "prompt_template")?,
                    &args.str(2, "json_template")?,
                )
                .await?;
                Ok(table_to_value(table))
            }
            "write_report" => {
                let filename = args.opt_str(0, "filename").unwrap_or_else(|| "report".to_string());
                let paths = report::write_report(llm, &mut self.session, &filename, &mut self.printed).await?;
                debug!(html = %paths.html.display(), txt = %paths.txt.display(), "Report files");
                Ok(json!(paths.stem))
            }
            "dialog" => {
                let dialog = match args.get(0, "dialog") {
                    Some(value) => Some(string_list(value.clone())?),
                    None => None,
                };
                self.trace(
                    dialog.as_deref(),
                    args.bool_or(1, "show_system_prompt", false),
                    args.opt_str(2, "output_filestem").as_deref(),
                )?;
                Ok(Value::Null)
            }
            "read_file_contents" => {
                let path = PathBuf::from(args.str(0, "filename")?);
                Ok(json!(files::read_file_contents(&path, &mut self.printed)?))
            }
            "download_file" => {
                let url = args.str(0, "url")?;
                let filepath = PathBuf::from(args.str(1, "filepath")?);
                let saved = files::download_file(&self.http, &url, &filepath, &mut self.printed).await;
                Ok(json!(saved.map(|p| p.display().to_string())))
            }
            "convert_pdf_to_text" => {
                let filestem = args.str(0, "filestem")?;
                let directory = PathBuf::from(args.str(1, "directory")?);
                files::convert_pdf_to_text(&filestem, &directory, &mut self.printed).await;
                Ok(Value::Null)
            }
            other => bail!("unknown host function '{}'", other),
        }
    }

    fn take_printed(&mut self) -> String {
        std::mem::take(&mut self.printed)
    }
}
