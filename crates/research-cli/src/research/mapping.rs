//! JSON-shaped GPT queries and row-by-row model mapping over tables

use anyhow::Result;
use research_core::{clean_extract_json, LanguageModel};
use serde_json::{Map, Value};
use tracing::debug;

use super::{QueryOptions, Table};
use crate::template::format_template;

const COMPACT_ANSWER: &str = "\nReturn your answer as a compact JSON object, formatted as a single line with no unnecessary spaces or newlines, in the following structure: ";

/// Ask for a list of answers in one call, each shaped like `json_template`.
///
/// A response without an `answer` list yields an empty list.
pub async fn gpt_list_json(
    llm: &mut dyn LanguageModel,
    prompt: &str,
    json_template: &str,
    options: QueryOptions,
) -> Result<Vec<Value>> {
    let full_prompt = format!(
        "{prompt}{COMPACT_ANSWER}{{'answer': [{json_template}, {json_template}, ...]}}"
    );
    let response = llm.call_gpt4(options.json_request(full_prompt)).await?;
    let parsed = clean_extract_json(&response)?;

    Ok(match parsed.get("answer") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

/// Ask for a list of plain answers, returned as `[{key: answer}, ...]`
pub async fn gpt_list(
    llm: &mut dyn LanguageModel,
    prompt: &str,
    key: &str,
    options: QueryOptions,
) -> Result<Vec<Value>> {
    let element = format!("{{'item_number':INTEGER, '{key}':ITEM}}");
    let items = gpt_list_json(llm, prompt, &element, options).await?;

    Ok(items
        .into_iter()
        .map(|item| {
            let mut entry = Map::new();
            entry.insert(key.to_string(), item.get(key).cloned().unwrap_or(Value::Null));
            Value::Object(entry)
        })
        .collect())
}

/// Ask for a single JSON answer shaped like `json_template`
pub async fn gpt_json(
    llm: &mut dyn LanguageModel,
    prompt: &str,
    json_template: &str,
    options: QueryOptions,
) -> Result<Value> {
    let full_prompt = format!("{prompt}{COMPACT_ANSWER}{{'answer': {json_template}}}");
    let response = llm.call_gpt4(options.json_request(full_prompt)).await?;
    let parsed = clean_extract_json(&response)?;
    Ok(parsed.get("answer").cloned().unwrap_or(Value::Null))
}

/// Fill `prompt_template` from each row, ask `model`, store answers in `output_col`
pub async fn map_dataframe(
    llm: &mut dyn LanguageModel,
    table: &mut Table,
    prompt_template: &str,
    output_col: &str,
    model: &str,
) -> Result<()> {
    let mut responses = Vec::with_capacity(table.len());
    for row in table.iter() {
        let prompt = format_template(prompt_template, row)?;
        responses.push(llm.call_llm(&prompt, model).await?);
    }

    for (row, response) in table.iter_mut().zip(responses) {
        row.insert(output_col.to_string(), Value::String(response));
    }
    debug!(rows = table.len(), model, "Mapped table through model");
    Ok(())
}

/// Fill `prompt_template` from each row, ask GPT for a JSON answer shaped
/// like `json_template`, and merge the answer's keys into the row
pub async fn map_dataframe_json(
    llm: &mut dyn LanguageModel,
    table: &mut Table,
    prompt_template: &str,
    json_template: &str,
) -> Result<()> {
    for row in table.iter_mut() {
        let prompt = format_template(prompt_template, row)?;
        let answer = gpt_json(llm, &prompt, json_template, QueryOptions::default()).await?;
        // Non-object answers add no columns
        if let Value::Object(fields) = answer {
            row.extend(fields);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::table_from_value;
    use crate::research::testing::ScriptedModel;
    use serde_json::json;

    #[tokio::test]
    async fn test_gpt_list_extracts_key() {
        let mut llm = ScriptedModel::new([
            r#"{"answer":[{"item_number":1,"question":"What is 53 + 22?"},{"item_number":2,"question":"What is 47 + 36?"}]}"#,
        ]);
        let items = gpt_list(&mut llm, "Generate 2 addition questions.", "question", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(
            items,
            vec![json!({"question": "What is 53 + 22?"}), json!({"question": "What is 47 + 36?"})]
        );

        let prompt = &llm.requests[0].prompts[0];
        assert!(prompt.starts_with("Generate 2 addition questions.\nReturn your answer as a compact JSON object"));
        assert!(prompt.ends_with(
            "{'answer': [{'item_number':INTEGER, 'question':ITEM}, {'item_number':INTEGER, 'question':ITEM}, ...]}"
        ));
        assert_eq!(llm.requests[0].format, research_core::ResponseFormat::JsonObject);
    }

    #[tokio::test]
    async fn test_gpt_list_json_without_answer_is_empty() {
        let mut llm = ScriptedModel::new(["{}"]);
        let items = gpt_list_json(&mut llm, "Give me names", "{'name':NAME}", QueryOptions::default())
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_gpt_json() {
        let mut llm = ScriptedModel::new([r#"{" answer": {"first_name": "Barack", "age": 61}}"#]);
        let answer = gpt_json(
            &mut llm,
            "What is Obama's first name and age?",
            "{'first_name':FIRST_NAME, 'age':INTEGER}",
            QueryOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(answer, json!({"first_name": "Barack", "age": 61}));
    }

    #[tokio::test]
    async fn test_map_dataframe() {
        let mut llm = ScriptedModel::new(["2", "4"]);
        let mut table =
            table_from_value(json!([{"question": "What is 1 + 1?"}, {"question": "What is 2 + 2?"}]))
                .unwrap();

        map_dataframe(&mut llm, &mut table, "Answer this question: {question}", "answer", "olmo")
            .await
            .unwrap();

        assert_eq!(table[0]["answer"], "2");
        assert_eq!(table[1]["answer"], "4");
        assert_eq!(llm.questions[1], ("Answer this question: What is 2 + 2?".to_string(), "olmo".to_string()));
        assert_eq!(llm.counters.olmo, 2);
    }

    #[tokio::test]
    async fn test_map_dataframe_missing_column_fails() {
        let mut llm = ScriptedModel::default();
        let mut table = table_from_value(json!([{"question": "x"}])).unwrap();
        let result = map_dataframe(&mut llm, &mut table, "{answer}", "out", "gpt4").await;
        assert!(result.is_err());
        assert!(llm.questions.is_empty());
    }

    #[tokio::test]
    async fn test_map_dataframe_json_merges_keys() {
        let mut llm = ScriptedModel::new([
            r#"{"answer": {"score10": 10, "justification": "Correct."}}"#,
            r#"{"answer": {"score10": 3, "justification": "Off by one."}}"#,
        ]);
        let mut table = table_from_value(json!([
            {"question": "What is the sum of 34 and 21?", "answer": "55"},
            {"question": "Add 58 and 36 together.", "answer": "93"}
        ]))
        .unwrap();

        map_dataframe_json(
            &mut llm,
            &mut table,
            "Score the answer:\nQuestion: {question}\nAnswer: {answer}",
            "{'score10': INTEGER, 'justification': JUSTIFICATION}",
        )
        .await
        .unwrap();

        assert_eq!(table[0]["score10"], 10);
        assert_eq!(table[1]["justification"], "Off by one.");
        assert_eq!(table[1]["question"], "Add 58 and 36 together.");
    }
}
