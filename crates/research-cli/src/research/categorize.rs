//! Scoring how well items belong to categories

use anyhow::{anyhow, Result};
use research_core::{clean_extract_json, GptRequest, LanguageModel};
use serde_json::{json, Value};
use tracing::debug;

use super::{Record, Table};
use crate::progress::ProgressBar;
use crate::template::{display_value, substitute};

const CATEGORY_SCORE_PROMPT: &str = r#"
Given a statement (e.g., a question, a scenario description, an object description), and a general category, score how well that statement is a member of that category.
Return a number between 0 (the statement definitely does not fit the category) and 10 (the statement definitely is a member of the category).
If you are completely unsure, please return a question mark "?".
For example, if the statement is a question "What is 1 + 1?", and the category is "Questions involving simple addition", then the score would be 10, because the question is clearly a member of that category.

Let's do this now for the following statement and category:
Statement: ${STATEMENT}
Category: ${CATEGORY}

How well do you think this statement fits that category?
Please give a number between 0 (definitely does not fit) and 10 (definitely is a member of this category). If you are completely unsure, please return a question mark "?".
Please return the answer in a JSON structure of the form   {"score": SCORE}.
Some examples of the style of JSON to return are: {"score": "10"}, {"score": "3"}, or {"score": "?"}.
"#;

/// Score 0-1 how well `statement` fits a category.
///
/// The `everything` category always scores 1. An unsure model (`?`) scores
/// 0.5; an unreadable score is `None` and is reported to `out`.
pub async fn is_in_category(
    llm: &mut dyn LanguageModel,
    statement: &str,
    cat_title: &str,
    cat_description: &str,
    out: &mut String,
) -> Result<Option<f64>> {
    if cat_title.to_lowercase() == "everything" {
        return Ok(Some(1.0));
    }

    let prompt = substitute(
        CATEGORY_SCORE_PROMPT,
        &[("CATEGORY", cat_description), ("STATEMENT", statement)],
    )?;
    let request = GptRequest::prompt(prompt).json();
    let answer = clean_extract_json(&llm.call_gpt4(request).await?)?;

    let score = parse_score(answer.get("score"));
    if score.is_none() {
        out.push_str("Invalid input: Answer must be a number or '?'\n");
    }
    debug!(statement, cat_title, ?score, "Category membership");
    Ok(score)
}

fn parse_score(score: Option<&Value>) -> Option<f64> {
    match score? {
        Value::String(s) if s.trim() == "?" => Some(0.5),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|n| n / 10.0),
        Value::Number(n) => n.as_f64().map(|n| n / 10.0),
        _ => None,
    }
}

/// Column names used by [`place_items_in_categories`]
#[derive(Debug, Clone)]
pub struct CategoryColumns {
    /// Dataset column holding the items (e.g. questions)
    pub data_obj_col: String,
    /// Dataset column receiving `[{index, score}, ...]` membership lists
    pub data_cat_col: String,
    pub cat_title_col: String,
    pub cat_description_col: String,
}

fn column<'a>(row: &'a Record, name: &str) -> Result<&'a Value> {
    row.get(name).ok_or_else(|| anyhow!("missing column '{}'", name))
}

/// Score every dataset row against every category.
///
/// Memberships already present in a row are kept and not re-scored, so the
/// call can be repeated after adding categories.
pub async fn place_items_in_categories(
    llm: &mut dyn LanguageModel,
    dataset: &mut Table,
    categories: &Table,
    columns: &CategoryColumns,
    out: &mut String,
) -> Result<()> {
    let mut progress = ProgressBar::new(dataset.len() * categories.len(), "Categorizing");

    for row in dataset.iter_mut() {
        let statement = display_value(column(row, &columns.data_obj_col)?);
        let mut memberships = match row.get(&columns.data_cat_col) {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::new(),
        };

        for (cat_index, category) in categories.iter().enumerate() {
            progress.increment();
            let already_scored = memberships
                .iter()
                .any(|m| m.get("index").and_then(Value::as_u64) == Some(cat_index as u64));
            if already_scored {
                continue;
            }

            let title = display_value(column(category, &columns.cat_title_col)?);
            let description = display_value(column(category, &columns.cat_description_col)?);
            let score = is_in_category(llm, &statement, &title, &description, out).await?;
            memberships.push(json!({"index": cat_index, "score": score}));
        }

        row.insert(columns.data_cat_col.clone(), Value::Array(memberships));
    }

    progress.finish();
    Ok(())
}
