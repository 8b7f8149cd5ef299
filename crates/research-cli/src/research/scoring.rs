//! Per-category scores and their deviation from the overall score

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};

use super::{as_number, Table};

/// Prior weight (in rows) pulling small categories toward the overall score
const ADJUSTED_SCORE_BASIS: f64 = 10.0;

/// Membership above this counts a row as in the category
const MEMBERSHIP_THRESHOLD: f64 = 0.5;

/// Average `data_metric_col` over the rows belonging to each category.
///
/// Adds `cat_score_col`, `n_covered` and `f_covered` to every category row.
/// A category with no member rows scores 0.
pub fn score_categories(
    dataset: &Table,
    categories: &mut Table,
    data_cat_col: &str,
    data_metric_col: &str,
    cat_score_col: &str,
) -> Result<()> {
    let total = dataset.len();

    for (cat_index, category) in categories.iter_mut().enumerate() {
        let mut scores = Vec::new();
        for (row_index, row) in dataset.iter().enumerate() {
            let memberships = row
                .get(data_cat_col)
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("row {} has no '{}' list", row_index, data_cat_col))?;

            let member = memberships.iter().any(|m| {
                m.get("index").and_then(Value::as_u64) == Some(cat_index as u64)
                    && m.get("score").and_then(Value::as_f64).unwrap_or(0.0) > MEMBERSHIP_THRESHOLD
            });
            if member {
                let metric = row.get(data_metric_col).and_then(as_number).ok_or_else(|| {
                    anyhow!("row {} has no numeric '{}'", row_index, data_metric_col)
                })?;
                scores.push(metric);
            }
        }

        let n_covered = scores.len();
        let average = if n_covered > 0 {
            scores.iter().sum::<f64>() / n_covered as f64
        } else {
            0.0
        };
        let f_covered = if total > 0 {
            n_covered as f64 / total as f64
        } else {
            0.0
        };

        category.insert(cat_score_col.to_string(), json!(average));
        category.insert("n_covered".to_string(), json!(n_covered));
        category.insert("f_covered".to_string(), json!(f_covered));
    }

    Ok(())
}

/// Column names used by [`add_signal`]
#[derive(Debug, Clone)]
pub struct SignalColumns {
    pub score_col: String,
    pub adj_score_col: String,
    pub signal_col: String,
    pub adj_signal_col: String,
}

/// Compare each category's score with the overall score in row 0.
///
/// `signal` is the absolute difference from the overall score. The adjusted
/// score blends the category score with the overall score weighted by
/// [`ADJUSTED_SCORE_BASIS`] rows, so sparsely covered categories produce a
/// smaller adjusted signal.
pub fn add_signal(categories: &mut Table, columns: &SignalColumns) -> Result<()> {
    let Some(first) = categories.first() else {
        bail!("add_signal needs at least one category (row 0 is the overall score)");
    };
    let overall = first
        .get(&columns.score_col)
        .and_then(as_number)
        .ok_or_else(|| anyhow!("row 0 has no numeric '{}'", columns.score_col))?;

    for (index, category) in categories.iter_mut().enumerate() {
        let (adjusted, signal, adjusted_signal) = match category.get(&columns.score_col) {
            Some(Value::String(s)) if s == "?" => (json!("?"), 0.0, 0.0),
            value => {
                let score = value.and_then(as_number).ok_or_else(|| {
                    anyhow!("row {} has no numeric '{}'", index, columns.score_col)
                })?;
                let n_covered = category
                    .get("n_covered")
                    .and_then(as_number)
                    .ok_or_else(|| anyhow!("row {} has no 'n_covered'", index))?;

                let adjusted = (score * n_covered + overall * ADJUSTED_SCORE_BASIS)
                    / (n_covered + ADJUSTED_SCORE_BASIS);
                (json!(adjusted), (score - overall).abs(), (adjusted - overall).abs())
            }
        };

        category.insert(columns.adj_score_col.clone(), adjusted);
        category.insert(columns.signal_col.clone(), json!(signal));
        category.insert(columns.adj_signal_col.clone(), json!(adjusted_signal));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::table_from_value;

    fn approx(value: &Value, expected: f64) -> bool {
        (value.as_f64().unwrap() - expected).abs() < 1e-9
    }

    fn scored() -> (Table, Table) {
        let dataset = table_from_value(json!([
            {"question": "1+1?", "score": 1.0, "categories": [{"index": 0, "score": 1}, {"index": 1, "score": 1.0}, {"index": 2, "score": 0.0}]},
            {"question": "20+20?", "score": 1.0, "categories": [{"index": 0, "score": 1}, {"index": 1, "score": 0.0}, {"index": 2, "score": 1.0}]},
            {"question": "2+2?", "score": 0.0, "categories": [{"index": 0, "score": 1}, {"index": 1, "score": 1.0}, {"index": 2, "score": 0.0}]}
        ]))
        .unwrap();
        let categories = table_from_value(json!([
            {"title": "everything"},
            {"title": "Single digit addition"},
            {"title": "Two digit addition"},
            {"title": "Subtraction"}
        ]))
        .unwrap();
        (dataset, categories)
    }

    #[test]
    fn test_score_categories() {
        let (dataset, mut categories) = scored();
        score_categories(&dataset, &mut categories, "categories", "score", "score").unwrap();

        assert!(approx(&categories[0]["score"], 2.0 / 3.0));
        assert_eq!(categories[0]["n_covered"], 3);
        assert!(approx(&categories[0]["f_covered"], 1.0));

        assert!(approx(&categories[1]["score"], 0.5));
        assert_eq!(categories[1]["n_covered"], 2);

        assert!(approx(&categories[2]["score"], 1.0));
        assert!(approx(&categories[2]["f_covered"], 1.0 / 3.0));

        // No member rows
        assert!(approx(&categories[3]["score"], 0.0));
        assert_eq!(categories[3]["n_covered"], 0);
    }

    #[test]
    fn test_score_categories_requires_numeric_metric() {
        let (dataset, mut categories) = scored();
        assert!(score_categories(&dataset, &mut categories, "categories", "question", "score").is_err());
    }

    #[test]
    fn test_add_signal() {
        let (dataset, mut categories) = scored();
        score_categories(&dataset, &mut categories, "categories", "score", "score").unwrap();
        let columns = SignalColumns {
            score_col: "score".into(),
            adj_score_col: "adjusted_score".into(),
            signal_col: "signal".into(),
            adj_signal_col: "adjusted_signal".into(),
        };
        add_signal(&mut categories, &columns).unwrap();

        let overall = 2.0 / 3.0;
        assert!(approx(&categories[0]["signal"], 0.0));
        assert!(approx(&categories[0]["adjusted_score"], overall));

        // Two digit addition: score 1.0 over 1 row
        let adjusted = (1.0 * 1.0 + overall * 10.0) / 11.0;
        assert!(approx(&categories[2]["signal"], 1.0 - overall));
        assert!(approx(&categories[2]["adjusted_score"], adjusted));
        assert!(approx(&categories[2]["adjusted_signal"], adjusted - overall));
    }

    #[test]
    fn test_add_signal_unknown_score() {
        let mut categories = table_from_value(json!([
            {"score": 0.5, "n_covered": 4},
            {"score": "?", "n_covered": 0}
        ]))
        .unwrap();
        let columns = SignalColumns {
            score_col: "score".into(),
            adj_score_col: "adj".into(),
            signal_col: "sig".into(),
            adj_signal_col: "adj_sig".into(),
        };
        add_signal(&mut categories, &columns).unwrap();
        assert_eq!(categories[1]["adj"], "?");
        assert!(approx(&categories[1]["sig"], 0.0));

        assert!(add_signal(&mut Vec::new(), &columns).is_err());
    }
}
