//! Placeholder substitution for prompts and report templates
//!
//! Two syntaxes are in use:
//! - `{name}` with `{{`/`}}` escapes, for prompt templates filled from
//!   agent state or table rows
//! - `$name` / `${name}` with `$$` escape, for report and scoring templates
//!   whose bodies contain literal JSON braces

use std::sync::OnceLock;

use anyhow::{bail, Result};
use regex::{Captures, Regex};
use serde_json::{Map, Value};

/// Render a value the way it should read inside a prompt
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

/// Fill `{name}` placeholders from `vars`.
///
/// Unknown names and unbalanced braces are errors.
pub fn format_template(template: &str, vars: &Map<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => bail!("unclosed '{{' in template"),
                    }
                }
                match vars.get(name.as_str()) {
                    Some(value) => out.push_str(&display_value(value)),
                    None => bail!("template placeholder {{{}}} has no value", name),
                }
            }
            '}' => bail!("single '}}' encountered in template"),
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Fill `$name` and `${name}` placeholders from `vars`; `$$` is a literal `$`.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$(?:(\$)|([_a-zA-Z][_a-zA-Z0-9]*)|\{([_a-zA-Z][_a-zA-Z0-9]*)\})")
            .expect("static regex")
    });

    let mut missing = None;
    let rendered = re.replace_all(template, |caps: &Captures| {
        if caps.get(1).is_some() {
            return "$".to_string();
        }
        let name = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        bail!("template variable ${} has no value", name);
    }
    Ok(rendered.into_owned())
}
