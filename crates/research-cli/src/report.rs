//! Research report writer
//!
//! The whole research dialog is handed back to the model, which writes the
//! report one section at a time. Each section's question and answer are
//! appended to a private copy of the dialog so later sections see earlier
//! ones.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use research_core::text::{remove_html_markup, replace_special_chars_with_ascii};
use research_core::{GptRequest, LanguageModel};
use tracing::info;

use crate::session::ResearchSession;
use crate::template::substitute;

const HTML_TEMPLATE: &str = include_str!("../templates/report_template.html");
const TXT_TEMPLATE: &str = include_str!("../templates/report_template.txt");

const REPORT_INTRO: &str = "I'm now going to ask you to write a report about the research conducted, section by section.
Before starting, think about what the main conclusions are that you want the report to make, and plan the report contents accordingly so the report is coherent.
The experiments should describe pertinent results supporting the conclusions.
The analysis should describe analytical reflections about the results, for example describing interesting categories of problem/task that provide interesting insights.
As a preview, the report will contain the following sections:
 - title
 - abstract
 - introduction
 - approach
 - results
 - analysis
 - conclusion
I'll now ask you for each section in turn. Just provide the information for the section that I ask for, and nothing else. Do not provide other sections until prompted.
Let's begin!
";

const REPORT_SECTIONS: [(&str, &str); 7] = [
    ("title", "First, create a title for the report."),
    (
        "abstract",
        "Write an abstract for the report. State the goal, then the approach, then the findings, then a statement about the significance of the work.",
    ),
    (
        "introduction",
        "Write an introduction. Describe the motivation for the work, then give an overview of what was done, and finally the main findings.",
    ),
    ("approach", "Describe the approach used in detail."),
    ("results", "Describe the experimental results that were obtained."),
    (
        "analysis",
        "Write an analysis of the results. Provide illustrative examples in the analysis to make your points clear.",
    ),
    ("conclusion", "Summarize conclusions of the research, in particular the main findings."),
];

/// Files written by [`write_report`]
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub stem: String,
    pub html: PathBuf,
    pub txt: PathBuf,
}

fn section_prompt(index: usize, section: &str, instruction: &str) -> String {
    let mut prompt = String::new();
    if index == 0 {
        prompt.push_str(REPORT_INTRO);
    }
    prompt.push_str(instruction);
    prompt.push_str(&format!(
        "\nReturn exactly and only the {section}, so it can be directly included in the report. Do not return any additional justification or explanation.\n"
    ));
    prompt.push_str(
        "If you do any formatting, use HTML markup rather than Markdown (md) markup. e.g., for a numbered list, use <ol><li>...<li>...</ol>.",
    );
    prompt
}

fn preview(text: &str) -> String {
    text.chars().take(70).collect()
}

/// Write `<output>/<filename>_<MM-DD-YYYY_HH.MM>.{html,txt}` and remember the stem.
///
/// The queries, response previews and final text go to `out`.
pub async fn write_report(
    llm: &mut dyn LanguageModel,
    session: &mut ResearchSession,
    filename: &str,
    out: &mut String,
) -> Result<ReportPaths> {
    let mut report_dialog = session.dialog().to_vec();
    let mut parameters: Vec<(&str, String)> = Vec::new();

    out.push_str("\nGenerating report using GPT:\n\n");
    for (index, (section, instruction)) in REPORT_SECTIONS.iter().enumerate() {
        let prompt = section_prompt(index, section, instruction);
        out.push_str("------------ Query -----------------------\n");
        out.push_str(&format!("{}\n", prompt));
        out.push_str("---------- GPT Response ------------------\n");
        report_dialog.push(prompt);

        let response = llm.call_gpt4(GptRequest::new(report_dialog.clone())).await?;
        let response = replace_special_chars_with_ascii(&response);
        out.push_str(&format!("{}...\n", preview(&response)));
        report_dialog.push(response.clone());
        parameters.push((*section, response));
    }

    let now = Local::now();
    let notes = format!(
        "{}\nRuntime: {} minutes.\n",
        llm.counters().summary(),
        session.runtime_minutes()
    );
    let title_len = parameters
        .first()
        .map(|(_, title)| title.chars().count())
        .unwrap_or_default();
    parameters.push(("notes", notes));
    parameters.push(("date", now.format("%m-%d-%Y %H:%M:%S").to_string()));
    parameters.push(("underline", "=".repeat(title_len)));

    let stem = format!("{}_{}", filename, now.format("%m-%d-%Y_%H.%M"));
    let (html, txt) = render_report(&parameters)?;

    let output_dir = session.output_dir().to_path_buf();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let html_path = output_dir.join(format!("{stem}.html"));
    let txt_path = output_dir.join(format!("{stem}.txt"));
    fs::write(&html_path, html).with_context(|| format!("Failed to write {}", html_path.display()))?;
    fs::write(&txt_path, &txt).with_context(|| format!("Failed to write {}", txt_path.display()))?;
    info!(stem = %stem, "Report written");

    session.last_report_stem = Some(stem.clone());

    out.push_str(&format!("{}\n{}\n", txt, "=".repeat(70)));

    Ok(ReportPaths {
        stem,
        html: html_path,
        txt: txt_path,
    })
}

/// HTML from the section texts as given; text with markup stripped
fn render_report(parameters: &[(&str, String)]) -> Result<(String, String)> {
    let vars: Vec<(&str, &str)> = parameters
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();
    let html = substitute(HTML_TEMPLATE, &vars)?;

    let plain: Vec<(&str, String)> = parameters
        .iter()
        .map(|(name, value)| (*name, remove_html_markup(value)))
        .collect();
    let vars: Vec<(&str, &str)> = plain
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();
    let txt = substitute(TXT_TEMPLATE, &vars)?;

    Ok((html, txt))
}
