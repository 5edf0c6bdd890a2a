//! Summary table rendering

use std::fmt::Write as _;
use std::str::FromStr;

use dynasty_core::{DynastyError, Result, SummaryRow};

/// Shown in place of an undefined percentage
pub const UNDEFINED_MARKER: &str = "—";

/// Output format of the summary report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format: {other} (expected markdown or json)")),
        }
    }
}

/// Render rows in the given format
pub fn render(rows: &[SummaryRow], format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(rows)),
        ReportFormat::Json => render_json(rows),
    }
}

/// Markdown table, percentages to two decimals
pub fn render_markdown(rows: &[SummaryRow]) -> String {
    let mut out = String::from(
        "| group_key | political_ancestor_percentage | political_relation_percentage | subject_count |\n\
         |---|---:|---:|---:|\n",
    );

    for row in rows {
        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            escape_cell(&row.group_key),
            format_percentage(row.political_ancestor_percentage),
            format_percentage(row.political_relation_percentage),
            row.subject_count
        );
    }
    out
}

/// Pretty JSON array; undefined percentages become `null`
pub fn render_json(rows: &[SummaryRow]) -> Result<String> {
    serde_json::to_string_pretty(rows).map_err(|e| DynastyError::Other(e.into()))
}

/// Group labels are free text; a bare `|` would start a new column
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn format_percentage(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => UNDEFINED_MARKER.to_string(),
    }
}
