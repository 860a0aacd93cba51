//! Output formatting for the CLI

use clap::ValueEnum;
use colored::Colorize;
use dataobjects_core::{ObjectKind, Row, path};
use dataobjects_engine::PageResult;
use serde::Serialize;
use serde_json::{Value, json};

/// How command results are printed
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored, human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Printed output of a command and whether it succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub output: String,
    pub success: bool,
}

impl Report {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

/// Outcome of building one configured object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub error: Option<String>,
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| format!("{{\"error\": \"{err}\"}}"))
}

pub fn objects(objects: &[(ObjectKind, String)], format: OutputFormat) -> Report {
    match format {
        OutputFormat::Json => {
            let list: Vec<Value> = objects
                .iter()
                .map(|(kind, id)| json!({"type": kind, "objectID": id}))
                .collect();
            Report::ok(pretty(&list))
        }
        OutputFormat::Text => {
            let mut lines: Vec<String> = objects
                .iter()
                .map(|(kind, id)| format!("{:<5} {}", kind.as_str().cyan(), id))
                .collect();
            lines.push(format!("{} objects", objects.len()).dimmed().to_string());
            Report::ok(lines.join("\n"))
        }
    }
}

pub fn descriptor(descriptor: &Value, format: OutputFormat) -> Report {
    if format == OutputFormat::Json {
        return Report::ok(pretty(descriptor));
    }
    let object = &descriptor["objectProperties"];
    let mut lines = vec![format!(
        "{} ({})",
        path::display(&object["objectID"]).bold(),
        path::display(&object["objectType"])
    )];
    if let Some(Value::Object(fields)) = descriptor.get("fields") {
        for (id, field) in fields {
            lines.push(format!(
                "  {:<20} {:<12} {}",
                id,
                path::display(&field["fieldType"]).yellow(),
                path::display(&field["fieldName"])
            ));
        }
    }
    if let Some(Value::Array(menu)) = descriptor.get("menu") {
        let names: Vec<String> = menu.iter().map(|entry| path::display(&entry["name"])).collect();
        if !names.is_empty() {
            lines.push(format!("  menu: {}", names.join(", ")));
        }
    }
    Report::ok(lines.join("\n"))
}

pub fn page(columns: &[String], page: &PageResult, format: OutputFormat) -> Report {
    let success = page.is_success();
    let output = match format {
        OutputFormat::Json => pretty(page),
        OutputFormat::Text if !success => format!(
            "{} {}",
            "error:".red().bold(),
            page.message.as_deref().unwrap_or("request failed")
        ),
        OutputFormat::Text => {
            let mut lines = vec![columns.join(" | ").bold().to_string()];
            for row in &page.data {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|column| path::display(&row[column.as_str()]))
                    .collect();
                lines.push(cells.join(" | "));
            }
            lines.push(
                format!(
                    "{} rows, {} of {} records",
                    page.data.len(),
                    page.records_filtered,
                    page.records_total
                )
                .dimmed()
                .to_string(),
            );
            lines.join("\n")
        }
    };
    Report { output, success }
}

pub fn record(values: &Row, format: OutputFormat) -> Report {
    match format {
        OutputFormat::Json => Report::ok(pretty(values)),
        OutputFormat::Text => Report::ok(
            values
                .iter()
                .map(|(key, value)| format!("{}: {}", key.bold(), path::display(value)))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
    }
}

pub fn check(results: &[CheckResult], format: OutputFormat) -> Report {
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let output = match format {
        OutputFormat::Json => pretty(&results),
        OutputFormat::Text => {
            let mut lines: Vec<String> = results
                .iter()
                .map(|result| {
                    let name = format!("{}.{}", result.kind, result.object_id);
                    match &result.error {
                        None => format!("{} {name}", "✓".green()),
                        Some(error) => format!("{} {name}: {error}", "✗".red()),
                    }
                })
                .collect();
            lines.push(format!("{} objects, {failed} failed", results.len()));
            lines.join("\n")
        }
    };
    Report {
        output,
        success: failed == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataobjects_engine::PageState;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_page_fails_report() {
        let page = PageResult {
            object_id: "users".into(),
            draw: 1,
            data: vec![],
            records_total: 0,
            records_filtered: 0,
            record_sums: IndexMap::new(),
            state: PageState::Error,
            message: Some("Query error: boom".into()),
            trace: vec![],
        };
        let report = super::page(&[], &page, OutputFormat::Text);
        assert!(!report.success);
        assert!(report.output.contains("Query error: boom"));
    }

    #[test]
    fn test_check_counts_failures() {
        let results = vec![
            CheckResult {
                kind: ObjectKind::List,
                object_id: "a".into(),
                error: None,
            },
            CheckResult {
                kind: ObjectKind::Form,
                object_id: "b".into(),
                error: Some("bad".into()),
            },
        ];
        let report = check(&results, OutputFormat::Text);
        assert!(!report.success);
        assert!(report.output.ends_with("2 objects, 1 failed"));
        assert_eq!(check(&results[..1], OutputFormat::Json).success, true);
    }
}
