use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{OutputFormat, SearchResult};
use crate::services::ReconcileReport;

pub trait Formatter {
    fn format_search_result(&self, query: &str, result: &SearchResult) -> String;
    fn format_reconcile_report(&self, report: &ReconcileReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub root: String,
    pub project: i64,
    pub index_dir: String,
    pub index_exists: bool,
    pub entries: usize,
    pub documents_indexed: usize,
    pub documents_found: usize,
    pub dimension: Option<usize>,
    pub last_commit: Option<String>,
    pub embedding_url: String,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_result(&self, query: &str, result: &SearchResult) -> String {
        if result.is_empty() {
            return format!("No matches for: {}\n", query);
        }

        let mut output = String::new();
        writeln!(output, "Matches for: \"{}\"", query).unwrap();
        match (result.total_matches, result.truncated) {
            (Some(total), Some(true)) => {
                writeln!(output, "{} above threshold (more may exist)\n", total).unwrap()
            }
            (Some(total), _) => writeln!(output, "{} above threshold\n", total).unwrap(),
            _ => writeln!(output).unwrap(),
        }

        for (i, chunk) in result.matches.iter().enumerate() {
            writeln!(output, "{}. [Score: {:.3}]", i + 1, chunk.score).unwrap();
            writeln!(
                output,
                "   Location: {} [{}..{}]",
                chunk.document_name, chunk.begin, chunk.end
            )
            .unwrap();
            if let Some(ref section) = chunk.section {
                writeln!(output, "   Section: {}", section).unwrap();
            }
            writeln!(output, "   ---").unwrap();

            let preview: String = chunk.text.chars().take(200).collect();
            let preview = if chunk.text.chars().count() > 200 {
                format!("{}...", preview)
            } else {
                preview
            };
            for line in preview.lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_reconcile_report(&self, report: &ReconcileReport) -> String {
        let mut output = String::new();
        let title = match report.status {
            crate::services::ReconcileStatus::Completed => "Reconciliation Complete",
            crate::services::ReconcileStatus::Cancelled => "Reconciliation Cancelled",
        };
        writeln!(output, "{}", title).unwrap();
        writeln!(output, "{}", "-".repeat(title.len())).unwrap();
        writeln!(output, "Documents indexed:   {}", report.indexed).unwrap();
        writeln!(output, "Documents unindexed: {}", report.unindexed).unwrap();
        writeln!(output, "Documents skipped:   {}", report.skipped.len()).unwrap();
        writeln!(output, "Chunks added:        {}", report.chunks_added).unwrap();
        writeln!(output, "Duration:            {}ms", report.elapsed_ms).unwrap();
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();
        writeln!(output, "Directory:   {}", status.root).unwrap();
        writeln!(output, "Project:     {}", status.project).unwrap();
        writeln!(output, "Documents:   {}", status.documents_found).unwrap();
        writeln!(output).unwrap();

        let index_status = if status.index_exists {
            "[PRESENT]"
        } else {
            "[MISSING]"
        };
        writeln!(output, "Index:       {}", index_status).unwrap();
        writeln!(output, "  Path:      {}", status.index_dir).unwrap();
        if status.index_exists {
            writeln!(output, "  Entries:   {}", status.entries).unwrap();
            writeln!(output, "  Indexed:   {} documents", status.documents_indexed).unwrap();
            if let Some(dim) = status.dimension {
                writeln!(output, "  Dimension: {}", dim).unwrap();
            }
            if let Some(ref at) = status.last_commit {
                writeln!(output, "  Committed: {}", at).unwrap();
            }
        }
        writeln!(output).unwrap();
        writeln!(output, "Embedding:   {}", status.embedding_url).unwrap();

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_search_result(&self, query: &str, result: &SearchResult) -> String {
        let json = serde_json::json!({
            "query": query,
            "matches": result.matches,
            "total_matches": result.total_matches,
            "truncated": result.truncated,
        });
        self.render(&json)
    }

    fn format_reconcile_report(&self, report: &ReconcileReport) -> String {
        self.render(report)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
