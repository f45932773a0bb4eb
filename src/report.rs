//! Output formatting for codefacts results.
//!
//! Supports two output formats:
//! - Text: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};

use crate::extract::{FactKind, FileFacts};
use crate::query::QueryCapture;
use crate::tree::Point;

/// Longest S-expression printed by `--tree` before it is cut off.
pub const MAX_TREE_DISPLAY: usize = 16 * 1024;

/// Facts for one analyzed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    #[serde(flatten)]
    pub facts: FileFacts,
}

/// A file that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

// =============================================================================
// Facts
// =============================================================================

/// JSON report for an analysis run.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub files_scanned: usize,
    pub files_with_syntax_errors: usize,
    pub files: Vec<FileReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
}

impl JsonReport {
    pub fn new(files: &[FileReport], skipped: &[SkippedFile]) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            files_scanned: files.len(),
            files_with_syntax_errors: files.iter().filter(|f| f.facts.has_syntax_errors).count(),
            files: files.to_vec(),
            skipped: skipped.to_vec(),
        }
    }
}

pub fn render_json(files: &[FileReport], skipped: &[SkippedFile]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport::new(files, skipped))?)
}

pub fn write_json(files: &[FileReport], skipped: &[SkippedFile]) -> anyhow::Result<()> {
    println!("{}", render_json(files, skipped)?);
    Ok(())
}

/// Render facts in text format.
pub fn render_text(files: &[FileReport], skipped: &[SkippedFile]) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "  {} v{}\n\n",
        "codefacts".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    ));

    for file in files {
        render_file(&mut out, file);
        out.push('\n');
    }

    if !skipped.is_empty() {
        out.push_str(&format!("  {} ({}):\n", "Skipped".dimmed(), skipped.len()));
        for s in skipped {
            out.push_str(&format!("    {}  {}\n", s.path.blue(), s.reason.dimmed()));
        }
        out.push('\n');
    }

    let with_errors = files.iter().filter(|f| f.facts.has_syntax_errors).count();
    let summary = format!("{} file(s) analyzed", files.len());
    if with_errors > 0 {
        out.push_str(&format!(
            "  {}  {}\n",
            summary,
            format!("{} with syntax errors", with_errors).red()
        ));
    } else {
        out.push_str(&format!("  {}  {}\n", summary, "no syntax errors".green()));
    }
    out
}

fn render_file(out: &mut String, file: &FileReport) {
    let facts = &file.facts;
    out.push_str(&format!(
        "  {} {}",
        file.path.blue().bold(),
        format!("({})", facts.language).dimmed()
    ));
    if facts.has_syntax_errors {
        out.push_str(&format!("  {}", "syntax errors".red()));
    }
    out.push('\n');

    for kind in FactKind::ALL {
        let values = facts.values(kind);
        if values.is_empty() {
            continue;
        }
        let label = format!("{}:", kind);
        if kind == FactKind::StringLiterals {
            out.push_str(&format!("    {:<17}{}\n", label.dimmed(), values.len()));
        } else {
            out.push_str(&format!("    {:<17}{}\n", label.dimmed(), values.join(", ")));
        }
    }
}

pub fn write_text(files: &[FileReport], skipped: &[SkippedFile]) {
    print!("{}", render_text(files, skipped));
}

// =============================================================================
// Ad-hoc queries
// =============================================================================

/// One capture from an ad-hoc `--query` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRow {
    pub path: String,
    pub pattern: usize,
    pub capture: String,
    pub kind: String,
    pub start: Point,
    pub end: Point,
    pub text: String,
}

impl CaptureRow {
    pub fn new(path: &str, pattern: usize, capture: &QueryCapture<'_>) -> Self {
        Self {
            path: path.to_string(),
            pattern,
            capture: capture.name.to_string(),
            kind: capture.node.kind().to_string(),
            start: capture.node.start_position(),
            end: capture.node.end_position(),
            text: capture.node.text().to_string(),
        }
    }
}

pub fn render_captures_json(rows: &[CaptureRow]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

pub fn render_captures_text(rows: &[CaptureRow]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!(
            "{}{}  {:<14} {}\n",
            row.path.blue(),
            format!(":{}", row.start).dimmed(),
            format!("@{}", row.capture).cyan(),
            first_line(&row.text)
        ));
    }
    out.push_str(&format!("{} capture(s)\n", rows.len()));
    out
}

fn first_line(text: &str) -> String {
    match text.split_once('\n') {
        Some((line, _)) => format!("{} ...", line),
        None => text.to_string(),
    }
}

// =============================================================================
// Trees
// =============================================================================

/// Cut `sexp` to at most [`MAX_TREE_DISPLAY`] bytes on a char boundary.
pub fn truncate_tree(sexp: &str) -> String {
    if sexp.len() <= MAX_TREE_DISPLAY {
        return sexp.to_string();
    }
    let mut end = MAX_TREE_DISPLAY;
    while !sexp.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} ... ({} bytes omitted)", &sexp[..end], sexp.len() - end)
}

pub fn write_tree(path: &str, sexp: &str) {
    println!("{}", path.blue().bold());
    println!("{}", truncate_tree(sexp));
}
