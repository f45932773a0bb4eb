//! Command-line interface for codefacts.

use anyhow::Context;
use clap::Parser;
use globset::{Glob, GlobSet, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

use crate::config::{EngineConfig, DEFAULT_CONFIG_NAMES};
use crate::engine::{self, Engine};
use crate::grammar::treesitter::TreeSitterEngine;
use crate::language::Language;
use crate::query::{Query, QueryOptions};
use crate::report::{self, CaptureRow, FileReport, SkippedFile};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["node_modules", "vendor", "target", "build", "dist", "__pycache__"];

/// Extract structural facts from source code.
///
/// Codefacts parses each file with a tree-sitter grammar and reports the
/// classes, methods, fields, imports, package and string literals it
/// declares, and whether it contains syntax errors.
#[derive(Parser, Debug)]
#[command(name = "codefacts")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files or directories to analyze
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Treat every file as this language instead of detecting it by extension
    #[arg(short, long)]
    pub language: Option<String>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    pub format: String,

    /// Path to engine configuration YAML (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Glob of paths to skip (repeatable)
    #[arg(short, long = "exclude")]
    pub exclude: Vec<String>,

    /// Print each file's syntax tree instead of facts
    #[arg(long)]
    pub tree: bool,

    /// Run an ad-hoc query pattern and print its captures
    #[arg(short, long)]
    pub query: Option<String>,

    /// Exit with status 1 when any file has syntax errors
    #[arg(long)]
    pub fail_on_syntax_errors: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Find a configuration file in the working directory, then in the user's
/// config directory.
pub fn discover_config(cwd: &Path) -> Option<PathBuf> {
    for name in DEFAULT_CONFIG_NAMES {
        let path = cwd.join(name);
        if path.is_file() {
            return Some(path);
        }
    }
    directories::ProjectDirs::from("", "", "codefacts")
        .map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_NAMES[0]))
        .filter(|path| path.is_file())
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => discover_config(&std::env::current_dir()?),
    };
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            EngineConfig::parse_file(&path)
                .with_context(|| format!("loading configuration {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Compile `--exclude` patterns.
pub fn build_excludes(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("invalid exclude glob {:?}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Collect files to analyze. Explicit file arguments are always kept;
/// directories contribute files whose language is known (or all files when
/// `language` is forced).
pub fn collect_files(
    roots: &[PathBuf],
    excludes: &GlobSet,
    language: Option<Language>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for root in roots {
        if root.is_file() {
            if !excludes.is_match(root) {
                files.push(root.clone());
            }
            continue;
        }
        if !root.exists() {
            anyhow::bail!("path does not exist: {}", root.display());
        }

        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
            })
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if excludes.is_match(path) {
                continue;
            }
            if language.is_some() || Language::from_path(path).is_some() {
                files.push(path.to_path_buf());
            }
        }
    }

    Ok(files)
}

fn file_language(path: &Path, forced: Option<Language>) -> Option<Language> {
    forced.or_else(|| Language::from_path(path))
}

fn read_source(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| e.to_string())
}

fn skip(path: &Path, reason: impl Into<String>) -> SkippedFile {
    let reason = reason.into();
    tracing::warn!(path = %path.display(), reason = %reason, "skipping file");
    SkippedFile {
        path: path.display().to_string(),
        reason,
    }
}

fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden || len < 2 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Analyze every file in parallel. Files that cannot be read or parsed are
/// reported as skipped.
pub fn analyze_files(
    engine: &Engine,
    files: &[PathBuf],
    forced: Option<Language>,
    hide_progress: bool,
) -> (Vec<FileReport>, Vec<SkippedFile>) {
    let bar = progress_bar(files.len(), hide_progress);

    let outcomes: Vec<Result<FileReport, SkippedFile>> = files
        .par_iter()
        .map(|path| {
            let outcome = analyze_file(engine, path, forced);
            bar.inc(1);
            outcome
        })
        .collect();
    bar.finish_and_clear();

    let mut reports = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(r) => reports.push(r),
            Err(s) => skipped.push(s),
        }
    }
    (reports, skipped)
}

fn analyze_file(engine: &Engine, path: &Path, forced: Option<Language>) -> Result<FileReport, SkippedFile> {
    let language =
        file_language(path, forced).ok_or_else(|| skip(path, "unknown language"))?;
    let source = read_source(path).map_err(|e| skip(path, e))?;
    let facts = engine
        .analyze(&source, language)
        .map_err(|e| skip(path, e.to_string()))?;
    Ok(FileReport {
        path: path.display().to_string(),
        facts,
    })
}

fn run_query(
    engine: &Engine,
    files: &[PathBuf],
    forced: Option<Language>,
    pattern: &str,
) -> anyhow::Result<(Vec<CaptureRow>, Vec<SkippedFile>)> {
    let mut queries: HashMap<Language, Query> = HashMap::new();
    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    let options = QueryOptions {
        match_limit: engine.config().default_match_limit,
        ..QueryOptions::default()
    };

    for path in files {
        let Some(language) = file_language(path, forced) else {
            skipped.push(skip(path, "unknown language"));
            continue;
        };
        let source = match read_source(path) {
            Ok(s) => s,
            Err(e) => {
                skipped.push(skip(path, e));
                continue;
            }
        };
        let tree = match engine.parse(&source, language) {
            Ok(t) => t,
            Err(e) => {
                skipped.push(skip(path, e.to_string()));
                continue;
            }
        };

        if !queries.contains_key(&language) {
            let query = engine
                .compile(language, pattern)
                .with_context(|| format!("compiling query for {}", language))?;
            queries.insert(language, query);
        }
        let Some(query) = queries.get(&language) else {
            continue;
        };

        let found = query.matches(tree.root_node(), &options)?;
        if found.limit_exceeded {
            tracing::warn!(path = %path.display(), "match limit reached, captures truncated");
        }
        let display = path.display().to_string();
        for m in &found.matches {
            rows.extend(
                m.captures
                    .iter()
                    .map(|c| CaptureRow::new(&display, m.pattern_index, c)),
            );
        }
    }

    Ok((rows, skipped))
}

fn print_trees(engine: &Engine, files: &[PathBuf], forced: Option<Language>) -> Vec<SkippedFile> {
    let mut skipped = Vec::new();
    for path in files {
        let Some(language) = file_language(path, forced) else {
            skipped.push(skip(path, "unknown language"));
            continue;
        };
        let parsed = read_source(path).and_then(|source| {
            engine
                .parse(&source, language)
                .map_err(|e| e.to_string())
        });
        match parsed {
            Ok(tree) => report::write_tree(&path.display().to_string(), &tree.root_node().to_sexp()),
            Err(e) => skipped.push(skip(path, e)),
        }
    }
    skipped
}

/// Run the CLI.
pub fn run(cli: &Cli) -> anyhow::Result<i32> {
    if cli.format != "text" && cli.format != "json" {
        eprintln!("Error: invalid format {:?}, must be 'text' or 'json'", cli.format);
        return Ok(EXIT_ERROR);
    }

    let forced = match cli.language.as_deref().map(Language::from_str).transpose() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let excludes = match build_excludes(&cli.exclude) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let files = match collect_files(&cli.paths, &excludes, forced) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if files.is_empty() {
        eprintln!("Warning: no files to analyze");
        return Ok(EXIT_SUCCESS);
    }

    let engine = engine::init_with(config, Box::new(TreeSitterEngine::new()))?;

    if let Some(pattern) = &cli.query {
        let (rows, skipped) = match run_query(engine, &files, forced, pattern) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                return Ok(EXIT_ERROR);
            }
        };
        match cli.format.as_str() {
            "json" => println!("{}", report::render_captures_json(&rows)?),
            _ => print!("{}", report::render_captures_text(&rows)),
        }
        if !skipped.is_empty() {
            eprintln!("Warning: {} file(s) skipped", skipped.len());
        }
        return Ok(EXIT_SUCCESS);
    }

    if cli.tree {
        let skipped = print_trees(engine, &files, forced);
        if !skipped.is_empty() {
            eprintln!("Warning: {} file(s) skipped", skipped.len());
        }
        return Ok(EXIT_SUCCESS);
    }

    let (reports, skipped) = analyze_files(engine, &files, forced, cli.no_progress);
    match cli.format.as_str() {
        "json" => report::write_json(&reports, &skipped)?,
        _ => report::write_text(&reports, &skipped),
    }

    if cli.fail_on_syntax_errors && reports.iter().any(|r| r.facts.has_syntax_errors) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
