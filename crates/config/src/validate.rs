//! Configuration validation.
//!
//! Validates a config file (any supported format) against the known schema,
//! flags unknown/misspelled keys, and reports semantic problems such as
//! missing search roots or zero timeouts.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::schema::RibbonConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "semantic", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "extensions.search_paths[0]"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }

    fn error(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, path, message)
    }

    fn warning(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, path, message)
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Expected shape of the configuration.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys (e.g. `engines.<language>`) with a known value shape.
    Map(Box<KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "extensions",
            Struct(HashMap::from([
                ("search_paths", Leaf),
                ("disabled", Leaf),
                ("load_beta", Leaf),
                ("library_paths", Leaf),
            ])),
        ),
        (
            "host",
            Struct(HashMap::from([
                ("version", Leaf),
                ("locale", Leaf),
                ("runtime_hash", Leaf),
            ])),
        ),
        (
            "engines",
            Map(Box::new(Struct(HashMap::from([
                ("command", Leaf),
                ("args", Leaf),
            ])))),
        ),
        (
            "bindings",
            Struct(HashMap::from([
                ("timeout_secs", Leaf),
                ("handler_timeout_secs", Leaf),
            ])),
        ),
        (
            "cache",
            Struct(HashMap::from([("enabled", Leaf), ("dir", Leaf)])),
        ),
        (
            "session",
            Struct(HashMap::from([("debug", Leaf), ("values", Leaf)])),
        ),
    ]))
}

/// Levenshtein edit distance, used for "did you mean" hints.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

/// Validate the config at `path`.
#[must_use]
pub fn validate(path: &Path) -> ValidationResult {
    let mut result = ValidationResult {
        diagnostics: Vec::new(),
        config_path: Some(path.to_path_buf()),
    };

    let value = match crate::loader::load_config_value(path) {
        Ok(v) => v,
        Err(e) => {
            result
                .diagnostics
                .push(Diagnostic::error("syntax", "", e.to_string()));
            return result;
        },
    };

    result.diagnostics = validate_value(&value);
    result
}

/// Validate an already-parsed config value without touching the config file.
#[must_use]
pub fn validate_value(value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_unknown_fields(value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<RibbonConfig>(value.clone()) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::error("type-error", "", format!("type error: {e}"))),
    }
    diagnostics
}

fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Value::Object(map) = value else {
        return;
    };
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match schema {
        KnownKeys::Struct(fields) => {
            let known: Vec<&str> = fields.keys().copied().collect();
            for (key, child) in map {
                match fields.get(key.as_str()) {
                    Some(child_schema) => {
                        check_unknown_fields(child, child_schema, &join(key), diagnostics);
                    },
                    None => {
                        let message = match suggest(key, &known) {
                            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                            None => "unknown field".to_string(),
                        };
                        diagnostics.push(Diagnostic::error("unknown-field", join(key), message));
                    },
                }
            }
        },
        KnownKeys::Map(value_schema) => {
            for (key, child) in map {
                check_unknown_fields(child, value_schema, &join(key), diagnostics);
            }
        },
        KnownKeys::Leaf => {},
    }
}

fn check_semantics(config: &RibbonConfig, diagnostics: &mut Vec<Diagnostic>) {
    let extensions = &config.extensions;
    if extensions.search_paths.is_empty() {
        diagnostics.push(Diagnostic::warning(
            "semantic",
            "extensions.search_paths",
            "no extension search paths configured; nothing will load",
        ));
    }
    let roots = extensions
        .search_paths
        .iter()
        .enumerate()
        .map(|(i, dir)| (format!("extensions.search_paths[{i}]"), dir))
        .chain(
            extensions
                .library_paths
                .iter()
                .enumerate()
                .map(|(i, dir)| (format!("extensions.library_paths[{i}]"), dir)),
        );
    for (path, dir) in roots {
        if !dir.is_dir() {
            diagnostics.push(Diagnostic::warning(
                "file-ref",
                path,
                format!("directory does not exist: {}", dir.display()),
            ));
        }
    }

    for (path, secs) in [
        ("bindings.timeout_secs", config.bindings.timeout_secs),
        ("bindings.handler_timeout_secs", config.bindings.handler_timeout_secs),
    ] {
        if secs == 0 {
            diagnostics.push(Diagnostic::error("semantic", path, "timeout must be greater than zero"));
        }
    }

    if config.host.locale.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "semantic",
            "host.locale",
            "empty locale; titles fall back to the default language",
        ));
    }

    for (language, engine) in &config.engines {
        if engine.command.trim().is_empty() {
            diagnostics.push(Diagnostic::error(
                "semantic",
                format!("engines.{language}.command"),
                "engine command is empty",
            ));
        }
    }
}
