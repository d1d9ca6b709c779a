//! Document data structures and server configuration.
//!
//! `FileData` holds one open document: its text, the latest parse attempt
//! and the outline derived from it. A failed parse leaves the store's book
//! for the document empty rather than stale, so queries degrade instead of
//! showing outdated symbols.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use semver::Version;
use serde_json::Value;

use speclsp::parser::{ParseOutput, SyntaxError};
use speclsp::reference::TruncationLevel;
use speclsp::traverse::OutlineSymbol;

/// Configuration for the language server.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    /// Reference version gating `available`/`deprecated` filtering.
    pub spec_version: Option<Version>,
    /// Raw external-database path setting; empty or absent disables merging.
    pub external_database: Option<String>,
    pub workspace_root: Option<PathBuf>,
    pub motors: BTreeMap<String, String>,
    pub counters: BTreeMap<String, String>,
    /// User snippet templates, appended after the defaults.
    pub snippet_templates: Vec<String>,
    pub completion_truncation: TruncationLevel,
    pub hover_truncation: TruncationLevel,
    pub signature_truncation: TruncationLevel,
    pub lint_undeclared_variable: bool,
    pub lint_undeclared_macro_argument: bool,
}

impl Configuration {
    /// Fold a configuration payload (initializationOptions or
    /// didChangeConfiguration settings) into the current values.
    pub fn apply(&mut self, value: &Value) {
        if let Some(version) = value.get("specVersion").and_then(Value::as_str) {
            self.spec_version = Version::parse(version).ok();
        }
        if let Some(path) = value.get("externalDatabase").and_then(Value::as_str) {
            self.external_database = if path.is_empty() {
                None
            } else {
                Some(path.to_string())
            };
        }
        if let Some(motors) = value.get("motors").and_then(Value::as_object) {
            self.motors = mnemonic_map(motors);
        }
        if let Some(counters) = value.get("counters").and_then(Value::as_object) {
            self.counters = mnemonic_map(counters);
        }
        if let Some(templates) = value.get("snippets").and_then(Value::as_array) {
            self.snippet_templates = templates
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if let Some(levels) = value.get("truncation").and_then(Value::as_object) {
            if let Some(level) = levels.get("completion").and_then(Value::as_str) {
                self.completion_truncation = TruncationLevel::from_config(level);
            }
            if let Some(level) = levels.get("hover").and_then(Value::as_str) {
                self.hover_truncation = TruncationLevel::from_config(level);
            }
            if let Some(level) = levels.get("signatureHelp").and_then(Value::as_str) {
                self.signature_truncation = TruncationLevel::from_config(level);
            }
        }
        if let Some(lints) = value.get("lints").and_then(Value::as_object) {
            self.lint_undeclared_variable = lints
                .get("undeclaredVariable")
                .and_then(Value::as_bool)
                .unwrap_or(self.lint_undeclared_variable);
            self.lint_undeclared_macro_argument = lints
                .get("undeclaredMacroArgument")
                .and_then(Value::as_bool)
                .unwrap_or(self.lint_undeclared_macro_argument);
        }
    }

    /// Motor mnemonics in deterministic order, for choice placeholders.
    pub fn motor_names(&self) -> Vec<String> {
        self.motors.keys().cloned().collect()
    }

    pub fn counter_names(&self) -> Vec<String> {
        self.counters.keys().cloned().collect()
    }

    /// Default templates with user overrides appended (later entries win
    /// per leading word).
    pub fn all_snippet_templates(&self) -> Vec<String> {
        let mut templates = speclsp::snippets::default_templates();
        templates.extend(self.snippet_templates.iter().cloned());
        templates
    }
}

fn mnemonic_map(object: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .map(|(name, description)| {
            let text = description.as_str().unwrap_or_default().to_string();
            (name.clone(), text)
        })
        .collect()
}

/// One open document: content plus its latest parse attempt.
#[derive(Debug)]
pub struct DocumentData {
    pub content: String,
    pub parse: Option<ParseOutput>,
    pub syntax_error: Option<SyntaxError>,
}

/// Complete per-file state. The document's Reference Book lives in the
/// store, keyed by the same url as this entry.
#[derive(Debug)]
pub struct FileData {
    pub document_data: DocumentData,
    pub outline: Vec<OutlineSymbol>,
    pub last_diagnostic_run: Option<Instant>,
}
