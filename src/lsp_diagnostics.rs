//! Diagnostics.
//!
//! A failed parse yields exactly one syntax-error diagnostic. On a clean
//! parse the configured lint passes run against the merged store. Results
//! are cached by content hash so unchanged buffers republish for free.

use std::collections::HashSet;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, NumberOrString, Position as LspPosition,
    Range as LspRange, Url,
};

use speclsp::lints;
use speclsp::parser::{self, Program, SyntaxError};
use speclsp::reference::ReferenceStore;
use speclsp::traverse::collect_all_declarations;

use crate::document::Configuration;
use crate::types::Range;
use crate::Backend;
use crate::{LINT_UNDECLARED_MACRO_ARGUMENT, LINT_UNDECLARED_VARIABLE};

/// Run full diagnostics on a document and publish the results.
pub async fn run_diagnostics(backend: &Backend, uri: &Url) {
    let _timer =
        crate::performance::TimingGuard::new(&backend.perf_tracker, "lsp.server.diagnostics");
    backend.perf_tracker.increment("lsp.server.diagnostics.calls", 1);

    if !*backend.diagnostics_enabled.read().await {
        backend
            .client
            .publish_diagnostics(uri.clone(), vec![], None)
            .await;
        return;
    }

    let content_hash = {
        let files = backend.files.read().await;
        let Some(file_data) = files.get(uri) else {
            return;
        };
        let mut hasher = Sha256::new();
        hasher.update(file_data.document_data.content.as_bytes());
        format!("{:x}", hasher.finalize())
    };

    if let Some(cached) = backend.diagnostic_cache.get(&content_hash) {
        backend.perf_tracker.increment("lsp.server.diagnostics.cache_hits", 1);
        backend
            .client
            .publish_diagnostics(uri.clone(), cached.clone(), None)
            .await;
        let mut files = backend.files.write().await;
        if let Some(file_data) = files.get_mut(uri) {
            file_data.last_diagnostic_run = Some(Instant::now());
        }
        return;
    }
    backend.perf_tracker.increment("lsp.server.diagnostics.cache_misses", 1);

    {
        let mut files = backend.files.write().await;
        if let Some(file_data) = files.get_mut(uri) {
            file_data.last_diagnostic_run = Some(Instant::now());
        }
    }

    let diagnostics = {
        let config = backend.config.read().await;
        let files = backend.files.read().await;
        let Some(file_data) = files.get(uri) else {
            return;
        };
        let store = backend.store.read().await;
        if let Some(error) = &file_data.document_data.syntax_error {
            vec![syntax_error_diagnostic(error)]
        } else if let Some(parse) = &file_data.document_data.parse {
            let known = known_names(&store, &parse.program);
            lint_diagnostics(&parse.program, &config, &known)
        } else {
            Vec::new()
        }
    };

    // Bounded cache: evict roughly half once it grows past 100 entries.
    if backend.diagnostic_cache.len() > 100 {
        let stale: Vec<String> = backend
            .diagnostic_cache
            .iter()
            .take(50)
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            backend.diagnostic_cache.remove(&key);
        }
    }
    backend
        .diagnostic_cache
        .insert(content_hash, diagnostics.clone());

    backend
        .client
        .publish_diagnostics(uri.clone(), diagnostics, None)
        .await;
}

fn syntax_error_diagnostic(error: &SyntaxError) -> Diagnostic {
    let start = LspPosition::new(error.location.line, error.location.column);
    let end = LspPosition::new(error.location.line, error.location.column + 1);
    Diagnostic::new(
        LspRange::new(start, end),
        Some(DiagnosticSeverity::ERROR),
        None,
        None,
        error.message.clone(),
        None,
        None,
    )
}

/// Every name any registered book answers for, plus every declaration in
/// this file regardless of nesting.
fn known_names(store: &ReferenceStore, program: &Program) -> HashSet<String> {
    let mut known: HashSet<String> = store
        .iter()
        .flat_map(|(_, book)| book.keys().cloned())
        .collect();
    known.extend(collect_all_declarations(program).into_keys());
    known
}

fn lint_diagnostics(
    program: &Program,
    config: &Configuration,
    known: &HashSet<String>,
) -> Vec<Diagnostic> {
    let predicate = |name: &str| known.contains(name);
    let mut diagnostics = Vec::new();
    if config.lint_undeclared_variable {
        for finding in lints::undeclared_variables(program, &predicate) {
            diagnostics.push(Diagnostic::new(
                Range::from(finding.span).into(),
                Some(DiagnosticSeverity::WARNING),
                Some(NumberOrString::String(LINT_UNDECLARED_VARIABLE.to_string())),
                None,
                format!("Undeclared variable `{}`", finding.name),
                None,
                None,
            ));
        }
    }
    if config.lint_undeclared_macro_argument {
        for finding in lints::undeclared_macro_arguments(program, &predicate) {
            diagnostics.push(Diagnostic::new(
                Range::from(finding.span).into(),
                Some(DiagnosticSeverity::WARNING),
                Some(NumberOrString::String(
                    LINT_UNDECLARED_MACRO_ARGUMENT.to_string(),
                )),
                None,
                format!("Unknown identifier `{}` in macro arguments", finding.name),
                None,
                None,
            ));
        }
    }
    diagnostics
}

/// Diagnostics for a bare text buffer, used by the `--diagnose` batch mode.
/// Both lint rules run, with the embedded built-in database as the only
/// external knowledge.
pub fn compute_diagnostics_for_text(content: &str) -> Vec<Diagnostic> {
    let output = match parser::parse(content) {
        Ok(output) => output,
        Err(error) => return vec![syntax_error_diagnostic(&error)],
    };
    let mut store = ReferenceStore::new();
    if let Ok(book) = speclsp::builtins::builtin_book() {
        store.replace_book(speclsp::reference::SourceKey::Builtin, book);
    }
    let known = known_names(&store, &output.program);
    let config = Configuration {
        lint_undeclared_variable: true,
        lint_undeclared_macro_argument: true,
        ..Default::default()
    };
    lint_diagnostics(&output.program, &config, &known)
}
