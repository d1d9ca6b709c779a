//! # spec Language Server (speclsp)
//!
//! A Language Server Protocol implementation for the spec instrument-control
//! macro language. The server keeps a merged Reference Store built from the
//! embedded built-in database, an optional external database, configured
//! motor/counter mnemonics, snippet templates and the user's source files,
//! and answers completion, hover, signature help, definition and symbol
//! queries from it.
//!
//! ## Architecture
//! The core (parsing, traversal, reference model, lints) lives in the
//! `speclsp` library crate and is host-independent. This binary adds:
//! - Document management (open buffers, workspace scan)
//! - Reference Store maintenance (one book per source, swapped atomically)
//! - Diagnostics (syntax errors plus rule-gated lints, debounced and cached)
//! - The LSP request handlers

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{borrow::Cow, fs, net::Ipv4Addr, sync::Arc};

use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::RwLock,
};
use tower_lsp::{async_trait, jsonrpc::Result, lsp_types::*, Client};
use tower_lsp::{LanguageServer, LspService, Server};

use speclsp::builtins;
use speclsp::parser;
use speclsp::reference::{ReferenceBook, ReferenceStore, SourceKey};
use speclsp::snippets;
use speclsp::traverse::{traverse_whole, OutlineSymbol};

/// Command-line interface handling
mod cli;

/// Document data structures and server configuration
mod document;

/// LSP completion handler
mod lsp_completion;

/// LSP diagnostics handler
mod lsp_diagnostics;

/// LSP handlers for signature help, symbols and goto definition
mod lsp_handlers;

/// LSP hover handler
mod lsp_hover;

/// Performance benchmarking and tracking
mod performance;

/// Type conversions and position/range utilities
mod types;

use document::*;

/// Diagnostic code for reads of identifiers with no declaration anywhere.
pub(crate) const LINT_UNDECLARED_VARIABLE: &str = "undeclared-variable";

/// Diagnostic code for unresolved identifier arguments of macro invocations.
pub(crate) const LINT_UNDECLARED_MACRO_ARGUMENT: &str = "undeclared-macro-argument";

/// File extension picked up by the workspace scan.
const SOURCE_EXTENSION: &str = "mac";

const MAX_REFRESH_FILES: usize = 50;
const DIAGNOSTIC_DEBOUNCE_MS: u64 = 250;
const DIAGNOSTIC_DEBOUNCE_LARGE_FILE_MS: u64 = 400; // files >500 lines

/// Last signature-help answer, kept so the selected overload survives
/// retriggers while the candidate set is unchanged.
#[derive(Debug, Default)]
pub(crate) struct SignatureState {
    pub(crate) labels: Vec<String>,
    pub(crate) active: u32,
}

struct Backend {
    client: Client,
    files: Arc<RwLock<HashMap<Url, FileData>>>,
    store: Arc<RwLock<ReferenceStore>>,
    config: Arc<RwLock<Configuration>>,
    // Runtime flag to allow diagnostics suppression without restart
    diagnostics_enabled: Arc<RwLock<bool>>,
    // Performance tracking
    perf_tracker: Arc<performance::PerformanceTracker>,
    // Debounce: pending diagnostic tasks per file
    pending_diagnostics: Arc<tokio::sync::Mutex<HashMap<Url, tokio::task::JoinHandle<()>>>>,
    // Cache: diagnostics by content hash (DashMap is lock-free concurrent)
    diagnostic_cache: Arc<dashmap::DashMap<String, Vec<Diagnostic>>>,
    signature_state: Arc<parking_lot::Mutex<SignatureState>>,
}

#[async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        {
            let mut config = self.config.write().await;
            #[allow(deprecated)]
            if let Some(root) = params.root_uri.as_ref() {
                config.workspace_root = root.to_file_path().ok();
            }
            if let Some(init_options) = params.initialization_options {
                config.apply(&init_options);
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        "version".to_string(),
                        "setDiagnostics".to_string(),
                        "speclsp.server.enableBenchmarking".to_string(),
                        "speclsp.server.getBenchmarkReport".to_string(),
                    ],
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(true),
                    trigger_characters: None,
                    completion_item: Some(CompletionOptionsCompletionItem {
                        label_details_support: Some(true),
                    }),
                    ..Default::default()
                }),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: None,
                    file_operations: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "speclsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.rebuild_reference_books().await;
        self.scan_workspace().await;

        let store = self.store.read().await;
        let builtin_count = store
            .book(&SourceKey::Builtin)
            .map(ReferenceBook::len)
            .unwrap_or(0);
        let file_count = store
            .iter()
            .filter(|(key, _)| matches!(key, SourceKey::WorkspaceFile(_)))
            .count();
        drop(store);
        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "speclsp init: builtins={} workspaceFiles={}",
                    builtin_count, file_count
                ),
            )
            .await;
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        match params.command.as_str() {
            "version" => {
                self.client
                    .show_message(
                        MessageType::INFO,
                        concat!("speclsp version: ", env!("CARGO_PKG_VERSION")),
                    )
                    .await;
            }
            "setDiagnostics" => {
                if let Some(enabled) = params.arguments.first().and_then(Value::as_bool) {
                    {
                        let mut flag = self.diagnostics_enabled.write().await;
                        *flag = enabled;
                    }
                    // re-run or clear diagnostics for all open documents
                    let uris = {
                        let files = self.files.read().await;
                        files.keys().cloned().collect::<Vec<_>>()
                    };
                    for uri in uris {
                        if enabled {
                            self.run_diagnostics(&uri).await;
                        } else {
                            self.client
                                .publish_diagnostics(uri.clone(), vec![], None)
                                .await;
                        }
                    }
                }
            }
            "speclsp.server.enableBenchmarking" => {
                if let Some(enabled) = params.arguments.first().and_then(Value::as_bool) {
                    self.perf_tracker.set_enabled(enabled);
                    let message = if enabled {
                        "speclsp benchmarking enabled. Collecting performance data..."
                    } else {
                        "speclsp benchmarking disabled."
                    };
                    self.client.show_message(MessageType::INFO, message).await;
                }
            }
            "speclsp.server.getBenchmarkReport" => {
                let report = self.perf_tracker.generate_report();
                self.client
                    .log_message(MessageType::INFO, report.clone())
                    .await;
                return Ok(Some(Value::String(report)));
            }
            _ => {}
        }
        Ok(None)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.update_content(params.text_document.uri.clone(), params.text_document.text)
            .await;
        self.run_diagnostics(&params.text_document.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        for change in params.content_changes {
            // Should only ever be one, because we are getting full updates
            self.update_content(params.text_document.uri.clone(), change.text)
                .await;
        }

        // Debounce: cancel any pending diagnostic task and schedule a new
        // one, so diagnostics run after the last keystroke.
        let uri = params.text_document.uri.clone();
        let debounce_ms = {
            let files = self.files.read().await;
            match files.get(&uri) {
                Some(file_data)
                    if file_data.document_data.content.lines().count() > 500 =>
                {
                    DIAGNOSTIC_DEBOUNCE_LARGE_FILE_MS
                }
                _ => DIAGNOSTIC_DEBOUNCE_MS,
            }
        };

        {
            let mut pending = self.pending_diagnostics.lock().await;
            if let Some(handle) = pending.remove(&uri) {
                handle.abort();
            }
        }

        let uri_for_task = uri.clone();
        let backend = Self {
            client: self.client.clone(),
            files: self.files.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            diagnostics_enabled: self.diagnostics_enabled.clone(),
            perf_tracker: self.perf_tracker.clone(),
            pending_diagnostics: self.pending_diagnostics.clone(),
            diagnostic_cache: self.diagnostic_cache.clone(),
            signature_state: self.signature_state.clone(),
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
            backend.run_diagnostics(&uri_for_task).await;
            backend
                .pending_diagnostics
                .lock()
                .await
                .remove(&uri_for_task);
        });
        self.pending_diagnostics.lock().await.insert(uri, handle);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.files.write().await.remove(&uri);
        {
            let mut pending = self.pending_diagnostics.lock().await;
            if let Some(handle) = pending.remove(&uri) {
                handle.abort();
            }
        }
        {
            let mut store = self.store.write().await;
            store.remove_book(&SourceKey::OpenDocument(uri.clone()));
        }
        // A closed workspace file goes back to being tracked from disk.
        self.restore_workspace_file(&uri).await;
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        {
            let mut config = self.config.write().await;
            config.apply(&params.settings);
        }
        self.rebuild_reference_books().await;

        // Lint toggles and version gates changed; refresh open documents,
        // most recently diagnosed first when there are many.
        let uris = {
            let files = self.files.read().await;
            let mut file_list: Vec<(Url, _)> = files
                .iter()
                .map(|(url, data)| (url.clone(), data.last_diagnostic_run))
                .collect();
            if file_list.len() > MAX_REFRESH_FILES {
                file_list.sort_by_key(|(_, last_run)| std::cmp::Reverse(*last_run));
                file_list.truncate(MAX_REFRESH_FILES);
            }
            file_list.into_iter().map(|(url, _)| url).collect::<Vec<_>>()
        };
        self.diagnostic_cache.clear();
        for uri in uris {
            self.run_diagnostics(&uri).await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        lsp_completion::handle_completion(self, params).await
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        lsp_completion::handle_completion_resolve(self, item).await
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        lsp_hover::handle_hover(self, params).await
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        lsp_handlers::handle_signature_help(self, params).await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        lsp_handlers::handle_document_symbol(self, params).await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        lsp_handlers::handle_goto_definition(self, params).await
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        lsp_handlers::handle_workspace_symbol(self, params).await
    }
}

impl Backend {
    async fn update_content(&self, uri: Url, mut text: String) {
        if !text.ends_with('\n') {
            text.push('\n');
        }

        let parsed = {
            let _timer =
                performance::TimingGuard::new(&self.perf_tracker, "lsp.server.parsing");
            self.perf_tracker.increment("lsp.server.parsing.calls", 1);
            parser::parse(&text)
        };

        let (parse, syntax_error, book, outline) = match parsed {
            Ok(output) => {
                let (book, outline) = traverse_whole(&output.program, &output.comments);
                (Some(output), None, book, outline)
            }
            // A failed parse empties the book rather than keeping a stale one.
            Err(error) => (None, Some(error), ReferenceBook::new(), Vec::<OutlineSymbol>::new()),
        };

        {
            let mut files = self.files.write().await;
            let last_diagnostic_run = files.get(&uri).and_then(|f| f.last_diagnostic_run);
            files.insert(
                uri.clone(),
                FileData {
                    document_data: DocumentData {
                        content: text,
                        parse,
                        syntax_error,
                    },
                    outline,
                    last_diagnostic_run,
                },
            );
        }

        let mut store = self.store.write().await;
        store.replace_book(SourceKey::OpenDocument(uri.clone()), book);
        // The open buffer supersedes the on-disk copy.
        store.remove_book(&SourceKey::WorkspaceFile(uri));
    }

    /// Rebuild every configured book: built-in, external, mnemonics and
    /// snippets. Each book is swapped atomically; a failed external load
    /// removes the external book instead of leaving a stale one.
    async fn rebuild_reference_books(&self) {
        let config = self.config.read().await.clone();

        let builtin = builtins::builtin_book();
        let external = config.external_database.as_deref().map(|setting| {
            builtins::resolve_database_path(setting, config.workspace_root.as_ref())
                .ok_or_else(|| format!("unresolvable database path `{}`", setting))
                .and_then(|path| {
                    fs::read_to_string(&path)
                        .map_err(|e| format!("{}: {}", path.display(), e))
                })
                .and_then(|json| {
                    builtins::parse_database(&json).map_err(|e| e.to_string())
                })
        });

        let motors = config.motor_names();
        let counters = config.counter_names();
        let snippet_book =
            snippets::snippet_book(&config.all_snippet_templates(), &motors, &counters);

        {
            let mut store = self.store.write().await;
            match &builtin {
                Ok(book) => store.replace_book(SourceKey::Builtin, book.clone()),
                Err(_) => store.remove_book(&SourceKey::Builtin),
            }
            match &external {
                Some(Ok(book)) => store.replace_book(SourceKey::External, book.clone()),
                _ => store.remove_book(&SourceKey::External),
            }
            store.replace_book(SourceKey::MotorMnemonic, builtins::mnemonic_book(&config.motors));
            store.replace_book(
                SourceKey::CounterMnemonic,
                builtins::mnemonic_book(&config.counters),
            );
            store.replace_book(SourceKey::Snippet, snippet_book);
        }

        if let Err(error) = builtin {
            self.client
                .log_message(
                    MessageType::ERROR,
                    format!("failed to parse built-in database: {}", error),
                )
                .await;
        }
        if let Some(Err(error)) = external {
            self.client
                .log_message(
                    MessageType::WARNING,
                    format!("external database not loaded: {}", error),
                )
                .await;
        }
    }

    /// Index every source file under the workspace root that is not already
    /// open. Files that fail to parse still get an (empty) book so the store
    /// tracks them.
    async fn scan_workspace(&self) {
        let root = {
            let config = self.config.read().await;
            config.workspace_root.clone()
        };
        let Some(root) = root else {
            return;
        };

        let mut paths = Vec::new();
        collect_source_files(&root, &mut paths);

        let open: Vec<Url> = {
            let files = self.files.read().await;
            files.keys().cloned().collect()
        };

        let mut indexed = 0usize;
        for path in paths {
            let Ok(url) = Url::from_file_path(&path) else {
                continue;
            };
            if open.contains(&url) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let book = match parser::parse(&content) {
                Ok(output) => traverse_whole(&output.program, &output.comments).0,
                Err(_) => ReferenceBook::new(),
            };
            let mut store = self.store.write().await;
            store.replace_book(SourceKey::WorkspaceFile(url), book);
            indexed += 1;
        }
        if indexed > 0 {
            self.client
                .log_message(
                    MessageType::INFO,
                    format!("indexed {} workspace files", indexed),
                )
                .await;
        }
    }

    /// Re-index a closed document from disk, when it lives in the workspace.
    async fn restore_workspace_file(&self, uri: &Url) {
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        let in_workspace = {
            let config = self.config.read().await;
            config
                .workspace_root
                .as_ref()
                .is_some_and(|root| path.starts_with(root))
        };
        if !in_workspace || path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            return;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            return;
        };
        let book = match parser::parse(&content) {
            Ok(output) => traverse_whole(&output.program, &output.comments).0,
            Err(_) => ReferenceBook::new(),
        };
        let mut store = self.store.write().await;
        store.replace_book(SourceKey::WorkspaceFile(uri.clone()), book);
    }

    /// Run full diagnostics on a document - delegates to lsp_diagnostics
    async fn run_diagnostics(&self, uri: &Url) {
        lsp_diagnostics::run_diagnostics(self, uri).await
    }
}

fn collect_source_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_source_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION) {
            out.push(path);
        }
    }
}

/// Compute diagnostics for a single text buffer - delegates to lsp_diagnostics
fn compute_diagnostics_for_text(content: &str) -> Vec<Diagnostic> {
    lsp_diagnostics::compute_diagnostics_for_text(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_macro_is_recognized_in_batch_mode() {
        let script = "global th\nwm th\n";
        let diagnostics = compute_diagnostics_for_text(script);
        assert!(
            diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            diagnostics
        );
    }

    #[test]
    fn batch_mode_reports_syntax_errors() {
        let diagnostics = compute_diagnostics_for_text("def broken(\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].severity,
            Some(DiagnosticSeverity::ERROR)
        );
    }
}

#[tokio::main]
async fn main() {
    use clap::Parser as _;
    let cli = cli::Cli::parse();

    // Diagnostic runner mode: run the diagnostic logic on each file, print
    // the results to stdout, then exit.
    if !cli.diagnose.is_empty() {
        for path in &cli.diagnose {
            let content = match fs::read_to_string(path) {
                Ok(c) => c,
                Err(_e) => {
                    continue;
                }
            };

            let diagnostics = compute_diagnostics_for_text(&content);

            println!("Diagnostics for {}:", path.display());
            if diagnostics.is_empty() {
                println!("  (no diagnostics)");
            } else {
                for d in diagnostics {
                    let sev = match d.severity {
                        Some(DiagnosticSeverity::ERROR) => "ERROR",
                        Some(DiagnosticSeverity::WARNING) => "WARN",
                        Some(DiagnosticSeverity::INFORMATION) => "INFO",
                        Some(DiagnosticSeverity::HINT) => "HINT",
                        _ => "UNKNOWN",
                    };
                    let range = d.range;
                    println!(
                        "  {}:{}:{} - {}",
                        sev, range.start.line, range.start.character, d.message
                    );
                }
            }
            println!();
        }
        return;
    }

    let (service, socket) = LspService::new(|client| Backend {
        client,
        files: Arc::new(RwLock::new(HashMap::new())),
        store: Arc::new(RwLock::new(ReferenceStore::new())),
        config: Arc::new(RwLock::new(Configuration::default())),
        diagnostics_enabled: Arc::new(RwLock::new(true)),
        perf_tracker: Arc::new(performance::PerformanceTracker::new()),
        pending_diagnostics: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        diagnostic_cache: Arc::new(dashmap::DashMap::new()),
        signature_state: Arc::new(parking_lot::Mutex::new(SignatureState::default())),
    });

    if !cli.listen && cli.host.is_none() {
        // stdin/stdout
        Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
            .serve(service)
            .await;
    } else if cli.listen {
        let host = cli
            .host
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed("127.0.0.1"))
            .parse::<Ipv4Addr>()
            .expect("Could not parse IP address");

        let port = cli.port.unwrap_or(9257);

        let stream = {
            let listener = TcpListener::bind((host, port)).await.unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            stream
        };

        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    } else {
        let host = cli.host.expect("No host given");
        let port = cli.port.expect("No port given");

        let stream = TcpStream::connect((host, port))
            .await
            .expect("Could not open TCP stream");

        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    }
}
