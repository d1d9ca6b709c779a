//! Completion handler.
//!
//! Completion lists the union of every registered Reference Book plus the
//! volatile cursor-scope book. Items carry a small JSON back-reference in
//! their `data` field; documentation is rendered lazily in the resolve
//! request so the initial list stays cheap.

use semver::Version;
use serde_json::{json, Value};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;

use speclsp::parser::Location;
use speclsp::reference::{
    render_description, ReferenceCategory, ReferenceItem, SourceKey, TruncationLevel,
};
use speclsp::traverse::traverse_locals;

use crate::performance;
use crate::types::Position;
use crate::Backend;

pub async fn handle_completion(
    backend: &Backend,
    params: CompletionParams,
) -> Result<Option<CompletionResponse>> {
    let _timer = performance::TimingGuard::new(&backend.perf_tracker, "lsp.server.completion");
    backend.perf_tracker.increment("lsp.server.completion.calls", 1);

    let uri = params.text_document_position.text_document.uri;
    let position = params.text_document_position.position;

    let scope_book = {
        let files = backend.files.read().await;
        let Some(file_data) = files.get(&uri) else {
            return Err(tower_lsp::jsonrpc::Error::invalid_request());
        };
        let cursor: Location = Position::from(position).into();
        file_data
            .document_data
            .parse
            .as_ref()
            .map(|parse| traverse_locals(&parse.program, cursor))
            .unwrap_or_default()
    };

    let config = backend.config.read().await;
    let version = config.spec_version.clone();
    let store = backend.store.read().await;

    let mut ret = Vec::new();
    let scope = (&SourceKey::ActiveScope, &scope_book);
    for (key, book) in store.iter().chain(std::iter::once(scope)) {
        for (name, item) in book {
            if !item.is_available(version.as_ref()) {
                continue;
            }
            let tags = item
                .deprecation(version.as_ref())
                .map(|_| vec![CompletionItemTag::DEPRECATED]);
            let (insert_text, insert_text_format) = match &item.snippet {
                Some(snippet) => (Some(snippet.clone()), Some(InsertTextFormat::SNIPPET)),
                None => (None, None),
            };
            // Scope items are recomputed per request and cannot be resolved
            // later; their documentation goes out eagerly.
            let (data, documentation) = match back_reference(key, name) {
                Some(data) => (Some(data), None),
                None => (
                    None,
                    resolve_documentation(item, config.completion_truncation, version.as_ref()),
                ),
            };
            ret.push(CompletionItem {
                label: name.clone(),
                kind: Some(completion_kind(item.category)),
                detail: item.signature_tail(name).map(str::to_string),
                label_details: Some(CompletionItemLabelDetails {
                    detail: None,
                    description: Some(key.origin_label(Some(&uri))),
                }),
                documentation,
                tags,
                insert_text,
                insert_text_format,
                data,
                ..Default::default()
            });
        }
    }

    Ok(Some(CompletionResponse::Array(ret)))
}

/// Fill in documentation for one item picked from the list.
pub async fn handle_completion_resolve(backend: &Backend, mut item: CompletionItem) -> Result<CompletionItem> {
    let Some(data) = item.data.take() else {
        return Ok(item);
    };
    let Some((key, name)) = parse_back_reference(&data) else {
        return Ok(item);
    };

    let config = backend.config.read().await;
    let store = backend.store.read().await;
    let reference = store.book(&key).and_then(|book| book.get(&name));
    if let Some(reference) = reference {
        item.documentation = resolve_documentation(
            reference,
            config.completion_truncation,
            config.spec_version.as_ref(),
        );
    }
    Ok(item)
}

/// Documentation for a resolved item: the truncated description followed by
/// one code block per overload.
fn resolve_documentation(
    item: &ReferenceItem,
    level: TruncationLevel,
    version: Option<&Version>,
) -> Option<Documentation> {
    let mut value = render_description(item, level, version).unwrap_or_default();
    for overload in &item.overloads {
        if !value.is_empty() {
            value.push_str("\n\n");
        }
        value.push_str("```spec\n");
        value.push_str(&overload.signature);
        value.push_str("\n```");
        if let Some(description) = &overload.description {
            value.push('\n');
            value.push_str(description);
        }
    }
    if value.is_empty() {
        return None;
    }
    Some(Documentation::MarkupContent(MarkupContent {
        kind: MarkupKind::Markdown,
        value,
    }))
}

fn completion_kind(category: ReferenceCategory) -> CompletionItemKind {
    match category {
        ReferenceCategory::Constant => CompletionItemKind::CONSTANT,
        ReferenceCategory::Variable => CompletionItemKind::VARIABLE,
        ReferenceCategory::Array => CompletionItemKind::VALUE,
        ReferenceCategory::Macro => CompletionItemKind::METHOD,
        ReferenceCategory::Function => CompletionItemKind::FUNCTION,
        ReferenceCategory::Keyword => CompletionItemKind::KEYWORD,
        ReferenceCategory::Snippet => CompletionItemKind::SNIPPET,
        ReferenceCategory::Enum => CompletionItemKind::ENUM_MEMBER,
    }
}

fn back_reference(key: &SourceKey, name: &str) -> Option<Value> {
    let source = match key {
        SourceKey::Builtin => json!("builtin"),
        SourceKey::External => json!("external"),
        SourceKey::MotorMnemonic => json!("motor"),
        SourceKey::CounterMnemonic => json!("counter"),
        SourceKey::Snippet => json!("snippet"),
        SourceKey::WorkspaceFile(url) => json!({"workspace": url.as_str()}),
        SourceKey::OpenDocument(url) => json!({"open": url.as_str()}),
        SourceKey::ActiveScope => return None,
    };
    Some(json!({"source": source, "name": name}))
}

fn parse_back_reference(data: &Value) -> Option<(SourceKey, String)> {
    let name = data.get("name")?.as_str()?.to_string();
    let source = data.get("source")?;
    let key = match source.as_str() {
        Some("builtin") => SourceKey::Builtin,
        Some("external") => SourceKey::External,
        Some("motor") => SourceKey::MotorMnemonic,
        Some("counter") => SourceKey::CounterMnemonic,
        Some("snippet") => SourceKey::Snippet,
        _ => {
            if let Some(url) = source.get("workspace").and_then(Value::as_str) {
                SourceKey::WorkspaceFile(Url::parse(url).ok()?)
            } else if let Some(url) = source.get("open").and_then(Value::as_str) {
                SourceKey::OpenDocument(Url::parse(url).ok()?)
            } else {
                return None;
            }
        }
    };
    Some((key, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_reference_round_trip() {
        let url = Url::parse("file:///work/align.mac").unwrap();
        let data = back_reference(&SourceKey::WorkspaceFile(url.clone()), "align").unwrap();
        let (key, name) = parse_back_reference(&data).unwrap();
        assert_eq!(key, SourceKey::WorkspaceFile(url));
        assert_eq!(name, "align");
    }

    #[test]
    fn scope_items_have_no_back_reference() {
        assert!(back_reference(&SourceKey::ActiveScope, "x").is_none());
    }

    #[test]
    fn resolved_documentation_includes_overload_blocks() {
        let mut reference = ReferenceItem::new("substr(s, start)", ReferenceCategory::Function);
        reference.description = Some("Extract a substring.".to_string());
        reference.overloads.push(speclsp::reference::Overload {
            signature: "substr(s, start, length)".to_string(),
            description: Some("Bounded form.".to_string()),
        });

        let doc = resolve_documentation(&reference, TruncationLevel::Full, None).unwrap();
        let Documentation::MarkupContent(content) = doc else {
            panic!("expected markdown documentation");
        };
        assert!(content.value.starts_with("Extract a substring."));
        assert!(content.value.contains("```spec\nsubstr(s, start, length)\n```"));
        assert!(content.value.ends_with("Bounded form."));
    }

    #[test]
    fn item_without_description_or_overloads_resolves_to_nothing() {
        let reference = ReferenceItem::new("x", ReferenceCategory::Variable);
        assert!(resolve_documentation(&reference, TruncationLevel::Full, None).is_none());
    }
}
