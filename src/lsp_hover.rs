//! Hover handler.
//!
//! A hover shows one group of blocks per source that knows the identifier,
//! in store order: the signature, an origin/description body, then one code
//! block per overload. Conflicting definitions are deliberately all shown;
//! the origin line tells them apart.

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;

use speclsp::parser::Location;
use speclsp::reference::{is_identifier, render_description, ReferenceItem, SourceKey};
use speclsp::traverse::traverse_locals;

use crate::types::{word_at, Position};
use crate::Backend;

pub async fn handle_hover(backend: &Backend, params: HoverParams) -> Result<Option<Hover>> {
    let _timer =
        crate::performance::TimingGuard::new(&backend.perf_tracker, "lsp.server.hover");
    backend.perf_tracker.increment("lsp.server.hover.calls", 1);

    let uri = params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;

    let (word, range, scope_book) = {
        let files = backend.files.read().await;
        let Some(file_data) = files.get(&uri) else {
            return Err(tower_lsp::jsonrpc::Error::invalid_request());
        };
        let Some((word, range)) = word_at(&file_data.document_data.content, position) else {
            return Ok(None);
        };
        let cursor: Location = Position::from(position).into();
        let scope_book = file_data
            .document_data
            .parse
            .as_ref()
            .map(|parse| traverse_locals(&parse.program, cursor))
            .unwrap_or_default();
        (word, range, scope_book)
    };
    if !is_identifier(&word) {
        return Ok(None);
    }

    let config = backend.config.read().await;
    let version = config.spec_version.clone();
    let store = backend.store.read().await;

    let mut parts = Vec::new();
    let scope_hit = scope_book
        .get(&word)
        .map(|item| (&SourceKey::ActiveScope, item));
    for (key, item) in store.lookup(&word).into_iter().chain(scope_hit) {
        if !item.is_available(version.as_ref()) {
            continue;
        }
        parts.extend(hover_blocks(key, item, &uri, &config, version.as_ref()));
    }
    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(Hover {
        contents: HoverContents::Array(parts),
        range: Some(range),
    }))
}

/// All hover blocks for one (source, item) pair.
fn hover_blocks(
    key: &SourceKey,
    item: &ReferenceItem,
    current: &Url,
    config: &crate::document::Configuration,
    version: Option<&semver::Version>,
) -> Vec<MarkedString> {
    let mut parts = vec![
        MarkedString::LanguageString(LanguageString {
            language: "spec".to_string(),
            value: item.signature.clone(),
        }),
        MarkedString::String(hover_body(key, item, current, config, version)),
    ];
    for overload in &item.overloads {
        parts.push(MarkedString::LanguageString(LanguageString {
            language: "spec".to_string(),
            value: overload.signature.clone(),
        }));
        if let Some(description) = &overload.description {
            parts.push(MarkedString::String(description.clone()));
        }
    }
    parts
}

fn hover_body(
    key: &SourceKey,
    item: &ReferenceItem,
    current: &Url,
    config: &crate::document::Configuration,
    version: Option<&semver::Version>,
) -> String {
    let mut body = format!("*{}* ({})", item.category.as_str(), key.origin_label(Some(current)));
    if key.url() == Some(current) {
        if let Some(span) = item.location {
            body.push_str(&format!(", defined at line {}", span.start.line + 1));
        }
    }
    if let Some(description) = render_description(item, config.hover_truncation, version) {
        body.push_str("\n\n");
        body.push_str(&description);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Configuration;
    use speclsp::reference::{Overload, ReferenceCategory};

    #[test]
    fn overloads_get_their_own_code_blocks() {
        let mut item = ReferenceItem::new("substr(s, start)", ReferenceCategory::Function);
        item.description = Some("Extract a substring.".to_string());
        item.overloads.push(Overload {
            signature: "substr(s, start, length)".to_string(),
            description: Some("Bounded form.".to_string()),
        });

        let url = Url::parse("file:///work/a.mac").unwrap();
        let config = Configuration::default();
        let blocks = hover_blocks(&SourceKey::Builtin, &item, &url, &config, None);

        assert_eq!(blocks.len(), 4);
        assert!(matches!(
            &blocks[2],
            MarkedString::LanguageString(ls) if ls.value == "substr(s, start, length)"
        ));
        assert!(matches!(&blocks[3], MarkedString::String(s) if s.as_str() == "Bounded form."));
    }

    #[test]
    fn overload_without_description_adds_only_the_signature() {
        let mut item = ReferenceItem::new("wm(motor)", ReferenceCategory::Function);
        item.overloads.push(Overload {
            signature: "wm(motor, motor2)".to_string(),
            description: None,
        });

        let url = Url::parse("file:///work/a.mac").unwrap();
        let blocks = hover_blocks(
            &SourceKey::Builtin,
            &item,
            &url,
            &Configuration::default(),
            None,
        );
        assert_eq!(blocks.len(), 3);
    }
}
