//! Handlers for signature help, document symbols, go-to-definition and
//! workspace symbols.

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    DocumentSymbol, DocumentSymbolParams, DocumentSymbolResponse, Documentation,
    GotoDefinitionParams, GotoDefinitionResponse, Location, MessageType,
    ParameterInformation, ParameterLabel, SignatureHelp, SignatureHelpParams,
    SignatureInformation, SymbolInformation, SymbolKind, SymbolTag,
    WorkspaceSymbolParams,
};

use semver::Version;
use speclsp::reference::{
    is_identifier, render_description, subsequence_matcher, ReferenceCategory, ReferenceItem,
    SourceKey, TruncationLevel,
};
use speclsp::traverse::{collect_all_declarations, OutlineKind, OutlineSymbol};

use crate::types::{line_to_cursor, word_at, Range};
use crate::Backend;

/// Signature help: find the unfinished call behind the cursor, then offer
/// every known signature of the callee. The previously selected signature
/// stays selected while the candidate set is unchanged, so flipping through
/// overloads survives further typing.
pub async fn handle_signature_help(
    backend: &Backend,
    params: SignatureHelpParams,
) -> Result<Option<SignatureHelp>> {
    let uri = params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;

    let site = {
        let files = backend.files.read().await;
        let Some(file_data) = files.get(&uri) else {
            return Err(tower_lsp::jsonrpc::Error::invalid_request());
        };
        let Some(line) = line_to_cursor(&file_data.document_data.content, position) else {
            return Ok(None);
        };
        match speclsp::callsite::find_call_site(&line) {
            Some(site) => site,
            None => return Ok(None),
        }
    };

    let config = backend.config.read().await;
    let version = config.spec_version.clone();
    let store = backend.store.read().await;

    let mut signatures = Vec::new();
    for (_, item) in store.lookup(&site.callee) {
        signatures.extend(signature_forms(
            item,
            config.signature_truncation,
            version.as_ref(),
        ));
    }
    if signatures.is_empty() {
        return Ok(None);
    }

    let labels: Vec<String> = signatures.iter().map(|s| s.label.clone()).collect();
    let from_context = params
        .context
        .as_ref()
        .and_then(|c| c.active_signature_help.as_ref())
        .and_then(|h| h.active_signature);
    let active_signature = {
        let mut state = backend.signature_state.lock();
        let active = if state.labels == labels {
            from_context
                .unwrap_or(state.active)
                .min(labels.len() as u32 - 1)
        } else {
            0
        };
        state.labels = labels;
        state.active = active;
        active
    };

    let parameter_count = signatures[active_signature as usize]
        .parameters
        .as_ref()
        .map(Vec::len)
        .unwrap_or(0) as u32;
    let active_parameter = site.active_parameter.min(parameter_count.saturating_sub(1));

    Ok(Some(SignatureHelp {
        signatures,
        active_signature: Some(active_signature),
        active_parameter: Some(active_parameter),
    }))
}

/// Signature entries for one callee: the canonical form plus one entry per
/// overload. Only function-category items apply; the call-site scanner
/// already required an `identifier(` form, which macro-style invocations
/// never present.
fn signature_forms(
    item: &ReferenceItem,
    truncation: TruncationLevel,
    version: Option<&Version>,
) -> Vec<SignatureInformation> {
    if item.category != ReferenceCategory::Function || !item.is_available(version) {
        return Vec::new();
    }
    let documentation = render_description(item, truncation, version).map(Documentation::String);
    std::iter::once(item.signature.as_str())
        .chain(item.overloads.iter().map(|o| o.signature.as_str()))
        .map(|form| SignatureInformation {
            label: form.to_string(),
            documentation: documentation.clone(),
            parameters: Some(
                speclsp::callsite::split_parameters(form)
                    .into_iter()
                    .map(|p| ParameterInformation {
                        label: ParameterLabel::Simple(p),
                        documentation: None,
                    })
                    .collect(),
            ),
            active_parameter: None,
        })
        .collect()
}

pub async fn handle_document_symbol(
    backend: &Backend,
    params: DocumentSymbolParams,
) -> Result<Option<DocumentSymbolResponse>> {
    let files = backend.files.read().await;
    let Some(file_data) = files.get(&params.text_document.uri) else {
        return Err(tower_lsp::jsonrpc::Error::invalid_request());
    };
    let symbols = file_data.outline.iter().map(to_document_symbol).collect();
    Ok(Some(DocumentSymbolResponse::Nested(symbols)))
}

fn to_document_symbol(symbol: &OutlineSymbol) -> DocumentSymbol {
    #[allow(deprecated)]
    DocumentSymbol {
        name: symbol.name.clone(),
        detail: symbol.detail.clone(),
        kind: outline_symbol_kind(symbol.kind),
        tags: None,
        deprecated: None,
        range: Range::from(symbol.range).into(),
        selection_range: Range::from(symbol.selection).into(),
        children: Some(symbol.children.iter().map(to_document_symbol).collect()),
    }
}

fn outline_symbol_kind(kind: OutlineKind) -> SymbolKind {
    match kind {
        OutlineKind::Function | OutlineKind::Macro => SymbolKind::FUNCTION,
        OutlineKind::Constant => SymbolKind::CONSTANT,
        OutlineKind::Variable => SymbolKind::VARIABLE,
        OutlineKind::Array => SymbolKind::ARRAY,
        OutlineKind::Mark => SymbolKind::KEY,
    }
}

/// All definition sites across the store, plus nested declarations of the
/// current file that no book carries.
pub async fn handle_goto_definition(
    backend: &Backend,
    params: GotoDefinitionParams,
) -> Result<Option<GotoDefinitionResponse>> {
    let uri = params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;

    let mut locations = Vec::new();
    let word = {
        let files = backend.files.read().await;
        let Some(file_data) = files.get(&uri) else {
            return Err(tower_lsp::jsonrpc::Error::invalid_request());
        };
        let Some((word, _)) = word_at(&file_data.document_data.content, position) else {
            return Ok(None);
        };
        if !is_identifier(&word) {
            return Ok(None);
        }
        if let Some(parse) = &file_data.document_data.parse {
            let declarations = collect_all_declarations(&parse.program);
            if let Some(span) = declarations.get(&word).and_then(|item| item.location) {
                locations.push(Location::new(uri.clone(), Range::from(span).into()));
            }
        }
        word
    };

    let store = backend.store.read().await;
    for (key, item) in store.lookup(&word) {
        // The current document is covered by the declaration collection
        // above, nested declarations included.
        if key == &SourceKey::OpenDocument(uri.clone()) {
            continue;
        }
        if let (Some(url), Some(span)) = (key.url(), item.location) {
            locations.push(Location::new(url.clone(), Range::from(span).into()));
        }
    }
    if locations.is_empty() {
        return Ok(None);
    }
    Ok(Some(GotoDefinitionResponse::Array(locations)))
}

/// Workspace symbols: case-insensitive subsequence match over every
/// file-backed book.
pub async fn handle_workspace_symbol(
    backend: &Backend,
    params: WorkspaceSymbolParams,
) -> Result<Option<Vec<SymbolInformation>>> {
    let matcher = if params.query.is_empty() {
        None
    } else {
        match subsequence_matcher(&params.query) {
            Some(matcher) => Some(matcher),
            // A query with characters outside the identifier alphabet can
            // never match an identifier.
            None => return Ok(None),
        }
    };

    let config = backend.config.read().await;
    let version = config.spec_version.clone();
    drop(config);

    let mut ret = Vec::new();
    let mut missing_locations = 0usize;
    {
        let store = backend.store.read().await;
        for (key, book) in store.iter() {
            let Some(url) = key.url() else {
                continue;
            };
            for (name, item) in book {
                if let Some(matcher) = &matcher {
                    if !matcher.is_match(name) {
                        continue;
                    }
                }
                let Some(span) = item.location else {
                    missing_locations += 1;
                    continue;
                };
                let display = if item.category == ReferenceCategory::Function {
                    format!("{}()", name)
                } else {
                    name.clone()
                };
                let tags = item
                    .deprecation(version.as_ref())
                    .map(|_| vec![SymbolTag::DEPRECATED]);
                #[allow(deprecated)]
                ret.push(SymbolInformation {
                    name: display,
                    kind: category_symbol_kind(item.category),
                    tags,
                    deprecated: None,
                    location: Location::new(url.clone(), Range::from(span).into()),
                    container_name: None,
                });
            }
        }
    }
    if missing_locations > 0 {
        backend
            .client
            .log_message(
                MessageType::WARNING,
                format!(
                    "workspace symbols: skipped {} indexed entries without a source location",
                    missing_locations
                ),
            )
            .await;
    }
    Ok(Some(ret))
}

fn category_symbol_kind(category: ReferenceCategory) -> SymbolKind {
    match category {
        ReferenceCategory::Constant => SymbolKind::CONSTANT,
        ReferenceCategory::Array => SymbolKind::ARRAY,
        ReferenceCategory::Function | ReferenceCategory::Macro => SymbolKind::FUNCTION,
        _ => SymbolKind::VARIABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speclsp::reference::Overload;

    #[test]
    fn macro_style_items_offer_no_signatures() {
        let item = ReferenceItem::new("wm", ReferenceCategory::Macro);
        assert!(signature_forms(&item, TruncationLevel::Full, None).is_empty());
    }

    #[test]
    fn overloads_become_separate_signatures() {
        let mut item = ReferenceItem::new("substr(s, start)", ReferenceCategory::Function);
        item.overloads.push(Overload {
            signature: "substr(s, start, length)".to_string(),
            description: None,
        });
        let forms = signature_forms(&item, TruncationLevel::Full, None);
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[1].label, "substr(s, start, length)");
        assert_eq!(forms[1].parameters.as_ref().unwrap().len(), 3);
    }
}
