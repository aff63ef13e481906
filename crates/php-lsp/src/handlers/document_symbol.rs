use lsp_types::{DocumentSymbolParams, DocumentSymbolResponse, Location, SymbolInformation};

use php_syntax::symbol::{Modifiers, SymbolKind};

use crate::convert::span_to_range;
use crate::state::WorldState;

/// Flatten the document's symbol tree, excluding parameters, function-scoped
/// locals and `use` imports. Members report their class as the container;
/// namespaced top-level symbols split on the last separator.
#[allow(deprecated)] // SymbolInformation::deprecated field is deprecated in the type itself
pub fn handle_document_symbol(
    state: &WorldState,
    params: DocumentSymbolParams,
) -> Option<DocumentSymbolResponse> {
    let uri = params.text_document.uri;
    let doc = state.documents.get(&uri)?;
    let store = state.store.read().unwrap();
    let table = store.table(&uri)?;

    let mut symbols = Vec::new();
    for (id, symbol) in table.iter() {
        if id == table.root()
            || symbol.kind == SymbolKind::Parameter
            || symbol.modifiers.contains(Modifiers::USE)
            || symbol.name.is_empty()
        {
            continue;
        }
        if symbol.kind == SymbolKind::Variable {
            let parent_kind = symbol.parent.map(|p| table.get(p).kind);
            if matches!(
                parent_kind,
                Some(SymbolKind::Function) | Some(SymbolKind::Method)
            ) {
                continue;
            }
        }

        let (name, container) = match &symbol.scope {
            Some(scope) if !scope.is_empty() => (symbol.name.clone(), Some(scope.clone())),
            _ => match symbol.name.rfind('\\') {
                Some(at) => (
                    symbol.name[at + 1..].to_string(),
                    Some(symbol.name[..at].to_string()),
                ),
                None => (symbol.name.clone(), None),
            },
        };

        symbols.push(SymbolInformation {
            name,
            kind: symbol.kind.lsp_kind(),
            tags: None,
            deprecated: None,
            location: Location {
                uri: uri.clone(),
                range: span_to_range(Some(&doc.rope), symbol.span),
            },
            container_name: container,
        });
    }

    if symbols.is_empty() {
        return None;
    }
    Some(DocumentSymbolResponse::Flat(symbols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{PartialResultParams, TextDocumentIdentifier, Url, WorkDoneProgressParams};

    fn params(uri: Url) -> DocumentSymbolParams {
        DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        }
    }

    #[test]
    fn test_document_symbols_flattened() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
namespace App;

class User
{
    public string $name;
    public function rename(string $to) { $old = $this->name; }
}
"#,
        );

        let result = handle_document_symbol(&state, params(uri)).expect("symbols");
        let DocumentSymbolResponse::Flat(symbols) = result else {
            panic!("expected flat response");
        };
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();

        assert!(names.contains(&"User"));
        assert!(names.contains(&"$name"));
        assert!(names.contains(&"rename"));
        // Parameters and locals stay out of the outline.
        assert!(!names.contains(&"$to"));
        assert!(!names.contains(&"$old"));

        let user = symbols.iter().find(|s| s.name == "User").unwrap();
        assert_eq!(user.container_name.as_deref(), Some("App"));
        let rename = symbols.iter().find(|s| s.name == "rename").unwrap();
        assert_eq!(rename.container_name.as_deref(), Some("App\\User"));
    }
}
