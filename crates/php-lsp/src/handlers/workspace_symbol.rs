use lsp_types::{SymbolInformation, WorkspaceSymbolParams};

use php_syntax::symbol::{Modifiers, SymbolKind};

use crate::convert::symbol_location;
use crate::state::WorldState;

/// Hard cap on fuzzy search results.
const MAX_RESULTS: usize = 100;

#[allow(deprecated)] // SymbolInformation::deprecated field is deprecated in the type itself
pub fn handle_workspace_symbol(
    state: &WorldState,
    params: WorkspaceSymbolParams,
) -> Option<Vec<SymbolInformation>> {
    let store = state.store.read().unwrap();

    let hits = store.match_fuzzy(&params.query, |s| {
        !s.modifiers
            .intersects(Modifiers::ANONYMOUS | Modifiers::USE | Modifiers::PRIVATE)
            && !matches!(s.kind, SymbolKind::Parameter | SymbolKind::File)
    });

    let mut symbols = Vec::new();
    for symbol_ref in hits {
        if symbols.len() >= MAX_RESULTS {
            break;
        }
        let Some(symbol) = store.get(symbol_ref) else {
            continue;
        };
        // Built-ins and other location-less entries are not navigable.
        let Some(location) = symbol_location(state, &store, symbol_ref) else {
            continue;
        };
        symbols.push(SymbolInformation {
            name: symbol.name.clone(),
            kind: symbol.kind.lsp_kind(),
            tags: None,
            deprecated: None,
            location,
            container_name: symbol.scope.clone(),
        });
    }

    if symbols.is_empty() {
        return None;
    }
    Some(symbols)
}
