use std::sync::Arc;

use lsp_types::Url;
use tower_lsp::Client;

use php_syntax::diagnostics::extract_diagnostics;

use crate::state::WorldState;

pub async fn publish_diagnostics(client: &Client, state: &Arc<WorldState>, uri: &Url) {
    let diagnostics = {
        let Some(doc) = state.documents.get(uri) else {
            return;
        };
        extract_diagnostics(&doc.tree, &doc.source())
    };
    client
        .publish_diagnostics(uri.clone(), diagnostics, None)
        .await;
}
