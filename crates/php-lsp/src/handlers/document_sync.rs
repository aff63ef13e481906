use std::sync::Arc;
use std::time::Duration;

use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams, Url,
};
use tower_lsp::Client;

use crate::convert::position_to_byte_offset;
use crate::state::WorldState;

use super::diagnostics::publish_diagnostics;

/// Edit bursts collapse into one reparse per document.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

pub async fn handle_did_open(
    client: &Client,
    state: &Arc<WorldState>,
    params: DidOpenTextDocumentParams,
) {
    let uri = params.text_document.uri;
    state.open_document(uri.clone(), &params.text_document.text);
    publish_diagnostics(client, state, &uri).await;
}

pub async fn handle_did_change(
    client: &Client,
    state: &Arc<WorldState>,
    params: DidChangeTextDocumentParams,
) {
    let uri = params.text_document.uri;

    let generation = {
        let Some(mut doc) = state.documents.get_mut(&uri) else {
            return;
        };
        let mut generation = doc.generation;
        for change in params.content_changes {
            generation = match change.range {
                Some(range) => {
                    let start = position_to_byte_offset(&doc.rope, range.start);
                    let end = position_to_byte_offset(&doc.rope, range.end);
                    match (start, end) {
                        (Some(start), Some(end)) => doc.splice(start, end, &change.text),
                        _ => doc.replace(&change.text),
                    }
                }
                None => doc.replace(&change.text),
            };
        }
        generation
    };

    schedule_reparse(client.clone(), state.clone(), uri, generation);
}

/// Debounced latest-wins reparse: the task commits only when no newer edit
/// arrived while it slept, so an older parse can never land on top of a
/// newer one.
fn schedule_reparse(client: Client, state: Arc<WorldState>, uri: Url, generation: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(DEBOUNCE).await;

        let current = state.documents.get(&uri).map(|doc| doc.generation);
        if current != Some(generation) {
            tracing::trace!(%uri, generation, "reparse superseded");
            return;
        }
        state.commit_document(&uri);
        publish_diagnostics(&client, &state, &uri).await;
    });
}

pub async fn handle_did_close(_state: &Arc<WorldState>, params: DidCloseTextDocumentParams) {
    // Keep the document: cross-file features still need its symbols. The
    // file watcher handles actual deletions.
    let _ = &params.text_document.uri;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_generation_wins() {
        let state = Arc::new(WorldState::new());
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(uri.clone(), "<?php class First {}");

        // Two quick edits; only the second should survive the debounce.
        {
            let mut doc = state.documents.get_mut(&uri).unwrap();
            doc.replace("<?php class Second {}");
            doc.replace("<?php class Third {}");
        }
        let stale_generation = 1;
        let fresh_generation = 2;

        // A stale task must observe the newer generation and bail.
        let current = state.documents.get(&uri).map(|d| d.generation);
        assert_ne!(current, Some(stale_generation));
        assert_eq!(current, Some(fresh_generation));

        state.commit_document(&uri);
        let store = state.store.read().unwrap();
        use php_syntax::symbol::SymbolKind;
        assert!(store.find("First", |s| s.kind == SymbolKind::Class).is_empty());
        assert!(store.find("Second", |s| s.kind == SymbolKind::Class).is_empty());
        assert_eq!(store.find("Third", |s| s.kind == SymbolKind::Class).len(), 1);
    }

    #[tokio::test]
    async fn test_incremental_splice_matches_full_text() {
        let state = Arc::new(WorldState::new());
        let uri = Url::parse("file:///w/a.php").unwrap();
        let source = "<?php class Name {}";
        state.open_document(uri.clone(), source);

        {
            let mut doc = state.documents.get_mut(&uri).unwrap();
            let at = source.find("Name").unwrap();
            doc.splice(at, at + "Name".len(), "Renamed");
        }
        state.commit_document(&uri);

        let store = state.store.read().unwrap();
        use php_syntax::symbol::SymbolKind;
        assert_eq!(
            store.find("Renamed", |s| s.kind == SymbolKind::Class).len(),
            1
        );
    }

}
