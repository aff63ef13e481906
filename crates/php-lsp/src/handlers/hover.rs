use lsp_types::{Hover, HoverContents, HoverParams, MarkupContent, MarkupKind};

use php_syntax::aggregate::MemberMergeStrategy;
use php_syntax::symbol::Symbol;

use crate::convert::position_to_byte_offset;
use crate::state::WorldState;

pub fn handle_hover(state: &WorldState, params: HoverParams) -> Option<Hover> {
    let uri = params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;

    let byte_offset = {
        let doc = state.documents.get(&uri)?;
        position_to_byte_offset(&doc.rope, position)?
    };

    let store = state.store.read().unwrap();
    let reference = store
        .reference_at(&uri, byte_offset)
        .or_else(|| store.declaration_reference_at(&uri, byte_offset))?;
    // Documented merge walks inherited declarations for a doc summary when
    // the local one has none.
    let symbols = store.find_symbols_by_reference(&reference, MemberMergeStrategy::Documented);
    let symbol = symbols.first().and_then(|&r| store.get(r))?;
    let description = symbols
        .iter()
        .filter_map(|&r| store.get(r))
        .find_map(|s| s.description.clone());

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: format_hover(symbol, description.as_deref()),
        }),
        range: None,
    })
}

/// Format symbol info as Markdown for hover display.
fn format_hover(symbol: &Symbol, description: Option<&str>) -> String {
    let type_text = symbol
        .type_info
        .as_ref()
        .map(|t| format!(": {t}"))
        .unwrap_or_default();
    let mut out = format!(
        "```php\n({}) {}{}\n```",
        symbol.kind.label(),
        symbol.name,
        type_text
    );
    if let Some(description) = description {
        out.push_str("\n\n");
        out.push_str(description);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{
        Position, TextDocumentIdentifier, TextDocumentPositionParams, Url, WorkDoneProgressParams,
    };

    fn hover_params(uri: Url, line: u32, character: u32) -> HoverParams {
        HoverParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
        }
    }

    fn hover_text(hover: Hover) -> String {
        match hover.contents {
            HoverContents::Markup(m) => m.value,
            _ => panic!("expected markup"),
        }
    }

    #[test]
    fn test_hover_on_method_call() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Conn {}
class Db
{
    /**
     * Opens the connection.
     */
    public function open(): Conn { return new Conn(); }
}
$db = new Db();
$db->open();
"#,
        );

        // Cursor on `open` in the call (line 10, col 6).
        let hover = handle_hover(&state, hover_params(uri, 10, 6)).expect("hover");
        let text = hover_text(hover);
        assert!(text.contains("(method) open: Conn"), "got: {text}");
        assert!(text.contains("Opens the connection."), "got: {text}");
    }

    #[test]
    fn test_hover_inherits_documentation() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Base
{
    /**
     * Runs the job.
     */
    public function run() {}
}
class Child extends Base
{
    public function run() {}
}
$c = new Child();
$c->run();
"#,
        );

        // Cursor on `run` in the call (line 13, col 5).
        let hover = handle_hover(&state, hover_params(uri, 13, 5)).expect("hover");
        assert!(hover_text(hover).contains("Runs the job."));
    }

    #[test]
    fn test_hover_on_nothing() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(uri.clone(), "<?php\n");
        assert!(handle_hover(&state, hover_params(uri, 0, 2)).is_none());
    }
}
