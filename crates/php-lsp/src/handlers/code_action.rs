use std::collections::HashMap;

use lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, CodeActionParams, Position, Range, TextEdit,
    WorkspaceEdit,
};

use php_syntax::edits::import_symbol;

use crate::convert::{byte_offset_to_position, position_to_byte_offset, span_to_range};
use crate::state::WorldState;

pub fn handle_code_action(
    state: &WorldState,
    params: CodeActionParams,
) -> Option<Vec<CodeActionOrCommand>> {
    let uri = params.text_document.uri;
    let doc = state.documents.get(&uri)?;
    let source = doc.source();

    let byte_offset = position_to_byte_offset(&doc.rope, params.range.start)?;
    let edit = import_symbol(&doc.tree, &source, byte_offset)?;

    let mut edits = Vec::new();
    if let Some((insert_at, text)) = &edit.use_insert {
        let at: Position = byte_offset_to_position(&doc.rope, *insert_at);
        edits.push(TextEdit {
            range: Range {
                start: at,
                end: at,
            },
            new_text: text.clone(),
        });
    }
    edits.push(TextEdit {
        range: span_to_range(Some(&doc.rope), edit.replace_span),
        new_text: edit.replace_text.clone(),
    });

    let mut changes = HashMap::new();
    changes.insert(uri, edits);

    let action = CodeAction {
        title: format!("Import {}", edit.fqn),
        kind: Some(CodeActionKind::QUICKFIX),
        edit: Some(WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        }),
        ..Default::default()
    };
    Some(vec![CodeActionOrCommand::CodeAction(action)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{
        PartialResultParams, TextDocumentIdentifier, Url, WorkDoneProgressParams,
    };

    fn action_params(uri: Url, line: u32, character: u32) -> CodeActionParams {
        CodeActionParams {
            text_document: TextDocumentIdentifier { uri },
            range: Range {
                start: Position { line, character },
                end: Position { line, character },
            },
            context: lsp_types::CodeActionContext {
                diagnostics: Vec::new(),
                only: None,
                trigger_kind: None,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        }
    }

    #[test]
    fn test_import_symbol_action() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/b.php").unwrap();
        state.open_document(uri.clone(), "<?php namespace Baz;\n$v = new \\Foo\\Bar;\n");

        // Cursor on `Bar` (line 1, col 15).
        let actions = handle_code_action(&state, action_params(uri.clone(), 1, 15)).expect("action");
        assert_eq!(actions.len(), 1);
        let CodeActionOrCommand::CodeAction(action) = &actions[0] else {
            panic!("expected code action");
        };
        assert_eq!(action.title, "Import Foo\\Bar");

        let changes = action.edit.as_ref().unwrap().changes.as_ref().unwrap();
        let edits = &changes[&uri];
        assert_eq!(edits.len(), 2);
        // The use statement lands after the namespace declaration.
        assert_eq!(edits[0].new_text, "\n\nuse Foo\\Bar;");
        assert_eq!(edits[0].range.start.line, 0);
        // The qualified name collapses to the short name.
        assert_eq!(edits[1].new_text, "Bar");
        assert_eq!(edits[1].range.start.line, 1);
    }

    #[test]
    fn test_no_action_without_qualified_name() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/b.php").unwrap();
        state.open_document(uri.clone(), "<?php\n$v = 1;\n");
        assert!(handle_code_action(&state, action_params(uri, 1, 1)).is_none());
    }
}
