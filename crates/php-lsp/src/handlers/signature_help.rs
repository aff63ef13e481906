use lsp_types::{
    ParameterInformation, ParameterLabel, SignatureHelp, SignatureHelpParams, SignatureInformation,
};

use php_syntax::aggregate::MemberMergeStrategy;
use php_syntax::symbol::{Symbol, SymbolKind, SymbolTable};

use crate::convert::position_to_byte_offset;
use crate::state::WorldState;

pub fn handle_signature_help(
    state: &WorldState,
    params: SignatureHelpParams,
) -> Option<SignatureHelp> {
    let uri = params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;

    let (byte_offset, tree) = {
        let doc = state.documents.get(&uri)?;
        let offset = position_to_byte_offset(&doc.rope, position)?;
        (offset, doc.tree.clone())
    };

    let store = state.store.read().unwrap();

    // Walk up from the cursor to the enclosing call expression.
    let mut node = tree
        .root_node()
        .named_descendant_for_byte_range(byte_offset, byte_offset)?;
    loop {
        if matches!(
            node.kind(),
            "function_call_expression"
                | "member_call_expression"
                | "nullsafe_member_call_expression"
                | "scoped_call_expression"
                | "object_creation_expression"
        ) {
            break;
        }
        node = node.parent()?;
    }

    // The callee name sits before the argument list; resolve through its
    // stamped reference.
    let callee = node
        .child_by_field_name("function")
        .or_else(|| node.child_by_field_name("name"))
        .or_else(|| node.named_child(0))?;
    let reference = store.reference_at(&uri, callee.start_byte())?;
    let symbols = store.find_symbols_by_reference(&reference, MemberMergeStrategy::Override);
    let symbol_ref = symbols
        .iter()
        .copied()
        .find(|&r| store.get(r).is_some())?;
    let symbol = store.get(symbol_ref)?;
    let table = store.table_by_hash(symbol_ref.uri_hash)?;

    let active_parameter = node
        .child_by_field_name("arguments")
        .map(|args| {
            let mut cursor = args.walk();
            args.children(&mut cursor)
                .filter(|c| c.kind() == "," && c.start_byte() < byte_offset)
                .count() as u32
        })
        .unwrap_or(0);

    Some(SignatureHelp {
        signatures: vec![signature_of(table, symbol_ref.id, symbol)],
        active_signature: Some(0),
        active_parameter: Some(active_parameter),
    })
}

fn signature_of(
    table: &SymbolTable,
    id: php_syntax::symbol::SymbolId,
    symbol: &Symbol,
) -> SignatureInformation {
    let parameters: Vec<String> = table
        .children(id)
        .iter()
        .map(|&c| table.get(c))
        .filter(|s| s.kind == SymbolKind::Parameter)
        .map(|p| match &p.type_info {
            Some(t) => format!("{t} {}", p.name),
            None => p.name.clone(),
        })
        .collect();

    let label = format!("{}({})", symbol.name, parameters.join(", "));
    SignatureInformation {
        label,
        documentation: symbol
            .description
            .clone()
            .map(lsp_types::Documentation::String),
        parameters: Some(
            parameters
                .into_iter()
                .map(|p| ParameterInformation {
                    label: ParameterLabel::Simple(p),
                    documentation: None,
                })
                .collect(),
        ),
        active_parameter: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{
        Position, TextDocumentIdentifier, TextDocumentPositionParams, Url, WorkDoneProgressParams,
    };

    fn signature_params(uri: Url, line: u32, character: u32) -> SignatureHelpParams {
        SignatureHelpParams {
            context: None,
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
        }
    }

    #[test]
    fn test_signature_for_function_call() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
function add(int $a, int $b) {}
add(1, 2);
"#,
        );

        // Cursor after the comma (line 2, col 7).
        let help = handle_signature_help(&state, signature_params(uri, 2, 7)).expect("signature");
        assert_eq!(help.signatures.len(), 1);
        assert_eq!(help.signatures[0].label, "add(int $a, int $b)");
        assert_eq!(help.active_parameter, Some(1));
    }

    #[test]
    fn test_signature_for_method_call() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Mailer
{
    public function send(string $to, string $body) {}
}
$m = new Mailer();
$m->send('a@b.c', );
"#,
        );

        // Cursor inside the argument list after the comma (line 6, col 18).
        let help = handle_signature_help(&state, signature_params(uri, 6, 18)).expect("signature");
        assert!(help.signatures[0].label.starts_with("send("));
        assert_eq!(help.active_parameter, Some(1));
    }
}
