use lsp_types::{GotoDefinitionParams, GotoDefinitionResponse, Location};

use php_syntax::aggregate::MemberMergeStrategy;

use crate::convert::{position_to_byte_offset, symbol_location};
use crate::state::WorldState;

/// Resolve the reference under the cursor to its most-derived declaration.
pub fn handle_goto_definition(
    state: &WorldState,
    params: GotoDefinitionParams,
) -> Option<GotoDefinitionResponse> {
    let uri = params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;

    let byte_offset = {
        let doc = state.documents.get(&uri)?;
        position_to_byte_offset(&doc.rope, position)?
    };

    let store = state.store.read().unwrap();
    let reference = store.reference_at(&uri, byte_offset)?;
    let symbols = store.find_symbols_by_reference(&reference, MemberMergeStrategy::Override);

    let locations: Vec<Location> = symbols
        .into_iter()
        .filter_map(|r| symbol_location(state, &store, r))
        .collect();

    match locations.len() {
        0 => None,
        1 => Some(GotoDefinitionResponse::Scalar(
            locations.into_iter().next().unwrap(),
        )),
        _ => Some(GotoDefinitionResponse::Array(locations)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{
        PartialResultParams, Position, TextDocumentIdentifier, TextDocumentPositionParams, Url,
        WorkDoneProgressParams,
    };

    fn goto_params(uri: Url, line: u32, character: u32) -> GotoDefinitionParams {
        GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        }
    }

    fn locations_from(response: GotoDefinitionResponse) -> Vec<Location> {
        match response {
            GotoDefinitionResponse::Scalar(location) => vec![location],
            GotoDefinitionResponse::Array(locations) => locations,
            GotoDefinitionResponse::Link(_) => vec![],
        }
    }

    #[test]
    fn test_goto_method_definition() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Test
{
    public function bar() {}
}
$v = new Test();
$v->bar();
"#,
        );

        // Cursor on `bar` in the call (line 6, col 4).
        let result = handle_goto_definition(&state, goto_params(uri.clone(), 6, 4));
        let locations = locations_from(result.expect("definition"));
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri, uri);
        assert_eq!(locations[0].range.start.line, 3);
    }

    #[test]
    fn test_goto_class_definition_cross_document() {
        let state = WorldState::new();
        let lib_uri = Url::parse("file:///w/lib.php").unwrap();
        let app_uri = Url::parse("file:///w/app.php").unwrap();
        state.open_document(
            lib_uri.clone(),
            r#"<?php
namespace Lib;
class Service {}
"#,
        );
        state.open_document(
            app_uri.clone(),
            r#"<?php
namespace App;

use Lib\Service;

function make(Service $s) {}
"#,
        );

        // Cursor on `Service` in the parameter type (line 5, col 15).
        let result = handle_goto_definition(&state, goto_params(app_uri, 5, 15));
        let locations = locations_from(result.expect("definition"));
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri, lib_uri);
        assert_eq!(locations[0].range.start.line, 2);
    }

    #[test]
    fn test_goto_magic_property_targets_doc_comment() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
/** @property int $p */
class Magic {}
$m = new Magic();
$m->p;
"#,
        );

        // Cursor on `p` in the access (line 4, col 4).
        let result = handle_goto_definition(&state, goto_params(uri, 4, 4));
        let locations = locations_from(result.expect("definition"));
        assert_eq!(locations.len(), 1);
        // Magic members live at the doc comment's location.
        assert_eq!(locations[0].range.start.line, 1);
    }

    #[test]
    fn test_goto_override_prefers_most_derived() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Base
{
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

        // Cursor on `run` in the call (line 10, col 4).
        let result = handle_goto_definition(&state, goto_params(uri, 10, 4));
        let locations = locations_from(result.expect("definition"));
        assert_eq!(locations.len(), 1);
        // The Child override, not the Base declaration.
        assert_eq!(locations[0].range.start.line, 7);
    }
}
