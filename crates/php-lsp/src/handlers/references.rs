use lsp_types::{Location, ReferenceParams};

use php_syntax::aggregate::{MemberMergeStrategy, TypeAggregate};
use php_syntax::references::{Reference, ReferenceKind};
use php_syntax::store::SymbolStore;
use php_syntax::symbol::{Modifiers, SymbolKind};

use crate::convert::{position_to_byte_offset, span_to_range, symbol_location};
use crate::state::WorldState;

/// Find every occurrence of the symbol under the cursor. Resolution goes
/// through the base-most declaration so overrides across the hierarchy share
/// one result set.
pub fn handle_references(state: &WorldState, params: ReferenceParams) -> Option<Vec<Location>> {
    let uri = params.text_document_position.text_document.uri;
    let position = params.text_document_position.position;
    let include_declaration = params.context.include_declaration;

    let byte_offset = {
        let doc = state.documents.get(&uri)?;
        position_to_byte_offset(&doc.rope, position)?
    };

    let store = state.store.read().unwrap();
    let reference = store
        .reference_at(&uri, byte_offset)
        .or_else(|| store.declaration_reference_at(&uri, byte_offset))?;
    let symbols = store.find_symbols_by_reference(&reference, MemberMergeStrategy::Base);

    let mut locations = Vec::new();
    if include_declaration {
        for &symbol_ref in &symbols {
            if let Some(location) = symbol_location(state, &store, symbol_ref) {
                locations.push(location);
            }
        }
    }

    match reference.kind {
        ReferenceKind::Variable | ReferenceKind::Parameter => {
            collect_variable_references(state, &store, &uri, byte_offset, &reference, &mut locations);
        }
        ReferenceKind::Method
        | ReferenceKind::Property
        | ReferenceKind::ClassConstant
        | ReferenceKind::Constructor => {
            for &symbol_ref in &symbols {
                let Some(symbol) = store.get(symbol_ref) else {
                    continue;
                };
                let Some(base_scope) = symbol.scope.clone() else {
                    continue;
                };
                let matches = store.find_references(&symbol.name, |r| {
                    member_kind_matches(r.kind, symbol.kind)
                        && r.scope.as_deref().is_some_and(|scope| {
                            TypeAggregate::new(&store, scope)
                                .is_some_and(|a| a.is_associated_with(&base_scope))
                        })
                });
                push_reference_locations(state, &store, matches, &mut locations);
            }
        }
        _ => {
            for &symbol_ref in &symbols {
                let Some(symbol) = store.get(symbol_ref) else {
                    continue;
                };
                let kind = symbol.kind;
                let matches = store.find_references(&symbol.name, |r| {
                    top_level_kind_matches(r.kind, kind)
                });
                push_reference_locations(state, &store, matches, &mut locations);
            }
        }
    }

    locations.dedup_by(|a, b| a.uri == b.uri && a.range == b.range);
    if locations.is_empty() {
        return None;
    }
    Some(locations)
}

/// Locals resolve within their function body, plus any nested closures that
/// capture the same name through a `use` clause.
fn collect_variable_references(
    state: &WorldState,
    store: &SymbolStore,
    uri: &lsp_types::Url,
    byte_offset: usize,
    reference: &Reference,
    locations: &mut Vec<Location>,
) {
    let Some(table) = store.table(uri) else {
        return;
    };
    let scope_id = table.function_scope_at(byte_offset);
    let scope_span = table.get(scope_id).span;
    let doc = state.documents.get(uri);
    let rope = doc.as_deref().map(|d| &d.rope);

    let mut scopes = vec![scope_id];
    for (id, symbol) in table.iter() {
        // Nested closures capturing the variable join the result set.
        if symbol.kind == SymbolKind::Function
            && symbol.modifiers.contains(Modifiers::ANONYMOUS)
            && scope_span.contains(symbol.span.start_byte)
            && symbol.children.iter().any(|&c| {
                let child = table.get(c);
                child.modifiers.contains(Modifiers::USE) && child.name == reference.name
            })
        {
            scopes.push(id);
        }
    }

    for scope in scopes {
        for r in table.references(scope) {
            if r.kind == ReferenceKind::Variable && r.name == reference.name {
                locations.push(Location {
                    uri: uri.clone(),
                    range: span_to_range(rope, r.span),
                });
            }
        }
    }
}

fn push_reference_locations(
    state: &WorldState,
    store: &SymbolStore,
    references: Vec<Reference>,
    locations: &mut Vec<Location>,
) {
    for r in references {
        let Some(uri) = store.uri_for_hash(r.uri_hash) else {
            continue;
        };
        let doc = state.documents.get(uri);
        locations.push(Location {
            uri: uri.clone(),
            range: span_to_range(doc.as_deref().map(|d| &d.rope), r.span),
        });
    }
}

fn member_kind_matches(reference: ReferenceKind, symbol: SymbolKind) -> bool {
    matches!(
        (reference, symbol),
        (ReferenceKind::Method, SymbolKind::Method)
            | (ReferenceKind::Constructor, SymbolKind::Method)
            | (ReferenceKind::Property, SymbolKind::Property)
            | (ReferenceKind::ClassConstant, SymbolKind::ClassConstant)
    )
}

fn top_level_kind_matches(reference: ReferenceKind, symbol: SymbolKind) -> bool {
    match symbol {
        SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait => matches!(
            reference,
            ReferenceKind::Class
                | ReferenceKind::Interface
                | ReferenceKind::Trait
                | ReferenceKind::Constructor
        ),
        SymbolKind::Function => reference == ReferenceKind::Function,
        SymbolKind::Constant => reference == ReferenceKind::Constant,
        SymbolKind::Namespace => reference == ReferenceKind::Namespace,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{
        PartialResultParams, Position, ReferenceContext, TextDocumentIdentifier,
        TextDocumentPositionParams, Url, WorkDoneProgressParams,
    };

    fn reference_params(uri: Url, line: u32, character: u32, decl: bool) -> ReferenceParams {
        ReferenceParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: ReferenceContext {
                include_declaration: decl,
            },
        }
    }

    #[test]
    fn test_method_references_include_declaration_and_call() {
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

        // Cursor on the declaration name `bar` (line 3, col 20).
        let with_decl =
            handle_references(&state, reference_params(uri.clone(), 3, 21, true)).expect("refs");
        assert_eq!(with_decl.len(), 2, "got: {with_decl:?}");
        assert!(with_decl.iter().any(|l| l.range.start.line == 3));
        assert!(with_decl.iter().any(|l| l.range.start.line == 6));

        let without_decl =
            handle_references(&state, reference_params(uri, 3, 21, false)).expect("refs");
        assert_eq!(without_decl.len(), 1);
        assert_eq!(without_decl[0].range.start.line, 6);
    }

    #[test]
    fn test_variable_references_stay_in_scope() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
function first()
{
    $x = 1;
    $y = $x;
}
function second()
{
    $x = 2;
}
"#,
        );

        // Cursor on `$x` inside first() (line 3, col 4).
        let locations =
            handle_references(&state, reference_params(uri, 3, 5, false)).expect("refs");
        assert_eq!(locations.len(), 2);
        assert!(locations.iter().all(|l| l.range.start.line <= 4));
    }

    #[test]
    fn test_variable_references_follow_closure_captures() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
function outer()
{
    $n = 1;
    $f = function () use ($n) {
        return $n;
    };
}
"#,
        );

        // Cursor on the first `$n` (line 3, col 4).
        let locations =
            handle_references(&state, reference_params(uri, 3, 5, false)).expect("refs");
        // $n assignment site + capture-scope usage inside the closure.
        assert!(
            locations.iter().any(|l| l.range.start.line == 5),
            "closure body usage missing: {locations:?}"
        );
    }

    #[test]
    fn test_class_references_cross_documents() {
        let state = WorldState::new();
        let lib = Url::parse("file:///w/lib.php").unwrap();
        let app = Url::parse("file:///w/app.php").unwrap();
        state.open_document(lib.clone(), "<?php class Shared {}");
        state.open_document(
            app.clone(),
            r#"<?php
function takes(Shared $s) {}
$x = new Shared();
"#,
        );

        // Cursor on the parameter type in app.php (line 1, col 15).
        let locations =
            handle_references(&state, reference_params(app.clone(), 1, 16, false)).expect("refs");
        assert!(locations.len() >= 2, "got: {locations:?}");
        assert!(locations.iter().all(|l| l.uri == app));
    }

    #[test]
    fn test_override_references_unify_on_base() {
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
$b = new Base();
$b->run();
"#,
        );

        // Cursor on the call through Child (line 10, col 4). Base merge makes
        // both call sites refer to the one canonical declaration.
        let locations =
            handle_references(&state, reference_params(uri, 10, 5, false)).expect("refs");
        assert!(locations.iter().any(|l| l.range.start.line == 10));
        assert!(locations.iter().any(|l| l.range.start.line == 12));
    }
}
