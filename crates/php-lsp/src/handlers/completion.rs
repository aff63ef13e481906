use lsp_types::{
    CompletionItem, CompletionItemKind, CompletionParams, CompletionResponse, Documentation,
};

use php_syntax::aggregate::{MemberMergeStrategy, TypeAggregate};
use php_syntax::expr_types::{resolve_expr_type, visibility_mask, ExprContext};
use php_syntax::symbol::{Modifiers, SymbolKind};
use php_syntax::var_types::VariableTypeResolver;

use crate::convert::position_to_byte_offset;
use crate::state::WorldState;

const MAX_RESULTS: usize = 100;

const KEYWORDS: &[&str] = &[
    "abstract", "break", "case", "catch", "class", "clone", "const", "continue", "default", "do",
    "echo", "else", "elseif", "extends", "final", "finally", "foreach", "function", "global", "if",
    "implements", "instanceof", "interface", "namespace", "new", "private", "protected", "public",
    "return", "static", "switch", "throw", "trait", "try", "use", "while", "yield",
];

pub fn handle_completion(state: &WorldState, params: CompletionParams) -> Option<CompletionResponse> {
    let uri = params.text_document_position.text_document.uri;
    let position = params.text_document_position.position;

    let (byte_offset, source, tree) = {
        let doc = state.documents.get(&uri)?;
        let offset = position_to_byte_offset(&doc.rope, position)?;
        (offset, doc.source(), doc.tree.clone())
    };

    let store = state.store.read().unwrap();
    let table = store.table(&uri)?;

    // Variable and member completion both need local types at the cursor.
    let mut resolver = VariableTypeResolver::with_halt(&store, table, &source, byte_offset);
    resolver.walk(tree.root_node());

    let before = &source[..byte_offset.min(source.len())];
    let items = if let Some(receiver_end) = member_access_receiver(before).filter(|&e| e > 0) {
        let ctx = ExprContext {
            source: &source,
            store: &store,
            table,
            resolver: &resolver.resolver,
            vars: &resolver.vars,
        };
        let receiver_node = tree
            .root_node()
            .named_descendant_for_byte_range(receiver_end - 1, receiver_end - 1)?;
        let receiver = resolve_expr_type(&ctx, expression_root(receiver_node, receiver_end));
        let statically = before.trim_end().ends_with("::");
        member_items(&store, &resolver, &receiver, statically)
    } else if current_word(before).starts_with('$') {
        variable_items(&resolver)
    } else {
        name_items(&store, current_word(before))
    };

    if items.is_empty() {
        return None;
    }
    Some(CompletionResponse::Array(items))
}

/// If the text before the cursor ends in `->` or `::` (plus a partial member
/// name), the byte offset where the receiver expression ends.
fn member_access_receiver(before: &str) -> Option<usize> {
    let trimmed = before.trim_end_matches(|c: char| c.is_alphanumeric() || c == '_' || c == '$');
    if let Some(rest) = trimmed.strip_suffix("?->") {
        return Some(rest.trim_end().len());
    }
    if let Some(rest) = trimmed.strip_suffix("->") {
        return Some(rest.trim_end().len());
    }
    if let Some(rest) = trimmed.strip_suffix("::") {
        return Some(rest.trim_end().len());
    }
    None
}

/// Climb from the leaf at the end of the receiver text to the widest
/// expression ending there.
fn expression_root(node: tree_sitter::Node, end: usize) -> tree_sitter::Node {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if parent.end_byte() > end {
            break;
        }
        current = parent;
    }
    current
}

fn current_word(before: &str) -> &str {
    let start = before
        .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .map(|i| i + 1)
        .unwrap_or(0);
    &before[start..]
}

fn member_items(
    store: &php_syntax::store::SymbolStore,
    resolver: &VariableTypeResolver,
    receiver: &php_syntax::type_string::TypeString,
    statically: bool,
) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    for atomic in receiver.atomic_class_array() {
        let Some(aggregate) = TypeAggregate::new(store, atomic) else {
            continue;
        };
        let mask = visibility_mask(
            atomic,
            resolver.resolver.current_class(),
            resolver.resolver.current_base(),
        );
        let members = aggregate.members(MemberMergeStrategy::Override, |s| {
            let reachable = if statically {
                s.modifiers.contains(Modifiers::STATIC) || s.kind == SymbolKind::ClassConstant
            } else {
                !s.modifiers.contains(Modifiers::STATIC) && s.kind != SymbolKind::ClassConstant
            };
            reachable && s.visibility().intersects(mask)
        });
        for member_ref in members {
            let Some(member) = store.get(member_ref) else {
                continue;
            };
            if items.len() >= MAX_RESULTS {
                return items;
            }
            let label = match member.kind {
                // `$obj->prop` completes without the sigil; `Cls::$prop`
                // keeps it.
                SymbolKind::Property if !statically => {
                    member.name.trim_start_matches('$').to_string()
                }
                _ => member.name.clone(),
            };
            items.push(CompletionItem {
                label,
                kind: Some(completion_kind(member.kind)),
                detail: member.type_info.as_ref().map(|t| t.to_string()),
                documentation: member.description.clone().map(Documentation::String),
                ..Default::default()
            });
        }
    }
    items
}

fn variable_items(resolver: &VariableTypeResolver) -> Vec<CompletionItem> {
    let mut items: Vec<CompletionItem> = resolver
        .vars
        .visible_variables()
        .into_iter()
        .take(MAX_RESULTS)
        .map(|(name, type_info)| CompletionItem {
            label: name,
            kind: Some(CompletionItemKind::VARIABLE),
            detail: (!type_info.is_empty()).then(|| type_info.to_string()),
            ..Default::default()
        })
        .collect();
    if !resolver.resolver.current_class().is_empty() {
        items.push(CompletionItem {
            label: "$this".to_string(),
            kind: Some(CompletionItemKind::VARIABLE),
            detail: Some(resolver.resolver.current_class().to_string()),
            ..Default::default()
        });
    }
    items
}

fn name_items(store: &php_syntax::store::SymbolStore, word: &str) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    if word.len() >= 2 {
        for symbol_ref in store.match_fuzzy(word, |s| {
            !s.modifiers.intersects(Modifiers::ANONYMOUS | Modifiers::USE)
                && matches!(
                    s.kind,
                    SymbolKind::Class
                        | SymbolKind::Interface
                        | SymbolKind::Trait
                        | SymbolKind::Function
                        | SymbolKind::Constant
                )
        }) {
            if items.len() >= MAX_RESULTS {
                break;
            }
            let Some(symbol) = store.get(symbol_ref) else {
                continue;
            };
            items.push(CompletionItem {
                label: symbol.not_fqn().to_string(),
                kind: Some(completion_kind(symbol.kind)),
                detail: Some(symbol.name.clone()),
                ..Default::default()
            });
        }
    }
    for keyword in KEYWORDS {
        if !word.is_empty() && keyword.starts_with(&word.to_lowercase()) {
            items.push(CompletionItem {
                label: (*keyword).to_string(),
                kind: Some(CompletionItemKind::KEYWORD),
                ..Default::default()
            });
        }
    }
    items
}

fn completion_kind(kind: SymbolKind) -> CompletionItemKind {
    match kind {
        SymbolKind::Class | SymbolKind::Trait => CompletionItemKind::CLASS,
        SymbolKind::Interface => CompletionItemKind::INTERFACE,
        SymbolKind::Function => CompletionItemKind::FUNCTION,
        SymbolKind::Method => CompletionItemKind::METHOD,
        SymbolKind::Property => CompletionItemKind::PROPERTY,
        SymbolKind::ClassConstant | SymbolKind::Constant => CompletionItemKind::CONSTANT,
        _ => CompletionItemKind::VARIABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{
        PartialResultParams, Position, TextDocumentIdentifier, TextDocumentPositionParams, Url,
        WorkDoneProgressParams,
    };

    fn completion_params(uri: Url, line: u32, character: u32) -> CompletionParams {
        CompletionParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: None,
        }
    }

    fn labels(response: CompletionResponse) -> Vec<String> {
        match response {
            CompletionResponse::Array(items) => items.into_iter().map(|i| i.label).collect(),
            CompletionResponse::List(list) => list.items.into_iter().map(|i| i.label).collect(),
        }
    }

    #[test]
    fn test_member_completion_after_arrow() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Db
{
    public int $count;
    public function open() {}
    private function secret() {}
}
$db = new Db();
$db->
"#,
        );

        // Cursor right after `$db->` (line 8, col 5).
        let response =
            handle_completion(&state, completion_params(uri, 8, 5)).expect("completions");
        let labels = labels(response);
        assert!(labels.contains(&"open".to_string()), "got: {labels:?}");
        assert!(labels.contains(&"count".to_string()), "got: {labels:?}");
        // Private members are invisible from outside the class.
        assert!(!labels.contains(&"secret".to_string()), "got: {labels:?}");
    }

    #[test]
    fn test_static_completion_after_double_colon() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Config
{
    public const LIMIT = 5;
    public static function load() {}
    public function instanceOnly() {}
}
Config::
"#,
        );

        let response =
            handle_completion(&state, completion_params(uri, 7, 8)).expect("completions");
        let labels = labels(response);
        assert!(labels.contains(&"load".to_string()), "got: {labels:?}");
        assert!(labels.contains(&"LIMIT".to_string()), "got: {labels:?}");
        assert!(!labels.contains(&"instanceOnly".to_string()), "got: {labels:?}");
    }

    #[test]
    fn test_variable_completion() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class Conn {}
function run()
{
    $connection = new Conn();
    $c
}
"#,
        );

        // Cursor after `$c` (line 5, col 6).
        let response =
            handle_completion(&state, completion_params(uri, 5, 6)).expect("completions");
        let labels = labels(response);
        assert!(
            labels.contains(&"$connection".to_string()),
            "got: {labels:?}"
        );
    }

    #[test]
    fn test_name_completion_uses_fuzzy_index() {
        let state = WorldState::new();
        let uri = Url::parse("file:///w/a.php").unwrap();
        state.open_document(
            uri.clone(),
            r#"<?php
class PaymentGateway {}
Payme
"#,
        );

        let response =
            handle_completion(&state, completion_params(uri, 2, 5)).expect("completions");
        let labels = labels(response);
        assert!(
            labels.contains(&"PaymentGateway".to_string()),
            "got: {labels:?}"
        );
    }
}
