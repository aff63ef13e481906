use std::collections::HashMap;

use lsp_types::Url;
use thiserror::Error;
use tree_sitter::Tree;

use crate::aggregate::{MemberMergeStrategy, TypeAggregate};
use crate::reader::SymbolReader;
use crate::references::{DocumentReferences, Reference, ReferenceKind, ReferenceReader};
use crate::symbol::{not_fqn, Modifiers, Symbol, SymbolId, SymbolKind, SymbolTable};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("symbol table already present for {0}")]
    DuplicateUri(Url),
}

/// Pointer to a symbol in some table: stable across index operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    pub uri_hash: u64,
    pub id: SymbolId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReferenceRef {
    uri_hash: u64,
    scope: SymbolId,
    idx: u32,
}

/// Corpus-wide owner of all symbol tables plus the two lookup indexes.
#[derive(Debug, Default)]
pub struct SymbolStore {
    tables: HashMap<u64, SymbolTable>,
    by_uri: HashMap<Url, u64>,
    symbol_index: NameIndex<SymbolRef>,
    reference_index: NameIndex<ReferenceRef>,
}

impl SymbolStore {
    pub fn new() -> Self {
        SymbolStore::default()
    }

    /// A store pre-loaded with the built-in symbol table.
    pub fn with_builtins() -> Self {
        let mut store = SymbolStore::default();
        store
            .add(crate::builtins::builtin_table())
            .expect("builtin table installs once");
        store
    }

    pub fn table(&self, uri: &Url) -> Option<&SymbolTable> {
        self.by_uri.get(uri).and_then(|h| self.tables.get(h))
    }

    pub fn table_by_hash(&self, uri_hash: u64) -> Option<&SymbolTable> {
        self.tables.get(&uri_hash)
    }

    pub fn get(&self, r: SymbolRef) -> Option<&Symbol> {
        let table = self.tables.get(&r.uri_hash)?;
        (r.id.index() < table.len()).then(|| table.get(r.id))
    }

    pub fn uri_for_hash(&self, uri_hash: u64) -> Option<&Url> {
        self.tables.get(&uri_hash).map(|t| &t.uri)
    }

    pub fn add(&mut self, table: SymbolTable) -> Result<(), StoreError> {
        if self.by_uri.contains_key(&table.uri) {
            return Err(StoreError::DuplicateUri(table.uri.clone()));
        }
        self.index_symbols(&table);
        self.by_uri.insert(table.uri.clone(), table.uri_hash);
        self.tables.insert(table.uri_hash, table);
        Ok(())
    }

    /// Remove a document's table and every index entry derived from it.
    /// Removing an absent URI is a no-op.
    pub fn remove(&mut self, uri: &Url) -> Option<SymbolTable> {
        let hash = self.by_uri.remove(uri)?;
        let table = self.tables.remove(&hash)?;
        for (id, symbol) in table.iter() {
            if !indexable(&table, id, symbol) {
                continue;
            }
            let r = SymbolRef {
                uri_hash: hash,
                id,
            };
            for key in symbol_keys(symbol) {
                self.symbol_index.remove(&key, &r);
            }
        }
        for (scope, idx, reference) in table_references(&table) {
            if !reference_indexable(reference) {
                continue;
            }
            let r = ReferenceRef {
                uri_hash: hash,
                scope,
                idx,
            };
            for key in reference_keys(reference) {
                self.reference_index.remove(&key, &r);
            }
        }
        Some(table)
    }

    fn index_symbols(&mut self, table: &SymbolTable) {
        for (id, symbol) in table.iter() {
            if !indexable(table, id, symbol) {
                continue;
            }
            let r = SymbolRef {
                uri_hash: table.uri_hash,
                id,
            };
            for key in symbol_keys(symbol) {
                self.symbol_index.insert(&key, r);
            }
        }
    }

    /// Index a document's references. Called after the reference pass has
    /// populated the per-scope lists.
    pub fn index_references(&mut self, uri: &Url) {
        let Some(&hash) = self.by_uri.get(uri) else {
            return;
        };
        let Some(table) = self.tables.get(&hash) else {
            return;
        };
        let mut entries = Vec::new();
        for (scope, idx, reference) in table_references(table) {
            if !reference_indexable(reference) {
                continue;
            }
            let r = ReferenceRef {
                uri_hash: hash,
                scope,
                idx,
            };
            for key in reference_keys(reference) {
                entries.push((key, r));
            }
        }
        for (key, r) in entries {
            self.reference_index.insert(&key, r);
        }
    }

    /// Full pipeline for a (re)parsed document: replace the table, run the
    /// reference pass against the updated corpus, commit the deferred writes,
    /// and index the references.
    pub fn commit(&mut self, uri: &Url, source: &str, tree: &Tree) {
        let table = SymbolReader::read(uri, source, tree);
        self.remove(uri);
        self.add(table).expect("uri was just removed");

        let doc_refs = {
            let table = self.table(uri).expect("table was just added");
            ReferenceReader::read(self, table, tree, source)
        };
        self.apply_references(uri, doc_refs);
        tracing::debug!(%uri, "indexed document");
    }

    fn apply_references(&mut self, uri: &Url, doc_refs: DocumentReferences) {
        let Some(&hash) = self.by_uri.get(uri) else {
            return;
        };
        if let Some(table) = self.tables.get_mut(&hash) {
            for (scope, refs) in doc_refs.scopes {
                table.set_references(scope, refs);
            }
            for (id, type_info) in doc_refs.local_types {
                let symbol = table.get_mut(id);
                if symbol.type_info.is_none() {
                    symbol.type_info = Some(type_info);
                }
            }
        }
        self.index_references(uri);
    }

    /// Exact lookup. Case-insensitive for class-likes, functions, methods and
    /// namespaces; case-sensitive for the rest.
    pub fn find<F>(&self, text: &str, filter: F) -> Vec<SymbolRef>
    where
        F: Fn(&Symbol) -> bool,
    {
        if text.is_empty() {
            return Vec::new();
        }
        let key = text.to_lowercase();
        self.symbol_index
            .exact(&key)
            .iter()
            .copied()
            .filter(|&r| {
                let Some(symbol) = self.get(r) else {
                    return false;
                };
                let name_matches = if symbol.kind.is_case_sensitive() {
                    symbol.name == text
                } else {
                    symbol.name.eq_ignore_ascii_case(text)
                };
                name_matches && filter(symbol)
            })
            .collect()
    }

    /// Fuzzy lookup over the trigram index. Results contain `text` in their
    /// unqualified name and are ranked by how early it appears.
    pub fn match_fuzzy<F>(&self, text: &str, filter: F) -> Vec<SymbolRef>
    where
        F: Fn(&Symbol) -> bool,
    {
        let query = text.to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<SymbolRef> = if query.len() > 3 {
            let mut out = Vec::new();
            for tri in trigrams(&query) {
                out.extend(self.symbol_index.prefix(&tri));
            }
            out.extend(self.symbol_index.prefix(&query));
            out
        } else {
            self.symbol_index.prefix(&query)
        };
        let mut seen = Vec::new();
        candidates.retain(|r| {
            if seen.contains(r) {
                false
            } else {
                seen.push(*r);
                true
            }
        });

        let mut ranked: Vec<(usize, String, SymbolRef)> = candidates
            .into_iter()
            .filter_map(|r| {
                let symbol = self.get(r)?;
                if !filter(symbol) {
                    return None;
                }
                let short = symbol.not_fqn().to_lowercase();
                let at = short.find(&query)?;
                Some((at, symbol.name.clone(), r))
            })
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        ranked.into_iter().map(|(_, _, r)| r).collect()
    }

    /// Resolve a stamped reference back to its declaration symbol(s).
    pub fn find_symbols_by_reference(
        &self,
        reference: &Reference,
        strategy: MemberMergeStrategy,
    ) -> Vec<SymbolRef> {
        match reference.kind {
            ReferenceKind::Class | ReferenceKind::Interface | ReferenceKind::Trait => {
                self.find(&reference.name, |s| s.kind.is_class_like())
            }
            ReferenceKind::Namespace => {
                self.find(&reference.name, |s| s.kind == SymbolKind::Namespace)
            }
            ReferenceKind::Function => self.find_with_fallback(reference, SymbolKind::Function),
            ReferenceKind::Constant => self.find_with_fallback(reference, SymbolKind::Constant),
            ReferenceKind::Method => self.member_lookup(reference, strategy, |s, name| {
                s.kind == SymbolKind::Method && s.name.eq_ignore_ascii_case(name)
            }),
            ReferenceKind::Property => self.member_lookup(reference, strategy, |s, name| {
                s.kind == SymbolKind::Property && s.name == name
            }),
            ReferenceKind::ClassConstant => self.member_lookup(reference, strategy, |s, name| {
                s.kind == SymbolKind::ClassConstant && s.name == name
            }),
            ReferenceKind::Constructor => {
                let ctor = Reference {
                    kind: ReferenceKind::Method,
                    name: "__construct".to_string(),
                    scope: Some(reference.name.clone()),
                    ..reference.clone()
                };
                let found = self.find_symbols_by_reference(&ctor, strategy);
                if found.is_empty() {
                    // No declared constructor: fall back to the class itself.
                    self.find(&reference.name, |s| s.kind.is_class_like())
                } else {
                    found
                }
            }
            ReferenceKind::Variable | ReferenceKind::Parameter => {
                let Some(table) = self.tables.get(&reference.uri_hash) else {
                    return Vec::new();
                };
                let scope = table.function_scope_at(reference.span.start_byte);
                table
                    .children(scope)
                    .iter()
                    .copied()
                    .filter(|&c| {
                        let s = table.get(c);
                        matches!(s.kind, SymbolKind::Variable | SymbolKind::Parameter)
                            && s.name == reference.name
                    })
                    .map(|id| SymbolRef {
                        uri_hash: reference.uri_hash,
                        id,
                    })
                    .collect()
            }
        }
    }

    fn find_with_fallback(&self, reference: &Reference, kind: SymbolKind) -> Vec<SymbolRef> {
        let found = self.find(&reference.name, |s| s.kind == kind);
        if found.is_empty() {
            if let Some(alt) = &reference.alt_name {
                return self.find(alt, |s| s.kind == kind);
            }
        }
        found
    }

    fn member_lookup<F>(
        &self,
        reference: &Reference,
        strategy: MemberMergeStrategy,
        pred: F,
    ) -> Vec<SymbolRef>
    where
        F: Fn(&Symbol, &str) -> bool,
    {
        let Some(scope) = reference.scope.as_deref() else {
            return Vec::new();
        };
        let Some(aggregate) = TypeAggregate::new(self, scope) else {
            return Vec::new();
        };
        aggregate.members(strategy, |s| pred(s, &reference.name))
    }

    /// Exact reference lookup by name. Case-sensitive kinds filter on the
    /// exact name; the rest accept every hit under the key.
    pub fn find_references<F>(&self, name: &str, filter: F) -> Vec<Reference>
    where
        F: Fn(&Reference) -> bool,
    {
        let key = name.to_lowercase();
        self.reference_index
            .exact(&key)
            .iter()
            .filter_map(|r| {
                let table = self.tables.get(&r.uri_hash)?;
                let reference = table.references(r.scope).get(r.idx as usize)?;
                let case_sensitive = matches!(
                    reference.kind,
                    ReferenceKind::Constant
                        | ReferenceKind::Variable
                        | ReferenceKind::Parameter
                        | ReferenceKind::Property
                        | ReferenceKind::ClassConstant
                );
                if case_sensitive && reference.name != name {
                    return None;
                }
                filter(reference).then(|| reference.clone())
            })
            .collect()
    }

    /// The stamped reference at a document position, if any.
    pub fn reference_at(&self, uri: &Url, byte_offset: usize) -> Option<Reference> {
        self.table(uri)?.reference_at(byte_offset).cloned()
    }

    /// A synthetic reference for the declaration name at a position, so
    /// queries started from a declaration site resolve like any other.
    pub fn declaration_reference_at(&self, uri: &Url, byte_offset: usize) -> Option<Reference> {
        let table = self.table(uri)?;
        let (_, symbol) = table
            .iter()
            .filter(|(_, s)| !s.name.is_empty() && s.name_span.contains(byte_offset))
            .filter(|(_, s)| s.name_span.end_byte > s.name_span.start_byte)
            .min_by_key(|(_, s)| s.name_span.end_byte - s.name_span.start_byte)?;

        let kind = match symbol.kind {
            SymbolKind::Class => ReferenceKind::Class,
            SymbolKind::Interface => ReferenceKind::Interface,
            SymbolKind::Trait => ReferenceKind::Trait,
            SymbolKind::Function => ReferenceKind::Function,
            SymbolKind::Method => ReferenceKind::Method,
            SymbolKind::Property => ReferenceKind::Property,
            SymbolKind::ClassConstant => ReferenceKind::ClassConstant,
            SymbolKind::Constant => ReferenceKind::Constant,
            SymbolKind::Parameter | SymbolKind::Variable => ReferenceKind::Variable,
            SymbolKind::Namespace => ReferenceKind::Namespace,
            _ => return None,
        };
        Some(Reference {
            kind,
            name: symbol.name.clone(),
            uri_hash: table.uri_hash,
            span: symbol.name_span,
            scope: symbol.scope.clone(),
            alt_name: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn index_snapshot(&self) -> (Vec<(String, usize)>, Vec<(String, usize)>) {
        (self.symbol_index.snapshot(), self.reference_index.snapshot())
    }
}

fn table_references(table: &SymbolTable) -> impl Iterator<Item = (SymbolId, u32, &Reference)> {
    table.iter().flat_map(move |(scope, _)| {
        table
            .references(scope)
            .iter()
            .enumerate()
            .map(move |(i, r)| (scope, i as u32, r))
    })
}

/// Whether a symbol participates in the workspace symbol index.
fn indexable(table: &SymbolTable, id: SymbolId, symbol: &Symbol) -> bool {
    if id == table.root() || symbol.name.is_empty() {
        return false;
    }
    if symbol.kind == SymbolKind::Parameter
        || symbol.modifiers.contains(Modifiers::USE)
        || symbol.modifiers.contains(Modifiers::PRIVATE)
    {
        return false;
    }
    if symbol.kind == SymbolKind::Variable {
        // Locals stay out of the corpus index; file-level variables go in.
        let parent_kind = symbol.parent.map(|p| table.get(p).kind);
        if matches!(
            parent_kind,
            Some(SymbolKind::Function) | Some(SymbolKind::Method)
        ) {
            return false;
        }
    }
    true
}

fn symbol_keys(symbol: &Symbol) -> Vec<String> {
    let mut keys = Vec::new();
    let lowered = symbol.name.to_lowercase();
    if lowered.is_empty() {
        return keys;
    }

    if symbol.kind == SymbolKind::Namespace {
        keys.push(lowered.clone());
        for segment in lowered.split('\\').filter(|s| !s.is_empty()) {
            push_unique(&mut keys, segment.to_string());
        }
        return keys;
    }

    let short = not_fqn(&lowered).to_string();
    for tri in trigrams(&short) {
        push_unique(&mut keys, tri);
    }
    push_unique(&mut keys, short.clone());
    push_unique(&mut keys, lowered);
    let acronym = acronym(symbol.not_fqn());
    if acronym.len() >= 2 {
        push_unique(&mut keys, acronym);
    }
    keys
}

/// Locals and parameters resolve through their scope, never the corpus index.
fn reference_indexable(reference: &Reference) -> bool {
    !matches!(
        reference.kind,
        ReferenceKind::Variable | ReferenceKind::Parameter
    )
}

fn reference_keys(reference: &Reference) -> Vec<String> {
    let mut keys = vec![reference.name.to_lowercase()];
    if let Some(alt) = &reference.alt_name {
        let alt = alt.to_lowercase();
        if alt != keys[0] && !matches!(alt.as_str(), "self" | "static" | "parent") {
            keys.push(alt);
        }
    }
    keys
}

fn push_unique(keys: &mut Vec<String>, key: String) {
    if !key.is_empty() && !keys.contains(&key) {
        keys.push(key);
    }
}

fn trigrams(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 3 {
        return Vec::new();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Camel-case initials plus underscore-separated initials, lowercased:
/// `MyFooClass` → `mfc`, `my_foo_function` → `mff`.
fn acronym(name: &str) -> String {
    let mut out = String::new();
    let mut new_word = true;
    let mut prev_lower = false;
    for ch in name.trim_start_matches('$').chars() {
        if ch == '_' {
            new_word = true;
            prev_lower = false;
            continue;
        }
        if new_word || (prev_lower && ch.is_uppercase()) {
            out.extend(ch.to_lowercase());
        }
        prev_lower = ch.is_lowercase();
        new_word = false;
    }
    out
}

/// Sorted key array with binary-searched exact and prefix lookups.
#[derive(Debug)]
struct NameIndex<T> {
    nodes: Vec<IndexNode<T>>,
}

#[derive(Debug)]
struct IndexNode<T> {
    key: String,
    items: Vec<T>,
}

impl<T> Default for NameIndex<T> {
    fn default() -> Self {
        NameIndex { nodes: Vec::new() }
    }
}

impl<T: Copy + PartialEq> NameIndex<T> {
    fn insert(&mut self, key: &str, item: T) {
        match self.nodes.binary_search_by(|n| n.key.as_str().cmp(key)) {
            Ok(i) => self.nodes[i].items.push(item),
            Err(i) => self.nodes.insert(
                i,
                IndexNode {
                    key: key.to_string(),
                    items: vec![item],
                },
            ),
        }
    }

    fn remove(&mut self, key: &str, item: &T) {
        if let Ok(i) = self.nodes.binary_search_by(|n| n.key.as_str().cmp(key)) {
            self.nodes[i].items.retain(|x| x != item);
            if self.nodes[i].items.is_empty() {
                self.nodes.remove(i);
            }
        }
    }

    fn exact(&self, key: &str) -> &[T] {
        match self.nodes.binary_search_by(|n| n.key.as_str().cmp(key)) {
            Ok(i) => &self.nodes[i].items,
            Err(_) => &[],
        }
    }

    fn prefix(&self, key: &str) -> Vec<T> {
        let start = self.nodes.partition_point(|n| n.key.as_str() < key);
        let mut out = Vec::new();
        for node in &self.nodes[start..] {
            if !node.key.starts_with(key) {
                break;
            }
            out.extend(node.items.iter().copied());
        }
        out
    }

    #[cfg(test)]
    fn snapshot(&self) -> Vec<(String, usize)> {
        self.nodes
            .iter()
            .map(|n| (n.key.clone(), n.items.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(store: &mut SymbolStore, uri: &str, source: &str) {
        let url = Url::parse(uri).unwrap();
        let tree = php_parser::parse(source).expect("parse failed");
        store.commit(&url, source, &tree);
    }

    #[test]
    fn test_acronym() {
        assert_eq!(acronym("MyFooClass"), "mfc");
        assert_eq!(acronym("my_foo_function"), "mff");
        assert_eq!(acronym("fooBar"), "fb");
        assert_eq!(acronym("$longVariableName"), "lvn");
    }

    #[test]
    fn test_find_case_rules() {
        let mut store = SymbolStore::new();
        commit(
            &mut store,
            "file:///a.php",
            r#"<?php
class Widget { public const LIMIT = 3; }
function makeWidget() {}
"#,
        );

        assert_eq!(store.find("widget", |s| s.kind == SymbolKind::Class).len(), 1);
        assert_eq!(store.find("WIDGET", |s| s.kind == SymbolKind::Class).len(), 1);
        assert_eq!(
            store.find("makewidget", |s| s.kind == SymbolKind::Function).len(),
            1
        );
        // Trigram keys must not satisfy exact lookups.
        assert!(store.find("wid", |s| s.kind == SymbolKind::Class).is_empty());
    }

    #[test]
    fn test_duplicate_uri_is_an_error() {
        let mut store = SymbolStore::new();
        let uri = Url::parse("file:///a.php").unwrap();
        let source = "<?php class A {}";
        let tree = php_parser::parse(source).unwrap();
        store
            .add(SymbolReader::read(&uri, source, &tree))
            .expect("first add");
        let err = store
            .add(SymbolReader::read(&uri, source, &tree))
            .expect_err("second add must fail");
        assert!(matches!(err, StoreError::DuplicateUri(_)));
    }

    #[test]
    fn test_index_round_trip() {
        let mut store = SymbolStore::new();
        commit(
            &mut store,
            "file:///keep.php",
            "<?php class Keep { public function stay() {} }",
        );
        let before = store.index_snapshot();

        commit(
            &mut store,
            "file:///gone.php",
            r#"<?php
namespace Tmp;
class Gone { public function vanish() { $this->vanish(); } }
"#,
        );
        let uri = Url::parse("file:///gone.php").unwrap();
        store.remove(&uri).expect("table present");

        assert_eq!(store.index_snapshot(), before);
        // Removing again is a no-op.
        assert!(store.remove(&uri).is_none());
        assert_eq!(store.index_snapshot(), before);
    }

    #[test]
    fn test_fuzzy_match_scenario() {
        let mut store = SymbolStore::new();
        commit(
            &mut store,
            "file:///a.php",
            r#"<?php
namespace Foo;
class MyFooClass {}
"#,
        );
        commit(
            &mut store,
            "file:///b.php",
            r#"<?php
namespace Bar;
class MyBar {}
"#,
        );
        commit(
            &mut store,
            "file:///c.php",
            r#"<?php
function fooBar() {}
function myFooFunction() {}
function myBarFunction() {}
function zoo() {}
"#,
        );

        let hits = store.match_fuzzy("myfoo", |_| true);
        let names: Vec<String> = hits
            .iter()
            .map(|&r| store.get(r).unwrap().name.clone())
            .collect();
        assert_eq!(names.len(), 2, "got: {names:?}");
        assert!(names.contains(&"Foo\\MyFooClass".to_string()));
        assert!(names.contains(&"myFooFunction".to_string()));
    }

    #[test]
    fn test_fuzzy_match_ranks_earlier_hits_first() {
        let mut store = SymbolStore::new();
        commit(
            &mut store,
            "file:///a.php",
            r#"<?php
function getParser() {}
function parse() {}
"#,
        );
        let hits = store.match_fuzzy("parse", |_| true);
        let names: Vec<&str> = hits
            .iter()
            .map(|&r| store.get(r).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["parse", "getParser"]);
    }

    #[test]
    fn test_namespace_segment_keys() {
        let mut store = SymbolStore::new();
        commit(
            &mut store,
            "file:///a.php",
            "<?php namespace App\\Deep\\Model; class M {}",
        );
        assert_eq!(
            store
                .find("App\\Deep\\Model", |s| s.kind == SymbolKind::Namespace)
                .len(),
            1
        );
    }

    #[test]
    fn test_private_members_stay_out_of_symbol_index() {
        let mut store = SymbolStore::new();
        commit(
            &mut store,
            "file:///a.php",
            r#"<?php
class Vault
{
    private function hidden() {}
    public function shown() {}
}
"#,
        );
        assert!(store.find("hidden", |_| true).is_empty());
        assert_eq!(store.find("shown", |_| true).len(), 1);
    }

    #[test]
    fn test_locals_stay_out_of_symbol_index() {
        let mut store = SymbolStore::new();
        commit(
            &mut store,
            "file:///a.php",
            r#"<?php
$fileLevel = 1;
function f() { $local = 2; }
"#,
        );
        assert!(store.find("$local", |_| true).is_empty());
        assert_eq!(store.find("$fileLevel", |_| true).len(), 1);
    }
}
