use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use lsp_types::Url;

use crate::references::Reference;
use crate::type_string::TypeString;

/// The kind of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Class,
    Interface,
    Trait,
    Function,
    Method,
    Property,
    ClassConstant,
    Constant,
    Parameter,
    Variable,
    Namespace,
    File,
    None,
}

impl SymbolKind {
    pub fn is_class_like(self) -> bool {
        matches!(self, Self::Class | Self::Interface | Self::Trait)
    }

    /// Scope symbols own a lexical scope: their children form it.
    pub fn is_scope(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Interface | Self::Trait | Self::Function | Self::Method | Self::File
        )
    }

    pub fn is_member(self) -> bool {
        matches!(self, Self::Method | Self::Property | Self::ClassConstant)
    }

    /// Kinds whose names compare case-sensitively in lookups.
    pub fn is_case_sensitive(self) -> bool {
        matches!(
            self,
            Self::Constant | Self::Variable | Self::Property | Self::ClassConstant | Self::Parameter
        )
    }

    pub fn lsp_kind(self) -> lsp_types::SymbolKind {
        match self {
            Self::Class => lsp_types::SymbolKind::CLASS,
            Self::Interface => lsp_types::SymbolKind::INTERFACE,
            Self::Trait => lsp_types::SymbolKind::CLASS,
            Self::Function => lsp_types::SymbolKind::FUNCTION,
            Self::Method => lsp_types::SymbolKind::METHOD,
            Self::Property => lsp_types::SymbolKind::PROPERTY,
            Self::ClassConstant => lsp_types::SymbolKind::CONSTANT,
            Self::Constant => lsp_types::SymbolKind::CONSTANT,
            Self::Parameter => lsp_types::SymbolKind::VARIABLE,
            Self::Variable => lsp_types::SymbolKind::VARIABLE,
            Self::Namespace => lsp_types::SymbolKind::NAMESPACE,
            Self::File => lsp_types::SymbolKind::FILE,
            Self::None => lsp_types::SymbolKind::NULL,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Function => "function",
            Self::Method => "method",
            Self::Property => "property",
            Self::ClassConstant => "class constant",
            Self::Constant => "constant",
            Self::Parameter => "parameter",
            Self::Variable => "variable",
            Self::Namespace => "namespace",
            Self::File => "file",
            Self::None => "symbol",
        }
    }
}

bitflags! {
    /// Declaration modifiers, including the synthetic ones the reader stamps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const PUBLIC = 1 << 0;
        const PROTECTED = 1 << 1;
        const PRIVATE = 1 << 2;
        const STATIC = 1 << 3;
        const FINAL = 1 << 4;
        const ABSTRACT = 1 << 5;
        const READ_ONLY = 1 << 6;
        const WRITE_ONLY = 1 << 7;
        const MAGIC = 1 << 8;
        const ANONYMOUS = 1 << 9;
        const REFERENCE = 1 << 10;
        const VARIADIC = 1 << 11;
        const USE = 1 << 12;
    }
}

/// Byte and point extent of a node in its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_point: Point,
    pub end_point: Point,
}

/// Row/column pair, zero-based. Columns are byte offsets within the line,
/// converted to UTF-16 at the protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Span {
    pub fn from_node(node: tree_sitter::Node) -> Self {
        Span {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_point: Point {
                row: node.start_position().row,
                column: node.start_position().column,
            },
            end_point: Point {
                row: node.end_position().row,
                column: node.end_position().column,
            },
        }
    }

    pub fn contains(&self, byte_offset: usize) -> bool {
        self.start_byte <= byte_offset && byte_offset <= self.end_byte
    }
}

/// A link from a class-like symbol to a related type, or from a use-clause
/// symbol to its import target. Holds the resolved FQN, never an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Associated {
    pub kind: SymbolKind,
    pub name: String,
}

/// Index of a symbol within its table's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declared symbol. Top-level classes, functions and constants carry their
/// FQN as `name`; members carry the short name; variables and properties keep
/// the leading `$`.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub modifiers: Modifiers,
    pub span: Span,
    pub name_span: Span,
    pub type_info: Option<TypeString>,
    pub description: Option<String>,
    /// FQN of the owning class-like, for members.
    pub scope: Option<String>,
    pub children: Vec<SymbolId>,
    pub associated: Vec<Associated>,
    pub parent: Option<SymbolId>,
}

impl Symbol {
    pub fn new(kind: SymbolKind, name: String) -> Self {
        Symbol {
            kind,
            name,
            modifiers: Modifiers::default(),
            span: Span::default(),
            name_span: Span::default(),
            type_info: None,
            description: None,
            scope: None,
            children: Vec::new(),
            associated: Vec::new(),
            parent: None,
        }
    }

    /// The portion of `name` after the last namespace separator.
    pub fn not_fqn(&self) -> &str {
        not_fqn(&self.name)
    }

    pub fn visibility(&self) -> Modifiers {
        let vis = self.modifiers & (Modifiers::PUBLIC | Modifiers::PROTECTED | Modifiers::PRIVATE);
        if vis.is_empty() {
            Modifiers::PUBLIC
        } else {
            vis
        }
    }
}

/// The portion of a name after the last `\`.
pub fn not_fqn(name: &str) -> &str {
    match name.rfind('\\') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

pub fn uri_hash(uri: &Url) -> u64 {
    let mut hasher = DefaultHasher::new();
    uri.as_str().hash(&mut hasher);
    hasher.finish()
}

/// Per-document symbol tree: an arena of symbols rooted at a synthetic File
/// symbol, plus the per-scope reference lists the reference pass fills in.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub uri: Url,
    pub uri_hash: u64,
    symbols: Vec<Symbol>,
    references: Vec<Vec<Reference>>,
    root: SymbolId,
}

impl SymbolTable {
    pub fn new(uri: Url, symbols: Vec<Symbol>) -> Self {
        let hash = uri_hash(&uri);
        let references = vec![Vec::new(); symbols.len()];
        SymbolTable {
            uri,
            uri_hash: hash,
            symbols,
            references,
            root: SymbolId(0),
        }
    }

    pub fn root(&self) -> SymbolId {
        self.root
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All symbols in document (pre-) order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    pub fn children(&self, id: SymbolId) -> &[SymbolId] {
        &self.get(id).children
    }

    /// The deepest scope symbol whose span contains `byte_offset`.
    pub fn scope_at(&self, byte_offset: usize) -> SymbolId {
        let mut current = self.root;
        loop {
            let next = self.get(current).children.iter().copied().find(|&c| {
                let sym = self.get(c);
                sym.kind.is_scope() && sym.span.contains(byte_offset)
            });
            match next {
                Some(id) => current = id,
                None => return current,
            }
        }
    }

    /// The nearest function-like scope (function or method, falling back to
    /// the file root) containing `byte_offset`.
    pub fn function_scope_at(&self, byte_offset: usize) -> SymbolId {
        let mut current = self.scope_at(byte_offset);
        loop {
            let sym = self.get(current);
            if matches!(sym.kind, SymbolKind::Function | SymbolKind::Method | SymbolKind::File) {
                return current;
            }
            match sym.parent {
                Some(p) => current = p,
                None => return self.root,
            }
        }
    }

    /// Find a symbol whose full span starts at `start_byte`, preferring the
    /// given kinds. Used to pair tree nodes with their declared symbols.
    pub fn symbol_starting_at(&self, start_byte: usize, kinds: &[SymbolKind]) -> Option<SymbolId> {
        self.iter()
            .find(|(_, s)| s.span.start_byte == start_byte && kinds.contains(&s.kind))
            .map(|(id, _)| id)
    }

    pub fn references(&self, id: SymbolId) -> &[Reference] {
        &self.references[id.index()]
    }

    pub fn set_references(&mut self, id: SymbolId, refs: Vec<Reference>) {
        self.references[id.index()] = refs;
    }

    /// Every reference in the document, gathered across all scopes in
    /// document order.
    pub fn all_references(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().flatten()
    }

    /// The reference whose span contains `byte_offset`, innermost last wins.
    pub fn reference_at(&self, byte_offset: usize) -> Option<&Reference> {
        self.all_references()
            .filter(|r| r.span.contains(byte_offset))
            .min_by_key(|r| r.span.end_byte - r.span.start_byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_fqn() {
        assert_eq!(not_fqn("Foo\\Bar\\Baz"), "Baz");
        assert_eq!(not_fqn("Baz"), "Baz");
        assert_eq!(not_fqn(""), "");
    }

    #[test]
    fn test_visibility_defaults_to_public() {
        let sym = Symbol::new(SymbolKind::Method, "run".into());
        assert_eq!(sym.visibility(), Modifiers::PUBLIC);

        let mut sym = Symbol::new(SymbolKind::Method, "run".into());
        sym.modifiers = Modifiers::PRIVATE | Modifiers::STATIC;
        assert_eq!(sym.visibility(), Modifiers::PRIVATE);
    }

    #[test]
    fn test_scope_at_walks_nested_scopes() {
        let mut file = Symbol::new(SymbolKind::File, "file:///t.php".into());
        file.span = Span {
            start_byte: 0,
            end_byte: 100,
            ..Default::default()
        };
        let mut class = Symbol::new(SymbolKind::Class, "A".into());
        class.span = Span {
            start_byte: 10,
            end_byte: 90,
            ..Default::default()
        };
        class.parent = Some(SymbolId(0));
        let mut method = Symbol::new(SymbolKind::Method, "m".into());
        method.span = Span {
            start_byte: 20,
            end_byte: 80,
            ..Default::default()
        };
        method.parent = Some(SymbolId(1));
        file.children = vec![SymbolId(1)];
        class.children = vec![SymbolId(2)];

        let uri = Url::parse("file:///t.php").unwrap();
        let table = SymbolTable::new(uri, vec![file, class, method]);

        assert_eq!(table.scope_at(50), SymbolId(2));
        assert_eq!(table.scope_at(15), SymbolId(1));
        assert_eq!(table.scope_at(5), SymbolId(0));
        assert_eq!(table.function_scope_at(15), SymbolId(0));
    }
}
