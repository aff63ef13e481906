use std::collections::HashMap;

use tree_sitter::Node;

use crate::docblock::DocBlock;
use crate::expr_types::{resolve_expr_type, ExprContext};
use crate::name_resolver::{node_text, NameResolver};
use crate::reader::{self, named_child_of_kinds};
use crate::store::SymbolStore;
use crate::symbol::{Span, SymbolId, SymbolKind, SymbolTable};
use crate::type_string::TypeString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetKind {
    Scope,
    Branch,
}

#[derive(Debug)]
struct TypedVariableSet {
    kind: SetKind,
    variables: HashMap<String, TypeString>,
    branches: Vec<TypedVariableSet>,
}

impl TypedVariableSet {
    fn new(kind: SetKind) -> Self {
        TypedVariableSet {
            kind,
            variables: HashMap::new(),
            branches: Vec::new(),
        }
    }
}

/// Stack of typed variable sets tracking locals through nested scopes and
/// conditional branches.
#[derive(Debug)]
pub struct VariableTable {
    stack: Vec<TypedVariableSet>,
}

impl Default for VariableTable {
    fn default() -> Self {
        VariableTable {
            stack: vec![TypedVariableSet::new(SetKind::Scope)],
        }
    }
}

impl VariableTable {
    pub fn push_scope(&mut self, carry: Vec<(String, TypeString)>) {
        let mut set = TypedVariableSet::new(SetKind::Scope);
        for (name, type_info) in carry {
            set.variables.insert(name, type_info);
        }
        self.stack.push(set);
    }

    pub fn pop_scope(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn push_branch(&mut self) {
        self.stack.push(TypedVariableSet::new(SetKind::Branch));
    }

    /// Pop the current branch set and queue it on the parent for a later
    /// `prune_branches`.
    pub fn pop_branch_collect(&mut self) {
        if self.stack.len() > 1 {
            if let Some(set) = self.stack.pop() {
                if let Some(top) = self.stack.last_mut() {
                    top.branches.push(set);
                }
            }
        }
    }

    /// Pop the current branch set, discarding its assignments.
    pub fn pop_branch_discard(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn set_type(&mut self, name: &str, type_info: TypeString) {
        if let Some(top) = self.stack.last_mut() {
            top.variables.insert(name.to_string(), type_info);
        }
    }

    /// Look a variable up from the innermost set outwards, stopping at the
    /// first scope boundary. `$this` always resolves to the enclosing class.
    pub fn get_type(&self, name: &str, this_name: &str) -> TypeString {
        if name == "$this" {
            return TypeString::new(this_name);
        }
        for set in self.stack.iter().rev() {
            if let Some(t) = set.variables.get(name) {
                return t.clone();
            }
            if set.kind == SetKind::Scope {
                break;
            }
        }
        TypeString::empty()
    }

    /// Union each queued branch set into the current set, per variable.
    pub fn prune_branches(&mut self) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        for branch in std::mem::take(&mut top.branches) {
            for (name, type_info) in branch.variables {
                let merged = match top.variables.get(&name) {
                    Some(existing) => existing.merge(&type_info),
                    None => type_info,
                };
                top.variables.insert(name, merged);
            }
        }
    }

    /// All variables visible at the current point, innermost first.
    pub fn visible_variables(&self) -> Vec<(String, TypeString)> {
        let mut out: Vec<(String, TypeString)> = Vec::new();
        for set in self.stack.iter().rev() {
            for (name, type_info) in &set.variables {
                if !out.iter().any(|(n, _)| n == name) {
                    out.push((name.clone(), type_info.clone()));
                }
            }
            if set.kind == SetKind::Scope {
                break;
            }
        }
        out
    }
}

/// Walks a parse tree keeping a [`VariableTable`] in sync with control flow,
/// so a local's type can be queried at any program point. Supports halting at
/// a target offset: state after the walk reflects the program immediately
/// before that token.
pub struct VariableTypeResolver<'s> {
    source: &'s str,
    store: &'s SymbolStore,
    table: &'s SymbolTable,
    pub resolver: NameResolver,
    pub vars: VariableTable,
    halt_offset: Option<usize>,
    halted: bool,
    inferred: Vec<(SymbolId, TypeString)>,
    /// Pending `@var` annotations, consumed by the next matching assignment.
    doc_overrides: HashMap<String, TypeString>,
}

impl<'s> VariableTypeResolver<'s> {
    pub fn new(store: &'s SymbolStore, table: &'s SymbolTable, source: &'s str) -> Self {
        VariableTypeResolver {
            source,
            store,
            table,
            resolver: NameResolver::default(),
            vars: VariableTable::default(),
            halt_offset: None,
            halted: false,
            inferred: Vec::new(),
            doc_overrides: HashMap::new(),
        }
    }

    pub fn with_halt(
        store: &'s SymbolStore,
        table: &'s SymbolTable,
        source: &'s str,
        halt_offset: usize,
    ) -> Self {
        let mut resolver = Self::new(store, table, source);
        resolver.halt_offset = Some(halt_offset);
        resolver
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn store(&self) -> &'s SymbolStore {
        self.store
    }

    pub fn take_inferred(&mut self) -> Vec<(SymbolId, TypeString)> {
        std::mem::take(&mut self.inferred)
    }

    pub fn expr_type(&self, node: Node) -> TypeString {
        let ctx = ExprContext {
            source: self.source,
            store: self.store,
            table: self.table,
            resolver: &self.resolver,
            vars: &self.vars,
        };
        resolve_expr_type(&ctx, node)
    }

    pub fn walk(&mut self, node: Node) {
        if self.halted {
            return;
        }
        if let Some(halt) = self.halt_offset {
            if node.start_byte() >= halt {
                self.halted = true;
                return;
            }
        }
        if self.pre(node) {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                self.walk(child);
                if self.halted {
                    return;
                }
            }
        }
        // A node enclosing the halt position must not unwind its scope:
        // queries after the walk read the state at the halt point.
        if let Some(halt) = self.halt_offset {
            if node.end_byte() >= halt {
                self.halted = true;
                return;
            }
        }
        self.post(node);
    }

    /// Pre-order hook. Returns false when the node's children carry no
    /// variable or reference information.
    pub(crate) fn pre(&mut self, node: Node) -> bool {
        match node.kind() {
            "namespace_definition" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| node_text(n, self.source).to_string())
                    .filter(|n| !n.is_empty());
                self.resolver.set_namespace(name);
                true
            }
            "namespace_use_declaration" => {
                reader::replay_use_declaration(&mut self.resolver, node, self.source);
                true
            }
            "class_declaration" | "interface_declaration" | "trait_declaration"
            | "enum_declaration" => {
                self.enter_class_like(node);
                true
            }
            "object_creation_expression" => {
                if reader::anonymous_class_body(node).is_some() {
                    self.enter_anonymous_class(node);
                }
                true
            }
            "function_definition" | "method_declaration" => {
                self.vars.push_scope(Vec::new());
                self.seed_parameters(node, &[SymbolKind::Function, SymbolKind::Method]);
                true
            }
            "anonymous_function" | "anonymous_function_creation_expression" => {
                let carry = self.closure_carry(node);
                self.vars.push_scope(carry);
                self.seed_parameters(node, &[SymbolKind::Function]);
                true
            }
            "arrow_function" => {
                // Arrow functions capture the enclosing scope by value.
                let carry = self.vars.visible_variables();
                self.vars.push_scope(carry);
                self.seed_parameters(node, &[SymbolKind::Function]);
                true
            }
            "if_statement" => {
                self.vars.push_branch();
                true
            }
            "else_if_clause" | "else_clause" => {
                self.vars.pop_branch_collect();
                self.vars.push_branch();
                true
            }
            "case_statement" | "default_statement" => {
                self.vars.push_branch();
                true
            }
            "assignment_expression" | "reference_assignment_expression" => {
                self.handle_assignment(node);
                true
            }
            "binary_expression" => {
                self.handle_instanceof(node);
                true
            }
            "foreach_statement" => {
                self.handle_foreach(node);
                true
            }
            "comment" => {
                self.handle_var_tag(node);
                false
            }
            _ => true,
        }
    }

    pub(crate) fn post(&mut self, node: Node) {
        match node.kind() {
            "namespace_definition" => {
                if node.child_by_field_name("body").is_some() {
                    self.resolver.set_namespace(None);
                }
            }
            "class_declaration" | "interface_declaration" | "trait_declaration"
            | "enum_declaration" => {
                self.resolver.pop_class();
                self.vars.pop_scope();
            }
            "object_creation_expression" => {
                if reader::anonymous_class_body(node).is_some() {
                    self.resolver.pop_class();
                    self.vars.pop_scope();
                }
            }
            "function_definition" | "method_declaration" | "anonymous_function"
            | "anonymous_function_creation_expression" | "arrow_function" => {
                self.vars.pop_scope();
            }
            "if_statement" => {
                let has_alternative = {
                    let mut cursor = node.walk();
                    let result = node
                        .named_children(&mut cursor)
                        .any(|c| matches!(c.kind(), "else_if_clause" | "else_clause"));
                    result
                };
                if has_alternative {
                    self.vars.pop_branch_collect();
                } else {
                    // A lone `if` arm folds back to the pre-branch state.
                    self.vars.pop_branch_discard();
                }
                self.vars.prune_branches();
            }
            "switch_statement" => {
                self.vars.prune_branches();
            }
            "case_statement" | "default_statement" => {
                self.vars.pop_branch_collect();
            }
            _ => {}
        }
    }

    fn enter_class_like(&mut self, node: Node) {
        let short = node
            .child_by_field_name("name")
            .map(|n| node_text(n, self.source).to_string())
            .unwrap_or_default();
        let fqn = self.resolver.resolve_relative(&short);
        let base = self.base_class_of(node);
        self.resolver.push_class(fqn, base);
        self.vars.push_scope(Vec::new());
    }

    fn enter_anonymous_class(&mut self, node: Node) {
        let fqn = format!("#anon#{:x}#{}", self.table.uri_hash, node.start_byte());
        let base = self.base_class_of(node);
        self.resolver.push_class(fqn, base);
        self.vars.push_scope(Vec::new());
    }

    fn base_class_of(&self, node: Node) -> String {
        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor) {
            if clause.kind() == "base_clause" {
                if let Some(name) = named_child_of_kinds(clause, &["name", "qualified_name"]) {
                    return self
                        .resolver
                        .qualified_name_text(name, self.source, SymbolKind::Class);
                }
            }
        }
        String::new()
    }

    /// Copy declared parameter types from the matching symbol into the new
    /// scope.
    fn seed_parameters(&mut self, node: Node, kinds: &[SymbolKind]) {
        let Some(id) = self.table.symbol_starting_at(node.start_byte(), kinds) else {
            return;
        };
        let mut seeded = Vec::new();
        for &child in self.table.children(id) {
            let symbol = self.table.get(child);
            if symbol.kind == SymbolKind::Parameter {
                if let Some(type_info) = &symbol.type_info {
                    seeded.push((symbol.name.clone(), type_info.clone()));
                }
            }
        }
        for (name, type_info) in seeded {
            self.vars.set_type(&name, type_info);
        }
    }

    /// Types for a closure's `use (...)` list, resolved in the enclosing
    /// scope before the new scope is pushed.
    fn closure_carry(&self, node: Node) -> Vec<(String, TypeString)> {
        let mut carry = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "anonymous_function_use_clause" {
                continue;
            }
            let mut names = Vec::new();
            collect_variable_names(child, &mut names, self.source);
            for name in names {
                let type_info = self.vars.get_type(&name, self.resolver.current_class());
                carry.push((name, type_info));
            }
        }
        carry
    }

    fn handle_assignment(&mut self, node: Node) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        let Some(right) = node.child_by_field_name("right") else {
            return;
        };
        match left.kind() {
            "variable_name" => {
                let name = node_text(left, self.source).to_string();
                if name == "$this" {
                    return;
                }
                // A preceding `@var` annotation wins over the inferred
                // right-hand side.
                let rhs = match self.doc_overrides.remove(&name) {
                    Some(annotated) => annotated,
                    None => self.expr_type(right),
                };
                // An unresolvable right-hand side never clobbers a known type.
                if rhs.is_empty() {
                    return;
                }
                self.record_inferred(left, &rhs);
                self.vars.set_type(&name, rhs);
            }
            "list_literal" | "array_creation_expression" => {
                let element = self.expr_type(right).array_dereference();
                if element.is_empty() {
                    return;
                }
                let mut names = Vec::new();
                collect_variable_name_nodes(left, &mut names);
                for target in names {
                    let name = node_text(target, self.source).to_string();
                    self.record_inferred(target, &element);
                    self.vars.set_type(&name, element.clone());
                }
            }
            _ => {}
        }
    }

    fn handle_instanceof(&mut self, node: Node) {
        let is_instanceof = {
            let mut cursor = node.walk();
            let result = node.children(&mut cursor).any(|c| c.kind() == "instanceof");
            result
        };
        if !is_instanceof {
            return;
        }
        let Some(left) = node.named_child(0) else {
            return;
        };
        if left.kind() != "variable_name" {
            return;
        }
        let right = node.named_child(node.named_child_count().saturating_sub(1));
        let Some(right) = right else {
            return;
        };
        if !matches!(right.kind(), "name" | "qualified_name") {
            return;
        }
        let fqn = self
            .resolver
            .qualified_name_text(right, self.source, SymbolKind::Class);
        if fqn.is_empty() {
            return;
        }
        let name = node_text(left, self.source).to_string();
        self.vars.set_type(&name, TypeString::new(&fqn));
    }

    fn handle_foreach(&mut self, node: Node) {
        let Some(collection) = node.named_child(0) else {
            return;
        };
        let element = self.expr_type(collection).array_dereference();

        let mut targets = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor).skip(1) {
            // The loop body starts at the first statement-like child.
            if matches!(child.kind(), "compound_statement" | "colon_block")
                || child.kind().ends_with("_statement")
            {
                break;
            }
            collect_variable_name_nodes(child, &mut targets);
        }
        let Some((&value, keys)) = targets.split_last() else {
            return;
        };
        for &key in keys {
            let name = node_text(key, self.source).to_string();
            self.vars.set_type(&name, TypeString::new("int|string"));
        }
        let name = node_text(value, self.source).to_string();
        self.record_inferred(value, &element);
        self.vars.set_type(&name, element);
    }

    fn handle_var_tag(&mut self, node: Node) {
        let text = node_text(node, self.source);
        let Some(doc) = DocBlock::parse(text, Span::from_node(node)) else {
            return;
        };
        for var in &doc.vars {
            if let Some(name) = &var.name {
                let type_info = TypeString::new(&var.type_text).name_resolve(&self.resolver);
                if !type_info.is_empty() {
                    self.vars.set_type(name, type_info.clone());
                    self.doc_overrides.insert(name.clone(), type_info);
                }
            }
        }
    }

    /// A first-mention assignment is the local's declaration: the inferred
    /// type becomes a deferred write onto the Variable symbol.
    fn record_inferred(&mut self, node: Node, type_info: &TypeString) {
        if type_info.is_empty() {
            return;
        }
        if let Some(id) = self
            .table
            .symbol_starting_at(node.start_byte(), &[SymbolKind::Variable])
        {
            self.inferred.push((id, type_info.clone()));
        }
    }
}

fn collect_variable_names(node: Node, out: &mut Vec<String>, source: &str) {
    let mut nodes = Vec::new();
    collect_variable_name_nodes(node, &mut nodes);
    out.extend(nodes.into_iter().map(|n| node_text(n, source).to_string()));
}

fn collect_variable_name_nodes<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    if node.kind() == "variable_name" {
        out.push(node);
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_variable_name_nodes(child, out);
    }
}
