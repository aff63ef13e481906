use std::collections::BTreeMap;

use tree_sitter::{Node, Tree};

use crate::expr_types::ExprContext;
use crate::name_resolver::node_text;
use crate::reader;
use crate::store::SymbolStore;
use crate::symbol::{Span, SymbolId, SymbolKind, SymbolTable};
use crate::type_string::TypeString;
use crate::var_types::VariableTypeResolver;

/// What a name occurrence refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
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
    Constructor,
}

/// A stamped name occurrence, attached to its nearest enclosing scope symbol.
#[derive(Debug, Clone)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub name: String,
    pub uri_hash: u64,
    pub span: Span,
    /// Receiver class FQN for member references.
    pub scope: Option<String>,
    /// Global-namespace fallback for unqualified function/constant names.
    pub alt_name: Option<String>,
}

/// Output of the reference pass: per-scope reference lists plus the deferred
/// local-variable type writes.
#[derive(Debug, Default)]
pub struct DocumentReferences {
    pub scopes: Vec<(SymbolId, Vec<Reference>)>,
    pub local_types: Vec<(SymbolId, TypeString)>,
}

/// Second traversal: replays the resolver state the symbol reader had, keeps
/// the variable table live, and stamps every name occurrence with what it
/// resolves to. Runs in a single pass over the tree.
pub struct ReferenceReader<'s> {
    source: &'s str,
    table: &'s SymbolTable,
    vars: VariableTypeResolver<'s>,
    refs: BTreeMap<SymbolId, Vec<Reference>>,
    use_context: Option<UseContext>,
}

struct UseContext {
    kind: ReferenceKind,
    prefix: String,
}

impl<'s> ReferenceReader<'s> {
    pub fn read(
        store: &'s SymbolStore,
        table: &'s SymbolTable,
        tree: &Tree,
        source: &'s str,
    ) -> DocumentReferences {
        let mut reader = ReferenceReader {
            source,
            table,
            vars: VariableTypeResolver::new(store, table, source),
            refs: BTreeMap::new(),
            use_context: None,
        };
        reader.walk(tree.root_node());

        DocumentReferences {
            scopes: reader.refs.into_iter().collect(),
            local_types: reader.vars.take_inferred(),
        }
    }

    fn walk(&mut self, node: Node) {
        let descend = self.vars.pre(node);
        self.emit(node);
        if descend {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                self.walk(child);
            }
        }
        self.vars.post(node);
        if node.kind() == "namespace_use_declaration" {
            self.use_context = None;
        }
    }

    fn push(&mut self, reference: Reference) {
        if reference.name.is_empty() {
            return;
        }
        let scope = self.table.scope_at(reference.span.start_byte);
        self.refs.entry(scope).or_default().push(reference);
    }

    fn reference(&self, kind: ReferenceKind, name: String, node: Node) -> Reference {
        Reference {
            kind,
            name,
            uri_hash: self.table.uri_hash,
            span: Span::from_node(node),
            scope: None,
            alt_name: None,
        }
    }

    fn expr_ctx(&self) -> ExprContext<'_> {
        ExprContext {
            source: self.source,
            store: self.vars_store(),
            table: self.table,
            resolver: &self.vars.resolver,
            vars: &self.vars.vars,
        }
    }

    fn vars_store(&self) -> &'s SymbolStore {
        self.vars.store()
    }

    fn emit(&mut self, node: Node) {
        match node.kind() {
            "namespace_use_declaration" => {
                self.use_context = Some(UseContext {
                    kind: match reader::use_declaration_kind(node) {
                        SymbolKind::Function => ReferenceKind::Function,
                        SymbolKind::Constant => ReferenceKind::Constant,
                        _ => ReferenceKind::Class,
                    },
                    prefix: reader::group_prefix(node, self.source),
                });
            }
            "namespace_use_clause" | "namespace_use_group_clause" => {
                self.emit_use_clause(node);
            }
            "name" | "qualified_name" => self.emit_name(node),
            "member_access_expression" | "nullsafe_member_access_expression" => {
                self.emit_member(node, ReferenceKind::Property, false);
            }
            "member_call_expression" | "nullsafe_member_call_expression" => {
                self.emit_member(node, ReferenceKind::Method, false);
            }
            "scoped_call_expression" => {
                self.emit_member(node, ReferenceKind::Method, true);
            }
            "scoped_property_access_expression" => {
                self.emit_member(node, ReferenceKind::Property, true);
            }
            "class_constant_access_expression" => {
                self.emit_class_constant(node);
            }
            "variable_name" => self.emit_variable(node),
            _ => {}
        }
    }

    fn emit_use_clause(&mut self, node: Node) {
        let (kind, prefix) = match &self.use_context {
            Some(ctx) => (ctx.kind, ctx.prefix.clone()),
            None => (ReferenceKind::Class, String::new()),
        };
        let Some(target) =
            reader::named_child_of_kinds(node, &["qualified_name", "name", "namespace_name"])
        else {
            return;
        };
        let mut fqn = node_text(target, self.source)
            .trim_start_matches('\\')
            .to_string();
        if !prefix.is_empty() {
            fqn = format!("{prefix}\\{fqn}");
        }
        let reference = self.reference(kind, fqn, target);
        self.push(reference);
    }

    fn emit_name(&mut self, node: Node) {
        let Some(parent) = node.parent() else {
            return;
        };
        let text = node_text(node, self.source);
        let parent_kind = parent.kind();

        // Names that are part of a larger name, a declaration's own name, or
        // a member position handled elsewhere.
        match parent_kind {
            "namespace_name" | "qualified_name" | "namespace_name_as_prefix"
            | "namespace_aliasing_clause" | "namespace_use_clause" | "namespace_use_group_clause"
            | "namespace_definition" => return,
            _ => {}
        }
        if parent
            .child_by_field_name("name")
            .is_some_and(|n| n.id() == node.id())
        {
            // Declaration names and member-name fields are not references
            // of their own; member accesses emit through emit_member.
            return;
        }
        if parent_kind == "const_element" {
            return;
        }
        if parent_kind == "class_constant_access_expression"
            && !parent.named_child(0).is_some_and(|n| n.id() == node.id())
        {
            // Only the scope position is a class reference; the constant
            // name emits through emit_class_constant.
            return;
        }

        let resolver = &self.vars.resolver;
        let reference = match parent_kind {
            "function_call_expression" => {
                let fqn = resolver.resolve_name_text(text, SymbolKind::Function);
                let alt = resolver.global_fallback(text, SymbolKind::Function);
                let mut r = self.reference(ReferenceKind::Function, fqn, node);
                r.alt_name = alt;
                r
            }
            "object_creation_expression" => {
                let fqn = resolver.resolve_name_text(text, SymbolKind::Class);
                self.reference(ReferenceKind::Constructor, fqn, node)
            }
            "base_clause" => {
                let kind = if parent
                    .parent()
                    .is_some_and(|g| g.kind() == "interface_declaration")
                {
                    ReferenceKind::Interface
                } else {
                    ReferenceKind::Class
                };
                let fqn = resolver.resolve_name_text(text, SymbolKind::Class);
                self.reference(kind, fqn, node)
            }
            "class_interface_clause" => {
                let fqn = resolver.resolve_name_text(text, SymbolKind::Class);
                self.reference(ReferenceKind::Interface, fqn, node)
            }
            "use_declaration" => {
                let fqn = resolver.resolve_name_text(text, SymbolKind::Class);
                self.reference(ReferenceKind::Trait, fqn, node)
            }
            "binary_expression" => {
                let is_instanceof = {
                    let mut cursor = parent.walk();
                    let result = parent.children(&mut cursor).any(|c| c.kind() == "instanceof");
                    result
                };
                if is_instanceof {
                    let fqn = resolver.resolve_name_text(text, SymbolKind::Class);
                    self.reference(ReferenceKind::Class, fqn, node)
                } else {
                    let fqn = resolver.resolve_name_text(text, SymbolKind::Constant);
                    let alt = resolver.global_fallback(text, SymbolKind::Constant);
                    let mut r = self.reference(ReferenceKind::Constant, fqn, node);
                    r.alt_name = alt;
                    r
                }
            }
            "named_type" | "attribute" | "type_list" | "catch_clause"
            | "scoped_call_expression" | "scoped_property_access_expression"
            | "class_constant_access_expression" => {
                let fqn = resolver.resolve_name_text(text, SymbolKind::Class);
                self.reference(ReferenceKind::Class, fqn, node)
            }
            _ => {
                // A bare name in expression position is a constant fetch.
                let fqn = resolver.resolve_name_text(text, SymbolKind::Constant);
                let alt = resolver.global_fallback(text, SymbolKind::Constant);
                let mut r = self.reference(ReferenceKind::Constant, fqn, node);
                r.alt_name = alt;
                r
            }
        };
        self.push(reference);
    }

    fn emit_member(&mut self, node: Node, kind: ReferenceKind, scoped: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let raw = node_text(name_node, self.source);
        if raw.is_empty() || raw == "$" {
            return;
        }
        let name = match (kind, name_node.kind()) {
            // Instance property accesses drop the sigil in source; symbol
            // names carry it.
            (ReferenceKind::Property, "name") => format!("${raw}"),
            (_, "name" | "variable_name") => raw.to_string(),
            _ => return,
        };

        let receiver = if scoped {
            self.scoped_receiver(node)
        } else {
            node.child_by_field_name("object")
                .map(|obj| {
                    let ctx = self.expr_ctx();
                    crate::expr_types::resolve_expr_type(&ctx, obj)
                })
                .unwrap_or_default()
        };
        let scope = receiver
            .atomic_class_array()
            .first()
            .map(|s| s.to_string());

        let mut reference = self.reference(kind, name, name_node);
        reference.scope = scope;
        self.push(reference);
    }

    fn scoped_receiver(&self, node: Node) -> TypeString {
        let scope = node
            .child_by_field_name("scope")
            .or_else(|| node.named_child(0));
        let Some(scope) = scope else {
            return TypeString::empty();
        };
        let ctx = self.expr_ctx();
        crate::expr_types::resolve_expr_type(&ctx, scope)
    }

    fn emit_class_constant(&mut self, node: Node) {
        let count = node.named_child_count();
        if count < 2 {
            return;
        }
        let Some(name_node) = node.named_child(count - 1) else {
            return;
        };
        if name_node.kind() != "name" {
            return;
        }
        let name = node_text(name_node, self.source);
        if name == "class" {
            return;
        }

        let receiver = self.scoped_receiver(node);
        let scope = receiver
            .atomic_class_array()
            .first()
            .map(|s| s.to_string());

        let mut reference =
            self.reference(ReferenceKind::ClassConstant, name.to_string(), name_node);
        reference.scope = scope;
        self.push(reference);
    }

    fn emit_variable(&mut self, node: Node) {
        let name = node_text(node, self.source);
        if name == "$this" || name == "$" {
            return;
        }
        if let Some(parent) = node.parent() {
            // `Scope::$prop` names a static property, handled by emit_member.
            if parent.kind() == "scoped_property_access_expression"
                && parent
                    .child_by_field_name("name")
                    .is_some_and(|n| n.id() == node.id())
            {
                return;
            }
            // The `as $x` binding of a use clause declares, not references.
            if parent.kind() == "anonymous_function_use_clause" {
                return;
            }
        }
        let reference = self.reference(ReferenceKind::Variable, name.to_string(), node);
        self.push(reference);
    }
}
