use lsp_types::Url;
use tree_sitter::{Node, Tree};

use crate::docblock::DocBlock;
use crate::name_resolver::{node_text, NameResolver, UseRule};
use crate::symbol::{uri_hash, Associated, Modifiers, Span, Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::type_string::TypeString;

/// Builds a document's symbol tree in a single traversal, resolving names
/// against the lexical namespace and `use` scopes as it goes.
pub struct SymbolReader<'a> {
    source: &'a str,
    uri_hash: u64,
    resolver: NameResolver,
    symbols: Vec<Symbol>,
    spine: Vec<SymbolId>,
    doc_stack: Vec<Option<DocBlock>>,
    last_doc: Option<DocBlock>,
    use_context: Option<UseContext>,
}

struct UseContext {
    kind: SymbolKind,
    prefix: String,
}

impl<'a> SymbolReader<'a> {
    pub fn read(uri: &Url, source: &'a str, tree: &Tree) -> SymbolTable {
        let mut root = Symbol::new(SymbolKind::File, uri.to_string());
        root.span = Span::from_node(tree.root_node());

        let mut reader = SymbolReader {
            source,
            uri_hash: uri_hash(uri),
            resolver: NameResolver::default(),
            symbols: vec![root],
            spine: vec![SymbolId(0)],
            doc_stack: Vec::new(),
            last_doc: None,
            use_context: None,
        };
        reader.visit(tree.root_node());
        SymbolTable::new(uri.clone(), reader.symbols)
    }

    fn visit(&mut self, node: Node) {
        if self.pre(node) {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                self.visit(child);
            }
        }
        self.post(node);
    }

    /// Pre-order action. Returns false to skip the node's children.
    fn pre(&mut self, node: Node) -> bool {
        match node.kind() {
            "namespace_definition" => self.enter_namespace(node),
            "namespace_use_declaration" => {
                self.use_context = Some(UseContext {
                    kind: use_declaration_kind(node),
                    prefix: group_prefix(node, self.source),
                });
                true
            }
            "namespace_use_clause" | "namespace_use_group_clause" => {
                self.read_use_clause(node);
                false
            }
            "const_declaration" => {
                self.read_const_declaration(node);
                false
            }
            "function_definition" => {
                self.enter_function(node);
                true
            }
            "method_declaration" => {
                self.enter_method(node);
                true
            }
            "simple_parameter" | "variadic_parameter" | "property_promotion_parameter" => {
                self.read_parameter(node);
                false
            }
            "class_declaration" => {
                self.enter_class_like(node, SymbolKind::Class);
                true
            }
            "interface_declaration" => {
                self.enter_class_like(node, SymbolKind::Interface);
                true
            }
            "trait_declaration" => {
                self.enter_class_like(node, SymbolKind::Trait);
                true
            }
            "enum_declaration" => {
                self.enter_class_like(node, SymbolKind::Class);
                true
            }
            "enum_case" => {
                self.read_enum_case(node);
                false
            }
            "use_declaration" => {
                self.read_trait_use(node);
                false
            }
            "property_declaration" => {
                self.read_property_declaration(node);
                false
            }
            "anonymous_function" | "anonymous_function_creation_expression" | "arrow_function" => {
                self.enter_anonymous_function(node);
                true
            }
            "anonymous_function_use_clause" => {
                self.read_closure_use(node);
                false
            }
            "object_creation_expression" => {
                if anonymous_class_body(node).is_some() {
                    self.enter_anonymous_class(node);
                }
                true
            }
            "comment" => {
                let text = node_text(node, self.source);
                if let Some(doc) = DocBlock::parse(text, Span::from_node(node)) {
                    self.last_doc = Some(doc);
                }
                false
            }
            "variable_name" => {
                self.read_simple_variable(node);
                false
            }
            _ => true,
        }
    }

    fn post(&mut self, node: Node) {
        match node.kind() {
            "namespace_definition" => {
                if node.child_by_field_name("body").is_some() {
                    self.resolver.set_namespace(None);
                }
            }
            "namespace_use_declaration" => {
                self.use_context = None;
            }
            "function_definition" | "method_declaration" | "anonymous_function"
            | "anonymous_function_creation_expression" | "arrow_function" => {
                self.spine.pop();
                self.doc_stack.pop();
            }
            "class_declaration" | "interface_declaration" | "trait_declaration"
            | "enum_declaration" => {
                self.spine.pop();
                self.resolver.pop_class();
            }
            "object_creation_expression" => {
                if anonymous_class_body(node).is_some() {
                    self.spine.pop();
                    self.resolver.pop_class();
                }
            }
            _ => {}
        }
    }

    fn append(&mut self, mut sym: Symbol) -> SymbolId {
        let parent = *self.spine.last().expect("spine never empty");
        sym.parent = Some(parent);
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(sym);
        self.symbols[parent.index()].children.push(id);
        id
    }

    fn top_kind(&self) -> SymbolKind {
        self.symbols[self.spine.last().expect("spine never empty").index()].kind
    }

    fn enter_namespace(&mut self, node: Node) -> bool {
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(n, self.source).to_string())
            .unwrap_or_default();

        let mut sym = Symbol::new(SymbolKind::Namespace, name.clone());
        sym.span = Span::from_node(node);
        sym.name_span = node
            .child_by_field_name("name")
            .map(Span::from_node)
            .unwrap_or(sym.span);
        if let Some(doc) = self.last_doc.take() {
            sym.description = doc.summary;
        }
        self.append(sym);

        self.resolver
            .set_namespace(if name.is_empty() { None } else { Some(name) });
        true
    }

    fn read_use_clause(&mut self, node: Node) {
        let (kind, prefix) = match &self.use_context {
            Some(ctx) => (ctx.kind, ctx.prefix.clone()),
            None => (SymbolKind::Class, String::new()),
        };
        let Some(rule) = clause_rule(node, self.source, kind, &prefix) else {
            return;
        };

        let mut sym = Symbol::new(rule.kind, rule.alias.clone());
        sym.modifiers = Modifiers::USE;
        sym.span = Span::from_node(node);
        sym.name_span = sym.span;
        sym.associated.push(Associated {
            kind: rule.kind,
            name: rule.target.clone(),
        });
        self.append(sym);

        self.resolver.push_rule(rule);
    }

    fn read_const_declaration(&mut self, node: Node) {
        let in_class = self.top_kind().is_class_like();
        let mut modifiers = parse_modifiers(node, self.source);
        if in_class && modifiers.visibility_is_empty() {
            modifiers |= Modifiers::PUBLIC;
        }
        let doc = self.last_doc.take();

        let mut cursor = node.walk();
        for element in node.named_children(&mut cursor) {
            if element.kind() != "const_element" {
                continue;
            }
            let Some(name_node) = named_child_of_kinds(element, &["name"]) else {
                continue;
            };
            let short = node_text(name_node, self.source).to_string();

            let mut sym = if in_class {
                let mut s = Symbol::new(SymbolKind::ClassConstant, short);
                s.scope = Some(self.resolver.current_class().to_string());
                s.modifiers = modifiers;
                s
            } else {
                Symbol::new(SymbolKind::Constant, self.resolver.resolve_relative(&short))
            };
            sym.span = Span::from_node(element);
            sym.name_span = Span::from_node(name_node);
            sym.type_info = element
                .named_child(1)
                .and_then(|v| literal_type(v))
                .map(TypeString::new);
            if let Some(doc) = &doc {
                sym.description = doc.summary.clone();
            }
            self.append(sym);
        }
    }

    fn enter_function(&mut self, node: Node) {
        let doc = self.last_doc.take();
        let short = node
            .child_by_field_name("name")
            .map(|n| node_text(n, self.source).to_string())
            .unwrap_or_default();

        let mut sym = Symbol::new(SymbolKind::Function, self.resolver.resolve_relative(&short));
        sym.span = Span::from_node(node);
        sym.name_span = node
            .child_by_field_name("name")
            .map(Span::from_node)
            .unwrap_or(sym.span);
        sym.type_info = self.return_type_of(node, doc.as_ref());
        sym.description = doc.as_ref().and_then(|d| d.summary.clone());

        let id = self.append(sym);
        self.spine.push(id);
        self.doc_stack.push(doc);
    }

    fn enter_method(&mut self, node: Node) {
        let doc = self.last_doc.take();
        let short = node
            .child_by_field_name("name")
            .map(|n| node_text(n, self.source).to_string())
            .unwrap_or_default();

        let mut modifiers = parse_modifiers(node, self.source);
        if modifiers.visibility_is_empty() {
            modifiers |= Modifiers::PUBLIC;
        }

        let mut sym = Symbol::new(SymbolKind::Method, short);
        sym.modifiers = modifiers;
        sym.scope = Some(self.resolver.current_class().to_string());
        sym.span = Span::from_node(node);
        sym.name_span = node
            .child_by_field_name("name")
            .map(Span::from_node)
            .unwrap_or(sym.span);
        sym.type_info = self.return_type_of(node, doc.as_ref());
        sym.description = doc.as_ref().and_then(|d| d.summary.clone());

        let id = self.append(sym);
        self.spine.push(id);
        self.doc_stack.push(doc);
    }

    fn return_type_of(&self, node: Node, doc: Option<&DocBlock>) -> Option<TypeString> {
        let declared = node
            .child_by_field_name("return_type")
            .map(|t| TypeString::new(node_text(t, self.source)).name_resolve(&self.resolver));
        let documented = doc
            .and_then(|d| d.return_type.as_deref())
            .map(|t| TypeString::new(t).name_resolve(&self.resolver));
        match (declared, documented) {
            (Some(a), Some(b)) => Some(a.merge(&b)),
            (a, b) => a.or(b),
        }
        .filter(|t| !t.is_empty())
    }

    fn read_parameter(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();

        let mut modifiers = Modifiers::default();
        if node.kind() == "variadic_parameter" {
            modifiers |= Modifiers::VARIADIC;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "reference_modifier" => modifiers |= Modifiers::REFERENCE,
                "..." => modifiers |= Modifiers::VARIADIC,
                _ => {}
            }
        }

        let declared = node
            .child_by_field_name("type")
            .map(|t| TypeString::new(node_text(t, self.source)).name_resolve(&self.resolver));
        let documented = self
            .doc_stack
            .last()
            .and_then(|d| d.as_ref())
            .and_then(|d| d.param_type(&name))
            .map(|t| TypeString::new(t).name_resolve(&self.resolver));
        let defaulted = node
            .child_by_field_name("default_value")
            .and_then(literal_type)
            .map(TypeString::new);

        let mut sym = Symbol::new(SymbolKind::Parameter, name.clone());
        sym.modifiers = modifiers;
        sym.span = Span::from_node(node);
        sym.name_span = Span::from_node(name_node);
        sym.type_info = match (declared, documented) {
            (Some(a), Some(b)) => Some(a.merge(&b)),
            (a, b) => a.or(b).or(defaulted),
        }
        .filter(|t| !t.is_empty());
        let param_type = sym.type_info.clone();
        self.append(sym);

        // Constructor property promotion declares a property on the class.
        if node.kind() == "property_promotion_parameter" {
            let visibility = parse_modifiers(node, self.source);
            if let Some(class_id) = self.enclosing_class_id() {
                let mut prop = Symbol::new(SymbolKind::Property, name);
                prop.modifiers = visibility;
                prop.scope = Some(self.resolver.current_class().to_string());
                prop.span = Span::from_node(node);
                prop.name_span = Span::from_node(name_node);
                prop.type_info = param_type;
                prop.parent = Some(class_id);
                let id = SymbolId(self.symbols.len() as u32);
                self.symbols.push(prop);
                self.symbols[class_id.index()].children.push(id);
            }
        }
    }

    fn enclosing_class_id(&self) -> Option<SymbolId> {
        self.spine
            .iter()
            .rev()
            .copied()
            .find(|id| self.symbols[id.index()].kind.is_class_like())
    }

    fn enter_class_like(&mut self, node: Node, kind: SymbolKind) {
        let doc = self.last_doc.take();
        let short = node
            .child_by_field_name("name")
            .map(|n| node_text(n, self.source).to_string())
            .unwrap_or_default();
        let fqn = self.resolver.resolve_relative(&short);

        let mut sym = Symbol::new(kind, fqn.clone());
        sym.modifiers = parse_modifiers(node, self.source);
        sym.span = Span::from_node(node);
        sym.name_span = node
            .child_by_field_name("name")
            .map(Span::from_node)
            .unwrap_or(sym.span);
        sym.description = doc.as_ref().and_then(|d| d.summary.clone());
        sym.associated = self.class_associations(node, kind);

        let base = sym
            .associated
            .iter()
            .find(|a| a.kind == SymbolKind::Class)
            .map(|a| a.name.clone())
            .unwrap_or_default();

        let id = self.append(sym);
        self.resolver.push_class(fqn.clone(), base);
        self.spine.push(id);

        if let Some(doc) = doc {
            self.add_magic_members(&doc, &fqn);
        }
    }

    fn class_associations(&self, node: Node, kind: SymbolKind) -> Vec<Associated> {
        let mut out = Vec::new();
        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor) {
            let assoc_kind = match clause.kind() {
                // `interface A extends B` associates interfaces, not a base class.
                "base_clause" if kind == SymbolKind::Interface => SymbolKind::Interface,
                "base_clause" => SymbolKind::Class,
                "class_interface_clause" => SymbolKind::Interface,
                _ => continue,
            };
            let mut inner = clause.walk();
            for name_node in clause.named_children(&mut inner) {
                if matches!(name_node.kind(), "name" | "qualified_name") {
                    let fqn =
                        self.resolver
                            .qualified_name_text(name_node, self.source, SymbolKind::Class);
                    if !fqn.is_empty() {
                        out.push(Associated {
                            kind: assoc_kind,
                            name: fqn,
                        });
                    }
                }
            }
        }
        out
    }

    fn add_magic_members(&mut self, doc: &DocBlock, class_fqn: &str) {
        for tag in &doc.properties {
            let mut sym = Symbol::new(SymbolKind::Property, tag.name.clone());
            sym.modifiers = Modifiers::PUBLIC | Modifiers::MAGIC;
            if tag.read_only {
                sym.modifiers |= Modifiers::READ_ONLY;
            }
            if tag.write_only {
                sym.modifiers |= Modifiers::WRITE_ONLY;
            }
            sym.scope = Some(class_fqn.to_string());
            sym.span = doc.span;
            sym.name_span = doc.span;
            sym.type_info = Some(TypeString::new(&tag.type_text).name_resolve(&self.resolver))
                .filter(|t| !t.is_empty());
            self.append(sym);
        }

        for tag in &doc.methods {
            let mut sym = Symbol::new(SymbolKind::Method, tag.name.clone());
            sym.modifiers = Modifiers::PUBLIC | Modifiers::MAGIC;
            if tag.is_static {
                sym.modifiers |= Modifiers::STATIC;
            }
            sym.scope = Some(class_fqn.to_string());
            sym.span = doc.span;
            sym.name_span = doc.span;
            sym.type_info = tag
                .return_type
                .as_deref()
                .map(|t| TypeString::new(t).name_resolve(&self.resolver))
                .filter(|t| !t.is_empty());
            let id = self.append(sym);

            self.spine.push(id);
            for param in &tag.parameters {
                if let Some(name) = &param.name {
                    let mut p = Symbol::new(SymbolKind::Parameter, name.clone());
                    p.modifiers = Modifiers::MAGIC;
                    p.span = doc.span;
                    p.name_span = doc.span;
                    p.type_info = Some(TypeString::new(&param.type_text))
                        .filter(|t| !t.is_empty())
                        .map(|t| t.name_resolve(&self.resolver));
                    self.append(p);
                }
            }
            self.spine.pop();
        }
    }

    fn read_enum_case(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let mut sym = Symbol::new(
            SymbolKind::ClassConstant,
            node_text(name_node, self.source).to_string(),
        );
        sym.modifiers = Modifiers::PUBLIC;
        sym.scope = Some(self.resolver.current_class().to_string());
        sym.span = Span::from_node(node);
        sym.name_span = Span::from_node(name_node);
        self.append(sym);
    }

    fn read_trait_use(&mut self, node: Node) {
        let Some(class_id) = self.enclosing_class_id() else {
            return;
        };
        let mut cursor = node.walk();
        let mut names = Vec::new();
        for child in node.named_children(&mut cursor) {
            if matches!(child.kind(), "name" | "qualified_name") {
                let fqn = self
                    .resolver
                    .qualified_name_text(child, self.source, SymbolKind::Class);
                if !fqn.is_empty() {
                    names.push(fqn);
                }
            }
        }
        for name in names {
            self.symbols[class_id.index()].associated.push(Associated {
                kind: SymbolKind::Trait,
                name,
            });
        }
    }

    fn read_property_declaration(&mut self, node: Node) {
        let mut modifiers = parse_modifiers(node, self.source);
        if modifiers.visibility_is_empty() {
            modifiers |= Modifiers::PUBLIC;
        }
        let doc = self.last_doc.take();

        let declared = node
            .child_by_field_name("type")
            .or_else(|| {
                named_child_of_kinds(
                    node,
                    &[
                        "named_type",
                        "primitive_type",
                        "optional_type",
                        "union_type",
                        "intersection_type",
                    ],
                )
            })
            .map(|t| TypeString::new(node_text(t, self.source)).name_resolve(&self.resolver))
            .filter(|t| !t.is_empty());
        let documented = doc
            .as_ref()
            .and_then(|d| d.vars.first())
            .map(|v| TypeString::new(&v.type_text).name_resolve(&self.resolver))
            .filter(|t| !t.is_empty());

        let mut cursor = node.walk();
        for element in node.named_children(&mut cursor) {
            if element.kind() != "property_element" {
                continue;
            }
            let Some(name_node) = named_child_of_kinds(element, &["variable_name"]) else {
                continue;
            };
            let mut sym = Symbol::new(
                SymbolKind::Property,
                node_text(name_node, self.source).to_string(),
            );
            sym.modifiers = modifiers;
            sym.scope = Some(self.resolver.current_class().to_string());
            sym.span = Span::from_node(element);
            sym.name_span = Span::from_node(name_node);
            sym.type_info = declared.clone().or_else(|| documented.clone());
            sym.description = doc.as_ref().and_then(|d| d.summary.clone());
            self.append(sym);
        }
    }

    fn synthetic_name(&self, node: Node) -> String {
        format!("#anon#{:x}#{}", self.uri_hash, node.start_byte())
    }

    fn enter_anonymous_function(&mut self, node: Node) {
        let mut sym = Symbol::new(SymbolKind::Function, self.synthetic_name(node));
        sym.modifiers = Modifiers::ANONYMOUS;
        if has_child_of_kind(node, "static_modifier") {
            sym.modifiers |= Modifiers::STATIC;
        }
        sym.span = Span::from_node(node);
        sym.name_span = sym.span;
        sym.type_info = self.return_type_of(node, None);

        let id = self.append(sym);
        self.spine.push(id);
        self.doc_stack.push(self.last_doc.take());
    }

    fn read_closure_use(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let var_node = if child.kind() == "variable_name" {
                Some(child)
            } else {
                named_child_of_kinds(child, &["variable_name"])
            };
            if let Some(var) = var_node {
                let mut sym =
                    Symbol::new(SymbolKind::Variable, node_text(var, self.source).to_string());
                sym.modifiers = Modifiers::USE;
                sym.span = Span::from_node(var);
                sym.name_span = sym.span;
                self.append(sym);
            }
        }
    }

    fn enter_anonymous_class(&mut self, node: Node) {
        let fqn = self.synthetic_name(node);
        let mut sym = Symbol::new(SymbolKind::Class, fqn.clone());
        sym.modifiers = Modifiers::ANONYMOUS;
        sym.span = Span::from_node(node);
        sym.name_span = sym.span;
        sym.associated = self.class_associations(node, SymbolKind::Class);

        let base = sym
            .associated
            .iter()
            .find(|a| a.kind == SymbolKind::Class)
            .map(|a| a.name.clone())
            .unwrap_or_default();

        let id = self.append(sym);
        self.resolver.push_class(fqn, base);
        self.spine.push(id);
    }

    fn read_simple_variable(&mut self, node: Node) {
        if !matches!(
            self.top_kind(),
            SymbolKind::File | SymbolKind::Function | SymbolKind::Method
        ) {
            return;
        }
        let name = node_text(node, self.source);
        if name == "$this" || name == "$" {
            return;
        }
        // Static property accesses name a property, not a local.
        if let Some(parent) = node.parent() {
            if parent.kind() == "scoped_property_access_expression"
                && parent
                    .child_by_field_name("name")
                    .is_some_and(|n| n.id() == node.id())
            {
                return;
            }
        }
        let top = *self.spine.last().expect("spine never empty");
        let already = self.symbols[top.index()].children.iter().any(|&c| {
            let s = &self.symbols[c.index()];
            matches!(s.kind, SymbolKind::Variable | SymbolKind::Parameter) && s.name == name
        });
        if already {
            return;
        }
        let mut sym = Symbol::new(SymbolKind::Variable, name.to_string());
        sym.span = Span::from_node(node);
        sym.name_span = sym.span;
        self.append(sym);
    }
}

/// `use function ...` / `use const ...` / plain class import.
pub(crate) fn use_declaration_kind(node: Node) -> SymbolKind {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function" => return SymbolKind::Function,
            "const" => return SymbolKind::Constant,
            _ => {}
        }
    }
    SymbolKind::Class
}

/// Parse a single use clause into a resolver rule. Group clauses may carry
/// their own `function`/`const` qualifier and inherit the group prefix.
pub(crate) fn clause_rule(
    node: Node,
    source: &str,
    default_kind: SymbolKind,
    prefix: &str,
) -> Option<UseRule> {
    let kind = clause_kind(node).unwrap_or(default_kind);

    let target = named_child_of_kinds(node, &["qualified_name", "name", "namespace_name"])
        .map(|n| node_text(n, source).trim_start_matches('\\').to_string())
        .filter(|t| !t.is_empty())?;
    let target = if prefix.is_empty() {
        target
    } else {
        format!("{prefix}\\{target}")
    };

    let alias = node
        .children(&mut node.walk())
        .find(|c| c.kind() == "namespace_aliasing_clause")
        .and_then(|c| named_child_of_kinds(c, &["name"]))
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_else(|| crate::symbol::not_fqn(&target).to_string());

    Some(UseRule {
        kind,
        alias,
        target,
    })
}

/// Replay a whole `use` declaration into the resolver without building
/// symbols. The reference and variable-type passes use this to mirror the
/// symbol reader's resolver state.
pub(crate) fn replay_use_declaration(
    resolver: &mut crate::name_resolver::NameResolver,
    node: Node,
    source: &str,
) {
    let kind = use_declaration_kind(node);
    let prefix = group_prefix(node, source);
    let mut clauses = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "namespace_use_clause" | "namespace_use_group_clause" => clauses.push(child),
            "namespace_use_group" => {
                let mut inner = child.walk();
                for clause in child.named_children(&mut inner) {
                    if matches!(
                        clause.kind(),
                        "namespace_use_clause" | "namespace_use_group_clause"
                    ) {
                        clauses.push(clause);
                    }
                }
            }
            _ => {}
        }
    }
    for clause in clauses {
        if let Some(rule) = clause_rule(clause, source, kind, &prefix) {
            resolver.push_rule(rule);
        }
    }
}

fn clause_kind(node: Node) -> Option<SymbolKind> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function" => return Some(SymbolKind::Function),
            "const" => return Some(SymbolKind::Constant),
            _ => {}
        }
    }
    None
}

/// The `A\B` prefix of a grouped `use A\B\{C, D};` declaration.
pub(crate) fn group_prefix(node: Node, source: &str) -> String {
    let mut cursor = node.walk();
    let has_group = node
        .named_children(&mut cursor)
        .any(|c| c.kind() == "namespace_use_group");
    if !has_group {
        return String::new();
    }
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "namespace_name")
        .map(|n| node_text(n, source).trim_start_matches('\\').to_string())
        .unwrap_or_default();
    result
}

pub(crate) fn named_child_of_kinds<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .find(|c| kinds.contains(&c.kind()));
    result
}

fn has_child_of_kind(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == kind);
    result
}

pub(crate) fn anonymous_class_body(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "declaration_list");
    result
}

fn parse_modifiers(node: Node, source: &str) -> Modifiers {
    let mut modifiers = Modifiers::default();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "visibility_modifier" => match node_text(child, source) {
                "public" => modifiers |= Modifiers::PUBLIC,
                "protected" => modifiers |= Modifiers::PROTECTED,
                "private" => modifiers |= Modifiers::PRIVATE,
                _ => {}
            },
            "static_modifier" => modifiers |= Modifiers::STATIC,
            "final_modifier" => modifiers |= Modifiers::FINAL,
            "abstract_modifier" => modifiers |= Modifiers::ABSTRACT,
            "readonly_modifier" => modifiers |= Modifiers::READ_ONLY,
            "var_modifier" => modifiers |= Modifiers::PUBLIC,
            _ => {}
        }
    }
    modifiers
}

/// The built-in type of a literal node, for untyped defaults and constants.
pub(crate) fn literal_type(node: Node) -> Option<&'static str> {
    match node.kind() {
        "string" | "encapsed_string" | "heredoc" | "nowdoc" => Some("string"),
        "integer" => Some("int"),
        "float" => Some("float"),
        "boolean" | "true" | "false" => Some("bool"),
        "null" => Some("null"),
        "array_creation_expression" => Some("array"),
        "unary_op_expression" => node.named_child(0).and_then(literal_type),
        _ => None,
    }
}

impl Modifiers {
    pub(crate) fn visibility_is_empty(&self) -> bool {
        !self.intersects(Modifiers::PUBLIC | Modifiers::PROTECTED | Modifiers::PRIVATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(source: &str) -> SymbolTable {
        let tree = php_parser::parse(source).expect("parse failed");
        let uri = Url::parse("file:///test/fixture.php").unwrap();
        SymbolReader::read(&uri, source, &tree)
    }

    fn find<'t>(table: &'t SymbolTable, kind: SymbolKind, name: &str) -> &'t Symbol {
        table
            .iter()
            .map(|(_, s)| s)
            .find(|s| s.kind == kind && s.name == name)
            .unwrap_or_else(|| panic!("no {kind:?} named {name}"))
    }

    #[test]
    fn test_namespaced_class_with_members() {
        let source = r#"<?php
namespace App\Model;

class User extends Base implements \Countable
{
    public const ROLE = 'admin';
    private string $email;
    protected static $cache;

    public function getEmail(): string
    {
        return $this->email;
    }
}
"#;
        let table = read(source);

        let class = find(&table, SymbolKind::Class, "App\\Model\\User");
        assert_eq!(
            class.associated,
            vec![
                Associated {
                    kind: SymbolKind::Class,
                    name: "App\\Model\\Base".to_string()
                },
                Associated {
                    kind: SymbolKind::Interface,
                    name: "Countable".to_string()
                },
            ]
        );

        let konst = find(&table, SymbolKind::ClassConstant, "ROLE");
        assert_eq!(konst.scope.as_deref(), Some("App\\Model\\User"));
        assert!(konst.modifiers.contains(Modifiers::PUBLIC));
        assert_eq!(konst.type_info.as_ref().unwrap().to_string(), "string");

        let email = find(&table, SymbolKind::Property, "$email");
        assert!(email.modifiers.contains(Modifiers::PRIVATE));
        assert_eq!(email.type_info.as_ref().unwrap().to_string(), "string");

        let cache = find(&table, SymbolKind::Property, "$cache");
        assert!(cache.modifiers.contains(Modifiers::PROTECTED | Modifiers::STATIC));

        let method = find(&table, SymbolKind::Method, "getEmail");
        assert_eq!(method.scope.as_deref(), Some("App\\Model\\User"));
        assert_eq!(method.type_info.as_ref().unwrap().to_string(), "string");
    }

    #[test]
    fn test_use_rules_resolve_associations() {
        let source = r#"<?php
namespace App;

use Support\Collection;
use Support\Contracts\Arrayable as ToArray;

class Repo extends Collection implements ToArray {}
"#;
        let table = read(source);

        let repo = find(&table, SymbolKind::Class, "App\\Repo");
        assert_eq!(repo.associated[0].name, "Support\\Collection");
        assert_eq!(repo.associated[1].name, "Support\\Contracts\\Arrayable");

        // The use clauses themselves appear as imported symbols.
        let import = find(&table, SymbolKind::Class, "ToArray");
        assert!(import.modifiers.contains(Modifiers::USE));
        assert_eq!(import.associated[0].name, "Support\\Contracts\\Arrayable");
    }

    #[test]
    fn test_function_parameters_and_doc_types() {
        let source = r#"<?php
namespace App;

/**
 * Greets a user.
 * @param User $user
 * @return string
 */
function greet($user, int $times = 1, ...$rest)
{
    return '';
}
"#;
        let table = read(source);

        let func = find(&table, SymbolKind::Function, "App\\greet");
        assert_eq!(func.description.as_deref(), Some("Greets a user."));
        assert_eq!(func.type_info.as_ref().unwrap().to_string(), "string");

        let user = find(&table, SymbolKind::Parameter, "$user");
        assert_eq!(user.type_info.as_ref().unwrap().to_string(), "App\\User");

        let times = find(&table, SymbolKind::Parameter, "$times");
        assert_eq!(times.type_info.as_ref().unwrap().to_string(), "int");

        let rest = find(&table, SymbolKind::Parameter, "$rest");
        assert!(rest.modifiers.contains(Modifiers::VARIADIC));
    }

    #[test]
    fn test_magic_members_from_doc_tags() {
        let source = r#"<?php
/**
 * @property int $p
 * @property-read string $r
 * @method static self make(array $attributes)
 */
class Model {}
"#;
        let table = read(source);

        let p = find(&table, SymbolKind::Property, "$p");
        assert!(p.modifiers.contains(Modifiers::MAGIC));
        assert_eq!(p.scope.as_deref(), Some("Model"));
        assert_eq!(p.type_info.as_ref().unwrap().to_string(), "int");

        let r = find(&table, SymbolKind::Property, "$r");
        assert!(r.modifiers.contains(Modifiers::READ_ONLY));

        let make = find(&table, SymbolKind::Method, "make");
        assert!(make.modifiers.contains(Modifiers::MAGIC | Modifiers::STATIC));
        // Magic members sit at the doc comment's location.
        assert_eq!(make.span.start_point.row, 1);
    }

    #[test]
    fn test_first_mention_variables() {
        let source = r#"<?php
function work()
{
    $a = 1;
    $a = 2;
    $b = $a;
}
"#;
        let table = read(source);
        let func = find(&table, SymbolKind::Function, "work");
        let vars: Vec<&str> = func
            .children
            .iter()
            .map(|&c| table.get(c).name.as_str())
            .collect();
        assert_eq!(vars, vec!["$a", "$b"]);
    }

    #[test]
    fn test_anonymous_function_with_use_clause() {
        let source = r#"<?php
$factor = 2;
$double = function ($n) use ($factor) {
    return $n * $factor;
};
"#;
        let table = read(source);

        let anon = table
            .iter()
            .map(|(_, s)| s)
            .find(|s| s.kind == SymbolKind::Function && s.modifiers.contains(Modifiers::ANONYMOUS))
            .expect("anonymous function symbol");
        assert!(anon.name.starts_with("#anon#"));

        let captured = anon
            .children
            .iter()
            .map(|&c| table.get(c))
            .find(|s| s.name == "$factor" && s.modifiers.contains(Modifiers::USE))
            .expect("captured variable");
        assert_eq!(captured.kind, SymbolKind::Variable);
    }

    #[test]
    fn test_trait_use_adds_association() {
        let source = r#"<?php
trait Greets {}
class Host
{
    use Greets;
}
"#;
        let table = read(source);
        let host = find(&table, SymbolKind::Class, "Host");
        assert_eq!(
            host.associated,
            vec![Associated {
                kind: SymbolKind::Trait,
                name: "Greets".to_string()
            }]
        );
    }

    #[test]
    fn test_top_level_constants_and_interface() {
        let source = r#"<?php
namespace App;

const LIMIT = 10;

interface Walker extends Mover {}
"#;
        let table = read(source);

        let limit = find(&table, SymbolKind::Constant, "App\\LIMIT");
        assert_eq!(limit.type_info.as_ref().unwrap().to_string(), "int");

        let walker = find(&table, SymbolKind::Interface, "App\\Walker");
        assert_eq!(
            walker.associated,
            vec![Associated {
                kind: SymbolKind::Interface,
                name: "App\\Mover".to_string()
            }]
        );
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let source = r#"<?php
namespace App;

class A { public function m(int $x): string { $y = $x; return ''; } }
function f() {}
"#;
        let a = read(source);
        let b = read(source);
        assert_eq!(a.len(), b.len());
        for ((_, sa), (_, sb)) in a.iter().zip(b.iter()) {
            assert_eq!(sa.kind, sb.kind);
            assert_eq!(sa.name, sb.name);
            assert_eq!(sa.modifiers, sb.modifiers);
            assert_eq!(sa.scope, sb.scope);
            assert_eq!(sa.span, sb.span);
        }
    }

    #[test]
    fn test_error_tree_still_produces_symbols() {
        let source = r#"<?php
class Ok { public function fine() {} }
function broken( {
"#;
        let table = read(source);
        assert!(table
            .iter()
            .any(|(_, s)| s.kind == SymbolKind::Class && s.name == "Ok"));
    }
}
