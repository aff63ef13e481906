use tree_sitter::Node;

use crate::symbol::SymbolKind;

/// An active `use` import: alias, target FQN, and whether it imports a
/// class-like, a function, or a constant.
#[derive(Debug, Clone)]
pub struct UseRule {
    pub kind: SymbolKind,
    pub alias: String,
    pub target: String,
}

/// Resolves not-fully-qualified names against the current namespace, the
/// active `use` rules, and the class context. Never fails: absent rules fall
/// through to relative resolution and empty input yields empty output.
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    namespace: Option<String>,
    rules: Vec<UseRule>,
    class_stack: Vec<(String, String)>,
}

impl NameResolver {
    pub fn namespace_name(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    /// Entering a namespace resets the import rules; PHP scopes `use`
    /// declarations to the enclosing namespace region.
    pub fn set_namespace(&mut self, namespace: Option<String>) {
        self.namespace = namespace.filter(|n| !n.is_empty());
        self.rules.clear();
    }

    pub fn push_rule(&mut self, rule: UseRule) {
        if !rule.target.is_empty() && !rule.alias.is_empty() {
            self.rules.push(rule);
        }
    }

    pub fn rules(&self) -> &[UseRule] {
        &self.rules
    }

    pub fn push_class(&mut self, class: String, base: String) {
        self.class_stack.push((class, base));
    }

    pub fn pop_class(&mut self) {
        self.class_stack.pop();
    }

    /// FQN of the innermost enclosing class-like, empty outside one.
    pub fn current_class(&self) -> &str {
        self.class_stack.last().map(|(c, _)| c.as_str()).unwrap_or("")
    }

    /// FQN of the innermost enclosing class's base class, empty if none.
    pub fn current_base(&self) -> &str {
        self.class_stack.last().map(|(_, b)| b.as_str()).unwrap_or("")
    }

    pub fn resolve_relative(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        match &self.namespace {
            Some(ns) => format!("{ns}\\{name}"),
            None => name.to_string(),
        }
    }

    pub fn resolve_not_fully_qualified(&self, name: &str, kind: SymbolKind) -> String {
        if name.is_empty() {
            return String::new();
        }
        if name.eq_ignore_ascii_case("self") || name.eq_ignore_ascii_case("static") {
            return self.current_class().to_string();
        }
        if name.eq_ignore_ascii_case("parent") {
            return self.current_base().to_string();
        }

        if let Some((head, rest)) = name.split_once('\\') {
            // Only class aliases can prefix a qualified name.
            if let Some(rule) = self.find_rule(head, SymbolKind::Class) {
                return format!("{}\\{}", rule.target, rest);
            }
            return self.resolve_relative(name);
        }

        let rule_kind = match kind {
            SymbolKind::Function => SymbolKind::Function,
            SymbolKind::Constant => SymbolKind::Constant,
            _ => SymbolKind::Class,
        };
        if let Some(rule) = self.find_rule(name, rule_kind) {
            return rule.target.clone();
        }
        self.resolve_relative(name)
    }

    fn find_rule(&self, alias: &str, kind: SymbolKind) -> Option<&UseRule> {
        self.rules.iter().find(|r| {
            let kind_matches = match kind {
                SymbolKind::Function => r.kind == SymbolKind::Function,
                SymbolKind::Constant => r.kind == SymbolKind::Constant,
                _ => !matches!(r.kind, SymbolKind::Function | SymbolKind::Constant),
            };
            let name_matches = if kind == SymbolKind::Constant {
                r.alias == alias
            } else {
                r.alias.eq_ignore_ascii_case(alias)
            };
            kind_matches && name_matches
        })
    }

    /// Resolve the name held by a `name` / `qualified_name` /
    /// `relative_scope` node to an FQN, dispatching on its written form.
    pub fn qualified_name_text(&self, node: Node, source: &str, kind: SymbolKind) -> String {
        let text = node_text(node, source);
        self.resolve_name_text(text, kind)
    }

    pub fn resolve_name_text(&self, text: &str, kind: SymbolKind) -> String {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }
        if let Some(fqn) = text.strip_prefix('\\') {
            return fqn.to_string();
        }
        if text.to_ascii_lowercase().starts_with("namespace\\") {
            return self.resolve_relative(&text["namespace\\".len()..]);
        }
        self.resolve_not_fully_qualified(text, kind)
    }

    /// Whether an unqualified name would fall back to the global namespace:
    /// true when a namespace is set and no rule claimed the name. The global
    /// short name then becomes the reference's `alt_name`.
    pub fn global_fallback(&self, name: &str, kind: SymbolKind) -> Option<String> {
        if self.namespace.is_none() || name.contains('\\') || name.starts_with('\\') {
            return None;
        }
        let rule_kind = match kind {
            SymbolKind::Function => SymbolKind::Function,
            SymbolKind::Constant => SymbolKind::Constant,
            _ => return None,
        };
        if self.find_rule(name, rule_kind).is_some() {
            return None;
        }
        Some(name.to_string())
    }
}

pub fn node_text<'a>(node: Node<'a>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}
