use std::fmt;

use crate::name_resolver::NameResolver;
use crate::symbol::SymbolKind;

/// Type keywords that name built-in types rather than classes. These pass
/// through name resolution untouched and never act as member-lookup receivers.
const KEYWORDS: &[&str] = &[
    "string", "int", "integer", "float", "double", "bool", "boolean", "array", "object", "mixed",
    "void", "null", "callable", "iterable", "resource", "never", "false", "true",
];

/// A union of atomic type names separated by `|`. Atomic forms are an FQN, a
/// built-in keyword, or a dereferencable `X[]` / `(A|B)[]`. Pure value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeString {
    parts: Vec<String>,
}

impl TypeString {
    pub fn new(text: &str) -> Self {
        let mut ts = TypeString::default();
        for part in split_union(text) {
            ts.push(part);
        }
        ts
    }

    pub fn empty() -> Self {
        TypeString::default()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn atomics(&self) -> &[String] {
        &self.parts
    }

    fn push(&mut self, part: String) {
        if !part.is_empty() && !self.parts.contains(&part) {
            self.parts.push(part);
        }
    }

    pub fn is_keyword(atomic: &str) -> bool {
        KEYWORDS.iter().any(|k| atomic.eq_ignore_ascii_case(k))
    }

    /// The non-keyword, non-array atomics: the receiver set for member lookup.
    pub fn atomic_class_array(&self) -> Vec<&str> {
        self.parts
            .iter()
            .map(String::as_str)
            .filter(|p| !p.ends_with("[]") && !Self::is_keyword(p))
            .collect()
    }

    /// Peel one `[]` off each dereferencable atomic.
    pub fn array_dereference(&self) -> TypeString {
        let mut out = TypeString::default();
        for part in &self.parts {
            if let Some(inner) = part.strip_suffix("[]") {
                let inner = inner
                    .strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                    .unwrap_or(inner);
                for sub in split_union(inner) {
                    out.push(sub);
                }
            }
        }
        out
    }

    /// Deduplicated union of the two types.
    pub fn merge(&self, other: &TypeString) -> TypeString {
        let mut out = self.clone();
        for part in &other.parts {
            out.push(part.clone());
        }
        out
    }

    /// Resolve each non-keyword atomic through the resolver. Keywords are
    /// untouched; fully-qualified atomics lose their leading `\`.
    pub fn name_resolve(&self, resolver: &NameResolver) -> TypeString {
        let mut out = TypeString::default();
        for part in &self.parts {
            if let Some(inner) = part.strip_suffix("[]") {
                let inner = inner
                    .strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                    .unwrap_or(inner);
                let resolved: Vec<String> = split_union(inner)
                    .into_iter()
                    .map(|a| resolve_atomic(&a, resolver))
                    .filter(|a| !a.is_empty())
                    .collect();
                match resolved.len() {
                    0 => {}
                    1 => out.push(format!("{}[]", resolved[0])),
                    _ => out.push(format!("({})[]", resolved.join("|"))),
                }
            } else {
                out.push(resolve_atomic(part, resolver));
            }
        }
        out
    }
}

fn resolve_atomic(atomic: &str, resolver: &NameResolver) -> String {
    if TypeString::is_keyword(atomic) {
        atomic.to_string()
    } else if let Some(fqn) = atomic.strip_prefix('\\') {
        fqn.to_string()
    } else {
        resolver.resolve_not_fully_qualified(atomic, SymbolKind::Class)
    }
}

/// Split on `|` at the top level, honoring `(A|B)[]` groups and normalizing
/// a leading `?` into `|null`.
fn split_union(text: &str) -> Vec<String> {
    let text = text.trim();
    let (text, nullable) = match text.strip_prefix('?') {
        Some(rest) => (rest, true),
        None => (text, false),
    };

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            '|' if depth == 0 => {
                let part = current.trim().to_string();
                if !part.is_empty() {
                    parts.push(part);
                }
                current = String::new();
            }
            c if c.is_whitespace() => {}
            _ => current.push(ch),
        }
    }
    let part = current.trim().to_string();
    if !part.is_empty() {
        parts.push(part);
    }
    if nullable {
        parts.push("null".to_string());
    }
    parts
}

impl fmt::Display for TypeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("|"))
    }
}

impl From<&str> for TypeString {
    fn from(text: &str) -> Self {
        TypeString::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_parse_and_display() {
        let ts = TypeString::new("string|int|string");
        assert_eq!(ts.to_string(), "string|int");

        let ts = TypeString::new("?Foo");
        assert_eq!(ts.to_string(), "Foo|null");
    }

    #[test]
    fn test_merge_is_commutative_and_dedupes() {
        let a = TypeString::new("A|B");
        let b = TypeString::new("B|C");
        let ab = a.merge(&b);
        let ba = b.merge(&a);
        let mut ab_parts: Vec<_> = ab.atomics().to_vec();
        let mut ba_parts: Vec<_> = ba.atomics().to_vec();
        ab_parts.sort();
        ba_parts.sort();
        assert_eq!(ab_parts, ba_parts);
        assert_eq!(ab.atomics().len(), 3);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let a = TypeString::new("Foo|int");
        assert_eq!(a.merge(&TypeString::empty()), a);
        assert_eq!(TypeString::empty().merge(&a), a);
    }

    #[test]
    fn test_array_dereference() {
        assert_eq!(TypeString::new("Foo[]").array_dereference().to_string(), "Foo");
        assert_eq!(
            TypeString::new("(A|B)[]").array_dereference().to_string(),
            "A|B"
        );
        // Non-dereferencable atomics drop out.
        assert_eq!(
            TypeString::new("Foo[]|int").array_dereference().to_string(),
            "Foo"
        );
        assert!(TypeString::new("int").array_dereference().is_empty());
    }

    #[test]
    fn test_atomic_class_array_strips_keywords_and_arrays() {
        let ts = TypeString::new("Foo|string|Bar[]|null");
        assert_eq!(ts.atomic_class_array(), vec!["Foo"]);
    }

    #[test]
    fn test_name_resolve_keeps_keywords() {
        let resolver = NameResolver::default();
        let ts = TypeString::new("string|int");
        assert_eq!(ts.name_resolve(&resolver), ts);
    }

    #[test]
    fn test_name_resolve_qualifies_classes() {
        let mut resolver = NameResolver::default();
        resolver.set_namespace(Some("App".to_string()));
        let ts = TypeString::new("Model|\\Ext\\Other|Model[]");
        let resolved = ts.name_resolve(&resolver);
        assert_eq!(resolved.to_string(), "App\\Model|Ext\\Other|App\\Model[]");
    }
}
