use std::collections::HashSet;

use crate::store::{SymbolRef, SymbolStore};
use crate::symbol::{Modifiers, Symbol, SymbolKind};

/// Policy for combining a member's declarations across the inheritance chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberMergeStrategy {
    /// Declared members only, no inheritance.
    None,
    /// Declared members, plus the first documented inherited definition for
    /// members without a local doc comment.
    Documented,
    /// The base-most declaration of each member.
    Base,
    /// The most-derived declaration of each member.
    Override,
}

/// Member resolution over a class-like's transitive hierarchy: base class
/// first, then interfaces, then used traits, depth-first, cycle-guarded.
pub struct TypeAggregate<'s> {
    store: &'s SymbolStore,
    lineage: Vec<SymbolRef>,
}

impl<'s> TypeAggregate<'s> {
    /// Returns None when the FQN names no known class-like.
    pub fn new(store: &'s SymbolStore, fqn: &str) -> Option<Self> {
        let mut lineage = Vec::new();
        let mut visited = HashSet::new();
        collect_lineage(store, fqn, &mut lineage, &mut visited);
        if lineage.is_empty() {
            return None;
        }
        Some(TypeAggregate { store, lineage })
    }

    /// The class-like itself followed by its ancestors, derived-first.
    pub fn lineage(&self) -> &[SymbolRef] {
        &self.lineage
    }

    /// Whether `fqn` appears anywhere in the hierarchy (self included).
    pub fn is_associated_with(&self, fqn: &str) -> bool {
        self.lineage.iter().any(|&r| {
            self.store
                .get(r)
                .is_some_and(|s| s.name.eq_ignore_ascii_case(fqn))
        })
    }

    pub fn members<F>(&self, strategy: MemberMergeStrategy, filter: F) -> Vec<SymbolRef>
    where
        F: Fn(&Symbol) -> bool,
    {
        let mut out: Vec<(MemberKey, SymbolRef)> = Vec::new();

        for (depth, &class_ref) in self.lineage.iter().enumerate() {
            if depth > 0 && strategy == MemberMergeStrategy::None {
                break;
            }
            for (member_ref, member) in self.declared_members(class_ref) {
                if depth > 0 && member.modifiers.contains(Modifiers::PRIVATE) {
                    continue;
                }
                if !filter(member) {
                    continue;
                }
                let key = MemberKey::of(member);
                let existing = out.iter().position(|(k, _)| *k == key);
                match (strategy, existing) {
                    (_, None) => out.push((key, member_ref)),
                    (MemberMergeStrategy::Base, Some(i)) => out[i].1 = member_ref,
                    (MemberMergeStrategy::Documented, Some(_)) => {
                        let documented = out.iter().any(|(k, r)| {
                            *k == key
                                && self.store.get(*r).is_some_and(|s| s.description.is_some())
                        });
                        if !documented && member.description.is_some() {
                            out.push((key, member_ref));
                        }
                    }
                    // Override keeps the most-derived declaration.
                    (_, Some(_)) => {}
                }
            }
        }

        out.into_iter().map(|(_, r)| r).collect()
    }

    fn declared_members(&self, class_ref: SymbolRef) -> Vec<(SymbolRef, &'s Symbol)> {
        let Some(table) = self.store.table_by_hash(class_ref.uri_hash) else {
            return Vec::new();
        };
        table
            .children(class_ref.id)
            .iter()
            .map(|&id| {
                (
                    SymbolRef {
                        uri_hash: class_ref.uri_hash,
                        id,
                    },
                    table.get(id),
                )
            })
            .filter(|(_, s)| s.kind.is_member())
            .collect()
    }
}

/// Identity of a member across the hierarchy: methods compare
/// case-insensitively, properties and constants exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberKey {
    kind: SymbolKind,
    name: String,
}

impl MemberKey {
    fn of(symbol: &Symbol) -> Self {
        let name = if symbol.kind == SymbolKind::Method {
            symbol.name.to_lowercase()
        } else {
            symbol.name.clone()
        };
        MemberKey {
            kind: symbol.kind,
            name,
        }
    }
}

fn collect_lineage(
    store: &SymbolStore,
    fqn: &str,
    out: &mut Vec<SymbolRef>,
    visited: &mut HashSet<String>,
) {
    if fqn.is_empty() || !visited.insert(fqn.to_lowercase()) {
        return;
    }
    let Some(&class_ref) = store
        .find(fqn, |s| s.kind.is_class_like())
        .first()
    else {
        return;
    };
    out.push(class_ref);

    let Some(symbol) = store.get(class_ref) else {
        return;
    };
    let associated = symbol.associated.clone();
    for kind in [SymbolKind::Class, SymbolKind::Interface, SymbolKind::Trait] {
        for assoc in associated.iter().filter(|a| a.kind == kind) {
            collect_lineage(store, &assoc.name, out, visited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::Url;

    fn store_with(sources: &[(&str, &str)]) -> SymbolStore {
        let mut store = SymbolStore::new();
        for (uri, source) in sources {
            let url = Url::parse(uri).unwrap();
            let tree = php_parser::parse(source).expect("parse failed");
            store.commit(&url, source, &tree);
        }
        store
    }

    fn member_names(store: &SymbolStore, refs: &[SymbolRef]) -> Vec<String> {
        refs.iter()
            .map(|&r| store.get(r).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_override_prefers_most_derived() {
        let store = store_with(&[(
            "file:///a.php",
            r#"<?php
class Base
{
    public function run() {}
    public function only() {}
}
class Child extends Base
{
    public function run() {}
}
"#,
        )]);
        let aggregate = TypeAggregate::new(&store, "Child").unwrap();
        let refs = aggregate.members(MemberMergeStrategy::Override, |s| {
            s.kind == SymbolKind::Method
        });
        assert_eq!(member_names(&store, &refs), vec!["run", "only"]);

        let run = refs
            .iter()
            .map(|&r| store.get(r).unwrap())
            .find(|s| s.name == "run")
            .unwrap();
        assert_eq!(run.scope.as_deref(), Some("Child"));
    }

    #[test]
    fn test_base_prefers_base_most() {
        let store = store_with(&[(
            "file:///a.php",
            r#"<?php
class Base { public function run() {} }
class Child extends Base { public function run() {} }
"#,
        )]);
        let aggregate = TypeAggregate::new(&store, "Child").unwrap();
        let refs = aggregate.members(MemberMergeStrategy::Base, |s| s.kind == SymbolKind::Method);
        assert_eq!(refs.len(), 1);
        assert_eq!(
            store.get(refs[0]).unwrap().scope.as_deref(),
            Some("Base")
        );
    }

    #[test]
    fn test_none_skips_inheritance() {
        let store = store_with(&[(
            "file:///a.php",
            r#"<?php
class Base { public function inherited() {} }
class Child extends Base { public function own() {} }
"#,
        )]);
        let aggregate = TypeAggregate::new(&store, "Child").unwrap();
        let refs = aggregate.members(MemberMergeStrategy::None, |_| true);
        assert_eq!(member_names(&store, &refs), vec!["own"]);
    }

    #[test]
    fn test_private_ancestors_are_invisible() {
        let store = store_with(&[(
            "file:///a.php",
            r#"<?php
class Base
{
    private function secret() {}
    protected function guarded() {}
}
class Child extends Base {}
"#,
        )]);
        let aggregate = TypeAggregate::new(&store, "Child").unwrap();
        let names = member_names(
            &store,
            &aggregate.members(MemberMergeStrategy::Override, |_| true),
        );
        assert!(!names.contains(&"secret".to_string()));
        assert!(names.contains(&"guarded".to_string()));
    }

    #[test]
    fn test_interface_and_trait_members_are_reachable() {
        let store = store_with(&[(
            "file:///a.php",
            r#"<?php
interface Walks { public function walk(); }
trait Sings { public function sing() {} }
class Performer implements Walks
{
    use Sings;
}
"#,
        )]);
        let aggregate = TypeAggregate::new(&store, "Performer").unwrap();
        let names = member_names(
            &store,
            &aggregate.members(MemberMergeStrategy::Override, |s| {
                s.kind == SymbolKind::Method
            }),
        );
        assert!(names.contains(&"walk".to_string()));
        assert!(names.contains(&"sing".to_string()));
    }

    #[test]
    fn test_inheritance_cycle_terminates() {
        let store = store_with(&[(
            "file:///a.php",
            r#"<?php
class A extends B { public function a() {} }
class B extends A { public function b() {} }
"#,
        )]);
        let aggregate = TypeAggregate::new(&store, "A").unwrap();
        let names = member_names(
            &store,
            &aggregate.members(MemberMergeStrategy::Override, |_| true),
        );
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_is_associated_with() {
        let store = store_with(&[(
            "file:///a.php",
            r#"<?php
interface Contract {}
class Impl implements Contract {}
"#,
        )]);
        let aggregate = TypeAggregate::new(&store, "Impl").unwrap();
        assert!(aggregate.is_associated_with("Contract"));
        assert!(aggregate.is_associated_with("Impl"));
        assert!(!aggregate.is_associated_with("Other"));
    }

    #[test]
    fn test_unknown_class_yields_none() {
        let store = SymbolStore::new();
        assert!(TypeAggregate::new(&store, "Missing").is_none());
    }
}
