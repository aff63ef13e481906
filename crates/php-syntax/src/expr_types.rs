use tree_sitter::Node;

use crate::aggregate::{MemberMergeStrategy, TypeAggregate};
use crate::name_resolver::{node_text, NameResolver};
use crate::reader;
use crate::store::SymbolStore;
use crate::symbol::{Modifiers, Symbol, SymbolKind, SymbolTable};
use crate::type_string::TypeString;
use crate::var_types::VariableTable;

/// Everything expression typing needs to read: the document, the corpus, the
/// replayed resolver state, and the live variable table.
pub struct ExprContext<'a> {
    pub source: &'a str,
    pub store: &'a SymbolStore,
    pub table: &'a SymbolTable,
    pub resolver: &'a NameResolver,
    pub vars: &'a VariableTable,
}

/// Visibilities a member lookup may see for the given receiver: everything on
/// `$this`, no privates on the base, public only elsewhere.
pub fn visibility_mask(receiver: &str, this_name: &str, this_base: &str) -> Modifiers {
    if !this_name.is_empty() && receiver.eq_ignore_ascii_case(this_name) {
        Modifiers::PUBLIC | Modifiers::PROTECTED | Modifiers::PRIVATE
    } else if !this_base.is_empty() && receiver.eq_ignore_ascii_case(this_base) {
        Modifiers::PUBLIC | Modifiers::PROTECTED
    } else {
        Modifiers::PUBLIC
    }
}

/// Bottom-up type of an expression node. Unknown shapes and unresolvable
/// names yield the empty type.
pub fn resolve_expr_type(ctx: &ExprContext, node: Node) -> TypeString {
    match node.kind() {
        "variable_name" => ctx
            .vars
            .get_type(node_text(node, ctx.source), ctx.resolver.current_class()),
        "parenthesized_expression" => match node.named_child(0) {
            Some(inner) => resolve_expr_type(ctx, inner),
            None => TypeString::empty(),
        },
        "subscript_expression" => match node.named_child(0) {
            Some(subject) => resolve_expr_type(ctx, subject).array_dereference(),
            None => TypeString::empty(),
        },
        "member_access_expression" | "nullsafe_member_access_expression" => {
            let Some(name) = member_name(node, ctx.source) else {
                return TypeString::empty();
            };
            let receiver = receiver_type(ctx, node);
            member_types(ctx, &receiver, |s| {
                s.kind == SymbolKind::Property
                    && !s.modifiers.contains(Modifiers::STATIC)
                    && s.name == format!("${name}")
            })
        }
        "member_call_expression" | "nullsafe_member_call_expression" => {
            let Some(name) = member_name(node, ctx.source) else {
                return TypeString::empty();
            };
            let receiver = receiver_type(ctx, node);
            member_types(ctx, &receiver, |s| {
                s.kind == SymbolKind::Method
                    && !s.modifiers.contains(Modifiers::STATIC)
                    && s.name.eq_ignore_ascii_case(&name)
            })
        }
        "scoped_call_expression" => {
            let Some(name) = member_name(node, ctx.source) else {
                return TypeString::empty();
            };
            let receiver = scope_receiver_type(ctx, node);
            member_types(ctx, &receiver, |s| {
                s.kind == SymbolKind::Method
                    && s.modifiers.contains(Modifiers::STATIC)
                    && s.name.eq_ignore_ascii_case(&name)
            })
        }
        "scoped_property_access_expression" => {
            let Some(name) = member_name(node, ctx.source) else {
                return TypeString::empty();
            };
            let receiver = scope_receiver_type(ctx, node);
            member_types(ctx, &receiver, |s| {
                s.kind == SymbolKind::Property
                    && s.modifiers.contains(Modifiers::STATIC)
                    && s.name == name
            })
        }
        "class_constant_access_expression" => {
            let Some(name) = constant_member_name(node, ctx.source) else {
                return TypeString::empty();
            };
            if name == "class" {
                return TypeString::new("string");
            }
            let receiver = scope_receiver_type(ctx, node);
            member_types(ctx, &receiver, |s| {
                s.kind == SymbolKind::ClassConstant && s.name == name
            })
        }
        "function_call_expression" => function_call_type(ctx, node),
        "object_creation_expression" => object_creation_type(ctx, node),
        "conditional_expression" => {
            let condition = node.child_by_field_name("condition");
            let body = node.child_by_field_name("body").or(condition);
            let alternative = node.child_by_field_name("alternative");
            let left = body
                .map(|n| resolve_expr_type(ctx, n))
                .unwrap_or_default();
            let right = alternative
                .map(|n| resolve_expr_type(ctx, n))
                .unwrap_or_default();
            left.merge(&right)
        }
        "assignment_expression" | "reference_assignment_expression" => node
            .child_by_field_name("right")
            .map(|n| resolve_expr_type(ctx, n))
            .unwrap_or_default(),
        "clone_expression" => match node.named_child(0) {
            Some(inner) => resolve_expr_type(ctx, inner),
            None => TypeString::empty(),
        },
        "name" | "qualified_name" => TypeString::new(
            &ctx.resolver
                .qualified_name_text(node, ctx.source, SymbolKind::Class),
        ),
        "relative_scope" => TypeString::new(&ctx.resolver.resolve_not_fully_qualified(
            node_text(node, ctx.source),
            SymbolKind::Class,
        )),
        _ => match reader::literal_type(node) {
            Some(keyword) => TypeString::new(keyword),
            None => TypeString::empty(),
        },
    }
}

/// Member lookup over the receiver's atomic class set, merging the matching
/// members' declared types.
fn member_types<F>(ctx: &ExprContext, receiver: &TypeString, filter: F) -> TypeString
where
    F: Fn(&Symbol) -> bool,
{
    let mut out = TypeString::empty();
    for atomic in receiver.atomic_class_array() {
        let Some(aggregate) = TypeAggregate::new(ctx.store, atomic) else {
            continue;
        };
        let mask = visibility_mask(
            atomic,
            ctx.resolver.current_class(),
            ctx.resolver.current_base(),
        );
        let members = aggregate.members(MemberMergeStrategy::Override, |s| {
            filter(s) && s.visibility().intersects(mask)
        });
        for member_ref in members {
            if let Some(member) = ctx.store.get(member_ref) {
                if let Some(type_info) = &member.type_info {
                    out = out.merge(type_info);
                }
            }
        }
    }
    out
}

fn receiver_type(ctx: &ExprContext, node: Node) -> TypeString {
    node.child_by_field_name("object")
        .map(|obj| resolve_expr_type(ctx, obj))
        .unwrap_or_default()
}

/// Receiver classes for `X::...` forms: a class name, `self`/`static`/
/// `parent`, or a variable holding an instance.
fn scope_receiver_type(ctx: &ExprContext, node: Node) -> TypeString {
    let scope = node
        .child_by_field_name("scope")
        .or_else(|| node.named_child(0));
    let Some(scope) = scope else {
        return TypeString::empty();
    };
    match scope.kind() {
        "relative_scope" => TypeString::new(&ctx.resolver.resolve_not_fully_qualified(
            node_text(scope, ctx.source),
            SymbolKind::Class,
        )),
        "name" | "qualified_name" => TypeString::new(&ctx.resolver.qualified_name_text(
            scope,
            ctx.source,
            SymbolKind::Class,
        )),
        "variable_name" => ctx
            .vars
            .get_type(node_text(scope, ctx.source), ctx.resolver.current_class()),
        _ => TypeString::empty(),
    }
}

fn member_name(node: Node, source: &str) -> Option<String> {
    let name = node.child_by_field_name("name")?;
    match name.kind() {
        "name" => Some(node_text(name, source).to_string()),
        // `A::$prop` carries the sigil in the node text.
        "variable_name" => Some(node_text(name, source).to_string()),
        _ => None,
    }
}

/// The `NAME` of `Scope::NAME`, which the grammar does not field-label.
fn constant_member_name(node: Node, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(name, source).to_string());
    }
    let count = node.named_child_count();
    if count < 2 {
        return None;
    }
    let last = node.named_child(count - 1)?;
    (last.kind() == "name").then(|| node_text(last, source).to_string())
}

fn function_call_type(ctx: &ExprContext, node: Node) -> TypeString {
    let Some(callee) = node.child_by_field_name("function") else {
        return TypeString::empty();
    };
    if !matches!(callee.kind(), "name" | "qualified_name") {
        return TypeString::empty();
    }
    let text = node_text(callee, ctx.source);
    let fqn = ctx
        .resolver
        .resolve_name_text(text, SymbolKind::Function);
    let mut found = ctx
        .store
        .find(&fqn, |s| s.kind == SymbolKind::Function);
    if found.is_empty() {
        if let Some(alt) = ctx.resolver.global_fallback(text, SymbolKind::Function) {
            found = ctx.store.find(&alt, |s| s.kind == SymbolKind::Function);
        }
    }
    found
        .first()
        .and_then(|&r| ctx.store.get(r))
        .and_then(|s| s.type_info.clone())
        .unwrap_or_default()
}

fn object_creation_type(ctx: &ExprContext, node: Node) -> TypeString {
    if reader::anonymous_class_body(node).is_some() {
        // Anonymous classes answer with their synthetic name.
        return ctx
            .table
            .symbol_starting_at(node.start_byte(), &[SymbolKind::Class])
            .map(|id| TypeString::new(&ctx.table.get(id).name))
            .unwrap_or_default();
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "name" | "qualified_name" => {
                return TypeString::new(&ctx.resolver.qualified_name_text(
                    child,
                    ctx.source,
                    SymbolKind::Class,
                ));
            }
            "relative_scope" => {
                return TypeString::new(&ctx.resolver.resolve_not_fully_qualified(
                    node_text(child, ctx.source),
                    SymbolKind::Class,
                ));
            }
            "variable_name" => {
                return ctx
                    .vars
                    .get_type(node_text(child, ctx.source), ctx.resolver.current_class());
            }
            _ => {}
        }
    }
    TypeString::empty()
}
