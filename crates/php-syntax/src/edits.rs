use tree_sitter::{Node, Tree};

use crate::name_resolver::node_text;
use crate::symbol::{not_fqn, Span};

/// Text edits that import a fully-qualified name: an optional `use`
/// insertion plus the replacement of the qualified range with the short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdit {
    /// Byte offset and text of the `use` statement to insert, when one is
    /// needed.
    pub use_insert: Option<(usize, String)>,
    pub replace_span: Span,
    pub replace_text: String,
    pub fqn: String,
}

/// Build the import edits for the qualified name at `byte_offset`. Returns
/// None when the cursor is not on a qualified name, or when the short name is
/// already taken by something else in the document.
pub fn import_symbol(tree: &Tree, source: &str, byte_offset: usize) -> Option<ImportEdit> {
    let root = tree.root_node();
    let mut node = root.named_descendant_for_byte_range(byte_offset, byte_offset)?;
    while node.kind() != "qualified_name" {
        node = node.parent()?;
    }

    let fqn = node_text(node, source).trim_start_matches('\\').to_string();
    if !fqn.contains('\\') {
        return None;
    }
    let short = not_fqn(&fqn).to_string();

    // An existing import of the same target just needs the alias applied.
    if let Some(alias) = existing_alias(root, source, &fqn) {
        return Some(ImportEdit {
            use_insert: None,
            replace_span: Span::from_node(node),
            replace_text: alias,
            fqn,
        });
    }

    // A different declaration or import already claiming the short name
    // makes the plain import ambiguous.
    if short_name_taken(root, source, &short) {
        return None;
    }

    let (offset, text) = insertion_point(root, source, &fqn)?;
    Some(ImportEdit {
        use_insert: Some((offset, text)),
        replace_span: Span::from_node(node),
        replace_text: short,
        fqn,
    })
}

/// The alias of an existing `use` clause importing `fqn`, if any.
fn existing_alias(root: Node, source: &str, fqn: &str) -> Option<String> {
    let mut out = None;
    walk(root, &mut |node| {
        if !matches!(
            node.kind(),
            "namespace_use_clause" | "namespace_use_group_clause"
        ) {
            return;
        }
        let Some(target) =
            crate::reader::named_child_of_kinds(node, &["qualified_name", "name", "namespace_name"])
        else {
            return;
        };
        if node_text(target, source).trim_start_matches('\\') != fqn {
            return;
        }
        let alias = node
            .children(&mut node.walk())
            .find(|c| c.kind() == "namespace_aliasing_clause")
            .and_then(|c| crate::reader::named_child_of_kinds(c, &["name"]))
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_else(|| not_fqn(node_text(target, source)).to_string());
        out = Some(alias);
    });
    out
}

/// Whether the short name is already bound by an import or a top-level
/// declaration with a different target.
fn short_name_taken(root: Node, source: &str, short: &str) -> bool {
    let mut taken = false;
    walk(root, &mut |node| {
        match node.kind() {
            "namespace_use_clause" | "namespace_use_group_clause" => {
                let alias = node
                    .children(&mut node.walk())
                    .find(|c| c.kind() == "namespace_aliasing_clause")
                    .and_then(|c| crate::reader::named_child_of_kinds(c, &["name"]))
                    .or_else(|| {
                        crate::reader::named_child_of_kinds(
                            node,
                            &["qualified_name", "name", "namespace_name"],
                        )
                    })
                    .map(|n| not_fqn(node_text(n, source)).to_string());
                if alias.is_some_and(|a| a.eq_ignore_ascii_case(short)) {
                    taken = true;
                }
            }
            "class_declaration" | "interface_declaration" | "trait_declaration"
            | "enum_declaration" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source));
                if name.is_some_and(|n| n.eq_ignore_ascii_case(short)) {
                    taken = true;
                }
            }
            _ => {}
        }
    });
    taken
}

/// Where to put the `use` statement: after the last existing import, after
/// the namespace declaration, or after the opening tag.
fn insertion_point(root: Node, source: &str, fqn: &str) -> Option<(usize, String)> {
    let mut last_use: Option<usize> = None;
    let mut namespace_end: Option<usize> = None;
    let mut tag_end: Option<usize> = None;
    walk(root, &mut |node| match node.kind() {
        "namespace_use_declaration" => last_use = Some(node.end_byte()),
        "namespace_definition" => {
            if namespace_end.is_none() {
                namespace_end = Some(node.end_byte());
            }
        }
        "php_tag" => {
            if tag_end.is_none() {
                tag_end = Some(node.end_byte());
            }
        }
        _ => {}
    });

    if let Some(offset) = last_use {
        return Some((past_semicolon(source, offset), format!("\nuse {fqn};")));
    }
    if let Some(offset) = namespace_end {
        return Some((past_semicolon(source, offset), format!("\n\nuse {fqn};")));
    }
    tag_end.map(|offset| (offset, format!("\n\nuse {fqn};")))
}

/// Statement nodes may or may not swallow their terminator; normalize to the
/// position right after it.
fn past_semicolon(source: &str, offset: usize) -> usize {
    let bytes = source.as_bytes();
    let mut at = offset;
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    if at < bytes.len() && bytes[at] == b';' {
        at + 1
    } else {
        offset
    }
}

fn walk<F: FnMut(Node)>(node: Node, f: &mut F) {
    f(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_after_namespace() {
        let source = "<?php namespace Baz;\n$v = new \\Foo\\Bar;\n";
        let tree = php_parser::parse(source).unwrap();
        let offset = source.find("Bar").unwrap();

        let edit = import_symbol(&tree, source, offset).expect("edit");
        assert_eq!(edit.fqn, "Foo\\Bar");
        assert_eq!(edit.replace_text, "Bar");

        let (insert_at, text) = edit.use_insert.expect("use insertion");
        assert_eq!(insert_at, source.find(";").unwrap() + 1);
        assert_eq!(text, "\n\nuse Foo\\Bar;");

        let replaced = &source[edit.replace_span.start_byte..edit.replace_span.end_byte];
        assert_eq!(replaced, "\\Foo\\Bar");
    }

    #[test]
    fn test_import_appends_to_existing_uses() {
        let source = "<?php\nnamespace App;\n\nuse Support\\Arr;\n\n$x = new \\Support\\Str;\n";
        let tree = php_parser::parse(source).unwrap();
        let offset = source.find("Str;").unwrap();

        let edit = import_symbol(&tree, source, offset).expect("edit");
        let (insert_at, text) = edit.use_insert.expect("use insertion");
        assert_eq!(insert_at, source.find("Arr;").unwrap() + "Arr;".len());
        assert_eq!(text, "\nuse Support\\Str;");
    }

    #[test]
    fn test_existing_import_reuses_alias() {
        let source =
            "<?php\nnamespace App;\n\nuse Foo\\Bar as Baz;\n\n$v = new \\Foo\\Bar;\n";
        let tree = php_parser::parse(source).unwrap();
        let offset = source.rfind("Bar").unwrap();

        let edit = import_symbol(&tree, source, offset).expect("edit");
        assert!(edit.use_insert.is_none());
        assert_eq!(edit.replace_text, "Baz");
    }

    #[test]
    fn test_conflicting_short_name_blocks_import() {
        let source = "<?php\nnamespace App;\n\nclass Bar {}\n$v = new \\Foo\\Bar;\n";
        let tree = php_parser::parse(source).unwrap();
        let offset = source.rfind("\\Bar").unwrap() + 1;

        assert!(import_symbol(&tree, source, offset).is_none());
    }

    #[test]
    fn test_unqualified_name_yields_no_edit() {
        let source = "<?php\n$v = new Bar;\n";
        let tree = php_parser::parse(source).unwrap();
        let offset = source.find("Bar").unwrap();
        assert!(import_symbol(&tree, source, offset).is_none());
    }
}
