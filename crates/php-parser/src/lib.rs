use tree_sitter::Language;

/// Returns the tree-sitter [`Language`] for PHP.
pub fn language() -> Language {
    tree_sitter_php::LANGUAGE_PHP.into()
}

/// Parse PHP source code, returning the tree-sitter [`Tree`].
pub fn parse(source: &str) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&language())
        .expect("failed to set PHP language");
    parser.parse(source, None)
}

/// Parse PHP source with an old tree for incremental reparsing.
pub fn parse_with(source: &str, old_tree: Option<&tree_sitter::Tree>) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&language())
        .expect("failed to set PHP language");
    parser.parse(source, old_tree)
}
