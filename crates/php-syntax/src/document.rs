use ropey::Rope;
use tree_sitter::Tree;

/// A document's text and parse state: source as a rope, the current tree,
/// and the parse generation that produced it. Symbols and references live in
/// the [`crate::store::SymbolStore`], keyed by URI.
pub struct DocumentState {
    pub rope: Rope,
    pub tree: Tree,
    /// Monotonic edit counter; the debounce layer uses it for latest-wins
    /// commit checks.
    pub generation: u64,
}

impl DocumentState {
    pub fn new(source: &str) -> Option<Self> {
        let tree = php_parser::parse(source)?;
        Some(DocumentState {
            rope: Rope::from_str(source),
            tree,
            generation: 0,
        })
    }

    /// Replace a range of the rope without reparsing. Returns the new
    /// generation; the caller schedules the debounced reparse.
    pub fn splice(&mut self, start_byte: usize, end_byte: usize, text: &str) -> u64 {
        let start = self.rope.byte_to_char(start_byte.min(self.rope.len_bytes()));
        let end = self.rope.byte_to_char(end_byte.min(self.rope.len_bytes()));
        self.rope.remove(start..end);
        self.rope.insert(start, text);
        self.generation += 1;
        self.generation
    }

    /// Replace the whole document without reparsing.
    pub fn replace(&mut self, source: &str) -> u64 {
        self.rope = Rope::from_str(source);
        self.generation += 1;
        self.generation
    }

    /// Reparse from the current rope contents. The debounce layer batches
    /// edits, so this is a clean parse; reusing the old tree would require
    /// replaying every splice as an InputEdit.
    pub fn reparse(&mut self) {
        let source = self.rope.to_string();
        if let Some(tree) = php_parser::parse(&source) {
            self.tree = tree;
        }
    }

    pub fn source(&self) -> String {
        self.rope.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_creation() {
        let doc = DocumentState::new("<?php function a() {}\n").unwrap();
        assert_eq!(doc.generation, 0);
        assert!(!doc.tree.root_node().has_error());
    }

    #[test]
    fn test_splice_and_reparse() {
        let source = "<?php function a() {}\n";
        let mut doc = DocumentState::new(source).unwrap();

        let insert_at = source.find('}').unwrap() + 1;
        let generation = doc.splice(insert_at, insert_at, " function b() {}");
        assert_eq!(generation, 1);

        doc.reparse();
        assert!(!doc.tree.root_node().has_error());
        assert!(doc.source().contains("function b()"));
    }

    #[test]
    fn test_replace_bumps_generation() {
        let mut doc = DocumentState::new("<?php\n").unwrap();
        assert_eq!(doc.replace("<?php function c() {}\n"), 1);
        assert_eq!(doc.replace("<?php\n"), 2);
    }
}
