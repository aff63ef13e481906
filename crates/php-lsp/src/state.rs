use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use dashmap::DashMap;
use lsp_types::Url;

use php_syntax::document::DocumentState;
use php_syntax::store::SymbolStore;

/// Global server state: open documents, the corpus-wide symbol store, and
/// the workspace roots. All store mutation funnels through the write lock,
/// which is the single serial commit point.
pub struct WorldState {
    pub documents: DashMap<Url, DocumentState>,
    pub store: RwLock<SymbolStore>,
    pub workspace_roots: Mutex<Vec<PathBuf>>,
}

impl WorldState {
    pub fn new() -> Self {
        WorldState {
            documents: DashMap::new(),
            store: RwLock::new(SymbolStore::with_builtins()),
            workspace_roots: Mutex::new(Vec::new()),
        }
    }

    /// Insert a document and run the full index pipeline on it.
    pub fn open_document(&self, uri: Url, text: &str) {
        if let Some(doc) = DocumentState::new(text) {
            self.documents.insert(uri.clone(), doc);
            self.commit_document(&uri);
        }
    }

    /// Reparse the document from its current rope contents and replace its
    /// table, references and index entries in the store.
    pub fn commit_document(&self, uri: &Url) {
        let Some(mut doc) = self.documents.get_mut(uri) else {
            return;
        };
        doc.reparse();
        let source = doc.source();
        let tree = doc.tree.clone();
        drop(doc);

        let mut store = self.store.write().unwrap();
        store.commit(uri, &source, &tree);
    }

    pub fn remove_document(&self, uri: &Url) {
        self.documents.remove(uri);
        self.store.write().unwrap().remove(uri);
    }

    /// Scan every workspace root for `.php` files and index the ones not yet
    /// loaded. Returns how many files were loaded.
    pub fn load_workspace_files(&self) -> usize {
        let roots = self.workspace_roots.lock().unwrap().clone();
        let mut count = 0;
        for root in roots {
            let mut files = Vec::new();
            collect_php_files(&root, &mut files);
            for path in files {
                let Ok(uri) = Url::from_file_path(&path) else {
                    continue;
                };
                if self.documents.contains_key(&uri) {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(&path) else {
                    continue;
                };
                self.open_document(uri, &text);
                count += 1;
            }
        }
        count
    }

    /// Reload a file the watcher reported as created or changed.
    pub fn reload_file_from_disk(&self, uri: &Url) {
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        let Ok(text) = std::fs::read_to_string(&path) else {
            return;
        };
        match self.documents.get_mut(uri) {
            Some(mut doc) => {
                doc.replace(&text);
                drop(doc);
                self.commit_document(uri);
            }
            None => self.open_document(uri.clone(), &text),
        }
    }
}

impl Default for WorldState {
    fn default() -> Self {
        WorldState::new()
    }
}

fn collect_php_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if name.starts_with('.') || name == "node_modules" {
                continue;
            }
            collect_php_files(&path, out);
        } else if path.extension().is_some_and(|e| e == "php") {
            out.push(path);
        }
    }
}
