use lsp_types::Url;

use crate::symbol::{Associated, Modifiers, Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::type_string::TypeString;

/// Sentinel URI the built-in table is installed under. Init-only: the table
/// is added once at startup and never replaced.
pub const BUILTIN_URI: &str = "php-builtin:core";

/// A read-only symbol table describing the slice of the PHP runtime the
/// analyzer needs for everyday member and call resolution.
pub fn builtin_table() -> SymbolTable {
    let uri = Url::parse(BUILTIN_URI).expect("sentinel uri parses");
    let mut builder = Builder::new(&uri);

    builder.interface("Stringable", &[], |b, id| {
        b.method(id, "__toString", "string", &[]);
    });
    builder.interface("Traversable", &[], |_, _| {});
    builder.interface("Iterator", &["Traversable"], |b, id| {
        b.method(id, "current", "mixed", &[]);
        b.method(id, "key", "mixed", &[]);
        b.method(id, "next", "void", &[]);
        b.method(id, "rewind", "void", &[]);
        b.method(id, "valid", "bool", &[]);
    });
    builder.interface("IteratorAggregate", &["Traversable"], |b, id| {
        b.method(id, "getIterator", "Traversable", &[]);
    });
    builder.interface("ArrayAccess", &[], |b, id| {
        b.method(id, "offsetExists", "bool", &[("$offset", "mixed")]);
        b.method(id, "offsetGet", "mixed", &[("$offset", "mixed")]);
        b.method(id, "offsetSet", "void", &[("$offset", "mixed"), ("$value", "mixed")]);
        b.method(id, "offsetUnset", "void", &[("$offset", "mixed")]);
    });
    builder.interface("Countable", &[], |b, id| {
        b.method(id, "count", "int", &[]);
    });
    builder.interface("Throwable", &["Stringable"], |b, id| {
        b.method(id, "getMessage", "string", &[]);
        b.method(id, "getCode", "int", &[]);
        b.method(id, "getFile", "string", &[]);
        b.method(id, "getLine", "int", &[]);
        b.method(id, "getTrace", "array", &[]);
        b.method(id, "getTraceAsString", "string", &[]);
        b.method(id, "getPrevious", "Throwable|null", &[]);
    });

    builder.class("stdClass", None, &[], |_, _| {});
    builder.class("Exception", None, &["Throwable"], |b, id| {
        b.method(
            id,
            "__construct",
            "void",
            &[("$message", "string"), ("$code", "int"), ("$previous", "Throwable|null")],
        );
        b.method(id, "getMessage", "string", &[]);
        b.method(id, "getCode", "int", &[]);
        b.method(id, "getFile", "string", &[]);
        b.method(id, "getLine", "int", &[]);
        b.method(id, "getTrace", "array", &[]);
        b.method(id, "getTraceAsString", "string", &[]);
        b.method(id, "getPrevious", "Throwable|null", &[]);
    });
    builder.class("Error", None, &["Throwable"], |b, id| {
        b.method(id, "getMessage", "string", &[]);
        b.method(id, "getCode", "int", &[]);
        b.method(id, "getPrevious", "Throwable|null", &[]);
    });
    builder.class_extending("TypeError", "Error", |_, _| {});
    builder.class_extending("ValueError", "Error", |_, _| {});
    builder.class_extending("RuntimeException", "Exception", |_, _| {});
    builder.class_extending("LogicException", "Exception", |_, _| {});
    builder.class_extending("InvalidArgumentException", "LogicException", |_, _| {});
    builder.class("Closure", None, &[], |b, id| {
        b.method(id, "bind", "Closure|null", &[("$closure", "Closure"), ("$newThis", "object|null")]);
        b.method(id, "call", "mixed", &[("$newThis", "object")]);
    });
    builder.class("Generator", None, &["Iterator"], |b, id| {
        b.method(id, "current", "mixed", &[]);
        b.method(id, "send", "mixed", &[("$value", "mixed")]);
        b.method(id, "getReturn", "mixed", &[]);
    });
    builder.class("ArrayObject", None, &["IteratorAggregate", "ArrayAccess", "Countable"], |b, id| {
        b.method(id, "count", "int", &[]);
        b.method(id, "getArrayCopy", "array", &[]);
    });

    builder.function("strlen", "int", &[("$string", "string")]);
    builder.function("count", "int", &[("$value", "Countable|array")]);
    builder.function("implode", "string", &[("$separator", "string"), ("$array", "array")]);
    builder.function("explode", "string[]", &[("$separator", "string"), ("$string", "string")]);
    builder.function("substr", "string", &[("$string", "string"), ("$offset", "int")]);
    builder.function("sprintf", "string", &[("$format", "string")]);
    builder.function("str_replace", "string|array", &[
        ("$search", "string|array"),
        ("$replace", "string|array"),
        ("$subject", "string|array"),
    ]);
    builder.function("strtolower", "string", &[("$string", "string")]);
    builder.function("strtoupper", "string", &[("$string", "string")]);
    builder.function("trim", "string", &[("$string", "string")]);
    builder.function("array_map", "array", &[("$callback", "callable|null"), ("$array", "array")]);
    builder.function("array_filter", "array", &[("$array", "array")]);
    builder.function("array_keys", "array", &[("$array", "array")]);
    builder.function("array_values", "array", &[("$array", "array")]);
    builder.function("array_merge", "array", &[("$arrays", "array")]);
    builder.function("in_array", "bool", &[("$needle", "mixed"), ("$haystack", "array")]);
    builder.function("array_key_exists", "bool", &[("$key", "string|int"), ("$array", "array")]);
    builder.function("is_string", "bool", &[("$value", "mixed")]);
    builder.function("is_array", "bool", &[("$value", "mixed")]);
    builder.function("is_int", "bool", &[("$value", "mixed")]);
    builder.function("is_null", "bool", &[("$value", "mixed")]);
    builder.function("is_callable", "bool", &[("$value", "mixed")]);
    builder.function("get_class", "string", &[("$object", "object")]);
    builder.function("json_encode", "string|false", &[("$value", "mixed")]);
    builder.function("json_decode", "mixed", &[("$json", "string")]);
    builder.function("var_dump", "void", &[("$value", "mixed")]);
    builder.function("printf", "int", &[("$format", "string")]);

    builder.constant("PHP_EOL", "string");
    builder.constant("PHP_INT_MAX", "int");
    builder.constant("PHP_INT_MIN", "int");
    builder.constant("PHP_VERSION", "string");
    builder.constant("PHP_FLOAT_EPSILON", "float");

    builder.finish(uri)
}

struct Builder {
    symbols: Vec<Symbol>,
}

impl Builder {
    fn new(uri: &Url) -> Self {
        let root = Symbol::new(SymbolKind::File, uri.to_string());
        Builder {
            symbols: vec![root],
        }
    }

    fn finish(self, uri: Url) -> SymbolTable {
        SymbolTable::new(uri, self.symbols)
    }

    fn append(&mut self, parent: SymbolId, mut symbol: Symbol) -> SymbolId {
        symbol.parent = Some(parent);
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        self.symbols[parent.index()].children.push(id);
        id
    }

    fn class_like<F>(
        &mut self,
        kind: SymbolKind,
        name: &str,
        base: Option<&str>,
        interfaces: &[&str],
        members: F,
    ) -> SymbolId
    where
        F: FnOnce(&mut Builder, SymbolId),
    {
        let mut symbol = Symbol::new(kind, name.to_string());
        symbol.modifiers = Modifiers::PUBLIC;
        if let Some(base) = base {
            symbol.associated.push(Associated {
                kind: SymbolKind::Class,
                name: base.to_string(),
            });
        }
        for interface in interfaces {
            symbol.associated.push(Associated {
                kind: SymbolKind::Interface,
                name: interface.to_string(),
            });
        }
        let id = self.append(SymbolId(0), symbol);
        members(self, id);
        id
    }

    fn class<F>(&mut self, name: &str, base: Option<&str>, interfaces: &[&str], members: F)
    where
        F: FnOnce(&mut Builder, SymbolId),
    {
        self.class_like(SymbolKind::Class, name, base, interfaces, members);
    }

    fn class_extending<F>(&mut self, name: &str, base: &str, members: F)
    where
        F: FnOnce(&mut Builder, SymbolId),
    {
        self.class_like(SymbolKind::Class, name, Some(base), &[], members);
    }

    fn interface<F>(&mut self, name: &str, extends: &[&str], members: F)
    where
        F: FnOnce(&mut Builder, SymbolId),
    {
        self.class_like(SymbolKind::Interface, name, None, extends, members);
    }

    fn method(&mut self, class: SymbolId, name: &str, return_type: &str, params: &[(&str, &str)]) {
        let class_name = self.symbols[class.index()].name.clone();
        let mut symbol = Symbol::new(SymbolKind::Method, name.to_string());
        symbol.modifiers = Modifiers::PUBLIC;
        symbol.scope = Some(class_name);
        symbol.type_info = Some(TypeString::new(return_type));
        let id = self.append(class, symbol);
        for (param, type_text) in params {
            let mut p = Symbol::new(SymbolKind::Parameter, (*param).to_string());
            p.type_info = Some(TypeString::new(type_text));
            self.append(id, p);
        }
    }

    fn function(&mut self, name: &str, return_type: &str, params: &[(&str, &str)]) {
        let mut symbol = Symbol::new(SymbolKind::Function, name.to_string());
        symbol.type_info = Some(TypeString::new(return_type));
        let id = self.append(SymbolId(0), symbol);
        for (param, type_text) in params {
            let mut p = Symbol::new(SymbolKind::Parameter, (*param).to_string());
            p.type_info = Some(TypeString::new(type_text));
            self.append(id, p);
        }
    }

    fn constant(&mut self, name: &str, type_text: &str) {
        let mut symbol = Symbol::new(SymbolKind::Constant, name.to_string());
        symbol.type_info = Some(TypeString::new(type_text));
        self.append(SymbolId(0), symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SymbolStore;

    #[test]
    fn test_builtins_are_findable() {
        let store = SymbolStore::with_builtins();
        assert_eq!(
            store.find("strlen", |s| s.kind == SymbolKind::Function).len(),
            1
        );
        assert_eq!(
            store.find("Exception", |s| s.kind == SymbolKind::Class).len(),
            1
        );
        assert_eq!(
            store.find("PHP_EOL", |s| s.kind == SymbolKind::Constant).len(),
            1
        );
    }

    #[test]
    fn test_builtin_members_resolve_through_inheritance() {
        use crate::aggregate::{MemberMergeStrategy, TypeAggregate};

        let store = SymbolStore::with_builtins();
        let aggregate = TypeAggregate::new(&store, "RuntimeException").unwrap();
        let members = aggregate.members(MemberMergeStrategy::Override, |s| {
            s.kind == SymbolKind::Method && s.name == "getMessage"
        });
        assert_eq!(members.len(), 1);
        let symbol = store.get(members[0]).unwrap();
        assert_eq!(symbol.type_info.as_ref().unwrap().to_string(), "string");
    }

    #[test]
    fn test_builtin_function_type() {
        let store = SymbolStore::with_builtins();
        let refs = store.find("count", |s| s.kind == SymbolKind::Function);
        let symbol = store.get(refs[0]).unwrap();
        assert_eq!(symbol.type_info.as_ref().unwrap().to_string(), "int");
    }
}
