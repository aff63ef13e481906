use crate::symbol::Span;

/// A `@param`/`@var` style tag: type plus an optional `$name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedTag {
    pub type_text: String,
    pub name: Option<String>,
}

/// A `@property`, `@property-read` or `@property-write` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicPropertyTag {
    pub type_text: String,
    pub name: String,
    pub read_only: bool,
    pub write_only: bool,
}

/// A `@method` tag: `@method [static] [Type] name(Type $a, ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicMethodTag {
    pub name: String,
    pub return_type: Option<String>,
    pub is_static: bool,
    pub parameters: Vec<TypedTag>,
}

/// Parsed contents of a `/** ... */` doc comment.
#[derive(Debug, Clone, Default)]
pub struct DocBlock {
    pub summary: Option<String>,
    pub params: Vec<TypedTag>,
    pub vars: Vec<TypedTag>,
    pub return_type: Option<String>,
    pub properties: Vec<MagicPropertyTag>,
    pub methods: Vec<MagicMethodTag>,
    pub span: Span,
}

impl DocBlock {
    /// Parse a doc comment. Returns None for non-docblock comments.
    pub fn parse(text: &str, span: Span) -> Option<DocBlock> {
        let body = text.strip_prefix("/**")?.strip_suffix("*/").unwrap_or(text);
        let mut doc = DocBlock {
            span,
            ..Default::default()
        };
        let mut summary_lines: Vec<&str> = Vec::new();
        let mut in_summary = true;

        for raw in body.lines() {
            let line = raw.trim().trim_start_matches('*').trim();
            if let Some(tag_line) = line.strip_prefix('@') {
                in_summary = false;
                doc.parse_tag(tag_line);
            } else if in_summary {
                if line.is_empty() && !summary_lines.is_empty() {
                    in_summary = false;
                } else if !line.is_empty() {
                    summary_lines.push(line);
                }
            }
        }

        if !summary_lines.is_empty() {
            doc.summary = Some(summary_lines.join(" "));
        }
        Some(doc)
    }

    pub fn param_type(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .map(|p| p.type_text.as_str())
    }

    fn parse_tag(&mut self, line: &str) {
        let (tag, rest) = match line.split_once(char::is_whitespace) {
            Some((t, r)) => (t, r.trim()),
            None => (line, ""),
        };
        match tag {
            "param" => {
                if let Some(t) = parse_typed(rest) {
                    self.params.push(t);
                }
            }
            "var" => {
                if let Some(t) = parse_typed(rest) {
                    self.vars.push(t);
                }
            }
            "return" => {
                if let Some(ty) = rest.split_whitespace().next() {
                    self.return_type = Some(ty.to_string());
                }
            }
            "property" | "property-read" | "property-write" => {
                if let Some(t) = parse_typed(rest) {
                    if let Some(name) = t.name {
                        self.properties.push(MagicPropertyTag {
                            type_text: t.type_text,
                            name,
                            read_only: tag == "property-read",
                            write_only: tag == "property-write",
                        });
                    }
                }
            }
            "method" => {
                if let Some(m) = parse_method(rest) {
                    self.methods.push(m);
                }
            }
            _ => {}
        }
    }
}

/// `Type $name`, `$name Type`, bare `$name`, or just `Type`.
fn parse_typed(rest: &str) -> Option<TypedTag> {
    let mut words = rest.split_whitespace();
    let first = words.next()?;
    if first.starts_with('$') {
        // `$x Type` order; the type may be absent.
        return Some(TypedTag {
            type_text: words.next().unwrap_or("").to_string(),
            name: Some(first.to_string()),
        });
    }
    let name = words.next().filter(|w| w.starts_with('$')).map(String::from);
    Some(TypedTag {
        type_text: first.to_string(),
        name,
    })
}

fn parse_method(rest: &str) -> Option<MagicMethodTag> {
    let mut rest = rest.trim();
    let is_static = rest.starts_with("static ");
    if is_static {
        rest = rest["static".len()..].trim_start();
    }

    let paren = rest.find('(')?;
    let head = rest[..paren].trim();
    let args = rest[paren + 1..].split(')').next().unwrap_or("");

    let (return_type, name) = match head.rsplit_once(char::is_whitespace) {
        Some((ty, name)) => (Some(ty.trim().to_string()), name.trim()),
        None => (None, head),
    };
    if name.is_empty() {
        return None;
    }

    let parameters = args
        .split(',')
        .filter_map(|a| parse_typed(a.trim()))
        .filter(|t| t.name.is_some())
        .collect();

    Some(MagicMethodTag {
        name: name.to_string(),
        return_type,
        is_static,
        parameters,
    })
}
