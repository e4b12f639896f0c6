//! Regex fallback extraction.
//!
//! Each language has a list of line-anchored templates. A match yields one
//! entity whose span is a fixed window of [`SPAN_LINES`] lines, clamped to the
//! end of the file. Nesting is recovered from indentation for languages where
//! it is meaningful.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::{line_of, ExtractedEntity, ExtractedRelationship, Extraction, RelationTarget, Strategy};
use crate::language::Language;
use crate::models::{EntityType, RelationshipType};

pub(crate) const SPAN_LINES: i64 = 20;

#[derive(Clone, Copy)]
enum Kind {
    Plain(EntityType),
    /// `nested` when indented, `top` otherwise.
    Indented { top: EntityType, nested: EntityType },
    /// Go method: parent is the receiver type.
    Receiver,
    Import,
    /// Parenthesized Go import list; every quoted path is an import.
    ImportBlock,
}

struct Template {
    regex: Regex,
    kind: Kind,
}

fn template(pattern: &str, kind: Kind) -> Template {
    match Regex::new(pattern) {
        Ok(regex) => Template { regex, kind },
        Err(err) => panic!("invalid extraction template {pattern:?}: {err}"),
    }
}

static ECMASCRIPT: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)",
            Kind::Plain(EntityType::Function),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|[A-Za-z_$][\w$]*\s*=>)",
            Kind::Plain(EntityType::Function),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][\w$]*)",
            Kind::Plain(EntityType::Class),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?interface\s+(?P<name>[A-Za-z_$][\w$]*)",
            Kind::Plain(EntityType::Interface),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]+)(?:(?:public|private|protected|static|async|readonly)\s+)*(?P<name>[A-Za-z_$][\w$]*)\s*\([^)]*\)\s*(?::\s*[^{;]+)?\{",
            Kind::Indented {
                top: EntityType::Function,
                nested: EntityType::Method,
            },
        ),
        template(
            r"(?m)^(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*=",
            Kind::Plain(EntityType::Variable),
        ),
        template(
            r#"(?m)^import\s+(?:[^'"]*?\s+from\s+)?['"](?P<name>[^'"]+)['"]"#,
            Kind::Import,
        ),
    ]
});

static PYTHON: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)",
            Kind::Indented {
                top: EntityType::Function,
                nested: EntityType::Method,
            },
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)class\s+(?P<name>[A-Za-z_]\w*)",
            Kind::Plain(EntityType::Class),
        ),
        template(
            r"(?m)^(?:from\s+(?P<name>[\w.]+)\s+import\b|import\s+(?P<module>[\w.]+))",
            Kind::Import,
        ),
        template(
            r"(?m)^(?P<name>[A-Z_][A-Z0-9_]*)\s*(?::[^=\n]+)?=",
            Kind::Plain(EntityType::Variable),
        ),
    ]
});

static GO: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        template(
            r"(?m)^func\s+\(\s*\w+\s+\*?(?P<receiver>\w+)(?:\[[^\]]*\])?\s*\)\s*(?P<name>\w+)",
            Kind::Receiver,
        ),
        template(
            r"(?m)^func\s+(?P<name>\w+)",
            Kind::Plain(EntityType::Function),
        ),
        template(
            r"(?m)^type\s+(?P<name>\w+)(?:\[[^\]]*\])?\s+struct\b",
            Kind::Plain(EntityType::Struct),
        ),
        template(
            r"(?m)^type\s+(?P<name>\w+)(?:\[[^\]]*\])?\s+interface\b",
            Kind::Plain(EntityType::Interface),
        ),
        template(
            r#"(?m)^import\s+(?:[\w.]+\s+)?"(?P<name>[^"]+)""#,
            Kind::Import,
        ),
        template(r"(?ms)^import\s*\((?P<block>.*?)^\)", Kind::ImportBlock),
        template(
            r"(?m)^(?:var|const)\s+(?P<name>\w+)",
            Kind::Plain(EntityType::Variable),
        ),
    ]
});

const RUST_VIS: &str = r"(?:pub(?:\([^)]*\))?\s+)?";

static RUST: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        template(
            &format!(
                r"(?m)^(?P<indent>[ \t]*){RUST_VIS}(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?fn\s+(?P<name>\w+)"
            ),
            Kind::Indented {
                top: EntityType::Function,
                nested: EntityType::Method,
            },
        ),
        template(
            &format!(r"(?m)^(?P<indent>[ \t]*){RUST_VIS}struct\s+(?P<name>\w+)"),
            Kind::Plain(EntityType::Struct),
        ),
        template(
            &format!(r"(?m)^(?P<indent>[ \t]*){RUST_VIS}(?:unsafe\s+)?trait\s+(?P<name>\w+)"),
            Kind::Plain(EntityType::Trait),
        ),
        template(
            &format!(r"(?m)^(?P<indent>[ \t]*){RUST_VIS}enum\s+(?P<name>\w+)"),
            Kind::Plain(EntityType::Enum),
        ),
        template(
            &format!(r"(?m)^(?P<indent>[ \t]*){RUST_VIS}mod\s+(?P<name>\w+)"),
            Kind::Plain(EntityType::Module),
        ),
        template(
            &format!(r"(?m)^(?P<indent>[ \t]*){RUST_VIS}type\s+(?P<name>\w+)"),
            Kind::Plain(EntityType::TypeAlias),
        ),
        template(
            &format!(r"(?m)^{RUST_VIS}use\s+(?P<name>[\w:]+)"),
            Kind::Import,
        ),
        template(
            &format!(r"(?m)^{RUST_VIS}(?:const|static)\s+(?:mut\s+)?(?P<name>\w+)"),
            Kind::Plain(EntityType::Variable),
        ),
    ]
});

static RUBY: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        template(
            r"(?m)^(?P<indent>[ \t]*)def\s+(?:self\.)?(?P<name>[A-Za-z_]\w*[?!=]?)",
            Kind::Indented {
                top: EntityType::Function,
                nested: EntityType::Method,
            },
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)class\s+(?P<name>[A-Z]\w*)",
            Kind::Plain(EntityType::Class),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)module\s+(?P<name>[A-Z]\w*)",
            Kind::Plain(EntityType::Module),
        ),
        template(
            r#"(?m)^\s*require(?:_relative)?\s*\(?\s*['"](?P<name>[^'"]+)['"]"#,
            Kind::Import,
        ),
    ]
});

static JAVA: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:(?:public|private|protected|abstract|final|static|sealed)\s+)*(?:class|record)\s+(?P<name>\w+)",
            Kind::Plain(EntityType::Class),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:(?:public|private|protected|abstract|static|sealed)\s+)*interface\s+(?P<name>\w+)",
            Kind::Plain(EntityType::Interface),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:(?:public|private|protected|static)\s+)*enum\s+(?P<name>\w+)",
            Kind::Plain(EntityType::Enum),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]+)(?:(?:public|private|protected|static|final|abstract|synchronized|native|default)\s+)*(?:<[^>]+>\s+)?[\w<>\[\],.?]+\s+(?P<name>\w+)\s*\([^)]*\)\s*(?:throws\s+[\w.,\s]+)?\{",
            Kind::Indented {
                top: EntityType::Function,
                nested: EntityType::Method,
            },
        ),
        template(
            r"(?m)^import\s+(?:static\s+)?(?P<name>[\w.*]+)\s*;",
            Kind::Import,
        ),
    ]
});

static GENERIC: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:function|def|func|fn|sub|proc)\s+(?P<name>[A-Za-z_]\w*)",
            Kind::Plain(EntityType::Function),
        ),
        template(
            r"(?m)^(?P<indent>[ \t]*)(?:class|struct|interface|trait)\s+(?P<name>[A-Za-z_]\w*)",
            Kind::Plain(EntityType::Class),
        ),
    ]
});

static NONE: Lazy<Vec<Template>> = Lazy::new(Vec::new);

fn templates_for(language: Language) -> &'static [Template] {
    match language {
        Language::JavaScript | Language::TypeScript | Language::Tsx => &ECMASCRIPT,
        Language::Python => &PYTHON,
        Language::Go => &GO,
        Language::Rust => &RUST,
        Language::Ruby => &RUBY,
        Language::Java => &JAVA,
        Language::Unknown => &GENERIC,
        Language::Text => &NONE,
    }
}

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "def", "fn", "func", "match",
    "elif", "new", "typeof", "sizeof", "with", "and", "or", "not", "in", "await", "yield",
    "super", "lambda", "assert", "else", "loop", "defer", "go", "select", "unless", "until",
    "case", "when", "throw", "raise", "print", "class", "struct", "impl", "where", "import",
];

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\s*\(")
        .unwrap_or_else(|err| panic!("invalid call pattern: {err}"))
});

static CALL_STOP: Lazy<HashSet<&'static str>> = Lazy::new(|| CALL_KEYWORDS.iter().copied().collect());

struct Found {
    offset: usize,
    kind: Kind,
    name: String,
    indent: usize,
    receiver: Option<String>,
}

static QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]+)""#).unwrap_or_else(|err| panic!("invalid quoted pattern: {err}"))
});

fn indent_width(indent: &str) -> usize {
    indent.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum()
}

fn collect(content: &str, templates: &[Template]) -> Vec<Found> {
    let mut found = Vec::new();
    for template in templates {
        for caps in template.regex.captures_iter(content) {
            if let Kind::ImportBlock = template.kind {
                let Some(block) = caps.name("block") else { continue };
                for quoted in QUOTED.captures_iter(block.as_str()) {
                    let Some(path) = quoted.get(1) else { continue };
                    found.push(Found {
                        offset: block.start() + path.start(),
                        kind: Kind::Import,
                        name: path.as_str().to_string(),
                        indent: 0,
                        receiver: None,
                    });
                }
                continue;
            }
            let Some(name) = caps.name("name").or_else(|| caps.name("module")) else {
                continue;
            };
            if !matches!(template.kind, Kind::Import) && CALL_STOP.contains(name.as_str()) {
                continue;
            }
            found.push(Found {
                offset: name.start(),
                kind: template.kind,
                name: name.as_str().to_string(),
                indent: caps.name("indent").map(|m| indent_width(m.as_str())).unwrap_or(0),
                receiver: caps.name("receiver").map(|m| m.as_str().to_string()),
            });
        }
    }
    // Stable: earlier templates win when two claim the same line.
    found.sort_by_key(|f| f.offset);
    found
}

pub(super) fn extract(content: &str, language: Language) -> Extraction {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len().max(1) as i64;

    let mut extraction = Extraction::empty(Strategy::Regex);
    let mut claimed_lines: HashSet<i64> = HashSet::new();
    // (indent width, entity index) of open containers.
    let mut containers: Vec<(usize, usize)> = Vec::new();

    for hit in collect(content, templates_for(language)) {
        let start_line = line_of(content, hit.offset);
        if !claimed_lines.insert(start_line) {
            continue;
        }
        while containers
            .last()
            .is_some_and(|&(width, _)| width >= hit.indent)
        {
            containers.pop();
        }
        let enclosing = containers.last().map(|&(_, idx)| idx);

        let end_line = (start_line + SPAN_LINES - 1).min(total_lines);
        let raw_content = slice_lines(&lines, start_line, end_line);

        let (entity_type, parent) = match hit.kind {
            Kind::Plain(entity_type) => (entity_type, enclosing),
            Kind::Indented { nested, .. } if hit.indent > 0 => (nested, enclosing),
            Kind::Indented { top, .. } => (top, None),
            Kind::Receiver => {
                let receiver = hit.receiver.as_deref().unwrap_or_default();
                let owner = extraction
                    .entities
                    .iter()
                    .position(|e| e.name == receiver && e.entity_type == EntityType::Struct);
                (EntityType::Method, owner)
            }
            Kind::Import | Kind::ImportBlock => (EntityType::Import, None),
        };

        let mut metadata = json!({ "pattern": language.name(), "indent": hit.indent });
        if let Some(receiver) = &hit.receiver {
            metadata["receiver"] = json!(receiver);
        }
        extraction.entities.push(ExtractedEntity {
            entity_type,
            name: hit.name.clone(),
            start_line,
            end_line,
            raw_content,
            parent,
            metadata,
        });
        let idx = extraction.entities.len() - 1;

        if entity_type == EntityType::Import {
            extraction.relationships.push(ExtractedRelationship {
                source: None,
                target: RelationTarget::Symbol {
                    name: hit.name,
                    entity_type: Some(EntityType::File),
                },
                relationship_type: RelationshipType::Imports,
                metadata: json!({ "line": start_line }),
            });
        }
        if entity_type.is_container() {
            containers.push((hit.indent, idx));
        }
    }

    let starts: Vec<i64> = extraction
        .entities
        .iter()
        .filter(|e| e.entity_type != EntityType::Import)
        .map(|e| e.start_line)
        .collect();
    let mut calls = Vec::new();
    for (idx, entity) in extraction.entities.iter().enumerate() {
        if entity.entity_type.is_callable() {
            let stop = starts
                .iter()
                .copied()
                .filter(|&s| s > entity.start_line)
                .min()
                .unwrap_or(i64::MAX);
            calls.extend(detect_calls(idx, entity, stop));
        }
    }
    extraction.relationships.extend(calls);
    extraction
}

fn slice_lines(lines: &[&str], start_line: i64, end_line: i64) -> String {
    let from = (start_line - 1).max(0) as usize;
    let to = (end_line.max(start_line) as usize).min(lines.len());
    if from >= to {
        return String::new();
    }
    lines[from..to].join("\n")
}

/// Identifier calls in the body of a callable entity, up to (not including)
/// line `stop` where the next entity starts. The declaration line is skipped
/// so a definition does not call itself.
fn detect_calls(idx: usize, entity: &ExtractedEntity, stop: i64) -> Vec<ExtractedRelationship> {
    let mut out = Vec::new();
    for (offset, line) in entity.raw_content.lines().enumerate().skip(1) {
        if entity.start_line + offset as i64 >= stop {
            break;
        }
        for caps in CALL.captures_iter(line) {
            let Some(callee) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if CALL_STOP.contains(callee) {
                continue;
            }
            out.push(ExtractedRelationship {
                source: Some(idx),
                target: RelationTarget::Symbol {
                    name: callee.to_string(),
                    entity_type: None,
                },
                relationship_type: RelationshipType::Calls,
                metadata: json!({ "line": entity.start_line + offset as i64 }),
            });
        }
    }
    out
}
