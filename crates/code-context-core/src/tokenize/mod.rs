//! Code-aware tokenization.
//!
//! Text is scanned once per language: comments, strings and language-specific
//! constructs are lifted out by the rules in [`rules`] and re-emitted as a
//! marker token wrapped around their tokenized inner text. Everything else is
//! split into identifiers, numbers and structural punctuation.
//!
//! [`token_stream`] keeps order, case and duplicates and is what keyword
//! scoring and n-gram generation consume. [`tokenize`] is the deduplicated,
//! lowercased view used for matching.

mod rules;

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::language::Language;
use rules::{rules_for, Inner, LiteralRule};

/// Semantic marker emitted around a lifted literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    StringLiteral,
    CodeComment,
    RegexLiteral,
    TemplateLiteral,
    Decorator,
    JsxTag,
    StructTag,
    SymbolLiteral,
    Attribute,
    MacroCall,
    Lifetime,
}

impl Marker {
    pub const ALL: [Marker; 11] = [
        Marker::StringLiteral,
        Marker::CodeComment,
        Marker::RegexLiteral,
        Marker::TemplateLiteral,
        Marker::Decorator,
        Marker::JsxTag,
        Marker::StructTag,
        Marker::SymbolLiteral,
        Marker::Attribute,
        Marker::MacroCall,
        Marker::Lifetime,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Marker::StringLiteral => "string_literal",
            Marker::CodeComment => "code_comment",
            Marker::RegexLiteral => "regex_literal",
            Marker::TemplateLiteral => "template_literal",
            Marker::Decorator => "decorator",
            Marker::JsxTag => "jsx_tag",
            Marker::StructTag => "struct_tag",
            Marker::SymbolLiteral => "symbol_literal",
            Marker::Attribute => "attribute",
            Marker::MacroCall => "macro_call",
            Marker::Lifetime => "lifetime",
        }
    }
}

/// Punctuation kept in the stream as phrase boundaries.
pub const STRUCTURAL_TOKENS: [&str; 8] = [";", ".", "{", "}", "(", ")", "[", "]"];

const MAX_INTERPOLATION_DEPTH: usize = 4;

static WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@{0,2}[A-Za-z_$][A-Za-z0-9_$]*|\d+(?:\.\d+)?|[;.{}()\[\]]")
        .unwrap_or_else(|err| panic!("invalid word pattern: {err}"))
});

/// Whether `token` is structural punctuation.
pub fn is_structural(token: &str) -> bool {
    STRUCTURAL_TOKENS.contains(&token)
}

/// Whether `token` is one of the semantic marker tokens.
pub fn is_marker(token: &str) -> bool {
    Marker::ALL.iter().any(|m| m.token() == token)
}

/// Whether `token` separates phrases (punctuation or marker).
pub fn is_boundary(token: &str) -> bool {
    is_structural(token) || is_marker(token)
}

/// Ordered token stream for `text`, case preserved.
pub fn token_stream(text: &str, language: Language) -> Vec<String> {
    let mut out = Vec::new();
    scan(text, language, 0, &mut out);
    out
}

/// Deduplicated lowercase tokens, including the parts of compound identifiers.
pub fn tokenize(text: &str, language: Language) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for token in token_stream(text, language) {
        if is_structural(&token) {
            continue;
        }
        for part in split_identifier(&token) {
            if part.chars().count() >= 2 {
                set.insert(part.to_lowercase());
            }
        }
        set.insert(token.to_lowercase());
    }
    set
}

/// The stream with each compound identifier followed by its parts.
///
/// This is the input keyword scoring uses, so `getUserName` contributes to
/// the frequencies of `user` and `name` as well.
pub fn with_identifier_parts(stream: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(stream.len());
    for token in stream {
        out.push(token.clone());
        if is_boundary(token) {
            continue;
        }
        out.extend(
            split_identifier(token)
                .into_iter()
                .filter(|p| p.chars().count() >= 2),
        );
    }
    out
}

/// Split a camelCase, PascalCase, or snake_case identifier into its parts.
///
/// Returns an empty vector when the identifier has a single part.
pub fn split_identifier(ident: &str) -> Vec<String> {
    let chars: Vec<char> = ident.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '$' | '@') {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let lower_to_upper = (prev.is_lowercase() || prev.is_ascii_digit()) && c.is_uppercase();
            let acronym_end = prev.is_uppercase() && c.is_uppercase() && next_lower;
            if lower_to_upper || acronym_end {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    if parts.len() < 2 {
        Vec::new()
    } else {
        parts
    }
}

#[derive(Clone, Copy)]
enum Pending {
    Unsearched,
    Found {
        literal_start: usize,
        literal_end: usize,
    },
    Exhausted,
}

fn find_literal(rule: &LiteralRule, text: &str, from: usize) -> Pending {
    let mut at = from;
    while at <= text.len() {
        let Some(caps) = rule.regex.captures_at(text, at) else {
            return Pending::Exhausted;
        };
        let span = caps.get(1).or_else(|| caps.get(0));
        match span {
            Some(m) if m.start() < m.end() => {
                return Pending::Found {
                    literal_start: m.start(),
                    literal_end: m.end(),
                }
            }
            Some(m) => at = m.end() + 1,
            None => return Pending::Exhausted,
        }
        while at < text.len() && !text.is_char_boundary(at) {
            at += 1;
        }
    }
    Pending::Exhausted
}

fn scan(text: &str, language: Language, depth: usize, out: &mut Vec<String>) {
    let rules = rules_for(language);
    let mut pending = vec![Pending::Unsearched; rules.len()];
    let mut pos = 0;

    loop {
        let mut best: Option<(usize, usize, usize)> = None;
        for (i, rule) in rules.iter().enumerate() {
            let stale = match pending[i] {
                Pending::Unsearched => true,
                Pending::Found { literal_start, .. } => literal_start < pos,
                Pending::Exhausted => false,
            };
            if stale {
                pending[i] = find_literal(rule, text, pos);
            }
            if let Pending::Found {
                literal_start,
                literal_end,
            } = pending[i]
            {
                if best.map_or(true, |(start, _, _)| literal_start < start) {
                    best = Some((literal_start, literal_end, i));
                }
            }
        }

        let Some((start, end, i)) = best else {
            split_words(&text[pos..], out);
            return;
        };
        split_words(&text[pos..start], out);
        emit_literal(&rules[i], &text[start..end], language, depth, out);
        pos = end;
    }
}

fn emit_literal(
    rule: &LiteralRule,
    literal: &str,
    language: Language,
    depth: usize,
    out: &mut Vec<String>,
) {
    let marker = rule.marker.token().to_string();
    out.push(marker.clone());
    match rule.inner {
        Inner::Words => split_words(literal, out),
        Inner::Interpolated(pattern) => {
            let mut last = 0;
            for caps in pattern.captures_iter(literal) {
                let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                split_words(&literal[last..whole.start()], out);
                if depth < MAX_INTERPOLATION_DEPTH {
                    scan(body.as_str(), language, depth + 1, out);
                } else {
                    split_words(body.as_str(), out);
                }
                last = whole.end();
            }
            split_words(&literal[last..], out);
        }
    }
    out.push(marker);
}

fn split_words(text: &str, out: &mut Vec<String>) {
    out.extend(WORD.find_iter(text).map(|m| m.as_str().to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stream(text: &str, language: Language) -> Vec<String> {
        token_stream(text, language)
    }

    #[test]
    fn test_split_identifier_cases() {
        assert_eq!(split_identifier("getUserName"), vec!["get", "User", "Name"]);
        assert_eq!(split_identifier("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(split_identifier("parse_json_body"), vec!["parse", "json", "body"]);
        assert_eq!(split_identifier("__init__"), Vec::<String>::new());
        assert_eq!(split_identifier("cache"), Vec::<String>::new());
    }

    #[test]
    fn test_stream_keeps_case_and_punctuation() {
        let tokens = stream("fetchUser(id);", Language::JavaScript);
        assert_eq!(tokens, vec!["fetchUser", "(", "id", ")", ";"]);
    }

    #[test]
    fn test_comment_and_string_markers() {
        let tokens = stream(
            "// refresh the Cache\nconst k = \"user key\";",
            Language::JavaScript,
        );
        assert_eq!(
            tokens,
            vec![
                "code_comment",
                "refresh",
                "the",
                "Cache",
                "code_comment",
                "const",
                "k",
                "string_literal",
                "user",
                "key",
                "string_literal",
                ";",
            ]
        );
    }

    #[test]
    fn test_template_interpolation_is_tokenized_as_code() {
        let set = tokenize("const msg = `Hello ${userName}`;", Language::JavaScript);
        for expected in ["template_literal", "hello", "username", "user", "name", "msg"] {
            assert!(set.contains(expected), "missing {expected}: {set:?}");
        }
    }

    #[test]
    fn test_js_regex_literal_and_division() {
        let tokens = stream("const re = /ab+c/g;", Language::JavaScript);
        assert!(tokens.contains(&"regex_literal".to_string()));

        let tokens = stream("const half = total / 2 / scale;", Language::JavaScript);
        assert!(!tokens.contains(&"regex_literal".to_string()));
    }

    #[test]
    fn test_decorator_and_jsx() {
        let set = tokenize(
            "@Component\nclass App { render() { return <Button label=\"ok\" />; } }",
            Language::JavaScript,
        );
        assert!(set.contains("decorator"));
        assert!(set.contains("component"));
        assert!(set.contains("jsx_tag"));
        assert!(set.contains("button"));
    }

    #[test]
    fn test_python_fstring_and_decorator() {
        let set = tokenize(
            "@cached\ndef greet(name):\n    return f\"hi {name.title()}\"\n",
            Language::Python,
        );
        assert!(set.contains("decorator"));
        assert!(set.contains("cached"));
        assert!(set.contains("template_literal"));
        assert!(set.contains("title"));
    }

    #[test]
    fn test_go_struct_tag() {
        let set = tokenize(
            "type User struct {\n    Name string `json:\"name\"`\n}",
            Language::Go,
        );
        assert!(set.contains("struct_tag"));
        assert!(set.contains("json"));
    }

    #[test]
    fn test_ruby_symbol_and_interpolation() {
        let set = tokenize(
            "validates :email\nputs \"hello #{user.first_name}\"",
            Language::Ruby,
        );
        assert!(set.contains("symbol_literal"));
        assert!(set.contains("email"));
        assert!(set.contains("first_name"));
        assert!(set.contains("first"));
    }

    #[test]
    fn test_rust_attribute_lifetime_and_macro() {
        let set = tokenize(
            "#[derive(Debug)]\nfn get<'a>(s: &'a str) { println!(\"{}\", s); }",
            Language::Rust,
        );
        assert!(set.contains("attribute"));
        assert!(set.contains("derive"));
        assert!(set.contains("lifetime"));
        assert!(set.contains("macro_call"));
        assert!(set.contains("println"));
    }

    #[test]
    fn test_tokenize_is_lowercase_and_drops_punctuation() {
        let set = tokenize("ParseConfig(); x.y", Language::TypeScript);
        assert!(set.contains("parseconfig"));
        assert!(set.contains("parse"));
        assert!(set.contains("config"));
        assert!(!set.contains("("));
        assert!(!set.contains("."));
        assert!(set.iter().all(|t| t == &t.to_lowercase()));
    }

    #[test]
    fn test_with_identifier_parts_expands_compounds() {
        let stream = vec!["getUser".to_string(), ";".to_string()];
        assert_eq!(with_identifier_parts(&stream), vec!["getUser", "get", "User", ";"]);
    }
}
