//! Per-language literal rules for the tokenizer.
//!
//! A rule recognizes one kind of construct (comment, string, regex literal,
//! decorator, …) that must be lifted out of the code before splitting. When a
//! rule's pattern has a capture group 1, only that group is the literal; the
//! text before it stays in the code stream (used where a construct is only
//! recognizable by what precedes it).

use once_cell::sync::Lazy;
use regex::Regex;

use super::Marker;
use crate::language::Language;

/// How the inside of a lifted literal is re-tokenized.
pub(crate) enum Inner {
    /// Split the literal text into plain words.
    Words,
    /// Split into words, but re-tokenize interpolation bodies (group 1 of the
    /// pattern) as code of the same language.
    Interpolated(&'static Lazy<Regex>),
}

pub(crate) struct LiteralRule {
    pub regex: Regex,
    pub marker: Marker,
    pub inner: Inner,
}

fn rule(pattern: &str, marker: Marker, inner: Inner) -> LiteralRule {
    match Regex::new(pattern) {
        Ok(regex) => LiteralRule {
            regex,
            marker,
            inner,
        },
        Err(err) => panic!("invalid tokenizer pattern {pattern:?}: {err}"),
    }
}

fn pattern(p: &str) -> Regex {
    match Regex::new(p) {
        Ok(re) => re,
        Err(err) => panic!("invalid tokenizer pattern {p:?}: {err}"),
    }
}

const BLOCK_COMMENT: &str = r"/\*[\s\S]*?\*/";
const SLASH_COMMENT: &str = r"//[^\n]*";
const HASH_COMMENT: &str = r"#[^\n]*";
const DQ_STRING: &str = r#""(?:[^"\\\n]|\\.)*""#;
const SQ_STRING: &str = r"'(?:[^'\\\n]|\\.)*'";

static JS_INTERPOLATION: Lazy<Regex> = Lazy::new(|| pattern(r"\$\{([^}]*)\}"));
static PY_INTERPOLATION: Lazy<Regex> = Lazy::new(|| pattern(r"\{([^{}]*)\}"));
static RB_INTERPOLATION: Lazy<Regex> = Lazy::new(|| pattern(r"#\{([^}]*)\}"));

fn ecmascript_rules(with_jsx: bool) -> Vec<LiteralRule> {
    let mut rules = vec![
        rule(BLOCK_COMMENT, Marker::CodeComment, Inner::Words),
        rule(SLASH_COMMENT, Marker::CodeComment, Inner::Words),
        rule(
            r"`(?:[^`\\]|\\[\s\S])*`",
            Marker::TemplateLiteral,
            Inner::Interpolated(&JS_INTERPOLATION),
        ),
        rule(DQ_STRING, Marker::StringLiteral, Inner::Words),
        rule(SQ_STRING, Marker::StringLiteral, Inner::Words),
        // A slash only opens a regex literal after an operator-ish token.
        rule(
            r"(?m)(?:^|[(,=:\[!&|?{};]|\breturn)\s*(/(?:[^/\\\n\[*]|\\.|\[(?:[^\]\\\n]|\\.)*\])(?:[^/\\\n\[]|\\.|\[(?:[^\]\\\n]|\\.)*\])*/[dgimsuyv]*)",
            Marker::RegexLiteral,
            Inner::Words,
        ),
        rule(
            r"@[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*",
            Marker::Decorator,
            Inner::Words,
        ),
    ];
    if with_jsx {
        rules.push(rule(
            r"</?[A-Za-z][\w.\-]*(?:\s+[^<>]*?)?\s*/?>",
            Marker::JsxTag,
            Inner::Words,
        ));
    }
    rules
}

static JAVASCRIPT: Lazy<Vec<LiteralRule>> = Lazy::new(|| ecmascript_rules(true));
static TYPESCRIPT: Lazy<Vec<LiteralRule>> = Lazy::new(|| ecmascript_rules(false));

static PYTHON: Lazy<Vec<LiteralRule>> = Lazy::new(|| {
    vec![
        rule(
            r#"\b[rRbB]?[fF][rRbB]?(?:"""[\s\S]*?"""|'''[\s\S]*?'''|"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*')"#,
            Marker::TemplateLiteral,
            Inner::Interpolated(&PY_INTERPOLATION),
        ),
        rule(r#""""[\s\S]*?""""#, Marker::StringLiteral, Inner::Words),
        rule(r"'''[\s\S]*?'''", Marker::StringLiteral, Inner::Words),
        rule(HASH_COMMENT, Marker::CodeComment, Inner::Words),
        rule(DQ_STRING, Marker::StringLiteral, Inner::Words),
        rule(SQ_STRING, Marker::StringLiteral, Inner::Words),
        rule(r"(?m)^[ \t]*(@[\w.]+)", Marker::Decorator, Inner::Words),
    ]
});

static GO: Lazy<Vec<LiteralRule>> = Lazy::new(|| {
    vec![
        rule(BLOCK_COMMENT, Marker::CodeComment, Inner::Words),
        rule(SLASH_COMMENT, Marker::CodeComment, Inner::Words),
        rule(
            r#"`(?:[A-Za-z_]\w*:"[^"]*"\s*)+`"#,
            Marker::StructTag,
            Inner::Words,
        ),
        rule(r"`[^`]*`", Marker::StringLiteral, Inner::Words),
        rule(DQ_STRING, Marker::StringLiteral, Inner::Words),
        rule(SQ_STRING, Marker::StringLiteral, Inner::Words),
    ]
});

static RUST: Lazy<Vec<LiteralRule>> = Lazy::new(|| {
    vec![
        rule(BLOCK_COMMENT, Marker::CodeComment, Inner::Words),
        rule(SLASH_COMMENT, Marker::CodeComment, Inner::Words),
        rule(r"#!?\[[^\]\n]*\]", Marker::Attribute, Inner::Words),
        rule(
            r##"\br(?:#"[\s\S]*?"#|"[^"]*")"##,
            Marker::StringLiteral,
            Inner::Words,
        ),
        rule(r#""(?:[^"\\]|\\[\s\S])*""#, Marker::StringLiteral, Inner::Words),
        rule(r"'(?:[^'\\\n]|\\.)'", Marker::StringLiteral, Inner::Words),
        rule(r"'[A-Za-z_]\w*", Marker::Lifetime, Inner::Words),
        rule(r"\b([A-Za-z_]\w*!)\s*[(\[{]", Marker::MacroCall, Inner::Words),
    ]
});

static RUBY: Lazy<Vec<LiteralRule>> = Lazy::new(|| {
    vec![
        rule(r"(?m)^=begin[\s\S]*?^=end", Marker::CodeComment, Inner::Words),
        rule(
            r#""(?:[^"\\]|\\[\s\S])*""#,
            Marker::StringLiteral,
            Inner::Interpolated(&RB_INTERPOLATION),
        ),
        rule(SQ_STRING, Marker::StringLiteral, Inner::Words),
        rule(HASH_COMMENT, Marker::CodeComment, Inner::Words),
        rule(
            r"(?m)(?:^|[\s(\[,{=])(:[A-Za-z_]\w*[?!]?)",
            Marker::SymbolLiteral,
            Inner::Words,
        ),
    ]
});

static JAVA: Lazy<Vec<LiteralRule>> = Lazy::new(|| {
    vec![
        rule(BLOCK_COMMENT, Marker::CodeComment, Inner::Words),
        rule(SLASH_COMMENT, Marker::CodeComment, Inner::Words),
        rule(r#""""[\s\S]*?""""#, Marker::StringLiteral, Inner::Words),
        rule(DQ_STRING, Marker::StringLiteral, Inner::Words),
        rule(SQ_STRING, Marker::StringLiteral, Inner::Words),
        rule(r"@[A-Za-z_]\w*(?:\.\w+)*", Marker::Decorator, Inner::Words),
    ]
});

static UNKNOWN: Lazy<Vec<LiteralRule>> = Lazy::new(|| {
    vec![
        rule(BLOCK_COMMENT, Marker::CodeComment, Inner::Words),
        rule(SLASH_COMMENT, Marker::CodeComment, Inner::Words),
        rule(DQ_STRING, Marker::StringLiteral, Inner::Words),
    ]
});

static TEXT: Lazy<Vec<LiteralRule>> = Lazy::new(Vec::new);

pub(crate) fn rules_for(language: Language) -> &'static [LiteralRule] {
    match language {
        Language::JavaScript | Language::Tsx => &JAVASCRIPT,
        Language::TypeScript => &TYPESCRIPT,
        Language::Python => &PYTHON,
        Language::Go => &GO,
        Language::Rust => &RUST,
        Language::Ruby => &RUBY,
        Language::Java => &JAVA,
        Language::Text => &TEXT,
        Language::Unknown => &UNKNOWN,
    }
}
