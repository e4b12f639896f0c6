//! Keyword scoring, n-grams and stemming over a token stream.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::language::Language;
use crate::tokenize::is_boundary;

/// A token with its computed weight.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredKeyword {
    /// Lowercase form of the token.
    pub keyword: String,
    pub score: f64,
    pub frequency: usize,
}

const SHARED_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "do", "for", "from", "has", "have",
    "if", "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "so", "that", "the",
    "then", "this", "to", "was", "we", "were", "will", "with", "you", "your", "true", "false",
    "null", "return", "new", "else", "var", "let",
];

const ECMASCRIPT_STOP_WORDS: &[&str] = &[
    "const", "function", "class", "extends", "import", "export", "default", "async", "await",
    "typeof", "instanceof", "undefined", "void", "yield", "try", "catch", "finally", "throw",
    "switch", "case", "break", "continue", "while", "delete", "super", "static", "public",
    "private", "protected", "readonly", "interface", "type", "enum", "implements", "declare",
    "namespace", "string", "number", "boolean", "any", "unknown",
];

const PYTHON_STOP_WORDS: &[&str] = &[
    "def", "self", "cls", "none", "elif", "lambda", "pass", "import", "from", "class", "with",
    "yield", "try", "except", "finally", "raise", "while", "global", "nonlocal", "and", "or",
    "not", "async", "await", "print",
];

const GO_STOP_WORDS: &[&str] = &[
    "func", "package", "import", "type", "struct", "interface", "map", "chan", "go", "defer",
    "select", "range", "nil", "err", "string", "int", "bool", "byte", "error", "const",
];

const RUST_STOP_WORDS: &[&str] = &[
    "fn", "pub", "mut", "impl", "use", "mod", "crate", "self", "super", "struct", "enum",
    "trait", "where", "match", "loop", "ref", "move", "dyn", "unsafe", "const", "static",
    "some", "none", "ok", "err", "str", "string", "vec", "option", "result",
];

const RUBY_STOP_WORDS: &[&str] = &[
    "def", "end", "do", "nil", "self", "module", "class", "require", "unless", "elsif",
    "begin", "rescue", "ensure", "yield", "attr_accessor", "attr_reader", "puts",
];

const JAVA_STOP_WORDS: &[&str] = &[
    "public", "private", "protected", "static", "final", "void", "class", "interface",
    "extends", "implements", "package", "import", "throws", "throw", "try", "catch", "int",
    "string", "boolean", "abstract", "synchronized", "override",
];

fn language_stop_words(language: Language) -> &'static [&'static str] {
    match language {
        Language::JavaScript | Language::TypeScript | Language::Tsx => ECMASCRIPT_STOP_WORDS,
        Language::Python => PYTHON_STOP_WORDS,
        Language::Go => GO_STOP_WORDS,
        Language::Rust => RUST_STOP_WORDS,
        Language::Ruby => RUBY_STOP_WORDS,
        Language::Java => JAVA_STOP_WORDS,
        Language::Text | Language::Unknown => &[],
    }
}

static STOP_WORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| SHARED_STOP_WORDS.iter().copied().collect());

fn is_stop_word(lower: &str, language: Language) -> bool {
    STOP_WORDS.contains(lower) || language_stop_words(language).contains(&lower)
}

fn idiom_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid idiom pattern {pattern:?}: {err}"))
}

static ECMASCRIPT_IDIOM: Lazy<Regex> =
    Lazy::new(|| idiom_regex(r"^(?:use[A-Z]|on[A-Z]|handle[A-Z]|\$)"));
static PYTHON_IDIOM: Lazy<Regex> = Lazy::new(|| idiom_regex(r"^(?:__|test_)"));
static GO_IDIOM: Lazy<Regex> = Lazy::new(|| idiom_regex(r"^(?:New|Must|Err)[A-Z]"));
static RUST_IDIOM: Lazy<Regex> =
    Lazy::new(|| idiom_regex(r"^(?:try_|into_|from_|with_|impl_|as_)"));
static RUBY_IDIOM: Lazy<Regex> = Lazy::new(|| idiom_regex(r"^@|[?!]$"));
static JAVA_IDIOM: Lazy<Regex> = Lazy::new(|| idiom_regex(r"^(?:get|set|is)[A-Z]"));

fn has_idiom_prefix(token: &str, language: Language) -> bool {
    let re: &Regex = match language {
        Language::JavaScript | Language::TypeScript | Language::Tsx => &ECMASCRIPT_IDIOM,
        Language::Python => &PYTHON_IDIOM,
        Language::Go => &GO_IDIOM,
        Language::Rust => &RUST_IDIOM,
        Language::Ruby => &RUBY_IDIOM,
        Language::Java => &JAVA_IDIOM,
        Language::Text | Language::Unknown => return false,
    };
    re.is_match(token)
}

fn has_symbol_chars(token: &str) -> bool {
    token.contains(['_', '$', '@', '#', '?', '!'])
}

fn is_mixed_case(token: &str) -> bool {
    token.chars().any(|c| c.is_uppercase()) && token.chars().any(|c| c.is_lowercase())
}

fn is_number(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Score every distinct token in `tokens` and return the best `top_n`.
///
/// Tokens are grouped by lowercase form; case-sensitive boosts use the first
/// spelling seen. Boundaries and numbers never score.
pub fn extract_keywords(tokens: &[String], top_n: usize, language: Language) -> Vec<ScoredKeyword> {
    let mut groups: BTreeMap<String, (usize, &str)> = BTreeMap::new();
    for token in tokens {
        if is_boundary(token) || is_number(token) {
            continue;
        }
        groups
            .entry(token.to_lowercase())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, token.as_str()));
    }

    let mut scored: Vec<ScoredKeyword> = groups
        .into_iter()
        .filter_map(|(lower, (frequency, original))| {
            let length = lower.chars().count();
            let symbols = has_symbol_chars(original);
            if is_stop_word(&lower, language) && length <= 6 && !symbols {
                return None;
            }

            let mut score = frequency as f64;
            if is_mixed_case(original) {
                score *= 1.5;
            }
            if length > 6 {
                score *= 1.3;
            }
            if symbols {
                score *= 1.2;
            }
            if has_idiom_prefix(original, language) {
                score *= 1.4;
            }
            if length <= 2 {
                score *= 0.5;
            }
            Some(ScoredKeyword {
                keyword: lower,
                score,
                frequency,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.frequency.cmp(&a.frequency))
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    scored.truncate(top_n);
    scored
}

/// Contiguous `n`-grams of lowercase tokens joined by a space.
///
/// A window that contains a boundary token is skipped entirely.
pub fn generate_ngrams(tokens: &[String], n: usize) -> Vec<String> {
    if n == 0 || tokens.len() < n {
        return Vec::new();
    }
    tokens
        .windows(n)
        .filter(|window| !window.iter().any(|t| is_boundary(t)))
        .map(|window| {
            window
                .iter()
                .map(|t| t.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

const MIN_STEM: usize = 3;

/// Strip one common English suffix, keeping at least three characters.
///
/// A trailing `e` left after stripping is dropped too, so `cache`, `cached`,
/// `caches` and `caching` share the stem `cach`.
pub fn stem(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.chars().count() <= MIN_STEM || !lower.is_ascii() {
        return lower;
    }

    let stripped = strip_suffix(&lower);
    match stripped.strip_suffix('e') {
        Some(base) if base.len() >= MIN_STEM => base.to_string(),
        _ => stripped,
    }
}

fn strip_suffix(word: &str) -> String {
    let keep = |base: &str| base.len() >= MIN_STEM;

    if let Some(base) = word.strip_suffix("ies") {
        if keep(base) {
            return format!("{base}y");
        }
    }
    for suffix in ["ing", "ed", "ly", "er"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if keep(base) {
                return base.to_string();
            }
        }
    }
    if let Some(base) = word.strip_suffix("es") {
        if keep(base) && ["ss", "x", "z", "ch", "sh"].iter().any(|s| base.ends_with(s)) {
            return base.to_string();
        }
    }
    if !["ss", "us", "is"].iter().any(|s| word.ends_with(s)) {
        if let Some(base) = word.strip_suffix('s') {
            if keep(base) {
                return base.to_string();
            }
        }
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::{token_stream, with_identifier_parts};
    use pretty_assertions::assert_eq;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_stem_shared_root() {
        for word in ["cache", "cached", "caches", "caching"] {
            assert_eq!(stem(word), "cach", "stem({word})");
        }
    }

    #[test]
    fn test_stem_guards() {
        assert_eq!(stem("is"), "is");
        assert_eq!(stem("bus"), "bus");
        assert_eq!(stem("class"), "class");
        assert_eq!(stem("status"), "status");
        assert_eq!(stem("queries"), "query");
        assert_eq!(stem("boxes"), "box");
        assert_eq!(stem("quickly"), "quick");
        assert_eq!(stem("Parser"), "pars");
        assert_eq!(stem("sing"), "sing");
    }

    #[test]
    fn test_ngrams_respect_boundaries() {
        assert_eq!(generate_ngrams(&toks(&["a", ";", "b", "c"]), 2), vec!["b c"]);
        assert_eq!(
            generate_ngrams(&toks(&["Load", "User", "code_comment", "x"]), 2),
            vec!["load user"]
        );
        assert!(generate_ngrams(&toks(&["a"]), 2).is_empty());
    }

    #[test]
    fn test_stop_words_filtered_unless_symbolic() {
        let kws = extract_keywords(&toks(&["the", "cache", "the", "__the__"]), 10, Language::Text);
        let names: Vec<&str> = kws.iter().map(|k| k.keyword.as_str()).collect();
        assert!(!names.contains(&"the"));
        assert!(names.contains(&"cache"));
        assert!(names.contains(&"__the__"));
    }

    #[test]
    fn test_boosts_and_ordering() {
        let kws = extract_keywords(&toks(&["useState", "count", "count", "x1"]), 10, Language::JavaScript);
        // useState: 1 × 1.5 (mixed) × 1.3 (long) × 1.4 (hook) = 2.73
        assert_eq!(kws[0].keyword, "usestate");
        assert!((kws[0].score - 2.73).abs() < 1e-9);
        assert_eq!(kws[1].keyword, "count");
        assert!((kws[1].score - 2.0).abs() < 1e-9);
        assert_eq!(kws[2].keyword, "x1");
        assert!((kws[2].score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ties_break_by_frequency_then_name() {
        let kws = extract_keywords(&toks(&["zeta", "zeta", "beta", "beta"]), 10, Language::Text);
        assert_eq!(kws[0].keyword, "beta");
        assert_eq!(kws[1].keyword, "zeta");
    }

    #[test]
    fn test_top_n_and_boundaries_never_score() {
        let kws = extract_keywords(&toks(&["(", ";", "code_comment", "42", "one", "two"]), 1, Language::Text);
        assert_eq!(kws.len(), 1);
        assert!(kws[0].keyword == "one" || kws[0].keyword == "two");
    }

    #[test]
    fn test_keywords_from_real_source() {
        let src = "function loadUserProfile(userId) {\n  return fetchUser(userId);\n}\n";
        let stream = with_identifier_parts(&token_stream(src, Language::JavaScript));
        let kws = extract_keywords(&stream, 5, Language::JavaScript);
        // "user" appears once per compound part: loadUserProfile, userId ×2, fetchUser.
        assert_eq!(kws[0].keyword, "user");
        assert_eq!(kws[0].frequency, 4);
        assert_eq!(kws[1].keyword, "userid");
        assert!(!kws.iter().any(|k| k.keyword == "function"));
    }
}
