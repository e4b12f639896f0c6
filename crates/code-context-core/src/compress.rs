//! Token-budget compression of ranked snippets.
//!
//! Snippets share a character budget in proportion to their scores. A
//! snippet that fits its share is kept verbatim; otherwise it is summarized
//! according to its entity type by keeping the highest-scoring lines (or
//! sentences, for plain text) in their original order. Elided runs of code
//! are marked with a `...` line.
//!
//! The total length of the returned snippets never exceeds the budget.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::keywords::stem;
use crate::language::Language;
use crate::models::{CompressedSnippet, EntityType, Snippet};
use crate::tokenize::tokenize;

/// Conversion rate used by [`tokens_to_chars`].
pub const CHARS_PER_TOKEN: usize = 4;

const GAP_MARKER: &str = "...";
/// Lines and sentences scoring at least this much are picked first.
const HIGH_TIER: f64 = 3.0;
const STRUCTURAL_CHARS: [char; 7] = ['{', '}', '(', ')', '[', ']', ';'];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid summary pattern {pattern:?}: {err}"))
}

static CONTROL_FLOW: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b(?:if|else|for|while|switch|case|match|return|throw|raise|try|catch|except|await|yield|break|continue)\b",
    )
});

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b(?:function|def|fn|func|class|struct|trait|interface|enum|type|const|let|var|impl|pub|public|private|static)\b",
    )
});

static ANNOTATION: Lazy<Regex> = Lazy::new(|| compile(r"^\s*(?:@[A-Za-z_]|#\[)"));

static MODULE_LINK: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?:import\b|export\b|from\s+\S+\s+import\b|use\s|package\s|require\b|#include\b|(?:const|let|var)\s+[\w{}\s,]+=\s*require\()",
    )
});

static DOC_LINE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(?:///?|/\*|\*|#(?:[^\[!]|$))"));

static METHOD_DEF: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s+(?:(?:pub(?:\([^)]*\))?|public|private|protected|static|async|override|readonly|abstract|final|def|fn|func|get|set)\s+)*\*?([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\(",
    )
});

static SENTENCE: Lazy<Regex> = Lazy::new(|| compile(r"[^.!?\n]+[.!?]*"));

static DOMAIN_SIGNAL: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(?:error|bug|fix|important|must|should|because|decided|requirement|todo|deprecated|breaking|performance)\b",
    )
});

const NOT_METHODS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "super", "new", "await",
    "typeof", "match", "with", "elif", "print",
];

/// Convert a token budget to characters.
pub fn tokens_to_chars(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Thresholds for allocation and redistribution, in characters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressOptions {
    /// Snippets allocated less than this are dropped.
    pub min_allocation: usize,
    /// Kept snippets are raised to at least this much, budget permitting.
    pub allocation_floor: usize,
    /// Unspent budget above this triggers redistribution.
    pub redistribute_above: usize,
    /// Redistribution stops once the unspent budget falls below this.
    pub redistribute_until: usize,
    /// A leading doc comment is kept only when shorter than this share of
    /// what remains after the signature.
    pub doc_comment_share: f64,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            min_allocation: 50,
            allocation_floor: 100,
            redistribute_above: 200,
            redistribute_until: 100,
            doc_comment_share: 0.4,
        }
    }
}

/// Split `budget` across snippets with the given scores.
///
/// Snippets are processed by descending score. Each gets
/// `floor(score / Σscore × budget)` (equal shares when no score is
/// positive), raised to `allocation_floor` and capped by what is left. A
/// snippet is dropped (`None`) when its provisional or capped allocation is
/// below `min_allocation`.
pub fn allocate(scores: &[f64], budget: usize, options: &CompressOptions) -> Vec<Option<usize>> {
    let n = scores.len();
    let mut allocations = vec![None; n];
    if n == 0 {
        return allocations;
    }
    let positive = |s: f64| if s.is_finite() && s > 0.0 { s } else { 0.0 };
    let total: f64 = scores.iter().map(|&s| positive(s)).sum();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

    let mut remaining = budget;
    for i in order {
        let share = if total > 0.0 {
            positive(scores[i]) / total
        } else {
            1.0 / n as f64
        };
        let provisional = (share * budget as f64).floor() as usize;
        if provisional < options.min_allocation {
            continue;
        }
        let chars = provisional.max(options.allocation_floor).min(remaining);
        if chars < options.min_allocation {
            continue;
        }
        remaining -= chars;
        allocations[i] = Some(chars);
    }
    allocations
}

/// Stemmed query keywords matched against tokenized lines.
struct QueryTerms {
    stems: Vec<String>,
}

impl QueryTerms {
    fn new(keywords: &[String]) -> Self {
        let mut stems: Vec<String> = Vec::new();
        for word in keywords.iter().flat_map(|k| k.split_whitespace()) {
            let s = stem(word);
            if !s.is_empty() && !stems.contains(&s) {
                stems.push(s);
            }
        }
        Self { stems }
    }

    /// Number of distinct query keywords present in `text`.
    fn matches(&self, text: &str) -> usize {
        if self.stems.is_empty() {
            return 0;
        }
        let tokens: BTreeSet<String> = tokenize(text, Language::Text)
            .iter()
            .map(|t| stem(t))
            .collect();
        self.stems
            .iter()
            .filter(|q| tokens.iter().any(|t| t.starts_with(q.as_str())))
            .count()
    }
}

/// A set of chosen lines rendered in original order, with a marker line
/// wherever lines were skipped. Tracks its rendered length incrementally.
struct Selection<'a> {
    lines: Vec<&'a str>,
    chosen: BTreeSet<usize>,
    /// Synthetic line emitted right after an anchor line.
    note: Option<(usize, String)>,
    chars: usize,
    count: usize,
}

fn rendered_len(chars: usize, count: usize) -> usize {
    if count == 0 {
        0
    } else {
        chars + count - 1
    }
}

impl<'a> Selection<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines().collect(),
            chosen: BTreeSet::new(),
            note: None,
            chars: 0,
            count: 0,
        }
    }

    fn len(&self) -> usize {
        rendered_len(self.chars, self.count)
    }

    /// 1 when a marker is rendered between `a` and `b`. `None` stands for
    /// the start or end of the content.
    fn gap(&self, a: Option<usize>, b: Option<usize>) -> usize {
        let a = a.map_or(-1, |v| v as isize);
        let b = b.map_or(self.lines.len() as isize, |v| v as isize);
        usize::from(b > a + 1)
    }

    /// Add line `idx` if the rendered result stays within `budget`.
    fn try_add(&mut self, idx: usize, budget: usize) -> bool {
        if idx >= self.lines.len() || self.chosen.contains(&idx) {
            return false;
        }
        let prev = self.chosen.range(..idx).next_back().copied();
        let next = self.chosen.range(idx + 1..).next().copied();
        let (before, after) = if self.chosen.is_empty() {
            (0, self.gap(None, Some(idx)) + self.gap(Some(idx), None))
        } else {
            (
                self.gap(prev, next),
                self.gap(prev, Some(idx)) + self.gap(Some(idx), next),
            )
        };
        let marker = GAP_MARKER.len();
        let chars = self.chars + char_len(self.lines[idx]) + after * marker - before * marker;
        let count = self.count + 1 + after - before;
        if rendered_len(chars, count) > budget {
            return false;
        }
        self.chars = chars;
        self.count = count;
        self.chosen.insert(idx);
        true
    }

    fn note_fits(&self, text: &str, budget: usize) -> bool {
        rendered_len(self.chars + char_len(text), self.count + 1) <= budget
    }

    fn try_note(&mut self, anchor: usize, text: String, budget: usize) -> bool {
        if self.note.is_some() || !self.chosen.contains(&anchor) || !self.note_fits(&text, budget)
        {
            return false;
        }
        self.chars += char_len(&text);
        self.count += 1;
        self.note = Some((anchor, text));
        true
    }

    /// Non-blank lines not yet chosen, scored.
    fn candidates(
        &self,
        groups: &[&Regex],
        query: &QueryTerms,
        skip: &BTreeSet<usize>,
    ) -> Vec<(usize, f64)> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(i, l)| !l.trim().is_empty() && !self.chosen.contains(i) && !skip.contains(i))
            .map(|(i, l)| (i, score_line(l, i, groups, query)))
            .collect()
    }

    /// Greedy fill: high tier first, then the rest, each by descending score.
    fn fill(&mut self, scored: Vec<(usize, f64)>, budget: usize) {
        let (mut high, mut low): (Vec<_>, Vec<_>) =
            scored.into_iter().partition(|(_, s)| *s >= HIGH_TIER);
        for tier in [&mut high, &mut low] {
            tier.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            for &(idx, _) in tier.iter() {
                self.try_add(idx, budget);
            }
        }
    }

    fn render(&self) -> String {
        let mut out: Vec<&str> = Vec::with_capacity(self.count);
        let mut last = None;
        for &i in &self.chosen {
            if self.gap(last, Some(i)) == 1 {
                out.push(GAP_MARKER);
            }
            out.push(self.lines[i]);
            if let Some((anchor, text)) = &self.note {
                if *anchor == i {
                    out.push(text);
                }
            }
            last = Some(i);
        }
        if last.is_some() && self.gap(last, None) == 1 {
            out.push(GAP_MARKER);
        }
        out.join("\n")
    }
}

fn score_line(line: &str, index: usize, groups: &[&Regex], query: &QueryTerms) -> f64 {
    let mut score = 3.0 * query.matches(line) as f64;
    score += 2.0 * groups.iter().filter(|g| g.is_match(line)).count() as f64;
    if index < 5 {
        score += 1.0;
    }
    if line.chars().any(|c| STRUCTURAL_CHARS.contains(&c)) {
        score += 0.5;
    }
    score
}

fn marker_groups(entity_type: EntityType) -> [&'static Regex; 2] {
    if entity_type.is_callable() {
        [&*CONTROL_FLOW, &*DECLARATION]
    } else if entity_type.is_container() {
        [&*DECLARATION, &*ANNOTATION]
    } else if entity_type == EntityType::File {
        [&*MODULE_LINK, &*DECLARATION]
    } else {
        [&*DECLARATION, &*CONTROL_FLOW]
    }
}

/// First non-blank line at or after `from`.
fn first_code_line(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&i| !lines[i].trim().is_empty())
}

/// Signature lines starting at `start`: up to the line that opens the body,
/// at most three lines.
fn signature_range(lines: &[&str], start: usize) -> std::ops::Range<usize> {
    let mut end = start;
    while end < lines.len() && end < start + 3 {
        let line = lines[end].trim_end();
        end += 1;
        if line.contains('{') || line.ends_with(':') || line.contains("=>") || line.ends_with(';')
        {
            break;
        }
    }
    start..end
}

/// A docstring opening right after the signature.
fn trailing_docstring(lines: &[&str], at: usize) -> std::ops::Range<usize> {
    let Some(first) = lines.get(at).map(|l| l.trim_start()) else {
        return at..at;
    };
    let delimiter = if first.starts_with("\"\"\"") {
        "\"\"\""
    } else if first.starts_with("'''") {
        "'''"
    } else {
        return at..at;
    };
    if first.matches(delimiter).count() >= 2 {
        return at..at + 1;
    }
    let mut end = at + 1;
    while end < lines.len() {
        end += 1;
        if lines[end - 1].contains(delimiter) {
            break;
        }
    }
    at..end
}

/// Method names declared in the indented body of a type.
fn method_names(lines: &[&str], body_start: usize) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in lines.iter().skip(body_start) {
        let trimmed = line.trim_end();
        if !(trimmed.ends_with('{') || trimmed.ends_with(':')) {
            continue;
        }
        let Some(caps) = METHOD_DEF.captures(line) else {
            continue;
        };
        let name = &caps[1];
        if NOT_METHODS.contains(&name) || names.iter().any(|n| n == name) {
            continue;
        }
        names.push(name.to_string());
    }
    names
}

/// Budget-constrained compressor.
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    options: CompressOptions,
}

impl Compressor {
    pub fn new(options: CompressOptions) -> Self {
        Self { options }
    }

    /// Fit `snippets` into `budget` characters.
    ///
    /// Output is ordered by descending score. Snippets that are dropped by
    /// allocation or summarize to nothing are omitted.
    pub fn compress(
        &self,
        snippets: &[Snippet],
        budget: usize,
        query_keywords: &[String],
    ) -> Vec<CompressedSnippet> {
        let query = QueryTerms::new(query_keywords);
        let scores: Vec<f64> = snippets.iter().map(|s| s.score).collect();
        let allocations = allocate(&scores, budget, &self.options);

        let mut order: Vec<usize> = (0..snippets.len())
            .filter(|&i| allocations[i].is_some())
            .collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

        let mut kept: Vec<(usize, CompressedSnippet)> = Vec::new();
        for i in order {
            let Some(allocation) = allocations[i] else {
                continue;
            };
            match self.fit(&snippets[i], allocation, &query) {
                Some(compressed) => kept.push((i, compressed)),
                None => tracing::debug!(
                    entity_id = %snippets[i].entity_id,
                    allocation,
                    "snippet omitted: empty summary"
                ),
            }
        }

        self.redistribute(snippets, &mut kept, budget, &query);
        tracing::debug!(
            input = snippets.len(),
            kept = kept.len(),
            budget,
            "compression complete"
        );
        kept.into_iter().map(|(_, c)| c).collect()
    }

    fn fit(
        &self,
        snippet: &Snippet,
        allocation: usize,
        query: &QueryTerms,
    ) -> Option<CompressedSnippet> {
        let original_length = char_len(&snippet.content);
        let content = if original_length <= allocation {
            snippet.content.clone()
        } else {
            self.summarize(snippet, allocation, query)
        };
        if content.trim().is_empty() {
            return None;
        }
        let length = char_len(&content);
        Some(CompressedSnippet {
            entity_id: snippet.entity_id.clone(),
            truncated: content != snippet.content,
            compression_ratio: if original_length == 0 {
                1.0
            } else {
                length as f64 / original_length as f64
            },
            original_length,
            content,
            score: snippet.score,
        })
    }

    /// Grow truncated snippets into unspent budget, best first.
    fn redistribute(
        &self,
        snippets: &[Snippet],
        kept: &mut [(usize, CompressedSnippet)],
        budget: usize,
        query: &QueryTerms,
    ) {
        let used: usize = kept.iter().map(|(_, c)| char_len(&c.content)).sum();
        let mut remaining = budget.saturating_sub(used);
        if remaining <= self.options.redistribute_above {
            return;
        }
        for (i, compressed) in kept.iter_mut() {
            if remaining < self.options.redistribute_until {
                break;
            }
            if !compressed.truncated {
                continue;
            }
            let current = char_len(&compressed.content);
            let allocation = (current + remaining).min(compressed.original_length);
            let Some(grown) = self.fit(&snippets[*i], allocation, query) else {
                continue;
            };
            let grown_len = char_len(&grown.content);
            if grown_len > current {
                remaining -= grown_len - current;
                *compressed = grown;
            }
        }
    }

    fn summarize(&self, snippet: &Snippet, allocation: usize, query: &QueryTerms) -> String {
        match snippet.entity_type {
            None | Some(EntityType::CommentBlock) => {
                summarize_text(&snippet.content, allocation, query)
            }
            Some(t) if t.is_callable() => self.summarize_callable(snippet, allocation, query),
            Some(t) if t.is_container() => summarize_container(snippet, allocation, query),
            Some(EntityType::File) => summarize_file(&snippet.content, allocation, query),
            Some(t) => summarize_other(&snippet.content, t, allocation, query),
        }
    }

    /// Signature, doc comment when it is cheap enough, then the best body
    /// lines.
    fn summarize_callable(&self, snippet: &Snippet, allocation: usize, query: &QueryTerms) -> String {
        let mut sel = Selection::new(&snippet.content);
        let leading_docs = sel
            .lines
            .iter()
            .take_while(|l| DOC_LINE.is_match(l) || l.trim().is_empty())
            .count();
        let Some(start) = first_code_line(&sel.lines, leading_docs) else {
            return String::new();
        };
        let signature = signature_range(&sel.lines, start);
        let docstring = trailing_docstring(&sel.lines, signature.end);
        for i in signature.clone() {
            if !sel.try_add(i, allocation) {
                return String::new();
            }
        }

        let docs: Vec<usize> = (0..leading_docs)
            .chain(docstring.clone())
            .filter(|&i| !sel.lines[i].trim().is_empty())
            .collect();
        if !docs.is_empty() {
            let cost: usize = docs.iter().map(|&i| char_len(sel.lines[i]) + 1).sum();
            let left = allocation.saturating_sub(sel.len());
            if (cost as f64) < self.options.doc_comment_share * left as f64 {
                for &i in &docs {
                    sel.try_add(i, allocation);
                }
            }
        }

        let skip: BTreeSet<usize> = (0..leading_docs).chain(docstring).collect();
        let groups = marker_groups(EntityType::Function);
        let scored = sel.candidates(&groups, query, &skip);
        sel.fill(scored, allocation);
        sel.render()
    }
}

/// Signature, a `methods:` manifest, then the best body lines.
fn summarize_container(snippet: &Snippet, allocation: usize, query: &QueryTerms) -> String {
    let mut sel = Selection::new(&snippet.content);
    let Some(start) = first_code_line(&sel.lines, 0) else {
        return String::new();
    };
    let signature = signature_range(&sel.lines, start);
    for i in signature.clone() {
        if !sel.try_add(i, allocation) {
            return String::new();
        }
    }

    let names = method_names(&sel.lines, signature.end);
    let mut manifest = String::new();
    for name in &names {
        let candidate = if manifest.is_empty() {
            format!("methods: {}", name)
        } else {
            format!("{}, {}", manifest, name)
        };
        if !sel.note_fits(&candidate, allocation) {
            break;
        }
        manifest = candidate;
    }
    if !manifest.is_empty() {
        sel.try_note(signature.end - 1, manifest, allocation);
    }

    let groups = marker_groups(snippet.entity_type.unwrap_or(EntityType::Class));
    let scored = sel.candidates(&groups, query, &BTreeSet::new());
    sel.fill(scored, allocation);
    sel.render()
}

/// Import and export lines in order, then the best remaining lines.
fn summarize_file(content: &str, allocation: usize, query: &QueryTerms) -> String {
    let mut sel = Selection::new(content);
    let manifest: Vec<usize> = (0..sel.lines.len())
        .filter(|&i| MODULE_LINK.is_match(sel.lines[i]))
        .collect();
    for i in manifest {
        sel.try_add(i, allocation);
    }
    let groups = marker_groups(EntityType::File);
    let scored = sel.candidates(&groups, query, &BTreeSet::new());
    sel.fill(scored, allocation);
    sel.render()
}

/// First line, then the best remaining lines.
fn summarize_other(
    content: &str,
    entity_type: EntityType,
    allocation: usize,
    query: &QueryTerms,
) -> String {
    let mut sel = Selection::new(content);
    let Some(first) = first_code_line(&sel.lines, 0) else {
        return String::new();
    };
    if !sel.try_add(first, allocation) {
        return String::new();
    }
    let groups = marker_groups(entity_type);
    let scored = sel.candidates(&groups, query, &BTreeSet::new());
    sel.fill(scored, allocation);
    sel.render()
}

/// Extractive summary: best sentences joined in original order.
fn summarize_text(content: &str, allocation: usize, query: &QueryTerms) -> String {
    let sentences: Vec<&str> = SENTENCE
        .find_iter(content)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    let n = sentences.len();
    let scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut score = 3.0 * query.matches(s) as f64;
            if i == 0 {
                score += 2.0;
            }
            if i == 1 {
                score += 1.0;
            }
            if i + 1 == n {
                score += 1.0;
            }
            score += 1.5 * DOMAIN_SIGNAL.find_iter(s).count() as f64;
            (i, score)
        })
        .collect();

    let (mut high, mut low): (Vec<_>, Vec<_>) =
        scored.into_iter().partition(|(_, s)| *s >= HIGH_TIER);
    let mut chosen = BTreeSet::new();
    let mut used = 0usize;
    for tier in [&mut high, &mut low] {
        tier.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        for &(i, _) in tier.iter() {
            let cost = char_len(sentences[i]) + usize::from(!chosen.is_empty());
            if used + cost <= allocation {
                used += cost;
                chosen.insert(i);
            }
        }
    }
    chosen
        .into_iter()
        .map(|i| sentences[i])
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snippet(id: &str, entity_type: Option<EntityType>, content: &str, score: f64) -> Snippet {
        Snippet {
            entity_id: id.to_string(),
            entity_type,
            name: id.to_string(),
            content: content.to_string(),
            score,
        }
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn total_chars(out: &[CompressedSnippet]) -> usize {
        out.iter().map(|c| c.content.chars().count()).sum()
    }

    const WARM_CACHE: &str = "/// Warm the cache before serving.
function warmCache(keys) {
  const started = Date.now();
  for (const key of keys) {
    cache.set(key, load(key));
  }
  log('warmed', keys.length);
  metrics.record(started);
  return keys.length;
}";

    #[test]
    fn test_tokens_to_chars() {
        assert_eq!(tokens_to_chars(0), 0);
        assert_eq!(tokens_to_chars(250), 1000);
    }

    #[test]
    fn test_allocate_proportional_shares() {
        let opts = CompressOptions::default();
        assert_eq!(allocate(&[0.8, 0.2], 300, &opts), vec![Some(240), Some(60)]);
        assert_eq!(allocate(&[0.9, 0.1], 300, &opts), vec![Some(270), None]);
    }

    #[test]
    fn test_allocate_floor_and_cap() {
        let opts = CompressOptions::default();
        // 80 is raised toward the floor but capped by what is left.
        assert_eq!(allocate(&[0.6, 0.4], 200, &opts), vec![Some(120), Some(80)]);
        // The third share clears 50 but only 25 characters remain.
        assert_eq!(
            allocate(&[0.5, 0.3, 0.2], 250, &opts),
            vec![Some(125), Some(100), None]
        );
    }

    #[test]
    fn test_allocate_equal_shares_without_scores() {
        let opts = CompressOptions::default();
        assert_eq!(allocate(&[0.0, 0.0], 400, &opts), vec![Some(200), Some(200)]);
        assert!(allocate(&[], 400, &opts).is_empty());
    }

    #[test]
    fn test_fitting_snippet_is_verbatim() {
        let out = Compressor::default().compress(
            &[snippet("a", Some(EntityType::Function), "fn a() {}", 1.0)],
            500,
            &[],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "fn a() {}");
        assert!(!out[0].truncated);
        assert!((out[0].compression_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_narrow_allocation_with_long_lines_is_omitted() {
        let long_line = format!("  let value = compute(\"{}\");", "x".repeat(70));
        let body: Vec<String> = std::iter::once(format!("function big() {{ // {}", "y".repeat(80)))
            .chain(std::iter::repeat(long_line).take(9))
            .collect();
        let content = body.join("\n");
        assert!(content.chars().count() >= 900);

        let out = Compressor::default().compress(
            &[
                snippet("first", Some(EntityType::Function), &content, 0.8),
                snippet("second", Some(EntityType::Function), &content, 0.2),
            ],
            300,
            &[],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_id, "first");
        assert!(out[0].truncated);
        assert!(out[0].content.chars().count() <= 240);
        assert!(out[0].content.starts_with("function big()"));
    }

    #[test]
    fn test_callable_keeps_signature_doc_and_keyword_lines() {
        let out = Compressor::default().compress(
            &[snippet("w", Some(EntityType::Function), WARM_CACHE, 1.0)],
            150,
            &keywords(&["cache"]),
        );
        assert_eq!(out.len(), 1);
        let text = &out[0].content;
        assert!(text.chars().count() <= 150);
        assert!(text.starts_with("/// Warm the cache before serving.\nfunction warmCache(keys) {"));
        assert!(text.contains("cache.set(key, load(key));"));
        assert!(text.contains("\n...\n"));
        assert!(out[0].compression_ratio < 1.0);
    }

    #[test]
    fn test_container_lists_methods() {
        let class = "class CacheStore {
  constructor(limit) {
    this.limit = limit;
    this.items = new Map();
  }
  get(key) {
    return this.items.get(key);
  }
  set(key, value) {
    this.items.set(key, value);
    this.evict();
  }
  evict() {
    while (this.items.size > this.limit) {
      this.items.delete(this.items.keys().next().value);
    }
  }
}";
        let out = Compressor::default().compress(
            &[snippet("c", Some(EntityType::Class), class, 1.0)],
            200,
            &[],
        );
        let lines: Vec<&str> = out[0].content.lines().collect();
        assert_eq!(lines[0], "class CacheStore {");
        assert_eq!(lines[1], "methods: constructor, get, set, evict");
        assert!(out[0].content.chars().count() <= 200);
    }

    #[test]
    fn test_file_summary_keeps_imports() {
        let mut content = String::from("import { load } from './loader';\nimport fs from 'fs';\n");
        for i in 0..30 {
            content.push_str(&format!("const value{} = load('entry-{}');\n", i, i));
        }
        content.push_str("export default value0;\n");
        let out = Compressor::default().compress(
            &[snippet("f", Some(EntityType::File), &content, 1.0)],
            200,
            &[],
        );
        let text = &out[0].content;
        assert!(text.starts_with("import { load } from './loader';\nimport fs from 'fs';"));
        assert!(text.contains("export default value0;"));
        assert!(text.chars().count() <= 200);
    }

    #[test]
    fn test_text_summary_prefers_keyword_sentences_in_order() {
        let text = "The cache layer stores rendered pages. It was added last spring. \
Eviction must stay LRU because memory is tight. Nobody reads the logs. \
Ask ops before changing TTLs.";
        let out = Compressor::default().compress(
            &[snippet("t", None, text, 1.0)],
            100,
            &keywords(&["eviction"]),
        );
        assert_eq!(
            out[0].content,
            "The cache layer stores rendered pages. Eviction must stay LRU because memory is tight."
        );
    }

    #[test]
    fn test_unspent_budget_is_redistributed() {
        let mut long = String::from("function accumulate(value) {\n");
        for i in 0..100 {
            long.push_str(&format!("    total += step_{:02}(value);\n", i));
        }
        long.push('}');
        let short = "x".repeat(50);

        let out = Compressor::default().compress(
            &[
                snippet("short", Some(EntityType::Variable), &short, 0.5),
                snippet("long", Some(EntityType::Function), &long, 0.5),
            ],
            1000,
            &[],
        );
        assert_eq!(out.len(), 2);
        let grown = out.iter().find(|c| c.entity_id == "long").unwrap();
        assert!(grown.truncated);
        assert!(grown.content.chars().count() > 500);
        assert!(total_chars(&out) <= 1000);
    }

    #[test]
    fn test_budget_is_never_exceeded() {
        let mut snippets = vec![
            snippet("w", Some(EntityType::Function), WARM_CACHE, 0.9),
            snippet("t", None, &"Short sentence here. ".repeat(40), 0.4),
            snippet("v", Some(EntityType::Variable), &"let a = 1;\n".repeat(60), 0.3),
        ];
        snippets.push(snippet(
            "f",
            Some(EntityType::File),
            &"import x from 'y';\nrun(x);\n".repeat(30),
            0.7,
        ));
        for budget in [0, 49, 100, 250, 600, 1200, 5000] {
            let out = Compressor::default().compress(&snippets, budget, &keywords(&["cache"]));
            assert!(total_chars(&out) <= budget, "budget {} exceeded", budget);
            assert!(out.iter().all(|c| !c.content.trim().is_empty()));
        }
    }
}
