use std::path::Path;

/// Source languages understood by the tokenizer and extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Tsx,
    Python,
    Go,
    Rust,
    Ruby,
    Java,
    /// Prose: markdown, plain text, conversation turns.
    Text,
    Unknown,
}

impl Language {
    /// Resolve a language from an optional caller hint, falling back to the
    /// file extension of `path`.
    pub fn detect(hint: Option<&str>, path: &str) -> Self {
        if let Some(lang) = hint.and_then(Self::from_name) {
            return lang;
        }
        Self::from_path(Path::new(path))
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "py" | "pyw" | "pyi" => Language::Python,
            "go" => Language::Go,
            "rs" => Language::Rust,
            "rb" | "rake" => Language::Ruby,
            "java" => Language::Java,
            "md" | "markdown" | "txt" | "rst" => Language::Text,
            _ => Language::Unknown,
        }
    }

    /// Parse a language name or common alias.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "jsx" | "node" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "python" | "py" => Language::Python,
            "go" | "golang" => Language::Go,
            "rust" | "rs" => Language::Rust,
            "ruby" | "rb" => Language::Ruby,
            "java" => Language::Java,
            "text" | "txt" | "markdown" | "md" | "plaintext" | "conversation" => Language::Text,
            "unknown" => Language::Unknown,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Python => "python",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Ruby => "ruby",
            Language::Java => "java",
            Language::Text => "text",
            Language::Unknown => "unknown",
        }
    }

    /// File extensions an import specifier may resolve to.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript | Language::Tsx => &["ts", "tsx", "js", "d.ts"],
            Language::Python => &["py"],
            Language::Go => &["go"],
            Language::Rust => &["rs"],
            Language::Ruby => &["rb"],
            Language::Java => &["java"],
            Language::Text | Language::Unknown => &[],
        }
    }

    /// Whether a tree-sitter grammar is linked for this language.
    pub fn has_tree_sitter_support(self) -> bool {
        matches!(
            self,
            Language::JavaScript | Language::TypeScript | Language::Tsx
        )
    }

    pub fn is_ecmascript(self) -> bool {
        matches!(
            self,
            Language::JavaScript | Language::TypeScript | Language::Tsx
        )
    }
}
