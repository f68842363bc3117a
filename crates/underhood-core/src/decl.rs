//! Line-level declaration detection.
//!
//! There is no parser behind this: a line is a declaration when one of the
//! registered heuristics says so. False positives and duplicates are
//! tolerated.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::xref::FileSite;

/// Haskell-like: type signatures, record fields, constructors, type heads.
static HASKELL_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:data|newtype|type|class)\s+[A-Z][\w']*|[a-z_][\w']*\s*::|[{,]\s*[a-z_][\w']*\s*::|[=|]\s*[A-Z][\w']*)",
    )
    .expect("haskell declaration pattern is valid")
});

/// C-family, Rust, Go, Python: keyword-introduced definitions.
static KEYWORD_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|export|public|private|protected|static|async|unsafe|abstract)\s+)*(?:fn|struct|enum|trait|type|func|class|interface|def)\s+(?:\([^)]*\)\s*)?[A-Za-z_]",
    )
    .expect("keyword declaration pattern is valid")
});

pub trait DeclarationHeuristic: Send + Sync {
    fn is_declaration(&self, line: &[u8]) -> bool;
}

impl<F> DeclarationHeuristic for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn is_declaration(&self, line: &[u8]) -> bool {
        self(line)
    }
}

/// A heuristic backed by a single regular expression.
pub struct RegexHeuristic {
    pattern: Regex,
}

impl RegexHeuristic {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn haskell() -> Self {
        Self {
            pattern: HASKELL_DECLARATION.clone(),
        }
    }

    pub fn keyword() -> Self {
        Self {
            pattern: KEYWORD_DECLARATION.clone(),
        }
    }
}

impl DeclarationHeuristic for RegexHeuristic {
    fn is_declaration(&self, line: &[u8]) -> bool {
        self.pattern.is_match(line)
    }
}

pub struct Classifier {
    heuristics: Vec<Box<dyn DeclarationHeuristic>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::empty()
            .with(RegexHeuristic::haskell())
            .with(RegexHeuristic::keyword())
    }
}

impl Classifier {
    pub fn empty() -> Self {
        Self {
            heuristics: Vec::new(),
        }
    }

    pub fn with(mut self, heuristic: impl DeclarationHeuristic + 'static) -> Self {
        self.heuristics.push(Box::new(heuristic));
        self
    }

    pub fn is_declaration(&self, line: &[u8]) -> bool {
        self.heuristics.iter().any(|h| h.is_declaration(line))
    }

    /// One single-line site per matched line that looks like a declaration.
    pub fn declaration_sites(&self, sites: &[FileSite]) -> Vec<FileSite> {
        let mut declarations = Vec::new();
        for site in sites {
            for (index, (raw, _)) in site.matched_lines().enumerate() {
                if !self.is_declaration(raw) {
                    continue;
                }
                if let Some(single) = site.single_line(index) {
                    declarations.push(single);
                }
            }
        }
        declarations
    }
}
