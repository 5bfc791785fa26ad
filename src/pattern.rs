//! Match patterns applied to line content.
//!
//! A pattern is either a literal byte string or a compiled regex; both
//! sides of the pipeline (whole-line suppression and in-place removal)
//! dispatch through this one sum type. Patterns are immutable after
//! construction and cheap to share across workers.

use crate::error::{Error, Result};
use memchr::memmem;
use regex::bytes::Regex;

/// A literal or regex pattern over decoded line bytes.
#[derive(Clone, Debug)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    /// Builds a literal pattern. Never fails.
    pub fn literal(text: impl Into<String>) -> Pattern {
        Pattern::Literal(text.into())
    }

    /// Wraps an already compiled regex.
    pub fn regex(re: Regex) -> Pattern {
        Pattern::Regex(re)
    }

    /// Compiles `expr` as a regex pattern.
    ///
    /// Compilation is the only failing construction; a bad expression is
    /// a configuration error.
    pub fn compile(expr: &str) -> Result<Pattern> {
        let re = Regex::new(expr)
            .map_err(|e| Error::Config(format!("invalid regex '{expr}': {e}")))?;
        Ok(Pattern::Regex(re))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Pattern::Literal(_))
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Pattern::Regex(_))
    }

    /// True when the pattern matches anywhere in `haystack`.
    ///
    /// Literals use substring search, regexes a full regex search.
    pub fn matches(&self, haystack: &[u8]) -> bool {
        match self {
            Pattern::Literal(text) => memmem::find(haystack, text.as_bytes()).is_some(),
            Pattern::Regex(re) => re.is_match(haystack),
        }
    }
}

/// Ordered rule sets attached to an artifact.
///
/// `filters` suppress whole lines; `normalizers` delete matched
/// substrings. Order matters for normalizers: later patterns see text
/// already edited by earlier ones.
#[derive(Clone, Debug, Default)]
pub struct Rules {
    pub filters: Vec<Pattern>,
    pub normalizers: Vec<Pattern>,
}
