//! Trigger pattern validation and compilation.
//!
//! Triggers are regular expressions in the `regex` crate's dialect. A trigger is
//! checked when it is written and again before every match attempt; a pattern
//! that stops compiling simply never matches.

use regex::{Regex, RegexBuilder};

use crate::config::{PunsConfig, DEFAULT_REGEX_SIZE_LIMIT};
use crate::error::{PunsError, PunsResult};

/// Accented vowels accepted in user-submitted triggers.
const ACCENTED: &str = "áéíóúàèìòùäëïöü";

/// Regex punctuation accepted in user-submitted triggers.
const REGEX_SYMBOLS: &str = "^$.*+?(){}\\[]<>=-";

/// Compiles and checks trigger patterns.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    size_limit: usize,
}

impl Default for PatternValidator {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

impl PatternValidator {
    /// Create a validator with an explicit compiled-size limit.
    pub fn new(size_limit: usize) -> Self {
        Self { size_limit }
    }

    /// Create a validator from configuration.
    pub fn from_config(config: &PunsConfig) -> Self {
        Self::new(config.regex_size_limit)
    }

    /// Whether `pattern` compiles as a regular expression, both as written
    /// and end-anchored.
    pub fn validate(&self, pattern: &str) -> bool {
        self.compile(pattern).is_ok() && self.compile_end_anchored(pattern).is_ok()
    }

    /// Compile `pattern` as written.
    pub fn compile(&self, pattern: &str) -> PunsResult<Regex> {
        RegexBuilder::new(pattern)
            .size_limit(self.size_limit)
            .build()
            .map_err(|e| PunsError::invalid_trigger(pattern, e.to_string()))
    }

    /// Compile `pattern` anchored to the end of the haystack.
    ///
    /// The pattern is wrapped in a non-capturing group first so that a
    /// top-level alternation is anchored as a whole. Callers must have checked
    /// the pattern with [`validate`](Self::validate): wrapping can make an
    /// unbalanced pattern such as `a)(b` compile, and a trailing `(?x)`
    /// comment swallows the anchor.
    pub fn compile_end_anchored(&self, pattern: &str) -> PunsResult<Regex> {
        let anchored = format!("(?:{})$", pattern);
        RegexBuilder::new(&anchored)
            .size_limit(self.size_limit)
            .build()
            .map_err(|e| PunsError::invalid_trigger(pattern, e.to_string()))
    }

    /// Validate a trigger for storage: non-empty, compilable, and still
    /// compilable once end-anchored.
    pub fn check_trigger(&self, pattern: &str) -> PunsResult<()> {
        if pattern.is_empty() {
            return Err(PunsError::empty_trigger());
        }
        self.compile(pattern)?;
        self.compile_end_anchored(pattern).map(|_| ())
    }

    /// Reject characters outside the user trigger alphabet.
    pub fn check_charset(&self, pattern: &str) -> PunsResult<()> {
        match pattern.chars().find(|c| !is_allowed_trigger_char(*c)) {
            Some(offending) => Err(PunsError::forbidden_trigger_chars(pattern, offending)),
            None => Ok(()),
        }
    }
}

fn is_allowed_trigger_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || ACCENTED.contains(c) || REGEX_SYMBOLS.contains(c)
}
