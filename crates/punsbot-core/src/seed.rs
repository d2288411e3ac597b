//! Bulk import of the default rule corpus.
//!
//! The corpus is UTF-8 text with one `trigger|response` rule per line. Lines
//! that do not split into exactly two non-empty fields, or whose trigger does
//! not compile, are reported and skipped; they never abort the load. Valid
//! rules go into the global scope in one transaction, and rules already
//! present are left alone, so loading the same corpus twice adds nothing.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use strum::{Display, EnumString, IntoStaticStr};
use tracing::{info, warn};

use crate::error::PunsResult;
use crate::patterns::PatternValidator;
use crate::rules::{RuleStore, Scope};

/// Why a corpus line was not imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// Not exactly two non-empty `|`-separated fields.
    MalformedLine,
    /// The trigger does not compile.
    InvalidTrigger,
}

/// A corpus line that was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line_number: usize,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Statistics from a seeding run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Rules newly written.
    pub inserted: usize,
    /// Valid rules that were already stored.
    pub existing: usize,
    /// Lines that were not imported.
    pub skipped: Vec<SkippedLine>,
}

impl SeedReport {
    /// Whether every line was imported or already present.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Loads a `trigger|response` corpus into the global scope.
pub struct SeedLoader<S: RuleStore> {
    store: Arc<S>,
    validator: PatternValidator,
}

impl<S: RuleStore> SeedLoader<S> {
    /// Create a new loader writing into `store`.
    pub fn new(store: Arc<S>, validator: PatternValidator) -> Self {
        Self { store, validator }
    }

    /// Read and load a corpus file.
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> PunsResult<SeedReport> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let report = self.load_from_corpus(content.lines())?;
        info!(
            path = %path.display(),
            inserted = report.inserted,
            existing = report.existing,
            skipped = report.skipped.len(),
            "Seed corpus loaded"
        );
        Ok(report)
    }

    /// Load corpus lines.
    ///
    /// Only storage failures are returned as errors; bad lines end up in
    /// [`SeedReport::skipped`].
    pub fn load_from_corpus<I, L>(&self, lines: I) -> PunsResult<SeedReport>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut report = SeedReport::default();
        let mut rules = Vec::new();

        for (index, line) in lines.into_iter().enumerate() {
            let line_number = index + 1;
            let line = line.as_ref();
            let line = if line_number == 1 {
                line.trim_start_matches('\u{feff}')
            } else {
                line
            };

            match self.parse_line(line) {
                Ok(rule) => rules.push(rule),
                Err(reason) => {
                    warn!(line_number, %reason, line, "Skipping seed line");
                    report.skipped.push(SkippedLine {
                        line_number,
                        reason,
                    });
                }
            }
        }

        let outcomes = self.store.insert_many_if_absent(Scope::Global, &rules)?;
        report.inserted = outcomes.iter().filter(|o| o.is_created()).count();
        report.existing = outcomes.len() - report.inserted;
        Ok(report)
    }

    fn parse_line(&self, line: &str) -> Result<(String, String), SkipReason> {
        let fields: Vec<&str> = line.trim().split('|').map(str::trim).collect();
        let [trigger, response] = fields.as_slice() else {
            return Err(SkipReason::MalformedLine);
        };
        if trigger.is_empty() || response.is_empty() {
            return Err(SkipReason::MalformedLine);
        }
        if !self.validator.validate(trigger) {
            return Err(SkipReason::InvalidTrigger);
        }
        Ok((trigger.to_string(), response.to_string()))
    }
}
