//! Trigger resolution.
//!
//! Candidate rules for a chat are the global rules plus the chat's own, in
//! storage order (insertion order). The message is trimmed and each trigger
//! is tried as an end-anchored search: it must match a suffix of the message.
//! The first rule that matches wins and later rules are not evaluated, so
//! when several rules could answer the same message the oldest one does.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PunsResult;
use crate::patterns::PatternValidator;
use crate::rules::{ChatId, Rule, RuleStore};

/// Finds the rule that answers a message.
pub struct TriggerResolver<S: RuleStore> {
    store: Arc<S>,
    validator: PatternValidator,
}

impl<S: RuleStore> TriggerResolver<S> {
    /// Create a new resolver over `store`.
    pub fn new(store: Arc<S>, validator: PatternValidator) -> Self {
        Self { store, validator }
    }

    /// The response of the first matching rule, if any.
    pub fn resolve(&self, chat_id: ChatId, text: &str) -> PunsResult<Option<String>> {
        Ok(self.resolve_rule(chat_id, text)?.map(|rule| rule.response))
    }

    /// The first matching rule, if any.
    pub fn resolve_rule(&self, chat_id: ChatId, text: &str) -> PunsResult<Option<Rule>> {
        let text = text.trim();
        let candidates = self.store.list_for_chat(chat_id)?;

        for rule in candidates {
            if !self.validator.validate(&rule.trigger) {
                warn!(rule_id = %rule.id, trigger = %rule.trigger, "Stored trigger no longer compiles, skipping");
                continue;
            }

            let pattern = match self.validator.compile_end_anchored(&rule.trigger) {
                Ok(pattern) => pattern,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Failed to anchor trigger, skipping");
                    continue;
                }
            };

            if pattern.is_match(text) {
                debug!(chat_id, rule_id = %rule.id, trigger = %rule.trigger, "Trigger matched");
                return Ok(Some(rule));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Scope, SqliteRuleStore};

    fn resolver_with(rules: &[(Scope, &str, &str)]) -> TriggerResolver<SqliteRuleStore> {
        let store = SqliteRuleStore::in_memory().unwrap();
        for (scope, trigger, response) in rules {
            store.insert_if_absent(*scope, trigger, response).unwrap();
        }
        TriggerResolver::new(Arc::new(store), PatternValidator::default())
    }

    #[test]
    fn test_matches_only_at_end_of_message() {
        let resolver = resolver_with(&[(Scope::Global, "cinco", "por el culo te la hinco")]);

        assert_eq!(
            resolver.resolve(1, "tengo cinco").unwrap().as_deref(),
            Some("por el culo te la hinco")
        );
        assert_eq!(resolver.resolve(1, "cinco gatos").unwrap(), None);
    }

    #[test]
    fn test_message_is_trimmed_before_matching() {
        let resolver = resolver_with(&[(Scope::Global, "hola", "¡Hola!")]);
        assert!(resolver.resolve(1, "  pues hola \n").unwrap().is_some());
    }

    #[test]
    fn test_no_rules_no_match() {
        let resolver = resolver_with(&[]);
        assert_eq!(resolver.resolve(1, "lo que sea").unwrap(), None);
    }

    #[test]
    fn test_chat_rules_are_not_visible_elsewhere() {
        let resolver = resolver_with(&[(Scope::Chat(7), "trece$", "...")]);
        assert!(resolver.resolve(7, "trece").unwrap().is_some());
        assert!(resolver.resolve(8, "trece").unwrap().is_none());
    }

    #[test]
    fn test_first_rule_in_storage_order_wins() {
        let resolver = resolver_with(&[
            (Scope::Global, "adios$", "global"),
            (Scope::Chat(7), "adios$", "chat"),
        ]);

        for _ in 0..20 {
            assert_eq!(
                resolver.resolve(7, "me voy, adios").unwrap().as_deref(),
                Some("global")
            );
        }
    }

    #[test]
    fn test_storage_order_not_specificity() {
        let resolver = resolver_with(&[
            (Scope::Global, "s$", "short"),
            (Scope::Global, "adios$", "long"),
        ]);
        assert_eq!(
            resolver.resolve(1, "adios").unwrap().as_deref(),
            Some("short")
        );
    }

    #[test]
    fn test_trigger_failing_recheck_is_skipped() {
        let resolver = resolver_with(&[
            (Scope::Global, "a{5000}$", "huge"),
            (Scope::Global, "a$", "small"),
        ]);
        // A tighter limit at match time rejects the first trigger.
        let strict = TriggerResolver::new(resolver.store.clone(), PatternValidator::new(10_000));
        let text = "a".repeat(5000);
        assert_eq!(strict.resolve(1, &text).unwrap().as_deref(), Some("small"));
        assert_eq!(resolver.resolve(1, &text).unwrap().as_deref(), Some("huge"));
    }
}
