//! Response gating.
//!
//! Once a rule matched, the gate decides whether the response is actually
//! sent. A chat inside its silence window never gets a response. Otherwise a
//! uniform draw in `1..=100` must not exceed the chat's probability; a
//! probability of 0 suppresses regardless of the draw.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::chat_config::{ChatConfig, ChatConfigStore};
use crate::config::PunsConfig;
use crate::error::{PunsError, PunsResult};
use crate::rules::ChatId;

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The response should be sent.
    Respond { draw: u8 },
    /// The chat is inside its silence window.
    Silenced,
    /// The chat's probability is 0.
    Disabled,
    /// The draw exceeded the chat's probability.
    Unlucky { draw: u8 },
}

impl GateDecision {
    /// Whether the response should be sent.
    pub fn should_respond(&self) -> bool {
        matches!(self, GateDecision::Respond { .. })
    }
}

/// Decide for `config` at `now` given a draw in `1..=100`.
pub fn decide(config: &ChatConfig, now: DateTime<Utc>, draw: u8) -> GateDecision {
    if config.is_silenced_at(now) {
        return GateDecision::Silenced;
    }
    if config.probability_percent == 0 {
        return GateDecision::Disabled;
    }
    if draw <= config.probability_percent {
        GateDecision::Respond { draw }
    } else {
        GateDecision::Unlucky { draw }
    }
}

/// Probability and silence gate backed by a chat config store.
pub struct ResponseGate<S: ChatConfigStore> {
    store: Arc<S>,
    rng: Mutex<StdRng>,
}

impl<S: ChatConfigStore> ResponseGate<S> {
    /// Create a gate. `None` seeds the RNG from OS entropy.
    pub fn new(store: Arc<S>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            rng: Mutex::new(rng),
        }
    }

    /// Create a gate seeded per `config.rng_seed`.
    pub fn from_config(store: Arc<S>, config: &PunsConfig) -> Self {
        Self::new(store, config.rng_seed)
    }

    /// Whether a matched response should be sent to `chat_id` now.
    pub fn should_respond(&self, chat_id: ChatId) -> PunsResult<bool> {
        self.should_respond_at(chat_id, Utc::now())
    }

    /// Whether a matched response should be sent to `chat_id` at `now`.
    pub fn should_respond_at(&self, chat_id: ChatId, now: DateTime<Utc>) -> PunsResult<bool> {
        Ok(self.evaluate_at(chat_id, now)?.should_respond())
    }

    /// Full gate decision for `chat_id` at `now`.
    pub fn evaluate_at(&self, chat_id: ChatId, now: DateTime<Utc>) -> PunsResult<GateDecision> {
        let config = self.store.get(chat_id)?;
        let draw = if config.is_silenced_at(now) {
            0
        } else {
            self.draw()?
        };
        let decision = decide(&config, now, draw);
        debug!(chat_id, ?decision, probability = config.probability_percent, "Gate evaluated");
        Ok(decision)
    }

    fn draw(&self) -> PunsResult<u8> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| PunsError::internal("response gate RNG lock poisoned"))?;
        Ok(rng.gen_range(1..=100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_config::SqliteChatConfigStore;
    use chrono::Duration;

    fn gate() -> (Arc<SqliteChatConfigStore>, ResponseGate<SqliteChatConfigStore>) {
        let store = Arc::new(SqliteChatConfigStore::in_memory().unwrap());
        let gate = ResponseGate::new(store.clone(), Some(1234));
        (store, gate)
    }

    #[test]
    fn test_decide_boundaries() {
        let now = Utc::now();
        let mut config = ChatConfig::defaults_for(1);

        config.probability_percent = 30;
        assert!(decide(&config, now, 1).should_respond());
        assert!(decide(&config, now, 30).should_respond());
        assert_eq!(decide(&config, now, 31), GateDecision::Unlucky { draw: 31 });

        config.probability_percent = 0;
        assert_eq!(decide(&config, now, 0), GateDecision::Disabled);
        assert_eq!(decide(&config, now, 1), GateDecision::Disabled);
    }

    #[test]
    fn test_silence_overrides_probability() {
        let now = Utc::now();
        let mut config = ChatConfig::defaults_for(1);
        config.silence_until = now + Duration::seconds(1);
        for draw in 1..=100 {
            assert_eq!(decide(&config, now, draw), GateDecision::Silenced);
        }
    }

    #[test]
    fn test_default_chat_always_responds() {
        let (_, gate) = gate();
        for _ in 0..10_000 {
            assert!(gate.should_respond(42).unwrap());
        }
    }

    #[test]
    fn test_probability_zero_never_responds() {
        let (store, gate) = gate();
        store.set_probability(5, 0).unwrap();
        for _ in 0..10_000 {
            assert!(!gate.should_respond(5).unwrap());
        }
    }

    #[test]
    fn test_silenced_chat_never_responds_even_at_full_probability() {
        let (store, gate) = gate();
        let now = Utc::now();
        store.set_probability(5, 100).unwrap();
        store.set_silence_until(5, now + Duration::hours(1)).unwrap();

        for _ in 0..1_000 {
            assert!(!gate.should_respond_at(5, now).unwrap());
        }
        assert!(gate
            .should_respond_at(5, now + Duration::hours(2))
            .unwrap());
    }

    #[test]
    fn test_partial_probability_is_roughly_honoured() {
        let (store, gate) = gate();
        store.set_probability(5, 25).unwrap();
        let hits = (0..10_000)
            .filter(|_| gate.should_respond(5).unwrap())
            .count();
        assert!((2_000..3_000).contains(&hits), "hits = {}", hits);
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let store = Arc::new(SqliteChatConfigStore::in_memory().unwrap());
        store.set_probability(5, 50).unwrap();
        let a = ResponseGate::new(store.clone(), Some(99));
        let b = ResponseGate::new(store, Some(99));

        let now = Utc::now();
        let run_a: Vec<_> = (0..100).map(|_| a.evaluate_at(5, now).unwrap()).collect();
        let run_b: Vec<_> = (0..100).map(|_| b.evaluate_at(5, now).unwrap()).collect();
        assert_eq!(run_a, run_b);
    }
}
