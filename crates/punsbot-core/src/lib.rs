//! punsbot-core - Core library for punsbot.
//!
//! This crate provides rule storage, trigger resolution, per-chat response
//! gating and seed corpus loading for a bot that answers chat messages whose
//! ending matches a stored pattern.
//!
//! # Example
//!
//! ```ignore
//! use punsbot_core::{InboundMessage, PunEngine, PunsConfig};
//!
//! let config = PunsConfig::from_env()?;
//! let (engine, _report) = PunEngine::bootstrap(&config)?;
//!
//! if let Some(reply) = engine.handle(&InboundMessage::new(42, "dame cinco"))? {
//!     println!("{}", reply.text);
//! }
//! ```

pub mod chat_config;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod patterns;
pub mod resolver;
pub mod rules;
pub mod seed;

mod storage;

// Re-export commonly used types
pub use chat_config::{ChatConfig, ChatConfigStore, SqliteChatConfigStore};
pub use commands::{Command, CommandExecutor};
pub use config::PunsConfig;
pub use engine::{InboundMessage, PunEngine, Reply, ReplyKind, Transport};
pub use error::{ErrorCode, PunsError, PunsResult};
pub use gate::{GateDecision, ResponseGate};
pub use patterns::PatternValidator;
pub use resolver::TriggerResolver;
pub use rules::{ChatId, InsertOutcome, Rule, RuleId, RuleStore, Scope, SqliteRuleStore};
pub use seed::{SeedLoader, SeedReport, SkipReason, SkippedLine};
