//! Message handling.
//!
//! [`PunEngine`] ties the pieces together: command text goes to the
//! [`CommandExecutor`], everything else is resolved against the chat's rules
//! and, on a match, passed through the [`ResponseGate`]. A failure while
//! handling one message is logged and confined to that message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::chat_config::{ChatConfigStore, SqliteChatConfigStore};
use crate::commands::{Command, CommandExecutor};
use crate::config::PunsConfig;
use crate::error::{PunsError, PunsResult};
use crate::gate::ResponseGate;
use crate::patterns::PatternValidator;
use crate::resolver::TriggerResolver;
use crate::rules::{ChatId, RuleStore, SqliteRuleStore};
use crate::seed::{SeedLoader, SeedReport};

/// A text message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Chat the message was posted in.
    pub chat_id: ChatId,
    /// Message text.
    pub text: String,
}

impl InboundMessage {
    /// Create a new inbound message.
    pub fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
        }
    }
}

/// Why a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// A rule matched and the gate let it through.
    Pun,
    /// Output of a command.
    Command,
    /// A command was rejected.
    CommandError,
}

/// A reply to send back to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Destination chat.
    pub chat_id: ChatId,
    /// Reply text.
    pub text: String,
    /// Why it was produced.
    pub kind: ReplyKind,
}

/// Outbound side of the chat platform.
pub trait Transport: Send + Sync {
    /// Send `text` to `chat_id`.
    fn reply(&self, chat_id: ChatId, text: &str) -> PunsResult<()>;
}

/// Resolves, gates and answers incoming messages.
pub struct PunEngine<R: RuleStore, C: ChatConfigStore> {
    resolver: TriggerResolver<R>,
    gate: ResponseGate<C>,
    commands: CommandExecutor<R, C>,
}

impl<R: RuleStore, C: ChatConfigStore> PunEngine<R, C> {
    /// Create an engine over the given stores.
    pub fn new(rules: Arc<R>, chat_configs: Arc<C>, config: &PunsConfig) -> Self {
        Self {
            resolver: TriggerResolver::new(rules.clone(), PatternValidator::from_config(config)),
            gate: ResponseGate::from_config(chat_configs.clone(), config),
            commands: CommandExecutor::new(rules, chat_configs, config),
        }
    }

    /// The trigger resolver.
    pub fn resolver(&self) -> &TriggerResolver<R> {
        &self.resolver
    }

    /// The response gate.
    pub fn gate(&self) -> &ResponseGate<C> {
        &self.gate
    }

    /// Decide the reply to `message`, if any.
    pub fn handle(&self, message: &InboundMessage) -> PunsResult<Option<Reply>> {
        self.handle_at(message, Utc::now())
    }

    /// Decide the reply to `message` as of `now`.
    ///
    /// Rejected commands produce a [`ReplyKind::CommandError`] reply; only
    /// system failures such as storage errors are returned as `Err`.
    pub fn handle_at(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> PunsResult<Option<Reply>> {
        let chat_id = message.chat_id;

        if let Some(parsed) = Command::parse(&message.text) {
            let result = parsed.and_then(|command| {
                debug!(chat_id, ?command, "Executing command");
                self.commands.execute_at(chat_id, &command, now)
            });
            return match result {
                Ok(text) => Ok(Some(Reply {
                    chat_id,
                    text,
                    kind: ReplyKind::Command,
                })),
                Err(e) if e.is_user_error() => Ok(Some(Reply {
                    chat_id,
                    text: user_error_text(&e),
                    kind: ReplyKind::CommandError,
                })),
                Err(e) => Err(e),
            };
        }

        let Some(response) = self.resolver.resolve(chat_id, &message.text)? else {
            return Ok(None);
        };

        if !self.gate.should_respond_at(chat_id, now)? {
            return Ok(None);
        }

        Ok(Some(Reply {
            chat_id,
            text: response,
            kind: ReplyKind::Pun,
        }))
    }

    /// Handle `message` and send any reply through `transport`.
    ///
    /// Errors are logged, not returned. Returns the reply that was sent.
    pub fn dispatch<T: Transport + ?Sized>(
        &self,
        message: &InboundMessage,
        transport: &T,
    ) -> Option<Reply> {
        let reply = match self.handle(message) {
            Ok(reply) => reply?,
            Err(e) => {
                error!(chat_id = message.chat_id, error = %e, code = e.code().as_str(), "Failed to handle message");
                return None;
            }
        };

        if let Err(e) = transport.reply(reply.chat_id, &reply.text) {
            warn!(chat_id = reply.chat_id, error = %e, "Failed to send reply");
            return None;
        }
        Some(reply)
    }
}

impl PunEngine<SqliteRuleStore, SqliteChatConfigStore> {
    /// Open the SQLite stores from `config`, load the seed corpus if one is
    /// configured, and build the engine.
    ///
    /// Seeding finishes before this returns, so no message is resolved
    /// against a partially loaded corpus.
    pub fn bootstrap(config: &PunsConfig) -> PunsResult<(Self, Option<SeedReport>)> {
        let rules = Arc::new(SqliteRuleStore::open(config)?);
        let chat_configs = Arc::new(SqliteChatConfigStore::open(config)?);
        info!(db_path = %config.db_path.display(), "Opened stores");

        let report = match &config.seed_corpus_path {
            Some(path) => {
                let loader = SeedLoader::new(rules.clone(), PatternValidator::from_config(config));
                let report = loader.load_from_path(path)?;
                for skipped in &report.skipped {
                    warn!(
                        path = %path.display(),
                        line = skipped.line_number,
                        reason = %skipped.reason,
                        "Seed line not added"
                    );
                }
                Some(report)
            }
            None => None,
        };

        Ok((Self::new(rules, chat_configs, config), report))
    }
}

fn user_error_text(err: &PunsError) -> String {
    match err.suggestion() {
        Some(suggestion) => format!("{}\n{}", err, suggestion),
        None => err.to_string(),
    }
}
