//! Chat commands.
//!
//! [`Command`] is what a chat asked for; [`CommandExecutor`] runs it against
//! the stores and produces the reply text. Rules added from a chat live in
//! that chat's scope, and a chat can only delete its own rules.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::Arc;
use strum::EnumString;

use crate::chat_config::{ChatConfigStore, MAX_PROBABILITY};
use crate::config::PunsConfig;
use crate::error::{PunsError, PunsResult};
use crate::patterns::PatternValidator;
use crate::rules::{ChatId, InsertOutcome, RuleId, RuleStore, Scope};

/// Silence length used when `/punsilence` has no argument.
pub const DEFAULT_SILENCE_MINUTES: u32 = 60;

/// Longest accepted silence: one year.
pub const MAX_SILENCE_MINUTES: u32 = 60 * 24 * 365;

static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^/([A-Za-z]+)(?:@\w+)?(?:\s+(.*))?$").expect("command regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum CommandName {
    Help,
    PunAdd,
    PunList,
    PunDel,
    PunSet,
    PunSilence,
    PunResume,
}

/// A command issued from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show usage.
    Help,
    /// Add a rule to the chat's scope.
    Add { trigger: String, response: String },
    /// List the rules visible from the chat.
    List,
    /// Delete one of the chat's own rules.
    Delete { id: RuleId },
    /// Set the response probability.
    SetProbability { value: i64 },
    /// Suppress responses for a while.
    Silence { minutes: u32 },
    /// End a silence window early.
    Unsilence,
}

impl Command {
    /// Parse message text as a command.
    ///
    /// Returns `None` when the text is not one of our commands, so that it is
    /// treated as a regular message. Known commands with bad arguments yield
    /// an error describing the expected usage.
    pub fn parse(text: &str) -> Option<PunsResult<Command>> {
        let caps = COMMAND_RE.captures(text.trim())?;
        let name: CommandName = caps.get(1)?.as_str().parse().ok()?;
        let args = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        Some(Self::from_parts(name, args))
    }

    fn from_parts(name: CommandName, args: &str) -> PunsResult<Command> {
        match name {
            CommandName::Help => Ok(Command::Help),
            CommandName::PunList => Ok(Command::List),
            CommandName::PunResume => Ok(Command::Unsilence),
            CommandName::PunAdd => {
                let usage = || {
                    PunsError::validation_with_suggestion(
                        "expected a trigger and a response",
                        "Use /punadd trigger|response",
                    )
                };
                let (trigger, response) = args.split_once('|').ok_or_else(usage)?;
                let (trigger, response) = (trigger.trim(), response.trim());
                if trigger.is_empty() || response.is_empty() {
                    return Err(usage());
                }
                Ok(Command::Add {
                    trigger: trigger.to_string(),
                    response: response.to_string(),
                })
            }
            CommandName::PunDel => {
                if args.is_empty() {
                    return Err(PunsError::validation_with_suggestion(
                        "expected a rule id",
                        "Use /pundel <id>",
                    ));
                }
                Ok(Command::Delete { id: args.parse()? })
            }
            CommandName::PunSet => {
                let value = args.parse::<i64>().map_err(|_| {
                    PunsError::validation_with_suggestion(
                        format!("'{}' is not a number", args),
                        "Use /punset <value> with a value from 0 to 100",
                    )
                })?;
                Ok(Command::SetProbability { value })
            }
            CommandName::PunSilence => {
                if args.is_empty() {
                    return Ok(Command::Silence {
                        minutes: DEFAULT_SILENCE_MINUTES,
                    });
                }
                let minutes = args.parse::<i64>().map_err(|_| {
                    PunsError::validation_with_suggestion(
                        format!("'{}' is not a number of minutes", args),
                        "Use /punsilence <minutes>",
                    )
                })?;
                if !(1..=i64::from(MAX_SILENCE_MINUTES)).contains(&minutes) {
                    return Err(PunsError::out_of_range(
                        "silence minutes",
                        minutes,
                        1,
                        i64::from(MAX_SILENCE_MINUTES),
                    ));
                }
                Ok(Command::Silence {
                    minutes: minutes as u32,
                })
            }
        }
    }
}

/// Runs commands against the rule and chat config stores.
pub struct CommandExecutor<R: RuleStore, C: ChatConfigStore> {
    rules: Arc<R>,
    chat_configs: Arc<C>,
    validator: PatternValidator,
    restrict_trigger_charset: bool,
}

impl<R: RuleStore, C: ChatConfigStore> CommandExecutor<R, C> {
    /// Create a new executor.
    pub fn new(rules: Arc<R>, chat_configs: Arc<C>, config: &PunsConfig) -> Self {
        Self {
            rules,
            chat_configs,
            validator: PatternValidator::from_config(config),
            restrict_trigger_charset: config.restrict_trigger_charset,
        }
    }

    /// Run `command` for `chat_id` and return the reply text.
    pub fn execute(&self, chat_id: ChatId, command: &Command) -> PunsResult<String> {
        self.execute_at(chat_id, command, Utc::now())
    }

    /// Run `command` for `chat_id` as of `now`.
    pub fn execute_at(
        &self,
        chat_id: ChatId,
        command: &Command,
        now: DateTime<Utc>,
    ) -> PunsResult<String> {
        match command {
            Command::Help => Ok(help_text()),
            Command::Add { trigger, response } => self.add(chat_id, trigger, response),
            Command::List => self.list(chat_id),
            Command::Delete { id } => {
                if self.rules.delete_in_scope(Scope::from(chat_id), id)? {
                    Ok(format!("Deleted rule {}.", id))
                } else {
                    Err(PunsError::not_found(id.to_string()))
                }
            }
            Command::SetProbability { value } => {
                self.chat_configs.set_probability(chat_id, *value)?;
                Ok(format!("Response probability set to {}%.", value))
            }
            Command::Silence { minutes } => {
                let until = now + Duration::minutes(i64::from(*minutes));
                self.chat_configs.set_silence_until(chat_id, until)?;
                Ok(format!(
                    "Going quiet for {} minutes, until {} UTC. Use /punresume to undo.",
                    minutes,
                    until.format("%Y-%m-%d %H:%M")
                ))
            }
            Command::Unsilence => {
                self.chat_configs
                    .set_silence_until(chat_id, DateTime::UNIX_EPOCH)?;
                Ok("Back to rhyming.".to_string())
            }
        }
    }

    fn add(&self, chat_id: ChatId, trigger: &str, response: &str) -> PunsResult<String> {
        if self.restrict_trigger_charset {
            self.validator.check_charset(trigger)?;
        }
        self.validator.check_trigger(trigger)?;

        match self
            .rules
            .insert_if_absent(Scope::from(chat_id), trigger, response)?
        {
            InsertOutcome::Created(id) => Ok(format!("Added rule {}.", id)),
            InsertOutcome::Existing(id) => Ok(format!("That rule already exists as {}.", id)),
        }
    }

    fn list(&self, chat_id: ChatId) -> PunsResult<String> {
        let rules = self.rules.list_for_chat(chat_id)?;
        if rules.is_empty() {
            return Ok("No rules available.".to_string());
        }

        let mut out = String::from("Rules:\n");
        for rule in rules {
            let marker = if rule.scope.is_global() { " (global)" } else { "" };
            let _ = writeln!(
                out,
                "{}{}: {} -> {}",
                rule.id, marker, rule.trigger, rule.response
            );
        }
        Ok(out)
    }
}

/// Usage text for `/help`.
pub fn help_text() -> String {
    format!(
        "Available commands:\n\
         /punadd trigger|response - add a rule to this chat\n\
         /pundel <id> - delete one of this chat's rules\n\
         /punlist - list the rules visible here\n\
         /punset <0-{}> - set the response probability\n\
         /punsilence [minutes] - stay quiet for a while (default {})\n\
         /punresume - end a silence early\n\
         \n\
         Version: {}",
        MAX_PROBABILITY,
        DEFAULT_SILENCE_MINUTES,
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_config::SqliteChatConfigStore;
    use crate::error::ErrorCode;
    use crate::rules::SqliteRuleStore;

    fn executor(
        config: &PunsConfig,
    ) -> (
        Arc<SqliteRuleStore>,
        Arc<SqliteChatConfigStore>,
        CommandExecutor<SqliteRuleStore, SqliteChatConfigStore>,
    ) {
        let rules = Arc::new(SqliteRuleStore::in_memory().unwrap());
        let configs = Arc::new(SqliteChatConfigStore::in_memory().unwrap());
        let exec = CommandExecutor::new(rules.clone(), configs.clone(), config);
        (rules, configs, exec)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/help").unwrap().unwrap(), Command::Help);
        assert_eq!(
            Command::parse("/punadd@PunsBot  hola$ | ¡Hola!").unwrap().unwrap(),
            Command::Add {
                trigger: "hola$".to_string(),
                response: "¡Hola!".to_string()
            }
        );
        assert_eq!(
            Command::parse("/punset 40").unwrap().unwrap(),
            Command::SetProbability { value: 40 }
        );
        assert_eq!(
            Command::parse("/punsilence").unwrap().unwrap(),
            Command::Silence { minutes: 60 }
        );
        assert_eq!(
            Command::parse("/PUNLIST").unwrap().unwrap(),
            Command::List
        );
    }

    #[test]
    fn test_parse_ignores_non_commands() {
        assert!(Command::parse("hola que tal").is_none());
        assert!(Command::parse("/start").is_none());
        assert!(Command::parse("a /punlist").is_none());
    }

    #[test]
    fn test_parse_reports_bad_arguments() {
        assert!(Command::parse("/punadd sin separador").unwrap().is_err());
        assert!(Command::parse("/punadd |solo").unwrap().is_err());
        assert!(Command::parse("/punset mucho").unwrap().is_err());
        assert_eq!(
            Command::parse("/pundel nope").unwrap().unwrap_err().code(),
            ErrorCode::ValInvalidId
        );
        assert_eq!(
            Command::parse("/punsilence 0").unwrap().unwrap_err().code(),
            ErrorCode::CfgOutOfRange
        );
    }

    #[test]
    fn test_add_and_list() {
        let (_, _, exec) = executor(&PunsConfig::default());

        let reply = exec
            .execute(
                -100,
                &Command::Add {
                    trigger: "trece$".to_string(),
                    response: "agarramela que me crece".to_string(),
                },
            )
            .unwrap();
        assert!(reply.starts_with("Added rule"));

        let listing = exec.execute(-100, &Command::List).unwrap();
        assert!(listing.contains("trece$ -> agarramela que me crece"));
        assert_eq!(
            exec.execute(-200, &Command::List).unwrap(),
            "No rules available."
        );
    }

    #[test]
    fn test_add_twice_reports_existing() {
        let (rules, _, exec) = executor(&PunsConfig::default());
        let add = Command::Add {
            trigger: "x$".to_string(),
            response: "y".to_string(),
        };
        exec.execute(1, &add).unwrap();
        let reply = exec.execute(1, &add).unwrap();
        assert!(reply.contains("already exists"));
        assert_eq!(rules.count().unwrap(), 1);
    }

    #[test]
    fn test_add_enforces_charset_when_configured() {
        let add = Command::Add {
            trigger: "hola!".to_string(),
            response: "y".to_string(),
        };

        let (_, _, strict) = executor(&PunsConfig::default());
        let err = strict.execute(1, &add).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TrgForbiddenChars);

        let relaxed = PunsConfig::builder().restrict_trigger_charset(false).build();
        let (_, _, lenient) = executor(&relaxed);
        assert!(lenient.execute(1, &add).is_ok());
    }

    #[test]
    fn test_add_rejects_invalid_regex() {
        let (rules, _, exec) = executor(&PunsConfig::default());
        let err = exec
            .execute(
                1,
                &Command::Add {
                    trigger: "(abc".to_string(),
                    response: "y".to_string(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TrgInvalidRegex);
        assert_eq!(rules.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_only_own_rules() {
        let (rules, _, exec) = executor(&PunsConfig::default());
        let global = rules.insert_if_absent(Scope::Global, "g$", "g").unwrap();
        let own = rules.insert_if_absent(Scope::Chat(3), "o$", "o").unwrap();

        let err = exec
            .execute(3, &Command::Delete { id: global.id() })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RuleNotFound);

        let reply = exec.execute(3, &Command::Delete { id: own.id() }).unwrap();
        assert!(reply.starts_with("Deleted rule"));
        assert_eq!(rules.count().unwrap(), 1);
    }

    #[test]
    fn test_probability_and_silence_commands() {
        let (_, configs, exec) = executor(&PunsConfig::default());
        let now = Utc::now();

        exec.execute_at(4, &Command::SetProbability { value: 20 }, now)
            .unwrap();
        let err = exec
            .execute_at(4, &Command::SetProbability { value: 120 }, now)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CfgOutOfRange);

        exec.execute_at(4, &Command::Silence { minutes: 10 }, now)
            .unwrap();
        let config = configs.get(4).unwrap();
        assert_eq!(config.probability_percent, 20);
        assert!(config.is_silenced_at(now + Duration::minutes(9)));
        assert!(!config.is_silenced_at(now + Duration::minutes(11)));

        exec.execute_at(4, &Command::Unsilence, now).unwrap();
        assert!(!configs.get(4).unwrap().is_silenced_at(now));
    }

    #[test]
    fn test_help_mentions_version() {
        assert!(help_text().contains(env!("CARGO_PKG_VERSION")));
        assert!(help_text().contains(&MAX_PROBABILITY.to_string()));
    }
}
