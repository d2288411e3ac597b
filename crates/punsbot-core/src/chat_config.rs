//! Per-chat response settings.
//!
//! Each chat has a response probability and a silence window. Rows are created
//! lazily on the first write; reads of a chat without a row return the
//! defaults without writing anything.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::config::PunsConfig;
use crate::error::{PunsError, PunsResult};
use crate::rules::ChatId;
use crate::storage;

/// Probability used when a chat has never been configured.
pub const DEFAULT_PROBABILITY: u8 = 100;

/// Upper bound for the response probability.
pub const MAX_PROBABILITY: u8 = 100;

/// Response settings for one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// The chat these settings belong to.
    pub chat_id: ChatId,
    /// Chance, in percent, that a matched rule is answered.
    pub probability_percent: u8,
    /// No responses are sent before this instant.
    pub silence_until: DateTime<Utc>,
}

impl ChatConfig {
    /// Settings for a chat that has never been configured.
    pub fn defaults_for(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            probability_percent: DEFAULT_PROBABILITY,
            silence_until: DateTime::UNIX_EPOCH,
        }
    }

    /// Whether the chat is silenced at `now`.
    pub fn is_silenced_at(&self, now: DateTime<Utc>) -> bool {
        now < self.silence_until
    }
}

/// Trait for chat configuration storage operations
pub trait ChatConfigStore: Send + Sync {
    /// Settings for `chat_id`, falling back to the defaults.
    fn get(&self, chat_id: ChatId) -> PunsResult<ChatConfig>;

    /// Set the response probability, leaving the silence window untouched.
    ///
    /// Fails with `OutOfRange` unless `value` is within `0..=100`.
    fn set_probability(&self, chat_id: ChatId, value: i64) -> PunsResult<()>;

    /// Set the silence window, leaving the probability untouched.
    fn set_silence_until(&self, chat_id: ChatId, until: DateTime<Utc>) -> PunsResult<()>;
}

const STORE_NAME: &str = "chat config store";

/// SQLite-backed chat configuration store
pub struct SqliteChatConfigStore {
    conn: Mutex<Connection>,
}

impl SqliteChatConfigStore {
    /// Create a new store at the given path
    pub fn new(path: impl AsRef<Path>) -> PunsResult<Self> {
        Self::with_connection(storage::open_file(path.as_ref(), None)?)
    }

    /// Open the store described by `config`.
    pub fn open(config: &PunsConfig) -> PunsResult<Self> {
        Self::with_connection(storage::open_file(
            &config.db_path,
            Some(config.busy_timeout()),
        )?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> PunsResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> PunsResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> PunsResult<()> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chat_options (
                chat_id INTEGER PRIMARY KEY,
                silence_until INTEGER NOT NULL DEFAULT 0,
                probability INTEGER NOT NULL DEFAULT 100
            );
        "#,
        )?;
        Ok(())
    }
}

impl ChatConfigStore for SqliteChatConfigStore {
    fn get(&self, chat_id: ChatId) -> PunsResult<ChatConfig> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT silence_until, probability FROM chat_options WHERE chat_id = ?1",
                params![chat_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((silence_until, probability)) = row else {
            return Ok(ChatConfig::defaults_for(chat_id));
        };

        let probability_percent = u8::try_from(probability)
            .ok()
            .filter(|p| *p <= MAX_PROBABILITY)
            .ok_or_else(|| {
                PunsError::database(format!(
                    "chat {} has corrupt probability {}",
                    chat_id, probability
                ))
            })?;
        let silence_until = DateTime::from_timestamp(silence_until, 0).ok_or_else(|| {
            PunsError::database(format!(
                "chat {} has corrupt silence_until {}",
                chat_id, silence_until
            ))
        })?;

        Ok(ChatConfig {
            chat_id,
            probability_percent,
            silence_until,
        })
    }

    fn set_probability(&self, chat_id: ChatId, value: i64) -> PunsResult<()> {
        if !(0..=i64::from(MAX_PROBABILITY)).contains(&value) {
            return Err(PunsError::out_of_range(
                "probability",
                value,
                0,
                i64::from(MAX_PROBABILITY),
            ));
        }

        let conn = storage::lock(&self.conn, STORE_NAME)?;
        conn.execute(
            r#"INSERT INTO chat_options (chat_id, probability) VALUES (?1, ?2)
               ON CONFLICT(chat_id) DO UPDATE SET probability = excluded.probability"#,
            params![chat_id, value],
        )?;
        info!(chat_id, probability = value, "Updated response probability");
        Ok(())
    }

    fn set_silence_until(&self, chat_id: ChatId, until: DateTime<Utc>) -> PunsResult<()> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        conn.execute(
            r#"INSERT INTO chat_options (chat_id, silence_until) VALUES (?1, ?2)
               ON CONFLICT(chat_id) DO UPDATE SET silence_until = excluded.silence_until"#,
            params![chat_id, ceil_to_second(until)],
        )?;
        info!(chat_id, silence_until = %until, "Updated silence window");
        Ok(())
    }
}

/// Unix seconds, rounded up so a stored window never ends early.
fn ceil_to_second(instant: DateTime<Utc>) -> i64 {
    instant.timestamp() + i64::from(instant.timestamp_subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_missing_row_yields_defaults_without_writing() {
        let store = SqliteChatConfigStore::in_memory().unwrap();

        let config = store.get(42).unwrap();
        assert_eq!(config.probability_percent, 100);
        assert!(!config.is_silenced_at(Utc::now()));

        let conn = store.conn.lock().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_options", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_set_probability_bounds() {
        let store = SqliteChatConfigStore::in_memory().unwrap();

        store.set_probability(1, 0).unwrap();
        store.set_probability(1, 100).unwrap();

        let err = store.set_probability(1, 101).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CfgOutOfRange);
        let err = store.set_probability(1, -1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CfgOutOfRange);

        assert_eq!(store.get(1).unwrap().probability_percent, 100);
    }

    #[test]
    fn test_writes_do_not_clobber_other_field() {
        let store = SqliteChatConfigStore::in_memory().unwrap();
        let until = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();

        store.set_probability(7, 35).unwrap();
        store.set_silence_until(7, until).unwrap();
        let config = store.get(7).unwrap();
        assert_eq!(config.probability_percent, 35);
        assert_eq!(config.silence_until, until);

        store.set_probability(7, 80).unwrap();
        let config = store.get(7).unwrap();
        assert_eq!(config.probability_percent, 80);
        assert_eq!(config.silence_until, until);
    }

    #[test]
    fn test_silence_first_keeps_default_probability() {
        let store = SqliteChatConfigStore::in_memory().unwrap();
        let until = Utc::now() + Duration::minutes(30);

        store.set_silence_until(9, until).unwrap();
        let config = store.get(9).unwrap();
        assert_eq!(config.probability_percent, DEFAULT_PROBABILITY);
        assert!(config.is_silenced_at(Utc::now()));
        assert!(!config.is_silenced_at(until + Duration::seconds(1)));
    }

    #[test]
    fn test_subsecond_silence_is_rounded_up() {
        let store = SqliteChatConfigStore::in_memory().unwrap();
        let until =
            Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap() + Duration::milliseconds(400);

        store.set_silence_until(3, until).unwrap();
        let config = store.get(3).unwrap();
        assert!(config.silence_until >= until);
        assert!(config.is_silenced_at(until));
        assert_eq!(
            config.silence_until,
            Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 1).unwrap()
        );

        let whole = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        store.set_silence_until(3, whole).unwrap();
        assert_eq!(store.get(3).unwrap().silence_until, whole);
    }

    #[test]
    fn test_chats_are_independent() {
        let store = SqliteChatConfigStore::in_memory().unwrap();
        store.set_probability(1, 10).unwrap();
        assert_eq!(store.get(2).unwrap(), ChatConfig::defaults_for(2));
    }
}
