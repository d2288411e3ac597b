//! Rule storage.
//!
//! A rule pairs a trigger pattern with a response and belongs either to the
//! global scope, visible from every chat, or to one chat. The triple
//! `(trigger, response, scope)` is unique: inserting it twice is a no-op.
//!
//! Rules are listed in insertion order. Each row carries a `seq` one past the
//! current maximum, assigned inside the insert statement, so the order does
//! not depend on rowids and survives deletes and `VACUUM`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::config::PunsConfig;
use crate::error::{PunsError, PunsResult};
use crate::patterns::PatternValidator;
use crate::storage;

/// Chat identifier as used by the chat platform.
pub type ChatId = i64;

/// Unique identifier for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    /// Creates a new random rule ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RuleId {
    type Err = PunsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| PunsError::invalid_id(s))
    }
}

/// Visibility of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Visible from every chat. Stored as `0`.
    Global,
    /// Visible from one chat only.
    Chat(ChatId),
}

impl Scope {
    /// Raw value stored in the `chat_scope` column.
    pub fn as_db(&self) -> i64 {
        match self {
            Scope::Global => 0,
            Scope::Chat(id) => *id,
        }
    }

    /// Decode a `chat_scope` column value.
    pub fn from_db(value: i64) -> Self {
        if value == 0 {
            Scope::Global
        } else {
            Scope::Chat(value)
        }
    }

    /// Whether this is the global scope.
    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }
}

impl From<ChatId> for Scope {
    fn from(chat_id: ChatId) -> Self {
        Scope::from_db(chat_id)
    }
}

/// A trigger/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier.
    pub id: RuleId,
    /// Where the rule applies.
    pub scope: Scope,
    /// Regular expression matched against the end of a message.
    pub trigger: String,
    /// Text sent back when the trigger matches.
    pub response: String,
    /// When the rule was stored.
    pub created_at: DateTime<Utc>,
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Created(RuleId),
    /// An identical rule already existed; nothing was written.
    Existing(RuleId),
}

impl InsertOutcome {
    /// The id of the stored rule, new or pre-existing.
    pub fn id(&self) -> RuleId {
        match self {
            InsertOutcome::Created(id) | InsertOutcome::Existing(id) => *id,
        }
    }

    /// Whether a row was written.
    pub fn is_created(&self) -> bool {
        matches!(self, InsertOutcome::Created(_))
    }
}

/// Trait for rule storage operations
pub trait RuleStore: Send + Sync {
    /// Insert a rule unless an identical one exists in the same scope.
    ///
    /// Fails with `InvalidTrigger` if the trigger is empty or does not compile.
    fn insert_if_absent(
        &self,
        scope: Scope,
        trigger: &str,
        response: &str,
    ) -> PunsResult<InsertOutcome>;

    /// Insert many rules into one scope atomically.
    ///
    /// Every pair is validated before anything is written.
    fn insert_many_if_absent(
        &self,
        scope: Scope,
        rules: &[(String, String)],
    ) -> PunsResult<Vec<InsertOutcome>>;

    /// Global rules plus the chat's own rules, in insertion order.
    fn list_for_chat(&self, chat_id: ChatId) -> PunsResult<Vec<Rule>>;

    /// Get rule by ID
    fn get(&self, id: &RuleId) -> PunsResult<Option<Rule>>;

    /// Delete a rule; returns whether a row was removed.
    fn delete_by_id(&self, id: &RuleId) -> PunsResult<bool>;

    /// Delete a rule only if it belongs to `scope`.
    fn delete_in_scope(&self, scope: Scope, id: &RuleId) -> PunsResult<bool>;

    /// Count stored rules across all scopes.
    fn count(&self) -> PunsResult<usize>;
}

const STORE_NAME: &str = "rule store";

/// SQLite-backed rule store
pub struct SqliteRuleStore {
    conn: Mutex<Connection>,
    validator: PatternValidator,
}

impl SqliteRuleStore {
    /// Create a new store at the given path
    pub fn new(path: impl AsRef<Path>) -> PunsResult<Self> {
        let conn = storage::open_file(path.as_ref(), None)?;
        Self::with_connection(conn, PatternValidator::default())
    }

    /// Open the store described by `config`.
    pub fn open(config: &PunsConfig) -> PunsResult<Self> {
        let conn = storage::open_file(&config.db_path, Some(config.busy_timeout()))?;
        Self::with_connection(conn, PatternValidator::from_config(config))
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> PunsResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, PatternValidator::default())
    }

    fn with_connection(conn: Connection, validator: PatternValidator) -> PunsResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            validator,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> PunsResult<()> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS puns (
                id TEXT PRIMARY KEY,
                chat_scope INTEGER NOT NULL,
                "trigger" TEXT NOT NULL,
                response TEXT NOT NULL,
                seq INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE("trigger", response, chat_scope)
            );

            CREATE INDEX IF NOT EXISTS idx_puns_scope_seq ON puns(chat_scope, seq);
        "#,
        )?;
        Ok(())
    }

    fn check_rule(&self, trigger: &str, response: &str) -> PunsResult<()> {
        self.validator.check_trigger(trigger)?;
        if response.is_empty() {
            return Err(PunsError::empty_response());
        }
        Ok(())
    }

    fn insert_row(
        conn: &Connection,
        scope: Scope,
        trigger: &str,
        response: &str,
    ) -> PunsResult<InsertOutcome> {
        let id = RuleId::new();
        let inserted = conn.execute(
            r#"INSERT INTO puns (id, chat_scope, "trigger", response, seq, created_at)
               VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(seq), 0) + 1 FROM puns), ?5)
               ON CONFLICT("trigger", response, chat_scope) DO NOTHING"#,
            params![
                id.to_string(),
                scope.as_db(),
                trigger,
                response,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if inserted == 1 {
            return Ok(InsertOutcome::Created(id));
        }

        let existing: String = conn.query_row(
            r#"SELECT id FROM puns WHERE "trigger" = ?1 AND response = ?2 AND chat_scope = ?3"#,
            params![trigger, response, scope.as_db()],
            |row| row.get(0),
        )?;
        Ok(InsertOutcome::Existing(existing.parse()?))
    }

    fn row_to_rule(row: &rusqlite::Row<'_>) -> PunsResult<Rule> {
        let id: String = row.get(0)?;
        let scope: i64 = row.get(1)?;
        let trigger: String = row.get(2)?;
        let response: String = row.get(3)?;
        let created_at: String = row.get(4)?;

        Ok(Rule {
            id: id.parse()?,
            scope: Scope::from_db(scope),
            trigger,
            response,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| PunsError::database(format!("corrupt created_at: {}", e)))?,
        })
    }
}

impl RuleStore for SqliteRuleStore {
    fn insert_if_absent(
        &self,
        scope: Scope,
        trigger: &str,
        response: &str,
    ) -> PunsResult<InsertOutcome> {
        self.check_rule(trigger, response)?;
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        let outcome = Self::insert_row(&conn, scope, trigger, response)?;
        debug!(?scope, trigger, created = outcome.is_created(), "Stored rule");
        Ok(outcome)
    }

    fn insert_many_if_absent(
        &self,
        scope: Scope,
        rules: &[(String, String)],
    ) -> PunsResult<Vec<InsertOutcome>> {
        for (trigger, response) in rules {
            self.check_rule(trigger, response)?;
        }

        let mut conn = storage::lock(&self.conn, STORE_NAME)?;
        let tx = conn.transaction()?;
        let outcomes = rules
            .iter()
            .map(|(trigger, response)| Self::insert_row(&tx, scope, trigger, response))
            .collect::<PunsResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(outcomes)
    }

    fn list_for_chat(&self, chat_id: ChatId) -> PunsResult<Vec<Rule>> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        let mut stmt = conn.prepare(
            r#"SELECT id, chat_scope, "trigger", response, created_at
               FROM puns
               WHERE chat_scope = 0 OR chat_scope = ?1
               ORDER BY seq ASC"#,
        )?;

        let results = stmt.query_map(params![chat_id], |row| Ok(Self::row_to_rule(row)))?;

        results
            .map(|r| r.map_err(PunsError::from).and_then(|inner| inner))
            .collect()
    }

    fn get(&self, id: &RuleId) -> PunsResult<Option<Rule>> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        let mut stmt = conn.prepare(
            r#"SELECT id, chat_scope, "trigger", response, created_at
               FROM puns WHERE id = ?1"#,
        )?;

        stmt.query_row(params![id.to_string()], |row| Ok(Self::row_to_rule(row)))
            .optional()?
            .transpose()
    }

    fn delete_by_id(&self, id: &RuleId) -> PunsResult<bool> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        let removed = conn.execute("DELETE FROM puns WHERE id = ?1", params![id.to_string()])?;
        Ok(removed > 0)
    }

    fn delete_in_scope(&self, scope: Scope, id: &RuleId) -> PunsResult<bool> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        let removed = conn.execute(
            "DELETE FROM puns WHERE id = ?1 AND chat_scope = ?2",
            params![id.to_string(), scope.as_db()],
        )?;
        Ok(removed > 0)
    }

    fn count(&self) -> PunsResult<usize> {
        let conn = storage::lock(&self.conn, STORE_NAME)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM puns", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
