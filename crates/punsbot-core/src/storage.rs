//! Connection plumbing shared by the SQLite stores.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{PunsError, PunsResult};

/// Open a file-backed connection, creating the parent directory if needed.
pub(crate) fn open_file(path: &Path, busy_timeout: Option<Duration>) -> PunsResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    if let Some(timeout) = busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    Ok(conn)
}

/// Lock a store connection, mapping poisoning to a storage error.
pub(crate) fn lock<'a>(
    conn: &'a Mutex<Connection>,
    store: &str,
) -> PunsResult<MutexGuard<'a, Connection>> {
    conn.lock().map_err(|_| PunsError::lock_poisoned(store))
}
