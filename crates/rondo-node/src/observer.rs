//! Topology observer: a fire-and-forget sink for (node, successor)
//! pairs, so something outside the ring can watch its shape.
//!
//! Observer failures are logged and swallowed; nothing here may ever
//! affect ring operations.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::{debug, warn};

/// Sink for successor-pointer changes.
///
/// `save` fires once when the node starts, `update` on every change
/// to the successor pointer, `delete` when the node stops. Methods
/// are blocking; the node invokes them off the async runtime.
pub trait TopologyObserver: Send + Sync {
    /// Record a new node and its successor.
    fn save(&self, node: &str, successor: &str);
    /// Record a successor change for an existing node.
    fn update(&self, node: &str, successor: &str);
    /// Remove the node's record.
    fn delete(&self, node: &str);
}

/// Observer that records nothing.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl TopologyObserver for NoopObserver {
    fn save(&self, _node: &str, _successor: &str) {}
    fn update(&self, _node: &str, _successor: &str) {}
    fn delete(&self, _node: &str) {}
}

/// Observer backed by a single-table sqlite log:
/// `chord(self TEXT PRIMARY KEY, successor TEXT)`.
pub struct SqliteObserver {
    conn: Mutex<Connection>,
}

impl SqliteObserver {
    /// Open (or create) the database at `path` and ensure the table
    /// exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chord (self TEXT PRIMARY KEY, successor TEXT)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn exec(&self, sql: &str, args: [&str; 2]) -> Result<usize, rusqlite::Error> {
        let conn = self.conn.lock().expect("observer lock poisoned");
        conn.execute(sql, params![args[0], args[1]])
    }

    /// Read back every recorded (node, successor) row, ordered by
    /// node address.
    pub fn rows(&self) -> Result<Vec<(String, String)>, rusqlite::Error> {
        let conn = self.conn.lock().expect("observer lock poisoned");
        let mut stmt = conn.prepare("SELECT self, successor FROM chord ORDER BY self")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }
}

impl TopologyObserver for SqliteObserver {
    fn save(&self, node: &str, successor: &str) {
        let upsert = "INSERT INTO chord (self, successor) VALUES (?1, ?2) \
                      ON CONFLICT(self) DO UPDATE SET successor = excluded.successor";
        if let Err(e) = self.exec(upsert, [node, successor]) {
            warn!(node, error = %e, "topology observer save failed");
        } else {
            debug!(node, successor, "topology recorded");
        }
    }

    fn update(&self, node: &str, successor: &str) {
        let sql = "UPDATE chord SET successor = ?1 WHERE self = ?2";
        if let Err(e) = self.exec(sql, [successor, node]) {
            warn!(node, error = %e, "topology observer update failed");
        }
    }

    fn delete(&self, node: &str) {
        let conn = self.conn.lock().expect("observer lock poisoned");
        if let Err(e) = conn.execute("DELETE FROM chord WHERE self = ?1", params![node]) {
            warn!(node, error = %e, "topology observer delete failed");
        }
    }
}
