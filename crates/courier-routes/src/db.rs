use rusqlite::Connection;

use crate::error::Result;

/// Initialise the routes table.
///
/// Idempotent: safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS routes (
            chat_id    INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            route_type TEXT NOT NULL,
            route_id   TEXT NOT NULL,
            metadata   TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            PRIMARY KEY (chat_id, message_id)
        );",
    )?;
    Ok(())
}
