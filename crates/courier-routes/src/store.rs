use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, instrument};

use courier_core::{ChatId, MessageId};

use crate::db::init_db;
use crate::error::{Result, RouteError};
use crate::types::Route;

/// Lookup/insert directory from sent chat messages to engine sessions.
///
/// The pipeline consumes this to resolve a reply back into a resume token
/// and to make every outbound message resumable.
pub trait RouteStore: Send + Sync {
    /// Route linked to a previously sent message, or `None`.
    fn resolve(&self, chat_id: ChatId, message_id: MessageId) -> Result<Option<Route>>;

    /// Record the route for one outbound message. Re-linking the same
    /// message replaces the earlier route.
    fn link(&self, chat_id: ChatId, message_id: MessageId, route: &Route) -> Result<()>;
}

/// SQLite-backed route directory.
///
/// Wraps a single connection in a `Mutex`; route traffic is one row per
/// outbound message, far below where a pool would matter.
pub struct SqliteRouteStore {
    db: Mutex<Connection>,
}

impl SqliteRouteStore {
    /// Wrap an already-open connection, initialising the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }
}

impl RouteStore for SqliteRouteStore {
    #[instrument(skip(self), fields(chat_id, message_id))]
    fn resolve(&self, chat_id: ChatId, message_id: MessageId) -> Result<Option<Route>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT route_type, route_id, metadata
             FROM routes WHERE chat_id = ?1 AND message_id = ?2",
            rusqlite::params![chat_id, message_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        ) {
            Ok((route_type, route_id, metadata)) => {
                // Malformed metadata degrades to Null rather than failing
                // the lookup.
                let metadata = serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null);
                Ok(Some(Route {
                    route_type,
                    route_id,
                    metadata,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RouteError::Database(e)),
        }
    }

    #[instrument(skip(self, route), fields(chat_id, message_id, route_id = %route.route_id))]
    fn link(&self, chat_id: ChatId, message_id: MessageId, route: &Route) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let metadata = route.metadata.to_string();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO routes
             (chat_id, message_id, route_type, route_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                chat_id,
                message_id,
                route.route_type,
                route.route_id,
                metadata,
                now
            ],
        )?;
        debug!("route linked");
        Ok(())
    }
}
