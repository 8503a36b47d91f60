//! Object-details store: an optional adapter the engine wraps around
//! `store_new_version` and `commit_mutable_head` so that a database row
//! becomes visible in the same transaction as the filesystem change.

use crate::error::Result;
use crate::types::ObjectVersionDetails;

/// A transactional store of object version details, kept in sync with
/// the repository's own storage by the engine's two-phase commits.
pub trait ObjectDetailsStore {
    /// Opens a transaction scoped to committing `object_id`'s new state.
    /// The engine records the version via `record_version` and then
    /// either `commit`s (filesystem change succeeded) or `rollback`s
    /// (filesystem change failed or was rolled back itself).
    fn begin(&self) -> Result<Box<dyn ObjectDetailsTransaction + '_>>;

    /// Returns the most recently recorded details for `object_id`, if any.
    fn get(&self, object_id: &str) -> Result<Option<ObjectVersionDetails>>;

    /// Removes every recorded version for `object_id`. Called by
    /// `purge_object`/`purge_mutable_head`.
    fn delete(&self, object_id: &str) -> Result<()>;
}

pub trait ObjectDetailsTransaction {
    fn record_version(&mut self, details: &ObjectVersionDetails) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(feature = "rusqlite")]
pub use sqlite::SqliteObjectDetailsStore;

#[cfg(feature = "rusqlite")]
mod sqlite {
    use std::sync::Mutex;

    use chrono::{DateTime, Local, TimeZone};
    use rusqlite::{params, Connection, OptionalExtension};

    use super::{ObjectDetailsStore, ObjectDetailsTransaction};
    use crate::digest::DigestAlgorithm;
    use crate::error::Result;
    use crate::types::{ObjectVersionDetails, VersionDetails, VersionNum};

    const SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS object_versions (
            object_id        TEXT PRIMARY KEY,
            object_root      TEXT NOT NULL,
            digest_algorithm TEXT NOT NULL,
            version_num      TEXT NOT NULL,
            created          TEXT NOT NULL,
            user_name        TEXT,
            user_address     TEXT,
            message          TEXT
        )";

    /// An `ObjectDetailsStore` backed by a single-file SQLite database,
    /// guarded by a `Mutex` since `rusqlite::Connection` is not `Sync`.
    pub struct SqliteObjectDetailsStore {
        conn: Mutex<Connection>,
    }

    impl SqliteObjectDetailsStore {
        pub fn new(conn: Connection) -> Result<Self> {
            conn.execute(SCHEMA, [])?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
            Self::new(Connection::open(path)?)
        }
    }

    impl ObjectDetailsStore for SqliteObjectDetailsStore {
        fn begin(&self) -> Result<Box<dyn ObjectDetailsTransaction + '_>> {
            let guard = self.conn.lock().unwrap();
            // SAFETY-free approach: rusqlite transactions borrow the
            // connection, so the handle holds the mutex guard for its
            // entire lifetime rather than a short-lived `Transaction`.
            guard.execute_batch("BEGIN")?;
            Ok(Box::new(SqliteTransaction {
                guard: Some(guard),
                finished: false,
            }))
        }

        fn get(&self, object_id: &str) -> Result<Option<ObjectVersionDetails>> {
            let conn = self.conn.lock().unwrap();
            let row = conn
                .query_row(
                    "SELECT object_root, digest_algorithm, version_num, created, user_name, user_address, message \
                     FROM object_versions WHERE object_id = ?1",
                    params![object_id],
                    |row| {
                        let object_root: String = row.get(0)?;
                        let digest_algorithm: String = row.get(1)?;
                        let version_num: String = row.get(2)?;
                        let created: String = row.get(3)?;
                        let user_name: Option<String> = row.get(4)?;
                        let user_address: Option<String> = row.get(5)?;
                        let message: Option<String> = row.get(6)?;
                        Ok((
                            object_root,
                            digest_algorithm,
                            version_num,
                            created,
                            user_name,
                            user_address,
                            message,
                        ))
                    },
                )
                .optional()?;

            Ok(match row {
                None => None,
                Some((object_root, digest_algorithm, version_num, created, user_name, user_address, message)) => {
                    Some(ObjectVersionDetails {
                        id: object_id.to_string(),
                        object_root,
                        digest_algorithm: digest_algorithm
                            .parse()
                            .map_err(|e: strum::ParseError| crate::error::OcflError::IllegalArgument(e.to_string()))?,
                        version_details: VersionDetails {
                            version_num: version_num.parse().map_err(|_| {
                                crate::error::OcflError::Corrupt {
                                    object_id: object_id.to_string(),
                                    message: format!("Invalid version number stored: {}", version_num),
                                }
                            })?,
                            created: parse_timestamp(&created)?,
                            user_name,
                            user_address,
                            message,
                        },
                    })
                }
            })
        }

        fn delete(&self, object_id: &str) -> Result<()> {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM object_versions WHERE object_id = ?1", params![object_id])?;
            Ok(())
        }
    }

    fn parse_timestamp(value: &str) -> Result<DateTime<Local>> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|e| crate::error::OcflError::General(format!("Invalid timestamp stored: {} ({})", value, e)))?;
        Ok(Local.from_utc_datetime(&parsed.naive_utc()))
    }

    struct SqliteTransaction<'a> {
        guard: Option<std::sync::MutexGuard<'a, Connection>>,
        finished: bool,
    }

    impl<'a> ObjectDetailsTransaction for SqliteTransaction<'a> {
        fn record_version(&mut self, details: &ObjectVersionDetails) -> Result<()> {
            let conn = self.guard.as_ref().unwrap();
            conn.execute(
                "INSERT INTO object_versions \
                 (object_id, object_root, digest_algorithm, version_num, created, user_name, user_address, message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(object_id) DO UPDATE SET \
                 object_root = excluded.object_root, digest_algorithm = excluded.digest_algorithm, \
                 version_num = excluded.version_num, created = excluded.created, \
                 user_name = excluded.user_name, user_address = excluded.user_address, message = excluded.message",
                params![
                    details.id,
                    details.object_root,
                    details.digest_algorithm.to_string(),
                    details.version_details.version_num.to_string(),
                    details.version_details.created.to_rfc3339(),
                    details.version_details.user_name,
                    details.version_details.user_address,
                    details.version_details.message,
                ],
            )?;
            Ok(())
        }

        fn commit(mut self: Box<Self>) -> Result<()> {
            let guard = self.guard.take().unwrap();
            guard.execute_batch("COMMIT")?;
            self.finished = true;
            Ok(())
        }

        fn rollback(mut self: Box<Self>) -> Result<()> {
            let guard = self.guard.take().unwrap();
            guard.execute_batch("ROLLBACK")?;
            self.finished = true;
            Ok(())
        }
    }

    impl<'a> Drop for SqliteTransaction<'a> {
        fn drop(&mut self) {
            if !self.finished {
                if let Some(guard) = self.guard.take() {
                    let _ = guard.execute_batch("ROLLBACK");
                }
            }
        }
    }

}
