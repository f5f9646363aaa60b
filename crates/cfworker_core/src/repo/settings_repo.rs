//! Key-value settings storage.
//!
//! Holds the current account selection, UI language, theme and the last-used
//! deploy form values. Values are opaque strings; callers own their format.

use crate::repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension};

/// Well-known setting keys.
pub mod keys {
    pub const CURRENT_ACCOUNT_ID: &str = "current_account_id";
    pub const LANGUAGE: &str = "language";
    pub const THEME: &str = "theme";
    pub const WORKER_FORM: &str = "worker_form";
    pub const BULK_FORM: &str = "bulk_form";
}

pub trait SettingsRepository {
    fn get_setting(&self, key: &str) -> RepoResult<Option<String>>;
    fn set_setting(&self, key: &str, value: &str) -> RepoResult<()>;
    /// Removing a missing key is a no-op.
    fn remove_setting(&self, key: &str) -> RepoResult<()>;
}

pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get_setting(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove_setting(&self, key: &str) -> RepoResult<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1;", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db_in_memory;

    #[test]
    fn set_overwrites_and_remove_is_idempotent() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteSettingsRepository::new(&conn);

        assert_eq!(repo.get_setting(keys::THEME).unwrap(), None);
        repo.set_setting(keys::THEME, "light").unwrap();
        repo.set_setting(keys::THEME, "dark").unwrap();
        assert_eq!(repo.get_setting(keys::THEME).unwrap().as_deref(), Some("dark"));

        repo.remove_setting(keys::THEME).unwrap();
        repo.remove_setting(keys::THEME).unwrap();
        assert_eq!(repo.get_setting(keys::THEME).unwrap(), None);
    }
}
