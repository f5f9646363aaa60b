//! Bulk deployment history storage.
//!
//! # Invariants
//! - At most `MAX_HISTORY_RECORDS` records are kept; appending drops the oldest.
//! - Lists are newest first (by insertion sequence, not wall clock).

use crate::model::deploy::DeploymentRecord;
use crate::repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Retention cap for bulk deployment history.
pub const MAX_HISTORY_RECORDS: usize = 50;
/// Page size used by history listings.
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 10;

/// One page of history records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub records: Vec<DeploymentRecord>,
    /// 1-based page number actually served.
    pub page: u32,
    pub page_size: u32,
    pub total: usize,
}

impl HistoryPage {
    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        (self.total as u32).div_ceil(self.page_size)
    }
}

pub trait HistoryRepository {
    fn append_record(&self, record: &DeploymentRecord) -> RepoResult<()>;
    /// `page` is 1-based; `0` is treated as `1`.
    fn list_records(&self, page: u32, page_size: u32) -> RepoResult<HistoryPage>;
    fn get_record(&self, id: Uuid) -> RepoResult<Option<DeploymentRecord>>;
    fn count_records(&self) -> RepoResult<usize>;
    fn clear_history(&self) -> RepoResult<usize>;
}

pub struct SqliteHistoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHistoryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl HistoryRepository for SqliteHistoryRepository<'_> {
    fn append_record(&self, record: &DeploymentRecord) -> RepoResult<()> {
        let payload = serde_json::to_string(record)?;
        let tx = self.conn.unchecked_transaction()?;

        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM deployment_history;",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO deployment_history (
                id,
                started_at,
                worker_name_base,
                total_accounts,
                success_count,
                error_count,
                payload,
                seq
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                record.id.to_string(),
                record.timestamp,
                record.worker_name_base.as_str(),
                record.total_accounts as i64,
                record.success_count as i64,
                record.error_count as i64,
                payload,
                next_seq,
            ],
        )?;
        tx.execute(
            "DELETE FROM deployment_history
             WHERE id NOT IN (
                SELECT id FROM deployment_history ORDER BY seq DESC LIMIT ?1
             );",
            [MAX_HISTORY_RECORDS as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list_records(&self, page: u32, page_size: u32) -> RepoResult<HistoryPage> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = self.count_records()?;

        let mut stmt = self.conn.prepare(
            "SELECT payload FROM deployment_history
             ORDER BY seq DESC
             LIMIT ?1 OFFSET ?2;",
        )?;
        let offset = i64::from(page - 1) * i64::from(page_size);
        let mut rows = stmt.query(params![i64::from(page_size), offset])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            records.push(parse_payload(&payload)?);
        }

        Ok(HistoryPage {
            records,
            page,
            page_size,
            total,
        })
    }

    fn get_record(&self, id: Uuid) -> RepoResult<Option<DeploymentRecord>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM deployment_history WHERE id = ?1;",
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        payload.as_deref().map(parse_payload).transpose()
    }

    fn count_records(&self) -> RepoResult<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM deployment_history;", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    fn clear_history(&self) -> RepoResult<usize> {
        Ok(self.conn.execute("DELETE FROM deployment_history;", [])?)
    }
}

fn parse_payload(payload: &str) -> RepoResult<DeploymentRecord> {
    serde_json::from_str(payload).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid record json in deployment_history.payload: {err}"
        ))
    })
}
