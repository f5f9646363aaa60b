//! Schema steps for the account store.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` always equals the last applied step.
//! - Pending steps are applied together or not at all.

use crate::db::{DbError, DbResult};
use log::{debug, error, info};
use rusqlite::{Connection, Transaction};

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "accounts",
        sql: include_str!("0001_accounts.sql"),
    },
    Step {
        version: 2,
        name: "settings",
        sql: include_str!("0002_settings.sql"),
    },
    Step {
        version: 3,
        name: "deployment_history",
        sql: include_str!("0003_deployment_history.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

/// Schema version recorded in the database file.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings the schema up to [`latest_version`].
///
/// Refuses files written by a newer build instead of guessing at their layout.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = schema_version(conn)?;
    let to = latest_version();
    if from > to {
        error!("event=db_migrate module=db status=error from={from} to={to} error_code=newer_schema");
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: to,
        });
    }
    if from == to {
        debug!("event=db_migrate module=db status=skip version={to}");
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in STEPS.iter().filter(|step| step.version > from) {
        run_step(&tx, step)?;
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from={from} to={to}");
    Ok(())
}

fn run_step(tx: &Transaction<'_>, step: &Step) -> DbResult<()> {
    debug!(
        "event=db_migrate_step module=db status=start version={} name={}",
        step.version, step.name
    );
    tx.execute_batch(step.sql)
        .and_then(|()| tx.pragma_update(None, "user_version", step.version))
        .map_err(|source| DbError::MigrationFailed {
            version: step.version,
            name: step.name,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_versions_are_contiguous() {
        for (index, step) in STEPS.iter().enumerate() {
            assert_eq!(step.version, index as u32 + 1, "step `{}`", step.name);
        }
    }

    #[test]
    fn partially_migrated_database_is_completed() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(STEPS[0].sql).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        apply_migrations(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn failing_step_is_named_and_rolled_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        // Occupy the history table name with a view so step 3 fails.
        conn.execute_batch("CREATE VIEW deployment_history AS SELECT 1 AS x;")
            .unwrap();

        let err = apply_migrations(&mut conn).unwrap_err();
        match err {
            DbError::MigrationFailed { version, name, .. } => {
                assert_eq!(version, 3);
                assert_eq!(name, "deployment_history");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(schema_version(&conn).unwrap(), 0);
    }
}
