//! Ordered schema steps for the task database.
//!
//! # Invariants
//! - Versions start at 1 and increase by one per step.
//! - All pending steps run in a single transaction.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "task_documents_and_snapshots",
    sql: include_str!("0001_init.sql"),
}];

pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Versions newer than `current`, oldest first.
pub fn pending_versions(current: u32) -> Vec<u32> {
    MIGRATIONS
        .iter()
        .map(|step| step.version)
        .filter(|version| *version > current)
        .collect()
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is ahead of this build.
/// - `Migration` naming the first step that failed; nothing is applied then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = current_user_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        debug!("event=db_migrate module=db status=noop version={from}");
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in pending {
        let failed = |source: rusqlite::Error| DbError::Migration {
            version: step.version,
            name: step.name,
            source,
        };
        tx.execute_batch(step.sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", step.version)
            .map_err(failed)?;
        debug!(
            "event=db_migrate_step module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from={from} to={latest}");
    Ok(())
}

pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}

#[cfg(test)]
mod tests {
    use super::{latest_version, pending_versions, MIGRATIONS};

    #[test]
    fn versions_are_contiguous_from_one() {
        for (index, step) in MIGRATIONS.iter().enumerate() {
            assert_eq!(step.version as usize, index + 1, "step {}", step.name);
        }
        assert_eq!(pending_versions(0).len() as u32, latest_version());
        assert!(pending_versions(latest_version()).is_empty());
    }
}
