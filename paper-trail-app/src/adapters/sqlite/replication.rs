//! Row replication between the local database and a remote replica.
//!
//! Both sides share one schema with `sync_tombstones` fed by delete
//! triggers. Rows are matched by their `syncId`, not by their integer id.
//! A round copies the full state of each side onto the other: tombstones
//! first, then rows.
//!
//! - A row is written only if the target has no tombstone for it at least
//!   as new as the row, and only over an older `updatedAt` (last writer wins).
//! - A tombstone deletes the target row unless the row was updated after the
//!   delete.
//! - When pulling, a local row whose id is taken by a different remote row
//!   moves to a fresh id, and the rows referencing it follow.
//!
//! Every statement is idempotent, so a round that fails halfway is completed
//! by the next one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::types::{ExecuteResult, Row, SqlValue, SyncReport};

use super::schema::{self, ReplicatedTable, REPLICATED_TABLES};

/// One SQL statement with its positional parameters
pub type BatchStatement = (String, Vec<SqlValue>);

/// Statements sent per round trip
const BATCH_SIZE: usize = 200;

/// A database the local store replicates with
///
/// 平台实现:
/// - `HranaRemote`: libSQL server over HTTP
/// - `SqliteDatabase`: another local database file
#[async_trait]
pub trait RemoteDatabase: Send + Sync {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>>;

    /// Execute statements in order, stopping at the first failure
    async fn execute_batch(&self, statements: Vec<BatchStatement>)
        -> CoreResult<Vec<ExecuteResult>>;
}

/// Opens a `RemoteDatabase` for the configured endpoint
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, url: &str, auth_token: &str) -> CoreResult<Arc<dyn RemoteDatabase>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tombstone {
    table_name: String,
    sync_id: String,
    deleted_at: i64,
}

struct ReplicaState {
    tombstones: Vec<Tombstone>,
    rows: Vec<(&'static ReplicatedTable, Vec<Row>)>,
}

#[derive(Debug, Default)]
struct Applied {
    upserted: usize,
    deleted: usize,
}

#[derive(Clone, Copy)]
enum StatementKind {
    Rekey,
    Tombstone,
    Delete,
    Upsert,
}

/// One replication round; pull first, then push
pub(crate) async fn replicate(
    local: &dyn RemoteDatabase,
    remote: &dyn RemoteDatabase,
) -> CoreResult<SyncReport> {
    remote
        .execute_batch(
            schema::remote_statements()
                .into_iter()
                .map(|sql| (sql, Vec::new()))
                .collect(),
        )
        .await?;

    let remote_state = read_state(remote).await?;
    let local_state = read_state(local).await?;
    let rekeys = rekey_statements(&local_state, &remote_state)?;
    if !rekeys.is_empty() {
        log::info!("Moving local rows off {} colliding id(s)", rekeys.len());
    }
    let pulled = apply_state(local, rekeys, &remote_state).await?;
    log::debug!(
        "Pulled {} rows, {} deletes from remote",
        pulled.upserted,
        pulled.deleted
    );

    let local_state = read_state(local).await?;
    let pushed = apply_state(remote, Vec::new(), &local_state).await?;
    log::debug!(
        "Pushed {} rows, {} deletes to remote",
        pushed.upserted,
        pushed.deleted
    );

    Ok(SyncReport {
        pulled: pulled.upserted,
        pushed: pushed.upserted,
        deleted: pulled.deleted + pushed.deleted,
    })
}

async fn read_state(db: &dyn RemoteDatabase) -> CoreResult<ReplicaState> {
    let tombstones = db
        .query(
            "SELECT tableName, syncId, deletedAt FROM sync_tombstones",
            Vec::new(),
        )
        .await?
        .into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                CoreError::SerializationError(format!("Invalid tombstone row: {e}"))
            })
        })
        .collect::<CoreResult<Vec<Tombstone>>>()?;

    let mut rows = Vec::with_capacity(REPLICATED_TABLES.len());
    for table in &REPLICATED_TABLES {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id ASC",
            table.columns.join(", "),
            table.name
        );
        rows.push((table, db.query(&sql, Vec::new()).await?));
    }

    Ok(ReplicaState { tombstones, rows })
}

/// Integer id and `syncId` of a replicated row
fn identity(table: &ReplicatedTable, row: &Row) -> CoreResult<(i64, String)> {
    let id = row.get("id").and_then(serde_json::Value::as_i64).ok_or_else(|| {
        CoreError::SerializationError(format!("Row of {} without integer id", table.name))
    })?;
    let sync_id = row
        .get("syncId")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            CoreError::SerializationError(format!("Row {id} of {} without syncId", table.name))
        })?;
    Ok((id, sync_id.to_string()))
}

/// Statements moving `target` rows off ids that `source` uses for other rows
///
/// Each moved row gets an id above every id on either side; foreign keys
/// pointing at the old id are rewritten first.
fn rekey_statements(target: &ReplicaState, source: &ReplicaState) -> CoreResult<Vec<BatchStatement>> {
    let mut statements = Vec::new();

    for ((table, target_rows), (_, source_rows)) in target.rows.iter().zip(&source.rows) {
        let target_ids = target_rows
            .iter()
            .map(|row| identity(table, row))
            .collect::<CoreResult<HashMap<i64, String>>>()?;
        let source_ids = source_rows
            .iter()
            .map(|row| identity(table, row))
            .collect::<CoreResult<Vec<(i64, String)>>>()?;

        let mut next_id = target_ids
            .keys()
            .chain(source_ids.iter().map(|(id, _)| id))
            .max()
            .copied()
            .unwrap_or_default();

        for (id, sync_id) in &source_ids {
            let Some(local_sync_id) = target_ids.get(id) else {
                continue;
            };
            if local_sync_id == sync_id {
                continue;
            }

            next_id += 1;
            log::debug!("{} row {id} collides, moving it to {next_id}", table.name);
            for (child, column) in table.children {
                statements.push((
                    format!("UPDATE {child} SET {column} = ? WHERE {column} = ?"),
                    vec![next_id.into(), (*id).into()],
                ));
            }
            statements.push((
                format!("UPDATE {} SET id = ? WHERE syncId = ?", table.name),
                vec![next_id.into(), local_sync_id.as_str().into()],
            ));
        }
    }

    Ok(statements)
}

async fn apply_state(
    target: &dyn RemoteDatabase,
    rekeys: Vec<BatchStatement>,
    state: &ReplicaState,
) -> CoreResult<Applied> {
    let mut kinds = vec![StatementKind::Rekey; rekeys.len()];
    let mut statements = rekeys;

    for tombstone in &state.tombstones {
        // 表名来自对端数据，只接受已知表
        let Some(table) = REPLICATED_TABLES
            .iter()
            .find(|t| t.name == tombstone.table_name)
        else {
            log::warn!("Ignoring tombstone for unknown table {}", tombstone.table_name);
            continue;
        };
        statements.push(tombstone_statement(table, tombstone));
        kinds.push(StatementKind::Tombstone);
        statements.push(delete_statement(table, tombstone));
        kinds.push(StatementKind::Delete);
    }

    for (table, rows) in &state.rows {
        for row in rows {
            statements.push(upsert_statement(table, row)?);
            kinds.push(StatementKind::Upsert);
        }
    }

    let mut applied = Applied::default();
    for (chunk, chunk_kinds) in statements.chunks(BATCH_SIZE).zip(kinds.chunks(BATCH_SIZE)) {
        let results = target.execute_batch(chunk.to_vec()).await?;
        for (result, kind) in results.iter().zip(chunk_kinds) {
            let changed = usize::try_from(result.rows_affected).unwrap_or(usize::MAX);
            match kind {
                StatementKind::Tombstone => {}
                StatementKind::Delete => applied.deleted += changed,
                StatementKind::Upsert => applied.upserted += changed,
            }
        }
    }

    Ok(applied)
}

fn tombstone_statement(table: &ReplicatedTable, tombstone: &Tombstone) -> BatchStatement {
    (
        "INSERT INTO sync_tombstones (tableName, syncId, deletedAt) VALUES (?, ?, ?)
         ON CONFLICT(tableName, syncId) DO UPDATE SET deletedAt = excluded.deletedAt
         WHERE excluded.deletedAt > sync_tombstones.deletedAt"
            .to_string(),
        vec![
            table.name.into(),
            tombstone.sync_id.as_str().into(),
            tombstone.deleted_at.into(),
        ],
    )
}

fn delete_statement(table: &ReplicatedTable, tombstone: &Tombstone) -> BatchStatement {
    (
        format!("DELETE FROM {} WHERE syncId = ? AND updatedAt <= ?", table.name),
        vec![tombstone.sync_id.as_str().into(), tombstone.deleted_at.into()],
    )
}

fn upsert_statement(table: &ReplicatedTable, row: &Row) -> CoreResult<BatchStatement> {
    let (_, sync_id) = identity(table, row)?;
    let updated_at = row
        .get("updatedAt")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_default();

    let name = table.name;
    let columns = table.columns.join(", ");
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let assignments = table
        .columns
        .iter()
        .filter(|c| !matches!(**c, "id" | "syncId"))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO {name} ({columns})
         SELECT {placeholders}
         WHERE NOT EXISTS (
             SELECT 1 FROM sync_tombstones
             WHERE tableName = '{name}' AND syncId = ? AND deletedAt >= ?
         )
         ON CONFLICT(syncId) DO UPDATE SET {assignments}
         WHERE excluded.updatedAt > {name}.updatedAt"
    );

    let mut params: Vec<SqlValue> = table
        .columns
        .iter()
        .map(|c| row.get(*c).map_or(SqlValue::Null, SqlValue::from))
        .collect();
    params.push(sync_id.into());
    params.push(updated_at.into());

    Ok((sql, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: serde_json::Value) -> Row {
        let serde_json::Value::Object(row) = value else {
            unreachable!()
        };
        row
    }

    fn state(rows: [Vec<serde_json::Value>; 4]) -> ReplicaState {
        ReplicaState {
            tombstones: Vec::new(),
            rows: REPLICATED_TABLES
                .iter()
                .zip(rows)
                .map(|(table, rows)| (table, rows.into_iter().map(object).collect()))
                .collect(),
        }
    }

    #[test]
    fn upsert_binds_columns_then_guard() {
        let row = object(json!({
            "id": 7, "syncId": "ab12", "name": "Acme", "active": true, "customerId": null,
            "rate_in_cents": 100, "description": "x", "createdAt": 1, "updatedAt": 5
        }));

        let (sql, params) = upsert_statement(&REPLICATED_TABLES[0], &row).unwrap();
        assert!(sql.contains("ON CONFLICT(syncId) DO UPDATE SET name = excluded.name"));
        assert!(!sql.contains("id = excluded.id"));
        assert!(!sql.contains("syncId = excluded.syncId"));
        assert_eq!(params.len(), 11);
        assert_eq!(params[0], SqlValue::Integer(7));
        assert_eq!(params[1], SqlValue::Text("ab12".into()));
        assert_eq!(params[3], SqlValue::Integer(1));
        assert_eq!(params[4], SqlValue::Null);
        assert_eq!(params[9], SqlValue::Text("ab12".into()));
        assert_eq!(params[10], SqlValue::Integer(5));
    }

    #[test]
    fn row_without_identity_is_rejected() {
        assert!(upsert_statement(&REPLICATED_TABLES[1], &Row::new()).is_err());
        let row = object(json!({ "id": 3, "name": "March", "updatedAt": 1 }));
        assert!(upsert_statement(&REPLICATED_TABLES[1], &row).is_err());
    }

    #[test]
    fn colliding_local_row_moves_above_both_sides() {
        let local = state([
            vec![
                json!({ "id": 1, "syncId": "local-1" }),
                json!({ "id": 2, "syncId": "shared-2" }),
            ],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ]);
        let remote = state([
            vec![
                json!({ "id": 1, "syncId": "remote-1" }),
                json!({ "id": 2, "syncId": "shared-2" }),
                json!({ "id": 4, "syncId": "remote-4" }),
            ],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ]);

        let statements = rekey_statements(&local, &remote).unwrap();
        let sql: Vec<&str> = statements.iter().map(|(sql, _)| sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "UPDATE timesheets SET projectId = ? WHERE projectId = ?",
                "UPDATE transactions SET projectId = ? WHERE projectId = ?",
                "UPDATE projects SET id = ? WHERE syncId = ?",
            ]
        );
        assert_eq!(statements[0].1, vec![SqlValue::Integer(5), SqlValue::Integer(1)]);
        assert_eq!(
            statements[2].1,
            vec![SqlValue::Integer(5), SqlValue::Text("local-1".into())]
        );
    }

    #[test]
    fn matching_identities_need_no_rekey() {
        let rows = || {
            state([
                vec![json!({ "id": 1, "syncId": "same" })],
                vec![json!({ "id": 1, "syncId": "sheet" })],
                Vec::new(),
                Vec::new(),
            ])
        };
        assert!(rekey_statements(&rows(), &rows()).unwrap().is_empty());
    }
}
