use rusqlite::Connection;

use crate::error::CoreResult;

pub const STORE_SCHEMA_VERSION: &str = "1";

pub(super) fn configure_connection(connection: &Connection) -> CoreResult<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub(super) fn ensure_schema(connection: &Connection) -> CoreResult<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS runs (
          run_id TEXT PRIMARY KEY,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          score_names_json TEXT NOT NULL DEFAULT '[]',
          weights_json TEXT NOT NULL DEFAULT '{}',
          config_json TEXT
        );

        CREATE TABLE IF NOT EXISTS run_documents (
          run_id TEXT NOT NULL,
          topic_id INTEGER NOT NULL,
          position INTEGER NOT NULL,
          doc_id TEXT NOT NULL,
          PRIMARY KEY(run_id, topic_id, doc_id),
          FOREIGN KEY(run_id) REFERENCES runs(run_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS run_scores (
          run_id TEXT NOT NULL,
          topic_id INTEGER NOT NULL,
          doc_id TEXT NOT NULL,
          score_name TEXT NOT NULL,
          value REAL NOT NULL,
          PRIMARY KEY(run_id, topic_id, doc_id, score_name),
          FOREIGN KEY(run_id, topic_id, doc_id)
            REFERENCES run_documents(run_id, topic_id, doc_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS grid_searches (
          search_id TEXT PRIMARY KEY,
          run_id TEXT NOT NULL,
          created_at TEXT NOT NULL,
          settings_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS grid_points (
          search_id TEXT NOT NULL,
          point_index INTEGER NOT NULL,
          weights_json TEXT NOT NULL,
          result_json TEXT NOT NULL,
          PRIMARY KEY(search_id, point_index),
          FOREIGN KEY(search_id) REFERENCES grid_searches(search_id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_run_documents_order
          ON run_documents(run_id, topic_id, position);
        ",
    )?;

    connection.execute(
        "
        INSERT INTO metadata(key, value) VALUES('schema_version', ?1)
        ON CONFLICT(key) DO UPDATE SET value=excluded.value
        ",
        [STORE_SCHEMA_VERSION],
    )?;

    Ok(())
}
