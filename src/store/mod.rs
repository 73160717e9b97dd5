//! SQLite-backed persistence of scored runs and grid-search checkpoints.
//!
//! A run is stored as one row per document (`run_documents`) plus one row per
//! named score (`run_scores`). Scores are `REAL` columns, so every `f64`
//! round-trips bit for bit.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::model::{DocumentCandidate, RunMetadata, WeightVector};
use crate::util::now_utc_string;

mod grid;
mod schema;
#[cfg(test)]
mod tests;

pub use grid::GridSearchRecord;

pub const STORE_FILE_NAME: &str = "argrank.sqlite";

pub struct RankingStore {
    connection: Connection,
}

impl RankingStore {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> CoreResult<Self> {
        schema::configure_connection(&connection)?;
        schema::ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Replaces every document of `run_id` with `documents`.
    pub fn write(&mut self, run_id: &str, documents: &[DocumentCandidate]) -> CoreResult<()> {
        let score_names = validate_documents(run_id, documents)?;
        let tx = self.connection.transaction()?;

        upsert_run_row(&tx, run_id)?;
        tx.execute("DELETE FROM run_documents WHERE run_id = ?1", [run_id])?;
        insert_documents(&tx, run_id, documents)?;
        update_score_names(&tx, run_id, &score_names)?;

        tx.commit()?;
        info!(
            run_id,
            documents = documents.len(),
            scores = score_names.len(),
            "wrote run"
        );
        Ok(())
    }

    /// Replaces the topics present in `documents` and keeps all other topics.
    pub fn append(&mut self, run_id: &str, documents: &[DocumentCandidate]) -> CoreResult<()> {
        let score_names = validate_documents(run_id, documents)?;
        let topics = documents
            .iter()
            .map(|document| document.topic_id)
            .collect::<BTreeSet<u32>>();
        let tx = self.connection.transaction()?;

        upsert_run_row(&tx, run_id)?;
        for topic_id in &topics {
            tx.execute(
                "DELETE FROM run_documents WHERE run_id = ?1 AND topic_id = ?2",
                params![run_id, topic_id],
            )?;
        }

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM run_documents WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )?;
        if remaining > 0 && !documents.is_empty() {
            let stored = load_score_names(&tx, run_id)?;
            if stored != score_names {
                return Err(CoreError::Schema {
                    run_id: run_id.to_string(),
                    detail: format!(
                        "appended score keys {:?} differ from stored keys {:?}",
                        score_names, stored
                    ),
                });
            }
        }

        insert_documents(&tx, run_id, documents)?;
        if remaining == 0 || !documents.is_empty() {
            update_score_names(&tx, run_id, &score_names)?;
        }

        tx.commit()?;
        debug!(run_id, topics = topics.len(), documents = documents.len(), "appended to run");
        Ok(())
    }

    pub fn read(&self, run_id: &str) -> CoreResult<Vec<DocumentCandidate>> {
        self.ensure_run_exists(run_id)?;

        let mut statement = self.connection.prepare(
            "
            SELECT d.topic_id, d.doc_id, s.score_name, s.value
            FROM run_documents d
            LEFT JOIN run_scores s
              ON s.run_id = d.run_id
             AND s.topic_id = d.topic_id
             AND s.doc_id = d.doc_id
            WHERE d.run_id = ?1
            ORDER BY d.topic_id ASC, d.position ASC, s.score_name ASC
            ",
        )?;
        let mut rows = statement.query([run_id])?;

        let mut documents = Vec::<DocumentCandidate>::new();
        while let Some(row) = rows.next()? {
            let topic_id = row.get::<_, i64>(0)? as u32;
            let doc_id = row.get::<_, String>(1)?;
            let score_name = row.get::<_, Option<String>>(2)?;
            let value = row.get::<_, Option<f64>>(3)?;

            let is_same_document = documents
                .last()
                .map(|last| last.topic_id == topic_id && last.doc_id == doc_id)
                .unwrap_or(false);
            if !is_same_document {
                documents.push(DocumentCandidate::new(topic_id, doc_id));
            }

            if let (Some(name), Some(value), Some(document)) =
                (score_name, value, documents.last_mut())
            {
                document.scores.insert(name, value);
            }
        }

        validate_documents(run_id, &documents)?;
        Ok(documents)
    }

    /// Stores the weights and configuration the run was produced with.
    pub fn record_run_settings(
        &mut self,
        run_id: &str,
        weights: &WeightVector,
        config_json: Option<&str>,
    ) -> CoreResult<()> {
        let weights_json = serde_json::to_string(weights)
            .map_err(|err| CoreError::config(format!("unserializable weights: {err}")))?;
        let tx = self.connection.transaction()?;
        upsert_run_row(&tx, run_id)?;
        tx.execute(
            "UPDATE runs SET weights_json = ?2, config_json = ?3, updated_at = ?4 WHERE run_id = ?1",
            params![run_id, weights_json, config_json, now_utc_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn read_metadata(&self, run_id: &str) -> CoreResult<RunMetadata> {
        let row = self
            .connection
            .query_row(
                "
                SELECT
                  r.created_at,
                  r.updated_at,
                  r.score_names_json,
                  r.weights_json,
                  r.config_json,
                  (SELECT COUNT(DISTINCT topic_id) FROM run_documents d WHERE d.run_id = r.run_id),
                  (SELECT COUNT(*) FROM run_documents d WHERE d.run_id = r.run_id)
                FROM runs r
                WHERE r.run_id = ?1
                ",
                [run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)? as usize,
                        row.get::<_, i64>(6)? as usize,
                    ))
                },
            )
            .optional()?;

        let Some((created_at, updated_at, names_json, weights_json, config_json, topics, docs)) =
            row
        else {
            return Err(CoreError::not_found("run", run_id));
        };

        Ok(RunMetadata {
            run_id: run_id.to_string(),
            created_at,
            updated_at,
            score_names: parse_json_column(run_id, "score_names_json", &names_json)?,
            recorded_weights: parse_json_column(run_id, "weights_json", &weights_json)?,
            config_json,
            topic_count: topics,
            document_count: docs,
        })
    }

    pub fn list_runs(&self) -> CoreResult<Vec<RunMetadata>> {
        let mut statement = self
            .connection
            .prepare("SELECT run_id FROM runs ORDER BY run_id ASC")?;
        let run_ids = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;

        run_ids
            .iter()
            .map(|run_id| self.read_metadata(run_id))
            .collect()
    }

    pub fn delete(&mut self, run_id: &str) -> CoreResult<()> {
        let deleted = self
            .connection
            .execute("DELETE FROM runs WHERE run_id = ?1", [run_id])?;
        if deleted == 0 {
            return Err(CoreError::not_found("run", run_id));
        }
        info!(run_id, "deleted run");
        Ok(())
    }

    fn ensure_run_exists(&self, run_id: &str) -> CoreResult<()> {
        let exists = self
            .connection
            .query_row("SELECT 1 FROM runs WHERE run_id = ?1", [run_id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(CoreError::not_found("run", run_id))
        }
    }
}

/// Checks the uniform-schema invariant and returns the shared score names.
pub fn validate_documents(
    run_id: &str,
    documents: &[DocumentCandidate],
) -> CoreResult<BTreeSet<String>> {
    let Some(first) = documents.first() else {
        return Ok(BTreeSet::new());
    };
    let expected = first.score_names();
    let mut seen = BTreeSet::<(u32, &str)>::new();

    for document in documents {
        let schema_error = |detail: String| CoreError::Schema {
            run_id: run_id.to_string(),
            detail,
        };

        if !seen.insert((document.topic_id, document.doc_id.as_str())) {
            return Err(schema_error(format!(
                "document '{}' appears twice in topic {}",
                document.doc_id, document.topic_id
            )));
        }

        let names = document.score_names();
        if names != expected {
            return Err(schema_error(format!(
                "document '{}' (topic {}) has scores {:?}, expected {:?}",
                document.doc_id, document.topic_id, names, expected
            )));
        }

        if let Some((name, value)) = document.scores.iter().find(|(_, value)| !value.is_finite()) {
            return Err(schema_error(format!(
                "document '{}' (topic {}) has non-finite score {}={}",
                document.doc_id, document.topic_id, name, value
            )));
        }
    }

    Ok(expected)
}

fn upsert_run_row(tx: &Transaction<'_>, run_id: &str) -> CoreResult<()> {
    let now = now_utc_string();
    tx.execute(
        "
        INSERT INTO runs(run_id, created_at, updated_at)
        VALUES(?1, ?2, ?2)
        ON CONFLICT(run_id) DO UPDATE SET updated_at=excluded.updated_at
        ",
        params![run_id, now],
    )?;
    Ok(())
}

fn insert_documents(
    tx: &Transaction<'_>,
    run_id: &str,
    documents: &[DocumentCandidate],
) -> CoreResult<()> {
    let mut insert_document = tx.prepare(
        "INSERT INTO run_documents(run_id, topic_id, position, doc_id) VALUES(?1, ?2, ?3, ?4)",
    )?;
    let mut insert_score = tx.prepare(
        "
        INSERT INTO run_scores(run_id, topic_id, doc_id, score_name, value)
        VALUES(?1, ?2, ?3, ?4, ?5)
        ",
    )?;

    let mut positions = BTreeMap::<u32, i64>::new();
    for document in documents {
        let position = positions.entry(document.topic_id).or_insert(0);
        insert_document.execute(params![
            run_id,
            document.topic_id,
            *position,
            document.doc_id
        ])?;
        *position += 1;

        for (name, value) in &document.scores {
            insert_score.execute(params![run_id, document.topic_id, document.doc_id, name, value])?;
        }
    }

    Ok(())
}

fn update_score_names(
    tx: &Transaction<'_>,
    run_id: &str,
    score_names: &BTreeSet<String>,
) -> CoreResult<()> {
    let names_json = serde_json::to_string(score_names)
        .map_err(|err| CoreError::config(format!("unserializable score names: {err}")))?;
    tx.execute(
        "UPDATE runs SET score_names_json = ?2 WHERE run_id = ?1",
        params![run_id, names_json],
    )?;
    Ok(())
}

fn load_score_names(tx: &Transaction<'_>, run_id: &str) -> CoreResult<BTreeSet<String>> {
    let raw: String = tx.query_row(
        "SELECT score_names_json FROM runs WHERE run_id = ?1",
        [run_id],
        |row| row.get(0),
    )?;
    parse_json_column(run_id, "score_names_json", &raw)
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    run_id: &str,
    column: &str,
    raw: &str,
) -> CoreResult<T> {
    serde_json::from_str(raw).map_err(|err| CoreError::Schema {
        run_id: run_id.to_string(),
        detail: format!("corrupt {column}: {err}"),
    })
}
