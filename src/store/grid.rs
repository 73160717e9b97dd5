use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::RankingStore;
use crate::error::{CoreError, CoreResult};
use crate::gridsearch::GridRow;
use crate::util::now_utc_string;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSearchRecord {
    pub search_id: String,
    pub run_id: String,
    pub created_at: String,
    pub settings_json: String,
}

impl RankingStore {
    /// Registers a search, or confirms that an existing one was started with
    /// identical settings so its checkpoints can be reused.
    pub fn begin_grid_search(
        &mut self,
        search_id: &str,
        run_id: &str,
        settings_json: &str,
    ) -> CoreResult<GridSearchRecord> {
        if let Some(existing) = self.grid_search(search_id)? {
            if existing.run_id != run_id || existing.settings_json != settings_json {
                return Err(CoreError::config(format!(
                    "grid search '{search_id}' exists with different settings; restart it to overwrite"
                )));
            }
            return Ok(existing);
        }

        let created_at = now_utc_string();
        self.connection.execute(
            "
            INSERT INTO grid_searches(search_id, run_id, created_at, settings_json)
            VALUES(?1, ?2, ?3, ?4)
            ",
            params![search_id, run_id, created_at, settings_json],
        )?;
        info!(search_id, run_id, "registered grid search");

        Ok(GridSearchRecord {
            search_id: search_id.to_string(),
            run_id: run_id.to_string(),
            created_at,
            settings_json: settings_json.to_string(),
        })
    }

    pub fn grid_search(&self, search_id: &str) -> CoreResult<Option<GridSearchRecord>> {
        let record = self
            .connection
            .query_row(
                "
                SELECT search_id, run_id, created_at, settings_json
                FROM grid_searches
                WHERE search_id = ?1
                ",
                [search_id],
                |row| {
                    Ok(GridSearchRecord {
                        search_id: row.get(0)?,
                        run_id: row.get(1)?,
                        created_at: row.get(2)?,
                        settings_json: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn clear_grid_search(&mut self, search_id: &str) -> CoreResult<()> {
        let tx = self.connection.transaction()?;
        tx.execute("DELETE FROM grid_points WHERE search_id = ?1", [search_id])?;
        tx.execute("DELETE FROM grid_searches WHERE search_id = ?1", [search_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn record_grid_point(&mut self, search_id: &str, row: &GridRow) -> CoreResult<()> {
        let weights_json = to_json(&row.weights)?;
        let result_json = to_json(&row.result)?;
        self.connection.execute(
            "
            INSERT INTO grid_points(search_id, point_index, weights_json, result_json)
            VALUES(?1, ?2, ?3, ?4)
            ON CONFLICT(search_id, point_index) DO UPDATE SET
              weights_json=excluded.weights_json,
              result_json=excluded.result_json
            ",
            params![search_id, row.index as i64, weights_json, result_json],
        )?;
        debug!(search_id, index = row.index, "checkpointed grid point");
        Ok(())
    }

    /// Checkpointed rows in enumeration order.
    pub fn grid_points(&self, search_id: &str) -> CoreResult<Vec<GridRow>> {
        let mut statement = self.connection.prepare(
            "
            SELECT point_index, weights_json, result_json
            FROM grid_points
            WHERE search_id = ?1
            ORDER BY point_index ASC
            ",
        )?;
        let mut rows = statement.query([search_id])?;

        let mut out = Vec::<GridRow>::new();
        while let Some(row) = rows.next()? {
            let index = row.get::<_, i64>(0)? as usize;
            let weights_json = row.get::<_, String>(1)?;
            let result_json = row.get::<_, String>(2)?;
            out.push(GridRow {
                index,
                weights: from_json(search_id, index, &weights_json)?,
                result: from_json(search_id, index, &result_json)?,
            });
        }

        Ok(out)
    }
}

fn to_json<T: Serialize>(value: &T) -> CoreResult<String> {
    serde_json::to_string(value)
        .map_err(|err| CoreError::config(format!("unserializable grid point: {err}")))
}

fn from_json<T: serde::de::DeserializeOwned>(
    search_id: &str,
    index: usize,
    raw: &str,
) -> CoreResult<T> {
    serde_json::from_str(raw).map_err(|err| {
        CoreError::parse(format!("grid search '{search_id}'"), index, err.to_string())
    })
}
