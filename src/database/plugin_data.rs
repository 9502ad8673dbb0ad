//! Opaque JSON blobs keyed by `(plugin_id, key)`
//!
//! Plugins own the shape of their values; the store only round-trips JSON.

use super::Database;
use crate::errors::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::Row;
use tracing::trace;

#[derive(Debug, Clone, Serialize)]
pub struct PluginDataEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Database {
    pub async fn get_plugin_data<T: DeserializeOwned>(
        &self,
        plugin_id: &str,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let row = sqlx::query("SELECT value FROM plugin_data WHERE plugin_id = ? AND key = ?")
            .bind(plugin_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::query_failed("select plugin_data", e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the blob stored under `key`
    pub async fn save_plugin_data<T: Serialize + ?Sized>(
        &self,
        plugin_id: &str,
        key: &str,
        value: &T,
    ) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO plugin_data (plugin_id, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(plugin_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(plugin_id)
        .bind(key)
        .bind(&raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::query_failed("upsert plugin_data", e.to_string()))?;

        trace!("Saved {} bytes for {}/{}", raw.len(), plugin_id, key);
        Ok(())
    }

    /// Returns whether a row was removed
    pub async fn delete_plugin_data(&self, plugin_id: &str, key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM plugin_data WHERE plugin_id = ? AND key = ?")
            .bind(plugin_id)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::query_failed("delete plugin_data", e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_plugin_data(&self, plugin_id: &str) -> StoreResult<Vec<PluginDataEntry>> {
        let rows = sqlx::query(
            "SELECT key, value, updated_at FROM plugin_data WHERE plugin_id = ? ORDER BY key",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::query_failed("list plugin_data", e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let raw: String = row.get("value");
                let updated_at: String = row.get("updated_at");
                Ok(PluginDataEntry {
                    key: row.get("key"),
                    value: serde_json::from_str(&raw)?,
                    updated_at: parse_timestamp(&updated_at),
                })
            })
            .collect()
    }
}
