//! Settings database access
//!
//! Key/value settings shared by the whole service.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

/// Key recording the dataset version seen at the last startup
pub const DATASET_VERSION_KEY: &str = "dataset_version";

/// Generic setting getter
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (insert or update)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

/// Record the dataset version; returns the previously recorded one if it differs
pub async fn record_dataset_version(db: &Pool<Sqlite>, version: &str) -> Result<Option<String>> {
    let previous: Option<String> = get_setting(db, DATASET_VERSION_KEY).await?;
    if previous.as_deref() == Some(version) {
        return Ok(None);
    }

    set_setting(db, DATASET_VERSION_KEY, version).await?;
    match &previous {
        Some(old) => info!("Dataset updated from version {} to {}", old, version),
        None => info!("Dataset version {}", version),
    }
    Ok(previous)
}
