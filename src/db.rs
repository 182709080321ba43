// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePool, Sqlite};

use crate::models::{Currency, RateTable};

/// Number of snapshots kept after each save.
const SNAPSHOTS_KEPT: i64 = 10;

pub async fn create_db_pool(db_url: &str) -> Result<SqlitePool> {
    // Create database if it doesn't exist
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        Sqlite::create_database(db_url).await?;
    }

    // Connect to the database
    let pool = SqlitePool::connect(db_url).await?;

    // Run migrations
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// Store a rate table as the newest snapshot
pub async fn save_snapshot(pool: &SqlitePool, table: &RateTable) -> Result<()> {
    let mut tx = pool.begin().await?;

    let snapshot_id = sqlx::query(
        r#"
        INSERT INTO rate_snapshots (base, rate_date, fetched_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(table.base())
    .bind(table.rate_date())
    .bind(table.fetched_at().timestamp_millis())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for currency in table.iter() {
        sqlx::query(
            r#"
            INSERT INTO snapshot_rates (snapshot_id, code, name, rate)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(snapshot_id)
        .bind(&currency.code)
        .bind(&currency.name)
        .bind(currency.rate)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        DELETE FROM snapshot_rates
        WHERE snapshot_id NOT IN (
            SELECT id FROM rate_snapshots ORDER BY fetched_at DESC, id DESC LIMIT ?
        )
        "#,
    )
    .bind(SNAPSHOTS_KEPT)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM rate_snapshots
        WHERE id NOT IN (
            SELECT id FROM rate_snapshots ORDER BY fetched_at DESC, id DESC LIMIT ?
        )
        "#,
    )
    .bind(SNAPSHOTS_KEPT)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Load the most recently fetched snapshot, if any
pub async fn load_latest_snapshot(pool: &SqlitePool) -> Result<Option<RateTable>> {
    let header = sqlx::query_as::<_, (i64, String, String, i64)>(
        r#"
        SELECT id, base, rate_date, fetched_at
        FROM rate_snapshots
        ORDER BY fetched_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let Some((id, base, rate_date, fetched_at)) = header else {
        return Ok(None);
    };

    let rates = sqlx::query_as::<_, (String, String, f64)>(
        r#"
        SELECT code, name, rate
        FROM snapshot_rates
        WHERE snapshot_id = ?
        ORDER BY code
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let fetched_at = Utc
        .timestamp_millis_opt(fetched_at)
        .single()
        .context("Invalid snapshot timestamp")?;
    let currencies = rates
        .into_iter()
        .map(|(code, name, rate)| Currency::new(code, name, rate));

    Ok(Some(RateTable::new(base, rate_date, fetched_at, currencies)))
}

#[cfg(test)]
pub async fn create_test_pool() -> Result<SqlitePool> {
    // A single connection, every new in-memory connection is a fresh database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_table;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_empty_database_has_no_snapshot() -> Result<()> {
        let pool = create_test_pool().await?;
        assert!(load_latest_snapshot(&pool).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() -> Result<()> {
        let pool = create_test_pool().await?;
        let table = sample_table();

        save_snapshot(&pool, &table).await?;
        let loaded = load_latest_snapshot(&pool).await?.unwrap();

        assert_eq!(loaded.base(), "USD");
        assert_eq!(loaded.rate_date(), "2024-05-10");
        assert_eq!(loaded.len(), table.len());
        assert_eq!(
            loaded.fetched_at().timestamp_millis(),
            table.fetched_at().timestamp_millis()
        );
        assert_relative_eq!(loaded.rate("JPY").unwrap(), 155.0);
        assert_eq!(loaded.get("GBP").unwrap().name, "British Pound");

        Ok(())
    }

    #[tokio::test]
    async fn test_latest_snapshot_wins_and_old_ones_are_pruned() -> Result<()> {
        let pool = create_test_pool().await?;
        let start = Utc::now();

        for day in 0..(SNAPSHOTS_KEPT + 3) {
            let table = RateTable::new(
                "USD",
                format!("day-{}", day),
                start + chrono::Duration::days(day),
                vec![Currency::new("EUR", "Euro", 0.9)],
            );
            save_snapshot(&pool, &table).await?;
        }

        let latest = load_latest_snapshot(&pool).await?.unwrap();
        assert_eq!(latest.rate_date(), format!("day-{}", SNAPSHOTS_KEPT + 2));

        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM rate_snapshots")
            .fetch_one(&pool)
            .await?;
        assert_eq!(count, SNAPSHOTS_KEPT);

        let (orphans,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM snapshot_rates WHERE snapshot_id NOT IN (SELECT id FROM rate_snapshots)",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(orphans, 0);

        Ok(())
    }
}
