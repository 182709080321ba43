// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::Utc;
use csv::Writer;
use sqlx::sqlite::SqlitePool;
use std::path::Path;
use tracing::warn;

use crate::api::RateSource;
use crate::db;
use crate::models::RateTable;
use crate::refresh::is_stale;

/// Fetch the latest rates and cache them in the database
pub async fn update_exchange_rates(
    source: &dyn RateSource,
    pool: Option<&SqlitePool>,
) -> Result<RateTable> {
    println!("Fetching current exchange rates...");
    let table = source
        .fetch()
        .await
        .context("Failed to fetch exchange rates")?;
    println!("✅ Exchange rates fetched ({} currencies)", table.len());

    if let Some(pool) = pool {
        if let Err(e) = db::save_snapshot(pool, &table).await {
            warn!(error = %e, "failed to cache rate snapshot");
        }
    }

    Ok(table)
}

/// Rates for one-shot commands: a fresh cached snapshot, otherwise a fetch,
/// otherwise whatever the cache holds.
pub async fn current_rates(
    source: &dyn RateSource,
    pool: Option<&SqlitePool>,
    update_interval: chrono::Duration,
) -> Result<RateTable> {
    let cached = match pool {
        Some(pool) => db::load_latest_snapshot(pool).await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to read cached rates");
            None
        }),
        None => None,
    };

    if let Some(table) = &cached {
        if !is_stale(Some(table), Utc::now(), update_interval) {
            return Ok(table.clone());
        }
    }

    match update_exchange_rates(source, pool).await {
        Ok(table) => Ok(table),
        Err(e) => match cached {
            Some(table) => {
                eprintln!("⚠️  {:#}, using cached {}", e, table.title().to_lowercase());
                Ok(table)
            }
            None => Err(e),
        },
    }
}

/// Print the rate table
pub fn print_rates(table: &RateTable) {
    println!("{} (base {})", table.title(), table.base());
    for currency in table.iter() {
        println!("  {:<4} {:>16.6}  {}", currency.code, currency.rate, currency.name);
    }
}

/// Export the rate table to CSV
pub fn export_rates_csv(table: &RateTable, path: &Path) -> Result<()> {
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(["Code", "Name", "Rate", "Base", "Date"])?;
    for currency in table.iter() {
        writer.write_record([
            currency.code.as_str(),
            currency.name.as_str(),
            currency.rate.to_string().as_str(),
            table.base(),
            table.rate_date(),
        ])?;
    }

    writer.flush()?;
    println!("✅ Exchange rates written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchError;
    use crate::models::{sample_table, Currency};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RateSource for CountingSource {
        async fn fetch(&self) -> Result<RateTable, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                let err = serde_json::from_str::<serde_json::Value>("").unwrap_err();
                return Err(FetchError::Parse(err));
            }
            Ok(RateTable::new(
                "USD",
                "fetched",
                Utc::now(),
                vec![Currency::new("EUR", "Euro", 0.9)],
            ))
        }
    }

    fn source(fail: bool) -> CountingSource {
        CountingSource {
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    #[test]
    fn test_export_rates_csv() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rates.csv");

        export_rates_csv(&sample_table(), &path)?;

        let mut reader = csv::Reader::from_path(&path)?;
        let headers = reader.headers()?.clone();
        assert_eq!(&headers[0], "Code");
        let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "EUR");
        assert_eq!(&rows[0][2], "0.9");
        assert_eq!(&rows[0][3], "USD");

        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() -> Result<()> {
        let pool = db::create_test_pool().await?;
        db::save_snapshot(&pool, &sample_table()).await?;
        let source = source(false);

        let table = current_rates(&source, Some(&pool), chrono::Duration::hours(1)).await?;

        assert_eq!(table.rate_date(), "2024-05-10");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_cache_fetches_and_stores() -> Result<()> {
        let pool = db::create_test_pool().await?;
        let old = RateTable::new(
            "USD",
            "old",
            Utc::now() - chrono::Duration::hours(3),
            vec![Currency::new("EUR", "Euro", 0.8)],
        );
        db::save_snapshot(&pool, &old).await?;
        let source = source(false);

        let table = current_rates(&source, Some(&pool), chrono::Duration::hours(1)).await?;

        assert_eq!(table.rate_date(), "fetched");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let cached = db::load_latest_snapshot(&pool).await?.unwrap();
        assert_eq!(cached.rate_date(), "fetched");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_stale_cache() -> Result<()> {
        let pool = db::create_test_pool().await?;
        let old = RateTable::new(
            "USD",
            "old",
            Utc::now() - chrono::Duration::hours(3),
            vec![Currency::new("EUR", "Euro", 0.8)],
        );
        db::save_snapshot(&pool, &old).await?;

        let table = current_rates(&source(true), Some(&pool), chrono::Duration::hours(1)).await?;
        assert_eq!(table.rate_date(), "old");

        let result = current_rates(&source(true), None, chrono::Duration::hours(1)).await;
        assert!(result.is_err());
        Ok(())
    }
}
