// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Currency, RateTable};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rate API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse rate response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self) -> Result<RateTable, FetchError>;
}

/// Body of a fixer-style `latest` endpoint.
#[derive(Debug, Deserialize)]
pub struct LatestRates {
    pub base: String,
    pub date: String,
    pub rates: HashMap<String, f64>,
}

/// Builds a table from a `latest` body and an optional code → name map.
pub fn parse_latest(
    body: &str,
    names: &HashMap<String, String>,
    fetched_at: DateTime<Utc>,
) -> Result<RateTable, FetchError> {
    let latest: LatestRates = serde_json::from_str(body)?;

    let name_of = |code: &str| names.get(code).cloned().unwrap_or_else(|| code.to_string());
    let base = Currency::new(latest.base.clone(), name_of(&latest.base), 1.0);
    let currencies = latest
        .rates
        .iter()
        .map(|(code, &rate)| Currency::new(code.clone(), name_of(code), rate))
        .chain(std::iter::once(base));

    Ok(RateTable::new(latest.base.clone(), latest.date, fetched_at, currencies))
}

#[derive(Clone)]
pub struct HttpRateSource {
    client: Client,
    latest_url: String,
    currencies_url: Option<String>,
}

impl HttpRateSource {
    pub fn new(latest_url: String, currencies_url: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            latest_url,
            currencies_url,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status { status, body: text });
        }

        Ok(text)
    }

    async fn fetch_names(&self) -> HashMap<String, String> {
        let Some(url) = self.currencies_url.as_deref() else {
            return HashMap::new();
        };

        let names = match self.get_text(url).await {
            Ok(text) => serde_json::from_str(&text).map_err(FetchError::from),
            Err(e) => Err(e),
        };

        names.unwrap_or_else(|e| {
            warn!(error = %e, "failed to fetch currency names, using codes");
            HashMap::new()
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch(&self) -> Result<RateTable, FetchError> {
        debug!(url = %self.latest_url, "fetching latest rates");
        let body = self.get_text(&self.latest_url).await?;
        let names = self.fetch_names().await;

        let table = parse_latest(&body, &names, Utc::now())?;
        debug!(currencies = table.len(), date = table.rate_date(), "rates fetched");
        Ok(table)
    }
}
