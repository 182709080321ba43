// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::locale::region_currency;

/// A currency as known by one rate snapshot.
///
/// `rate` is expressed against the snapshot's base currency, whose own rate is 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub rate: f64,
}

impl Currency {
    pub fn new(code: impl Into<String>, name: impl Into<String>, rate: f64) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            rate,
        }
    }

    /// Placeholder used when no real currency can be resolved.
    pub fn null() -> Self {
        Self {
            code: String::new(),
            name: String::new(),
            rate: 0.0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.code.is_empty()
    }
}

/// Immutable snapshot of exchange rates.
///
/// A refresh builds a new table and swaps it in whole; nothing edits a table
/// after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    base: String,
    rate_date: String,
    fetched_at: DateTime<Utc>,
    currencies: BTreeMap<String, Currency>,
}

impl RateTable {
    /// Builds a table from `currencies`, inserting a non-empty base with rate 1.0 if it is missing.
    pub fn new(
        base: impl Into<String>,
        rate_date: impl Into<String>,
        fetched_at: DateTime<Utc>,
        currencies: impl IntoIterator<Item = Currency>,
    ) -> Self {
        let base = base.into();
        let mut map: BTreeMap<String, Currency> = currencies
            .into_iter()
            .map(|c| (c.code.clone(), c))
            .collect();

        if !base.is_empty() {
            map.entry(base.clone())
                .or_insert_with(|| Currency::new(base.clone(), base.clone(), 1.0));
        }

        Self {
            base,
            rate_date: rate_date.into(),
            fetched_at,
            currencies: map,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn rate_date(&self) -> &str {
        &self.rate_date
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn get(&self, code: &str) -> Option<&Currency> {
        self.currencies.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.currencies.contains_key(code)
    }

    pub fn rate(&self, code: &str) -> Option<f64> {
        self.currencies.get(code).map(|c| c.rate)
    }

    /// The currency with the lowest code.
    pub fn first(&self) -> Option<&Currency> {
        self.currencies.values().next()
    }

    pub fn currency_of_locale(&self, locale: &str) -> Option<&Currency> {
        region_currency(locale).and_then(|code| self.get(code))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    pub fn title(&self) -> String {
        format!("Rates at {}", self.rate_date)
    }
}

#[cfg(test)]
pub fn sample_table() -> RateTable {
    RateTable::new(
        "USD",
        "2024-05-10",
        Utc::now(),
        vec![
            Currency::new("USD", "US Dollar", 1.0),
            Currency::new("EUR", "Euro", 0.9),
            Currency::new("GBP", "British Pound", 0.8),
            Currency::new("JPY", "Japanese Yen", 155.0),
        ],
    )
}
