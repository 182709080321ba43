// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::FetchError;
use crate::converter::{ConversionPair, Side, Synchronizer};
use crate::models::{Currency, RateTable};
use crate::settings::{Settings, SettingsStore};

const FALLBACK_CODE: &str = "USD";

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Ready,
    Failed(String),
}

/// State behind the converter screen: the current rate table, the linked
/// fields and the persisted last-used values.
pub struct ConverterScreen<S: SettingsStore> {
    rates: Option<Arc<RateTable>>,
    sync: Synchronizer,
    store: S,
    settings: Settings,
    locale: Option<String>,
    status: Status,
    loading: bool,
    reload_enabled: bool,
}

impl<S: SettingsStore> ConverterScreen<S> {
    pub fn new(store: S, locale: Option<String>) -> Result<Self> {
        let settings = store.load()?;
        debug!(?settings, "restored settings");

        Ok(Self {
            rates: None,
            sync: Synchronizer::new(),
            store,
            settings,
            locale,
            status: Status::Ready,
            loading: false,
            reload_enabled: true,
        })
    }

    pub fn rates(&self) -> Option<&Arc<RateTable>> {
        self.rates.as_ref()
    }

    pub fn pair(&self) -> &ConversionPair {
        self.sync.pair()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn title(&self) -> String {
        if self.loading {
            return "Refreshing...".to_string();
        }

        match (&self.status, &self.rates) {
            (Status::Failed(reason), _) => format!("Refresh failed: {}", reason),
            (Status::Ready, Some(rates)) => rates.title(),
            (Status::Ready, None) => "No rates loaded".to_string(),
        }
    }

    pub fn reload_enabled(&self) -> bool {
        self.reload_enabled
    }

    /// The reload control goes inactive on a tap and stays so until loading settles.
    pub fn reload_tapped(&mut self) {
        self.reload_enabled = false;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.reload_enabled = !loading;
    }

    /// Installs a new rate table and re-prices the fields against it.
    pub fn apply_rates(&mut self, table: Arc<RateTable>) -> Result<()> {
        if self.rates.is_none() {
            let upper = self.default_upper(&table);
            let lower = self.default_lower(&table);
            let amount = self.settings.lower_amount.unwrap_or(0.0);
            info!(upper = %upper.code, lower = %lower.code, "initial rates loaded");
            self.sync.restore(upper, lower, amount, &table);
        } else {
            let pair = self.sync.pair();
            let upper = table
                .get(&pair.upper.currency.code)
                .cloned()
                .unwrap_or_else(|| self.default_upper(&table));
            let lower = table
                .get(&pair.lower.currency.code)
                .cloned()
                .unwrap_or_else(|| self.default_lower(&table));
            self.sync.apply_rates(upper, lower, &table);
        }

        self.rates = Some(table);
        self.status = Status::Ready;
        self.persist()
    }

    /// The previous table stays in place.
    pub fn refresh_failed(&mut self, error: &FetchError) {
        warn!(error = %error, "rate refresh failed");
        self.status = Status::Failed(error.to_string());
    }

    pub fn edit_amount(&mut self, side: Side, amount: f64) -> Result<()> {
        let rates = self.loaded_rates()?;
        self.sync.edit_amount(side, amount, &rates);
        self.persist()
    }

    /// Codes missing from the table select the null currency.
    pub fn select_currency(&mut self, side: Side, code: &str) -> Result<()> {
        let rates = self.loaded_rates()?;
        let currency = rates.get(code).cloned().unwrap_or_else(|| {
            warn!(code, "currency not in rate table");
            Currency::null()
        });
        self.sync.select_currency(side, currency, &rates);
        self.persist()
    }

    pub fn swap(&mut self) -> Result<()> {
        let rates = self.loaded_rates()?;
        self.sync.swap(&rates);
        self.persist()
    }

    fn loaded_rates(&self) -> Result<Arc<RateTable>> {
        match &self.rates {
            Some(rates) => Ok(Arc::clone(rates)),
            None => bail!("rates are not loaded yet"),
        }
    }

    fn default_upper(&self, table: &RateTable) -> Currency {
        self.settings
            .upper_currency
            .as_deref()
            .and_then(|code| table.get(code))
            .or_else(|| {
                self.locale
                    .as_deref()
                    .and_then(|locale| table.currency_of_locale(locale))
            })
            .or_else(|| table.get(FALLBACK_CODE))
            .or_else(|| table.first())
            .cloned()
            .unwrap_or_else(Currency::null)
    }

    fn default_lower(&self, table: &RateTable) -> Currency {
        self.settings
            .lower_currency
            .as_deref()
            .and_then(|code| table.get(code))
            .or_else(|| table.get(FALLBACK_CODE))
            .or_else(|| table.first())
            .cloned()
            .unwrap_or_else(Currency::null)
    }

    fn persist(&mut self) -> Result<()> {
        let pair = self.sync.pair();
        let code = |c: &Currency| (!c.is_null()).then(|| c.code.clone());
        let settings = Settings {
            upper_currency: code(&pair.upper.currency),
            lower_currency: code(&pair.lower.currency),
            lower_amount: Some(pair.lower.amount),
        };

        if settings != self.settings {
            self.store.save(&settings)?;
            self.settings = settings;
        }

        Ok(())
    }
}
