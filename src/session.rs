// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Interactive converter session.
//!
//! Everything that touches the screen runs on the loop in [`run`]: typed
//! commands, refresh results and debounce deadlines are handled one at a
//! time, so a rate table replacement and the re-pricing it causes complete
//! before the next command is read.

use anyhow::{anyhow, bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

use crate::api::RateSource;
use crate::converter::Side;
use crate::db;
use crate::exchange_rates::print_rates;
use crate::refresh::{is_stale, Debouncer, RefreshResult, RefreshState, Refresher};
use crate::screen::ConverterScreen;
use crate::settings::SettingsStore;

const MANUAL_RELOAD_DEBOUNCE: Duration = Duration::from_millis(300);
const STALE_CHECK_DEBOUNCE: Duration = Duration::from_millis(100);
const STALE_CHECK_PERIOD: Duration = Duration::from_secs(60);

const HELP: &str = "\
Commands:
  upper <amount>           set the upper amount
  lower <amount>           set the lower amount
  upper-currency <CODE>    choose the upper currency
  lower-currency <CODE>    choose the lower currency
  swap                     swap the two sides
  reload                   fetch the latest rates
  rates                    list the loaded rates
  show                     print the converter
  help                     this text
  quit                     leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Amount(Side, f64),
    Currency(Side, String),
    Swap,
    Reload,
    Rates,
    Show,
    Help,
    Quit,
}

/// Accepts thousands separators; an empty amount is zero.
pub fn parse_amount(text: &str) -> Result<f64> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() {
        return Ok(0.0);
    }

    let amount: f64 = cleaned
        .parse()
        .map_err(|_| anyhow!("not a number: {}", text))?;
    if !amount.is_finite() {
        bail!("not a number: {}", text);
    }
    Ok(amount)
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Command::Show);
        };
        let arg = words.next().unwrap_or("");

        let side = |name: &str| match name {
            "upper" | "u" => Some(Side::Upper),
            "lower" | "l" => Some(Side::Lower),
            _ => None,
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "swap" | "s" => Command::Swap,
            "reload" | "r" => Command::Reload,
            "rates" => Command::Rates,
            "show" => Command::Show,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            verb => {
                if let Some(side) = side(verb) {
                    Command::Amount(side, parse_amount(arg)?)
                } else if let Some(side) = verb
                    .strip_suffix("-currency")
                    .or_else(|| verb.strip_suffix("c"))
                    .and_then(side)
                {
                    if arg.is_empty() {
                        bail!("{} needs a currency code", verb);
                    }
                    Command::Currency(side, arg.to_ascii_uppercase())
                } else {
                    bail!("unknown command: {} (try `help`)", verb);
                }
            }
        };

        Ok(command)
    }
}

/// Screen plus the reload machinery around it.
pub struct Session<S: SettingsStore> {
    screen: ConverterScreen<S>,
    refresher: Refresher,
    manual_reload: Debouncer,
    stale_check: Debouncer,
    update_interval: chrono::Duration,
    pool: Option<SqlitePool>,
    spinner: Option<ProgressBar>,
}

impl<S: SettingsStore> Session<S> {
    pub fn new(
        screen: ConverterScreen<S>,
        source: Arc<dyn RateSource>,
        results: mpsc::UnboundedSender<RefreshResult>,
        update_interval: chrono::Duration,
        pool: Option<SqlitePool>,
    ) -> Self {
        Self {
            screen,
            refresher: Refresher::new(source, results),
            manual_reload: Debouncer::new(MANUAL_RELOAD_DEBOUNCE),
            stale_check: Debouncer::new(STALE_CHECK_DEBOUNCE),
            update_interval,
            pool,
            spinner: None,
        }
    }

    pub fn screen(&self) -> &ConverterScreen<S> {
        &self.screen
    }

    pub fn is_loading(&self) -> bool {
        self.refresher.is_loading()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refresher.state()
    }

    /// Installs a table read from the snapshot cache.
    pub fn preload(&mut self, table: crate::models::RateTable) {
        self.install(table);
    }

    /// A failed settings write leaves the new table in place and the session running.
    fn install(&mut self, table: crate::models::RateTable) {
        if let Err(e) = self.screen.apply_rates(Arc::new(table)) {
            warn!(error = %e, "failed to apply rates");
            println!("⚠️  {:#}", e);
        }
    }

    pub fn request_stale_check(&mut self, now: Instant) {
        self.stale_check.poke(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.manual_reload.deadline(), self.stale_check.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Runs debounced reloads whose window has closed.
    pub fn on_deadline(&mut self, now: Instant) {
        if self.manual_reload.fire(now) {
            self.start_refresh();
        }

        if self.stale_check.fire(now) {
            let stale = is_stale(
                self.screen.rates().map(|r| r.as_ref()),
                chrono::Utc::now(),
                self.update_interval,
            );
            if stale && !self.refresher.is_loading() {
                self.start_refresh();
            }
        }
    }

    /// Returns false when the session should end.
    pub fn handle(&mut self, command: Command, now: Instant) -> Result<bool> {
        match command {
            Command::Amount(side, amount) => {
                self.screen.edit_amount(side, amount)?;
                self.render();
            }
            Command::Currency(side, code) => {
                let known = self.screen.rates().is_some_and(|r| r.contains(&code));
                if !known {
                    println!("⚠️  {} is not in the current rate table", code);
                }
                self.screen.select_currency(side, &code)?;
                self.render();
            }
            Command::Swap => {
                self.screen.swap()?;
                self.render();
            }
            Command::Reload => {
                if !self.screen.reload_enabled() {
                    println!("⚠️  reload unavailable while refreshing");
                    return Ok(true);
                }
                self.screen.reload_tapped();
                self.manual_reload.poke(now);
            }
            Command::Rates => match self.screen.rates() {
                Some(rates) => print_rates(rates),
                None => println!("No rates loaded"),
            },
            Command::Show => self.render(),
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
        }

        Ok(true)
    }

    pub async fn on_refresh(&mut self, result: RefreshResult) {
        let Some(outcome) = self.refresher.accept(result) else {
            return;
        };

        match outcome {
            Ok(table) => {
                if let Some(pool) = &self.pool {
                    if let Err(e) = db::save_snapshot(pool, &table).await {
                        warn!(error = %e, "failed to cache rate snapshot");
                    }
                }
                self.set_loading(false);
                self.install(table);
            }
            Err(e) => {
                self.screen.refresh_failed(&e);
                self.set_loading(false);
            }
        }

        self.render();
    }

    fn start_refresh(&mut self) {
        let generation = self.refresher.start();
        debug!(generation, "reload requested");
        self.set_loading(true);
    }

    fn set_loading(&mut self, loading: bool) {
        self.screen.set_loading(loading);

        match (loading, self.spinner.take()) {
            (true, Some(spinner)) => self.spinner = Some(spinner),
            (true, None) => {
                let spinner = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
                    spinner.set_style(style);
                }
                spinner.set_message("Refreshing...");
                spinner.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(spinner);
            }
            (false, Some(spinner)) => spinner.finish_and_clear(),
            (false, None) => {}
        }
    }

    pub fn render(&self) {
        println!("== {} ==", self.screen.title());

        let pair = self.screen.pair();
        for field in [&pair.upper, &pair.lower] {
            let code = if field.currency.is_null() {
                "---"
            } else {
                field.currency.code.as_str()
            };
            println!("  {:<4} {:>16.2}  {}", code, field.amount, field.currency.name);
        }

        if !self.screen.reload_enabled() {
            println!("  (reload unavailable while refreshing)");
        }
    }
}

/// Drives a session from stdin until `quit` or end of input.
pub async fn run<S: SettingsStore>(
    screen: ConverterScreen<S>,
    source: Arc<dyn RateSource>,
    update_interval: chrono::Duration,
    pool: Option<SqlitePool>,
) -> Result<()> {
    let (tx, mut results) = mpsc::unbounded_channel();
    let mut session = Session::new(screen, source, tx, update_interval, pool);

    if let Some(pool) = &session.pool {
        match db::load_latest_snapshot(pool).await {
            Ok(Some(table)) => session.preload(table),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read cached rates"),
        }
    }

    println!("{}", HELP);
    session.render();
    session.request_stale_check(Instant::now());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(STALE_CHECK_PERIOD);

    loop {
        let deadline = session.next_deadline();

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.parse::<Command>() {
                    Ok(command) => match session.handle(command, Instant::now()) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => println!("⚠️  {}", e),
                    },
                    Err(e) => println!("⚠️  {}", e),
                }
            }
            Some(result) = results.recv() => {
                session.on_refresh(result).await;
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                session.on_deadline(Instant::now());
            }
            _ = ticker.tick() => {
                session.request_stale_check(Instant::now());
            }
        }
    }

    println!("Exiting...");
    Ok(())
}
