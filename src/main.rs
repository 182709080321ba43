// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use currency_converter::api::HttpRateSource;
use currency_converter::config::{self, Config};
use currency_converter::converter::{propagate, Side};
use currency_converter::db;
use currency_converter::exchange_rates::{current_rates, export_rates_csv, print_rates};
use currency_converter::logging::init_logging;
use currency_converter::models::{system_locale, Currency};
use currency_converter::screen::ConverterScreen;
use currency_converter::session::{self, parse_amount};
use currency_converter::settings::FileSettingsStore;

#[derive(Parser)]
#[command(name = "currency-converter", version, about = "Two-field currency converter")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive converter (default)
    Interactive,
    /// Convert an amount once
    Convert {
        #[arg(value_parser = parse_amount, allow_negative_numbers = true)]
        amount: f64,
        from: String,
        to: String,
    },
    /// List the current exchange rates
    Rates {
        /// Write the rates to a CSV file instead of printing them
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Write the default configuration to config.toml
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = config::load_config();

    let source = HttpRateSource::new(
        config.latest_url.clone(),
        config.currencies_url.clone(),
        config.request_timeout(),
    );

    match cli.command.unwrap_or(Commands::Interactive) {
        Commands::Interactive => {
            let pool = open_cache(&config).await;
            let store = match &config.settings_path {
                Some(path) => FileSettingsStore::new(path.clone()),
                None => FileSettingsStore::default_location()?,
            };
            let screen = ConverterScreen::new(store, system_locale())?;
            session::run(screen, Arc::new(source), config.update_interval(), pool).await?;
        }
        Commands::Convert { amount, from, to } => {
            let pool = open_cache(&config).await;
            let rates = current_rates(&source, pool.as_ref(), config.update_interval()).await?;
            let lookup = |code: &str| {
                let code = code.to_ascii_uppercase();
                rates.get(&code).cloned().unwrap_or_else(|| {
                    eprintln!("⚠️  Unknown currency {}", code);
                    Currency::null()
                })
            };
            let (from, to) = (lookup(&from), lookup(&to));
            let converted = propagate(Side::Upper, amount, &from, &to, &rates);
            println!("{:.2} {} = {:.2} {}", amount, from.code, converted, to.code);
            println!("{}", rates.title());
        }
        Commands::Rates { csv } => {
            let pool = open_cache(&config).await;
            let rates = current_rates(&source, pool.as_ref(), config.update_interval()).await?;
            match csv {
                Some(path) => export_rates_csv(&rates, &path)?,
                None => print_rates(&rates),
            }
        }
        Commands::InitConfig => {
            let path = config::get_config_path();
            config::save_config_to(&Config::default(), &path)?;
            println!("✅ Configuration written to {}", path.display());
        }
    }

    Ok(())
}

/// The snapshot cache is optional; the converter works without it.
async fn open_cache(config: &Config) -> Option<SqlitePool> {
    match db::create_db_pool(&config.database_url).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %e, url = %config.database_url, "rate cache unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_amount_matches_interactive_parsing() {
        let parse = |amount: &str| Cli::try_parse_from(["currency-converter", "convert", amount, "USD", "EUR"]);

        for rejected in ["inf", "NaN", "-inf", "abc"] {
            assert!(parse(rejected).is_err(), "{} should be rejected", rejected);
        }

        match parse("1,234.5").unwrap().command {
            Some(Commands::Convert { amount, .. }) => assert_eq!(amount, 1234.5),
            _ => panic!("expected convert"),
        }
    }
}
