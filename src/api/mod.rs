pub mod rates_client;

pub use rates_client::{parse_latest, FetchError, HttpRateSource, RateSource};
