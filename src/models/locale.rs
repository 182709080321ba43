use std::env;

/// Currency used in the region of a locale tag such as `en_GB.UTF-8` or `de-DE`.
pub fn region_currency(locale: &str) -> Option<&'static str> {
    let tag = locale.split(['.', '@']).next().unwrap_or(locale);
    let region = tag.split(['_', '-']).nth(1)?;

    let code = match region.to_ascii_uppercase().as_str() {
        "US" | "EC" | "SV" | "PR" => "USD",
        "GB" => "GBP",
        "AT" | "BE" | "CY" | "DE" | "EE" | "ES" | "FI" | "FR" | "GR" | "HR" | "IE" | "IT"
        | "LT" | "LU" | "LV" | "MT" | "NL" | "PT" | "SI" | "SK" => "EUR",
        "CH" | "LI" => "CHF",
        "JP" => "JPY",
        "KR" => "KRW",
        "CN" => "CNY",
        "HK" => "HKD",
        "TW" => "TWD",
        "SG" => "SGD",
        "IN" => "INR",
        "AU" => "AUD",
        "NZ" => "NZD",
        "CA" => "CAD",
        "MX" => "MXN",
        "BR" => "BRL",
        "SE" => "SEK",
        "NO" => "NOK",
        "DK" => "DKK",
        "PL" => "PLN",
        "CZ" => "CZK",
        "HU" => "HUF",
        "IL" => "ILS",
        "ZA" => "ZAR",
        "TR" => "TRY",
        _ => return None,
    };

    Some(code)
}

/// Locale of the running process, from the usual POSIX variables.
pub fn system_locale() -> Option<String> {
    ["LC_ALL", "LC_MONETARY", "LANG"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
}
