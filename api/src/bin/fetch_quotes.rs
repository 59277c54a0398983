use api::{bootstrap::build_market_data, config::AppConfig, telemetry};
use market_data::{format_realtime, normalize_pair, DEFAULT_PAIRS};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;
    let config = AppConfig::from_env()?;

    let Some(market) = build_market_data(&config)? else {
        anyhow::bail!("IFIND_REFRESH_TOKEN is required to fetch quotes");
    };

    let pairs = std::env::var("QUOTE_PAIRS").unwrap_or_else(|_| DEFAULT_PAIRS.join(","));
    let codes: Vec<String> = pairs
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(normalize_pair)
        .collect();
    if codes.is_empty() {
        anyhow::bail!("QUOTE_PAIRS did not contain any currency pair");
    }

    let raw = market.realtime(&codes).await?;
    let quotes = format_realtime(&raw);
    if quotes.is_empty() {
        tracing::warn!(requested = codes.len(), "vendor returned no quotes");
    }
    for quote in quotes {
        tracing::info!(
            code = %quote.code,
            latest = quote.latest,
            change_ratio = quote.change_ratio,
            high = quote.high,
            low = quote.low,
            "realtime quote"
        );
    }

    Ok(())
}
