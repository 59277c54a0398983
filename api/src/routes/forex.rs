use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use domain::{ApiEnvelope, ChartPoint, ChartType, ForexQuote};
use market_data::{
    format_chart, format_realtime, normalize_pair, ChartPeriod, MinuteInterval, DEFAULT_PAIRS,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const DEFAULT_PAIR: &str = "USDCNY";
const DEFAULT_COUNT: u32 = 100;
const MAX_COUNT: u32 = 1000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/forex/realtime", get(realtime))
        .route("/forex/chart", get(chart))
        .route("/forex/indicators", get(indicators))
        .route("/forex/multi-indicators", get(multi_indicators))
}

#[derive(Debug, Deserialize)]
struct RealtimeQuery {
    currency_pairs: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartQuery {
    currency_pair: Option<String>,
    chart_type: Option<String>,
    period: Option<String>,
    count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndicatorQuery {
    currency_pair: Option<String>,
    indicator_type: Option<String>,
    period: Option<String>,
    count: Option<String>,
    interval: Option<String>,
}

fn param_or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn parse_positive(raw: Option<&str>, default: u32, name: &str) -> ApiResult<u32> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ApiError::bad_request(format!("无效的参数 {name}: {raw}"))),
    }
}

fn parse_count(raw: Option<&str>) -> ApiResult<u32> {
    parse_positive(raw, DEFAULT_COUNT, "count").map(|count| count.min(MAX_COUNT))
}

fn parse_interval(raw: Option<&str>) -> ApiResult<MinuteInterval> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("1");
    MinuteInterval::parse(raw)
        .ok_or_else(|| ApiError::bad_request(format!("无效的时间间隔: {raw}")))
}

async fn realtime(
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
) -> ApiResult<Json<ApiEnvelope<Vec<ForexQuote>>>> {
    let market = state.market_data()?;

    let mut codes: Vec<String> = query
        .currency_pairs
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(normalize_pair)
        .collect();
    if codes.is_empty() {
        codes = DEFAULT_PAIRS.iter().map(|pair| normalize_pair(pair)).collect();
    }

    let raw = market.realtime(&codes).await?;
    Ok(Json(ApiEnvelope::ok(format_realtime(&raw))))
}

async fn chart(
    State(state): State<AppState>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<ApiEnvelope<Vec<ChartPoint>>>> {
    let market = state.market_data()?;

    let pair = param_or(&query.currency_pair, DEFAULT_PAIR);
    let chart_type = param_or(&query.chart_type, "line");
    let period = param_or(&query.period, "5min");
    let count = parse_count(query.count.as_deref())?;
    let code = normalize_pair(pair);

    let raw = match ChartPeriod::parse(period) {
        ChartPeriod::Minute(interval) => market.minute(&code, interval, count).await?,
        ChartPeriod::Kline(kline) => market.kline(&code, kline, count).await?,
    };
    let points = format_chart(&raw, ChartType::parse(chart_type));
    tracing::debug!(%code, period, points = points.len(), "chart data formatted");

    Ok(Json(
        ApiEnvelope::ok(points)
            .with_meta("currency_pair", pair)
            .with_meta("chart_type", chart_type)
            .with_meta("period", period),
    ))
}

async fn indicators(
    State(state): State<AppState>,
    Query(query): Query<IndicatorQuery>,
) -> ApiResult<Json<ApiEnvelope<Value>>> {
    let market = state.market_data()?;

    let pair = param_or(&query.currency_pair, DEFAULT_PAIR);
    let indicator_type = param_or(&query.indicator_type, "MA");
    let period = parse_positive(query.period.as_deref(), 20, "period")?;
    let count = parse_count(query.count.as_deref())?;
    let interval = parse_interval(query.interval.as_deref())?;

    let data = market
        .indicator(&normalize_pair(pair), indicator_type, period, count, interval)
        .await?;

    Ok(Json(
        ApiEnvelope::ok(data)
            .with_meta("currency_pair", pair)
            .with_meta("indicator_type", indicator_type)
            .with_meta("period", period),
    ))
}

async fn multi_indicators(
    State(state): State<AppState>,
    Query(query): Query<IndicatorQuery>,
) -> ApiResult<Json<ApiEnvelope<Value>>> {
    let market = state.market_data()?;

    let pair = param_or(&query.currency_pair, DEFAULT_PAIR);
    let count = parse_count(query.count.as_deref())?;
    let interval = parse_interval(query.interval.as_deref())?;
    let code = normalize_pair(pair);

    let (ma, macd) = tokio::try_join!(
        market.indicator(&code, "MA", 20, count, interval),
        market.indicator(&code, "MACD", 12, count, interval),
    )?;

    Ok(Json(
        ApiEnvelope::ok(json!({ "ma": ma, "macd": macd })).with_meta("currency_pair", pair),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_defaults_and_caps() {
        assert_eq!(parse_count(None).expect("default"), DEFAULT_COUNT);
        assert_eq!(parse_count(Some(" ")).expect("blank"), DEFAULT_COUNT);
        assert_eq!(parse_count(Some("5000")).expect("capped"), MAX_COUNT);
        assert!(parse_count(Some("0")).is_err());
        assert!(parse_count(Some("abc")).is_err());
    }

    #[test]
    fn interval_accepts_minute_suffix() {
        assert_eq!(parse_interval(None).expect("default").minutes(), 1);
        assert_eq!(parse_interval(Some("15min")).expect("15").minutes(), 15);
        assert!(parse_interval(Some("7")).is_err());
    }
}
