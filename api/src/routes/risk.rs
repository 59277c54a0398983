use std::net::SocketAddr;

use advisor::Task;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    routing::post,
    Json, Router,
};
use domain::{ApiEnvelope, CurrencyPosition, CurrencyPrediction, StressTestResult};
use serde_json::Value;

use super::portfolio::{parse_positions, throttle};
use crate::{
    error::{ApiError, ApiResult, INVALID_PAIR, INVALID_SCENARIO},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/risk/stress-test", post(stress_test))
        .route("/risk/currency-prediction", post(currency_prediction))
}

fn parse_body(body: &Bytes, invalid: &'static str) -> ApiResult<Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        _ => Err(ApiError::bad_request(invalid)),
    }
}

fn non_blank_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Positions sent with the request. Absent, `null` or `[]` means "use the
/// upload"; anything else must be a valid position array.
fn supplied_positions(body: &Value) -> ApiResult<Option<Vec<CurrencyPosition>>> {
    match body.get("positions") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) if items.is_empty() => Ok(None),
        Some(value) => parse_positions(value.clone()).map(Some),
    }
}

async fn uploaded_positions(state: &AppState) -> ApiResult<Vec<CurrencyPosition>> {
    Ok(state
        .portfolio_repo
        .latest()
        .await?
        .map(|stored| stored.positions)
        .unwrap_or_default())
}

async fn stress_test(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> ApiResult<Json<ApiEnvelope<StressTestResult>>> {
    let body = parse_body(&body, INVALID_SCENARIO)?;
    let scenario = non_blank_field(&body, "scenario")
        .ok_or_else(|| ApiError::bad_request(INVALID_SCENARIO))?
        .to_string();

    let positions = match supplied_positions(&body)? {
        Some(positions) => positions,
        None => uploaded_positions(&state).await?,
    };

    throttle(&state, addr, Task::StressTest).await?;
    let result = state.advisor.stress_test(&scenario, &positions).await?;
    Ok(Json(ApiEnvelope::ok(result)))
}

async fn currency_prediction(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> ApiResult<Json<ApiEnvelope<CurrencyPrediction>>> {
    let body = parse_body(&body, INVALID_PAIR)?;
    let pair = non_blank_field(&body, "currency")
        .ok_or_else(|| ApiError::bad_request(INVALID_PAIR))?
        .to_string();

    let positions = uploaded_positions(&state).await?;
    let hint = volatility_hint(&positions, &pair);

    throttle(&state, addr, Task::CurrencyPrediction).await?;
    let prediction = state.advisor.currency_prediction(&pair, hint).await?;
    Ok(Json(ApiEnvelope::ok(prediction)))
}

/// Daily volatility of the uploaded position on the same pair, ignoring
/// separators and case.
fn volatility_hint(positions: &[CurrencyPosition], pair: &str) -> Option<f64> {
    let key = compact_pair(pair);
    positions
        .iter()
        .find(|p| compact_pair(&p.currency) == key)
        .map(|p| p.daily_volatility)
        .filter(|v| *v > 0.0)
}

fn compact_pair(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}
