use std::net::SocketAddr;

use advisor::Task;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    routing::{get, post},
    Json, Router,
};
use domain::{
    ApiEnvelope, CurrencyPosition, HedgingAdvice, PortfolioMetrics, PositionRisk, RiskReport,
    RiskSignalAnalysis,
};
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult, INVALID_POSITIONS},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/portfolio/upload", post(upload_portfolio))
        .route("/portfolio/hedging-advice", get(hedging_advice))
        .route("/portfolio/risk-signals", get(risk_signals))
        .route("/portfolio/risk-levels", get(risk_levels))
        .route("/portfolio/risk-report", get(risk_report))
}

/// Positions of the most recent upload, or `NoPortfolio`.
pub(crate) async fn current_positions(state: &AppState) -> ApiResult<Vec<CurrencyPosition>> {
    state
        .portfolio_repo
        .latest()
        .await?
        .map(|stored| stored.positions)
        .ok_or(ApiError::NoPortfolio)
}

pub(crate) async fn throttle(state: &AppState, addr: SocketAddr, task: Task) -> ApiResult<()> {
    state.analysis_limiter.check(addr.ip(), task).await?;
    Ok(())
}

/// Accepts only a non-empty array whose entries all name a currency pair.
pub(crate) fn parse_positions(value: Value) -> ApiResult<Vec<CurrencyPosition>> {
    match &value {
        Value::Array(items) if !items.is_empty() => {}
        _ => return Err(ApiError::bad_request(INVALID_POSITIONS)),
    }
    let positions: Vec<CurrencyPosition> = serde_json::from_value(value).map_err(|err| {
        tracing::debug!(error = %err, "rejected position payload");
        ApiError::bad_request(INVALID_POSITIONS)
    })?;
    if positions.iter().any(|p| p.currency.trim().is_empty()) {
        return Err(ApiError::bad_request(INVALID_POSITIONS));
    }
    Ok(positions)
}

async fn upload_portfolio(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ApiEnvelope<PortfolioMetrics>>> {
    let value: Value =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request(INVALID_POSITIONS))?;
    let positions = parse_positions(value)?;

    let metrics = risk_engine::portfolio_metrics(
        &positions,
        state.config.risk_free_rate,
        state.config.expected_return,
    );
    let stored = state.portfolio_repo.save(&positions).await?;
    tracing::info!(
        upload_id = %stored.id,
        positions = positions.len(),
        total_value = metrics.total_value,
        "portfolio uploaded"
    );

    Ok(Json(ApiEnvelope::ok(metrics).with_message("持仓数据上传成功")))
}

async fn hedging_advice(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ApiResult<Json<ApiEnvelope<HedgingAdvice>>> {
    let positions = current_positions(&state).await?;
    throttle(&state, addr, Task::Hedging).await?;
    let advice = state.advisor.hedging_advice(&positions).await?;
    Ok(Json(ApiEnvelope::ok(advice)))
}

async fn risk_signals(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ApiResult<Json<ApiEnvelope<RiskSignalAnalysis>>> {
    let positions = current_positions(&state).await?;
    throttle(&state, addr, Task::RiskSignals).await?;
    let signals = state.advisor.risk_signals(&positions).await?;
    Ok(Json(ApiEnvelope::ok(signals)))
}

// 純本地計算，不經過模型也不限流
async fn risk_levels(State(state): State<AppState>) -> ApiResult<Json<ApiEnvelope<Vec<PositionRisk>>>> {
    let positions = current_positions(&state).await?;
    Ok(Json(ApiEnvelope::ok(
        state.advisor.position_risk_levels(&positions),
    )))
}

async fn risk_report(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ApiResult<Json<ApiEnvelope<RiskReport>>> {
    let positions = current_positions(&state).await?;
    throttle(&state, addr, Task::RiskReport).await?;
    let report = state.advisor.risk_report(&positions).await?;
    Ok(Json(ApiEnvelope::ok(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn positions_must_be_a_non_empty_array() {
        assert!(parse_positions(json!([])).is_err());
        assert!(parse_positions(json!({ "currency": "EUR/USD" })).is_err());
        assert!(parse_positions(json!([{ "currency": "  " }])).is_err());

        let parsed = parse_positions(json!([
            { "currency": "EUR/USD", "quantity": "1,000,000", "dailyVolatility": "0.35%" }
        ]))
        .expect("valid positions");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].quantity, 1_000_000.0);
    }
}
