use advisor::AdvisorError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::ApiEnvelope;
use market_data::MarketDataError;
use thiserror::Error;

use crate::analysis_limiter::AnalysisLimiterError;

pub const NO_PORTFOLIO: &str = "未找到持仓数据，请先上传";
pub const INVALID_POSITIONS: &str = "无效的持仓数据格式";
pub const INVALID_SCENARIO: &str = "无效的压力测试情景";
pub const INVALID_PAIR: &str = "无效的货币对";
pub const FOREX_UNAVAILABLE: &str = "外汇服务未初始化";
pub const RATE_LIMITED: &str = "分析请求过于频繁，请稍后再试";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("未找到持仓数据，请先上传")]
    NoPortfolio,

    #[error("分析请求过于频繁，请稍后再试")]
    RateLimited,

    #[error("外汇服务未初始化")]
    ForexUnavailable,

    #[error("行情服务请求失败: {0}")]
    Upstream(String),

    #[error("服务器内部错误: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::NoPortfolio => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ForexUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(ApiEnvelope::failure(self.to_string()))).into_response()
    }
}

impl From<AdvisorError> for ApiError {
    fn from(err: AdvisorError) -> Self {
        match err {
            AdvisorError::InvalidInput(message) => ApiError::BadRequest(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MarketDataError> for ApiError {
    fn from(err: MarketDataError) -> Self {
        match err {
            MarketDataError::NotConfigured => ApiError::ForexUnavailable,
            MarketDataError::InvalidArgument(message) => ApiError::BadRequest(message),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<AnalysisLimiterError> for ApiError {
    fn from(err: AnalysisLimiterError) -> Self {
        match err {
            AnalysisLimiterError::RateLimited => ApiError::RateLimited,
            AnalysisLimiterError::Backend { message } => ApiError::Internal(message),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_errors_map_to_gateway_codes() {
        let err: ApiError = MarketDataError::Vendor {
            code: -1,
            message: "bad".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::from(MarketDataError::NotConfigured).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(AdvisorError::InvalidInput("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NoPortfolio.to_string(), NO_PORTFOLIO);
    }
}
