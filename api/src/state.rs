use advisor::AdvisorService;
use market_data::MarketDataService;
use std::sync::Arc;

use crate::{
    analysis_limiter::AnalysisLimiter, config::AppConfig, error::ApiError,
    repositories::PortfolioRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub advisor: Arc<dyn AdvisorService>,
    /// `None` when no iFinD refresh token is configured.
    pub market_data: Option<Arc<dyn MarketDataService>>,
    pub portfolio_repo: Arc<dyn PortfolioRepository>,
    pub analysis_limiter: Arc<AnalysisLimiter>,
}

impl AppState {
    pub fn market_data(&self) -> Result<&Arc<dyn MarketDataService>, ApiError> {
        self.market_data.as_ref().ok_or(ApiError::ForexUnavailable)
    }
}

// Ensure critical dependencies uphold Send/Sync for Axum state usage.
#[allow(dead_code)]
fn _assert_state_types_are_send_sync()
where
    AppConfig: Send + Sync + 'static,
    dyn AdvisorService: Send + Sync,
    dyn MarketDataService: Send + Sync,
    dyn PortfolioRepository: Send + Sync,
    AnalysisLimiter: Send + Sync,
{
}

#[allow(dead_code)]
fn _assert_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
