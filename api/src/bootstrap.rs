use std::sync::Arc;

use advisor::{AdvisorError, AdvisorService, LlmAdvisor, OpenAiChatModel};
use anyhow::Result;
use market_data::{IFindClient, MarketDataError, MarketDataService};
use sqlx::PgPool;

use crate::{
    analysis_limiter::AnalysisLimiter,
    config::AppConfig,
    repositories::{InMemoryPortfolioRepository, PortfolioRepository, PostgresPortfolioRepository},
    state::AppState,
};

pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let portfolio_repo: Arc<dyn PortfolioRepository> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await?;
            sqlx::migrate!("../migrations").run(&pool).await?;
            tracing::info!("portfolio uploads persisted to postgres");
            Arc::new(PostgresPortfolioRepository::new(pool))
        }
        None => {
            tracing::info!("DATABASE_URL not set, keeping portfolio uploads in memory");
            Arc::new(InMemoryPortfolioRepository::default())
        }
    };

    let analysis_limiter = Arc::new(
        AnalysisLimiter::new(config.analysis_throttle_window, config.redis_url.clone()).await?,
    );

    Ok(AppState {
        config: config.clone(),
        advisor: build_advisor(config)?,
        market_data: build_market_data(config)?,
        portfolio_repo,
        analysis_limiter,
    })
}

pub fn build_advisor(config: &AppConfig) -> Result<Arc<dyn AdvisorService>> {
    match OpenAiChatModel::new(&config.llm) {
        Ok(model) => {
            tracing::info!(model = %config.llm.model, api_base = %config.llm.api_base, "language model configured");
            Ok(Arc::new(LlmAdvisor::new(model)))
        }
        Err(AdvisorError::NotConfigured) => {
            tracing::warn!("OPENAI_API_KEY not set, analyses will use deterministic fallbacks");
            Ok(Arc::new(LlmAdvisor::<OpenAiChatModel>::offline()))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn build_market_data(config: &AppConfig) -> Result<Option<Arc<dyn MarketDataService>>> {
    match IFindClient::new(&config.ifind) {
        Ok(client) => Ok(Some(Arc::new(client))),
        Err(MarketDataError::NotConfigured) => {
            tracing::warn!("IFIND_REFRESH_TOKEN not set, forex endpoints disabled");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
