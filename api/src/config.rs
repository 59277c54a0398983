use std::{env, time::Duration};

use advisor::LlmConfig;
use anyhow::{Context, Result};
use market_data::IFindConfig;

#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub frontend_origins: Vec<String>,
    pub llm: LlmConfig,
    pub ifind: IFindConfig,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub analysis_throttle_window: Duration,
    pub risk_free_rate: f64,
    pub expected_return: f64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let llm = LlmConfig {
            api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: non_empty_var("OPENAI_API_KEY"),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: parse_f64("LLM_TEMPERATURE", 0.2) as f32,
            timeout: parse_duration_seconds("LLM_TIMEOUT_SECS", 60),
            max_retries: parse_u32("LLM_MAX_RETRIES", 2),
        };
        let ifind = IFindConfig {
            base_url: env::var("IFIND_BASE_URL")
                .unwrap_or_else(|_| market_data::DEFAULT_BASE_URL.to_string()),
            refresh_token: non_empty_var("IFIND_REFRESH_TOKEN"),
            timeout: parse_duration_seconds("IFIND_TIMEOUT_SECS", 10),
        };

        // 生產環境安全檢查
        if is_production_environment() {
            if llm.api_key.is_none() {
                anyhow::bail!(
                    "OPENAI_API_KEY is not set in production!\n\
                    Every analysis endpoint would silently serve fallback data.\n\
                    Set OPENAI_API_KEY (and OPENAI_API_BASE for compatible gateways) in your .env file."
                );
            }
            if ifind.refresh_token.is_none() {
                eprintln!(
                    "⚠️  WARNING: IFIND_REFRESH_TOKEN is not set in production.\n\
                    Forex endpoints will answer 503 until a refresh token is configured."
                );
            }
        }

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
            frontend_origins: parse_origins(),
            llm,
            ifind,
            database_url: non_empty_var("DATABASE_URL"),
            redis_url: non_empty_var("REDIS_URL"),
            analysis_throttle_window: parse_duration_seconds("ANALYSIS_THROTTLE_SECS", 2),
            risk_free_rate: parse_f64("RISK_FREE_RATE", risk_engine::DEFAULT_RISK_FREE_RATE),
            expected_return: parse_f64("EXPECTED_RETURN", risk_engine::DEFAULT_EXPECTED_RETURN),
        })
    }
}

fn is_production_environment() -> bool {
    env::var("ENVIRONMENT")
        .or_else(|_| env::var("ENV"))
        .map(|e| {
            let lower = e.to_lowercase();
            lower == "production" || lower == "prod"
        })
        .unwrap_or(false)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_origins() -> Vec<String> {
    if let Ok(list) = env::var("FRONTEND_ORIGINS") {
        split_origins(&list)
    } else if let Ok(origin) = env::var("FRONTEND_ORIGIN") {
        split_origins(&origin)
    } else {
        vec!["http://localhost:3000".to_string()]
    }
}

pub(crate) fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_duration_seconds(key: &str, default: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_skip_blanks() {
        assert_eq!(
            split_origins(" http://a.test, ,http://b.test "),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(split_origins(",").is_empty());
    }

    #[test]
    fn numeric_helpers_default_when_unset() {
        assert_eq!(parse_f64("RISKFX_TEST_UNSET_FLOAT", 0.03), 0.03);
        assert_eq!(parse_u32("RISKFX_TEST_UNSET_U32", 2), 2);
        assert_eq!(
            parse_duration_seconds("RISKFX_TEST_UNSET_SECS", 7),
            Duration::from_secs(7)
        );
    }
}
