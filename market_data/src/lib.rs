use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod client;
pub mod format;

pub use client::IFindClient;
pub use format::{format_chart, format_realtime};

pub const DEFAULT_BASE_URL: &str = "https://ft.10jqka.com.cn";
pub const DEFAULT_PAIRS: [&str; 4] = ["USDCNY", "EURUSD", "GBPUSD", "USDJPY"];

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("market data vendor is not configured")]
    NotConfigured,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[error("vendor error {code}: {message}")]
    Vendor { code: i64, message: String },
    #[error("token refresh failed: {0}")]
    Token(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type MarketDataResult<T> = Result<T, MarketDataError>;

#[derive(Debug, Clone)]
pub struct IFindConfig {
    pub base_url: String,
    pub refresh_token: Option<String>,
    pub timeout: Duration,
}

impl Default for IFindConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlinePeriod {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl KlinePeriod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1d" => Some(Self::Day),
            "1w" => Some(Self::Week),
            "1m" => Some(Self::Month),
            "1q" => Some(Self::Quarter),
            "1y" => Some(Self::Year),
            _ => None,
        }
    }

    /// `functionpara.Interval` value.
    pub fn interval_code(self) -> &'static str {
        match self {
            Self::Day => "D",
            Self::Week => "W",
            Self::Month => "M",
            Self::Quarter => "Q",
            Self::Year => "Y",
        }
    }

    pub fn days(self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 31,
            Self::Quarter => 93,
            Self::Year => 365,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteInterval(u32);

impl MinuteInterval {
    pub const FIVE: MinuteInterval = MinuteInterval(5);

    /// Accepts `"5"` and `"5min"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.trim().trim_end_matches("min");
        match digits.parse::<u32>().ok()? {
            minutes @ (1 | 5 | 15 | 30 | 60) => Some(Self(minutes)),
            _ => None,
        }
    }

    pub fn minutes(self) -> u32 {
        self.0
    }
}

/// Chart granularity requested by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPeriod {
    Minute(MinuteInterval),
    Kline(KlinePeriod),
}

impl ChartPeriod {
    /// `"5min"` style periods use intraday data, `"1d".."1y"` use candles,
    /// anything else falls back to 5-minute data.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().ends_with("min") {
            if let Some(interval) = MinuteInterval::parse(raw) {
                return Self::Minute(interval);
            }
        }
        match KlinePeriod::parse(raw) {
            Some(period) => Self::Kline(period),
            None => Self::Minute(MinuteInterval::FIVE),
        }
    }
}

/// `"EUR/USD"` → `"EURUSD.FX"`.
pub fn normalize_pair(raw: &str) -> String {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '/')
        .collect::<String>()
        .to_uppercase();
    if compact.ends_with(".FX") {
        compact
    } else {
        format!("{compact}.FX")
    }
}

#[async_trait]
pub trait MarketDataService: Send + Sync {
    async fn realtime(&self, codes: &[String]) -> MarketDataResult<Value>;
    async fn kline(&self, code: &str, period: KlinePeriod, count: u32) -> MarketDataResult<Value>;
    async fn minute(&self, code: &str, interval: MinuteInterval, count: u32) -> MarketDataResult<Value>;
    async fn indicator(
        &self,
        code: &str,
        name: &str,
        period: u32,
        count: u32,
        interval: MinuteInterval,
    ) -> MarketDataResult<Value>;
}
