use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, TimeZone, Utc};
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    IFindConfig, KlinePeriod, MarketDataError, MarketDataResult, MarketDataService, MinuteInterval,
};

const TOKEN_PATH: &str = "/api/v1/get_access_token";
const REALTIME_PATH: &str = "/api/v1/real_time_quotation";
const HISTORY_PATH: &str = "/api/v1/cmd_history_quotation";
const HIGH_FREQUENCY_PATH: &str = "/api/v1/high_frequency";

const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: chrono::DateTime<Utc>,
}

/// iFinD REST client. Access tokens are exchanged from the refresh token on
/// demand and shared across clones.
#[derive(Clone)]
pub struct IFindClient {
    client: Client,
    base_url: String,
    refresh_token: String,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl IFindClient {
    pub fn new(config: &IFindConfig) -> MarketDataResult<Self> {
        let refresh_token = config
            .refresh_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or(MarketDataError::NotConfigured)?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            refresh_token,
            token: Arc::new(RwLock::new(None)),
        })
    }

    async fn cached_token(&self) -> Option<String> {
        let cache = self.token.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.token.clone())
    }

    async fn access_token(&self) -> MarketDataResult<String> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }
        let mut cache = self.token.write().await;
        if let Some(entry) = cache.as_ref().filter(|entry| entry.expires_at > Utc::now()) {
            return Ok(entry.token.clone());
        }
        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        info!(expires_at = %fresh.expires_at, "ifind access token refreshed");
        *cache = Some(fresh);
        Ok(token)
    }

    async fn invalidate_token(&self) {
        self.token.write().await.take();
    }

    async fn fetch_token(&self) -> MarketDataResult<CachedToken> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .header("Content-Type", "application/json")
            .header("refresh_token", &self.refresh_token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MarketDataError::Token(format!("status {status}: {body}")));
        }
        let body: Value = resp.json().await?;
        check_vendor(&body)?;
        parse_token(&body)
    }

    async fn post_data(&self, endpoint: &'static str, path: &str, body: Value) -> MarketDataResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut retried = false;
        loop {
            let token = self.access_token().await?;
            debug!(endpoint, "ifind request");
            let resp = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("access_token", token)
                .json(&body)
                .send()
                .await;
            let resp = match resp {
                Ok(resp) => resp,
                Err(err) => {
                    counter!("market_data_requests_total", "endpoint" => endpoint, "status" => "transport_error").increment(1);
                    return Err(err.into());
                }
            };
            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                warn!(endpoint, "ifind token rejected, refreshing");
                self.invalidate_token().await;
                retried = true;
                continue;
            }
            if !status.is_success() {
                counter!("market_data_requests_total", "endpoint" => endpoint, "status" => "http_error").increment(1);
                let body = resp.text().await.unwrap_or_default();
                return Err(MarketDataError::Status {
                    endpoint,
                    status: status.as_u16(),
                    body,
                });
            }
            let value: Value = resp.json().await?;
            if let Err(err) = check_vendor(&value) {
                counter!("market_data_requests_total", "endpoint" => endpoint, "status" => "vendor_error").increment(1);
                return Err(err);
            }
            counter!("market_data_requests_total", "endpoint" => endpoint, "status" => "ok").increment(1);
            return Ok(value);
        }
    }
}

fn check_vendor(body: &Value) -> MarketDataResult<()> {
    let code = body.get("errorcode").and_then(Value::as_i64).unwrap_or(0);
    if code == 0 {
        return Ok(());
    }
    let message = body
        .get("errmsg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(MarketDataError::Vendor { code, message })
}

fn parse_token(body: &Value) -> MarketDataResult<CachedToken> {
    let data = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
    let token = data
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MarketDataError::Token("response missing access_token".into()))?
        .to_string();

    let margin = ChronoDuration::seconds(TOKEN_SAFETY_MARGIN_SECS);
    let from_expire_at = data
        .get("expire_at")
        .and_then(Value::as_str)
        .and_then(|raw| NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc) - margin);
    let expires_at = from_expire_at.unwrap_or_else(|| {
        let ttl = data
            .get("expires_in")
            .and_then(|v| v.as_i64().or_else(|| v.as_str()?.parse().ok()))
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        Utc::now() + ChronoDuration::seconds(ttl) - margin
    });
    Ok(CachedToken { token, expires_at })
}

#[async_trait]
impl MarketDataService for IFindClient {
    async fn realtime(&self, codes: &[String]) -> MarketDataResult<Value> {
        if codes.is_empty() {
            return Err(MarketDataError::InvalidArgument("no currency pairs requested".into()));
        }
        let body = json!({
            "codes": codes.join(","),
            "indicators": "open,high,low,latest,changeRatio",
        });
        self.post_data("realtime", REALTIME_PATH, body).await
    }

    async fn kline(&self, code: &str, period: KlinePeriod, count: u32) -> MarketDataResult<Value> {
        let today = Local::now().date_naive();
        let start = today - ChronoDuration::days(period.days() * i64::from(count));
        let body = json!({
            "codes": code,
            "indicators": "open,high,low,close,volume,amount,changeRatio",
            "startdate": start.format(DATE_FORMAT).to_string(),
            "enddate": today.format(DATE_FORMAT).to_string(),
            "functionpara": { "Interval": period.interval_code() },
        });
        self.post_data("kline", HISTORY_PATH, body).await
    }

    async fn minute(&self, code: &str, interval: MinuteInterval, count: u32) -> MarketDataResult<Value> {
        let end = Local::now().naive_local();
        let start = end - ChronoDuration::minutes(i64::from(interval.minutes()) * i64::from(count));
        let body = json!({
            "codes": code,
            "indicators": "latest,open,high,low,close",
            "starttime": start.format(DATETIME_FORMAT).to_string(),
            "endtime": end.format(DATETIME_FORMAT).to_string(),
            "functionpara": { "Interval": interval.minutes().to_string(), "Fill": "Previous" },
        });
        self.post_data("minute", HIGH_FREQUENCY_PATH, body).await
    }

    async fn indicator(
        &self,
        code: &str,
        name: &str,
        period: u32,
        count: u32,
        interval: MinuteInterval,
    ) -> MarketDataResult<Value> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketDataError::InvalidArgument("indicator name must not be blank".into()));
        }
        let end = Local::now().naive_local();
        let start = end - ChronoDuration::minutes(i64::from(interval.minutes()) * i64::from(count));
        let mut calculate = serde_json::Map::new();
        calculate.insert(name.to_string(), Value::String(period.to_string()));
        let body = json!({
            "codes": code,
            "indicators": name,
            "starttime": start.format(DATETIME_FORMAT).to_string(),
            "endtime": end.format(DATETIME_FORMAT).to_string(),
            "functionpara": {
                "Interval": interval.minutes().to_string(),
                "Fill": "Original",
                "calculate": calculate,
            },
        });
        self.post_data("indicator", HIGH_FREQUENCY_PATH, body).await
    }
}
