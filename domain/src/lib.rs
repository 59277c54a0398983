use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub mod lenient;

/// One currency-pair holding as uploaded by the dashboard.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyPosition {
    pub currency: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub proportion: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub benefit: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub daily_volatility: f64,
    #[serde(default)]
    pub value_at_risk: MoneyValue,
    #[serde(default = "default_one", deserialize_with = "lenient::number")]
    pub beta: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub hedging_cost: f64,
    #[serde(default = "default_one", deserialize_with = "lenient::number")]
    pub rate: f64,
}

fn default_one() -> f64 {
    1.0
}

impl CurrencyPosition {
    /// Position value in quote terms (`quantity × rate`).
    pub fn value(&self) -> f64 {
        self.quantity * self.rate
    }

    /// Base currency of the pair, `EUR` for `EUR/USD`.
    pub fn base_currency(&self) -> &str {
        self.currency
            .split(['/', '.'])
            .next()
            .unwrap_or(self.currency.as_str())
            .trim()
    }
}

/// Dollar amount that travels as a display string such as `"$15,000"`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct MoneyValue(pub f64);

impl MoneyValue {
    pub fn amount(self) -> f64 {
        self.0
    }
}

impl fmt::Display for MoneyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_money(self.0))
    }
}

impl Serialize for MoneyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MoneyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient::number(deserializer).map(MoneyValue)
    }
}

/// Formats a dollar figure rounded to whole units with thousands separators.
pub fn format_money(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as u64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredPortfolio {
    pub id: Uuid,
    pub positions: Vec<CurrencyPosition>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMetrics {
    pub total_value: f64,
    pub portfolio_volatility: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Low,
    Medium,
    MediumHigh,
    High,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "低风险",
            RiskLevel::Medium => "中风险",
            RiskLevel::MediumHigh => "中到高风险",
            RiskLevel::High => "高风险",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        const MEDIUM_HIGH: [&str; 6] = ["中到高", "中高", "中偏高", "medium-high", "medium_high", "medium high"];
        if MEDIUM_HIGH.iter().any(|marker| value.contains(marker)) {
            Some(RiskLevel::MediumHigh)
        } else if value.contains('高') || value == "high" {
            Some(RiskLevel::High)
        } else if value.contains('中') || value == "medium" {
            Some(RiskLevel::Medium)
        } else if value.contains('低') || value == "low" {
            Some(RiskLevel::Low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketEmotion {
    Bullish,
    Bearish,
    Neutral,
}

impl MarketEmotion {
    pub fn label(self) -> &'static str {
        match self {
            MarketEmotion::Bullish => "偏多",
            MarketEmotion::Bearish => "偏空",
            MarketEmotion::Neutral => "中性",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        if value.contains("偏多") || value.contains("看涨") || value == "bullish" {
            Some(MarketEmotion::Bullish)
        } else if value.contains("偏空") || value.contains("看跌") || value == "bearish" {
            Some(MarketEmotion::Bearish)
        } else if value.contains("中性") || value == "neutral" {
            Some(MarketEmotion::Neutral)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Influence {
    High,
    Medium,
    Low,
}

impl Influence {
    pub fn label(self) -> &'static str {
        match self {
            Influence::High => "高",
            Influence::Medium => "中",
            Influence::Low => "低",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        if value.starts_with('高') || value == "high" {
            Some(Influence::High)
        } else if value.starts_with('中') || value == "medium" || value == "moderate" {
            Some(Influence::Medium)
        } else if value.starts_with('低') || value == "low" {
            Some(Influence::Low)
        } else {
            None
        }
    }
}

macro_rules! label_serde {
    ($ty:ty, $what:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                <$ty>::from_label(&raw).ok_or_else(|| {
                    serde::de::Error::custom(format!(concat!("unknown ", $what, " `{}`"), raw))
                })
            }
        }
    };
}

label_serde!(RiskLevel, "risk level");
label_serde!(MarketEmotion, "market emotion");
label_serde!(Influence, "influence");

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurrentHedgingAdvice {
    #[serde(deserialize_with = "lenient::number")]
    pub volatility: f64,
    pub emotion: MarketEmotion,
    pub suggestion: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PositionRiskAssessment {
    pub risk: RiskLevel,
    pub var: MoneyValue,
    pub suggestion: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CorrelationAnalysis {
    pub relative: String,
    pub estimate: String,
    pub suggestion: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CostBenefitAnalysis {
    #[serde(deserialize_with = "lenient::number")]
    pub cost: f64,
    pub influence: Influence,
    pub suggestion: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecommendedPosition {
    pub currency: String,
    #[serde(deserialize_with = "lenient::integer")]
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HedgingAdvice {
    #[serde(default)]
    pub historical_analysis: Option<serde_json::Value>,
    pub current_hedging_advice: CurrentHedgingAdvice,
    pub position_risk_assessment: PositionRiskAssessment,
    pub correlation_analysis: CorrelationAnalysis,
    pub cost_benefit_analysis: CostBenefitAnalysis,
    #[serde(default)]
    pub recommended_positions: Vec<RecommendedPosition>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StressTestResult {
    #[serde(default)]
    pub scenario: String,
    pub influence: Influence,
    #[serde(deserialize_with = "lenient::number")]
    pub probability: f64,
    pub suggestion: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub money: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct CurrencyPrediction {
    #[serde(deserialize_with = "lenient::number")]
    pub upper: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub lower: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RiskValues {
    #[serde(deserialize_with = "lenient::number")]
    pub credit: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub policy: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub market: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub politician: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub economy: f64,
}

impl RiskValues {
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            credit: f(self.credit),
            policy: f(self.policy),
            market: f(self.market),
            politician: f(self.politician),
            economy: f(self.economy),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RiskSignalAnalysis {
    pub current: RiskValues,
    pub warning: RiskValues,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub currency: String,
    pub proportion: f64,
    pub daily_volatility: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct TermRisk {
    #[serde(deserialize_with = "lenient::integer")]
    pub time: i64,
    #[serde(deserialize_with = "lenient::number")]
    pub risk: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct MacroRiskCoefficient {
    #[serde(deserialize_with = "lenient::integer")]
    pub month: i64,
    #[serde(deserialize_with = "lenient::number")]
    pub all: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub economy: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub policy: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub market: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SingleCurrencyAnalysis {
    pub currency: String,
    #[serde(deserialize_with = "lenient::number")]
    pub upper: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub lower: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub currency_exposure: Option<f64>,
    #[serde(default)]
    pub term_risk_distribution: Vec<TermRisk>,
    #[serde(default)]
    pub risk_transmission_path: Vec<String>,
    #[serde(default)]
    pub macro_risk_coefficients: Vec<MacroRiskCoefficient>,
    pub risk_signal_analysis: RiskSignalAnalysis,
    #[serde(default)]
    pub single_currency_analysis: Vec<SingleCurrencyAnalysis>,
}

/// Response wrapper shared by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(flatten)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            meta: serde_json::Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

impl ApiEnvelope<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            meta: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForexQuote {
    pub code: String,
    pub latest: f64,
    pub change_ratio: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Line,
    Kline,
}

impl ChartType {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("kline") {
            ChartType::Kline
        } else {
            ChartType::Line
        }
    }
}

/// Chart row rendered as a JSON array: `[time, price]` or
/// `[time, open, close, low, high, volume]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ChartPoint {
    Candle(String, f64, f64, f64, f64, f64),
    Line(String, f64),
}

impl ChartPoint {
    pub fn time(&self) -> &str {
        match self {
            ChartPoint::Candle(time, ..) | ChartPoint::Line(time, _) => time,
        }
    }
}
