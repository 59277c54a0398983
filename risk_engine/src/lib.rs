use domain::{
    format_money, CurrencyPosition, Influence, MacroRiskCoefficient, MarketEmotion, MoneyValue,
    PortfolioMetrics, PositionRisk, RiskLevel, SingleCurrencyAnalysis, TermRisk,
};
use serde::Serialize;

mod fallback;

pub use fallback::{
    fallback_currency_prediction, fallback_hedging_advice, fallback_risk_report,
    fallback_risk_signals, fallback_stress_test, risk_signal_baseline,
};

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.03;
pub const DEFAULT_EXPECTED_RETURN: f64 = 0.08;
/// One-sided 95% z-score.
pub const VAR_Z_SCORE: f64 = 1.645;

pub fn total_value(positions: &[CurrencyPosition]) -> f64 {
    positions.iter().map(CurrencyPosition::value).sum()
}

/// Recomputes every `proportion` from position values.
pub fn position_ratios(positions: &[CurrencyPosition]) -> Vec<CurrencyPosition> {
    let total = total_value(positions);
    positions
        .iter()
        .cloned()
        .map(|mut position| {
            position.proportion = if total > 0.0 {
                position.value() / total
            } else {
                0.0
            };
            position
        })
        .collect()
}

/// Value-weighted mean of daily volatility.
pub fn portfolio_volatility(positions: &[CurrencyPosition]) -> f64 {
    let total = total_value(positions);
    if positions.is_empty() || total == 0.0 {
        return 0.0;
    }
    positions
        .iter()
        .map(|p| p.value() / total * p.daily_volatility)
        .sum()
}

/// Proportion-weighted mean of daily volatility, simple mean when every
/// proportion is zero.
pub fn proportion_weighted_volatility(positions: &[CurrencyPosition]) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }
    let weight: f64 = positions.iter().map(|p| p.proportion).sum();
    if weight == 0.0 {
        return mean(positions.iter().map(|p| p.daily_volatility));
    }
    positions
        .iter()
        .map(|p| p.proportion * p.daily_volatility)
        .sum::<f64>()
        / weight
}

pub fn sharpe_ratio(volatility: f64, risk_free_rate: f64, expected_return: f64) -> f64 {
    if volatility == 0.0 {
        return 0.0;
    }
    (expected_return - risk_free_rate) / volatility
}

pub fn portfolio_metrics(
    positions: &[CurrencyPosition],
    risk_free_rate: f64,
    expected_return: f64,
) -> PortfolioMetrics {
    let volatility = portfolio_volatility(positions);
    PortfolioMetrics {
        total_value: total_value(positions),
        portfolio_volatility: volatility,
        sharpe_ratio: sharpe_ratio(volatility, risk_free_rate, expected_return),
    }
}

pub fn value_at_risk(value: f64, daily_volatility: f64) -> String {
    if value == 0.0 || daily_volatility == 0.0 {
        return format_money(0.0);
    }
    format_money(value * daily_volatility * VAR_Z_SCORE)
}

pub fn parse_money(raw: &str) -> f64 {
    domain::lenient::parse_number(raw).unwrap_or(0.0)
}

/// Population standard deviation of log returns.
pub fn daily_volatility(prices: &[f64]) -> f64 {
    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let avg = mean(returns.iter().copied());
    let var = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / returns.len() as f64;
    var.sqrt()
}

pub fn beta(asset_returns: &[f64], market_returns: &[f64]) -> f64 {
    if asset_returns.len() != market_returns.len() || asset_returns.is_empty() {
        return 1.0;
    }
    let mean_a = mean(asset_returns.iter().copied());
    let mean_m = mean(market_returns.iter().copied());
    let mut cov = 0.0;
    let mut var = 0.0;
    for (a, m) in asset_returns.iter().zip(market_returns) {
        cov += (a - mean_a) * (m - mean_m);
        var += (m - mean_m).powi(2);
    }
    if var == 0.0 {
        return 1.0;
    }
    cov / var
}

pub fn hedging_cost_ratio(tool_cost: f64, position_value: f64) -> f64 {
    if position_value == 0.0 {
        return 0.0;
    }
    tool_cost / position_value
}

/// `(final - initial) / initial`; 0 when the initial value is 0.
pub fn cumulative_return(final_value: f64, initial_value: f64) -> f64 {
    if initial_value == 0.0 {
        return 0.0;
    }
    (final_value - initial_value) / initial_value
}

/// Largest peak-to-trough decline of an equity curve as a positive ratio
/// `(peak - value) / peak`.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() <= 1 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut drawdown: f64 = 0.0;
    for &value in equity_curve {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            drawdown = drawdown.max((peak - value) / peak);
        }
    }
    drawdown
}

pub fn determine_risk_level(proportion: f64, daily_volatility: f64) -> RiskLevel {
    let concentration = if proportion > 1.0 / 3.0 {
        RiskLevel::High
    } else if proportion > 0.25 {
        RiskLevel::MediumHigh
    } else {
        RiskLevel::Low
    };
    let swing = if daily_volatility > 0.02 {
        RiskLevel::High
    } else if daily_volatility > 0.01 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    match concentration.max(swing) {
        RiskLevel::High => RiskLevel::High,
        RiskLevel::Medium | RiskLevel::MediumHigh => RiskLevel::MediumHigh,
        RiskLevel::Low => RiskLevel::Low,
    }
}

pub fn position_risk_levels(positions: &[CurrencyPosition]) -> Vec<PositionRisk> {
    positions
        .iter()
        .map(|p| PositionRisk {
            currency: p.currency.clone(),
            proportion: p.proportion,
            daily_volatility: p.daily_volatility,
            risk_level: determine_risk_level(p.proportion, p.daily_volatility),
        })
        .collect()
}

pub fn market_emotion(volatility: f64) -> MarketEmotion {
    if volatility > 0.1 {
        MarketEmotion::Bullish
    } else if volatility < 0.05 {
        MarketEmotion::Bearish
    } else {
        MarketEmotion::Neutral
    }
}

/// Risk grade of the position carrying the largest VaR.
pub fn assess_var_risk(positions: &[CurrencyPosition]) -> (RiskLevel, Option<&CurrencyPosition>) {
    let riskiest = positions.iter().max_by(|a, b| {
        a.value_at_risk
            .amount()
            .total_cmp(&b.value_at_risk.amount())
    });
    let amount = riskiest.map(|p| p.value_at_risk.amount()).unwrap_or(0.0);
    let level = if amount < 15_000.0 {
        RiskLevel::Low
    } else if amount < 30_000.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };
    (level, riskiest)
}

pub fn analyze_correlation(positions: &[CurrencyPosition]) -> (&'static str, &'static str) {
    if mean(positions.iter().map(|p| p.beta)) > 1.0 {
        ("强正相关", "中等")
    } else {
        ("弱负相关", "高")
    }
}

pub fn evaluate_hedging_cost(positions: &[CurrencyPosition]) -> (f64, Influence) {
    let avg = mean(positions.iter().map(|p| p.hedging_cost));
    let impact = if avg < 0.001 {
        Influence::Low
    } else if avg < 0.002 {
        Influence::Medium
    } else {
        Influence::High
    };
    (avg, impact)
}

pub fn currency_exposure(positions: &[CurrencyPosition]) -> Option<f64> {
    if positions.is_empty() {
        return None;
    }
    let quantity: f64 = positions.iter().map(|p| p.quantity).sum();
    Some(proportion_weighted_volatility(positions) * quantity)
}

pub fn term_risk_distribution(positions: &[CurrencyPosition]) -> Vec<TermRisk> {
    if positions.is_empty() {
        return Vec::new();
    }
    let vol = proportion_weighted_volatility(positions);
    [(30, 0.5), (60, 0.8), (90, 1.2)]
        .into_iter()
        .map(|(time, factor)| TermRisk {
            time,
            risk: round_to(vol * factor, 4),
        })
        .collect()
}

/// Top three positions by `quantity × dailyVolatility`, labelled like `EURUSD125`.
pub fn risk_transmission_path(positions: &[CurrencyPosition]) -> Vec<String> {
    let mut ranked: Vec<(&CurrencyPosition, f64)> = positions
        .iter()
        .map(|p| (p, p.quantity * p.daily_volatility))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(3)
        .map(|(p, factor)| format!("{}{}", p.currency.replace('/', ""), (factor / 1000.0) as i64))
        .collect()
}

pub fn macro_risk_coefficients() -> Vec<MacroRiskCoefficient> {
    vec![MacroRiskCoefficient {
        month: 1,
        all: 80.0,
        economy: 60.0,
        policy: 40.0,
        market: 20.0,
    }]
}

/// Price band around a unit base price.
pub fn single_currency_band(daily_volatility: f64) -> (f64, f64) {
    (
        round_to(1.0 + daily_volatility * 0.05, 4),
        round_to(1.0 - daily_volatility * 0.05, 4),
    )
}

pub fn single_currency_analysis(positions: &[CurrencyPosition]) -> Vec<SingleCurrencyAnalysis> {
    positions
        .iter()
        .map(|p| {
            let (upper, lower) = single_currency_band(p.daily_volatility);
            SingleCurrencyAnalysis {
                currency: p.currency.clone(),
                upper,
                lower,
            }
        })
        .collect()
}

/// Locally computed hedging indicators, embedded in prompts and used to
/// build the deterministic advice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HedgingMetrics {
    pub portfolio_volatility: f64,
    pub market_emotion: &'static str,
    pub var_risk_level: &'static str,
    pub max_var: MoneyValue,
    pub riskiest_currency: Option<String>,
    pub correlation: &'static str,
    pub hedge_effectiveness: &'static str,
    pub average_hedging_cost: f64,
    pub cost_impact: &'static str,
}

impl HedgingMetrics {
    pub fn compute(positions: &[CurrencyPosition]) -> Self {
        let volatility = proportion_weighted_volatility(positions);
        let (var_level, riskiest) = assess_var_risk(positions);
        let (correlation, effectiveness) = analyze_correlation(positions);
        let (cost, impact) = evaluate_hedging_cost(positions);
        Self {
            portfolio_volatility: volatility,
            market_emotion: market_emotion(volatility).label(),
            var_risk_level: var_level.label(),
            max_var: riskiest.map(|p| p.value_at_risk).unwrap_or_default(),
            riskiest_currency: riskiest.map(|p| p.currency.clone()),
            correlation,
            hedge_effectiveness: effectiveness,
            average_hedging_cost: cost,
            cost_impact: impact.label(),
        }
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn position(currency: &str, quantity: f64, proportion: f64, vol: f64) -> CurrencyPosition {
        CurrencyPosition {
            currency: currency.to_string(),
            quantity,
            proportion,
            benefit: 0.0,
            daily_volatility: vol,
            value_at_risk: MoneyValue(0.0),
            beta: 1.0,
            hedging_cost: 0.001,
            rate: 1.0,
        }
    }

    pub(crate) fn sample_book() -> Vec<CurrencyPosition> {
        let mut eur = position("EUR/USD", 1_000_000.0, 0.35, 0.125);
        eur.value_at_risk = MoneyValue(15_000.0);
        eur.beta = 1.2;
        eur.hedging_cost = 0.0015;
        let mut jpy = position("USD/JPY", 800_000.0, 0.28, 0.15);
        jpy.value_at_risk = MoneyValue(25_000.0);
        jpy.beta = 0.8;
        jpy.hedging_cost = 0.0012;
        let mut gbp = position("GBP/USD", 500_000.0, 0.17, 0.11);
        gbp.value_at_risk = MoneyValue(9_000.0);
        gbp.beta = 1.1;
        gbp.hedging_cost = 0.0018;
        vec![eur, jpy, gbp]
    }

    #[test]
    fn upload_metrics_weight_by_value() {
        let book = vec![
            position("EUR/USD", 600.0, 0.0, 0.01),
            position("USD/JPY", 400.0, 0.0, 0.02),
        ];
        let metrics = portfolio_metrics(&book, DEFAULT_RISK_FREE_RATE, DEFAULT_EXPECTED_RETURN);
        assert_eq!(metrics.total_value, 1000.0);
        assert!((metrics.portfolio_volatility - 0.014).abs() < 1e-12);
        assert!((metrics.sharpe_ratio - 0.05 / 0.014).abs() < 1e-9);

        let ratios = position_ratios(&book);
        assert!((ratios[0].proportion - 0.6).abs() < 1e-12);
    }

    #[test]
    fn empty_book_has_zero_metrics() {
        let metrics = portfolio_metrics(&[], DEFAULT_RISK_FREE_RATE, DEFAULT_EXPECTED_RETURN);
        assert_eq!(metrics.total_value, 0.0);
        assert_eq!(metrics.portfolio_volatility, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(currency_exposure(&[]), None);
        assert!(term_risk_distribution(&[]).is_empty());
    }

    #[test]
    fn var_formats_as_dollars() {
        assert_eq!(value_at_risk(1_000_000.0, 0.01), "$16,450");
        assert_eq!(value_at_risk(0.0, 0.01), "$0");
        assert_eq!(parse_money("$16,450"), 16_450.0);
        assert_eq!(parse_money("n/a"), 0.0);
    }

    #[test]
    fn risk_level_combines_concentration_and_volatility() {
        assert_eq!(determine_risk_level(0.4, 0.001), RiskLevel::High);
        assert_eq!(determine_risk_level(0.3, 0.001), RiskLevel::MediumHigh);
        assert_eq!(determine_risk_level(0.1, 0.015), RiskLevel::MediumHigh);
        assert_eq!(determine_risk_level(0.1, 0.03), RiskLevel::High);
        assert_eq!(determine_risk_level(0.1, 0.005), RiskLevel::Low);
    }

    #[test]
    fn hedging_tools_match_thresholds() {
        let book = sample_book();
        assert_eq!(market_emotion(0.2), MarketEmotion::Bullish);
        assert_eq!(market_emotion(0.01), MarketEmotion::Bearish);
        assert_eq!(market_emotion(0.07), MarketEmotion::Neutral);

        let (level, riskiest) = assess_var_risk(&book);
        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(riskiest.map(|p| p.currency.as_str()), Some("USD/JPY"));

        assert_eq!(analyze_correlation(&book), ("强正相关", "中等"));
        let (cost, impact) = evaluate_hedging_cost(&book);
        assert!((cost - 0.0015).abs() < 1e-12);
        assert_eq!(impact, Influence::Medium);
    }

    #[test]
    fn report_helpers_follow_volatility() {
        let book = sample_book();
        let vol = proportion_weighted_volatility(&book);
        let terms = term_risk_distribution(&book);
        assert_eq!(terms.iter().map(|t| t.time).collect::<Vec<_>>(), vec![30, 60, 90]);
        assert_eq!(terms[2].risk, round_to(vol * 1.2, 4));

        let path = risk_transmission_path(&book);
        assert_eq!(path, vec!["EURUSD125", "USDJPY120", "GBPUSD55"]);

        let (upper, lower) = single_currency_band(0.2);
        assert_eq!((upper, lower), (1.01, 0.99));
    }

    #[test]
    fn return_series_helpers() {
        assert!((daily_volatility(&[1.0, 1.0, 1.0]) - 0.0).abs() < 1e-12);
        assert!(daily_volatility(&[1.0, 1.1, 0.9, 1.05]) > 0.0);
        assert_eq!(beta(&[0.01], &[0.01, 0.02]), 1.0);
        assert!((beta(&[0.02, 0.04, -0.02], &[0.01, 0.02, -0.01]) - 2.0).abs() < 1e-9);
        assert!((cumulative_return(1.1, 1.0) - 0.1).abs() < 1e-12);
        assert_eq!(cumulative_return(5.0, 0.0), 0.0);
        assert!((max_drawdown(&[1.0, 1.2, 0.9, 1.3]) - 0.25).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0]), 0.0);
        assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]), 0.0);
        assert_eq!(hedging_cost_ratio(10.0, 0.0), 0.0);
    }
}
