//! Deterministic payloads served when the model is unavailable or its
//! answer cannot be parsed.

use domain::{
    CorrelationAnalysis, CostBenefitAnalysis, CurrencyPosition, CurrencyPrediction,
    CurrentHedgingAdvice, HedgingAdvice, Influence, MarketEmotion, PositionRiskAssessment,
    RecommendedPosition, RiskReport, RiskSignalAnalysis, RiskValues, StressTestResult,
};

use crate::{
    assess_var_risk, currency_exposure, macro_risk_coefficients, market_emotion,
    proportion_weighted_volatility, risk_transmission_path, single_currency_analysis,
    single_currency_band, term_risk_distribution, HedgingMetrics,
};

pub fn fallback_hedging_advice(positions: &[CurrencyPosition]) -> HedgingAdvice {
    let metrics = HedgingMetrics::compute(positions);
    let emotion = market_emotion(metrics.portfolio_volatility);
    let (risk, riskiest) = assess_var_risk(positions);
    let (_, cost_impact) = crate::evaluate_hedging_cost(positions);

    let hedging_suggestion = match emotion {
        MarketEmotion::Bullish => "市场情绪偏多，可适当降低对冲比例",
        MarketEmotion::Bearish => "市场情绪偏空，建议提高对冲比例",
        MarketEmotion::Neutral => "维持现有对冲比例并持续观察",
    };
    let risk_suggestion = match riskiest {
        Some(position) => format!("重点关注{}的风险敞口，必要时分批减仓", position.currency),
        None => "暂无需要调整的高风险头寸".to_string(),
    };
    let correlation_suggestion = if metrics.correlation == "强正相关" {
        "持仓同向性较强，建议引入负相关货币对进行对冲"
    } else {
        "当前组合分散度较好，可维持现有对冲结构"
    };
    let cost_suggestion = match cost_impact {
        Influence::High => "对冲成本偏高，建议仅对高风险头寸进行策略性对冲",
        Influence::Medium => "进行策略性对冲",
        Influence::Low => "对冲成本较低，可适度提高对冲覆盖率",
    };

    HedgingAdvice {
        historical_analysis: None,
        current_hedging_advice: CurrentHedgingAdvice {
            volatility: metrics.portfolio_volatility,
            emotion,
            suggestion: hedging_suggestion.to_string(),
        },
        position_risk_assessment: PositionRiskAssessment {
            risk,
            var: metrics.max_var,
            suggestion: risk_suggestion,
        },
        correlation_analysis: CorrelationAnalysis {
            relative: metrics.correlation.to_string(),
            estimate: metrics.hedge_effectiveness.to_string(),
            suggestion: correlation_suggestion.to_string(),
        },
        cost_benefit_analysis: CostBenefitAnalysis {
            cost: metrics.average_hedging_cost,
            influence: cost_impact,
            suggestion: cost_suggestion.to_string(),
        },
        recommended_positions: positions
            .iter()
            .map(|p| RecommendedPosition {
                currency: p.base_currency().to_string(),
                quantity: (p.quantity * 0.8) as i64,
            })
            .collect(),
    }
}

pub fn fallback_stress_test(scenario: &str) -> StressTestResult {
    StressTestResult {
        scenario: scenario.to_string(),
        influence: Influence::Medium,
        probability: 0.05,
        suggestion: "保持当前持仓".to_string(),
        money: 0.0,
    }
}

pub fn fallback_currency_prediction(daily_volatility: Option<f64>) -> CurrencyPrediction {
    let (upper, lower) = single_currency_band(daily_volatility.unwrap_or(0.0));
    CurrencyPrediction { upper, lower }
}

/// Emotion-keyed baseline on the 0-10 scale.
pub fn risk_signal_baseline(emotion: MarketEmotion) -> RiskValues {
    let (credit, policy, market, politician, economy) = match emotion {
        MarketEmotion::Bullish => (6.0, 2.0, 4.0, 3.0, 5.0),
        MarketEmotion::Bearish => (8.0, 3.0, 2.0, 5.0, 4.0),
        MarketEmotion::Neutral => (7.0, 2.5, 3.0, 4.0, 4.5),
    };
    RiskValues {
        credit,
        policy,
        market,
        politician,
        economy,
    }
}

pub fn fallback_risk_signals(positions: &[CurrencyPosition]) -> RiskSignalAnalysis {
    let emotion = market_emotion(proportion_weighted_volatility(positions));
    let current = risk_signal_baseline(emotion);
    RiskSignalAnalysis {
        current,
        warning: current.map(|v| (v + 1.0).min(10.0)),
    }
}

pub fn fallback_risk_report(positions: &[CurrencyPosition]) -> RiskReport {
    RiskReport {
        currency_exposure: currency_exposure(positions),
        term_risk_distribution: term_risk_distribution(positions),
        risk_transmission_path: risk_transmission_path(positions),
        macro_risk_coefficients: macro_risk_coefficients(),
        risk_signal_analysis: fallback_risk_signals(positions),
        single_currency_analysis: single_currency_analysis(positions),
    }
}
