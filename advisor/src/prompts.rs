//! Prompt templates. Each system prompt carries its own output schema so the
//! repair pass can reuse it.

use domain::CurrencyPosition;
use risk_engine::HedgingMetrics;
use serde_json::json;

pub const HEDGING_SCHEMA: &str = r#"{
  "historicalAnalysis": null,
  "currentHedgingAdvice": {"volatility": 0.12, "emotion": "偏多|偏空|中性", "suggestion": "对冲建议"},
  "positionRiskAssessment": {"risk": "高风险|中风险|低风险", "var": "$25,000", "suggestion": "风险管理建议"},
  "correlationAnalysis": {"relative": "强正相关|弱负相关|无相关", "estimate": "高|中等|低", "suggestion": "相关性对冲建议"},
  "costBenefitAnalysis": {"cost": 0.0015, "influence": "高|中|低", "suggestion": "成本收益对冲建议"},
  "recommendedPositions": [{"currency": "EUR", "quantity": 800000}]
}"#;

pub const STRESS_TEST_SCHEMA: &str = r#"{
  "scenario": "原情景描述",
  "influence": "高|中|低",
  "probability": 0.3,
  "suggestion": "对冲建议",
  "money": 120000
}"#;

pub const CURRENCY_PREDICTION_SCHEMA: &str = r#"{"upper": 7.35, "lower": 7.10}"#;

pub const RISK_SIGNAL_SCHEMA: &str = r#"{
  "current": {"credit": 7, "policy": 2.5, "market": 3, "politician": 4, "economy": 4.5},
  "warning": {"credit": 8, "policy": 3.5, "market": 4, "politician": 5, "economy": 5.5}
}"#;

pub const RISK_REPORT_SCHEMA: &str = r#"{
  "currencyExposure": 12500.0,
  "termRiskDistribution": [{"time": 30, "risk": 0.06}, {"time": 60, "risk": 0.1}, {"time": 90, "risk": 0.15}],
  "riskTransmissionPath": ["EURUSD125", "USDJPY120"],
  "macroRiskCoefficients": [{"month": 1, "all": 80, "economy": 60, "policy": 40, "market": 20}],
  "riskSignalAnalysis": {
    "current": {"credit": 7, "policy": 2.5, "market": 3, "politician": 4, "economy": 4.5},
    "warning": {"credit": 8, "policy": 3.5, "market": 4, "politician": 5, "economy": 5.5}
  },
  "singleCurrencyAnalysis": [{"currency": "EUR/USD", "upper": 1.01, "lower": 0.99}]
}"#;

const JSON_ONLY: &str = "只输出一个 JSON 对象，不要输出任何解释、Markdown 或代码块标记。";

pub fn hedging_system() -> String {
    format!(
        "你是一个专业的金融市场智能对冲分析助手，专注于外汇市场的风险管理和对冲策略优化。\
         请根据用户提供的持仓数据和预先计算的指标完成以下分析：\n\
         1. 市场波动性分析：组合日波动率与市场情绪（偏多/中性/偏空）。\n\
         2. 头寸风险评估：VaR 与风险等级，并针对高风险头寸给出建议。\n\
         3. 相关性分析：货币对之间的相关性及对冲效果预估。\n\
         4. 成本效益分析：平均对冲成本及其对收益的影响。\n\
         5. 建议持仓：给出具体的持仓调整数量。\n\
         建议应简洁、可操作，优先减少高风险敞口并控制对冲成本。\n\
         输出格式：\n{HEDGING_SCHEMA}\n{JSON_ONLY}"
    )
}

pub fn stress_test_system() -> String {
    format!(
        "你是一个专业的金融市场情景分析专家，专注于评估宏观经济事件对外汇市场的影响。\
         请根据用户提供的情景和持仓完成：\n\
         1. 影响程度评估（高/中/低）。\n\
         2. 该情景未来6个月内发生的概率（0-1之间的数值）。\n\
         3. 具体可执行的对冲建议。\n\
         4. 潜在损失金额（美元，数值）。\n\
         输出格式：\n{STRESS_TEST_SCHEMA}\n{JSON_ONLY}"
    )
}

pub fn currency_prediction_system() -> String {
    format!(
        "你是一个专业的外汇市场分析专家。请根据用户提供的货币对，结合当前市场条件与历史数据，\
         预测该货币对未来一段时间的价格上限与下限。\n\
         输出格式：\n{CURRENCY_PREDICTION_SCHEMA}\n{JSON_ONLY}"
    )
}

pub fn risk_signal_system() -> String {
    format!(
        "你是一名专业的金融市场风险分析专家。请基于用户的货币持仓，对信用风险、政策风险、\
         市场流动性、政治风险和经济风险进行评估，每项给出 0（无风险）到 10（极高风险）的风险值，\
         并给出对应的预警阈值（超过阈值即存在潜在风险）。\n\
         输出格式：\n{RISK_SIGNAL_SCHEMA}\n{JSON_ONLY}"
    )
}

pub fn risk_report_system() -> String {
    format!(
        "你是一位金融风险分析专家。请将用户的货币持仓数据转换为风险分析报告：\n\
         - currencyExposure：整体货币敞口，无法计算时为 null。\n\
         - termRiskDistribution：30/60/90 天的账期风险分布。\n\
         - riskTransmissionPath：持仓规模大、风险高的主要货币对，附加数值标签。\n\
         - macroRiskCoefficients：经济、政策、市场相关的宏观风险系数。\n\
         - riskSignalAnalysis：各项风险 0-10 的当前值与预警阈值。\n\
         - singleCurrencyAnalysis：每个货币对的价格上下限预测。\n\
         可参考用户消息中预先计算的指标。\n\
         输出格式：\n{RISK_REPORT_SCHEMA}\n{JSON_ONLY}"
    )
}

pub fn repair_system(schema: &str) -> String {
    format!(
        "请将以下内容解析为符合给定结构的 JSON。保留原有含义，缺失的数值字段填 0，缺失的文本字段填空字符串。\n\
         结构：\n{schema}\n{JSON_ONLY}"
    )
}

pub fn hedging_user(positions: &[CurrencyPosition], metrics: &HedgingMetrics) -> String {
    json!({ "positions": positions, "metrics": metrics }).to_string()
}

pub fn stress_test_user(scenario: &str, positions: &[CurrencyPosition]) -> String {
    json!({ "scenario": scenario, "positions": positions }).to_string()
}

pub fn currency_prediction_user(pair: &str, daily_volatility: Option<f64>) -> String {
    json!({ "currency": pair, "dailyVolatility": daily_volatility }).to_string()
}

pub fn risk_signal_user(positions: &[CurrencyPosition]) -> String {
    json!({ "positions": positions }).to_string()
}

pub fn risk_report_user(positions: &[CurrencyPosition], reference: &serde_json::Value) -> String {
    json!({ "positions": positions, "computed": reference }).to_string()
}
