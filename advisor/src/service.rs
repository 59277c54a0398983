use std::time::Instant;

use async_trait::async_trait;
use domain::{
    CurrencyPosition, CurrencyPrediction, HedgingAdvice, MoneyValue, PositionRisk, RiskReport,
    RiskSignalAnalysis, RiskValues, StressTestResult,
};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::json::parse_contract;
use crate::prompts;
use crate::{AdvisorError, AdvisorResult, ChatMessage, ChatModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Hedging,
    StressTest,
    CurrencyPrediction,
    RiskSignals,
    RiskReport,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Hedging => "hedging",
            Task::StressTest => "stress_test",
            Task::CurrencyPrediction => "currency_prediction",
            Task::RiskSignals => "risk_signals",
            Task::RiskReport => "risk_report",
        }
    }
}

/// Dashboard analyses. Model failures never surface here: every method
/// degrades to a deterministic payload and only rejects bad input.
#[async_trait]
pub trait AdvisorService: Send + Sync {
    async fn hedging_advice(&self, positions: &[CurrencyPosition]) -> AdvisorResult<HedgingAdvice>;
    async fn stress_test(
        &self,
        scenario: &str,
        positions: &[CurrencyPosition],
    ) -> AdvisorResult<StressTestResult>;
    async fn currency_prediction(
        &self,
        pair: &str,
        daily_volatility: Option<f64>,
    ) -> AdvisorResult<CurrencyPrediction>;
    async fn risk_signals(&self, positions: &[CurrencyPosition]) -> AdvisorResult<RiskSignalAnalysis>;
    async fn risk_report(&self, positions: &[CurrencyPosition]) -> AdvisorResult<RiskReport>;
    fn position_risk_levels(&self, positions: &[CurrencyPosition]) -> Vec<PositionRisk>;
}

pub struct LlmAdvisor<M> {
    model: Option<M>,
}

impl<M: ChatModel> LlmAdvisor<M> {
    pub fn new(model: M) -> Self {
        Self { model: Some(model) }
    }

    /// Serves every analysis from the deterministic fallbacks.
    pub fn offline() -> Self {
        Self { model: None }
    }

    pub fn is_online(&self) -> bool {
        self.model.is_some()
    }

    async fn run_task<T>(
        &self,
        task: Task,
        system: String,
        user: String,
        schema: &str,
        fallback: impl FnOnce() -> T + Send,
    ) -> T
    where
        T: DeserializeOwned + Normalize + Send,
    {
        let Some(model) = &self.model else {
            counter!("advisor_requests_total", "task" => task.as_str(), "outcome" => "fallback")
                .increment(1);
            return fallback();
        };

        let started = Instant::now();
        let outcome = ask::<T>(model, task, system, user, schema).await;
        histogram!("advisor_latency_seconds", "task" => task.as_str())
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok((value, how)) => {
                counter!("advisor_requests_total", "task" => task.as_str(), "outcome" => how)
                    .increment(1);
                info!(task = task.as_str(), outcome = how, latency_ms = started.elapsed().as_millis() as u64, "analysis completed");
                value.normalized()
            }
            Err(err) => {
                counter!("advisor_requests_total", "task" => task.as_str(), "outcome" => "fallback")
                    .increment(1);
                warn!(task = task.as_str(), error = %err, "model analysis failed, serving fallback");
                fallback()
            }
        }
    }
}

async fn ask<T: DeserializeOwned>(
    model: &impl ChatModel,
    task: Task,
    system: String,
    user: String,
    schema: &str,
) -> AdvisorResult<(T, &'static str)> {
    debug!(task = task.as_str(), model = model.model_name(), "requesting analysis");
    let raw = model
        .complete(&[ChatMessage::system(system), ChatMessage::user(user)])
        .await?;
    match parse_contract::<T>(&raw) {
        Ok(value) => return Ok((value, "parsed")),
        Err(err) => debug!(task = task.as_str(), error = %err, "answer did not match schema, repairing"),
    }
    let repaired = model
        .complete(&[
            ChatMessage::system(prompts::repair_system(schema)),
            ChatMessage::user(raw),
        ])
        .await?;
    parse_contract::<T>(&repaired).map(|value| (value, "repaired"))
}

fn require_positions(positions: &[CurrencyPosition]) -> AdvisorResult<()> {
    if positions.is_empty() {
        return Err(AdvisorError::InvalidInput("positions must not be empty".into()));
    }
    Ok(())
}

#[async_trait]
impl<M: ChatModel + 'static> AdvisorService for LlmAdvisor<M> {
    async fn hedging_advice(&self, positions: &[CurrencyPosition]) -> AdvisorResult<HedgingAdvice> {
        require_positions(positions)?;
        let metrics = risk_engine::HedgingMetrics::compute(positions);
        let user = prompts::hedging_user(positions, &metrics);
        Ok(self
            .run_task(Task::Hedging, prompts::hedging_system(), user, prompts::HEDGING_SCHEMA, || {
                risk_engine::fallback_hedging_advice(positions)
            })
            .await)
    }

    async fn stress_test(
        &self,
        scenario: &str,
        positions: &[CurrencyPosition],
    ) -> AdvisorResult<StressTestResult> {
        let scenario = scenario.trim();
        if scenario.is_empty() {
            return Err(AdvisorError::InvalidInput("scenario must not be blank".into()));
        }
        let user = prompts::stress_test_user(scenario, positions);
        let mut result = self
            .run_task(
                Task::StressTest,
                prompts::stress_test_system(),
                user,
                prompts::STRESS_TEST_SCHEMA,
                || risk_engine::fallback_stress_test(scenario),
            )
            .await;
        if result.scenario.trim().is_empty() {
            result.scenario = scenario.to_string();
        }
        Ok(result)
    }

    async fn currency_prediction(
        &self,
        pair: &str,
        daily_volatility: Option<f64>,
    ) -> AdvisorResult<CurrencyPrediction> {
        let pair = pair.trim();
        if pair.is_empty() {
            return Err(AdvisorError::InvalidInput("currency pair must not be blank".into()));
        }
        let user = prompts::currency_prediction_user(pair, daily_volatility);
        Ok(self
            .run_task(
                Task::CurrencyPrediction,
                prompts::currency_prediction_system(),
                user,
                prompts::CURRENCY_PREDICTION_SCHEMA,
                || risk_engine::fallback_currency_prediction(daily_volatility),
            )
            .await)
    }

    async fn risk_signals(&self, positions: &[CurrencyPosition]) -> AdvisorResult<RiskSignalAnalysis> {
        require_positions(positions)?;
        let user = prompts::risk_signal_user(positions);
        Ok(self
            .run_task(
                Task::RiskSignals,
                prompts::risk_signal_system(),
                user,
                prompts::RISK_SIGNAL_SCHEMA,
                || risk_engine::fallback_risk_signals(positions),
            )
            .await)
    }

    async fn risk_report(&self, positions: &[CurrencyPosition]) -> AdvisorResult<RiskReport> {
        require_positions(positions)?;
        let computed = risk_engine::fallback_risk_report(positions);
        let reference = serde_json::to_value(&computed)
            .map_err(|err| AdvisorError::InvalidInput(err.to_string()))?;
        let user = prompts::risk_report_user(positions, &reference);
        Ok(self
            .run_task(
                Task::RiskReport,
                prompts::risk_report_system(),
                user,
                prompts::RISK_REPORT_SCHEMA,
                move || computed,
            )
            .await)
    }

    fn position_risk_levels(&self, positions: &[CurrencyPosition]) -> Vec<PositionRisk> {
        risk_engine::position_risk_levels(positions)
    }
}

/// Clamps model output back into the ranges the dashboard expects.
trait Normalize {
    fn normalized(self) -> Self;
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 10.0)
    } else {
        0.0
    }
}

impl Normalize for HedgingAdvice {
    fn normalized(mut self) -> Self {
        self.current_hedging_advice.volatility = non_negative(self.current_hedging_advice.volatility);
        self.position_risk_assessment.var = MoneyValue(non_negative(self.position_risk_assessment.var.amount()));
        self.cost_benefit_analysis.cost = non_negative(self.cost_benefit_analysis.cost);
        self.recommended_positions.retain(|p| !p.currency.trim().is_empty());
        for position in &mut self.recommended_positions {
            position.quantity = position.quantity.max(0);
        }
        self
    }
}

impl Normalize for StressTestResult {
    fn normalized(mut self) -> Self {
        // some models answer with percentages
        if self.probability > 1.0 && self.probability <= 100.0 {
            self.probability /= 100.0;
        }
        self.probability = if self.probability.is_finite() {
            self.probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.money = self.money.abs();
        if !self.money.is_finite() {
            self.money = 0.0;
        }
        self
    }
}

impl Normalize for CurrencyPrediction {
    fn normalized(self) -> Self {
        if self.upper < self.lower {
            CurrencyPrediction {
                upper: self.lower,
                lower: self.upper,
            }
        } else {
            self
        }
    }
}

fn clamp_values(values: RiskValues) -> RiskValues {
    values.map(score)
}

impl Normalize for RiskSignalAnalysis {
    fn normalized(self) -> Self {
        RiskSignalAnalysis {
            current: clamp_values(self.current),
            warning: clamp_values(self.warning),
        }
    }
}

impl Normalize for RiskReport {
    fn normalized(mut self) -> Self {
        self.currency_exposure = self.currency_exposure.map(non_negative);
        self.risk_signal_analysis = self.risk_signal_analysis.normalized();
        for term in &mut self.term_risk_distribution {
            term.risk = non_negative(term.risk);
        }
        for band in &mut self.single_currency_analysis {
            if band.upper < band.lower {
                std::mem::swap(&mut band.upper, &mut band.lower);
            }
        }
        self
    }
}
