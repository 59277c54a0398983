use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use advisor::{AdvisorError, AdvisorResult, ChatMessage, ChatModel, LlmAdvisor, LlmConfig};
use api::{
    analysis_limiter::AnalysisLimiter,
    app::build_router,
    config::AppConfig,
    repositories::InMemoryPortfolioRepository,
    state::AppState,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use market_data::{
    IFindConfig, KlinePeriod, MarketDataResult, MarketDataService, MinuteInterval,
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|v| v.to_string()).collect()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> AdvisorResult<String> {
        self.replies
            .lock()
            .expect("replies")
            .pop_front()
            .ok_or(AdvisorError::EmptyCompletion)
    }
}

/// Records calls and answers with canned vendor tables.
#[derive(Default)]
struct StubMarketData {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl MarketDataService for StubMarketData {
    async fn realtime(&self, codes: &[String]) -> MarketDataResult<Value> {
        self.calls.lock().expect("calls").push(format!("realtime:{}", codes.join(",")));
        Ok(json!({
            "errorcode": 0,
            "tables": codes.iter().map(|code| json!({
                "thscode": code,
                "table": { "latest": [7.21], "changeRatio": [0.1], "open": [7.2], "high": [7.3], "low": [7.1] }
            })).collect::<Vec<_>>()
        }))
    }

    async fn kline(&self, code: &str, period: KlinePeriod, count: u32) -> MarketDataResult<Value> {
        self.calls
            .lock()
            .expect("calls")
            .push(format!("kline:{code}:{}:{count}", period.interval_code()));
        Ok(json!({
            "tables": [{
                "time": ["2024-01-02", "2024-01-01"],
                "table": {
                    "open": [7.1, 7.0], "close": [7.15, 7.05],
                    "low": [7.0, 6.9], "high": [7.2, 7.1]
                }
            }]
        }))
    }

    async fn minute(&self, code: &str, interval: MinuteInterval, count: u32) -> MarketDataResult<Value> {
        self.calls
            .lock()
            .expect("calls")
            .push(format!("minute:{code}:{}:{count}", interval.minutes()));
        Ok(json!({
            "tables": [{
                "time": ["2024-01-02 09:35", "2024-01-02 09:30"],
                "table": { "latest": [7.22, 7.21] }
            }]
        }))
    }

    async fn indicator(
        &self,
        code: &str,
        name: &str,
        period: u32,
        _count: u32,
        interval: MinuteInterval,
    ) -> MarketDataResult<Value> {
        self.calls
            .lock()
            .expect("calls")
            .push(format!("indicator:{code}:{name}:{period}:{}", interval.minutes()));
        Ok(json!({ "indicator": name, "values": [1.0, 2.0] }))
    }
}

fn test_config(throttle: Duration) -> AppConfig {
    AppConfig {
        port: 0,
        frontend_origins: vec!["http://localhost:3000".into()],
        llm: LlmConfig::default(),
        ifind: IFindConfig::default(),
        database_url: None,
        redis_url: None,
        analysis_throttle_window: throttle,
        risk_free_rate: 0.03,
        expected_return: 0.08,
    }
}

struct TestApp {
    router: Router,
    market: Arc<StubMarketData>,
}

async fn test_app(replies: Vec<Value>, with_market: bool, throttle: Duration) -> TestApp {
    let config = test_config(throttle);
    let market = Arc::new(StubMarketData::default());
    let analysis_limiter = AnalysisLimiter::new(throttle, None)
        .await
        .expect("limiter");
    let state = AppState {
        config,
        advisor: Arc::new(LlmAdvisor::new(ScriptedModel::new(replies))),
        market_data: with_market.then(|| market.clone() as Arc<dyn MarketDataService>),
        portfolio_repo: Arc::new(InMemoryPortfolioRepository::default()),
        analysis_limiter: Arc::new(analysis_limiter),
    };
    let router = build_router(state, Vec::new())
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    TestApp { router, market }
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn sample_positions() -> Value {
    json!([
        {"currency": "EUR/USD", "quantity": 1000000, "proportion": 0.35, "benefit": 2500,
         "dailyVolatility": 0.125, "valueAtRisk": "$15,000", "beta": 1.2, "hedgingCost": 0.0015},
        {"currency": "USD/JPY", "quantity": 800000, "proportion": 0.28, "benefit": -1200,
         "dailyVolatility": 0.15, "valueAtRisk": "$25,000", "beta": 0.8, "hedgingCost": 0.0012}
    ])
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app(Vec::new(), false, Duration::ZERO).await;
    let (status, body) = call(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "RiskFX服务运行正常");

    let response = app.router.clone().oneshot(get("/")).await.expect("response");
    let banner = to_bytes(response.into_body(), 1024).await.expect("body");
    assert_eq!(&banner[..], "RiskFX API 服务运行正常".as_bytes());
}

#[tokio::test]
async fn upload_returns_metrics_and_rejects_bad_payloads() {
    let app = test_app(Vec::new(), false, Duration::ZERO).await;

    let (status, body) = call(&app.router, post_json("/api/portfolio/upload", sample_positions())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "持仓数据上传成功");
    assert_eq!(body["data"]["totalValue"], 1_800_000.0);
    assert!(body["data"]["sharpeRatio"].as_f64().expect("sharpe") > 0.0);

    for bad in [json!([]), json!({"currency": "EUR/USD"}), json!([{"quantity": 1}])] {
        let (status, body) = call(&app.router, post_json("/api/portfolio/upload", bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "无效的持仓数据格式");
    }
}

#[tokio::test]
async fn analyses_require_an_upload() {
    let app = test_app(Vec::new(), false, Duration::ZERO).await;
    for uri in [
        "/api/portfolio/hedging-advice",
        "/api/portfolio/risk-signals",
        "/api/portfolio/risk-levels",
        "/api/portfolio/risk-report",
    ] {
        let (status, body) = call(&app.router, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["message"], "未找到持仓数据，请先上传");
    }
}

#[tokio::test]
async fn hedging_advice_uses_model_answer() {
    let answer = json!({
        "currentHedgingAdvice": {"volatility": "0.14", "emotion": "偏空", "suggestion": "增加对冲"},
        "positionRiskAssessment": {"risk": "高风险", "var": "$25,000", "suggestion": "降低日元敞口"},
        "correlationAnalysis": {"relative": "负相关", "estimate": "中", "suggestion": "分散"},
        "costBenefitAnalysis": {"cost": 0.0013, "influence": "中", "suggestion": "可接受"},
        "recommendedPositions": [{"currency": "EUR", "quantity": 800000}]
    });
    let app = test_app(vec![answer], false, Duration::ZERO).await;
    call(&app.router, post_json("/api/portfolio/upload", sample_positions())).await;

    let (status, body) = call(&app.router, get("/api/portfolio/hedging-advice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentHedgingAdvice"]["emotion"], "偏空");
    assert_eq!(body["data"]["positionRiskAssessment"]["var"], "$25,000");
    assert_eq!(body["data"]["recommendedPositions"][0]["quantity"], 800000);
}

#[tokio::test]
async fn risk_levels_are_computed_locally() {
    let app = test_app(Vec::new(), false, Duration::ZERO).await;
    call(&app.router, post_json("/api/portfolio/upload", sample_positions())).await;

    let (status, body) = call(&app.router, get("/api/portfolio/risk-levels")).await;
    assert_eq!(status, StatusCode::OK);
    let levels = body["data"].as_array().expect("levels");
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0]["currency"], "EUR/USD");
}

#[tokio::test]
async fn stress_test_validates_scenario_and_falls_back() {
    // 模型沒有回覆時走本地預設結果
    let app = test_app(Vec::new(), false, Duration::ZERO).await;

    let (status, body) = call(&app.router, post_json("/api/risk/stress-test", json!({"scenario": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "无效的压力测试情景");

    let (status, body) = call(
        &app.router,
        post_json(
            "/api/risk/stress-test",
            json!({"scenario": "美联储加息", "positions": sample_positions()}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scenario"], "美联储加息");
    assert_eq!(body["data"]["influence"], "中");

    let (status, body) = call(
        &app.router,
        post_json(
            "/api/risk/stress-test",
            json!({"scenario": "美联储加息", "positions": "EUR/USD"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "无效的持仓数据格式");
}

#[tokio::test]
async fn currency_prediction_rejects_blank_pair() {
    let app = test_app(vec![json!({"upper": 7.3, "lower": 7.1})], false, Duration::ZERO).await;

    let (status, body) = call(&app.router, post_json("/api/risk/currency-prediction", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "无效的货币对");

    let (status, body) = call(
        &app.router,
        post_json("/api/risk/currency-prediction", json!({"currency": "USD/CNY"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["upper"], 7.3);
}

#[tokio::test]
async fn analyses_are_throttled_per_client_and_endpoint() {
    let app = test_app(Vec::new(), false, Duration::from_secs(60)).await;
    call(&app.router, post_json("/api/portfolio/upload", sample_positions())).await;

    // 儀表板一次載入多個分析，各自獨立計數
    for uri in [
        "/api/portfolio/risk-signals",
        "/api/portfolio/risk-report",
        "/api/portfolio/hedging-advice",
    ] {
        let (status, _) = call(&app.router, get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }

    let (status, body) = call(&app.router, get("/api/portfolio/risk-report")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);

    // risk-levels 不經過模型，不受限流影響
    let (status, _) = call(&app.router, get("/api/portfolio/risk-levels")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_expose_advisor_outcomes() {
    let app = test_app(
        vec![
            json!({"upper": 7.3, "lower": 7.1}),
            json!("上限 7.4，下限 7.0"),
            json!({"upper": 7.4, "lower": 7.0}),
        ],
        false,
        Duration::ZERO,
    )
    .await;
    call(&app.router, post_json("/api/portfolio/upload", sample_positions())).await;

    let prediction = json!({"currency": "USD/CNY"});
    let (status, _) = call(&app.router, post_json("/api/risk/currency-prediction", prediction.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app.router, post_json("/api/risk/currency-prediction", prediction)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["upper"], 7.4);
    // replies are used up, so this one falls back
    let (status, _) = call(&app.router, get("/api/portfolio/risk-signals")).await;
    assert_eq!(status, StatusCode::OK);

    let response = app.router.clone().oneshot(get("/metrics")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
    let text = String::from_utf8(body.to_vec()).expect("utf8");
    let counter_lines: Vec<&str> = text
        .lines()
        .filter(|line| line.starts_with("advisor_requests_total{"))
        .collect();
    for (task, outcome) in [
        ("currency_prediction", "parsed"),
        ("currency_prediction", "repaired"),
        ("risk_signals", "fallback"),
    ] {
        let task = format!("task=\"{task}\"");
        let outcome = format!("outcome=\"{outcome}\"");
        assert!(
            counter_lines.iter().any(|line| line.contains(&task) && line.contains(&outcome)),
            "missing {task} {outcome} in {counter_lines:?}"
        );
    }
    assert!(text.contains("advisor_latency_seconds"));
}

#[tokio::test]
async fn forex_unavailable_without_vendor() {
    let app = test_app(Vec::new(), false, Duration::ZERO).await;
    let (status, body) = call(&app.router, get("/api/forex/realtime")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "外汇服务未初始化");
}

#[tokio::test]
async fn forex_realtime_defaults_to_majors() {
    let app = test_app(Vec::new(), true, Duration::ZERO).await;
    let (status, body) = call(&app.router, get("/api/forex/realtime")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().expect("quotes").len(), 4);
    assert_eq!(body["data"][0]["code"], "USDCNY.FX");
    assert_eq!(body["data"][0]["changeRatio"], 0.1);
}

#[tokio::test]
async fn forex_chart_routes_by_period() {
    let app = test_app(Vec::new(), true, Duration::ZERO).await;

    let (status, body) = call(
        &app.router,
        get("/api/forex/chart?currency_pair=EUR/USD&chart_type=kline&period=1d&count=2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currency_pair"], "EUR/USD");
    assert_eq!(body["chart_type"], "kline");
    assert_eq!(body["data"][0], json!(["2024-01-01", 7.0, 7.05, 6.9, 7.1, 0.0]));

    let (status, body) = call(&app.router, get("/api/forex/chart")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], "5min");
    assert_eq!(body["data"][0], json!(["2024-01-02 09:30", 7.21]));

    let calls = app.market.calls.lock().expect("calls").clone();
    assert!(calls[0].starts_with("kline:EURUSD.FX"));
    assert_eq!(calls[1], "minute:USDCNY.FX:5:100");
}

#[tokio::test]
async fn forex_indicators_validate_interval() {
    let app = test_app(Vec::new(), true, Duration::ZERO).await;

    let (status, _) = call(&app.router, get("/api/forex/indicators?interval=7")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app.router, get("/api/forex/multi-indicators?currency_pair=GBPUSD")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ma"]["indicator"], "MA");
    assert_eq!(body["data"]["macd"]["indicator"], "MACD");
    assert_eq!(body["currency_pair"], "GBPUSD");
}
