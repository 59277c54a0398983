use std::{
    collections::HashMap,
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use advisor::Task;
use tokio::sync::Mutex;

#[derive(Clone)]
enum AnalysisLimiterBackend {
    Disabled,
    Memory {
        inner: Arc<Mutex<HashMap<(IpAddr, Task), Instant>>>,
        window: Duration,
    },
    Redis {
        client: redis::Client,
        window: Duration,
        key_prefix: String,
    },
}

/// Allows one run of each model-backed analysis per client address per window.
#[derive(Clone)]
pub struct AnalysisLimiter {
    backend: AnalysisLimiterBackend,
}

impl AnalysisLimiter {
    pub async fn new(window: Duration, redis_url: Option<String>) -> anyhow::Result<Self> {
        if window.is_zero() {
            return Ok(Self::disabled());
        }
        if let Some(url) = redis_url {
            let client = redis::Client::open(url)?;
            Ok(Self {
                backend: AnalysisLimiterBackend::Redis {
                    client,
                    // SET EX needs whole seconds
                    window: window.max(Duration::from_secs(1)),
                    key_prefix: "analysis:ip:".to_string(),
                },
            })
        } else {
            Ok(Self {
                backend: AnalysisLimiterBackend::Memory {
                    inner: Arc::new(Mutex::new(HashMap::new())),
                    window,
                },
            })
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: AnalysisLimiterBackend::Disabled,
        }
    }

    pub async fn check(&self, ip: IpAddr, task: Task) -> Result<(), AnalysisLimiterError> {
        match &self.backend {
            AnalysisLimiterBackend::Disabled => Ok(()),
            AnalysisLimiterBackend::Memory { inner, window } => {
                let mut guard = inner.lock().await;
                let now = Instant::now();
                if let Some(last) = guard.get(&(ip, task)) {
                    if now.duration_since(*last) < *window {
                        return Err(AnalysisLimiterError::RateLimited);
                    }
                }
                guard.insert((ip, task), now);
                // 清掉過期的紀錄，避免表無限成長
                guard.retain(|_, seen| now.duration_since(*seen) < *window);
                Ok(())
            }
            AnalysisLimiterBackend::Redis {
                client,
                window,
                key_prefix,
            } => {
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|err| AnalysisLimiterError::Backend {
                        message: format!("redis conn: {err}"),
                    })?;
                let key = format!("{key_prefix}{ip}:{}", task.as_str());
                let set_result: Option<String> = redis::cmd("SET")
                    .arg(&key)
                    .arg("1")
                    .arg("NX")
                    .arg("EX")
                    .arg(window.as_secs() as usize)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| AnalysisLimiterError::Backend {
                        message: format!("redis set: {err}"),
                    })?;
                if set_result.is_some() {
                    Ok(())
                } else {
                    Err(AnalysisLimiterError::RateLimited)
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum AnalysisLimiterError {
    RateLimited,
    Backend { message: String },
}
