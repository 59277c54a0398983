use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{CurrencyPosition, StoredPortfolio};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Holds the most recently uploaded portfolio.
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn save(&self, positions: &[CurrencyPosition]) -> Result<StoredPortfolio>;
    async fn latest(&self) -> Result<Option<StoredPortfolio>>;
}

#[derive(Default)]
pub struct InMemoryPortfolioRepository {
    current: RwLock<Option<StoredPortfolio>>,
}

#[async_trait]
impl PortfolioRepository for InMemoryPortfolioRepository {
    async fn save(&self, positions: &[CurrencyPosition]) -> Result<StoredPortfolio> {
        let stored = StoredPortfolio {
            id: Uuid::new_v4(),
            positions: positions.to_vec(),
            uploaded_at: Utc::now(),
        };
        *self.current.write().await = Some(stored.clone());
        Ok(stored)
    }

    async fn latest(&self) -> Result<Option<StoredPortfolio>> {
        Ok(self.current.read().await.clone())
    }
}

#[derive(Clone)]
pub struct PostgresPortfolioRepository {
    pool: PgPool,
}

impl PostgresPortfolioRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// JSONB form of a book. `valueAtRisk` is stored as the raw amount so a reload
/// matches the uploaded values exactly.
fn positions_to_json(positions: &[CurrencyPosition]) -> Result<Value> {
    let mut value = serde_json::to_value(positions)?;
    if let Value::Array(rows) = &mut value {
        for (row, position) in rows.iter_mut().zip(positions) {
            if let Value::Object(fields) = row {
                fields.insert(
                    "valueAtRisk".to_string(),
                    Value::from(position.value_at_risk.amount()),
                );
            }
        }
    }
    Ok(value)
}

#[async_trait]
impl PortfolioRepository for PostgresPortfolioRepository {
    async fn save(&self, positions: &[CurrencyPosition]) -> Result<StoredPortfolio> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO portfolio_uploads (id, positions) VALUES ($1, $2) RETURNING uploaded_at",
        )
        .bind(id)
        .bind(positions_to_json(positions)?)
        .fetch_one(&self.pool)
        .await?;
        Ok(StoredPortfolio {
            id,
            positions: positions.to_vec(),
            uploaded_at: row.try_get("uploaded_at")?,
        })
    }

    async fn latest(&self) -> Result<Option<StoredPortfolio>> {
        let row = sqlx::query(
            "SELECT id, positions, uploaded_at FROM portfolio_uploads
             ORDER BY uploaded_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let uploaded_at: DateTime<Utc> = row.try_get("uploaded_at")?;
        let positions: Vec<CurrencyPosition> = serde_json::from_value(row.try_get("positions")?)?;
        Ok(Some(StoredPortfolio {
            id: row.try_get("id")?,
            positions,
            uploaded_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_keeps_latest_upload() {
        let repo = InMemoryPortfolioRepository::default();
        assert!(repo.latest().await.expect("latest").is_none());

        let first: Vec<CurrencyPosition> =
            serde_json::from_value(serde_json::json!([{ "currency": "EUR/USD", "quantity": 1 }]))
                .expect("positions");
        let second: Vec<CurrencyPosition> =
            serde_json::from_value(serde_json::json!([{ "currency": "USD/JPY", "quantity": 2 }]))
                .expect("positions");
        repo.save(&first).await.expect("save");
        let saved = repo.save(&second).await.expect("save");

        let latest = repo.latest().await.expect("latest").expect("stored");
        assert_eq!(latest.id, saved.id);
        assert_eq!(latest.positions[0].currency, "USD/JPY");
    }

    #[test]
    fn stored_json_keeps_exact_value_at_risk() {
        let positions: Vec<CurrencyPosition> = serde_json::from_value(serde_json::json!([
            { "currency": "EUR/USD", "quantity": 1, "valueAtRisk": 14999.6 }
        ]))
        .expect("positions");
        let stored = positions_to_json(&positions).expect("json");
        assert_eq!(stored[0]["valueAtRisk"], 14999.6);

        let reloaded: Vec<CurrencyPosition> = serde_json::from_value(stored).expect("reload");
        assert_eq!(reloaded, positions);
        assert_eq!(
            risk_engine::assess_var_risk(&reloaded).0,
            risk_engine::assess_var_risk(&positions).0
        );
    }
}
