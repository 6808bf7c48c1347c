use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use dealgrid_core::{
    BoxedError, Channel, DeliveryReceipt, MessageContent, MessagingGateway, RecommendationProvider,
    RecommendedDeal,
};

/// Outbox-backed messaging gateway: outbound messages are committed to the
/// `outbox_messages` table and picked up by the delivery service. Keeps
/// transport concerns out of the retention core entirely.
pub struct OutboxGateway {
    pub pool: PgPool,
}

#[async_trait]
impl MessagingGateway for OutboxGateway {
    async fn send(
        &self,
        user_id: &str,
        channel: Channel,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, BoxedError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO outbox_messages (id, user_id, channel, content, queued_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(channel.as_str())
        .bind(serde_json::to_value(content)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(DeliveryReceipt {
            channel,
            provider_message_id: Some(id.to_string()),
        })
    }
}

/// Catalog-backed recommendation fallback: top active deals by rank score.
/// A dedicated ranking service can replace this behind the same trait.
pub struct PostgresRecommendationProvider {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct DealRow {
    deal_id: Uuid,
    title: String,
    price: f64,
    discount_percent: f64,
    category: Option<String>,
    rank_score: f64,
}

#[async_trait]
impl RecommendationProvider for PostgresRecommendationProvider {
    async fn top_recommendations(
        &self,
        _user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecommendedDeal>, BoxedError> {
        let rows = sqlx::query_as::<_, DealRow>(
            r#"
            SELECT deal_id, title, price, discount_percent, category, rank_score
            FROM deal_rankings
            WHERE is_active
            ORDER BY rank_score DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| RecommendedDeal {
                deal_id: r.deal_id,
                title: r.title,
                price: r.price,
                discount_percent: r.discount_percent,
                category: r.category,
                rank_score: r.rank_score,
            })
            .collect())
    }
}
