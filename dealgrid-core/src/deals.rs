use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A ranked deal returned by the recommendation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedDeal {
    pub deal_id: Uuid,
    pub title: String,
    pub price: f64,
    pub discount_percent: f64,
    pub category: Option<String>,
    /// Relevance score assigned by the ranker, higher is better.
    pub rank_score: f64,
}

/// A retention incentive attached to an outbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DealOffer {
    pub title: String,
    pub discount_percent: f64,
    pub validity_days: u32,
    pub min_order_value: Option<f64>,
}

impl DealOffer {
    pub fn discount(title: impl Into<String>, discount_percent: f64, validity_days: u32) -> Self {
        Self {
            title: title.into(),
            discount_percent,
            validity_days,
            min_order_value: None,
        }
    }

    pub fn with_min_order(mut self, min_order_value: f64) -> Self {
        self.min_order_value = Some(min_order_value);
        self
    }
}
