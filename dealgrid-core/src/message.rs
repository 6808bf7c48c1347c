use serde::{Deserialize, Serialize};

use crate::deals::{DealOffer, RecommendedDeal};
use crate::user::UserProfile;

/// Outbound channels the messaging collaborator can deliver on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Telegram,
    Push,
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Telegram => "telegram",
            Channel::Push => "push",
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

/// Fully rendered content for one outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    pub subject: Option<String>,
    pub body: String,
    pub offer: Option<DealOffer>,
    pub recommendations: Vec<RecommendedDeal>,
}

impl MessageContent {
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
            offer: None,
            recommendations: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_offer(mut self, offer: DealOffer) -> Self {
        self.offer = Some(offer);
        self
    }

    pub fn with_recommendations(mut self, recommendations: Vec<RecommendedDeal>) -> Self {
        self.recommendations = recommendations;
        self
    }
}

/// Acknowledgement returned by the messaging gateway on accepted sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub channel: Channel,
    pub provider_message_id: Option<String>,
}

/// Substitute `{name}` placeholders with the user's salutation.
///
/// Shared by intervention messaging and follow-up content so both render
/// templates the same way.
pub fn render_template(template: &str, profile: &UserProfile) -> String {
    template.replace("{name}", profile.salutation())
}
