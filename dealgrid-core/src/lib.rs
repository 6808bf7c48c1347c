pub mod alert;
pub mod deals;
pub mod message;
pub mod repository;
pub mod traffic;
pub mod user;

pub use alert::{AlertSeverity, RetentionAlert};
pub use deals::{DealOffer, RecommendedDeal};
pub use message::{Channel, DeliveryReceipt, MessageContent};
pub use repository::{
    AlertStore, BoxedError, MessagingGateway, RecommendationProvider, TrafficStore, UserStore,
};
pub use traffic::{ClickEvent, ConversionEvent};
pub use user::{LifecycleStage, UserProfile};
