pub mod models;
pub mod pii;

pub use models::events::RetentionEvent;
pub use pii::Masked;
