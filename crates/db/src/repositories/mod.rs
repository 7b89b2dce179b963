//! Repository layer for database operations.

mod group_binding;
mod sign_record;
mod subscription;
mod user_activity;

pub use group_binding::GroupBindingRepository;
pub use sign_record::SignRecordRepository;
pub use subscription::SubscriptionRepository;
pub use user_activity::{ActivityKey, UserActivityRepository};
