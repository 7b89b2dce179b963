//! Database entities.

pub mod group_binding;
pub mod sign_record;
pub mod subscription;
pub mod user_activity;

pub use group_binding::Entity as GroupBinding;
pub use sign_record::Entity as SignRecord;
pub use subscription::Entity as Subscription;
pub use user_activity::Entity as UserActivity;
