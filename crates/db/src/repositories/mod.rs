//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument, or an open transaction when the
//! operation has to commit together with other writes.

pub mod dream_repo;
pub mod generation_setting_repo;
pub mod photo_repo;
pub mod run_repo;
pub mod subscription_tier_repo;
pub mod user_repo;

pub use dream_repo::DreamRepo;
pub use generation_setting_repo::GenerationSettingRepo;
pub use photo_repo::PhotoRepo;
pub use run_repo::RunRepo;
pub use subscription_tier_repo::SubscriptionTierRepo;
pub use user_repo::UserRepo;
