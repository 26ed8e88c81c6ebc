//! Subscription tier rows.

use serde::Serialize;
use sqlx::FromRow;
use sublym_core::quota::TierLimits;
use sublym_core::types::Timestamp;

/// A row from the `subscription_tiers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SubscriptionTier {
    pub level: i16,
    pub name: String,
    /// Generations per month, `-1` for unlimited.
    pub monthly_allowance: i32,
    pub allows_subliminal: bool,
    pub photos_only: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SubscriptionTier {
    pub fn limits(&self) -> TierLimits {
        TierLimits {
            level: self.level,
            monthly_allowance: self.monthly_allowance,
            allows_subliminal: self.allows_subliminal,
            photos_only: self.photos_only,
        }
    }
}
