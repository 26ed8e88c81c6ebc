//! Repository for the `subscription_tiers` table.

use crate::models::subscription_tier::SubscriptionTier;

const COLUMNS: &str =
    "level, name, monthly_allowance, allows_subliminal, photos_only, created_at, updated_at";

pub struct SubscriptionTierRepo;

impl SubscriptionTierRepo {
    /// Look up a tier inside the admission transaction.
    pub async fn find_by_level(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        level: i16,
    ) -> Result<Option<SubscriptionTier>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscription_tiers WHERE level = $1");
        sqlx::query_as::<_, SubscriptionTier>(&query)
            .bind(level)
            .fetch_optional(&mut **tx)
            .await
    }
}
