//! User rows and their quota counters.

use serde::Serialize;
use sqlx::FromRow;
use sublym_core::quota::QuotaCounters;
use sublym_core::types::{DbId, Timestamp};

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub first_name: Option<String>,
    pub gender: Option<String>,
    pub free_generations: i32,
    pub subscription_level: i16,
    pub subscription_ends_at: Option<Timestamp>,
    pub generations_used_this_month: i32,
    pub generations_reset_at: Option<Timestamp>,
    pub total_generations: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// The quota counters carried on this row.
    pub fn quota(&self) -> QuotaCounters {
        QuotaCounters {
            free_generations: self.free_generations,
            subscription_level: self.subscription_level,
            subscription_ends_at: self.subscription_ends_at,
            generations_used_this_month: self.generations_used_this_month,
            generations_reset_at: self.generations_reset_at,
            total_generations: self.total_generations,
        }
    }
}

/// Insert payload for a user. Accounts are normally provisioned elsewhere;
/// this exists for seeding and fixtures.
#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    pub email: String,
    pub first_name: Option<String>,
    pub gender: Option<String>,
    pub free_generations: i32,
    pub subscription_level: i16,
    pub subscription_ends_at: Option<Timestamp>,
}
