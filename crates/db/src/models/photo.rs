//! Photo rows. Upload and verification live outside this service; the
//! generation path only resolves verified files.

use serde::Serialize;
use sqlx::FromRow;
use sublym_core::types::{DbId, Timestamp};

/// A row from the `photos` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Photo {
    pub id: DbId,
    pub user_id: DbId,
    pub file_path: String,
    pub verified: bool,
    pub created_at: Timestamp,
}
