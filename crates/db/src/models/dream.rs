//! Dream (generation request) models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sublym_core::types::{DbId, Timestamp};

use super::status::{DreamStatus, StatusId};

/// A row from the `dreams` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Dream {
    pub id: DbId,
    pub user_id: DbId,
    pub description: String,
    /// Elements the user does not want to see in the result.
    pub reject: Vec<String>,
    pub photo_ids: Vec<DbId>,
    pub status_id: StatusId,
    pub last_run_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Dream {
    pub fn status(&self) -> Option<DreamStatus> {
        DreamStatus::from_id(self.status_id)
    }
}

/// DTO for `POST /api/v1/dreams`.
#[derive(Debug, Deserialize)]
pub struct CreateDream {
    pub description: String,
    #[serde(default)]
    pub reject: Vec<String>,
    #[serde(default)]
    pub photo_ids: Vec<DbId>,
}

/// DTO for `PUT /api/v1/dreams/{id}`. All fields optional.
#[derive(Debug, Deserialize)]
pub struct UpdateDream {
    pub description: Option<String>,
    pub reject: Option<Vec<String>>,
    pub photo_ids: Option<Vec<DbId>>,
}
