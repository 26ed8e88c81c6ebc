//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for inserts and patches where the API needs them

pub mod dream;
pub mod generation_setting;
pub mod photo;
pub mod run;
pub mod status;
pub mod subscription_tier;
pub mod user;
