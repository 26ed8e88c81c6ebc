//! Sublym domain core.
//!
//! Pure logic shared by the persistence, pipeline and API crates: quota
//! admission rules, the worker stdout protocol, artifact layout and the
//! result manifest. Nothing in here talks to the database.

pub mod artifacts;
pub mod error;
pub mod manifest;
pub mod progress;
pub mod quota;
pub mod types;
