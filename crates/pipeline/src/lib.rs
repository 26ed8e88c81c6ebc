//! Generation job orchestration.
//!
//! - [`admission`]: quota-gated creation of a run (`start_job`).
//! - [`supervisor`]: launches, watches, times out and reaps one worker
//!   process per run.
//! - [`completion`]: turns a successful worker exit into a completed run.
//! - [`cancel`]: user-initiated cancellation with quota refund.
//! - [`status`]: the polled view of a run.
//!
//! Supervision talks to persistence through the [`store::RunStore`] trait so
//! the process handling can be exercised without a database.

pub mod admission;
pub mod archive;
pub mod cancel;
pub mod completion;
pub mod config;
pub mod error;
pub mod progress_file;
pub mod registry;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use registry::ProcessRegistry;
pub use supervisor::Supervisor;
