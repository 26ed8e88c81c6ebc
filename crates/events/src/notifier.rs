//! Sends the result-ready email when a run completes.
//!
//! [`CompletionNotifier`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and handles `run.completed` events. Notification failures are logged and
//! never touch the run: completion is already committed when the event is
//! published. The loop ends when the bus is dropped.

use sublym_db::repositories::UserRepo;
use sublym_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::RunEvent;
use crate::delivery::email::{EmailDelivery, EmailError};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("User {0} not found")]
    UserNotFound(i64),
}

/// Public link to a run's result page.
pub fn result_link(public_base_url: &str, trace_id: &str) -> String {
    format!("{}/runs/{trace_id}", public_base_url.trim_end_matches('/'))
}

pub struct CompletionNotifier {
    pool: DbPool,
    email: Option<EmailDelivery>,
    public_base_url: String,
}

impl CompletionNotifier {
    /// `email` is `None` when SMTP is not configured; completions are then
    /// only logged.
    pub fn new(pool: DbPool, email: Option<EmailDelivery>, public_base_url: String) -> Self {
        Self {
            pool,
            email,
            public_base_url,
        }
    }

    /// Run the notification loop until the bus is closed.
    pub async fn run(self, mut receiver: broadcast::Receiver<RunEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) if event.is_completion() => {
                    if let Err(e) = self.notify(&event).await {
                        tracing::error!(
                            error = %e,
                            trace_id = %event.trace_id,
                            user_id = event.user_id,
                            "Failed to send result notification"
                        );
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Completion notifier lagged, some emails were not sent");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, completion notifier shutting down");
                    break;
                }
            }
        }
    }

    async fn notify(&self, event: &RunEvent) -> Result<(), NotifyError> {
        let link = result_link(&self.public_base_url, &event.trace_id);
        let Some(email) = &self.email else {
            tracing::debug!(trace_id = %event.trace_id, %link, "Email disabled, skipping notification");
            return Ok(());
        };

        let user = UserRepo::find_by_id(&self.pool, event.user_id)
            .await?
            .ok_or(NotifyError::UserNotFound(event.user_id))?;

        email
            .send_result_ready(&user.email, user.first_name.as_deref(), &link)
            .await?;
        Ok(())
    }
}
