//! Outbound participant notifications.
//!
//! State transitions yield [`Notice`]s; once the transition has been persisted
//! and the queue lock released, orchestration hands them to a
//! [`NotificationPort`]. The production port is the [`Outbox`], which delivers
//! each notice exactly once through a [`Notifier`] on a background task.

#[cfg(feature = "telegram")]
/// Telegram Bot API notifier.
pub mod telegram;

use std::{error::Error, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    state::queue::{Notice, NoticeKind},
};

#[cfg(feature = "telegram")]
pub use telegram::TelegramNotifier;

/// Sink for notices produced by committed transitions. Must not block.
pub trait NotificationPort: Send + Sync {
    /// Queue `notice` for delivery.
    fn dispatch(&self, notice: Notice);
}

/// Failures of a single delivery attempt. They are logged, never surfaced.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The HTTP client could not be set up.
    #[error("notification client could not be built")]
    ClientBuilder {
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The request never reached the provider.
    #[error("notification request could not be sent")]
    Transport {
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The provider answered with an error.
    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },
    /// No answer within the configured timeout.
    #[error("notification not delivered within {0:?}")]
    Timeout(Duration),
}

/// Identifiers attached to a delivery, mostly for logging and deep links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationContext {
    /// Queue the notice is about.
    pub queue_id: Uuid,
    /// Participant being notified.
    pub participant_id: Uuid,
}

/// Transport delivering a text message to an external recipient.
pub trait Notifier: Send + Sync {
    /// Send `message` to `recipient`.
    fn notify(
        &self,
        recipient: &str,
        message: &str,
        context: &NotificationContext,
    ) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// Notifier that only writes the message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(
        &self,
        recipient: &str,
        message: &str,
        context: &NotificationContext,
    ) -> BoxFuture<'static, Result<(), NotifyError>> {
        info!(
            recipient,
            message,
            queue_id = %context.queue_id,
            participant_id = %context.participant_id,
            "notification"
        );
        Box::pin(async { Ok(()) })
    }
}

/// [`NotificationPort`] backed by an unbounded channel and a delivery task.
pub struct Outbox {
    sender: mpsc::UnboundedSender<Notice>,
}

impl Outbox {
    /// Start the delivery task on the current runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>, config: &AppConfig) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Notice>();
        let config = config.clone();

        tokio::spawn(async move {
            while let Some(notice) = receiver.recv().await {
                let Some(recipient) = notice.recipient.clone() else {
                    debug!(
                        queue_id = %notice.queue_id,
                        participant_id = %notice.participant_id,
                        "participant has no contact; notice dropped"
                    );
                    continue;
                };
                let message = match notice.kind {
                    NoticeKind::TurnStarted => config.turn_message(&notice.queue_title),
                };
                let context = NotificationContext {
                    queue_id: notice.queue_id,
                    participant_id: notice.participant_id,
                };
                let limit = config.notification_timeout();
                let delivery = notifier.notify(&recipient, &message, &context);

                // Deliveries run independently so one slow recipient does not
                // hold back the others.
                tokio::spawn(async move {
                    let outcome = match timeout(limit, delivery).await {
                        Ok(result) => result,
                        Err(_) => Err(NotifyError::Timeout(limit)),
                    };
                    if let Err(err) = outcome {
                        warn!(
                            queue_id = %context.queue_id,
                            participant_id = %context.participant_id,
                            error = %err,
                            "notification delivery failed"
                        );
                    }
                });
            }
            debug!("notification outbox closed");
        });

        Self { sender }
    }
}

impl NotificationPort for Outbox {
    fn dispatch(&self, notice: Notice) {
        if let Err(err) = self.sender.send(notice) {
            warn!(
                queue_id = %err.0.queue_id,
                "notification outbox stopped; notice dropped"
            );
        }
    }
}
