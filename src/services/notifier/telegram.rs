//! Telegram Bot API transport.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{NotificationContext, Notifier, NotifyError};

const COMPLETE_BUTTON_TEXT: &str = "Done";

/// Sends turn messages through `sendMessage`, with an inline button the bot
/// maps back to the complete operation.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: Arc<str>,
}

impl TelegramNotifier {
    /// Client for the bot identified by `bot_token`.
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .build()
            .map_err(|source| NotifyError::ClientBuilder {
                source: Box::new(source),
            })?;
        let endpoint = format!(
            "{}/bot{}/sendMessage",
            api_base.trim_end_matches('/'),
            bot_token
        );
        Ok(Self {
            client,
            endpoint: Arc::from(endpoint),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn notify(
        &self,
        recipient: &str,
        message: &str,
        context: &NotificationContext,
    ) -> BoxFuture<'static, Result<(), NotifyError>> {
        let request = self
            .client
            .post(self.endpoint.as_ref())
            .json(&send_message_payload(recipient, message, context.queue_id));

        Box::pin(async move {
            let response = request.send().await.map_err(|source| NotifyError::Transport {
                source: Box::new(source),
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Rejected {
                    status: status.as_u16(),
                });
            }
            Ok(())
        })
    }
}

/// Callback payload understood by the bot front-end.
pub fn complete_callback_data(queue_id: Uuid) -> String {
    format!("complete_{queue_id}")
}

fn send_message_payload(chat_id: &str, text: &str, queue_id: Uuid) -> Value {
    json!({
        "chat_id": chat_id,
        "text": text,
        "reply_markup": {
            "inline_keyboard": [[{
                "text": COMPLETE_BUTTON_TEXT,
                "callback_data": complete_callback_data(queue_id),
            }]]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_complete_button() {
        let queue_id = Uuid::nil();
        let payload = send_message_payload("4242", "your turn", queue_id);

        assert_eq!(payload["chat_id"], "4242");
        assert_eq!(payload["text"], "your turn");
        assert_eq!(
            payload["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "complete_00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let notifier = TelegramNotifier::new("https://api.telegram.org/", "123:abc").unwrap();
        assert_eq!(
            notifier.endpoint.as_ref(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
