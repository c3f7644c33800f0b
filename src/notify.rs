//! Telegram failure notifications
//!
//! Fire-and-forget side channel: a notification failure is logged and never
//! replaces or masks the error that triggered it.

use crate::config::TelegramConfig;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use std::sync::Arc;
use std::time::Duration;

const API_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct Channel {
    token: String,
    chat_id: String,
    http: reqwest::Client,
}

/// Injected notification capability; a disabled notifier swallows messages
#[derive(Clone)]
pub struct Notifier {
    channel: Option<Arc<Channel>>,
    logger: StructuredLogger,
}

impl Notifier {
    /// Build from configuration; absent credentials disable the channel
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let channel = if config.is_configured() {
            let http = reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?;
            Some(Arc::new(Channel {
                token: config.token.clone(),
                chat_id: config.chat_id.clone(),
                http,
            }))
        } else {
            None
        };
        Ok(Self {
            channel,
            logger: get_logger("telegram"),
        })
    }

    /// Notifier that drops every message
    pub fn disabled() -> Self {
        Self {
            channel: None,
            logger: get_logger("telegram"),
        }
    }

    /// Best-effort delivery; own failures are logged, never returned
    pub async fn send(&self, message: &str) {
        let Some(channel) = &self.channel else {
            return;
        };
        let url = format!("{}/bot{}/sendMessage", API_URL, channel.token);
        let form = [
            ("chat_id", channel.chat_id.clone()),
            ("text", message.to_string()),
        ];
        let outcome = async {
            channel
                .http
                .post(&url)
                .form(&form)
                .send()
                .await?
                .error_for_status()?;
            Ok::<(), reqwest::Error>(())
        }
        .await;

        if let Err(e) = outcome {
            self.logger
                .error(&format!("Failed to send telegram notification - {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_swallows_messages() {
        let notifier = Notifier::disabled();
        notifier.send("nothing should happen").await;
    }

    #[test]
    fn test_unconfigured_channel_is_disabled() {
        let notifier = Notifier::from_config(&TelegramConfig::default()).unwrap();
        assert!(notifier.channel.is_none());
    }
}
