//! Progress and result messages for the person who issued a command.
//!
//! Delivery is fire and forget: a notifier never fails its caller.

use std::sync::Mutex;

use log::{info, warn};

/// Sink for user-facing messages.
pub trait Notifier: Send + Sync {
    /// Sends `message` in reply to `context` (a user or thread handle).
    fn notify(&self, context: &str, message: &str);
}

/// Writes messages to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, context: &str, message: &str) {
        if context.is_empty() {
            info!("{}", message);
        } else {
            info!("[{}] {}", context, message);
        }
    }
}

/// Keeps messages in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.iter().map(|(_, text)| text.clone()).collect())
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, context: &str, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((context.to_string(), message.to_string()));
        }
    }
}

/// Posts `{"text": ...}` to a chat webhook.
#[cfg(feature = "remote")]
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

#[cfg(feature = "remote")]
impl WebhookNotifier {
    pub fn new(url: &str, timeout: std::time::Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            url: url.to_string(),
            agent: config.into(),
        }
    }
}

#[cfg(feature = "remote")]
impl Notifier for WebhookNotifier {
    fn notify(&self, context: &str, message: &str) {
        let text = if context.is_empty() {
            message.to_string()
        } else {
            format!("<@{}>, {}", context, message)
        };
        let body = serde_json::json!({ "text": text });
        if let Err(e) = self.agent.post(&self.url).send_json(&body) {
            warn!("could not deliver notification to {}: {}", self.url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_notifier_keeps_order() {
        let notifier = MemoryNotifier::new();
        notifier.notify("u1", "first");
        notifier.notify("u1", "second");
        assert_eq!(notifier.messages(), vec!["first", "second"]);
    }
}
