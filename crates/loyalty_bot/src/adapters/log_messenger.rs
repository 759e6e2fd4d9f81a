// Rust guideline compliant 2026-10-18

//! Demo adapter for the `Messenger` port.
//!
//! Logs each message via `tracing::info!` and always returns `Ok(())`.

use domain::{Messenger, MessengerError};

/// `Messenger` adapter that writes private messages to the log.
#[derive(Debug, Default)]
pub struct LogMessenger;

impl LogMessenger {
    /// Create the messenger.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Messenger for LogMessenger {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), MessengerError> {
        tracing::info!(chat_id, text, "log_messenger.message.sent");
        Ok(())
    }
}
