//! Southbound command receiver.

use tracing::debug;

/// Receives commands sent down from the remote endpoint.
///
/// Commands are only logged for now.
// TODO: translate commands into calls on the local core-command service.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandHandler;

impl CommandHandler {
    pub fn new() -> Self {
        Self
    }

    /// Handle one inbound command; returns the message that was logged.
    pub fn receive(&self, command: &str) -> String {
        let message = format!("command received: {}", command);
        debug!("{}", message);
        message
    }
}
