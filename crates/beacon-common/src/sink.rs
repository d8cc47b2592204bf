//! The contract the reconciler uses to manage messages.

use async_trait::async_trait;
use thiserror::Error;

use crate::NotificationContent;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The message does not exist anymore, typically deleted by a moderator.
    #[error("message not found")]
    MessageNotFound,
    /// The target server or channel is gone, or access to it was revoked.
    #[error("channel `{0}` is unavailable")]
    ChannelUnavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Something which can post, edit and retract notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Post a new message and return its id.
    async fn send_message(
        &self,
        channel_id: &str,
        content: &NotificationContent,
    ) -> Result<String, SinkError>;

    /// Edit an existing message in place.
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &NotificationContent,
    ) -> Result<(), SinkError>;

    /// Delete an existing message.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), SinkError>;
}
