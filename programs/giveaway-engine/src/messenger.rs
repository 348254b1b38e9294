use std::future::Future;

use crate::constants::{JOIN_BUTTON_LABEL, JOIN_CALLBACK_PREFIX};
use crate::error::MessengerError;
use crate::state::{ChatId, DrawingId, MessageId, UserId};

/// Membership of a user in a channel, as reported by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MembershipStatus {
    pub fn is_active(self) -> bool {
        !matches!(self, MembershipStatus::Left | MembershipStatus::Kicked)
    }
}

/// The single inline button attached to an open drawing's post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallToAction {
    pub label: String,
    pub callback_data: String,
}

impl CallToAction {
    pub fn join(drawing_id: DrawingId) -> Self {
        Self {
            label: JOIN_BUTTON_LABEL.to_string(),
            callback_data: format!("{JOIN_CALLBACK_PREFIX}{drawing_id}"),
        }
    }
}

/// Outbound side of the chat platform.
///
/// Every call may block or fail on its own; callers isolate failures per call.
pub trait Messenger: Send + Sync + 'static {
    fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        action: Option<&CallToAction>,
    ) -> impl Future<Output = Result<MessageId, MessengerError>> + Send;

    fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        action: Option<&CallToAction>,
    ) -> impl Future<Output = Result<(), MessengerError>> + Send;

    fn get_membership(
        &self,
        channel_id: ChatId,
        user_id: UserId,
    ) -> impl Future<Output = Result<MembershipStatus, MessengerError>> + Send;
}
