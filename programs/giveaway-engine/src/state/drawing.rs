use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::state::{ChatId, DrawingId, MessageId};

/// A single giveaway.
///
/// The completion flag only ever moves from `false` to `true`, and only inside
/// the closure transaction. `reminder_sent` follows the same rule for the
/// closing-soon broadcast.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Drawing {
    pub id: DrawingId,
    /// Raw creator text. Sanitize before publishing anywhere.
    pub text: String,
    pub winners_requested: i64,
    pub end_time: DateTime<Utc>,
    pub completed: bool,
    pub reminder_sent: bool,
    pub required_channels: Json<Vec<ChatId>>,
    pub post_chat_id: Option<ChatId>,
    pub post_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

impl Drawing {
    /// Time left until `end_time`, negative once the drawing has expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.end_time - now
    }

    pub fn channels(&self) -> &[ChatId] {
        &self.required_channels.0
    }

    /// Where the public status message lives, if it was ever published.
    pub fn post_location(&self) -> Option<PostLocation> {
        match (self.post_chat_id, self.post_message_id) {
            (Some(chat_id), Some(message_id)) => Some(PostLocation {
                chat_id,
                message_id,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostLocation {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Insert payload for a drawing row.
#[derive(Debug, Clone)]
pub struct NewDrawing {
    pub text: String,
    pub winners_requested: i64,
    pub end_time: DateTime<Utc>,
    pub required_channels: Vec<ChatId>,
}

/// A drawing together with its live participant count.
#[derive(Debug, Clone)]
pub struct DrawingSummary {
    pub drawing: Drawing,
    pub participant_count: i64,
}
