use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::{ChatId, DrawingId, UserId};

/// Tracing target every domain event is written to.
pub const EVENT_TARGET: &str = "giveaway_engine::events";

pub trait Event: Serialize {
    const NAME: &'static str;
}

/// Writes `event` as a single JSON line on [`EVENT_TARGET`].
pub fn emit<E: Event>(event: &E) {
    match serde_json::to_string(event) {
        Ok(payload) => tracing::info!(target: EVENT_TARGET, event = E::NAME, %payload),
        Err(err) => tracing::warn!(target: EVENT_TARGET, event = E::NAME, %err, "event not serializable"),
    }
}

/// Emitted when a drawing is created
#[derive(Debug, Serialize)]
pub struct DrawingCreated {
    pub drawing_id: DrawingId,
    pub winners_requested: i64,
    pub end_time: DateTime<Utc>,
    pub required_channels: Vec<ChatId>,
    pub post_chat_id: Option<ChatId>,
}

/// Emitted when a join is accepted
#[derive(Debug, Serialize)]
pub struct ParticipantJoined {
    pub drawing_id: DrawingId,
    pub user_id: UserId,
    pub credits_awarded: i64,
}

/// Emitted once per drawing when the closing-soon reminder is claimed
#[derive(Debug, Serialize)]
pub struct ReminderDispatched {
    pub drawing_id: DrawingId,
    pub recipients: usize,
    pub delivered: usize,
}

/// Emitted when the closure transaction commits
#[derive(Debug, Serialize)]
pub struct DrawingCompleted {
    pub drawing_id: DrawingId,
    pub participant_count: usize,
    pub winners: Vec<UserId>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub referred_by: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct CreditsGranted {
    pub user_id: UserId,
    pub amount: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct CreditsRedeemed {
    pub user_id: UserId,
    pub amount: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct UserBanned {
    pub user_id: UserId,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct UserUnbanned {
    pub user_id: UserId,
}

impl Event for DrawingCreated {
    const NAME: &'static str = "drawing_created";
}
impl Event for ParticipantJoined {
    const NAME: &'static str = "participant_joined";
}
impl Event for ReminderDispatched {
    const NAME: &'static str = "reminder_dispatched";
}
impl Event for DrawingCompleted {
    const NAME: &'static str = "drawing_completed";
}
impl Event for UserRegistered {
    const NAME: &'static str = "user_registered";
}
impl Event for CreditsGranted {
    const NAME: &'static str = "credits_granted";
}
impl Event for CreditsRedeemed {
    const NAME: &'static str = "credits_redeemed";
}
impl Event for UserBanned {
    const NAME: &'static str = "user_banned";
}
impl Event for UserUnbanned {
    const NAME: &'static str = "user_unbanned";
}
