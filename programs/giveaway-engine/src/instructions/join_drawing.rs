use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    config::EngineSettings,
    error::Result,
    events::{emit, ParticipantJoined},
    gate::is_subscribed,
    instructions::register_user::register_user,
    messenger::Messenger,
    render::refresh_post,
    state::{DrawingId, UserId},
    store::{self, Store},
};

/// Result of a join request. Every variant except `Accepted` is a rejection
/// without side effects on the drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Accepted,
    AlreadyJoined,
    DrawingClosed,
    DrawingNotFound,
    SubscriptionRequired,
    Banned { reason: Option<String> },
}

impl JoinOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, JoinOutcome::Accepted)
    }

    /// Human-readable explanation shown to the user.
    pub fn reason(&self) -> String {
        match self {
            JoinOutcome::Accepted => "🎉 You're in! Good luck 🍀".to_string(),
            JoinOutcome::AlreadyJoined => "You are already taking part in this giveaway.".to_string(),
            JoinOutcome::DrawingClosed => "This giveaway has already finished.".to_string(),
            JoinOutcome::DrawingNotFound => "Giveaway not found.".to_string(),
            JoinOutcome::SubscriptionRequired => {
                "You must be subscribed to every listed channel to join.".to_string()
            }
            JoinOutcome::Banned { reason } => format!(
                "⛔️ You have been banned by the administrators.\nReason: {}",
                reason.as_deref().unwrap_or("not specified")
            ),
        }
    }
}

/// Admits `user_id` into `drawing_id`.
///
/// # Checks, in order
/// 1. The drawing exists and is not completed
/// 2. The user is registered (first contact creates the row) and not banned
/// 3. Required channels pass the subscription gate (fail-closed)
/// 4. No previous entry for the pair
///
/// # Implementation Notes
/// - Step 4 and the insert are one statement: the insert is suppressed by the
///   `(user_id, drawing_id)` unique key or by a completion flag set in the
///   meantime, and the suppression is translated back into an outcome
/// - The participation credit is awarded in the same transaction as the insert
/// - The post refresh afterwards is best effort
///
/// # Errors
/// Only store failures. Every business rejection is a `JoinOutcome`.
pub async fn join_drawing<M: Messenger>(
    store: &Store,
    messenger: &Arc<M>,
    settings: &EngineSettings,
    drawing_id: DrawingId,
    user_id: UserId,
    display_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<JoinOutcome> {
    let Some(drawing) = store.fetch_drawing(drawing_id).await? else {
        return Ok(JoinOutcome::DrawingNotFound);
    };
    if drawing.completed {
        return Ok(JoinOutcome::DrawingClosed);
    }

    register_user(store, settings, user_id, display_name, None, now).await?;
    if let Some(user) = store.fetch_user(user_id).await? {
        if user.banned {
            return Ok(JoinOutcome::Banned {
                reason: user.ban_reason,
            });
        }
    }

    if !drawing.channels().is_empty()
        && !is_subscribed(
            messenger.as_ref(),
            user_id,
            drawing.channels(),
            settings.external_call_timeout(),
        )
        .await
    {
        debug!(drawing_id, user_id, "join rejected: missing subscription");
        return Ok(JoinOutcome::SubscriptionRequired);
    }

    let mut tx = store.pool().begin().await?;
    if !store::insert_open_participant(&mut *tx, drawing_id, user_id, display_name).await? {
        let outcome = match store::drawing_completed_in(&mut *tx, drawing_id).await? {
            None => JoinOutcome::DrawingNotFound,
            Some(true) => JoinOutcome::DrawingClosed,
            Some(false) => JoinOutcome::AlreadyJoined,
        };
        return Ok(outcome);
    }
    store::credit_user(&mut *tx, user_id, settings.participation_credits).await?;
    tx.commit().await?;

    info!(drawing_id, user_id, "participant joined");
    emit(&ParticipantJoined {
        drawing_id,
        user_id,
        credits_awarded: settings.participation_credits,
    });

    refresh_post(store, messenger.as_ref(), drawing_id).await;
    Ok(JoinOutcome::Accepted)
}
