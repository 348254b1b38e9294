use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    config::EngineSettings,
    error::{GiveawayError, Result},
    events::{emit, UserRegistered},
    state::UserId,
    store::{self, Store},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// `true` only on the call that created the row.
    pub created: bool,
    pub referred_by: Option<UserId>,
}

/// Registers a user on first contact, or refreshes their display name.
///
/// A referrer is honoured only when the user is new, the referrer is someone
/// else, and the referrer is already registered. The referrer is credited in
/// the same transaction that creates the row, so the link and the bonus are
/// written exactly once. Every statement before the final read is a write, so
/// concurrent first contacts queue on the write lock instead of failing.
pub async fn register_user(
    store: &Store,
    settings: &EngineSettings,
    user_id: UserId,
    display_name: Option<&str>,
    referrer: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<Registration> {
    let mut tx = store.pool().begin().await?;

    let referrer = referrer.filter(|&id| id != user_id);
    let created =
        store::insert_user_if_absent(&mut *tx, user_id, display_name, referrer, now).await?;
    if !created {
        if let Some(name) = display_name {
            store::update_display_name(&mut *tx, user_id, name).await?;
        }
    }
    let user = store::fetch_user_in(&mut *tx, user_id)
        .await?
        .ok_or(GiveawayError::UserNotFound(user_id))?;
    let referred_by = user.referred_by;
    if created {
        if let Some(referrer) = referred_by {
            store::credit_user(&mut *tx, referrer, settings.referral_credits).await?;
        }
    }
    tx.commit().await?;

    if created {
        info!(user_id, ?referred_by, "user registered");
        emit(&UserRegistered {
            user_id,
            referred_by,
        });
    }
    Ok(Registration {
        created,
        referred_by,
    })
}

/// Turns new-giveaway announcements on or off for a user.
pub async fn set_notify(store: &Store, user_id: UserId, notify: bool) -> Result<()> {
    if !store.set_notify(user_id, notify).await? {
        return Err(GiveawayError::UserNotFound(user_id));
    }
    Ok(())
}
