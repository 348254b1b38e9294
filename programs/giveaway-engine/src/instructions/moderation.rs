use tracing::info;

use crate::{
    error::{GiveawayError, Result},
    events::{emit, UserBanned, UserUnbanned},
    state::UserId,
    store::{self, Store},
};

/// Bans a registered user with a reason shown back to them.
///
/// # Errors
/// - `UserNotFound` if the user never interacted with the bot
/// - `AlreadyBanned` if the ban flag is already set
pub async fn ban_user(store: &Store, user_id: UserId, reason: &str) -> Result<()> {
    let reason = reason.trim();
    let mut conn = store.pool().acquire().await?;
    if !store::set_ban_in(&mut conn, user_id, true, Some(reason).filter(|r| !r.is_empty())).await? {
        return Err(match store::fetch_user_in(&mut conn, user_id).await? {
            Some(_) => GiveawayError::AlreadyBanned(user_id),
            None => GiveawayError::UserNotFound(user_id),
        });
    }

    info!(user_id, reason, "user banned");
    emit(&UserBanned {
        user_id,
        reason: reason.to_string(),
    });
    Ok(())
}

/// Lifts a ban and clears its reason.
pub async fn unban_user(store: &Store, user_id: UserId) -> Result<()> {
    let mut conn = store.pool().acquire().await?;
    if !store::set_ban_in(&mut conn, user_id, false, None).await? {
        return Err(match store::fetch_user_in(&mut conn, user_id).await? {
            Some(_) => GiveawayError::NotBanned(user_id),
            None => GiveawayError::UserNotFound(user_id),
        });
    }

    info!(user_id, "user unbanned");
    emit(&UserUnbanned { user_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::EngineSettings;
    use crate::instructions::register_user::register_user;

    #[tokio::test]
    async fn ban_and_unban_report_their_preconditions() {
        let store = Store::in_memory().await.unwrap();
        assert!(matches!(
            ban_user(&store, 1, "x").await,
            Err(GiveawayError::UserNotFound(1))
        ));

        register_user(&store, &EngineSettings::default(), 1, None, None, Utc::now())
            .await
            .unwrap();
        assert!(matches!(unban_user(&store, 1).await, Err(GiveawayError::NotBanned(1))));

        ban_user(&store, 1, " flooding ").await.unwrap();
        let user = store.fetch_user(1).await.unwrap().unwrap();
        assert!(user.banned);
        assert_eq!(user.ban_reason.as_deref(), Some("flooding"));
        assert!(matches!(ban_user(&store, 1, "again").await, Err(GiveawayError::AlreadyBanned(1))));

        unban_user(&store, 1).await.unwrap();
        let user = store.fetch_user(1).await.unwrap().unwrap();
        assert!(!user.banned);
        assert_eq!(user.ban_reason, None);
    }
}
