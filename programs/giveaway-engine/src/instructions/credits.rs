use tracing::info;

use crate::{
    config::EngineSettings,
    error::{GiveawayError, Result},
    events::{emit, CreditsGranted, CreditsRedeemed},
    state::UserId,
    store::{self, Store},
};

/// Administrative top-up. Returns the new balance.
pub async fn grant_credits(store: &Store, user_id: UserId, amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(GiveawayError::InvalidCreditAmount);
    }
    let mut conn = store.pool().acquire().await?;
    let balance = store::credit_user(&mut conn, user_id, amount)
        .await?
        .ok_or(GiveawayError::UserNotFound(user_id))?;

    info!(user_id, amount, balance, "credits granted");
    emit(&CreditsGranted {
        user_id,
        amount,
        balance,
    });
    Ok(balance)
}

/// Spends credits on a reward. Returns the remaining balance.
///
/// # Errors
/// - `RedemptionBelowMinimum` under `min_redemption_credits`
/// - `UserNotFound`
/// - `InsufficientCredits` when the balance does not cover `amount`; the
///   debit is a single conditional update so the balance never goes negative
pub async fn redeem_credits(
    store: &Store,
    settings: &EngineSettings,
    user_id: UserId,
    amount: i64,
) -> Result<i64> {
    if amount < settings.min_redemption_credits {
        return Err(GiveawayError::RedemptionBelowMinimum(
            settings.min_redemption_credits,
        ));
    }

    let mut conn = store.pool().acquire().await?;
    let Some(balance) = store::debit_user(&mut conn, user_id, amount).await? else {
        // nothing was written; read back only to name the failure
        let user = store::fetch_user_in(&mut conn, user_id)
            .await?
            .ok_or(GiveawayError::UserNotFound(user_id))?;
        return Err(GiveawayError::InsufficientCredits {
            balance: user.credit_balance,
            requested: amount,
        });
    };

    info!(user_id, amount, balance, "credits redeemed");
    emit(&CreditsRedeemed {
        user_id,
        amount,
        balance,
    });
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::constants::{INITIAL_CREDITS, MIN_REDEMPTION_CREDITS};
    use crate::instructions::register_user::register_user;

    #[tokio::test]
    async fn redemption_requires_minimum_and_balance() {
        let store = Store::in_memory().await.unwrap();
        let settings = EngineSettings::default();
        register_user(&store, &settings, 1, None, None, Utc::now()).await.unwrap();

        assert!(matches!(
            redeem_credits(&store, &settings, 1, MIN_REDEMPTION_CREDITS - 1).await,
            Err(GiveawayError::RedemptionBelowMinimum(_))
        ));
        assert!(matches!(
            redeem_credits(&store, &settings, 1, MIN_REDEMPTION_CREDITS).await,
            Err(GiveawayError::InsufficientCredits { balance: INITIAL_CREDITS, .. })
        ));

        let granted = grant_credits(&store, 1, 200).await.unwrap();
        assert_eq!(granted, INITIAL_CREDITS + 200);
        let left = redeem_credits(&store, &settings, 1, 200).await.unwrap();
        assert_eq!(left, INITIAL_CREDITS);
        assert!(matches!(
            redeem_credits(&store, &settings, 9, MIN_REDEMPTION_CREDITS).await,
            Err(GiveawayError::UserNotFound(9))
        ));
    }

    #[tokio::test]
    async fn grants_must_be_positive_and_target_known_users() {
        let store = Store::in_memory().await.unwrap();
        assert!(matches!(grant_credits(&store, 1, 0).await, Err(GiveawayError::InvalidCreditAmount)));
        assert!(matches!(grant_credits(&store, 1, 5).await, Err(GiveawayError::UserNotFound(1))));
    }
}
