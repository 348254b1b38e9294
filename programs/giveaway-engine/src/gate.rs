use std::time::Duration;

use tokio::time;
use tracing::warn;

use crate::messenger::Messenger;
use crate::state::{ChatId, UserId};

/// Channel-membership check for gated drawings.
///
/// The user must hold an active membership in every channel. Any failure of
/// the oracle (error, unknown channel, missing bot access, timeout) counts as
/// not subscribed. An empty channel list always passes.
pub async fn is_subscribed<M: Messenger>(
    messenger: &M,
    user_id: UserId,
    channels: &[ChatId],
    timeout: Duration,
) -> bool {
    for &channel_id in channels {
        match time::timeout(timeout, messenger.get_membership(channel_id, user_id)).await {
            Ok(Ok(status)) if status.is_active() => continue,
            Ok(Ok(_)) => return false,
            Ok(Err(err)) => {
                warn!(user_id, channel_id, %err, "membership check failed");
                return false;
            }
            Err(_) => {
                warn!(user_id, channel_id, ?timeout, "membership check timed out");
                return false;
            }
        }
    }
    true
}
