use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tracing::warn;

use crate::config::EngineSettings;
use crate::messenger::Messenger;
use crate::render::sanitize;
use crate::state::{ChatId, Drawing};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends `text` to one chat. Failures and timeouts are logged and reported as `false`.
pub async fn deliver<M: Messenger>(
    messenger: &M,
    chat_id: ChatId,
    text: &str,
    timeout: Duration,
) -> bool {
    match time::timeout(timeout, messenger.send_message(chat_id, text, None)).await {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            warn!(recipient = chat_id, %err, "delivery failed");
            false
        }
        Err(_) => {
            warn!(recipient = chat_id, ?timeout, "delivery timed out");
            false
        }
    }
}

/// Fans `text` out to every recipient.
///
/// Each delivery runs as its own task, at most `broadcast_concurrency` at a
/// time, so a slow or failing recipient never holds up the others.
pub async fn broadcast<M: Messenger>(
    messenger: &Arc<M>,
    recipients: &[ChatId],
    text: &str,
    settings: &EngineSettings,
) -> BroadcastReport {
    let permits = Arc::new(Semaphore::new(settings.broadcast_concurrency.max(1)));
    let text: Arc<str> = Arc::from(text);
    let timeout = settings.external_call_timeout();

    let mut deliveries = JoinSet::new();
    for &recipient in recipients {
        let messenger = Arc::clone(messenger);
        let permits = Arc::clone(&permits);
        let text = Arc::clone(&text);
        deliveries.spawn(async move {
            let _permit = permits.acquire_owned().await;
            deliver(messenger.as_ref(), recipient, &text, timeout).await
        });
    }

    let mut report = BroadcastReport::default();
    while let Some(joined) = deliveries.join_next().await {
        match joined {
            Ok(true) => report.delivered += 1,
            Ok(false) => report.failed += 1,
            Err(err) => {
                warn!(%err, "delivery task aborted");
                report.failed += 1;
            }
        }
    }
    report
}

// ----------------------------------------------------------------------
// message bodies
// ----------------------------------------------------------------------

pub fn announcement_text(drawing: &Drawing, now: DateTime<Utc>) -> String {
    let minutes = drawing.remaining(now).num_minutes().max(0);
    format!(
        "🆕 <b>A new giveaway has started!</b>\n\n{}\n\n⏳ Hurry up and join! Time left: {minutes} min",
        sanitize(&drawing.text)
    )
}

pub fn reminder_text(drawing: &Drawing, settings: &EngineSettings) -> String {
    let minutes = (settings.reminder_threshold_secs / 60).max(1);
    format!(
        "⏰ {minutes} minute(s) left until the giveaway ends!\n\n{}",
        sanitize(&drawing.text)
    )
}

pub fn winner_text(drawing: &Drawing) -> String {
    format!(
        "🏅 <b>Congratulations!</b> You won the giveaway:\n\n{}\n\n📝 Message the admins to claim your prize. 🍀",
        sanitize(&drawing.text)
    )
}
