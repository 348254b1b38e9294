use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use instructions::*;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod broadcast;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod gate;
pub mod instructions;
pub mod messenger;
pub mod render;
pub mod state;
pub mod store;
pub mod telegram;
pub mod updates;
pub mod watcher;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use config::EngineSettings;
use error::Result;
use messenger::Messenger;
use state::*;
use store::Store;
use watcher::Watcher;

/// Entry point for the lifecycle: owns the store, the messenger and one
/// watcher task per open drawing.
pub struct GiveawayEngine<M> {
    inner: Arc<Inner<M>>,
}

struct Inner<M> {
    store: Store,
    messenger: Arc<M>,
    settings: EngineSettings,
    watchers: Mutex<HashMap<DrawingId, JoinHandle<()>>>,
}

impl<M> Clone for GiveawayEngine<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Messenger> GiveawayEngine<M> {
    pub fn new(store: Store, messenger: Arc<M>, settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                messenger,
                settings,
                watchers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn messenger(&self) -> &Arc<M> {
        &self.inner.messenger
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Creates a drawing, starts its watcher and announces it to every
    /// opted-in user in the background.
    pub async fn create_drawing(&self, request: CreateDrawing) -> Result<Drawing> {
        let now = Utc::now();
        let drawing = instructions::create_drawing::create_drawing(
            &self.inner.store,
            self.inner.messenger.as_ref(),
            &self.inner.settings,
            request,
            now,
        )
        .await?;

        self.spawn_watcher(&drawing).await;

        let store = self.inner.store.clone();
        let messenger = Arc::clone(&self.inner.messenger);
        let settings = self.inner.settings;
        let text = broadcast::announcement_text(&drawing, now);
        let drawing_id = drawing.id;
        tokio::spawn(async move {
            let recipients = match store.notify_recipients().await {
                Ok(recipients) => recipients,
                Err(err) => {
                    warn!(drawing_id, ?err, "announcement skipped");
                    return;
                }
            };
            let report = broadcast::broadcast(&messenger, &recipients, &text, &settings).await;
            info!(
                drawing_id,
                delivered = report.delivered,
                failed = report.failed,
                "announcement sent"
            );
        });

        Ok(drawing)
    }

    pub async fn join(
        &self,
        drawing_id: DrawingId,
        user_id: UserId,
        display_name: Option<&str>,
    ) -> Result<JoinOutcome> {
        instructions::join_drawing::join_drawing(
            &self.inner.store,
            &self.inner.messenger,
            &self.inner.settings,
            drawing_id,
            user_id,
            display_name,
            Utc::now(),
        )
        .await
    }

    /// Spawns a watcher for every drawing that is not completed yet. Returns
    /// how many were started.
    pub async fn resume_watchers(&self) -> Result<usize> {
        let open = self.inner.store.open_drawings().await?;
        let mut started = 0;
        for drawing in &open {
            if self.spawn_watcher(drawing).await {
                started += 1;
            }
        }
        info!(open = open.len(), started, "watchers resumed");
        Ok(started)
    }

    /// Starts a watcher unless one is already running for this drawing.
    pub async fn spawn_watcher(&self, drawing: &Drawing) -> bool {
        let mut watchers = self.inner.watchers.lock().await;
        watchers.retain(|_, handle| !handle.is_finished());
        if watchers.contains_key(&drawing.id) {
            return false;
        }
        let watcher = Watcher::for_drawing(
            self.inner.store.clone(),
            Arc::clone(&self.inner.messenger),
            self.inner.settings,
            drawing,
        );
        watchers.insert(drawing.id, tokio::spawn(watcher.run()));
        true
    }

    pub async fn live_watchers(&self) -> usize {
        let mut watchers = self.inner.watchers.lock().await;
        watchers.retain(|_, handle| !handle.is_finished());
        watchers.len()
    }

    pub async fn register_user(
        &self,
        user_id: UserId,
        display_name: Option<&str>,
        referrer: Option<UserId>,
    ) -> Result<Registration> {
        instructions::register_user::register_user(
            &self.inner.store,
            &self.inner.settings,
            user_id,
            display_name,
            referrer,
            Utc::now(),
        )
        .await
    }

    pub async fn set_notify(&self, user_id: UserId, notify: bool) -> Result<()> {
        instructions::register_user::set_notify(&self.inner.store, user_id, notify).await
    }

    pub async fn grant_credits(&self, user_id: UserId, amount: i64) -> Result<i64> {
        instructions::credits::grant_credits(&self.inner.store, user_id, amount).await
    }

    pub async fn redeem_credits(&self, user_id: UserId, amount: i64) -> Result<i64> {
        instructions::credits::redeem_credits(&self.inner.store, &self.inner.settings, user_id, amount)
            .await
    }

    pub async fn ban_user(&self, user_id: UserId, reason: &str) -> Result<()> {
        instructions::moderation::ban_user(&self.inner.store, user_id, reason).await
    }

    pub async fn unban_user(&self, user_id: UserId) -> Result<()> {
        instructions::moderation::unban_user(&self.inner.store, user_id).await
    }

    pub async fn active_drawings(&self) -> Result<Vec<DrawingSummary>> {
        instructions::queries::active_drawings(&self.inner.store, Utc::now()).await
    }

    pub async fn drawing_history(&self, limit: i64) -> Result<Vec<CompletedDrawing>> {
        instructions::queries::drawing_history(&self.inner.store, limit).await
    }

    pub async fn user_stats(&self, user_id: UserId) -> Result<Option<UserStats>> {
        instructions::queries::user_stats(&self.inner.store, user_id).await
    }

    pub async fn top_winners(&self, limit: i64) -> Result<Vec<WinnerTally>> {
        instructions::queries::top_winners(&self.inner.store, limit).await
    }

    pub async fn top_referrers(&self, limit: i64) -> Result<Vec<ReferrerTally>> {
        instructions::queries::top_referrers(&self.inner.store, limit).await
    }

    pub async fn analytics(&self) -> Result<Analytics> {
        instructions::queries::analytics(&self.inner.store, Utc::now()).await
    }
}
