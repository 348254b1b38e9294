use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    broadcast::{broadcast, reminder_text, winner_text},
    config::EngineSettings,
    error::Result,
    events::{emit, ReminderDispatched},
    instructions::complete_drawing::{complete_drawing, Completion},
    messenger::Messenger,
    render::refresh_post,
    state::{Drawing, DrawingId},
    store::Store,
};

/// Lifecycle phase tracked by a watcher. `Active -> Completed` skips the reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingPhase {
    Active,
    ReminderSent,
    Completed,
}

impl DrawingPhase {
    /// Phase a freshly spawned watcher starts in, from the persisted flags.
    pub fn of(drawing: &Drawing) -> Self {
        if drawing.completed {
            DrawingPhase::Completed
        } else if drawing.reminder_sent {
            DrawingPhase::ReminderSent
        } else {
            DrawingPhase::Active
        }
    }
}

/// The part of a drawing a tick looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawingSnapshot {
    pub end_time: DateTime<Utc>,
    pub completed: bool,
}

impl From<&Drawing> for DrawingSnapshot {
    fn from(drawing: &Drawing) -> Self {
        Self {
            end_time: drawing.end_time,
            completed: drawing.completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Re-render the public post with the live count and remaining time.
    Render,
    /// Send the closing-soon reminder to the current participants.
    Remind,
    /// Run the closure transaction, then publish results.
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: DrawingPhase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: DrawingPhase, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

/// One watcher step, without I/O.
///
/// - missing or already completed drawing: stop, nothing to do
/// - `remaining <= 0`: close; the close effect renders the final post itself
/// - `Active` with `0 < remaining <= threshold`: render and remind
/// - otherwise: render
pub fn tick(
    phase: DrawingPhase,
    now: DateTime<Utc>,
    snapshot: Option<&DrawingSnapshot>,
    reminder_threshold: Duration,
) -> Transition {
    let snapshot = match snapshot {
        Some(snapshot) if !snapshot.completed && phase != DrawingPhase::Completed => snapshot,
        _ => return Transition::to(DrawingPhase::Completed, vec![]),
    };

    let remaining = snapshot.end_time - now;
    if remaining <= Duration::zero() {
        return Transition::to(DrawingPhase::Completed, vec![Effect::Close]);
    }
    if phase == DrawingPhase::Active && remaining <= reminder_threshold {
        return Transition::to(DrawingPhase::ReminderSent, vec![Effect::Render, Effect::Remind]);
    }
    Transition::to(phase, vec![Effect::Render])
}

/// Drives one drawing from its current phase to completion.
pub struct Watcher<M> {
    store: Store,
    messenger: Arc<M>,
    settings: EngineSettings,
    drawing_id: DrawingId,
    phase: DrawingPhase,
}

impl<M: Messenger> Watcher<M> {
    pub fn new(
        store: Store,
        messenger: Arc<M>,
        settings: EngineSettings,
        drawing_id: DrawingId,
        phase: DrawingPhase,
    ) -> Self {
        Self {
            store,
            messenger,
            settings,
            drawing_id,
            phase,
        }
    }

    pub fn for_drawing(store: Store, messenger: Arc<M>, settings: EngineSettings, drawing: &Drawing) -> Self {
        Self::new(store, messenger, settings, drawing.id, DrawingPhase::of(drawing))
    }

    pub fn phase(&self) -> DrawingPhase {
        self.phase
    }

    /// Ticks every `poll_interval` until the drawing is completed.
    ///
    /// A store error aborts only the current tick; the phase is kept and the
    /// same step is retried on the next tick.
    pub async fn run(mut self) {
        let mut interval = time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        debug!(drawing_id = self.drawing_id, phase = ?self.phase, "watcher started");
        while self.phase != DrawingPhase::Completed {
            interval.tick().await;
            if let Err(err) = self.step(Utc::now()).await {
                warn!(drawing_id = self.drawing_id, ?err, "watcher tick failed, retrying");
            }
        }
        debug!(drawing_id = self.drawing_id, "watcher finished");
    }

    /// Applies one tick at `now`. The phase only advances when every effect succeeded.
    pub async fn step(&mut self, now: DateTime<Utc>) -> Result<DrawingPhase> {
        let drawing = self.store.fetch_drawing(self.drawing_id).await?;
        let snapshot = drawing.as_ref().map(DrawingSnapshot::from);
        let transition = tick(
            self.phase,
            now,
            snapshot.as_ref(),
            self.settings.reminder_threshold(),
        );

        for effect in &transition.effects {
            match effect {
                Effect::Render => {
                    refresh_post(&self.store, self.messenger.as_ref(), self.drawing_id).await
                }
                Effect::Remind => self.remind().await?,
                Effect::Close => self.close().await?,
            }
        }

        self.phase = transition.next;
        Ok(self.phase)
    }

    async fn remind(&self) -> Result<()> {
        let Some(drawing) = self.store.fetch_drawing(self.drawing_id).await? else {
            return Ok(());
        };
        let recipients = self.store.participant_ids(self.drawing_id).await?;
        if !self.store.claim_reminder(self.drawing_id).await? {
            debug!(drawing_id = self.drawing_id, "reminder already sent");
            return Ok(());
        }

        let report = broadcast(
            &self.messenger,
            &recipients,
            &reminder_text(&drawing, &self.settings),
            &self.settings,
        )
        .await;
        info!(
            drawing_id = self.drawing_id,
            delivered = report.delivered,
            failed = report.failed,
            "reminder sent"
        );
        emit(&ReminderDispatched {
            drawing_id: self.drawing_id,
            recipients: recipients.len(),
            delivered: report.delivered,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut rng = StdRng::from_entropy();
        let completion =
            complete_drawing(&self.store, &self.settings, self.drawing_id, &mut rng).await?;
        let Completion::Completed { drawing, winners, .. } = completion else {
            debug!(drawing_id = self.drawing_id, "drawing already completed elsewhere");
            return Ok(());
        };

        refresh_post(&self.store, self.messenger.as_ref(), self.drawing_id).await;

        let recipients: Vec<_> = winners.iter().map(|winner| winner.user_id).collect();
        let report = broadcast(
            &self.messenger,
            &recipients,
            &winner_text(&drawing),
            &self.settings,
        )
        .await;
        if report.failed > 0 {
            warn!(drawing_id = self.drawing_id, failed = report.failed, "some winners were not notified");
        }
        Ok(())
    }
}
