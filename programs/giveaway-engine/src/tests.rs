// ============================================================================
// LIFECYCLE SCENARIOS FOR THE GIVEAWAY ENGINE
// ============================================================================
//
// End-to-end checks that drive the engine, the store and the watcher together
// against an in-memory database and a recording messenger.
// Run with: cargo test --lib
//
// Test Categories:
// 1. Lifecycle Scenarios - expiry with winners, gated joins, empty drawings,
//    single reminder
// 2. Races - duplicate joins, competing closures, and the same races on a
//    file-backed store with several pooled connections
// 3. Scheduler - announcements, resume after restart
// ============================================================================

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    config::EngineSettings,
    constants::{INITIAL_CREDITS, PARTICIPATION_CREDITS, WINNER_CREDITS},
    instructions::{CreateDrawing, JoinOutcome},
    state::{Drawing, NewDrawing, PostLocation},
    store::Store,
    testing::RecordingMessenger,
    watcher::{DrawingPhase, Watcher},
    GiveawayEngine,
};

async fn engine() -> GiveawayEngine<RecordingMessenger> {
    let store = Store::in_memory().await.unwrap();
    GiveawayEngine::new(
        store,
        Arc::new(RecordingMessenger::default()),
        EngineSettings::default(),
    )
}

/// Inserts a drawing with a post location but no watcher, so tests drive ticks by hand.
async fn open_drawing(
    engine: &GiveawayEngine<RecordingMessenger>,
    winners_requested: i64,
    required_channels: Vec<i64>,
) -> Drawing {
    let drawing = engine
        .store()
        .insert_drawing(
            &NewDrawing {
                text: "🎁 <b>Gift card</b>".to_string(),
                winners_requested,
                end_time: Utc::now() + Duration::minutes(10),
                required_channels,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let location = PostLocation {
        chat_id: -500,
        message_id: 1,
    };
    engine
        .store()
        .set_post_location(drawing.id, location)
        .await
        .unwrap();
    engine.store().fetch_drawing(drawing.id).await.unwrap().unwrap()
}

/// Database file under the temp dir, deleted with its WAL files on drop.
struct FileStore {
    path: PathBuf,
    store: Store,
}

impl FileStore {
    async fn open() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "giveaway-engine-{}-{}.db",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        let store = Store::connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap();
        Self { path, store }
    }

    fn engine(&self) -> GiveawayEngine<RecordingMessenger> {
        GiveawayEngine::new(
            self.store.clone(),
            Arc::new(RecordingMessenger::default()),
            EngineSettings::default(),
        )
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

fn watcher(engine: &GiveawayEngine<RecordingMessenger>, drawing: &Drawing) -> Watcher<RecordingMessenger> {
    Watcher::for_drawing(
        engine.store().clone(),
        Arc::clone(engine.messenger()),
        *engine.settings(),
        drawing,
    )
}

// ========================================================================
// 1. LIFECYCLE SCENARIOS
// ========================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn expiry_draws_requested_winners_from_participants() {
        let engine = engine().await;
        let drawing = open_drawing(&engine, 2, vec![]).await;
        for user_id in 1..=5 {
            let outcome = engine.join(drawing.id, user_id, None).await.unwrap();
            assert_eq!(outcome, JoinOutcome::Accepted);
        }

        let mut watcher = watcher(&engine, &drawing);
        let phase = watcher.step(drawing.end_time + Duration::seconds(1)).await.unwrap();
        assert_eq!(phase, DrawingPhase::Completed);

        let winners = engine.store().winners(drawing.id).await.unwrap();
        let winner_ids: HashSet<_> = winners.iter().map(|w| w.user_id).collect();
        assert_eq!(winners.len(), 2);
        assert_eq!(winner_ids.len(), 2);
        assert!(winner_ids.iter().all(|id| (1..=5).contains(id)));

        for user_id in 1..=5 {
            let balance = engine.store().fetch_user(user_id).await.unwrap().unwrap().credit_balance;
            let base = INITIAL_CREDITS + PARTICIPATION_CREDITS;
            if winner_ids.contains(&user_id) {
                assert_eq!(balance, base + WINNER_CREDITS);
                assert_eq!(engine.messenger().sent_to(user_id).len(), 1);
            } else {
                assert_eq!(balance, base);
                assert!(engine.messenger().sent_to(user_id).is_empty());
            }
        }
    }

    #[tokio::test]
    async fn gated_join_succeeds_after_subscribing() {
        let engine = engine().await;
        let channel = -1_001;
        let drawing = open_drawing(&engine, 1, vec![channel]).await;
        engine
            .messenger()
            .set_membership(channel, 9, crate::messenger::MembershipStatus::Left);

        let first = engine.join(drawing.id, 9, Some("@nine")).await.unwrap();
        assert_eq!(first, JoinOutcome::SubscriptionRequired);
        assert_eq!(engine.store().count_participants(drawing.id).await.unwrap(), 0);

        engine
            .messenger()
            .set_membership(channel, 9, crate::messenger::MembershipStatus::Member);
        let retry = engine.join(drawing.id, 9, Some("@nine")).await.unwrap();
        assert_eq!(retry, JoinOutcome::Accepted);
    }

    #[tokio::test]
    async fn empty_drawing_completes_with_closure_text() {
        let engine = engine().await;
        let drawing = open_drawing(&engine, 3, vec![]).await;

        let mut watcher = watcher(&engine, &drawing);
        watcher.step(drawing.end_time).await.unwrap();

        let stored = engine.store().fetch_drawing(drawing.id).await.unwrap().unwrap();
        assert!(stored.completed);
        assert!(engine.store().winners(drawing.id).await.unwrap().is_empty());
        let post = engine.messenger().last_edit().unwrap();
        assert!(post.text.contains("No winners: nobody entered this giveaway."));
        assert!(post.action.is_none());
    }

    #[tokio::test]
    async fn reminder_goes_out_once_inside_the_window() {
        let engine = engine().await;
        let drawing = open_drawing(&engine, 1, vec![]).await;
        engine.join(drawing.id, 1, None).await.unwrap();
        engine.join(drawing.id, 2, None).await.unwrap();

        let mut watcher = watcher(&engine, &drawing);
        for left in [200, 195, 150, 5] {
            watcher
                .step(drawing.end_time - Duration::seconds(left))
                .await
                .unwrap();
        }

        assert_eq!(watcher.phase(), DrawingPhase::ReminderSent);
        let reminders = engine.messenger().sent_containing("left until the giveaway ends");
        let mut recipients: Vec<_> = reminders.iter().map(|m| m.chat_id).collect();
        recipients.sort();
        assert_eq!(recipients, vec![1, 2]);
    }

    #[tokio::test]
    async fn join_after_completion_changes_nothing() {
        let engine = engine().await;
        let drawing = open_drawing(&engine, 1, vec![]).await;
        engine.join(drawing.id, 1, None).await.unwrap();
        watcher(&engine, &drawing)
            .step(drawing.end_time + Duration::seconds(1))
            .await
            .unwrap();
        let edits_before = engine.messenger().edits().len();

        let outcome = engine.join(drawing.id, 2, None).await.unwrap();

        assert_eq!(outcome, JoinOutcome::DrawingClosed);
        assert_eq!(engine.store().count_participants(drawing.id).await.unwrap(), 1);
        assert!(engine.store().fetch_user(2).await.unwrap().is_none());
        assert_eq!(engine.messenger().edits().len(), edits_before);
    }
}

// ========================================================================
// 2. RACES
// ========================================================================

mod races {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::instructions::{complete_drawing, Completion};

    #[tokio::test]
    async fn duplicate_joins_accept_exactly_one() {
        let engine = engine().await;
        let drawing = open_drawing(&engine, 1, vec![]).await;

        let (a, b, c) = tokio::join!(
            engine.join(drawing.id, 4, None),
            engine.join(drawing.id, 4, None),
            engine.join(drawing.id, 4, None),
        );
        let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_accepted()).count(), 1);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, JoinOutcome::Accepted | JoinOutcome::AlreadyJoined)));
        assert_eq!(engine.store().count_participants(drawing.id).await.unwrap(), 1);
        assert_eq!(
            engine.store().fetch_user(4).await.unwrap().unwrap().credit_balance,
            INITIAL_CREDITS + PARTICIPATION_CREDITS
        );
    }

    #[tokio::test]
    async fn competing_closures_complete_once() {
        let engine = engine().await;
        let drawing = open_drawing(&engine, 1, vec![]).await;
        for user_id in 1..=3 {
            engine.join(drawing.id, user_id, None).await.unwrap();
        }
        let settings = EngineSettings::default();
        let mut first_rng = StdRng::seed_from_u64(10);
        let mut second_rng = StdRng::seed_from_u64(20);

        let (first, second) = tokio::join!(
            complete_drawing(engine.store(), &settings, drawing.id, &mut first_rng),
            complete_drawing(engine.store(), &settings, drawing.id, &mut second_rng),
        );
        let results = [first.unwrap(), second.unwrap()];

        let completed = results
            .iter()
            .filter(|r| matches!(r, Completion::Completed { .. }))
            .count();
        assert_eq!(completed, 1);
        assert!(results.contains(&Completion::AlreadyCompleted));
        assert_eq!(engine.store().winners(drawing.id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_contact_joins_race_on_a_shared_file() {
        let db = FileStore::open().await;
        let engine = db.engine();
        let drawing_id = open_drawing(&engine, 1, vec![]).await.id;

        for user_id in 100..120 {
            let tasks: Vec<_> = (0..4)
                .map(|_| {
                    let engine = engine.clone();
                    tokio::spawn(async move { engine.join(drawing_id, user_id, Some("@racer")).await })
                })
                .collect();
            let mut outcomes = Vec::new();
            for task in tasks {
                outcomes.push(task.await.unwrap().unwrap());
            }

            assert_eq!(outcomes.iter().filter(|o| o.is_accepted()).count(), 1, "user {user_id}");
            assert!(outcomes
                .iter()
                .all(|o| matches!(o, JoinOutcome::Accepted | JoinOutcome::AlreadyJoined)));
            assert_eq!(
                engine.store().fetch_user(user_id).await.unwrap().unwrap().credit_balance,
                INITIAL_CREDITS + PARTICIPATION_CREDITS
            );
        }
        assert_eq!(engine.store().count_participants(drawing_id).await.unwrap(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_watchers_close_a_shared_file_once() {
        let db = FileStore::open().await;
        let engine = db.engine();
        let drawing = open_drawing(&engine, 2, vec![]).await;
        for user_id in 1..=5 {
            engine.join(drawing.id, user_id, None).await.unwrap();
        }
        let after_end = drawing.end_time + Duration::seconds(1);

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let mut watcher = watcher(&engine, &drawing);
                tokio::spawn(async move { watcher.step(after_end).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), DrawingPhase::Completed);
        }

        let winners = engine.store().winners(drawing.id).await.unwrap();
        assert_eq!(winners.len(), 2);
        for winner in &winners {
            assert_eq!(
                engine.store().fetch_user(winner.user_id).await.unwrap().unwrap().credit_balance,
                INITIAL_CREDITS + PARTICIPATION_CREDITS + WINNER_CREDITS
            );
        }
        assert_eq!(engine.messenger().sent_containing("Congratulations").len(), 2);
    }
}

// ========================================================================
// 3. SCHEDULER
// ========================================================================

mod scheduler {
    use super::*;

    #[tokio::test]
    async fn creation_announces_to_opted_in_users_and_starts_a_watcher() {
        let engine = engine().await;
        engine.register_user(1, None, None).await.unwrap();
        engine.register_user(2, None, None).await.unwrap();
        engine.register_user(3, None, None).await.unwrap();
        engine.set_notify(3, false).await.unwrap();

        let drawing = engine
            .create_drawing(CreateDrawing {
                text: "Headphones".to_string(),
                winners_requested: 1,
                duration_minutes: 15,
                required_channels: vec![],
                post_chat_id: Some(-77),
            })
            .await
            .unwrap();
        assert_eq!(engine.live_watchers().await, 1);
        assert!(!engine.spawn_watcher(&drawing).await);

        let announced = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let sent = engine.messenger().sent_containing("A new giveaway has started");
                if sent.len() >= 2 {
                    return sent;
                }
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        let mut recipients: Vec<_> = announced.iter().map(|m| m.chat_id).collect();
        recipients.sort();
        assert_eq!(recipients, vec![1, 2]);
    }

    #[tokio::test]
    async fn restart_resumes_only_open_drawings() {
        let engine = engine().await;
        let open = open_drawing(&engine, 1, vec![]).await;
        let closed = open_drawing(&engine, 1, vec![]).await;
        watcher(&engine, &closed)
            .step(closed.end_time + Duration::seconds(1))
            .await
            .unwrap();
        assert!(engine.store().claim_reminder(open.id).await.unwrap());

        assert_eq!(engine.resume_watchers().await.unwrap(), 1);
        assert_eq!(engine.resume_watchers().await.unwrap(), 0);
        assert_eq!(engine.live_watchers().await, 1);

        let reloaded = engine.store().fetch_drawing(open.id).await.unwrap().unwrap();
        assert_eq!(watcher(&engine, &reloaded).phase(), DrawingPhase::ReminderSent);
    }
}
