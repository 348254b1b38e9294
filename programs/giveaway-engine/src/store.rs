use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::state::*;

/// Transactional access to drawings, participants, winners and users.
///
/// Methods on `Store` run as one statement against the pool. The free
/// functions at the bottom take a connection so callers can compose them into
/// a single transaction.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    drawing: Drawing,
    participant_count: i64,
}

impl Store {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // drawings
    // ------------------------------------------------------------------

    pub async fn insert_drawing(&self, new: &NewDrawing, now: DateTime<Utc>) -> Result<Drawing> {
        let drawing = sqlx::query_as::<_, Drawing>(
            "INSERT INTO drawings (text, winners_requested, end_time, required_channels, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&new.text)
        .bind(new.winners_requested)
        .bind(new.end_time)
        .bind(Json(&new.required_channels))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(drawing)
    }

    pub async fn fetch_drawing(&self, id: DrawingId) -> Result<Option<Drawing>> {
        let drawing = sqlx::query_as::<_, Drawing>("SELECT * FROM drawings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(drawing)
    }

    pub async fn set_post_location(&self, id: DrawingId, location: PostLocation) -> Result<()> {
        sqlx::query("UPDATE drawings SET post_chat_id = ?, post_message_id = ? WHERE id = ?")
            .bind(location.chat_id)
            .bind(location.message_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every drawing whose completion flag is still false, soonest first.
    pub async fn open_drawings(&self) -> Result<Vec<Drawing>> {
        let drawings = sqlx::query_as::<_, Drawing>(
            "SELECT * FROM drawings WHERE completed = 0 ORDER BY end_time, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(drawings)
    }

    /// Open drawings with their participant counts, soonest first.
    pub async fn open_drawing_summaries(&self) -> Result<Vec<DrawingSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT d.*, \
                    (SELECT COUNT(*) FROM participants p WHERE p.drawing_id = d.id) AS participant_count \
             FROM drawings d WHERE d.completed = 0 ORDER BY d.end_time, d.id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| DrawingSummary {
                drawing: row.drawing,
                participant_count: row.participant_count,
            })
            .collect())
    }

    /// Most recently finished drawings first.
    pub async fn completed_drawings(&self, limit: i64) -> Result<Vec<Drawing>> {
        let drawings = sqlx::query_as::<_, Drawing>(
            "SELECT * FROM drawings WHERE completed = 1 ORDER BY end_time DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(drawings)
    }

    /// Flips `reminder_sent` for an open drawing. `true` only for the caller that flipped it.
    pub async fn claim_reminder(&self, id: DrawingId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE drawings SET reminder_sent = 1 WHERE id = ? AND completed = 0 AND reminder_sent = 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ------------------------------------------------------------------
    // participants / winners
    // ------------------------------------------------------------------

    pub async fn count_participants(&self, drawing_id: DrawingId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE drawing_id = ?")
                .bind(drawing_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn participant_ids(&self, drawing_id: DrawingId) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar(
            "SELECT user_id FROM participants WHERE drawing_id = ? ORDER BY id",
        )
        .bind(drawing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn participants(&self, drawing_id: DrawingId) -> Result<Vec<Participant>> {
        let mut conn = self.pool.acquire().await?;
        participants_in(&mut conn, drawing_id).await
    }

    pub async fn winners(&self, drawing_id: DrawingId) -> Result<Vec<Winner>> {
        let winners = sqlx::query_as::<_, Winner>(
            "SELECT * FROM winners WHERE drawing_id = ? ORDER BY id",
        )
        .bind(drawing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(winners)
    }

    pub async fn top_winners(&self, limit: i64) -> Result<Vec<WinnerTally>> {
        let rows = sqlx::query_as::<_, WinnerTally>(
            "SELECT user_id, MAX(display_name) AS display_name, COUNT(*) AS wins \
             FROM winners GROUP BY user_id ORDER BY wins DESC, user_id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // users
    // ------------------------------------------------------------------

    pub async fn fetch_user(&self, user_id: UserId) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user_in(&mut conn, user_id).await
    }

    pub async fn set_notify(&self, user_id: UserId, notify: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET notify = ? WHERE user_id = ?")
            .bind(notify)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Users that opted into announcements and are not banned.
    pub async fn notify_recipients(&self) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar(
            "SELECT user_id FROM users WHERE notify = 1 AND banned = 0 ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn user_stats(&self, user_id: UserId) -> Result<Option<UserStats>> {
        let Some(user) = self.fetch_user(user_id).await? else {
            return Ok(None);
        };
        let participations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let wins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM winners WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        let referrals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE referred_by = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(UserStats {
            user_id,
            participations,
            wins,
            referrals,
            credit_balance: user.credit_balance,
            notify: user.notify,
        }))
    }

    pub async fn top_referrers(&self, limit: i64) -> Result<Vec<ReferrerTally>> {
        let rows = sqlx::query_as::<_, ReferrerTally>(
            "SELECT u.user_id, u.display_name, COUNT(r.user_id) AS referrals \
             FROM users u JOIN users r ON r.referred_by = u.user_id \
             GROUP BY u.user_id, u.display_name ORDER BY referrals DESC, u.user_id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn analytics(&self, since: DateTime<Utc>) -> Result<Analytics> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let new_users_last_week: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE registered_at >= ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        let total_drawings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM drawings")
            .fetch_one(&self.pool)
            .await?;
        let completed_drawings: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM drawings WHERE completed = 1")
                .fetch_one(&self.pool)
                .await?;
        let total_winners: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM winners")
            .fetch_one(&self.pool)
            .await?;
        Ok(Analytics {
            total_users,
            new_users_last_week,
            total_drawings,
            active_drawings: total_drawings - completed_drawings,
            completed_drawings,
            total_winners,
        })
    }
}

// ----------------------------------------------------------------------
// statements composed into transactions
// ----------------------------------------------------------------------

pub async fn fetch_user_in(conn: &mut SqliteConnection, user_id: UserId) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(user)
}

/// Inserts the user unless the id is taken. Returns whether a row was written.
///
/// `referrer` is stored only if that user already exists. The insert is the
/// first statement of every registration so the transaction holds the write
/// lock before it reads anything.
pub async fn insert_user_if_absent(
    conn: &mut SqliteConnection,
    user_id: UserId,
    display_name: Option<&str>,
    referrer: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO users (user_id, display_name, referred_by, registered_at) \
         VALUES (?, ?, (SELECT user_id FROM users WHERE user_id = ?), ?) \
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(display_name)
    .bind(referrer)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn update_display_name(
    conn: &mut SqliteConnection,
    user_id: UserId,
    display_name: &str,
) -> Result<()> {
    sqlx::query("UPDATE users SET display_name = ? WHERE user_id = ? AND display_name IS NOT ?")
        .bind(display_name)
        .bind(user_id)
        .bind(display_name)
        .execute(conn)
        .await?;
    Ok(())
}

/// Adds `amount` to the balance. `None` when the user does not exist.
pub async fn credit_user(
    conn: &mut SqliteConnection,
    user_id: UserId,
    amount: i64,
) -> Result<Option<i64>> {
    let balance = sqlx::query_scalar(
        "UPDATE users SET credit_balance = credit_balance + ? WHERE user_id = ? RETURNING credit_balance",
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(balance)
}

/// Subtracts `amount` only if the balance covers it. `None` when it does not
/// (or the user does not exist).
pub async fn debit_user(
    conn: &mut SqliteConnection,
    user_id: UserId,
    amount: i64,
) -> Result<Option<i64>> {
    let balance = sqlx::query_scalar(
        "UPDATE users SET credit_balance = credit_balance - ? \
         WHERE user_id = ? AND credit_balance >= ? RETURNING credit_balance",
    )
    .bind(amount)
    .bind(user_id)
    .bind(amount)
    .fetch_optional(conn)
    .await?;
    Ok(balance)
}

/// Flips the ban flag only if it differs. Returns whether a row changed.
pub async fn set_ban_in(
    conn: &mut SqliteConnection,
    user_id: UserId,
    banned: bool,
    reason: Option<&str>,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE users SET banned = ?, ban_reason = ? WHERE user_id = ? AND banned <> ?")
            .bind(banned)
            .bind(reason)
            .bind(user_id)
            .bind(banned)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() == 1)
}

/// Inserts a participant only while the drawing is open and the pair is new.
/// Returns whether a row was written.
pub async fn insert_open_participant(
    conn: &mut SqliteConnection,
    drawing_id: DrawingId,
    user_id: UserId,
    display_name: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO participants (user_id, display_name, drawing_id) \
         SELECT ?, ?, id FROM drawings WHERE id = ? AND completed = 0 \
         ON CONFLICT (user_id, drawing_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(display_name)
    .bind(drawing_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn drawing_completed_in(
    conn: &mut SqliteConnection,
    drawing_id: DrawingId,
) -> Result<Option<bool>> {
    let completed = sqlx::query_scalar("SELECT completed FROM drawings WHERE id = ?")
        .bind(drawing_id)
        .fetch_optional(conn)
        .await?;
    Ok(completed)
}

/// Compare-and-set on the completion flag. Only the caller that flips it gets
/// the (now completed) drawing back.
pub async fn claim_completion(
    conn: &mut SqliteConnection,
    drawing_id: DrawingId,
) -> Result<Option<Drawing>> {
    let drawing = sqlx::query_as::<_, Drawing>(
        "UPDATE drawings SET completed = 1 WHERE id = ? AND completed = 0 RETURNING *",
    )
    .bind(drawing_id)
    .fetch_optional(conn)
    .await?;
    Ok(drawing)
}

pub async fn participants_in(
    conn: &mut SqliteConnection,
    drawing_id: DrawingId,
) -> Result<Vec<Participant>> {
    let participants = sqlx::query_as::<_, Participant>(
        "SELECT * FROM participants WHERE drawing_id = ? ORDER BY id",
    )
    .bind(drawing_id)
    .fetch_all(conn)
    .await?;
    Ok(participants)
}

pub async fn insert_winner(conn: &mut SqliteConnection, participant: &Participant) -> Result<Winner> {
    let winner = sqlx::query_as::<_, Winner>(
        "INSERT INTO winners (user_id, display_name, drawing_id) VALUES (?, ?, ?) RETURNING *",
    )
    .bind(participant.user_id)
    .bind(participant.display_name.as_deref())
    .bind(participant.drawing_id)
    .fetch_one(conn)
    .await?;
    Ok(winner)
}
