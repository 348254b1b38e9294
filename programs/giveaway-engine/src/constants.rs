// ============================================================================
// TIMING
// ============================================================================

/// Watcher polling interval.
pub const POLL_INTERVAL_SECS: u64 = 5;

/// Remaining time at which the closing-soon reminder goes out.
pub const REMINDER_THRESHOLD_SECS: i64 = 300;

/// Upper bound for a single membership check or message delivery.
pub const EXTERNAL_CALL_TIMEOUT_SECS: u64 = 10;

pub const MIN_DURATION_MINUTES: i64 = 1;
pub const MAX_DURATION_MINUTES: i64 = 30 * 24 * 60; // 30 days

// ============================================================================
// CREDITS
// ============================================================================

/// Balance a user starts with. Mirrors the column default in the schema.
pub const INITIAL_CREDITS: i64 = 3;
pub const PARTICIPATION_CREDITS: i64 = 1;
pub const WINNER_CREDITS: i64 = 4;
pub const REFERRAL_CREDITS: i64 = 2;
pub const MIN_REDEMPTION_CREDITS: i64 = 100;

// ============================================================================
// FAN-OUT
// ============================================================================

/// Recipients served concurrently by one broadcast.
pub const BROADCAST_CONCURRENCY: usize = 8;

// ============================================================================
// RENDERING
// ============================================================================

/// Tags that survive sanitization of creator text.
pub const ALLOWED_TAGS: [&str; 6] = ["b", "i", "u", "s", "code", "a"];

pub const JOIN_CALLBACK_PREFIX: &str = "join_";
pub const JOIN_BUTTON_LABEL: &str = "Join";
