//! Booking core: admission against fixed-capacity sessions, the late/no-show
//! sweep, waiting-list promotion and the penalty ledger. Callers (HTTP, CLI,
//! scheduler) pass "now" in; the engine owns no clock of its own.

mod booking;
mod error;
mod notify;
pub mod penalty;
mod sweep;

pub use error::{BookingError, Result};
pub use notify::{NotificationSink, RecordingSink};
pub use sweep::SweepReport;

use chrono::NaiveDateTime;
use courtbook_models::{Admission, AvailableSession, BookingDetail, Player};
use sqlx::SqlitePool;

/// How far ahead a session may be booked.
pub const BOOKING_WINDOW_DAYS: i64 = 7;
/// Every session runs exactly two hours.
pub const SESSION_LENGTH_HOURS: i64 = 2;
/// Minutes after session start before a warning is due.
pub const LATE_THRESHOLD_MIN: i64 = 15;
/// Minutes after session start before the booking is a no-show.
pub const NO_SHOW_THRESHOLD_MIN: i64 = 30;
/// Flat fine for a no-show or for hitting the warning limit.
pub const FINE_AMOUNT: f64 = 25.0;
/// Warnings at which the one-time fine lands.
pub const WARNING_LIMIT: i64 = 3;
/// Minutes a promoted player has to confirm the offered seat.
pub const CONFIRMATION_WINDOW_MIN: i64 = 5;

pub(crate) const DATE_FMT: &str = "%Y-%m-%d";
pub(crate) const TIME_FMT: &str = "%H:%M";
pub(crate) const STAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn stamp(t: NaiveDateTime) -> String {
    t.format(STAMP_FMT).to_string()
}

/// Orchestrates booking operations over a persistence pool and a
/// notification sink.
#[derive(Clone)]
pub struct BookingEngine<S: NotificationSink> {
    pool: SqlitePool,
    sink: S,
}

impl<S: NotificationSink> BookingEngine<S> {
    pub fn new(pool: SqlitePool, sink: S) -> Self {
        Self { pool, sink }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Book `player_id` onto (court, date "YYYY-MM-DD", start "HH:MM").
    /// Seats the player if fewer than six are booked, otherwise queues them.
    pub async fn book_session(
        &self,
        player_id: i64,
        court_number: i64,
        date: &str,
        start_time: &str,
        now: NaiveDateTime,
    ) -> Result<Admission> {
        booking::book_session(
            &self.pool,
            &self.sink,
            player_id,
            court_number,
            date,
            start_time,
            now,
        )
        .await
    }

    /// Accept a promoted waiting-list offer while its window is open.
    pub async fn confirm_booking(&self, booking_id: i64, now: NaiveDateTime) -> Result<()> {
        booking::confirm_booking(&self.pool, booking_id, now).await
    }

    /// Periodic late/no-show pass; meant to be driven by an external timer.
    pub async fn run_late_arrival_sweep(&self, now: NaiveDateTime) -> Result<SweepReport> {
        sweep::run_late_arrival_sweep(&self.pool, &self.sink, now).await
    }

    pub async fn available_sessions(&self, date: &str) -> Result<Vec<AvailableSession>> {
        Ok(courtbook_db::available_sessions(&self.pool, date).await?)
    }

    pub async fn player_bookings(&self, player_id: i64) -> Result<Vec<BookingDetail>> {
        Ok(courtbook_db::player_bookings(&self.pool, player_id).await?)
    }

    /// Current warning count and outstanding fines for a player.
    pub async fn player_penalties(&self, player_id: i64) -> Result<Player> {
        courtbook_db::get_player(&self.pool, player_id)
            .await?
            .ok_or_else(|| BookingError::Validation(format!("No such player: {player_id}")))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use courtbook_models::Admission;
    use sqlx::sqlite::SqlitePoolOptions;

    // In-memory sqlite is per-connection; a one-connection pool keeps every
    // query on the same database.
    pub async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        courtbook_db::migrate(&pool).await.unwrap();
        pool
    }

    pub async fn engine() -> (SqlitePool, BookingEngine<RecordingSink>) {
        let pool = self::pool().await;
        let engine = BookingEngine::new(pool.clone(), RecordingSink::new(pool.clone()));
        (pool, engine)
    }

    pub async fn player(pool: &SqlitePool, n: i64) -> i64 {
        courtbook_db::add_player(pool, &format!("Player {n}"), &format!("p{n}@example.com"))
            .await
            .unwrap()
            .id
    }

    pub fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M")
            .unwrap()
    }

    /// Court 1 on `date` at `start`: players 1-6 seated, 7 and 8 waiting at
    /// positions 1 and 2. Returns the session id.
    pub async fn session_with_waiters(
        pool: &SqlitePool,
        engine: &BookingEngine<RecordingSink>,
        date: &str,
        start: &str,
    ) -> i64 {
        let booked_at = at(date, "07:00");
        for n in 1..=6 {
            let id = player(pool, n).await;
            let admission = engine
                .book_session(id, 1, date, start, booked_at)
                .await
                .unwrap();
            assert!(matches!(admission, Admission::Seated { .. }));
        }
        for n in 7..=8 {
            let id = player(pool, n).await;
            let admission = engine
                .book_session(id, 1, date, start, booked_at)
                .await
                .unwrap();
            assert_eq!(admission, Admission::Queued { position: n - 6 });
        }
        sqlx::query_scalar("SELECT id FROM sessions")
            .fetch_one(pool)
            .await
            .unwrap()
    }
}
