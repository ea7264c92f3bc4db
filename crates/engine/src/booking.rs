use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use courtbook_models::{Admission, ConfirmOutcome, NotificationKind, Session};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{BookingError, Result};
use crate::notify::{NotificationSink, notify};
use crate::{
    BOOKING_WINDOW_DAYS, CONFIRMATION_WINDOW_MIN, DATE_FMT, SESSION_LENGTH_HOURS, TIME_FMT, stamp,
};

/// Take a booking request through validation, session resolution and
/// admission. Validation failures happen before anything is written.
pub(crate) async fn book_session<S: NotificationSink>(
    pool: &SqlitePool,
    sink: &S,
    player_id: i64,
    court_number: i64,
    date: &str,
    start_time: &str,
    now: NaiveDateTime,
) -> Result<Admission> {
    let day = NaiveDate::parse_from_str(date, DATE_FMT)
        .map_err(|_| BookingError::Validation(format!("Invalid date: {date}")))?;
    let start = NaiveTime::parse_from_str(start_time, TIME_FMT)
        .map_err(|_| BookingError::Validation(format!("Invalid start time: {start_time}")))?;

    let start_dt = NaiveDateTime::new(day, start);
    if start_dt < now {
        return Err(BookingError::Validation(
            "Cannot book sessions in the past".into(),
        ));
    }
    if start_dt > now + Duration::days(BOOKING_WINDOW_DAYS) {
        return Err(BookingError::Validation(
            "Cannot book sessions more than a week in advance".into(),
        ));
    }

    let court = courtbook_db::find_court(pool, court_number)
        .await?
        .ok_or_else(|| BookingError::Validation(format!("No such court: {court_number}")))?;
    if courtbook_db::get_player(pool, player_id).await?.is_none() {
        return Err(BookingError::Validation(format!(
            "No such player: {player_id}"
        )));
    }

    let date_key = day.format(DATE_FMT).to_string();
    let start_key = start.format(TIME_FMT).to_string();
    let end_key = (start_dt + Duration::hours(SESSION_LENGTH_HOURS))
        .time()
        .format(TIME_FMT)
        .to_string();
    let session = resolve_session(pool, court.id, &date_key, &start_key, &end_key).await?;

    if courtbook_db::has_active_booking(pool, player_id, session.id).await? {
        return Err(BookingError::AlreadyBooked);
    }

    let admission =
        courtbook_db::create_booking(pool, player_id, session.id, &stamp(now)).await?;
    info!(
        "Player {player_id}, court {court_number} {date_key} {start_key}: {}",
        admission.message()
    );

    if let Admission::Seated { .. } = admission {
        if let Some(details) = courtbook_db::session_info(pool, session.id).await? {
            let message = format!(
                "Court {} booked for {} {}-{}. Arrive on time: more than 15 minutes late \
                 earns a warning, a no-show a $25 fine.",
                details.court_number, details.date, details.start_time, details.end_time
            );
            notify(pool, sink, player_id, NotificationKind::BookingConfirmed, &message).await;
        }
    }
    Ok(admission)
}

/// Look up the (court, date, start) slot, creating it on first use. Two
/// callers racing to create the same slot resolve to the winner's row via
/// the UNIQUE constraint.
async fn resolve_session(
    pool: &SqlitePool,
    court_id: i64,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> Result<Session> {
    if let Some(session) = courtbook_db::find_session(pool, court_id, date, start_time).await? {
        return Ok(session);
    }
    match courtbook_db::create_session(pool, court_id, date, start_time, end_time).await {
        Ok(session) => Ok(session),
        Err(create_err) => courtbook_db::find_session(pool, court_id, date, start_time)
            .await?
            .ok_or(BookingError::Store(create_err)),
    }
}

/// Turn a promoted `PendingConfirmation` booking into a seat. Only valid
/// within the confirmation window and while the freed seat is still open.
/// The window and capacity checks run inside the store's transaction, so
/// two confirmations racing for the last seat cannot both land.
pub(crate) async fn confirm_booking(
    pool: &SqlitePool,
    booking_id: i64,
    now: NaiveDateTime,
) -> Result<()> {
    let cutoff = stamp(now - Duration::minutes(CONFIRMATION_WINDOW_MIN));
    match courtbook_db::confirm_pending(pool, booking_id, &cutoff).await? {
        ConfirmOutcome::Confirmed => {
            info!("Booking {booking_id} confirmed");
            Ok(())
        }
        ConfirmOutcome::NotFound => Err(BookingError::Validation(format!(
            "No such booking: {booking_id}"
        ))),
        ConfirmOutcome::NotPending => Err(BookingError::Validation(
            "Booking is not awaiting confirmation".into(),
        )),
        ConfirmOutcome::WindowExpired => Err(BookingError::Validation(
            "Confirmation window has passed".into(),
        )),
        ConfirmOutcome::SessionFull => {
            Err(BookingError::Validation("Session is full again".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn booking_beyond_a_week_is_rejected_without_side_effects() {
        let (pool, engine) = testutil::engine().await;
        let player = testutil::player(&pool, 1).await;
        let now = testutil::at("2026-09-01", "08:00");

        let err = engine
            .book_session(player, 1, "2026-09-09", "10:00", now)
            .await;
        assert!(matches!(err, Err(BookingError::Validation(_))));

        // Fail-fast: no session was created for the rejected slot.
        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(sessions, 0);
    }

    #[tokio::test]
    async fn booking_in_the_past_is_rejected() {
        let (pool, engine) = testutil::engine().await;
        let player = testutil::player(&pool, 1).await;
        let now = testutil::at("2026-09-01", "11:00");

        let err = engine
            .book_session(player, 1, "2026-09-01", "10:00", now)
            .await;
        assert!(matches!(err, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_court_is_rejected() {
        let (pool, engine) = testutil::engine().await;
        let player = testutil::player(&pool, 1).await;
        let now = testutil::at("2026-09-01", "08:00");

        let err = engine
            .book_session(player, 9, "2026-09-02", "10:00", now)
            .await;
        assert!(matches!(err, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn overflow_queues_seventh_and_eighth_players() {
        let (pool, engine) = testutil::engine().await;
        let now = testutil::at("2026-09-01", "08:00");

        for n in 1..=6 {
            let player = testutil::player(&pool, n).await;
            let admission = engine
                .book_session(player, 2, "2026-09-02", "10:00", now)
                .await
                .unwrap();
            assert!(matches!(admission, Admission::Seated { .. }));
        }

        let seventh = testutil::player(&pool, 7).await;
        let admission = engine
            .book_session(seventh, 2, "2026-09-02", "10:00", now)
            .await
            .unwrap();
        assert_eq!(admission, Admission::Queued { position: 1 });

        let eighth = testutil::player(&pool, 8).await;
        let admission = engine
            .book_session(eighth, 2, "2026-09-02", "10:00", now)
            .await
            .unwrap();
        assert_eq!(admission, Admission::Queued { position: 2 });
    }

    #[tokio::test]
    async fn second_booking_for_same_slot_is_rejected() {
        let (pool, engine) = testutil::engine().await;
        let player = testutil::player(&pool, 1).await;
        let now = testutil::at("2026-09-01", "08:00");

        engine
            .book_session(player, 1, "2026-09-02", "10:00", now)
            .await
            .unwrap();
        let err = engine
            .book_session(player, 1, "2026-09-02", "10:00", now)
            .await;
        assert!(matches!(err, Err(BookingError::AlreadyBooked)));
    }

    #[tokio::test]
    async fn same_slot_resolves_to_one_session() {
        let (pool, engine) = testutil::engine().await;
        let now = testutil::at("2026-09-01", "08:00");
        let a = testutil::player(&pool, 1).await;
        let b = testutil::player(&pool, 2).await;

        engine.book_session(a, 3, "2026-09-02", "14:00", now).await.unwrap();
        engine.book_session(b, 3, "2026-09-02", "14:00", now).await.unwrap();

        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(sessions, 1);

        // End time derives from the two-hour session length.
        let session = courtbook_db::available_sessions(&pool, "2026-09-02")
            .await
            .unwrap();
        assert_eq!(session[0].end_time, "16:00");
        assert_eq!(session[0].booked, 2);
    }

    #[tokio::test]
    async fn two_confirmations_cannot_share_the_last_seat() {
        let (pool, engine) = testutil::engine().await;
        let now = testutil::at("2026-09-01", "08:00");

        // Five seats taken, two promotions outstanding for the sixth.
        for n in 1..=5 {
            let player = testutil::player(&pool, n).await;
            engine
                .book_session(player, 4, "2026-09-02", "10:00", now)
                .await
                .unwrap();
        }
        let session: i64 = sqlx::query_scalar("SELECT id FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        let mut pending = Vec::new();
        for n in 6..=7 {
            let player = testutil::player(&pool, n).await;
            sqlx::query(
                "INSERT INTO bookings (player_id, session_id, status, created_at) \
                 VALUES (?, ?, 'pending_confirmation', '2026-09-01 08:00:00')",
            )
            .bind(player)
            .bind(session)
            .execute(&pool)
            .await
            .unwrap();
            pending.push(
                sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
                    .fetch_one(&pool)
                    .await
                    .unwrap(),
            );
        }

        let within = testutil::at("2026-09-01", "08:03");
        engine.confirm_booking(pending[0], within).await.unwrap();
        let err = engine.confirm_booking(pending[1], within).await;
        assert!(matches!(err, Err(BookingError::Validation(_))));

        assert_eq!(courtbook_db::count_booked(&pool, session).await.unwrap(), 6);
        let loser = courtbook_db::get_booking(&pool, pending[1]).await.unwrap().unwrap();
        assert_eq!(loser.status, courtbook_models::BookingStatus::PendingConfirmation);
    }

    #[tokio::test]
    async fn seated_booking_emits_confirmation() {
        let (pool, engine) = testutil::engine().await;
        let player = testutil::player(&pool, 1).await;
        let now = testutil::at("2026-09-01", "08:00");

        engine
            .book_session(player, 1, "2026-09-02", "10:00", now)
            .await
            .unwrap();
        let notifications = courtbook_db::list_notifications(&pool, player).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::BookingConfirmed);
    }
}
