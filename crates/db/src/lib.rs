use anyhow::Result;
use courtbook_models::{
    Admission, AvailableSession, Booking, BookingDetail, BookingStatus, ConfirmOutcome, Court,
    Notification, NotificationKind, Player, Session, SessionInfo, SweepCandidate,
    WaitingListEntry,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

/// Seats per session. Overflow goes to the waiting list, never an error.
pub const SESSION_CAPACITY: i64 = 6;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    info!("Connected to database: {database_url}");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Migrations applied");
    Ok(())
}

// --- Players ---

pub async fn add_player(pool: &SqlitePool, name: &str, email: &str) -> Result<Player> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        anyhow::bail!("Email already registered: {email}");
    }
    let result = sqlx::query("INSERT INTO players (name, email) VALUES (?, ?)")
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    let id = result.last_insert_rowid();
    info!("Player {id} registered ({email})");
    Ok(Player {
        id,
        name: name.to_string(),
        email: email.to_string(),
        warnings: 0,
        fines: 0.0,
    })
}

pub async fn get_player(pool: &SqlitePool, player_id: i64) -> Result<Option<Player>> {
    let player = sqlx::query_as::<_, Player>(
        "SELECT id, name, email, warnings, fines FROM players WHERE id = ?",
    )
    .bind(player_id)
    .fetch_optional(pool)
    .await?;
    Ok(player)
}

/// Runs on the caller's connection so a penalty and the booking transition
/// that caused it can commit in one transaction.
pub async fn update_player_counters(
    conn: &mut SqliteConnection,
    player_id: i64,
    warnings_delta: i64,
    fines_delta: f64,
) -> Result<()> {
    sqlx::query("UPDATE players SET warnings = warnings + ?, fines = fines + ? WHERE id = ?")
        .bind(warnings_delta)
        .bind(fines_delta)
        .bind(player_id)
        .execute(conn)
        .await?;
    Ok(())
}

// --- Courts and sessions ---

pub async fn find_court(pool: &SqlitePool, court_number: i64) -> Result<Option<Court>> {
    let court =
        sqlx::query_as::<_, Court>("SELECT id, court_number FROM courts WHERE court_number = ?")
            .bind(court_number)
            .fetch_optional(pool)
            .await?;
    Ok(court)
}

pub async fn find_session(
    pool: &SqlitePool,
    court_id: i64,
    date: &str,
    start_time: &str,
) -> Result<Option<Session>> {
    let session = sqlx::query_as::<_, Session>(
        "SELECT id, court_id, date, start_time, end_time FROM sessions \
         WHERE court_id = ? AND date = ? AND start_time = ?",
    )
    .bind(court_id)
    .bind(date)
    .bind(start_time)
    .fetch_optional(pool)
    .await?;
    Ok(session)
}

/// Raw insert. A UNIQUE violation on (court_id, date, start_time) propagates;
/// callers racing to create the same slot recover by re-running `find_session`.
pub async fn create_session(
    pool: &SqlitePool,
    court_id: i64,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> Result<Session> {
    let result = sqlx::query(
        "INSERT INTO sessions (court_id, date, start_time, end_time) VALUES (?, ?, ?, ?)",
    )
    .bind(court_id)
    .bind(date)
    .bind(start_time)
    .bind(end_time)
    .execute(pool)
    .await?;
    Ok(Session {
        id: result.last_insert_rowid(),
        court_id,
        date: date.to_string(),
        start_time: start_time.to_string(),
        end_time: end_time.to_string(),
    })
}

pub async fn session_info(pool: &SqlitePool, session_id: i64) -> Result<Option<SessionInfo>> {
    let details = sqlx::query_as::<_, SessionInfo>(
        "SELECT s.id AS session_id, c.court_number, s.date, s.start_time, s.end_time \
         FROM sessions s JOIN courts c ON s.court_id = c.id WHERE s.id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    Ok(details)
}

// --- Bookings ---

pub async fn count_booked(pool: &SqlitePool, session_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE session_id = ? AND status = ?")
            .bind(session_id)
            .bind(BookingStatus::Booked)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

pub async fn get_booking(pool: &SqlitePool, booking_id: i64) -> Result<Option<Booking>> {
    let booking = sqlx::query_as::<_, Booking>(
        "SELECT id, player_id, session_id, status, created_at FROM bookings WHERE id = ?",
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await?;
    Ok(booking)
}

/// Runs on the caller's connection: status transitions commit together with
/// the ledger writes and promotion bookkeeping they trigger.
pub async fn update_booking_status(
    conn: &mut SqliteConnection,
    booking_id: i64,
    status: BookingStatus,
) -> Result<()> {
    sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
        .bind(status)
        .bind(booking_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// True if the player already holds a non-terminal booking or a waiting list
/// entry for this session.
pub async fn has_active_booking(
    pool: &SqlitePool,
    player_id: i64,
    session_id: i64,
) -> Result<bool> {
    let booked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bookings WHERE player_id = ? AND session_id = ? \
         AND status IN (?, ?, ?, ?)",
    )
    .bind(player_id)
    .bind(session_id)
    .bind(BookingStatus::Booked)
    .bind(BookingStatus::Waiting)
    .bind(BookingStatus::Late)
    .bind(BookingStatus::PendingConfirmation)
    .fetch_one(pool)
    .await?;
    if booked > 0 {
        return Ok(true);
    }
    let waiting: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM waiting_list WHERE player_id = ? AND session_id = ?",
    )
    .bind(player_id)
    .bind(session_id)
    .fetch_one(pool)
    .await?;
    Ok(waiting > 0)
}

/// Admission: seat the player while fewer than six are booked, otherwise
/// append to the waiting list at MAX(position)+1. The seat count and the
/// insert run in one transaction so concurrent requests cannot both take
/// the last seat.
pub async fn create_booking(
    pool: &SqlitePool,
    player_id: i64,
    session_id: i64,
    created_at: &str,
) -> Result<Admission> {
    let mut tx = pool.begin().await?;
    let booked: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE session_id = ? AND status = ?")
            .bind(session_id)
            .bind(BookingStatus::Booked)
            .fetch_one(&mut *tx)
            .await?;

    let admission = if booked < SESSION_CAPACITY {
        let result = sqlx::query(
            "INSERT INTO bookings (player_id, session_id, status, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(player_id)
        .bind(session_id)
        .bind(BookingStatus::Booked)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        Admission::Seated {
            booking_id: result.last_insert_rowid(),
        }
    } else {
        let max_position: Option<i64> =
            sqlx::query_scalar("SELECT MAX(position) FROM waiting_list WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        let position = max_position.unwrap_or(0) + 1;
        sqlx::query("INSERT INTO waiting_list (player_id, session_id, position) VALUES (?, ?, ?)")
            .bind(player_id)
            .bind(session_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        Admission::Queued { position }
    };

    tx.commit().await?;
    Ok(admission)
}

/// All still-`Booked` bookings for sessions on the given date, with the
/// session start needed to compute elapsed time.
pub async fn list_booked_for_date(pool: &SqlitePool, date: &str) -> Result<Vec<SweepCandidate>> {
    let rows = sqlx::query_as::<_, SweepCandidate>(
        "SELECT b.id AS booking_id, b.player_id, b.session_id, s.date, s.start_time \
         FROM bookings b JOIN sessions s ON b.session_id = s.id \
         WHERE s.date = ? AND b.status = ?",
    )
    .bind(date)
    .bind(BookingStatus::Booked)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Promotions awaiting confirmation created strictly before `cutoff`. Same
/// boundary as `confirm_pending`: a booking is either still confirmable or
/// expired, never both.
pub async fn list_pending_before(pool: &SqlitePool, cutoff: &str) -> Result<Vec<Booking>> {
    let rows = sqlx::query_as::<_, Booking>(
        "SELECT id, player_id, session_id, status, created_at FROM bookings \
         WHERE status = ? AND created_at < ?",
    )
    .bind(BookingStatus::PendingConfirmation)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// --- Waiting list ---

pub async fn list_waiting(pool: &SqlitePool, session_id: i64) -> Result<Vec<WaitingListEntry>> {
    let rows = sqlx::query_as::<_, WaitingListEntry>(
        "SELECT id, player_id, session_id, position FROM waiting_list \
         WHERE session_id = ? ORDER BY position",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Move the head of the session's waiting list into a `PendingConfirmation`
/// booking and drop its entry, leaving the remaining positions untouched.
/// Runs on the caller's connection: the seat-vacating transition and this
/// bookkeeping must commit as one unit. Returns the promoted
/// (player_id, booking_id), or None if nobody waits.
pub async fn promote_first_waiting(
    conn: &mut SqliteConnection,
    session_id: i64,
    created_at: &str,
) -> Result<Option<(i64, i64)>> {
    let head = sqlx::query_as::<_, WaitingListEntry>(
        "SELECT id, player_id, session_id, position FROM waiting_list \
         WHERE session_id = ? ORDER BY position LIMIT 1",
    )
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(entry) = head else {
        return Ok(None);
    };

    let result = sqlx::query(
        "INSERT INTO bookings (player_id, session_id, status, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(entry.player_id)
    .bind(session_id)
    .bind(BookingStatus::PendingConfirmation)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;
    let booking_id = result.last_insert_rowid();

    sqlx::query("DELETE FROM waiting_list WHERE id = ?")
        .bind(entry.id)
        .execute(&mut *conn)
        .await?;

    info!(
        "Player {} promoted from waiting list for session {session_id} (position {})",
        entry.player_id, entry.position
    );
    Ok(Some((entry.player_id, booking_id)))
}

/// Confirm a promoted booking: check status, window and capacity and flip to
/// `Booked` in one transaction, so two confirmations (or a confirm racing a
/// direct booking) cannot both take the last seat. `window_cutoff` is the
/// oldest acceptable created_at stamp.
pub async fn confirm_pending(
    pool: &SqlitePool,
    booking_id: i64,
    window_cutoff: &str,
) -> Result<ConfirmOutcome> {
    let mut tx = pool.begin().await?;
    let booking = sqlx::query_as::<_, Booking>(
        "SELECT id, player_id, session_id, status, created_at FROM bookings WHERE id = ?",
    )
    .bind(booking_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(booking) = booking else {
        return Ok(ConfirmOutcome::NotFound);
    };
    if booking.status != BookingStatus::PendingConfirmation {
        return Ok(ConfirmOutcome::NotPending);
    }
    if booking.created_at.as_str() < window_cutoff {
        return Ok(ConfirmOutcome::WindowExpired);
    }

    let booked: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE session_id = ? AND status = ?")
            .bind(booking.session_id)
            .bind(BookingStatus::Booked)
            .fetch_one(&mut *tx)
            .await?;
    if booked >= SESSION_CAPACITY {
        return Ok(ConfirmOutcome::SessionFull);
    }

    sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
        .bind(BookingStatus::Booked)
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!("Booking {booking_id} confirmed");
    Ok(ConfirmOutcome::Confirmed)
}

// --- Queries ---

pub async fn available_sessions(pool: &SqlitePool, date: &str) -> Result<Vec<AvailableSession>> {
    let rows = sqlx::query_as::<_, AvailableSession>(
        "SELECT s.id AS session_id, c.court_number, s.start_time, s.end_time, \
           (SELECT COUNT(*) FROM bookings WHERE session_id = s.id AND status = 'booked') AS booked \
         FROM sessions s JOIN courts c ON s.court_id = c.id \
         WHERE s.date = ? ORDER BY s.start_time, c.court_number",
    )
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn player_bookings(pool: &SqlitePool, player_id: i64) -> Result<Vec<BookingDetail>> {
    let rows = sqlx::query_as::<_, BookingDetail>(
        "SELECT b.id AS booking_id, c.court_number, s.date, s.start_time, s.end_time, b.status \
         FROM bookings b \
         JOIN sessions s ON b.session_id = s.id \
         JOIN courts c ON s.court_id = c.id \
         WHERE b.player_id = ? ORDER BY s.date, s.start_time",
    )
    .bind(player_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// --- Notifications ---

pub async fn log_notification(
    pool: &SqlitePool,
    player_id: i64,
    kind: NotificationKind,
    message: &str,
    status: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO notifications (player_id, kind, message, status) VALUES (?, ?, ?, ?)")
        .bind(player_id)
        .bind(kind)
        .bind(message)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_notifications(pool: &SqlitePool, player_id: i64) -> Result<Vec<Notification>> {
    let rows = sqlx::query_as::<_, Notification>(
        "SELECT id, player_id, kind, message, status, created_at FROM notifications \
         WHERE player_id = ? ORDER BY id",
    )
    .bind(player_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
