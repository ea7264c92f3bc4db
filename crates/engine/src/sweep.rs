use chrono::{Duration, NaiveDateTime, NaiveTime};
use courtbook_models::{BookingStatus, NotificationKind};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;
use crate::notify::{NotificationSink, notify};
use crate::penalty;
use crate::{
    CONFIRMATION_WINDOW_MIN, DATE_FMT, FINE_AMOUNT, LATE_THRESHOLD_MIN, NO_SHOW_THRESHOLD_MIN,
    TIME_FMT, WARNING_LIMIT, stamp,
};

/// What one sweep pass did.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SweepReport {
    pub late: usize,
    pub no_shows: usize,
    pub promoted: usize,
    pub expired: usize,
}

/// Evaluate every still-`Booked` booking for sessions dated today against
/// elapsed time since session start, then expire stale promotions. Only
/// `Booked` rows are selected, so re-running the sweep in the same minute
/// changes nothing: a `Late` or `NoShow` booking is never re-penalized.
///
/// Each transition commits in a single transaction together with its ledger
/// write and promotion bookkeeping; a persistence failure rolls the whole
/// transition back and the booking stays `Booked` for the next pass.
pub(crate) async fn run_late_arrival_sweep<S: NotificationSink>(
    pool: &SqlitePool,
    sink: &S,
    now: NaiveDateTime,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let today = now.date().format(DATE_FMT).to_string();

    for candidate in courtbook_db::list_booked_for_date(pool, &today).await? {
        let start = NaiveTime::parse_from_str(&candidate.start_time, TIME_FMT)
            .map_err(|e| anyhow::anyhow!("bad start_time on session {}: {e}", candidate.session_id))?;
        let elapsed = now - NaiveDateTime::new(now.date(), start);

        if elapsed > Duration::minutes(NO_SHOW_THRESHOLD_MIN) {
            mark_no_show(pool, sink, &candidate, now, &mut report).await?;
        } else if elapsed > Duration::minutes(LATE_THRESHOLD_MIN) {
            mark_late(pool, sink, &candidate, &mut report).await?;
        }
    }

    expire_stale_promotions(pool, sink, now, &mut report).await?;

    if report.late + report.no_shows + report.promoted + report.expired > 0 {
        info!(
            "Sweep at {now}: {} late, {} no-shows, {} promoted, {} promotions expired",
            report.late, report.no_shows, report.promoted, report.expired
        );
    }
    Ok(report)
}

async fn mark_no_show<S: NotificationSink>(
    pool: &SqlitePool,
    sink: &S,
    candidate: &courtbook_models::SweepCandidate,
    now: NaiveDateTime,
    report: &mut SweepReport,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    courtbook_db::update_booking_status(&mut tx, candidate.booking_id, BookingStatus::NoShow)
        .await?;
    penalty::add_no_show_fine(&mut tx, candidate.player_id).await?;
    // The vacated seat goes to the head of the waiting list, in the same
    // transaction as the transition that freed it.
    let promoted =
        courtbook_db::promote_first_waiting(&mut tx, candidate.session_id, &stamp(now)).await?;
    tx.commit().await?;

    report.no_shows += 1;
    let message = format!(
        "You missed your {} {} session and have been fined ${FINE_AMOUNT}.",
        candidate.date, candidate.start_time
    );
    notify(pool, sink, candidate.player_id, NotificationKind::FineNotice, &message).await;

    if let Some((player_id, _)) = promoted {
        report.promoted += 1;
        announce_promotion(pool, sink, candidate.session_id, player_id).await?;
    }
    Ok(())
}

async fn mark_late<S: NotificationSink>(
    pool: &SqlitePool,
    sink: &S,
    candidate: &courtbook_models::SweepCandidate,
    report: &mut SweepReport,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    courtbook_db::update_booking_status(&mut tx, candidate.booking_id, BookingStatus::Late)
        .await?;
    let outcome = penalty::add_warning(&mut tx, candidate.player_id).await?;
    tx.commit().await?;

    report.late += 1;
    let message = format!(
        "You arrived more than {LATE_THRESHOLD_MIN} minutes late to your {} {} session. \
         Warnings: {}/{WARNING_LIMIT}.",
        candidate.date, candidate.start_time, outcome.warnings
    );
    notify(pool, sink, candidate.player_id, NotificationKind::LateWarning, &message).await;

    if outcome.fined {
        let message = format!(
            "You have been fined ${FINE_AMOUNT} for reaching {WARNING_LIMIT} late-arrival warnings."
        );
        notify(pool, sink, candidate.player_id, NotificationKind::FineNotice, &message).await;
    }
    Ok(())
}

/// Tell a freshly promoted player about their seat offer.
async fn announce_promotion<S: NotificationSink>(
    pool: &SqlitePool,
    sink: &S,
    session_id: i64,
    player_id: i64,
) -> Result<()> {
    if let Some(details) = courtbook_db::session_info(pool, session_id).await? {
        let message = format!(
            "A spot opened up for court {} on {} {}-{}. Confirm within \
             {CONFIRMATION_WINDOW_MIN} minutes to claim it.",
            details.court_number, details.date, details.start_time, details.end_time
        );
        notify(pool, sink, player_id, NotificationKind::WaitlistSpotAvailable, &message).await;
    }
    Ok(())
}

/// A promotion not confirmed within its window is cancelled and the seat is
/// offered to the next waiter; both halves commit together.
async fn expire_stale_promotions<S: NotificationSink>(
    pool: &SqlitePool,
    sink: &S,
    now: NaiveDateTime,
    report: &mut SweepReport,
) -> Result<()> {
    let cutoff = stamp(now - Duration::minutes(CONFIRMATION_WINDOW_MIN));
    for stale in courtbook_db::list_pending_before(pool, &cutoff).await? {
        let mut tx = pool.begin().await?;
        courtbook_db::update_booking_status(&mut tx, stale.id, BookingStatus::Cancelled).await?;
        let promoted =
            courtbook_db::promote_first_waiting(&mut tx, stale.session_id, &stamp(now)).await?;
        tx.commit().await?;

        report.expired += 1;
        info!(
            "Promotion {} for player {} expired unconfirmed",
            stale.id, stale.player_id
        );
        if let Some((player_id, _)) = promoted {
            report.promoted += 1;
            announce_promotion(pool, sink, stale.session_id, player_id).await?;
        }
    }
    Ok(())
}
