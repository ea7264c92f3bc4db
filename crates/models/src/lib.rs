use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of a booking. Stored as snake_case text in sqlite; every crate
/// goes through this enum so there is a single spelling of each status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BookingStatus {
    Booked,
    Waiting,
    Late,
    NoShow,
    PendingConfirmation,
    Cancelled,
}

impl BookingStatus {
    /// Terminal statuses no longer count against the player's slot.
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::NoShow | BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    LateWarning,
    FineNotice,
    WaitlistSpotAvailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub warnings: i64,
    pub fines: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Court {
    pub id: i64,
    pub court_number: i64,
}

/// One bookable (court, date, time-window) unit. Dates are "YYYY-MM-DD",
/// times "HH:MM"; end_time is always start_time + 2 hours.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub court_id: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: i64,
    pub player_id: i64,
    pub session_id: i64,
    pub status: BookingStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaitingListEntry {
    pub id: i64,
    pub player_id: i64,
    pub session_id: i64,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub player_id: i64,
    pub kind: NotificationKind,
    pub message: String,
    pub status: String,
    pub created_at: String,
}

/// Where a booking request landed: in a seat, or on the waiting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    Seated { booking_id: i64 },
    Queued { position: i64 },
}

impl Admission {
    pub fn message(&self) -> &'static str {
        match self {
            Admission::Seated { .. } => "Booking successful",
            Admission::Queued { .. } => "Added to waiting list",
        }
    }
}

/// Result of trying to confirm a promoted booking. Everything except
/// `Confirmed` leaves the booking untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    NotFound,
    NotPending,
    WindowExpired,
    SessionFull,
}

/// Flat description of a session for notifications and listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionInfo {
    pub session_id: i64,
    pub court_number: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

/// A session on a given date together with its live seat count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvailableSession {
    pub session_id: i64,
    pub court_number: i64,
    pub start_time: String,
    pub end_time: String,
    pub booked: i64,
}

/// A player's booking joined with its session, for the bookings listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingDetail {
    pub booking_id: i64,
    pub court_number: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: BookingStatus,
}

/// A `Booked` booking due for late/no-show evaluation by the sweep.
#[derive(Debug, Clone, FromRow)]
pub struct SweepCandidate {
    pub booking_id: i64,
    pub player_id: i64,
    pub session_id: i64,
    pub date: String,
    pub start_time: String,
}
