use thiserror::Error;

/// Errors surfaced by booking operations. A full session is not an error:
/// the player routes to the waiting list instead.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Bad input (window, court number, date format). Nothing was written;
    /// safe to retry with corrected input.
    #[error("{0}")]
    Validation(String),

    /// The player already holds a live booking or waiting list entry for
    /// this session.
    #[error("player already has an active booking for this session")]
    AlreadyBooked,

    /// Persistence failed; the triggering operation was rolled back.
    #[error("persistence failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<sqlx::Error> for BookingError {
    fn from(e: sqlx::Error) -> Self {
        BookingError::Store(e.into())
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
