use courtbook_models::NotificationKind;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Receives booking events for delivery. Delivery is best-effort: failures
/// are logged and recorded, never propagated into booking state.
pub trait NotificationSink: Send + Sync {
    fn emit(
        &self,
        player_id: i64,
        kind: NotificationKind,
        message: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// Default sink: writes the event to the append-only notifications table and
/// the log. An actual mail channel would hang off `emit` here; until then the
/// log line stands in for delivery.
#[derive(Clone)]
pub struct RecordingSink {
    pool: SqlitePool,
}

impl RecordingSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl NotificationSink for RecordingSink {
    async fn emit(&self, player_id: i64, kind: NotificationKind, message: &str) -> anyhow::Result<()> {
        let Some(player) = courtbook_db::get_player(&self.pool, player_id).await? else {
            anyhow::bail!("notification for unknown player {player_id}");
        };
        info!("Notification ({kind:?}) to {}: {message}", player.email);
        courtbook_db::log_notification(&self.pool, player_id, kind, message, "sent").await?;
        Ok(())
    }
}

/// Fire-and-forget wrapper used by the engine after state changes commit.
/// A delivery failure still leaves an audit row, marked `failed`.
pub(crate) async fn notify<S: NotificationSink>(
    pool: &SqlitePool,
    sink: &S,
    player_id: i64,
    kind: NotificationKind,
    message: &str,
) {
    if let Err(e) = sink.emit(player_id, kind, message).await {
        warn!("Notification {kind:?} for player {player_id} not delivered: {e:#}");
        if let Err(e) =
            courtbook_db::log_notification(pool, player_id, kind, message, "failed").await
        {
            warn!("Could not record failed notification for player {player_id}: {e:#}");
        }
    }
}
