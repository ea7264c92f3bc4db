use anyhow::{Context, Result};
use sqlx::SqliteConnection;
use tracing::info;

use crate::{FINE_AMOUNT, WARNING_LIMIT};

/// Result of recording a warning: the new count, and whether this warning
/// crossed the three-warning line and fined the player.
#[derive(Debug, Clone, Copy)]
pub struct WarningOutcome {
    pub warnings: i64,
    pub fined: bool,
}

/// Record one late-arrival warning. The $25 fine lands exactly when the
/// count crosses the limit, detected by comparing the pre/post counts, so a
/// fourth or fifth warning never fines again.
///
/// Runs on the caller's connection: the sweep opens one transaction per
/// booking transition and the ledger write commits inside it.
pub async fn add_warning(conn: &mut SqliteConnection, player_id: i64) -> Result<WarningOutcome> {
    let before: i64 = sqlx::query_scalar("SELECT warnings FROM players WHERE id = ?")
        .bind(player_id)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("no player {player_id}"))?;

    let after = before + 1;
    let fined = before < WARNING_LIMIT && after >= WARNING_LIMIT;
    let fine = if fined { FINE_AMOUNT } else { 0.0 };

    courtbook_db::update_player_counters(conn, player_id, 1, fine).await?;

    if fined {
        info!("Player {player_id} reached warning {after}, ${FINE_AMOUNT} fine applied");
    }
    Ok(WarningOutcome {
        warnings: after,
        fined,
    })
}

/// A no-show always costs $25, independent of the warning count.
pub async fn add_no_show_fine(conn: &mut SqliteConnection, player_id: i64) -> Result<()> {
    courtbook_db::update_player_counters(conn, player_id, 0, FINE_AMOUNT).await?;
    info!("Player {player_id} fined ${FINE_AMOUNT} for a no-show");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn third_warning_fines_exactly_once() {
        let pool = testutil::pool().await;
        let player = testutil::player(&pool, 1).await;
        let mut conn = pool.acquire().await.unwrap();

        add_warning(&mut conn, player).await.unwrap();
        add_warning(&mut conn, player).await.unwrap();
        let third = add_warning(&mut conn, player).await.unwrap();
        assert!(third.fined);
        assert_eq!(third.warnings, 3);

        let fourth = add_warning(&mut conn, player).await.unwrap();
        assert!(!fourth.fined);
        drop(conn);

        let p = courtbook_db::get_player(&pool, player).await.unwrap().unwrap();
        assert_eq!(p.warnings, 4);
        assert_eq!(p.fines, 25.0);
    }

    #[tokio::test]
    async fn no_show_fine_is_unconditional() {
        let pool = testutil::pool().await;
        let player = testutil::player(&pool, 1).await;
        let mut conn = pool.acquire().await.unwrap();

        add_no_show_fine(&mut conn, player).await.unwrap();
        add_no_show_fine(&mut conn, player).await.unwrap();
        drop(conn);

        let p = courtbook_db::get_player(&pool, player).await.unwrap().unwrap();
        assert_eq!(p.warnings, 0);
        assert_eq!(p.fines, 50.0);
    }
}
