use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde_json::json;
use tokio::time::interval;

use crate::db::{fmt_ts, Database, DbResult};
use crate::models::{AuditAction, AuditEntry};

pub const SYSTEM_ACTOR: &str = "system";

/// Close every open poll whose end date has passed. Returns the closed ids.
pub async fn close_expired_polls(database: &Database, now: DateTime<Utc>) -> DbResult<Vec<String>> {
    let mut closed = Vec::new();
    for poll_id in database.get_expired_polls(now).await? {
        // Another closer, or an admin, may have got there first.
        if !database.close_poll(&poll_id, now).await? {
            continue;
        }
        database
            .record_audit(
                &AuditEntry::for_poll(SYSTEM_ACTOR, AuditAction::AutoClose, &poll_id)
                    .with_details(json!({ "closed_at": fmt_ts(now) })),
            )
            .await?;
        info!("Closed expired poll {}", poll_id);
        closed.push(poll_id);
    }
    Ok(closed)
}

pub async fn run(database: Arc<Database>, every: Duration) {
    info!("Starting background task to close expired polls every {:?}", every);
    let mut interval = interval(every);

    loop {
        interval.tick().await;
        let now = Utc::now();
        debug!("Checking for expired polls at {}", now.to_rfc3339());

        match close_expired_polls(&database, now).await {
            Ok(closed) if !closed.is_empty() => info!("Closed {} expired poll(s)", closed.len()),
            Ok(_) => {}
            Err(e) => error!("Failed to close expired polls: {}", e),
        }
    }
}
