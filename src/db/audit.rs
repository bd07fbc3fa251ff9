use sqlx::{QueryBuilder, Row, Sqlite};

use super::{fmt_ts, parse_enum, parse_ts, Database, DbError, DbResult};
use crate::models::{AuditAction, AuditEntry};

pub const DEFAULT_AUDIT_LIMIT: u32 = 50;
pub const MAX_AUDIT_LIMIT: u32 = 500;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AuditFilter {
    pub poll_id: Option<String>,
    pub action: Option<AuditAction>,
    pub admin_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditFilter {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT) as i64
    }
}

impl Database {
    pub async fn record_audit(&self, entry: &AuditEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_logs (id, admin_id, action, entity_type, entity_id, poll_id, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.admin_id)
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.poll_id)
        .bind(entry.details.to_string())
        .bind(fmt_ts(entry.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Audit entries matching the filter, newest first.
    pub async fn list_audit(&self, filter: &AuditFilter) -> DbResult<Vec<AuditEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, admin_id, action, entity_type, entity_id, poll_id, details, created_at \
             FROM admin_audit_logs WHERE 1 = 1",
        );
        if let Some(poll_id) = &filter.poll_id {
            qb.push(" AND poll_id = ").push_bind(poll_id.clone());
        }
        if let Some(action) = filter.action {
            qb.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(admin_id) = &filter.admin_id {
            qb.push(" AND admin_id = ").push_bind(admin_id.clone());
        }
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0) as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let details: String = row.get("details");
            entries.push(AuditEntry {
                id: row.get("id"),
                admin_id: row.get("admin_id"),
                action: parse_enum(&row.get::<String, _>("action"))?,
                entity_type: row.get("entity_type"),
                entity_id: row.get("entity_id"),
                poll_id: row.get("poll_id"),
                details: serde_json::from_str(&details)
                    .map_err(|e| DbError::Corrupt(format!("bad audit details: {}", e)))?,
                created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            });
        }
        Ok(entries)
    }
}
