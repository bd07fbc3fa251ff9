use sqlx::Row;

use super::{fmt_ts, parse_ts, Database, DbResult};
use crate::models::ParticipantAttributes;

impl Database {
    pub async fn get_attributes(&self, user_id: &str) -> DbResult<Option<ParticipantAttributes>> {
        let row = sqlx::query(
            "SELECT user_id, age_range, region, gender, updated_at FROM participant_attributes WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ParticipantAttributes {
                user_id: row.get("user_id"),
                age_range: row.get("age_range"),
                region: row.get("region"),
                gender: row.get("gender"),
                updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
            })),
            None => Ok(None),
        }
    }

    pub async fn upsert_attributes(&self, attrs: &ParticipantAttributes) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO participant_attributes (user_id, age_range, region, gender, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id)
            DO UPDATE SET age_range = excluded.age_range, region = excluded.region,
                gender = excluded.gender, updated_at = excluded.updated_at
            "#,
        )
        .bind(&attrs.user_id)
        .bind(&attrs.age_range)
        .bind(&attrs.region)
        .bind(&attrs.gender)
        .bind(fmt_ts(attrs.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
