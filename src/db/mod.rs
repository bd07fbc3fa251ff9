mod audit;
mod participants;
mod votes;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::config::Config;
use crate::models::{Poll, PollOption, PollStatus};

pub use audit::AuditFilter;
pub use votes::{RankRow, Selection, VoteData};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("vote limit of {limit} reached")]
    VoteLimitReached { limit: u32 },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Stored timestamps are fixed width so that text comparison orders them.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_opt_ts(raw: Option<String>) -> DbResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_enum<T: FromStr>(raw: &str) -> DbResult<T> {
    raw.parse::<T>()
        .map_err(|_| DbError::Corrupt(format!("unknown enum value '{}'", raw)))
}

const POLL_COLUMNS: &str = "p.id, p.title, p.description, p.vote_type, p.status, p.is_public, \
    p.results_visibility, p.allow_multiple, p.max_votes_per_user, p.max_choices, p.start_date, \
    p.end_date, p.image_url, p.is_featured, p.created_by, p.created_at, p.updated_at";

/// Builds a poll from a row selected with `POLL_COLUMNS`. Options are left empty.
fn poll_from_row(row: &SqliteRow) -> DbResult<Poll> {
    Ok(Poll {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        vote_type: parse_enum(&row.get::<String, _>("vote_type"))?,
        status: parse_enum(&row.get::<String, _>("status"))?,
        is_public: row.get("is_public"),
        results_visibility: parse_enum(&row.get::<String, _>("results_visibility"))?,
        allow_multiple: row.get("allow_multiple"),
        max_votes_per_user: row.get::<i64, _>("max_votes_per_user") as u32,
        max_choices: row.get::<Option<i64>, _>("max_choices").map(|c| c as u32),
        start_date: parse_opt_ts(row.get("start_date"))?,
        end_date: parse_opt_ts(row.get("end_date"))?,
        image_url: row.get("image_url"),
        is_featured: row.get("is_featured"),
        created_by: row.get("created_by"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
        options: Vec::new(),
    })
}

fn option_from_row(row: &SqliteRow) -> PollOption {
    PollOption {
        id: row.get("id"),
        poll_id: row.get("poll_id"),
        text: row.get("text"),
        position: row.get("position"),
    }
}

/// Which polls a listing includes.
#[derive(Debug, Clone, Default)]
pub struct PollFilter {
    /// Include drafts and non-public polls.
    pub include_hidden: bool,
    pub status: Option<PollStatus>,
    pub featured: Option<bool>,
}

/// A poll together with how many ballots it received.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PollListing {
    #[serde(flatten)]
    pub poll: Poll,
    pub vote_count: i64,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &Config) -> DbResult<Self> {
        Self::connect(&config.database_url, config.database_max_connections).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;
        info!("Connected to database {}", database_url);

        Ok(Self { pool })
    }

    /// Private in-memory database. One connection, kept alive, so every
    /// query sees the same data.
    #[cfg(test)]
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(pool: &SqlitePool) -> DbResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                vote_type TEXT NOT NULL CHECK (vote_type IN ('single', 'multiple', 'ranking')),
                status TEXT NOT NULL DEFAULT 'open',
                is_public BOOLEAN NOT NULL DEFAULT TRUE,
                results_visibility TEXT NOT NULL DEFAULT 'live',
                allow_multiple BOOLEAN NOT NULL DEFAULT FALSE,
                max_votes_per_user INTEGER NOT NULL DEFAULT 1,
                max_choices INTEGER,
                start_date TEXT,
                end_date TEXT,
                image_url TEXT,
                is_featured BOOLEAN NOT NULL DEFAULT FALSE,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                id TEXT PRIMARY KEY,
                poll_id TEXT NOT NULL,
                text TEXT NOT NULL,
                position INTEGER NOT NULL,
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                id TEXT PRIMARY KEY,
                poll_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                option_id TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE,
                FOREIGN KEY (option_id) REFERENCES poll_options(id) ON DELETE CASCADE
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_votes_poll_user ON votes (poll_id, user_id)",
            r#"
            CREATE TABLE IF NOT EXISTS vote_options (
                vote_id TEXT NOT NULL,
                option_id TEXT NOT NULL,
                rank INTEGER,
                PRIMARY KEY (vote_id, option_id),
                FOREIGN KEY (vote_id) REFERENCES votes(id) ON DELETE CASCADE,
                FOREIGN KEY (option_id) REFERENCES poll_options(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vote_rankings (
                vote_id TEXT NOT NULL,
                option_id TEXT NOT NULL,
                rank INTEGER NOT NULL,
                PRIMARY KEY (vote_id, option_id),
                FOREIGN KEY (vote_id) REFERENCES votes(id) ON DELETE CASCADE,
                FOREIGN KEY (option_id) REFERENCES poll_options(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS participant_attributes (
                user_id TEXT PRIMARY KEY,
                age_range TEXT,
                region TEXT,
                gender TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS admin_audit_logs (
                id TEXT PRIMARY KEY,
                admin_id TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                poll_id TEXT,
                details TEXT NOT NULL DEFAULT 'null',
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_audit_created ON admin_audit_logs (created_at)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    // Create a poll and its options in one transaction
    pub async fn create_poll(&self, poll: &Poll) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO polls (id, title, description, vote_type, status, is_public, results_visibility,
                allow_multiple, max_votes_per_user, max_choices, start_date, end_date, image_url,
                is_featured, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(poll.vote_type.as_str())
        .bind(poll.status.as_str())
        .bind(poll.is_public)
        .bind(poll.results_visibility.as_str())
        .bind(poll.allow_multiple)
        .bind(poll.max_votes_per_user as i64)
        .bind(poll.max_choices.map(|c| c as i64))
        .bind(poll.start_date.map(fmt_ts))
        .bind(poll.end_date.map(fmt_ts))
        .bind(&poll.image_url)
        .bind(poll.is_featured)
        .bind(&poll.created_by)
        .bind(fmt_ts(poll.created_at))
        .bind(fmt_ts(poll.updated_at))
        .execute(&mut *tx)
        .await?;

        for option in &poll.options {
            sqlx::query("INSERT INTO poll_options (id, poll_id, text, position) VALUES (?, ?, ?, ?)")
                .bind(&option.id)
                .bind(&poll.id)
                .bind(&option.text)
                .bind(option.position)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Persist every mutable setting of a poll.
    pub async fn update_poll(&self, poll: &Poll) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE polls
            SET title = ?, description = ?, status = ?, is_public = ?, results_visibility = ?,
                allow_multiple = ?, max_votes_per_user = ?, max_choices = ?, start_date = ?,
                end_date = ?, image_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(poll.status.as_str())
        .bind(poll.is_public)
        .bind(poll.results_visibility.as_str())
        .bind(poll.allow_multiple)
        .bind(poll.max_votes_per_user as i64)
        .bind(poll.max_choices.map(|c| c as i64))
        .bind(poll.start_date.map(fmt_ts))
        .bind(poll.end_date.map(fmt_ts))
        .bind(&poll.image_url)
        .bind(fmt_ts(poll.updated_at))
        .bind(&poll.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound { resource: "poll", id: poll.id.clone() });
        }
        Ok(())
    }

    pub async fn delete_poll(&self, poll_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM polls WHERE id = ?")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound { resource: "poll", id: poll_id.to_string() });
        }
        Ok(())
    }

    // Get a poll by ID, with its options in display order
    pub async fn get_poll(&self, poll_id: &str) -> DbResult<Poll> {
        let row = sqlx::query(&format!("SELECT {} FROM polls p WHERE p.id = ?", POLL_COLUMNS))
            .bind(poll_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound { resource: "poll", id: poll_id.to_string() })?;

        let mut poll = poll_from_row(&row)?;
        poll.options = self.get_options(poll_id).await?;
        Ok(poll)
    }

    pub async fn get_options(&self, poll_id: &str) -> DbResult<Vec<PollOption>> {
        let options = sqlx::query(
            "SELECT id, poll_id, text, position FROM poll_options WHERE poll_id = ? ORDER BY position",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(option_from_row)
        .collect();
        Ok(options)
    }

    /// List polls with their ballot counts, newest first. Options for all
    /// listed polls are fetched in one extra query.
    pub async fn list_polls(&self, filter: &PollFilter) -> DbResult<Vec<PollListing>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {}, (SELECT COUNT(*) FROM votes v WHERE v.poll_id = p.id) AS vote_count \
             FROM polls p WHERE 1 = 1",
            POLL_COLUMNS
        ));
        if !filter.include_hidden {
            qb.push(" AND p.is_public = TRUE AND p.status <> 'draft'");
        }
        if let Some(status) = filter.status {
            qb.push(" AND p.status = ").push_bind(status.as_str());
        }
        if let Some(featured) = filter.featured {
            qb.push(" AND p.is_featured = ").push_bind(featured);
        }
        qb.push(" ORDER BY p.is_featured DESC, p.created_at DESC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut listings = Vec::with_capacity(rows.len());
        for row in &rows {
            listings.push(PollListing {
                poll: poll_from_row(row)?,
                vote_count: row.get("vote_count"),
            });
        }
        if listings.is_empty() {
            return Ok(listings);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, poll_id, text, position FROM poll_options WHERE poll_id IN (");
        let mut ids = qb.separated(", ");
        for listing in &listings {
            ids.push_bind(listing.poll.id.clone());
        }
        ids.push_unseparated(") ORDER BY position");

        for row in qb.build().fetch_all(&self.pool).await? {
            let option = option_from_row(&row);
            if let Some(listing) = listings.iter_mut().find(|l| l.poll.id == option.poll_id) {
                listing.poll.options.push(option);
            }
        }
        Ok(listings)
    }

    /// Append an option at the end of the poll's list.
    pub async fn add_option(&self, poll_id: &str, option_id: &str, text: &str) -> DbResult<PollOption> {
        let row = sqlx::query(
            r#"
            INSERT INTO poll_options (id, poll_id, text, position)
            SELECT ?, ?, ?, COALESCE(MAX(position) + 1, 0) FROM poll_options WHERE poll_id = ?
            RETURNING id, poll_id, text, position
            "#,
        )
        .bind(option_id)
        .bind(poll_id)
        .bind(text)
        .bind(poll_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(option_from_row(&row))
    }

    pub async fn get_option(&self, option_id: &str) -> DbResult<PollOption> {
        sqlx::query("SELECT id, poll_id, text, position FROM poll_options WHERE id = ?")
            .bind(option_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| option_from_row(&row))
            .ok_or_else(|| DbError::NotFound { resource: "option", id: option_id.to_string() })
    }

    pub async fn update_option_text(&self, option_id: &str, text: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE poll_options SET text = ? WHERE id = ?")
            .bind(text)
            .bind(option_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound { resource: "option", id: option_id.to_string() });
        }
        Ok(())
    }

    /// Delete an option and close the gap it leaves in the positions.
    pub async fn delete_option(&self, option: &PollOption) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM poll_options WHERE id = ?")
            .bind(&option.id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound { resource: "option", id: option.id.clone() });
        }
        sqlx::query("UPDATE poll_options SET position = position - 1 WHERE poll_id = ? AND position > ?")
            .bind(&option.poll_id)
            .bind(option.position)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // Get open polls whose end date has passed
    pub async fn get_expired_polls(&self, now: DateTime<Utc>) -> DbResult<Vec<String>> {
        let ids = sqlx::query(
            r#"
            SELECT id FROM polls
            WHERE end_date IS NOT NULL AND end_date <= ? AND status = 'open'
            "#,
        )
        .bind(fmt_ts(now))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("id"))
        .collect();
        Ok(ids)
    }

    /// Close a poll if it is still open. Returns whether anything changed.
    pub async fn close_poll(&self, poll_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query("UPDATE polls SET status = 'closed', updated_at = ? WHERE id = ? AND status = 'open'")
            .bind(fmt_ts(now))
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Public open poll with the most ballots cast since `since`; ties go
    /// to the newest poll.
    pub async fn most_voted_open_poll(&self, since: DateTime<Utc>) -> DbResult<Option<(String, i64)>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, COUNT(v.id) AS recent_votes
            FROM polls p
            LEFT JOIN votes v ON v.poll_id = p.id AND v.created_at >= ?
            WHERE p.is_public = TRUE AND p.status = 'open'
            GROUP BY p.id, p.created_at
            ORDER BY recent_votes DESC, p.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(fmt_ts(since))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (r.get("id"), r.get("recent_votes"))))
    }

    /// Make `poll_id` the only featured poll.
    pub async fn set_featured(&self, poll_id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE polls SET is_featured = FALSE WHERE is_featured = TRUE AND id <> ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("UPDATE polls SET is_featured = TRUE WHERE id = ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound { resource: "poll", id: poll_id.to_string() });
        }
        tx.commit().await?;
        Ok(())
    }
}
