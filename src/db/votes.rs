use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::{fmt_ts, parse_ts, Database, DbError, DbResult};
use crate::models::{Attribute, Poll, ValidBallot, VoteRecord};

/// One option picked on a single or multiple-choice ballot.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub vote_id: String,
    pub option_id: String,
}

/// One ranked entry of a ranking ballot, from either storage table.
#[derive(Debug, Clone, PartialEq)]
pub struct RankRow {
    pub vote_id: String,
    pub option_id: String,
    pub rank: i64,
}

/// Everything needed to tally a poll.
#[derive(Debug, Clone, Default)]
pub struct VoteData {
    pub total_voters: i64,
    pub selections: Vec<Selection>,
    /// Rows from `vote_rankings`.
    pub rankings: Vec<RankRow>,
    /// Ranked rows from `vote_options`, written by older clients.
    pub legacy_rankings: Vec<RankRow>,
}

impl Database {
    /// Store a ballot. The voter's existing ballots are counted inside the
    /// same transaction that inserts the new one, which takes the write lock
    /// up front so concurrent ballots queue behind it.
    pub async fn insert_vote(
        &self,
        poll: &Poll,
        user_id: &str,
        ballot: &ValidBallot,
        now: DateTime<Utc>,
    ) -> DbResult<VoteRecord> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let existing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM votes WHERE poll_id = ? AND user_id = ?")
            .bind(&poll.id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .get("n");
        if existing >= poll.max_votes_per_user as i64 {
            return Err(DbError::VoteLimitReached { limit: poll.max_votes_per_user });
        }

        let vote_id = Uuid::new_v4().to_string();
        let single_option = match ballot {
            ValidBallot::Single(option_id) => Some(option_id.as_str()),
            _ => None,
        };
        sqlx::query("INSERT INTO votes (id, poll_id, user_id, option_id, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&vote_id)
            .bind(&poll.id)
            .bind(user_id)
            .bind(single_option)
            .bind(fmt_ts(now))
            .execute(&mut *tx)
            .await?;

        let option_ids = match ballot {
            ValidBallot::Single(option_id) => vec![option_id.clone()],
            ValidBallot::Multiple(option_ids) => {
                for option_id in option_ids {
                    sqlx::query("INSERT INTO vote_options (vote_id, option_id, rank) VALUES (?, ?, NULL)")
                        .bind(&vote_id)
                        .bind(option_id)
                        .execute(&mut *tx)
                        .await?;
                }
                option_ids.clone()
            }
            ValidBallot::Ranking(ranked) => {
                for (option_id, rank) in ranked {
                    sqlx::query("INSERT INTO vote_rankings (vote_id, option_id, rank) VALUES (?, ?, ?)")
                        .bind(&vote_id)
                        .bind(option_id)
                        .bind(*rank)
                        .execute(&mut *tx)
                        .await?;
                }
                ranked.iter().map(|(id, _)| id.clone()).collect()
            }
        };

        tx.commit().await?;

        Ok(VoteRecord {
            id: vote_id,
            poll_id: poll.id.clone(),
            created_at: now,
            option_ids,
        })
    }

    pub async fn count_user_votes(&self, poll_id: &str, user_id: &str) -> DbResult<i64> {
        let n = sqlx::query("SELECT COUNT(*) AS n FROM votes WHERE poll_id = ? AND user_id = ?")
            .bind(poll_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(n)
    }

    pub async fn count_poll_votes(&self, poll_id: &str) -> DbResult<i64> {
        let n = sqlx::query("SELECT COUNT(*) AS n FROM votes WHERE poll_id = ?")
            .bind(poll_id)
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(n)
    }

    /// A voter's ballots on a poll, oldest first. Ranking ballots list their
    /// options best first, whichever table holds them.
    pub async fn get_user_votes(&self, poll_id: &str, user_id: &str) -> DbResult<Vec<VoteRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.created_at, v.option_id AS option_id, 0 AS rank, 0 AS source
            FROM votes v
            WHERE v.poll_id = ? AND v.user_id = ? AND v.option_id IS NOT NULL
            UNION ALL
            SELECT v.id, v.created_at, vo.option_id, COALESCE(vo.rank, 0), 1
            FROM votes v JOIN vote_options vo ON vo.vote_id = v.id
            WHERE v.poll_id = ? AND v.user_id = ?
            UNION ALL
            SELECT v.id, v.created_at, vr.option_id, vr.rank, 2
            FROM votes v JOIN vote_rankings vr ON vr.vote_id = v.id
            WHERE v.poll_id = ? AND v.user_id = ?
            ORDER BY 2, 1, 5 DESC, 4
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .bind(poll_id)
        .bind(user_id)
        .bind(poll_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records: Vec<VoteRecord> = Vec::new();
        let mut primary_source: Option<i64> = None;
        for row in rows {
            let id: String = row.get("id");
            let source: i64 = row.get("source");
            let option_id: String = row.get("option_id");

            match records.last_mut() {
                Some(last) if last.id == id => {
                    // Rankings outrank legacy rows for the same ballot.
                    if primary_source == Some(source) {
                        last.option_ids.push(option_id);
                    }
                }
                _ => {
                    primary_source = Some(source);
                    records.push(VoteRecord {
                        id,
                        poll_id: poll_id.to_string(),
                        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
                        option_ids: vec![option_id],
                    });
                }
            }
        }
        Ok(records)
    }

    /// Load all ballots of a poll in the shapes the tally needs.
    pub async fn load_vote_data(&self, poll_id: &str) -> DbResult<VoteData> {
        let total_voters: i64 = sqlx::query("SELECT COUNT(DISTINCT user_id) AS n FROM votes WHERE poll_id = ?")
            .bind(poll_id)
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let selections = sqlx::query(
            r#"
            SELECT id AS vote_id, option_id FROM votes
            WHERE poll_id = ? AND option_id IS NOT NULL
            UNION ALL
            SELECT vo.vote_id, vo.option_id
            FROM vote_options vo JOIN votes v ON v.id = vo.vote_id
            WHERE v.poll_id = ? AND vo.rank IS NULL
            "#,
        )
        .bind(poll_id)
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Selection {
            vote_id: row.get("vote_id"),
            option_id: row.get("option_id"),
        })
        .collect();

        let rankings = self
            .rank_rows(
                r#"
                SELECT vr.vote_id, vr.option_id, vr.rank
                FROM vote_rankings vr JOIN votes v ON v.id = vr.vote_id
                WHERE v.poll_id = ?
                ORDER BY vr.vote_id, vr.rank
                "#,
                poll_id,
            )
            .await?;
        let legacy_rankings = self
            .rank_rows(
                r#"
                SELECT vo.vote_id, vo.option_id, vo.rank
                FROM vote_options vo JOIN votes v ON v.id = vo.vote_id
                WHERE v.poll_id = ? AND vo.rank IS NOT NULL
                ORDER BY vo.vote_id, vo.rank
                "#,
                poll_id,
            )
            .await?;

        Ok(VoteData {
            total_voters,
            selections,
            rankings,
            legacy_rankings,
        })
    }

    async fn rank_rows(&self, sql: &str, poll_id: &str) -> DbResult<Vec<RankRow>> {
        let rows = sqlx::query(sql)
            .bind(poll_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| RankRow {
                vote_id: row.get("vote_id"),
                option_id: row.get("option_id"),
                rank: row.get("rank"),
            })
            .collect();
        Ok(rows)
    }

    /// Distinct voters of a poll grouped by one participant attribute.
    /// Voters who never filled the attribute count as `unknown`.
    pub async fn voters_by_attribute(&self, poll_id: &str, attribute: Attribute) -> DbResult<Vec<(String, i64)>> {
        // The column name comes from a closed enum, never from input.
        let sql = format!(
            r#"
            SELECT COALESCE(pa.{column}, 'unknown') AS value, COUNT(DISTINCT v.user_id) AS voters
            FROM votes v
            LEFT JOIN participant_attributes pa ON pa.user_id = v.user_id
            WHERE v.poll_id = ?
            GROUP BY value
            ORDER BY voters DESC, value
            "#,
            column = attribute.as_str()
        );
        let rows = sqlx::query(&sql)
            .bind(poll_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| (row.get("value"), row.get("voters")))
            .collect();
        Ok(rows)
    }

    /// Write a ranking ballot the way older clients did, into `vote_options`
    /// with a rank. Only used to exercise the legacy read path.
    #[cfg(test)]
    pub(crate) async fn insert_legacy_ranking(
        &self,
        poll_id: &str,
        user_id: &str,
        ranked: &[(&str, i64)],
    ) -> DbResult<String> {
        let vote_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO votes (id, poll_id, user_id, option_id, created_at) VALUES (?, ?, ?, NULL, ?)")
            .bind(&vote_id)
            .bind(poll_id)
            .bind(user_id)
            .bind(fmt_ts(Utc::now()))
            .execute(&self.pool)
            .await?;
        for (option_id, rank) in ranked {
            sqlx::query("INSERT INTO vote_options (vote_id, option_id, rank) VALUES (?, ?, ?)")
                .bind(&vote_id)
                .bind(*option_id)
                .bind(*rank)
                .execute(&self.pool)
                .await?;
        }
        Ok(vote_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::sample_poll;
    use crate::models::{AttributesUpdate, VoteType};
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ballots_from_one_voter_hit_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("votes.db").display());
        let db = Arc::new(Database::connect(&url, 8).await.unwrap());
        let poll = Arc::new(sample_poll(VoteType::Single, &["A", "B"]));
        db.create_poll(&poll).await.unwrap();

        for round in 0..5 {
            let user = format!("voter-{}", round);
            let mut handles = Vec::new();
            for _ in 0..8 {
                let (db, poll, user) = (db.clone(), poll.clone(), user.clone());
                handles.push(tokio::spawn(async move {
                    let ballot = ValidBallot::Single(poll.options[0].id.clone());
                    db.insert_vote(&poll, &user, &ballot, Utc::now()).await
                }));
            }

            let mut stored = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => stored += 1,
                    Err(DbError::VoteLimitReached { limit: 1 }) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            assert_eq!(stored, 1);
            assert_eq!(db.count_user_votes(&poll.id, &user).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn single_vote_limit_is_enforced() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(VoteType::Single, &["A", "B"]);
        db.create_poll(&poll).await.unwrap();

        let ballot = ValidBallot::Single(poll.options[0].id.clone());
        db.insert_vote(&poll, "u1", &ballot, Utc::now()).await.unwrap();
        let err = db.insert_vote(&poll, "u1", &ballot, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::VoteLimitReached { limit: 1 }));

        // Another voter is unaffected.
        db.insert_vote(&poll, "u2", &ballot, Utc::now()).await.unwrap();
        assert_eq!(db.count_poll_votes(&poll.id).await.unwrap(), 2);
        assert_eq!(db.count_user_votes(&poll.id, "u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn allow_multiple_permits_up_to_limit() {
        let db = Database::in_memory().await.unwrap();
        let mut poll = sample_poll(VoteType::Single, &["A", "B"]);
        poll.allow_multiple = true;
        poll.max_votes_per_user = 2;
        db.create_poll(&poll).await.unwrap();

        let ballot = ValidBallot::Single(poll.options[1].id.clone());
        db.insert_vote(&poll, "u1", &ballot, Utc::now()).await.unwrap();
        db.insert_vote(&poll, "u1", &ballot, Utc::now()).await.unwrap();
        assert!(db.insert_vote(&poll, "u1", &ballot, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn vote_data_separates_shapes() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(VoteType::Ranking, &["A", "B", "C"]);
        db.create_poll(&poll).await.unwrap();
        let ids: Vec<&str> = poll.options.iter().map(|o| o.id.as_str()).collect();

        let ranked = ValidBallot::Ranking(vec![(ids[2].to_string(), 1), (ids[0].to_string(), 2)]);
        db.insert_vote(&poll, "u1", &ranked, Utc::now()).await.unwrap();
        db.insert_legacy_ranking(&poll.id, "u2", &[(ids[1], 1)]).await.unwrap();

        let data = db.load_vote_data(&poll.id).await.unwrap();
        assert_eq!(data.total_voters, 2);
        assert!(data.selections.is_empty());
        assert_eq!(data.rankings.len(), 2);
        assert_eq!(data.rankings[0].option_id, ids[2]);
        assert_eq!(data.legacy_rankings.len(), 1);
        assert_eq!(data.legacy_rankings[0].rank, 1);
    }

    #[tokio::test]
    async fn user_votes_come_back_in_rank_order() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(VoteType::Ranking, &["A", "B", "C"]);
        db.create_poll(&poll).await.unwrap();
        let ids: Vec<String> = poll.options.iter().map(|o| o.id.clone()).collect();

        let ranked = ValidBallot::Ranking(vec![
            (ids[1].clone(), 1),
            (ids[2].clone(), 2),
            (ids[0].clone(), 3),
        ]);
        let stored = db.insert_vote(&poll, "u1", &ranked, Utc::now()).await.unwrap();

        let records = db.get_user_votes(&poll.id, "u1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, stored.id);
        assert_eq!(records[0].option_ids, vec![ids[1].clone(), ids[2].clone(), ids[0].clone()]);
        assert!(db.get_user_votes(&poll.id, "someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn multiple_choice_selections_are_loaded() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(VoteType::Multiple, &["A", "B", "C"]);
        db.create_poll(&poll).await.unwrap();

        let ballot = ValidBallot::Multiple(vec![poll.options[0].id.clone(), poll.options[2].id.clone()]);
        db.insert_vote(&poll, "u1", &ballot, Utc::now()).await.unwrap();

        let data = db.load_vote_data(&poll.id).await.unwrap();
        assert_eq!(data.selections.len(), 2);
        assert!(data.rankings.is_empty());
        assert!(data.legacy_rankings.is_empty());
    }

    #[tokio::test]
    async fn demographics_group_unknown_voters() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(VoteType::Single, &["A", "B"]);
        db.create_poll(&poll).await.unwrap();
        let attrs = AttributesUpdate {
            region: Some("Norte".to_string()),
            ..Default::default()
        }
        .into_attributes("u1", Utc::now())
        .unwrap();
        db.upsert_attributes(&attrs).await.unwrap();

        let ballot = ValidBallot::Single(poll.options[0].id.clone());
        for user in ["u1", "u2", "u3"] {
            db.insert_vote(&poll, user, &ballot, Utc::now()).await.unwrap();
        }

        let groups = db.voters_by_attribute(&poll.id, Attribute::Region).await.unwrap();
        assert_eq!(groups, vec![("unknown".to_string(), 2), ("Norte".to_string(), 1)]);
    }
}
