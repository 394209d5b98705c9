// src/access/join_records.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Where a member stands with the paid chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    Pending,
    PreApproved,
    Approved,
    Declined,
}

impl JoinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStatus::Pending => "pending",
            JoinStatus::PreApproved => "pre_approved",
            JoinStatus::Approved => "approved",
            JoinStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(JoinStatus::Pending),
            "pre_approved" => Ok(JoinStatus::PreApproved),
            "approved" => Ok(JoinStatus::Approved),
            "declined" => Ok(JoinStatus::Declined),
            other => Err(format!("unknown join status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct JoinRecordRow {
    member_id: String,
    status: String,
    decided_by: Option<String>,
    decided_at: Option<i64>,
    updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinRecord {
    pub member_id: String,
    pub status: JoinStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<i64>,
    pub updated_at: i64,
}

impl TryFrom<JoinRecordRow> for JoinRecord {
    type Error = sqlx::Error;

    fn try_from(row: JoinRecordRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JoinStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Self {
            member_id: row.member_id,
            status,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct JoinStats {
    pub pending: i64,
    pub pre_approved: i64,
    pub approved: i64,
    pub declined: i64,
}

/// Upsert-only side table mirroring join decisions made on the chat platform.
#[derive(Debug, Clone)]
pub struct JoinRecordStore {
    db: SqlitePool,
}

impl JoinRecordStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Inserts or overwrites the member's record. `decided_by`/`decided_at`
    /// are cleared for `pending`.
    pub async fn upsert(
        &self,
        member_id: &str,
        status: JoinStatus,
        decided_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<JoinRecord, sqlx::Error> {
        let decided_at = (status != JoinStatus::Pending).then(|| now.timestamp());
        let decided_by = decided_by.filter(|_| status != JoinStatus::Pending);

        let row = sqlx::query_as::<_, JoinRecordRow>(
            r#"
            INSERT INTO join_records (member_id, status, decided_by, decided_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(member_id) DO UPDATE SET
                status = excluded.status,
                decided_by = excluded.decided_by,
                decided_at = excluded.decided_at,
                updated_at = excluded.updated_at
            RETURNING member_id, status, decided_by, decided_at, updated_at
            "#,
        )
        .bind(member_id)
        .bind(status.as_str())
        .bind(decided_by)
        .bind(decided_at)
        .bind(now.timestamp())
        .fetch_one(&self.db)
        .await?;

        debug!(member_id = %member_id, status = %status, "Join record upserted");
        row.try_into()
    }

    pub async fn get(&self, member_id: &str) -> Result<Option<JoinRecord>, sqlx::Error> {
        sqlx::query_as::<_, JoinRecordRow>(
            "SELECT member_id, status, decided_by, decided_at, updated_at FROM join_records WHERE member_id = ?",
        )
        .bind(member_id)
        .fetch_optional(&self.db)
        .await?
        .map(JoinRecord::try_from)
        .transpose()
    }

    /// Most recently updated first
    pub async fn list(
        &self,
        status: Option<JoinStatus>,
        limit: i64,
    ) -> Result<Vec<JoinRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, JoinRecordRow>(
            r#"
            SELECT member_id, status, decided_by, decided_at, updated_at
            FROM join_records
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY updated_at DESC, member_id
            LIMIT ?2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(JoinRecord::try_from).collect()
    }

    pub async fn stats(&self) -> Result<JoinStats, sqlx::Error> {
        sqlx::query_as::<_, JoinStats>(
            r#"
            SELECT
                COALESCE(SUM(status = 'pending'), 0) AS pending,
                COALESCE(SUM(status = 'pre_approved'), 0) AS pre_approved,
                COALESCE(SUM(status = 'approved'), 0) AS approved,
                COALESCE(SUM(status = 'declined'), 0) AS declined
            FROM join_records
            "#,
        )
        .fetch_one(&self.db)
        .await
    }
}
