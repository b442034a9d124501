//! Append-only audit event table

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::entities::{AuditQuery, AuditRecord, AuditStatistics};
use crate::error::StorageResult;

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, record: &AuditRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO audit_events (event_id, ts, kind, severity, user_id, user_email, ip, \
             resource_type, resource_id, action, details, success) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&record.event_id)
        .bind(record.ts)
        .bind(&record.kind)
        .bind(&record.severity)
        .bind(&record.user_id)
        .bind(&record.user_email)
        .bind(&record.ip)
        .bind(&record.resource_type)
        .bind(&record.resource_id)
        .bind(&record.action)
        .bind(serde_json::to_string(&record.details)?)
        .bind(record.success)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Query events newest-first with conjunctive filters
    pub async fn query(&self, filter: &AuditQuery) -> StorageResult<Vec<AuditRecord>> {
        let mut sql = String::from("SELECT * FROM audit_events WHERE 1=1");
        if filter.since.is_some() {
            sql.push_str(" AND ts >= ?");
        }
        if filter.until.is_some() {
            sql.push_str(" AND ts <= ?");
        }
        if filter.kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        if filter.severity.is_some() {
            sql.push_str(" AND severity = ?");
        }
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if filter.user_email.is_some() {
            sql.push_str(" AND user_email = ?");
        }
        sql.push_str(" ORDER BY ts DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(since) = filter.since {
            query = query.bind(since);
        }
        if let Some(until) = filter.until {
            query = query.bind(until);
        }
        if let Some(ref kind) = filter.kind {
            query = query.bind(kind);
        }
        if let Some(ref severity) = filter.severity {
            query = query.bind(severity);
        }
        if let Some(ref user_id) = filter.user_id {
            query = query.bind(user_id);
        }
        if let Some(ref user_email) = filter.user_email {
            query = query.bind(user_email);
        }
        let limit = if filter.limit > 0 { filter.limit } else { 100 };
        query = query.bind(limit).bind(filter.offset.max(0));

        let rows = query.fetch_all(self.pool).await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    /// Delete events older than the cutoff; returns the number removed
    pub async fn cleanup(&self, older_than: DateTime<Utc>) -> StorageResult<u64> {
        let affected = sqlx::query("DELETE FROM audit_events WHERE ts < ?1")
            .bind(older_than)
            .execute(self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    pub async fn statistics(&self) -> StorageResult<AuditStatistics> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, MIN(ts) AS oldest, MAX(ts) AS newest FROM audit_events",
        )
        .fetch_one(self.pool)
        .await?;

        let by_kind = sqlx::query(
            "SELECT kind, COUNT(*) AS n FROM audit_events GROUP BY kind ORDER BY n DESC",
        )
        .fetch_all(self.pool)
        .await?;

        let by_severity = sqlx::query(
            "SELECT severity, COUNT(*) AS n FROM audit_events GROUP BY severity ORDER BY n DESC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(AuditStatistics {
            total: totals.get("total"),
            by_kind: by_kind
                .into_iter()
                .map(|row| (row.get("kind"), row.get("n")))
                .collect(),
            by_severity: by_severity
                .into_iter()
                .map(|row| (row.get("severity"), row.get("n")))
                .collect(),
            oldest: totals.get::<Option<DateTime<Utc>>, _>("oldest"),
            newest: totals.get::<Option<DateTime<Utc>>, _>("newest"),
        })
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> StorageResult<AuditRecord> {
        let details: String = row.get("details");
        Ok(AuditRecord {
            event_id: row.get("event_id"),
            ts: row.get::<DateTime<Utc>, _>("ts"),
            kind: row.get("kind"),
            severity: row.get("severity"),
            user_id: row.get("user_id"),
            user_email: row.get("user_email"),
            ip: row.get("ip"),
            resource_type: row.get("resource_type"),
            resource_id: row.get("resource_id"),
            action: row.get("action"),
            details: serde_json::from_str(&details)?,
            success: row.get("success"),
        })
    }
}
