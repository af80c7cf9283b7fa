//! Crash groups and reports.
//!
//! The ingest upsert is linearizable per fingerprint: a transaction guarded
//! by the UNIQUE constraint on `crash_groups.fingerprint`, retried once when
//! a racing insert wins. SQLite's single writer serialises the rest.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{is_unique_violation, ApiError};
use crate::ids::{new_id, now_ms};

pub const GROUP_STATUS_NEW: &str = "new";
pub const GROUP_STATUS_INVESTIGATING: &str = "investigating";
pub const GROUP_STATUS_RESOLVED: &str = "resolved";
pub const GROUP_STATUS_IGNORED: &str = "ignored";

pub const GROUP_STATUSES: [&str; 4] = [
    GROUP_STATUS_NEW,
    GROUP_STATUS_INVESTIGATING,
    GROUP_STATUS_RESOLVED,
    GROUP_STATUS_IGNORED,
];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrashGroupRow {
    pub id: String,
    pub app_id: String,
    /// 32-hex-char truncated SHA-256 of the normalised stack signature.
    pub fingerprint: String,
    pub error_type: String,
    /// Message from the first occurrence; never updated afterwards.
    pub error_message: String,
    pub occurrence_count: i64,
    pub affected_users_count: i64,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
    /// JSON array of distinct app versions seen in this group.
    pub affected_versions: String,
    /// JSON array of distinct platforms seen in this group.
    pub affected_platforms: String,
    pub status: String,
    pub assignee: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrashReportRow {
    pub id: String,
    pub app_id: String,
    pub crash_group_id: String,
    pub public_key_id: String,
    pub error_type: String,
    pub error_message: String,
    pub stack_trace: String,
    pub app_version: String,
    pub platform: String,
    pub os_version: Option<String>,
    pub device_info: Option<String>,
    pub app_state: Option<String>,
    pub breadcrumbs: String,
    pub fingerprint: String,
    pub severity: String,
    pub user_id: Option<String>,
    pub created_at: i64,
}

/// A validated event ready for persistence; JSON context fields are already
/// serialised.
#[derive(Debug, Clone)]
pub struct NewCrashReport {
    pub app_id: String,
    pub public_key_id: String,
    pub error_type: String,
    pub error_message: String,
    pub stack_trace_json: String,
    pub app_version: String,
    pub platform: String,
    pub os_version: Option<String>,
    pub device_info_json: Option<String>,
    pub app_state_json: Option<String>,
    pub breadcrumbs_json: String,
    pub fingerprint: String,
    pub severity: String,
    pub user_id: Option<String>,
}

/// Rolling-window aggregates for the statistics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CrashStats {
    pub total_reports: i64,
    pub total_groups: i64,
    pub affected_users: i64,
    pub by_day: Vec<BucketCount>,
    pub by_version: Vec<BucketCount>,
    pub by_platform: Vec<BucketCount>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BucketCount {
    pub bucket: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct CrashStore {
    pool: SqlitePool,
    /// Serialises upserts. SQLite allows one writer anyway; taking the lock
    /// up front avoids busy-loop churn when a deferred transaction tries to
    /// upgrade to a write lock mid-upsert.
    upsert_lock: std::sync::Arc<tokio::sync::Mutex<()>>,
}

impl CrashStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            upsert_lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Upsert the group and insert the report, atomically and linearizably
    /// per fingerprint.
    ///
    /// Returns the group (post-update) and the new report id.
    pub async fn ingest(
        &self,
        event: &NewCrashReport,
    ) -> Result<(CrashGroupRow, String), ApiError> {
        let _guard = self.upsert_lock.lock().await;
        // Retries cover two races: an ingest from another process creating
        // the group between our lookup and insert (unique violation), and a
        // concurrent writer (e.g. a last_used_at touch) staling our read
        // snapshot before the write half of the transaction.
        const ATTEMPTS: u32 = 3;
        for attempt in 1..=ATTEMPTS {
            match self.try_ingest(event).await {
                Ok(out) => return Ok(out),
                Err(IngestRace::Retry) if attempt < ATTEMPTS => {
                    debug!(
                        fingerprint = %event.fingerprint,
                        attempt,
                        "crash upsert raced a concurrent writer, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(20 * attempt as u64))
                        .await;
                }
                Err(IngestRace::Retry) => {
                    return Err(ApiError::Internal(anyhow::anyhow!(
                        "crash group upsert kept losing to concurrent writers"
                    )))
                }
                Err(IngestRace::Other(e)) => return Err(e),
            }
        }
        unreachable!("ingest loop always returns")
    }

    async fn try_ingest(
        &self,
        event: &NewCrashReport,
    ) -> Result<(CrashGroupRow, String), IngestRace> {
        let now = now_ms();
        let mut tx = self.pool.begin().await.map_err(to_race)?;

        let existing = sqlx::query_as::<_, CrashGroupRow>(
            "SELECT * FROM crash_groups WHERE fingerprint = ?",
        )
        .bind(&event.fingerprint)
        .fetch_optional(&mut *tx)
        .await
        .map_err(to_race)?;

        let group_id = match existing {
            None => {
                let id = new_id();
                let versions = serde_json::to_string(&[&event.app_version]).unwrap_or_default();
                let platforms = serde_json::to_string(&[&event.platform]).unwrap_or_default();
                let res = sqlx::query(
                    "INSERT INTO crash_groups
                       (id, app_id, fingerprint, error_type, error_message,
                        occurrence_count, affected_users_count, first_seen_at, last_seen_at,
                        affected_versions, affected_platforms, status, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, 'new', ?, ?)",
                )
                .bind(&id)
                .bind(&event.app_id)
                .bind(&event.fingerprint)
                .bind(&event.error_type)
                .bind(&event.error_message)
                .bind(i64::from(event.user_id.is_some()))
                .bind(now)
                .bind(now)
                .bind(&versions)
                .bind(&platforms)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await;

                match res {
                    Ok(_) => id,
                    Err(e) if is_unique_violation(&e) => return Err(IngestRace::Retry),
                    Err(e) => return Err(to_race(e)),
                }
            }
            Some(group) => {
                // Dedup affected users with an O(1) indexed probe.
                let user_is_new = match &event.user_id {
                    None => false,
                    Some(user_id) => {
                        let seen: i64 = sqlx::query_scalar(
                            "SELECT EXISTS(SELECT 1 FROM crash_reports
                             WHERE crash_group_id = ? AND user_id = ?)",
                        )
                        .bind(&group.id)
                        .bind(user_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(to_race)?;
                        seen == 0
                    }
                };

                let versions = add_to_set(&group.affected_versions, &event.app_version);
                let platforms = add_to_set(&group.affected_platforms, &event.platform);

                // A crash against a resolved group re-opens it.
                let reopen = group.status == GROUP_STATUS_RESOLVED;
                let status = if reopen { GROUP_STATUS_NEW } else { group.status.as_str() };
                let resolved_at = if reopen { None } else { group.resolved_at };

                sqlx::query(
                    "UPDATE crash_groups
                     SET occurrence_count = occurrence_count + 1,
                         affected_users_count = affected_users_count + ?,
                         affected_versions = ?, affected_platforms = ?,
                         last_seen_at = ?, status = ?, resolved_at = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(i64::from(user_is_new))
                .bind(&versions)
                .bind(&platforms)
                .bind(now)
                .bind(status)
                .bind(resolved_at)
                .bind(now)
                .bind(&group.id)
                .execute(&mut *tx)
                .await
                .map_err(to_race)?;

                group.id
            }
        };

        let report_id = new_id();
        sqlx::query(
            "INSERT INTO crash_reports
               (id, app_id, crash_group_id, public_key_id, error_type, error_message,
                stack_trace, app_version, platform, os_version, device_info, app_state,
                breadcrumbs, fingerprint, severity, user_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report_id)
        .bind(&event.app_id)
        .bind(&group_id)
        .bind(&event.public_key_id)
        .bind(&event.error_type)
        .bind(&event.error_message)
        .bind(&event.stack_trace_json)
        .bind(&event.app_version)
        .bind(&event.platform)
        .bind(&event.os_version)
        .bind(&event.device_info_json)
        .bind(&event.app_state_json)
        .bind(&event.breadcrumbs_json)
        .bind(&event.fingerprint)
        .bind(&event.severity)
        .bind(&event.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(to_race)?;

        tx.commit().await.map_err(to_race)?;

        let group = sqlx::query_as::<_, CrashGroupRow>("SELECT * FROM crash_groups WHERE id = ?")
            .bind(&group_id)
            .fetch_one(&self.pool)
            .await
            .map_err(to_race)?;
        Ok((group, report_id))
    }

    // ─── Group queries ───────────────────────────────────────────────────────

    pub async fn list_groups(
        &self,
        app_id: &str,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CrashGroupRow>, i64), ApiError> {
        let (total, rows) = match status {
            Some(status) => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM crash_groups WHERE app_id = ? AND status = ?",
                )
                .bind(app_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
                let rows = sqlx::query_as::<_, CrashGroupRow>(
                    "SELECT * FROM crash_groups WHERE app_id = ? AND status = ?
                     ORDER BY last_seen_at DESC LIMIT ? OFFSET ?",
                )
                .bind(app_id)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
            None => {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM crash_groups WHERE app_id = ?")
                        .bind(app_id)
                        .fetch_one(&self.pool)
                        .await?;
                let rows = sqlx::query_as::<_, CrashGroupRow>(
                    "SELECT * FROM crash_groups WHERE app_id = ?
                     ORDER BY last_seen_at DESC LIMIT ? OFFSET ?",
                )
                .bind(app_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
        };
        Ok((rows, total))
    }

    pub async fn require_group(&self, app_id: &str, id: &str) -> Result<CrashGroupRow, ApiError> {
        let row = sqlx::query_as::<_, CrashGroupRow>("SELECT * FROM crash_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("crash group '{id}'")))?;
        if row.app_id != app_id {
            return Err(ApiError::not_found(format!("crash group '{id}'")));
        }
        Ok(row)
    }

    /// Triage updates. Enforces `status = resolved ⇔ resolved_at ≠ null`.
    pub async fn update_group(
        &self,
        app_id: &str,
        id: &str,
        status: Option<&str>,
        assignee: Option<&str>,
        resolution_notes: Option<&str>,
    ) -> Result<CrashGroupRow, ApiError> {
        let group = self.require_group(app_id, id).await?;

        let status = match status {
            Some(s) if GROUP_STATUSES.contains(&s) => s.to_string(),
            Some(s) => {
                return Err(ApiError::validation(format!("unknown crash status '{s}'")))
            }
            None => group.status.clone(),
        };
        let resolved_at = if status == GROUP_STATUS_RESOLVED {
            group.resolved_at.or(Some(now_ms()))
        } else {
            None
        };

        sqlx::query(
            "UPDATE crash_groups
             SET status = ?, resolved_at = ?,
                 assignee = COALESCE(?, assignee),
                 resolution_notes = COALESCE(?, resolution_notes),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&status)
        .bind(resolved_at)
        .bind(assignee)
        .bind(resolution_notes)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.require_group(app_id, id).await
    }

    pub async fn list_reports(
        &self,
        group_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CrashReportRow>, i64), ApiError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM crash_reports WHERE crash_group_id = ?")
                .bind(group_id)
                .fetch_one(&self.pool)
                .await?;
        let rows = sqlx::query_as::<_, CrashReportRow>(
            "SELECT * FROM crash_reports WHERE crash_group_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(group_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok((rows, total))
    }

    // ─── Statistics (read-only) ──────────────────────────────────────────────

    pub async fn stats(&self, app_id: &str, since_ms: i64) -> Result<CrashStats, ApiError> {
        let total_reports: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crash_reports WHERE app_id = ? AND created_at >= ?",
        )
        .bind(app_id)
        .bind(since_ms)
        .fetch_one(&self.pool)
        .await?;

        let total_groups: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT crash_group_id) FROM crash_reports
             WHERE app_id = ? AND created_at >= ?",
        )
        .bind(app_id)
        .bind(since_ms)
        .fetch_one(&self.pool)
        .await?;

        let affected_users: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT user_id) FROM crash_reports
             WHERE app_id = ? AND created_at >= ? AND user_id IS NOT NULL",
        )
        .bind(app_id)
        .bind(since_ms)
        .fetch_one(&self.pool)
        .await?;

        let by_day = sqlx::query_as::<_, BucketCount>(
            "SELECT date(created_at / 1000, 'unixepoch') AS bucket, COUNT(*) AS count
             FROM crash_reports WHERE app_id = ? AND created_at >= ?
             GROUP BY bucket ORDER BY bucket",
        )
        .bind(app_id)
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await?;

        let by_version = sqlx::query_as::<_, BucketCount>(
            "SELECT app_version AS bucket, COUNT(*) AS count
             FROM crash_reports WHERE app_id = ? AND created_at >= ?
             GROUP BY bucket ORDER BY count DESC",
        )
        .bind(app_id)
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await?;

        let by_platform = sqlx::query_as::<_, BucketCount>(
            "SELECT platform AS bucket, COUNT(*) AS count
             FROM crash_reports WHERE app_id = ? AND created_at >= ?
             GROUP BY bucket ORDER BY count DESC",
        )
        .bind(app_id)
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await?;

        Ok(CrashStats {
            total_reports,
            total_groups,
            affected_users,
            by_day,
            by_version,
            by_platform,
        })
    }

    /// Groups seen within the window, heaviest first.
    pub async fn top_groups(
        &self,
        app_id: &str,
        since_ms: i64,
        limit: i64,
    ) -> Result<Vec<CrashGroupRow>, ApiError> {
        let rows = sqlx::query_as::<_, CrashGroupRow>(
            "SELECT * FROM crash_groups WHERE app_id = ? AND last_seen_at >= ?
             ORDER BY occurrence_count DESC LIMIT ?",
        )
        .bind(app_id)
        .bind(since_ms)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

enum IngestRace {
    /// Lost a race a fresh attempt can win: a concurrent ingest inserted
    /// the group first, or a concurrent writer staled our snapshot.
    Retry,
    Other(ApiError),
}

fn to_race(e: sqlx::Error) -> IngestRace {
    if is_busy(&e) {
        return IngestRace::Retry;
    }
    IngestRace::Other(e.into())
}

/// SQLITE_BUSY / SQLITE_LOCKED family, including the snapshot-staleness
/// variants a deferred transaction hits when upgrading to a write lock.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("5") | Some("6") | Some("261") | Some("262") | Some("517")
        ),
        _ => false,
    }
}

/// Insert into a JSON-encoded string set, preserving first-seen order.
fn add_to_set(json_set: &str, value: &str) -> String {
    let mut set: Vec<String> = serde_json::from_str(json_set).unwrap_or_default();
    if !set.iter().any(|v| v == value) {
        set.push(value.to_string());
    }
    serde_json::to_string(&set).unwrap_or_else(|_| "[]".to_string())
}
