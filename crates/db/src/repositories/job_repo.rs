//! Repository for the `jobs` table.
//!
//! Status changes are conditional: every write carries the set of statuses
//! it may move from, so a late writer loses to whichever terminal write
//! landed first.

use bigshot_core::job_status::{JobStatus, ACTIVE_STATUSES};
use bigshot_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job, JobChanges, JobListQuery, JobPage, JobStats};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, target, status, progress, result, error_message, \
    created_at, updated_at";

/// The stored result if it is a JSON object, otherwise an empty object.
const RESULT_BASE: &str =
    "CASE WHEN jsonb_typeof(result) = 'object' THEN result ELSE '{}'::jsonb END";

fn status_names(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Provides CRUD operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job with zero progress.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_type, target, status, progress) \
             VALUES ($1, $2, $3, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.job_type.as_str())
            .bind(&input.target)
            .bind(JobStatus::Pending.as_str())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Apply a partial, optionally status-guarded update in one statement.
    ///
    /// Result-envelope fields are merged with `jsonb_set`; a notification is
    /// appended to `result.notifications`. Returns `None` when the row does
    /// not exist or the guard did not match.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        changes: &JobChanges,
    ) -> Result<Option<Job>, sqlx::Error> {
        let mut sets: Vec<String> = vec!["updated_at = NOW()".to_string()];
        let mut bind_idx: u32 = 2;

        if changes.status.is_some() {
            sets.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
        }
        if changes.progress.is_some() {
            sets.push(format!("progress = ${bind_idx}"));
            bind_idx += 1;
        }
        if changes.error_message.is_some() {
            sets.push(format!("error_message = ${bind_idx}"));
            bind_idx += 1;
        }

        let mut result_expr = RESULT_BASE.to_string();
        let mut touches_result = false;
        if changes.task_id.is_some() {
            result_expr =
                format!("jsonb_set({result_expr}, '{{task_id}}', to_jsonb(${bind_idx}::text))");
            bind_idx += 1;
            touches_result = true;
        }
        if changes.outcome.is_some() {
            result_expr = format!("jsonb_set({result_expr}, '{{outcome}}', ${bind_idx}::jsonb)");
            bind_idx += 1;
            touches_result = true;
        }
        if changes.notification.is_some() {
            let base = result_expr;
            result_expr = format!(
                "jsonb_set({base}, '{{notifications}}', \
                 (CASE WHEN jsonb_typeof(({base})->'notifications') = 'array' \
                       THEN ({base})->'notifications' ELSE '[]'::jsonb END) \
                 || jsonb_build_array(${bind_idx}::jsonb))"
            );
            bind_idx += 1;
            touches_result = true;
        }
        if touches_result {
            sets.push(format!("result = {result_expr}"));
        }

        let guard = if changes.expected.is_empty() {
            String::new()
        } else {
            format!(" AND status = ANY(${bind_idx})")
        };

        let query = format!(
            "UPDATE jobs SET {} WHERE id = $1{guard} RETURNING {COLUMNS}",
            sets.join(", ")
        );

        let mut q = sqlx::query_as::<_, Job>(&query).bind(id);
        if let Some(status) = changes.status {
            q = q.bind(status.as_str());
        }
        if let Some(progress) = changes.progress {
            q = q.bind(progress);
        }
        if let Some(message) = &changes.error_message {
            q = q.bind(message);
        }
        if let Some(task_id) = &changes.task_id {
            q = q.bind(task_id);
        }
        if let Some(outcome) = &changes.outcome {
            q = q.bind(Json(outcome));
        }
        if let Some(entry) = &changes.notification {
            q = q.bind(Json(entry));
        }
        if !changes.expected.is_empty() {
            q = q.bind(status_names(&changes.expected));
        }

        q.fetch_optional(pool).await
    }

    /// List jobs with optional filters, newest first.
    pub async fn list(pool: &PgPool, params: &JobListQuery) -> Result<JobPage, sqlx::Error> {
        let (page, per_page) = params.paging();
        let offset = (page - 1) * per_page;

        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.job_type.is_some() {
            conditions.push(format!("job_type = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.target.is_some() {
            conditions.push(format!("target ILIKE '%' || ${bind_idx} || '%'"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM jobs {where_clause}");
        let page_query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        let mut rows = sqlx::query_as::<_, Job>(&page_query);
        if let Some(status) = params.status {
            count = count.bind(status.as_str());
            rows = rows.bind(status.as_str());
        }
        if let Some(job_type) = params.job_type {
            count = count.bind(job_type.as_str());
            rows = rows.bind(job_type.as_str());
        }
        if let Some(target) = &params.target {
            count = count.bind(target);
            rows = rows.bind(target);
        }

        let total = count.fetch_one(pool).await?;
        let items = rows.bind(per_page).bind(offset).fetch_all(pool).await?;
        Ok(JobPage::new(items, total, page, per_page))
    }

    /// Jobs that are still pending or running, newest first.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status = ANY($1) \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(status_names(&ACTIVE_STATUSES))
            .fetch_all(pool)
            .await
    }

    /// Aggregate counts by status and type plus completion timing.
    pub async fn stats(pool: &PgPool) -> Result<JobStats, sqlx::Error> {
        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(pool)
                .await?;
        let by_type: Vec<(String, i64)> =
            sqlx::query_as("SELECT job_type, COUNT(*) FROM jobs GROUP BY job_type")
                .fetch_all(pool)
                .await?;
        let avg_completion_secs: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(EXTRACT(EPOCH FROM updated_at - created_at))::FLOAT8 \
             FROM jobs WHERE status = $1",
        )
        .bind(JobStatus::Completed.as_str())
        .fetch_one(pool)
        .await?;
        let recent_jobs: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE created_at > NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(pool)
        .await?;

        Ok(JobStats {
            total_jobs: by_status.iter().map(|(_, n)| n).sum(),
            by_status: by_status.into_iter().collect(),
            by_type: by_type.into_iter().collect(),
            avg_completion_secs,
            recent_jobs,
        })
    }

    /// Remove ledger entries older than `cutoff` from jobs created before
    /// `created_before`, preserving the order of what remains.
    pub async fn prune_notifications(
        pool: &PgPool,
        created_before: Timestamp,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET result = jsonb_set(result, '{notifications}', COALESCE( \
                 (SELECT jsonb_agg(e.entry ORDER BY e.ord) \
                  FROM jsonb_array_elements(result->'notifications') WITH ORDINALITY AS e(entry, ord) \
                  WHERE (e.entry->>'timestamp')::timestamptz >= $2), \
                 '[]'::jsonb)) \
             WHERE created_at < $1 \
               AND jsonb_typeof(result) = 'object' \
               AND jsonb_typeof(result->'notifications') = 'array' \
               AND EXISTS ( \
                 SELECT 1 FROM jsonb_array_elements(result->'notifications') AS n(entry) \
                 WHERE (n.entry->>'timestamp')::timestamptz < $2)",
        )
        .bind(created_before)
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
