//! In-process stores with the same semantics as the Postgres ones.
//!
//! Used by tests and by single-node deployments without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bigshot_core::job_status::JobStatus;
use bigshot_core::types::{DbId, Timestamp};
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::models::domain::Domain;
use crate::models::job::{CreateJob, Job, JobChanges, JobListQuery, JobPage, JobStats};
use crate::store::{DomainStore, JobStore};

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Default)]
struct JobTable {
    next_id: DbId,
    rows: BTreeMap<DbId, Job>,
}

/// Jobs held in a map guarded by a single lock, so each update is atomic.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<JobTable>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a row wholesale. Test helper for seeding timestamps and
    /// corrupt payloads.
    pub async fn put(&self, job: Job) {
        let mut table = self.inner.write().await;
        table.next_id = table.next_id.max(job.id);
        table.rows.insert(job.id, job);
    }
}

fn newest_first(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let mut table = self.inner.write().await;
        table.next_id += 1;
        let now = Utc::now();
        let job = Job {
            id: table.next_id,
            job_type: input.job_type,
            target: input.target.clone(),
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn update(&self, id: DbId, changes: &JobChanges) -> Result<Option<Job>, sqlx::Error> {
        let mut table = self.inner.write().await;
        let Some(job) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if changes.apply_to(job, Utc::now()) {
            Ok(Some(job.clone()))
        } else {
            Ok(None)
        }
    }

    async fn list(&self, params: &JobListQuery) -> Result<JobPage, sqlx::Error> {
        let (page, per_page) = params.paging();
        let table = self.inner.read().await;

        let mut matching: Vec<&Job> = table.rows.values().filter(|j| params.matches(j)).collect();
        matching.sort_by(|a, b| newest_first(a, b));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .cloned()
            .collect();
        Ok(JobPage::new(items, total, page, per_page))
    }

    async fn list_active(&self) -> Result<Vec<Job>, sqlx::Error> {
        let table = self.inner.read().await;
        let mut active: Vec<Job> = table
            .rows
            .values()
            .filter(|j| j.status.is_active())
            .cloned()
            .collect();
        active.sort_by(newest_first);
        Ok(active)
    }

    async fn stats(&self) -> Result<JobStats, sqlx::Error> {
        let table = self.inner.read().await;
        let recent_cutoff = Utc::now() - Duration::hours(24);
        let mut stats = JobStats::default();
        let mut completed_secs = Vec::new();

        for job in table.rows.values() {
            stats.total_jobs += 1;
            *stats
                .by_status
                .entry(job.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_type
                .entry(job.job_type.as_str().to_string())
                .or_default() += 1;
            if job.status == JobStatus::Completed {
                let elapsed = job.updated_at - job.created_at;
                completed_secs.push(elapsed.num_milliseconds() as f64 / 1000.0);
            }
            if job.created_at > recent_cutoff {
                stats.recent_jobs += 1;
            }
        }

        if !completed_secs.is_empty() {
            stats.avg_completion_secs =
                Some(completed_secs.iter().sum::<f64>() / completed_secs.len() as f64);
        }
        Ok(stats)
    }

    async fn prune_notifications(
        &self,
        created_before: Timestamp,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let mut table = self.inner.write().await;
        let mut touched = 0;
        for job in table.rows.values_mut() {
            if job.created_at >= created_before || job.result.is_none() {
                continue;
            }
            let mut envelope = job.result_envelope();
            if envelope.notifications.prune_before(cutoff) > 0 {
                job.result = Some(envelope.to_value());
                touched += 1;
            }
        }
        Ok(touched)
    }
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DomainTable {
    next_id: DbId,
    rows: BTreeMap<DbId, Domain>,
}

#[derive(Default)]
pub struct MemoryDomainStore {
    inner: RwLock<DomainTable>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row with explicit fields. Test helper.
    pub async fn insert(
        &self,
        root_domain: &str,
        subdomain: &str,
        source: &str,
        tags: Option<&str>,
        created_at: Timestamp,
    ) -> DbId {
        let mut table = self.inner.write().await;
        table.next_id += 1;
        let id = table.next_id;
        table.rows.insert(
            id,
            Domain {
                id,
                root_domain: root_domain.to_string(),
                subdomain: subdomain.to_string(),
                source: source.to_string(),
                tags: tags.map(str::to_string),
                fetched_at: created_at,
                created_at,
                updated_at: created_at,
            },
        );
        id
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn upsert(
        &self,
        root_domain: &str,
        subdomain: &str,
        source: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        {
            let mut table = self.inner.write().await;
            if let Some(existing) = table
                .rows
                .values_mut()
                .find(|d| d.subdomain == subdomain && d.source == source)
            {
                existing.fetched_at = now;
                existing.updated_at = now;
                return Ok(false);
            }
        }
        self.insert(root_domain, subdomain, source, None, now).await;
        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<Domain>, sqlx::Error> {
        Ok(self.inner.read().await.rows.values().cloned().collect())
    }

    async fn find(&self, subdomain: &str, source: &str) -> Result<Option<Domain>, sqlx::Error> {
        Ok(self
            .inner
            .read()
            .await
            .rows
            .values()
            .find(|d| d.subdomain == subdomain && d.source == source)
            .cloned())
    }

    async fn rename(&self, id: DbId, subdomain: &str) -> Result<(), sqlx::Error> {
        if let Some(row) = self.inner.write().await.rows.get_mut(&id) {
            row.subdomain = subdomain.to_string();
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_merged(
        &self,
        id: DbId,
        tags: Option<&str>,
        source: &str,
    ) -> Result<(), sqlx::Error> {
        if let Some(row) = self.inner.write().await.rows.get_mut(&id) {
            row.tags = tags.map(str::to_string);
            row.source = source.to_string();
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: DbId) -> Result<(), sqlx::Error> {
        self.inner.write().await.rows.remove(&id);
        Ok(())
    }

    async fn duplicate_subdomains(&self) -> Result<Vec<String>, sqlx::Error> {
        let table = self.inner.read().await;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for row in table.rows.values() {
            *counts.entry(row.subdomain.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, _)| name.to_string())
            .collect())
    }

    async fn list_by_subdomain(&self, subdomain: &str) -> Result<Vec<Domain>, sqlx::Error> {
        Ok(self
            .inner
            .read()
            .await
            .rows
            .values()
            .filter(|d| d.subdomain == subdomain)
            .cloned()
            .collect())
    }

    async fn list_created_before(&self, cutoff: Timestamp) -> Result<Vec<Domain>, sqlx::Error> {
        Ok(self
            .inner
            .read()
            .await
            .rows
            .values()
            .filter(|d| d.created_at < cutoff)
            .cloned()
            .collect())
    }
}
