//! Storage contracts consumed by the pipeline.
//!
//! Postgres implementations live in [`crate::repositories`]; in-process
//! implementations in [`crate::memory`].

use async_trait::async_trait;
use bigshot_core::types::{DbId, Timestamp};

use crate::models::domain::Domain;
use crate::models::job::{CreateJob, Job, JobChanges, JobListQuery, JobPage, JobStats};

/// Authoritative storage of job rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `pending` job with progress 0.
    async fn create(&self, input: &CreateJob) -> Result<Job, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, sqlx::Error>;

    /// Apply `changes` atomically.
    ///
    /// Returns the updated row, or `None` when the job does not exist or the
    /// status guard in `changes.expected` rejected the update.
    async fn update(&self, id: DbId, changes: &JobChanges) -> Result<Option<Job>, sqlx::Error>;

    /// Filtered, paginated listing, newest first.
    async fn list(&self, params: &JobListQuery) -> Result<JobPage, sqlx::Error>;

    /// Jobs in `pending` or `running`, newest first.
    async fn list_active(&self) -> Result<Vec<Job>, sqlx::Error>;

    async fn stats(&self) -> Result<JobStats, sqlx::Error>;

    /// Drop ledger entries older than `cutoff` from jobs created before
    /// `created_before`. Returns the number of jobs touched.
    async fn prune_notifications(
        &self,
        created_before: Timestamp,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error>;
}

/// Storage of discovered domains.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Insert `(subdomain, source)` or refresh its `fetched_at`.
    ///
    /// Returns `true` when a new row was inserted.
    async fn upsert(&self, root_domain: &str, subdomain: &str, source: &str)
        -> Result<bool, sqlx::Error>;

    async fn list_all(&self) -> Result<Vec<Domain>, sqlx::Error>;

    async fn find(&self, subdomain: &str, source: &str) -> Result<Option<Domain>, sqlx::Error>;

    async fn rename(&self, id: DbId, subdomain: &str) -> Result<(), sqlx::Error>;

    /// Overwrite tags and source of a kept duplicate.
    async fn update_merged(
        &self,
        id: DbId,
        tags: Option<&str>,
        source: &str,
    ) -> Result<(), sqlx::Error>;

    async fn delete(&self, id: DbId) -> Result<(), sqlx::Error>;

    /// Subdomain names stored under more than one row.
    async fn duplicate_subdomains(&self) -> Result<Vec<String>, sqlx::Error>;

    /// All rows for `subdomain`, oldest first.
    async fn list_by_subdomain(&self, subdomain: &str) -> Result<Vec<Domain>, sqlx::Error>;

    /// Rows created before `cutoff`.
    async fn list_created_before(&self, cutoff: Timestamp) -> Result<Vec<Domain>, sqlx::Error>;
}
