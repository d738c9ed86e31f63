//! [`JobStore`] / [`DomainStore`] backed by Postgres repositories.

use async_trait::async_trait;
use bigshot_core::types::{DbId, Timestamp};

use crate::models::domain::Domain;
use crate::models::job::{CreateJob, Job, JobChanges, JobListQuery, JobPage, JobStats};
use crate::repositories::{DomainRepo, JobRepo};
use crate::store::{DomainStore, JobStore};
use crate::DbPool;

#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input: &CreateJob) -> Result<Job, sqlx::Error> {
        JobRepo::create(&self.pool, input).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::find_by_id(&self.pool, id).await
    }

    async fn update(&self, id: DbId, changes: &JobChanges) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::update(&self.pool, id, changes).await
    }

    async fn list(&self, params: &JobListQuery) -> Result<JobPage, sqlx::Error> {
        JobRepo::list(&self.pool, params).await
    }

    async fn list_active(&self) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_active(&self.pool).await
    }

    async fn stats(&self) -> Result<JobStats, sqlx::Error> {
        JobRepo::stats(&self.pool).await
    }

    async fn prune_notifications(
        &self,
        created_before: Timestamp,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        JobRepo::prune_notifications(&self.pool, created_before, cutoff).await
    }
}

#[derive(Clone)]
pub struct PgDomainStore {
    pool: DbPool,
}

impl PgDomainStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DomainStore for PgDomainStore {
    async fn upsert(
        &self,
        root_domain: &str,
        subdomain: &str,
        source: &str,
    ) -> Result<bool, sqlx::Error> {
        DomainRepo::upsert(&self.pool, root_domain, subdomain, source).await
    }

    async fn list_all(&self) -> Result<Vec<Domain>, sqlx::Error> {
        DomainRepo::list_all(&self.pool).await
    }

    async fn find(&self, subdomain: &str, source: &str) -> Result<Option<Domain>, sqlx::Error> {
        DomainRepo::find(&self.pool, subdomain, source).await
    }

    async fn rename(&self, id: DbId, subdomain: &str) -> Result<(), sqlx::Error> {
        DomainRepo::rename(&self.pool, id, subdomain).await
    }

    async fn update_merged(
        &self,
        id: DbId,
        tags: Option<&str>,
        source: &str,
    ) -> Result<(), sqlx::Error> {
        DomainRepo::update_merged(&self.pool, id, tags, source).await
    }

    async fn delete(&self, id: DbId) -> Result<(), sqlx::Error> {
        DomainRepo::delete(&self.pool, id).await
    }

    async fn duplicate_subdomains(&self) -> Result<Vec<String>, sqlx::Error> {
        DomainRepo::duplicate_subdomains(&self.pool).await
    }

    async fn list_by_subdomain(&self, subdomain: &str) -> Result<Vec<Domain>, sqlx::Error> {
        DomainRepo::list_by_subdomain(&self.pool, subdomain).await
    }

    async fn list_created_before(&self, cutoff: Timestamp) -> Result<Vec<Domain>, sqlx::Error> {
        DomainRepo::list_created_before(&self.pool, cutoff).await
    }
}
