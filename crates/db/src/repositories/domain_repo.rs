//! Repository for the `domains` table.

use bigshot_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::domain::Domain;

/// Column list for `domains` queries.
const COLUMNS: &str = "\
    id, root_domain, subdomain, source, tags, fetched_at, created_at, updated_at";

/// Provides CRUD operations for discovered domains.
pub struct DomainRepo;

impl DomainRepo {
    /// Insert a discovery or refresh an existing `(subdomain, source)` row.
    ///
    /// Returns `true` when the row was newly inserted.
    pub async fn upsert(
        pool: &PgPool,
        root_domain: &str,
        subdomain: &str,
        source: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "INSERT INTO domains (root_domain, subdomain, source) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (subdomain, source) \
             DO UPDATE SET fetched_at = NOW(), updated_at = NOW() \
             RETURNING (xmax = 0)",
        )
        .bind(root_domain)
        .bind(subdomain)
        .bind(source)
        .fetch_one(pool)
        .await
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Domain>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM domains ORDER BY id");
        sqlx::query_as::<_, Domain>(&query).fetch_all(pool).await
    }

    pub async fn find(
        pool: &PgPool,
        subdomain: &str,
        source: &str,
    ) -> Result<Option<Domain>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM domains WHERE subdomain = $1 AND source = $2");
        sqlx::query_as::<_, Domain>(&query)
            .bind(subdomain)
            .bind(source)
            .fetch_optional(pool)
            .await
    }

    pub async fn rename(pool: &PgPool, id: DbId, subdomain: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE domains SET subdomain = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(subdomain)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn update_merged(
        pool: &PgPool,
        id: DbId,
        tags: Option<&str>,
        source: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE domains SET tags = $2, source = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(tags)
        .bind(source)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM domains WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn duplicate_subdomains(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT subdomain FROM domains GROUP BY subdomain HAVING COUNT(*) > 1 \
             ORDER BY subdomain",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_subdomain(
        pool: &PgPool,
        subdomain: &str,
    ) -> Result<Vec<Domain>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM domains WHERE subdomain = $1 ORDER BY id");
        sqlx::query_as::<_, Domain>(&query)
            .bind(subdomain)
            .fetch_all(pool)
            .await
    }

    pub async fn list_created_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<Domain>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM domains WHERE created_at < $1 ORDER BY id");
        sqlx::query_as::<_, Domain>(&query)
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }
}
