//! Discovered-domain row model.

use bigshot_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `domains` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Domain {
    pub id: DbId,
    pub root_domain: String,
    pub subdomain: String,
    pub source: String,
    pub tags: Option<String>,
    pub fetched_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
