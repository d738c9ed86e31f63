//! Work plans: the finite, ordered item sequence a task executes.
//!
//! [`WorkPlan::build`] expands a [`TaskPayload`] into [`WorkItem`]s.
//! [`WorkItem::execute`] runs one item and always returns an
//! [`ItemOutcome`]; errors inside an item never escape it.

use std::collections::BTreeSet;
use std::fmt;

use bigshot_core::domain_names::{is_subdomain_of, merge_tags, normalize_domain};
use bigshot_core::job_result::{
    CleanupResult, DeduplicationResult, DiscoveredDomain, EnumerationResult, JobOutcome,
    NormalizationResult,
};
use bigshot_core::types::Timestamp;
use bigshot_core::work::{EnumerationPair, ItemOutcome, TaskPayload, WorkTally};
use bigshot_db::models::domain::Domain;
use bigshot_db::store::DomainStore;
use chrono::{Duration, Utc};

use crate::processor::{CredentialProvider, ProcessorRegistry};

/// One unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    /// Query one source for subdomains of one target.
    Enumerate(EnumerationPair),
    /// Normalise one stored domain.
    Normalize(Domain),
    /// Merge every row stored under one subdomain.
    Deduplicate(String),
    /// Delete one expired domain.
    Delete(Domain),
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Enumerate(pair) => write!(f, "enumerate {} via {}", pair.target, pair.source),
            WorkItem::Normalize(domain) => write!(f, "normalize {}", domain.subdomain),
            WorkItem::Deduplicate(name) => write!(f, "deduplicate {name}"),
            WorkItem::Delete(domain) => write!(f, "delete {}", domain.subdomain),
        }
    }
}

/// Collaborators an item needs to run.
pub struct ItemContext<'a> {
    pub domains: &'a dyn DomainStore,
    pub processors: &'a ProcessorRegistry,
    pub credentials: &'a dyn CredentialProvider,
}

/// The expanded items of one task.
#[derive(Debug, Clone)]
pub struct WorkPlan {
    payload: TaskPayload,
    items: Vec<WorkItem>,
    cutoff: Option<Timestamp>,
}

impl WorkPlan {
    /// Expand a payload. Data-processing plans snapshot the domain store.
    pub async fn build(
        payload: &TaskPayload,
        domains: &dyn DomainStore,
    ) -> Result<Self, sqlx::Error> {
        let mut cutoff = None;
        let items = match payload {
            TaskPayload::DomainEnumeration { .. } => payload
                .enumeration_pairs()
                .into_iter()
                .map(WorkItem::Enumerate)
                .collect(),
            TaskPayload::DataNormalization => domains
                .list_all()
                .await?
                .into_iter()
                .map(WorkItem::Normalize)
                .collect(),
            TaskPayload::DataDeduplication => domains
                .duplicate_subdomains()
                .await?
                .into_iter()
                .map(WorkItem::Deduplicate)
                .collect(),
            TaskPayload::DataCleanup { days_old } => {
                let before = Utc::now() - Duration::days(i64::from(*days_old));
                cutoff = Some(before);
                domains
                    .list_created_before(before)
                    .await?
                    .into_iter()
                    .map(WorkItem::Delete)
                    .collect()
            }
        };

        Ok(Self {
            payload: payload.clone(),
            items,
            cutoff,
        })
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Build the job outcome once every item ran.
    pub fn outcome(&self, tally: &WorkTally, mut found: EnumerationResult) -> JobOutcome {
        let completion_time = Utc::now();
        match &self.payload {
            TaskPayload::DomainEnumeration { .. } => {
                found.failed_items = tally.errored;
                found.skipped_items = tally.skipped;
                JobOutcome::Enumeration(found)
            }
            TaskPayload::DataNormalization => JobOutcome::Normalization(NormalizationResult {
                total_processed: tally.processed(),
                normalized_count: tally.affected,
                completion_time,
            }),
            TaskPayload::DataDeduplication => JobOutcome::Deduplication(DeduplicationResult {
                total_processed: tally.processed(),
                merged_count: tally.affected,
                completion_time,
            }),
            TaskPayload::DataCleanup { .. } => JobOutcome::Cleanup(CleanupResult {
                total_processed: tally.processed(),
                deleted_count: tally.affected,
                cutoff_date: self.cutoff.unwrap_or(completion_time),
                completion_time,
            }),
        }
    }
}

impl WorkItem {
    /// Extra progress-event fields describing this item.
    pub fn progress_meta(&self, tally: &WorkTally) -> serde_json::Value {
        let mut meta = match self {
            WorkItem::Enumerate(pair) => serde_json::json!({
                "current_target": pair.target,
                "current_source": pair.source,
            }),
            WorkItem::Normalize(domain) | WorkItem::Delete(domain) => {
                serde_json::json!({ "current_domain": domain.subdomain })
            }
            WorkItem::Deduplicate(name) => serde_json::json!({ "current_domain": name }),
        };
        meta["completed_tasks"] = serde_json::json!(tally.processed());
        meta["total_tasks"] = serde_json::json!(tally.total);
        meta
    }

    /// Run this item. Discoveries are recorded into `found`.
    pub async fn execute(
        &self,
        ctx: &ItemContext<'_>,
        found: &mut EnumerationResult,
    ) -> ItemOutcome {
        let result = match self {
            WorkItem::Enumerate(pair) => return enumerate(ctx, pair, found).await,
            WorkItem::Normalize(domain) => normalize(ctx.domains, domain).await,
            WorkItem::Deduplicate(name) => deduplicate(ctx.domains, name).await,
            WorkItem::Delete(domain) => ctx.domains.delete(domain.id).await.map(|()| 1),
        };
        match result {
            Ok(affected) => ItemOutcome::Succeeded { affected },
            Err(e) => ItemOutcome::Errored {
                error: e.to_string(),
            },
        }
    }
}

/// Clean a raw name reported by a source and keep it only if it is a
/// strict subdomain of `target`.
fn candidate_name(raw: &str, target: &str) -> Option<String> {
    let name = raw.trim().trim_start_matches("*.").trim_end_matches('.').to_lowercase();
    is_subdomain_of(&name, target).then_some(name)
}

async fn enumerate(
    ctx: &ItemContext<'_>,
    pair: &EnumerationPair,
    found: &mut EnumerationResult,
) -> ItemOutcome {
    let Some(processor) = ctx.processors.get(&pair.source) else {
        return ItemOutcome::Skipped {
            reason: format!("No processor registered for source '{}'", pair.source),
        };
    };

    let api_key = ctx.credentials.api_key(&pair.source);
    let names = match processor.process(&pair.target, api_key.as_deref()).await {
        Ok(names) => names,
        Err(e) => {
            return ItemOutcome::Errored {
                error: e.to_string(),
            }
        }
    };

    let target = pair.target.trim().to_lowercase();
    let unique: BTreeSet<String> = names
        .iter()
        .filter_map(|raw| candidate_name(raw, &target))
        .collect();

    let mut discovered = Vec::with_capacity(unique.len());
    let mut failure = None;
    for subdomain in unique {
        match ctx.domains.upsert(&target, &subdomain, &pair.source).await {
            Ok(inserted) => discovered.push(DiscoveredDomain {
                subdomain,
                source: pair.source.clone(),
                root_domain: target.clone(),
                existing: !inserted,
            }),
            Err(e) => {
                failure = Some(e.to_string());
                break;
            }
        }
    }

    let affected = discovered.len();
    found.record(discovered);
    match failure {
        Some(error) => ItemOutcome::Errored { error },
        None => ItemOutcome::Succeeded { affected },
    }
}

async fn normalize(domains: &dyn DomainStore, domain: &Domain) -> Result<usize, sqlx::Error> {
    let normalized = normalize_domain(&domain.subdomain);
    if normalized == domain.subdomain {
        return Ok(0);
    }

    match domains.find(&normalized, &domain.source).await? {
        Some(existing) => {
            let tags = merge_tags([existing.tags.as_deref(), domain.tags.as_deref()]);
            domains
                .update_merged(existing.id, tags.as_deref(), &existing.source)
                .await?;
            domains.delete(domain.id).await?;
        }
        None => domains.rename(domain.id, &normalized).await?,
    }
    Ok(1)
}

async fn deduplicate(domains: &dyn DomainStore, subdomain: &str) -> Result<usize, sqlx::Error> {
    let rows = domains.list_by_subdomain(subdomain).await?;
    let Some((keep, duplicates)) = rows.split_first() else {
        return Ok(0);
    };
    if duplicates.is_empty() {
        return Ok(0);
    }

    let tags = merge_tags(rows.iter().map(|d| d.tags.as_deref()));
    let sources = merge_tags(rows.iter().map(|d| Some(d.source.as_str())))
        .unwrap_or_else(|| keep.source.clone());

    for duplicate in duplicates {
        domains.delete(duplicate.id).await?;
    }
    domains
        .update_merged(keep.id, tags.as_deref(), &sources)
        .await?;
    Ok(duplicates.len())
}
