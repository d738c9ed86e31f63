//! Tests for the in-process job and domain stores.

use assert_matches::assert_matches;
use bigshot_core::job_events::UpdateType;
use bigshot_core::job_result::NotificationEntry;
use bigshot_core::job_status::JobStatus;
use bigshot_core::job_type::JobType;
use bigshot_db::memory::{MemoryDomainStore, MemoryJobStore};
use bigshot_db::models::job::{CreateJob, JobChanges, JobListQuery};
use bigshot_db::store::{DomainStore, JobStore};
use chrono::{Duration, Utc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn enumeration(target: &str) -> CreateJob {
    CreateJob {
        job_type: JobType::DomainEnumeration,
        target: Some(target.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_job_is_pending_with_zero_progress() {
    let store = MemoryJobStore::new();
    let job = store.create(&enumeration("a.com")).await.unwrap();

    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);
    assert!(job.result.is_none());
    assert_eq!(store.find_by_id(job.id).await.unwrap(), Some(job));
}

#[tokio::test]
async fn first_terminal_write_wins() {
    let store = MemoryJobStore::new();
    let job = store.create(&enumeration("a.com")).await.unwrap();
    store
        .update(job.id, &JobChanges::transition(JobStatus::Running))
        .await
        .unwrap();

    let cancelled = store
        .update(job.id, &JobChanges::transition(JobStatus::Cancelled))
        .await
        .unwrap();
    assert_matches!(cancelled, Some(ref j) if j.status == JobStatus::Cancelled);

    let completed = store
        .update(
            job.id,
            &JobChanges::transition(JobStatus::Completed).progress(100),
        )
        .await
        .unwrap();
    assert!(completed.is_none());

    let stored = store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert_eq!(stored.progress, 0);
}

#[tokio::test]
async fn update_of_missing_job_returns_none() {
    let store = MemoryJobStore::new();
    let result = store
        .update(42, &JobChanges::default().progress(10))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn listing_filters_and_paginates_newest_first() {
    let store = MemoryJobStore::new();
    for i in 0..5 {
        store
            .create(&enumeration(&format!("site{i}.com")))
            .await
            .unwrap();
    }
    store
        .create(&CreateJob {
            job_type: JobType::DataCleanup,
            target: None,
        })
        .await
        .unwrap();

    let page = store
        .list(&JobListQuery {
            job_type: Some(JobType::DomainEnumeration),
            page: Some(2),
            per_page: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.pages, 3);
    let ids: Vec<_> = page.items.iter().map(|j| j.id).collect();
    assert_eq!(ids, [3, 2]);
}

#[tokio::test]
async fn active_listing_excludes_terminal_jobs() {
    let store = MemoryJobStore::new();
    let a = store.create(&enumeration("a.com")).await.unwrap();
    let b = store.create(&enumeration("b.com")).await.unwrap();
    store
        .update(a.id, &JobChanges::transition(JobStatus::Cancelled))
        .await
        .unwrap();

    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, b.id);
}

#[tokio::test]
async fn stats_count_by_status_and_type() {
    let store = MemoryJobStore::new();
    let a = store.create(&enumeration("a.com")).await.unwrap();
    store.create(&enumeration("b.com")).await.unwrap();
    store
        .update(a.id, &JobChanges::transition(JobStatus::Running))
        .await
        .unwrap();
    store
        .update(a.id, &JobChanges::transition(JobStatus::Completed))
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.by_status["completed"], 1);
    assert_eq!(stats.by_status["pending"], 1);
    assert_eq!(stats.by_type["domain_enumeration"], 2);
    assert_eq!(stats.recent_jobs, 2);
    assert!(stats.avg_completion_secs.is_some());
}

#[tokio::test]
async fn pruning_drops_only_old_ledger_entries_of_old_jobs() {
    let store = MemoryJobStore::new();
    let job = store.create(&enumeration("a.com")).await.unwrap();

    let mut old = NotificationEntry::new(UpdateType::Started, serde_json::Value::Null);
    old.timestamp = Utc::now() - Duration::days(10);
    store
        .update(job.id, &JobChanges::default().notify(old))
        .await
        .unwrap();
    store
        .update(
            job.id,
            &JobChanges::default().notify(NotificationEntry::new(
                UpdateType::Completed,
                serde_json::Value::Null,
            )),
        )
        .await
        .unwrap();

    let cutoff = Utc::now() - Duration::days(7);
    let not_yet = store
        .prune_notifications(job.created_at, cutoff)
        .await
        .unwrap();
    assert_eq!(not_yet, 0);

    let touched = store
        .prune_notifications(Utc::now() + Duration::seconds(1), cutoff)
        .await
        .unwrap();
    assert_eq!(touched, 1);

    let ledger = store
        .find_by_id(job.id)
        .await
        .unwrap()
        .unwrap()
        .result_envelope()
        .notifications;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.entries()[0].notification_type, UpdateType::Completed);
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsert_inserts_once_per_subdomain_and_source() {
    let store = MemoryDomainStore::new();
    assert!(store.upsert("a.com", "x.a.com", "crt.sh").await.unwrap());
    assert!(!store.upsert("a.com", "x.a.com", "crt.sh").await.unwrap());
    assert!(store.upsert("a.com", "x.a.com", "virustotal").await.unwrap());

    assert_eq!(store.list_all().await.unwrap().len(), 2);
    assert_eq!(
        store.duplicate_subdomains().await.unwrap(),
        vec!["x.a.com".to_string()]
    );
}

#[tokio::test]
async fn created_before_filters_by_age() {
    let store = MemoryDomainStore::new();
    let old = Utc::now() - Duration::days(40);
    store
        .insert("a.com", "old.a.com", "crt.sh", None, old)
        .await;
    store.upsert("a.com", "new.a.com", "crt.sh").await.unwrap();

    let stale = store
        .list_created_before(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].subdomain, "old.a.com");
}
