//! Integration tests for the job cleanup decision logic
//!
//! These tests drive `evaluate` against the in-memory job store and check
//! which store calls are issued and what the controller is told to do next.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use job_cleanup_operator::reconcilers::job_cleanup::{evaluate, CleanupPolicy, Outcome};
use job_cleanup_operator::store::{InMemoryJobStore, JobKey};
use job_cleanup_operator::Error;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Test Helpers
// ============================================================================

const MARKER: &str = "backup-database";

fn job(namespace: &str, name: &str, labels: &[(&str, &str)], succeeded: i32, failed: i32) -> Job {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(JobStatus {
            succeeded: Some(succeeded),
            failed: Some(failed),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn policy() -> CleanupPolicy {
    CleanupPolicy::default()
}

fn one_minute() -> Outcome {
    Outcome::RequeueAfter(Duration::from_secs(60))
}

// ============================================================================
// Absent Jobs
// ============================================================================

#[tokio::test]
async fn missing_job_is_success_without_delete() {
    let store = InMemoryJobStore::new();
    let key = JobKey::new("ops", "backup-1");

    let outcome = assert_ok!(evaluate(&store, &key, &policy()).await);

    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.get_calls(), vec![key]);
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn deleted_job_evaluates_as_absent_on_every_later_evaluation() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-7", &[(MARKER, "true")], 1, 0)]);
    let key = JobKey::new("ops", "backup-7");

    evaluate(&store, &key, &policy()).await.unwrap();
    assert!(!store.contains(&key));

    let second = assert_ok!(evaluate(&store, &key, &policy()).await);
    let third = assert_ok!(evaluate(&store, &key, &policy()).await);

    assert_eq!(second, Outcome::Done);
    assert_eq!(third, Outcome::Done);
    assert_eq!(store.delete_calls().len(), 1);
}

// ============================================================================
// Scope
// ============================================================================

#[tokio::test]
async fn unlabelled_job_is_left_alone() {
    let store = InMemoryJobStore::with_jobs([job("ops", "sync-3", &[], 0, 0)]);
    let key = JobKey::new("ops", "sync-3");

    let outcome = evaluate(&store, &key, &policy()).await.unwrap();

    assert_eq!(outcome, Outcome::Done);
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn unlabelled_job_is_never_deleted_whatever_its_status() {
    let statuses = [(0, 0), (1, 0), (0, 1), (3, 2)];

    for (succeeded, failed) in statuses {
        let store =
            InMemoryJobStore::with_jobs([job("ops", "sync-3", &[("app", "sync")], succeeded, failed)]);
        let key = JobKey::new("ops", "sync-3");

        let outcome = evaluate(&store, &key, &policy()).await.unwrap();

        assert_eq!(outcome, Outcome::Done, "status ({}, {})", succeeded, failed);
        assert!(store.delete_calls().is_empty(), "status ({}, {})", succeeded, failed);
        assert!(store.contains(&key));
    }
}

#[tokio::test]
async fn custom_marker_label_replaces_default() {
    let store = InMemoryJobStore::with_jobs([
        job("ops", "backup-7", &[(MARKER, "true")], 1, 0),
        job("ops", "archive-2", &[("example.com/cleanup", "yes")], 1, 0),
    ]);
    let policy = CleanupPolicy {
        marker_label: "example.com/cleanup".to_string(),
        requeue_after: Duration::from_secs(60),
    };

    evaluate(&store, &JobKey::new("ops", "backup-7"), &policy).await.unwrap();
    evaluate(&store, &JobKey::new("ops", "archive-2"), &policy).await.unwrap();

    assert_eq!(store.delete_calls(), vec![JobKey::new("ops", "archive-2")]);
}

// ============================================================================
// Terminal Jobs
// ============================================================================

#[tokio::test]
async fn succeeded_backup_job_is_deleted() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-7", &[(MARKER, "true")], 1, 0)]);
    let key = JobKey::new("ops", "backup-7");

    let outcome = evaluate(&store, &key, &policy()).await.unwrap();

    assert_eq!(outcome, one_minute());
    assert_eq!(store.delete_calls(), vec![key.clone()]);
    assert!(!store.contains(&key));
}

#[tokio::test]
async fn every_terminal_status_issues_exactly_one_delete() {
    let statuses = [(1, 0), (0, 1), (2, 5), (0, 6)];

    for (succeeded, failed) in statuses {
        let store =
            InMemoryJobStore::with_jobs([job("ops", "backup-8", &[(MARKER, "")], succeeded, failed)]);
        let key = JobKey::new("ops", "backup-8");

        let outcome = evaluate(&store, &key, &policy()).await.unwrap();

        assert_eq!(outcome, one_minute(), "status ({}, {})", succeeded, failed);
        assert_eq!(store.delete_calls(), vec![key], "status ({}, {})", succeeded, failed);
    }
}

#[tokio::test]
async fn only_the_evaluated_job_is_deleted() {
    let store = InMemoryJobStore::with_jobs([
        job("ops", "backup-7", &[(MARKER, "true")], 1, 0),
        job("ops", "backup-8", &[(MARKER, "true")], 1, 0),
        job("staging", "backup-7", &[(MARKER, "true")], 1, 0),
    ]);

    evaluate(&store, &JobKey::new("ops", "backup-7"), &policy()).await.unwrap();

    assert_eq!(store.delete_calls(), vec![JobKey::new("ops", "backup-7")]);
    assert!(store.contains(&JobKey::new("ops", "backup-8")));
    assert!(store.contains(&JobKey::new("staging", "backup-7")));
}

#[tokio::test]
async fn delete_failure_is_propagated() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-7", &[(MARKER, "true")], 0, 1)]);
    store.fail_deletes("the server is currently unable to handle the request");
    let key = JobKey::new("ops", "backup-7");

    let err = evaluate(&store, &key, &policy()).await.unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    assert!(err.to_string().contains("unable to handle the request"));
    assert_eq!(store.delete_calls(), vec![key.clone()]);
    assert!(store.contains(&key));
}

#[tokio::test]
async fn delete_is_retried_on_next_evaluation_after_failure_clears() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-7", &[(MARKER, "true")], 1, 0)]);
    store.fail_deletes("connection refused");
    let key = JobKey::new("ops", "backup-7");

    assert_err!(evaluate(&store, &key, &policy()).await);

    store.clear_failures();
    let outcome = evaluate(&store, &key, &policy()).await.unwrap();

    assert_eq!(outcome, one_minute());
    assert_eq!(store.delete_calls().len(), 2);
    assert!(!store.contains(&key));
}

// ============================================================================
// Running Jobs
// ============================================================================

#[tokio::test]
async fn running_backup_job_is_requeued_after_one_minute() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-9", &[(MARKER, "")], 0, 0)]);
    let key = JobKey::new("ops", "backup-9");

    let outcome = evaluate(&store, &key, &policy()).await.unwrap();

    assert_eq!(outcome, one_minute());
    assert!(store.delete_calls().is_empty());
    assert!(store.contains(&key));
}

#[tokio::test]
async fn running_job_without_status_is_requeued() {
    let mut running = job("ops", "backup-10", &[(MARKER, "true")], 0, 0);
    running.status = None;
    let store = InMemoryJobStore::with_jobs([running]);

    let outcome = evaluate(&store, &JobKey::new("ops", "backup-10"), &policy())
        .await
        .unwrap();

    assert_eq!(outcome, one_minute());
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn requeue_interval_follows_policy() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-9", &[(MARKER, "")], 0, 0)]);
    let policy = CleanupPolicy {
        marker_label: MARKER.to_string(),
        requeue_after: Duration::from_secs(15),
    };

    let outcome = evaluate(&store, &JobKey::new("ops", "backup-9"), &policy)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::RequeueAfter(Duration::from_secs(15)));
}

#[tokio::test]
async fn job_is_deleted_once_it_finishes() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-11", &[(MARKER, "true")], 0, 0)]);
    let key = JobKey::new("ops", "backup-11");

    assert_eq!(evaluate(&store, &key, &policy()).await.unwrap(), one_minute());
    assert!(store.delete_calls().is_empty());

    store.insert(job("ops", "backup-11", &[(MARKER, "true")], 1, 0));
    assert_eq!(evaluate(&store, &key, &policy()).await.unwrap(), one_minute());
    assert_eq!(evaluate(&store, &key, &policy()).await.unwrap(), Outcome::Done);

    assert_eq!(store.delete_calls(), vec![key]);
}

// ============================================================================
// Read Failures
// ============================================================================

#[tokio::test]
async fn read_failure_is_propagated_without_delete() {
    let store = InMemoryJobStore::with_jobs([job("ops", "backup-5", &[(MARKER, "true")], 1, 0)]);
    store.fail_gets("etcdserver: request timed out");
    let key = JobKey::new("ops", "backup-5");

    let err = assert_err!(evaluate(&store, &key, &policy()).await);

    assert!(matches!(err, Error::Store(ref msg) if msg == "etcdserver: request timed out"));
    assert!(store.delete_calls().is_empty());
    assert!(store.contains(&key));
}
