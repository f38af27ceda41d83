//! In-memory job store for tests and local runs

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;

use super::{JobKey, JobStore};
use crate::error::{Error, Result};

#[derive(Default)]
struct State {
    jobs: BTreeMap<JobKey, Job>,
    get_calls: Vec<JobKey>,
    delete_calls: Vec<JobKey>,
    get_failure: Option<String>,
    delete_failure: Option<String>,
}

/// Job store holding Jobs in a map, recording every call it receives.
///
/// Failures can be injected for `get` and `delete` independently; an
/// injected failure stays active until cleared.
#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<State>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `jobs`
    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let store = Self::new();
        for job in jobs {
            store.insert(job);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the recorded calls from others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, job: Job) {
        let key = JobKey::for_job(&job);
        self.lock().jobs.insert(key, job);
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.lock().jobs.contains_key(key)
    }

    pub fn fail_gets(&self, message: impl Into<String>) {
        self.lock().get_failure = Some(message.into());
    }

    pub fn fail_deletes(&self, message: impl Into<String>) {
        self.lock().delete_failure = Some(message.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.get_failure = None;
        state.delete_failure = None;
    }

    /// Identities passed to `get`, in call order
    pub fn get_calls(&self) -> Vec<JobKey> {
        self.lock().get_calls.clone()
    }

    /// Identities passed to `delete`, in call order
    pub fn delete_calls(&self) -> Vec<JobKey> {
        self.lock().delete_calls.clone()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, key: &JobKey) -> Result<Option<Job>> {
        let mut state = self.lock();
        state.get_calls.push(key.clone());
        if let Some(message) = &state.get_failure {
            return Err(Error::store(message.clone()));
        }
        Ok(state.jobs.get(key).cloned())
    }

    async fn delete(&self, key: &JobKey, uid: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        state.delete_calls.push(key.clone());
        if let Some(message) = &state.delete_failure {
            return Err(Error::store(message.clone()));
        }
        let uid_matches = match (uid, state.jobs.get(key)) {
            (Some(expected), Some(job)) => job.metadata.uid.as_deref() == Some(expected),
            _ => true,
        };
        if uid_matches {
            state.jobs.remove(key);
        }
        Ok(())
    }
}
