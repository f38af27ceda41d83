//! Job store abstraction
//!
//! The reconciler only needs point lookups and deletions of Jobs by
//! namespaced identity. [`JobStore`] captures exactly that, so the decision
//! logic can run against the Kubernetes API or against an in-memory fake.

mod kube_store;
mod memory;

pub use kube_store::*;
pub use memory::*;

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;

use crate::error::Result;

/// Namespaced identity of a Job
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub namespace: String,
    pub name: String,
}

impl JobKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a Job object; cluster-scoped lookups fall back to "default"
    pub fn for_job(job: &Job) -> Self {
        Self {
            namespace: job.namespace().unwrap_or_else(|| "default".to_string()),
            name: job.name_any(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read and delete access to Jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a Job. `Ok(None)` means the object does not exist.
    async fn get(&self, key: &JobKey) -> Result<Option<Job>>;

    /// Delete a Job. Deleting an object that is already gone succeeds.
    ///
    /// With `uid` set, only the object with that UID is deleted; if the name
    /// now belongs to a different object, nothing is deleted and the call
    /// still succeeds, since the object that was evaluated is gone.
    async fn delete(&self, key: &JobKey, uid: Option<&str>) -> Result<()>;
}
