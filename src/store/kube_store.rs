//! Kubernetes-backed job store

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::{DeleteParams, Preconditions},
    Api, Client,
};
use tracing::debug;

use super::{JobKey, JobStore};
use crate::error::{Error, Result};

/// Job store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeJobStore {
    client: Client,
    delete_params: DeleteParams,
}

impl KubeJobStore {
    pub fn new(client: Client, delete_params: DeleteParams) -> Self {
        Self {
            client,
            delete_params,
        }
    }

    fn api(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Delete parameters pinned to `uid` when given
pub fn pinned_delete_params(base: &DeleteParams, uid: Option<&str>) -> DeleteParams {
    let mut params = base.clone();
    if let Some(uid) = uid {
        params.preconditions = Some(Preconditions {
            uid: Some(uid.to_string()),
            resource_version: None,
        });
    }
    params
}

/// True when the API server answered 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

/// True when the API server answered 409, e.g. a failed UID precondition
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 409)
}

#[async_trait]
impl JobStore for KubeJobStore {
    async fn get(&self, key: &JobKey) -> Result<Option<Job>> {
        self.api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(Error::Kube)
    }

    async fn delete(&self, key: &JobKey, uid: Option<&str>) -> Result<()> {
        let params = pinned_delete_params(&self.delete_params, uid);
        match self.api(&key.namespace).delete(&key.name, &params).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(job = %key, "Job already gone at delete time");
                Ok(())
            }
            Err(e) if is_conflict(&e) => {
                debug!(job = %key, "Job was replaced by a newer object, not deleting");
                Ok(())
            }
            Err(e) => Err(Error::Kube(e)),
        }
    }
}
