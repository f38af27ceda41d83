//! RBAC manifests for the operator
//!
//! The operator needs get, list, watch and delete on `batch/jobs` and
//! nothing else.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::Result;

/// Name shared by the service account, role and binding
pub const OPERATOR_NAME: &str = "job-cleanup-operator";

/// Namespace the operator is deployed into
pub const OPERATOR_NAMESPACE: &str = "job-cleanup-system";

/// Verbs granted on Jobs
pub const JOB_VERBS: [&str; 4] = ["get", "list", "watch", "delete"];

pub fn service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(OPERATOR_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["batch".to_string()]),
            resources: Some(vec!["jobs".to_string()]),
            verbs: JOB_VERBS.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn cluster_role_binding(namespace: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: OPERATOR_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: OPERATOR_NAME.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Generate all RBAC YAML manifests
pub fn generate_manifests(namespace: &str) -> Result<Vec<String>> {
    Ok(vec![
        serde_yaml::to_string(&service_account(namespace))?,
        serde_yaml::to_string(&cluster_role())?,
        serde_yaml::to_string(&cluster_role_binding(namespace))?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_role_is_scoped_to_jobs() {
        let role = cluster_role();
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].api_groups.as_deref(), Some(&["batch".to_string()][..]));
        assert_eq!(rules[0].resources.as_deref(), Some(&["jobs".to_string()][..]));
        assert_eq!(rules[0].verbs, vec!["get", "list", "watch", "delete"]);
    }

    #[test]
    fn test_manifests_render_with_kinds() {
        let manifests = generate_manifests(OPERATOR_NAMESPACE).unwrap();
        assert_eq!(manifests.len(), 3);
        assert!(manifests[0].contains("kind: ServiceAccount"));
        assert!(manifests[1].contains("kind: ClusterRole"));
        assert!(manifests[2].contains("kind: ClusterRoleBinding"));
        assert!(manifests[2].contains("namespace: job-cleanup-system"));
    }
}
