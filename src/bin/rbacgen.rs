//! RBAC YAML Generator
//!
//! Prints the ServiceAccount, ClusterRole and ClusterRoleBinding the
//! job-cleanup-operator needs. The target namespace can be passed as the
//! first argument.
//!
//! Usage: cargo run --bin rbacgen -- job-cleanup-system > deploy/rbac.yaml

use job_cleanup_operator::rbac::{generate_manifests, OPERATOR_NAMESPACE};

fn main() -> anyhow::Result<()> {
    let namespace = std::env::args()
        .nth(1)
        .unwrap_or_else(|| OPERATOR_NAMESPACE.to_string());

    for manifest in generate_manifests(&namespace)? {
        println!("---");
        print!("{}", manifest);
    }
    Ok(())
}
