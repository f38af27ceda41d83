//! Job Cleanup Operator
//!
//! Kubernetes controller that deletes backup Jobs once they have succeeded
//! or failed, so finished Job records do not pile up in the cluster.

pub mod config;
pub mod controllers;
pub mod error;
pub mod metrics;
pub mod rbac;
pub mod reconcilers;
pub mod store;

pub use error::{Error, Result};
