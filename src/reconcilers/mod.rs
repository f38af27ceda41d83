//! Reconcilers for the Job Cleanup Operator
//!
//! This module contains the decision logic run for each watched object.
//! Reconcilers are responsible for:
//! - Classifying the live object
//! - Deleting it when its lifecycle is over
//! - Telling the controller when to look again

pub mod job_cleanup;
