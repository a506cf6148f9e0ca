//! A Kubernetes operator converging Apache BookKeeper clusters.
//!
//! Every [`crd::BookkeeperCluster`] is resolved into a [`crd::ClusterConfig`] and driven through
//! [`controller::reconcile_cluster`]: the owned Kubernetes objects, the bookie volume claims, the
//! cluster metadata in ZooKeeper and finally the status.

pub mod builder;
pub mod cli;
pub mod client;
pub mod controller;
pub mod coordination;
pub mod crd;
pub mod finalizer;
pub mod labels;
pub mod logging;
pub mod metadata;
pub mod reconcile;
pub mod status;
pub mod volumes;

#[cfg(test)]
pub(crate) mod test_utils;

// External re-exports
pub use k8s_openapi;
pub use kube;
