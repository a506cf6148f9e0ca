//! Builders for the Kubernetes objects rendered from a [`crate::crd::ClusterConfig`].

pub mod meta;
pub mod pod;
