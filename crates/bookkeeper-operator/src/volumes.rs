//! Lifecycle of the per-bookie PersistentVolumeClaims.
//!
//! The StatefulSet controller creates one claim per (claim template, ordinal), named
//! `<template>-<statefulset>-<ordinal>`, and never removes them. Under the `Delete` reclaim
//! policy the operator removes every claim whose ordinal is no longer backed by a replica.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::{client::ResourceStore, crd::VolumeReclaimPolicy};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to list the volume claims in namespace {namespace}"))]
    ListVolumeClaims {
        source: kube::Error,
        namespace: String,
    },

    #[snafu(display("failed to delete the volume claim {namespace}/{name}"))]
    DeleteVolumeClaim {
        source: kube::Error,
        namespace: String,
        name: String,
    },
}

/// The ordinal of a claim, taken from the suffix after the last `-`.
pub fn claim_ordinal(name: &str) -> Option<i32> {
    name.rsplit_once('-')?.1.parse().ok()
}

/// A claim is idle once its ordinal is outside `0..replicas`. Claims without an ordinal are
/// never idle.
pub fn is_idle(name: &str, replicas: i32) -> bool {
    claim_ordinal(name).is_some_and(|ordinal| ordinal >= replicas)
}

/// Deletes the idle claims matching `selector`. Returns the names of the deleted claims.
///
/// Nothing is listed or deleted unless `policy` is [`VolumeReclaimPolicy::Delete`]. The first
/// failing delete aborts the batch, the remaining claims are left for the next pass.
pub async fn delete_idle_claims(
    store: &impl ResourceStore,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    replicas: i32,
    policy: VolumeReclaimPolicy,
) -> Result<Vec<String>> {
    if policy != VolumeReclaimPolicy::Delete {
        return Ok(Vec::new());
    }
    delete_claims(store, namespace, selector, |name| is_idle(name, replicas)).await
}

/// Deletes every claim matching `selector`, used when the cluster goes away.
pub async fn delete_all_claims(
    store: &impl ResourceStore,
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Result<Vec<String>> {
    delete_claims(store, namespace, selector, |_| true).await
}

async fn delete_claims(
    store: &impl ResourceStore,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    should_delete: impl Fn(&str) -> bool + Send,
) -> Result<Vec<String>> {
    let claims: Vec<PersistentVolumeClaim> = store
        .list_with_labels(namespace, selector)
        .await
        .context(ListVolumeClaimsSnafu { namespace })?;

    let mut deleted = Vec::new();
    for name in claims.iter().map(ResourceExt::name_any) {
        if !should_delete(&name) {
            continue;
        }
        info!(claim = %name, %namespace, "deleting unused volume claim");
        store
            .delete::<PersistentVolumeClaim>(&name, namespace)
            .await
            .context(DeleteVolumeClaimSnafu {
                namespace,
                name: name.clone(),
            })?;
        deleted.push(name);
    }
    Ok(deleted)
}
