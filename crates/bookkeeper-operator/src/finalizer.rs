//! Cleanup of the state a cluster leaves outside of Kubernetes.
//!
//! Owned objects are garbage collected through their owner references. The ZooKeeper subtree
//! and (under the `Delete` reclaim policy) the bookie volume claims are not, so the cluster
//! carries [`FINALIZER`] until [`teardown`] removed them.

use kube::{Resource, ResourceExt};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::info;

use crate::{
    client::ResourceStore,
    coordination::{self, Connector, MetadataClient},
    crd::{BookkeeperCluster, VolumeReclaimPolicy, defaults::DefaultConfig},
    labels::{BOOKIE_COMPONENT, selector_labels},
    volumes,
};

pub const FINALIZER: &str = "bookkeeper.monime.sl/cleanup";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("object has no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("no ZooKeeper connect string to purge {path:?} with"))]
    MissingZooKeeperServers { path: String },

    #[snafu(display("failed to connect to ZooKeeper to purge {path:?}"))]
    Connect {
        source: coordination::Error,
        path: String,
    },

    #[snafu(display("failed to purge the ZooKeeper subtree {path:?}"))]
    PurgeMetadata {
        source: coordination::Error,
        path: String,
    },

    #[snafu(display("failed to delete the volume claims"))]
    DeleteVolumeClaims { source: volumes::Error },

    #[snafu(display("failed to add the finalizer to {name}"))]
    AddFinalizer { source: kube::Error, name: String },

    #[snafu(display("failed to remove the finalizer from {name}"))]
    RemoveFinalizer { source: kube::Error, name: String },
}

/// Checks whether our finalizer is in the list of finalizers of the cluster.
pub fn has_finalizer(cluster: &BookkeeperCluster) -> bool {
    cluster.finalizers().iter().any(|finalizer| finalizer == FINALIZER)
}

/// Adds the finalizer unless it is already present. Returns the cluster as stored afterwards.
pub async fn ensure_finalizer(
    store: &impl ResourceStore,
    cluster: &BookkeeperCluster,
) -> Result<BookkeeperCluster> {
    if has_finalizer(cluster) {
        return Ok(cluster.clone());
    }

    info!(cluster = %cluster.name_any(), finalizer = FINALIZER, "adding finalizer");
    let mut updated = cluster.clone();
    updated
        .meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_owned());
    store.update(&updated).await.context(AddFinalizerSnafu {
        name: cluster.name_any(),
    })
}

/// Purges the cluster's ZooKeeper subtree, deletes its volume claims if the reclaim policy says
/// so and finally drops the finalizer.
///
/// The finalizer stays whenever a step fails, so the platform keeps the object around and the
/// teardown is retried.
pub async fn teardown<C: Connector>(
    store: &impl ResourceStore,
    connector: &C,
    cluster: &BookkeeperCluster,
    defaults: &DefaultConfig,
) -> Result<BookkeeperCluster> {
    if !has_finalizer(cluster) {
        return Ok(cluster.clone());
    }
    let name = cluster.name_any();
    let namespace = cluster.namespace().context(ObjectHasNoNamespaceSnafu)?;

    let root = cluster.zk_root_path();
    ensure!(
        !cluster.spec.zk_servers.trim().is_empty(),
        MissingZooKeeperServersSnafu { path: &root }
    );
    info!(cluster = %name, path = %root, "purging cluster metadata");
    let client = MetadataClient::connect(connector, &cluster.spec.zk_servers)
        .await
        .context(ConnectSnafu { path: &root })?;
    client
        .delete_node(&root)
        .await
        .context(PurgeMetadataSnafu { path: &root })?;

    if cluster.reclaim_policy(defaults.reclaim_policy) == VolumeReclaimPolicy::Delete {
        let deleted = volumes::delete_all_claims(
            store,
            &namespace,
            &selector_labels(&name, BOOKIE_COMPONENT),
        )
        .await
        .context(DeleteVolumeClaimsSnafu)?;
        info!(cluster = %name, claims = deleted.len(), "deleted volume claims");
    }

    info!(cluster = %name, finalizer = FINALIZER, "removing finalizer");
    let mut updated = cluster.clone();
    if let Some(finalizers) = updated.meta_mut().finalizers.as_mut() {
        finalizers.retain(|finalizer| finalizer != FINALIZER);
    }
    store
        .update(&updated)
        .await
        .context(RemoveFinalizerSnafu { name })
}
