//! Publishes the cluster size to ZooKeeper so bookies and clients can discover it.
//!
//! The nodes live below the cluster root path:
//!
//! * `<root>/size`: the desired number of bookies
//! * `<root>/update-time`: milliseconds since the epoch of the last write
//!
//! Both hold plain UTF-8 decimals. The status snapshot in [`ClusterMetadata`] is only updated
//! once both writes went through, so a failed write is retried on the next pass.

use jiff::Timestamp;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::{
    client::ResourceStore,
    coordination::{self, Connector, MetadataClient},
    crd::{BookkeeperCluster, ClusterConfig, ClusterMetadata},
};

pub const SIZE_NODE: &str = "size";
pub const UPDATE_TIME_NODE: &str = "update-time";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to connect to ZooKeeper for {cluster}"))]
    Connect {
        source: coordination::Error,
        cluster: String,
    },

    #[snafu(display("failed to write the cluster size to {path:?}"))]
    WriteSize {
        source: coordination::Error,
        path: String,
    },

    #[snafu(display("failed to write the update time to {path:?}"))]
    WriteUpdateTime {
        source: coordination::Error,
        path: String,
    },

    #[snafu(display("failed to persist the synchronized metadata of {cluster}"))]
    PersistMetadata { source: kube::Error, cluster: String },
}

/// Whether the metadata recorded in the status lags behind the configuration.
///
/// A cluster that is being deleted is never synchronized.
pub fn needs_sync(cluster: &BookkeeperCluster, config: &ClusterConfig) -> bool {
    if cluster.is_being_deleted() {
        return false;
    }
    let synchronized = cluster
        .status
        .as_ref()
        .map(|status| status.metadata.clone())
        .unwrap_or_default();
    synchronized != config.metadata()
}

/// Writes size and update time to ZooKeeper and records the new snapshot in the status.
///
/// Returns the cluster as stored afterwards.
pub async fn synchronize<C: Connector>(
    store: &impl ResourceStore,
    connector: &C,
    cluster: &BookkeeperCluster,
    config: &ClusterConfig,
    now: Timestamp,
) -> Result<BookkeeperCluster> {
    if !needs_sync(cluster, config) {
        debug!(cluster = %config.name, "metadata is in sync");
        return Ok(cluster.clone());
    }

    let desired: ClusterMetadata = config.metadata();
    info!(
        cluster = %config.name,
        size = desired.size,
        version = %config.bookkeeper_version,
        "synchronizing cluster metadata"
    );

    let client = MetadataClient::connect(connector, &config.zk_servers)
        .await
        .context(ConnectSnafu {
            cluster: &config.name,
        })?;

    let size_path = format!("{}/{SIZE_NODE}", config.zk_root_path);
    client
        .set_node_data(&size_path, config.replicas.to_string().as_bytes())
        .await
        .context(WriteSizeSnafu { path: &size_path })?;

    let update_time_path = format!("{}/{UPDATE_TIME_NODE}", config.zk_root_path);
    client
        .set_node_data(
            &update_time_path,
            now.as_millisecond().to_string().as_bytes(),
        )
        .await
        .context(WriteUpdateTimeSnafu {
            path: &update_time_path,
        })?;

    let mut updated = cluster.clone();
    updated.status.get_or_insert_with(Default::default).metadata = desired;
    store
        .update_status(&updated)
        .await
        .context(PersistMetadataSnafu {
            cluster: &config.name,
        })
}
