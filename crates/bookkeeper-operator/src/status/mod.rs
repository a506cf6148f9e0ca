//! Aggregates the observed bookie pods into the cluster status.

use k8s_openapi::{api::core::v1::Pod, apimachinery::pkg::apis::meta::v1::Time};
use kube::ResourceExt;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::{
    client::ResourceStore,
    crd::{
        BookkeeperCluster, BookkeeperClusterStatus, ClusterCondition, ClusterConditionStatus,
        ClusterConditionType, ClusterConfig, Membership,
    },
    labels::{self, BOOKIE_COMPONENT},
};

pub mod condition;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to list the bookie pods of {cluster}"))]
    ListPods { source: kube::Error, cluster: String },

    #[snafu(display("failed to update the status of {cluster}"))]
    UpdateStatus { source: kube::Error, cluster: String },
}

/// Whether the pod reports the `Ready` condition as true.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        })
}

/// The status the cluster should have given the observed `pods`.
///
/// Membership and counters are recomputed from scratch, conditions are upserted into the stored
/// ones and the synchronized metadata is carried over unchanged.
pub fn compute_status(
    current: Option<&BookkeeperClusterStatus>,
    desired_replicas: i32,
    pods: &[Pod],
    now: &Time,
) -> BookkeeperClusterStatus {
    let mut status = current.cloned().unwrap_or_default();
    if status.conditions.is_empty() {
        status.conditions = condition::initial_conditions(now);
    }

    let (ready, unready): (Vec<&Pod>, Vec<&Pod>) = pods.iter().partition(|pod| is_pod_ready(pod));
    status.members = Membership {
        ready: ready.iter().map(|pod| pod.name_any()).collect(),
        unready: unready.iter().map(|pod| pod.name_any()).collect(),
    };

    let ready_replicas = i32::try_from(ready.len()).unwrap_or(i32::MAX);
    status.replicas = desired_replicas;
    status.current_replicas = i32::try_from(pods.len()).unwrap_or(i32::MAX);
    status.ready_replicas = ready_replicas;

    let all_ready = ready_replicas == desired_replicas;
    condition::upsert(
        &mut status.conditions,
        ClusterCondition {
            type_: ClusterConditionType::Ready,
            status: ClusterConditionStatus::from(all_ready),
            reason: Some(if all_ready { "ClusterReady" } else { "ClusterNotReady" }.to_owned()),
            message: Some(format!(
                "{ready_replicas} of {desired_replicas} bookies are ready"
            )),
            ..ClusterCondition::default()
        },
        now,
    );
    status
}

/// Recomputes the status and writes it if it differs from the stored one.
///
/// Returns the cluster as stored afterwards.
pub async fn reconcile(
    store: &impl ResourceStore,
    cluster: &BookkeeperCluster,
    config: &ClusterConfig,
    now: &Time,
) -> Result<BookkeeperCluster> {
    let pods: Vec<Pod> = store
        .list_with_labels(
            &config.namespace,
            &labels::selector_labels(&config.name, BOOKIE_COMPONENT),
        )
        .await
        .context(ListPodsSnafu {
            cluster: &config.name,
        })?;

    let status = compute_status(cluster.status.as_ref(), config.replicas, &pods, now);
    if cluster.status.as_ref() == Some(&status) {
        debug!(cluster = %config.name, "status is up to date");
        return Ok(cluster.clone());
    }

    info!(
        cluster = %config.name,
        ready = status.ready_replicas,
        desired = status.replicas,
        "updating cluster status"
    );
    let mut updated = cluster.clone();
    updated.status = Some(status);
    store.update_status(&updated).await.context(UpdateStatusSnafu {
        cluster: &config.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeStore, StoreOp, test_cluster, test_config_of, test_pod, time};

    fn pods(ready: usize, unready: usize) -> Vec<Pod> {
        (0..ready + unready)
            .map(|ordinal| test_pod(&format!("bk-{ordinal}"), "bk", ordinal < ready))
            .collect()
    }

    #[test]
    fn all_ready_cluster_is_ready() {
        let status = compute_status(None, 3, &pods(3, 0), &time(5));

        assert_eq!(status.members.ready, vec!["bk-0", "bk-1", "bk-2"]);
        assert!(status.members.unready.is_empty());
        assert_eq!(status.ready_replicas, 3);
        let ready = status
            .condition(ClusterConditionType::Ready)
            .expect("ready condition");
        assert_eq!(ready.status, ClusterConditionStatus::True);
        assert_eq!(ready.last_transition_time, Some(time(5)));
        assert_eq!(
            status
                .condition(ClusterConditionType::Error)
                .map(|c| c.status),
            Some(ClusterConditionStatus::False)
        );
    }

    #[test]
    fn partially_ready_cluster_is_not_ready() {
        let status = compute_status(None, 3, &pods(1, 2), &time(5));

        assert_eq!(status.members.ready, vec!["bk-0"]);
        assert_eq!(status.members.unready, vec!["bk-1", "bk-2"]);
        assert_eq!(status.current_replicas, 3);
        assert_eq!(
            status
                .condition(ClusterConditionType::Ready)
                .map(|c| c.status),
            Some(ClusterConditionStatus::False)
        );
    }

    #[test]
    fn membership_is_replaced_every_pass() {
        let first = compute_status(None, 3, &pods(3, 0), &time(5));

        let second = compute_status(Some(&first), 3, &pods(2, 0), &time(6));

        assert_eq!(second.members.ready, vec!["bk-0", "bk-1"]);
        let ready = second
            .condition(ClusterConditionType::Ready)
            .expect("ready condition");
        assert_eq!(ready.status, ClusterConditionStatus::False);
        assert_eq!(ready.last_transition_time, Some(time(6)));
    }

    #[test]
    fn synchronized_metadata_is_carried_over() {
        let mut current = compute_status(None, 3, &pods(3, 0), &time(5));
        current.metadata.size = 3;

        let next = compute_status(Some(&current), 3, &pods(3, 0), &time(6));

        assert_eq!(next, current);
    }

    #[tokio::test]
    async fn status_is_only_written_when_it_changes() {
        let store = FakeStore::default();
        let cluster = test_cluster("bk", 3);
        store.insert(&cluster);
        for pod in pods(3, 0) {
            store.insert(&pod);
        }
        let config = test_config_of(&cluster);

        let cluster = reconcile(&store, &cluster, &config, &time(5))
            .await
            .expect("first write");
        let cluster = reconcile(&store, &cluster, &config, &time(6))
            .await
            .expect("no-op");

        assert_eq!(store.count(StoreOp::UpdateStatus), 1);
        assert_eq!(cluster.status.expect("status").ready_replicas, 3);
    }
}
