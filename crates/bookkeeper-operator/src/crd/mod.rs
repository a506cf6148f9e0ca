//! The `BookkeeperCluster` custom resource and the names derived from it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, PersistentVolumeClaimSpec, ResourceRequirements, Toleration,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub mod config;
pub mod defaults;
pub mod status;

pub use config::ClusterConfig;
pub use status::*;

/// Parent znode under which every cluster keeps its metadata.
pub const ZK_METADATA_ROOT: &str = "/bookkeeper";

pub const CLIENT_PORT_NAME: &str = "tcp-client";
pub const ADMIN_PORT_NAME: &str = "http-admin";
pub const METRICS_PORT_NAME: &str = "http-metrics";

/// Desired state of a BookKeeper ensemble.
///
/// Every optional field is resolved against a [`defaults::DefaultConfig`] before a reconcile
/// pass touches any resource, see [`ClusterConfig::resolve`].
#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "bookkeeper.monime.sl",
    version = "v1alpha1",
    kind = "BookkeeperCluster",
    plural = "bookkeeperclusters",
    shortname = "bk",
    status = "BookkeeperClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Size", "type":"integer", "jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.bookkeeperVersion"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BookkeeperClusterSpec {
    /// The BookKeeper version, used as the image tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookkeeper_version: Option<String>,

    /// Policy for if/when to pull the bookie image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Number of bookies in the ensemble. Must be at least 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    /// Maximum number of bookies that may be voluntarily disrupted at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable_nodes: Option<u16>,

    /// ZooKeeper connect string in the format `hostname:port`.
    pub zk_servers: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directories: Option<Directories>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Ports>,

    /// Whether the auto recovery daemon runs. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_auto_recovery: Option<bool>,

    /// Replicas of the standalone auto recovery deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_recovery_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm_options: Option<JvmOptions>,

    /// Overrides for `bk_server.conf`. Keys are prefixed with `BK_` unless they already are.
    #[serde(default, rename = "bkConf")]
    pub bk_config: BTreeMap<String, String>,

    #[serde(default)]
    pub pod_config: PodConfig,

    #[serde(default)]
    pub monitoring_config: MonitoringConfig,

    /// Timing of the bookie container probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_config: Option<ProbeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<Persistence>,

    /// Labels attached to every object created for this cluster.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Annotations attached to the workload and service objects.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Kubernetes cluster domain, defaults to `cluster.local`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Directories {
    /// Comma separated list of index directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dirs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_dir: Option<String>,
    /// Comma separated list of ledger directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_dirs: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ports {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookie: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<i32>,
}

/// JVM options handed to the bookie start scripts.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_logging: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Vec<String>>,
}

/// Pod level settings shared by the bookie and auto recovery pods.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodConfig {
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Per probe overrides for the bookie container.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeConfig {
    /// The startup probe always waits the default initial delay and failure threshold, a bookie
    /// replays its journal before it answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<ProbeTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ProbeTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<ProbeTiming>,
}

/// Unset fields keep the operator's defaults.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<i32>,
}

/// Decides the fate of the bookie PVCs once they are no longer used by a replica.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumString,
    Eq,
    JsonSchema,
    PartialEq,
    Serialize,
)]
pub enum VolumeReclaimPolicy {
    /// Orphaned PVCs are deleted on scale down and on cluster deletion.
    #[default]
    Delete,
    /// Orphaned PVCs are left in place.
    Retain,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persistence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaim_policy: Option<VolumeReclaimPolicy>,
    /// Annotations attached to each volume claim template.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, rename = "journal", skip_serializing_if = "Option::is_none")]
    pub journal_volume_claim_spec: Option<PersistentVolumeClaimSpec>,
    #[serde(default, rename = "ledger", skip_serializing_if = "Option::is_none")]
    pub ledger_volume_claim_spec: Option<PersistentVolumeClaimSpec>,
    #[serde(default, rename = "index", skip_serializing_if = "Option::is_none")]
    pub index_volume_claim_spec: Option<PersistentVolumeClaimSpec>,
}

impl BookkeeperCluster {
    /// The znode holding everything this cluster stores in ZooKeeper.
    pub fn zk_root_path(&self) -> String {
        format!("{ZK_METADATA_ROOT}/{}", self.name_any())
    }

    pub fn zk_ledgers_root_path(&self) -> String {
        format!("{}/ledgers", self.zk_root_path())
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// The reclaim policy in effect, also for clusters whose spec no longer resolves.
    pub fn reclaim_policy(&self, default: VolumeReclaimPolicy) -> VolumeReclaimPolicy {
        self.spec
            .persistence
            .as_ref()
            .and_then(|persistence| persistence.reclaim_policy)
            .unwrap_or(default)
    }
}
