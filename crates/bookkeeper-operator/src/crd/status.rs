use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Observed state of a [`super::BookkeeperCluster`]. Only the operator writes it.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookkeeperClusterStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,

    /// Desired number of bookies.
    #[serde(default)]
    pub replicas: i32,

    /// Bookie pods observed in the last pass.
    #[serde(default)]
    pub current_replicas: i32,

    /// Bookie pods whose `Ready` condition is true.
    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub members: Membership,

    /// The cluster state last pushed to ZooKeeper.
    #[serde(default)]
    pub metadata: ClusterMetadata,
}

/// Names of the bookie pods, split by readiness.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct Membership {
    #[serde(default)]
    pub ready: Vec<String>,
    #[serde(default)]
    pub unready: Vec<String>,
}

/// Snapshot of the values last synchronized into ZooKeeper.
///
/// This is the only part of the status compared against the spec when deciding whether the
/// workload or the coordination metadata need to change.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    #[serde(default)]
    pub size: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookkeeper_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_fingerprint: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: ClusterConditionType,
    /// Status of the condition, one of True, False, Unknown.
    pub status: ClusterConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// The reason for the condition's last transition.
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// A human readable message indicating details about the transition.
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// The last time this condition was updated.
    pub last_update_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: Option<Time>,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumIter,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterConditionType {
    /// The cluster is being brought up.
    Preparing,
    /// Every desired bookie reports ready.
    #[default]
    Ready,
    /// The last pass failed.
    Error,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterConditionStatus {
    /// True means a resource is in the condition.
    True,
    /// False means a resource is not in the condition.
    False,
    /// Unknown means kubernetes cannot decide if a resource is in the condition or not.
    #[default]
    Unknown,
}

impl From<bool> for ClusterConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl BookkeeperClusterStatus {
    pub fn condition(&self, type_: ClusterConditionType) -> Option<&ClusterCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
