use std::collections::BTreeMap;

use const_format::concatcp;

use crate::crd::ClusterConfig;

/// The well-known Kubernetes app key prefix.
const K8S_APP_KEY_PREFIX: &str = "app.kubernetes.io/";

/// The well-known Kubernetes app name key `app.kubernetes.io/name`.
pub const K8S_APP_NAME_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "name");

/// The well-known Kubernetes app instance key `app.kubernetes.io/instance`. Holds the cluster
/// name.
pub const K8S_APP_INSTANCE_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "instance");

/// The well-known Kubernetes app version key `app.kubernetes.io/version`. Only object metadata
/// carries it, never a selector, so that a version bump does not orphan running pods.
pub const K8S_APP_VERSION_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "version");

/// The well-known Kubernetes app component key `app.kubernetes.io/component`.
pub const K8S_APP_COMPONENT_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "component");

/// The well-known Kubernetes app managed-by key `app.kubernetes.io/managed-by`.
pub const K8S_APP_MANAGED_BY_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "managed-by");

pub const APP_NAME: &str = "bookkeeper";
pub const OPERATOR_NAME: &str = "bookkeeper-operator";

pub const BOOKIE_COMPONENT: &str = "bookie";
pub const AUTO_RECOVERY_COMPONENT: &str = "bookkeeper-autorecovery";

/// Labels identifying the pods of one component of a cluster.
///
/// Used for workload selectors, pod templates and claim templates alike, which keeps the
/// StatefulSet selector equal to its pod template labels.
pub fn selector_labels(cluster_name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_APP_NAME_KEY.to_owned(), APP_NAME.to_owned()),
        (K8S_APP_INSTANCE_KEY.to_owned(), cluster_name.to_owned()),
        (K8S_APP_COMPONENT_KEY.to_owned(), component.to_owned()),
        (K8S_APP_MANAGED_BY_KEY.to_owned(), OPERATOR_NAME.to_owned()),
    ])
}

/// Labels attached to the metadata of every managed object.
///
/// User supplied labels are applied first so they can never shadow the recommended ones.
pub fn object_labels(config: &ClusterConfig, component: &str) -> BTreeMap<String, String> {
    let mut labels = config.labels.clone();
    labels.extend(selector_labels(&config.name, component));
    labels.insert(
        K8S_APP_VERSION_KEY.to_owned(),
        config.bookkeeper_version.clone(),
    );
    labels
}

/// Renders labels as a Kubernetes label selector, e.g. `a=b,c=d`.
pub fn to_selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
