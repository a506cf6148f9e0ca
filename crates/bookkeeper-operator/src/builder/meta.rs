use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use crate::{crd::ClusterConfig, labels};

/// A builder to build [`ObjectMeta`] objects.
///
/// Note: This builder only supports a single `OwnerReference`.
///
/// Objects owned by a cluster should be started with [`Self::for_cluster()`], which sets the
/// namespace, the controller reference and the recommended labels in one go.
#[derive(Clone, Debug, Default)]
pub struct ObjectMetaBuilder {
    name: Option<String>,
    namespace: Option<String>,
    ownerreference: Option<OwnerReference>,
    labels: Option<BTreeMap<String, String>>,
    annotations: Option<BTreeMap<String, String>>,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for an object named `name` that belongs to `component` of the cluster.
    pub fn for_cluster(config: &ClusterConfig, name: impl Into<String>, component: &str) -> Self {
        let mut builder = Self::new();
        builder
            .name(name)
            .namespace(config.namespace.clone())
            .ownerreference(config.owner.clone())
            .with_labels(labels::object_labels(config, component));
        builder
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn ownerreference(&mut self, ownerreference: OwnerReference) -> &mut Self {
        self.ownerreference = Some(ownerreference);
        self
    }

    /// This adds multiple annotations to the existing annotations.
    pub fn with_annotations(&mut self, annotations: BTreeMap<String, String>) -> &mut Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
        self
    }

    /// This adds multiple labels to the existing labels.
    /// Any existing label with a key that is contained in `labels` will be overwritten
    pub fn with_labels(&mut self, labels: BTreeMap<String, String>) -> &mut Self {
        self.labels.get_or_insert_with(BTreeMap::new).extend(labels);
        self
    }

    pub fn build(&self) -> ObjectMeta {
        // Only set fields that were explicitly requested so the rendered objects stay minimal.
        ObjectMeta {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            owner_references: self
                .ownerreference
                .as_ref()
                .map(|ownerreference| vec![ownerreference.clone()]),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            ..ObjectMeta::default()
        }
    }
}
