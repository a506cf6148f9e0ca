use k8s_openapi::api::core::v1::ConfigMap;

use super::{ObjectReconciler, Outcome, Result, reconcile_object};
use crate::{
    builder::meta::ObjectMetaBuilder,
    client::ResourceStore,
    crd::ClusterConfig,
    labels::{self, BOOKIE_COMPONENT},
};

/// Holds the bookie environment rendered into [`ClusterConfig::bookie_config`].
pub struct ConfigMapReconciler<'a> {
    config: &'a ClusterConfig,
}

impl<'a> ConfigMapReconciler<'a> {
    pub fn new(config: &'a ClusterConfig) -> Self {
        Self { config }
    }
}

impl ObjectReconciler for ConfigMapReconciler<'_> {
    type Object = ConfigMap;

    fn name(&self) -> String {
        self.config.config_map_name()
    }

    fn build(&self) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMetaBuilder::for_cluster(self.config, self.name(), BOOKIE_COMPONENT)
                .build(),
            data: Some(self.config.bookie_config.clone()),
            ..ConfigMap::default()
        }
    }

    fn needs_update(&self, existing: &ConfigMap) -> bool {
        existing.data.as_ref() != Some(&self.config.bookie_config)
    }

    fn apply(&self, mut existing: ConfigMap) -> ConfigMap {
        existing.metadata.labels = Some(labels::object_labels(self.config, BOOKIE_COMPONENT));
        existing.data = Some(self.config.bookie_config.clone());
        existing
    }
}

pub async fn reconcile(store: &impl ResourceStore, config: &ClusterConfig) -> Result<Outcome> {
    reconcile_object(store, config, &ConfigMapReconciler::new(config)).await
}
