use k8s_openapi::{
    api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec},
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};

use super::{ObjectReconciler, Outcome, Result, reconcile_object};
use crate::{
    builder::meta::ObjectMetaBuilder,
    client::ResourceStore,
    crd::ClusterConfig,
    labels::{self, BOOKIE_COMPONENT, K8S_APP_VERSION_KEY},
};

/// Limits voluntary disruptions of the bookie pods to `maxUnavailableNodes` at a time.
///
/// Only fixed numbers are supported, no percentage.
pub struct PodDisruptionBudgetReconciler<'a> {
    config: &'a ClusterConfig,
}

impl<'a> PodDisruptionBudgetReconciler<'a> {
    pub fn new(config: &'a ClusterConfig) -> Self {
        Self { config }
    }

    fn max_unavailable(&self) -> IntOrString {
        IntOrString::Int(self.config.max_unavailable_nodes.into())
    }

    fn selector(&self) -> LabelSelector {
        LabelSelector {
            match_labels: Some(labels::selector_labels(&self.config.name, BOOKIE_COMPONENT)),
            ..LabelSelector::default()
        }
    }
}

impl ObjectReconciler for PodDisruptionBudgetReconciler<'_> {
    type Object = PodDisruptionBudget;

    fn name(&self) -> String {
        self.config.pod_disruption_budget_name()
    }

    fn build(&self) -> PodDisruptionBudget {
        PodDisruptionBudget {
            metadata: ObjectMetaBuilder::for_cluster(self.config, self.name(), BOOKIE_COMPONENT)
                .build(),
            spec: Some(PodDisruptionBudgetSpec {
                max_unavailable: Some(self.max_unavailable()),
                selector: Some(self.selector()),
                ..PodDisruptionBudgetSpec::default()
            }),
            status: None,
        }
    }

    fn needs_update(&self, existing: &PodDisruptionBudget) -> bool {
        let version = existing
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(K8S_APP_VERSION_KEY));
        let max_unavailable = existing
            .spec
            .as_ref()
            .and_then(|spec| spec.max_unavailable.as_ref());

        version != Some(&self.config.bookkeeper_version)
            || max_unavailable != Some(&self.max_unavailable())
    }

    fn apply(&self, mut existing: PodDisruptionBudget) -> PodDisruptionBudget {
        existing.metadata.labels = Some(labels::object_labels(self.config, BOOKIE_COMPONENT));
        let spec = existing.spec.get_or_insert_with(PodDisruptionBudgetSpec::default);
        spec.max_unavailable = Some(self.max_unavailable());
        spec.selector = Some(self.selector());
        existing
    }
}

pub async fn reconcile(store: &impl ResourceStore, config: &ClusterConfig) -> Result<Outcome> {
    reconcile_object(store, config, &PodDisruptionBudgetReconciler::new(config)).await
}
