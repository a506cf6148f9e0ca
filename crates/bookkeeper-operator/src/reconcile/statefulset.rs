use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy},
        core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, PodTemplateSpec},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};
use snafu::ResultExt;
use tracing::info;

use super::{CleanUpVolumeClaimsSnafu, ObjectReconciler, Outcome, Result, reconcile_object};
use crate::{
    builder::{
        meta::ObjectMetaBuilder,
        pod::{self, BOOKIE_CONTAINER_NAME, INDEX_VOLUME, JOURNAL_VOLUME, LEDGER_VOLUME},
    },
    client::ResourceStore,
    crd::{ClusterConfig, ClusterMetadata},
    labels::{self, BOOKIE_COMPONENT},
    volumes,
};

/// Pod template annotation carrying the fingerprint of the bookie configuration. Changing it
/// rolls the bookies onto the new configuration.
pub const CONFIG_FINGERPRINT_ANNOTATION: &str = "bookkeeper.monime.sl/config-fingerprint";

const PROMETHEUS_SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";
const PROMETHEUS_PORT_ANNOTATION: &str = "prometheus.io/port";

/// Runs the bookies.
///
/// Besides the replica count, drift is judged against the metadata last synchronized into the
/// cluster status rather than against the stored pod template, see [`ClusterMetadata`].
pub struct StatefulSetReconciler<'a> {
    config: &'a ClusterConfig,
    synchronized: &'a ClusterMetadata,
}

impl<'a> StatefulSetReconciler<'a> {
    pub fn new(config: &'a ClusterConfig, synchronized: &'a ClusterMetadata) -> Self {
        Self {
            config,
            synchronized,
        }
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        labels::selector_labels(&self.config.name, BOOKIE_COMPONENT)
    }

    fn pod_annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = self.config.pod.annotations.clone();
        if self.config.monitoring_enabled {
            annotations.insert(PROMETHEUS_SCRAPE_ANNOTATION.to_owned(), "true".to_owned());
            annotations.insert(
                PROMETHEUS_PORT_ANNOTATION.to_owned(),
                self.config.ports.metrics.to_string(),
            );
        }
        annotations.insert(
            CONFIG_FINGERPRINT_ANNOTATION.to_owned(),
            self.config.config_fingerprint.clone(),
        );
        annotations
    }

    fn volume_claim_template(
        &self,
        name: &str,
        spec: &PersistentVolumeClaimSpec,
    ) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                labels: Some(self.selector_labels()),
                annotations: Some(self.config.volumes.annotations.clone())
                    .filter(|annotations| !annotations.is_empty()),
                ..ObjectMeta::default()
            },
            spec: Some(spec.clone()),
            status: None,
        }
    }
}

impl ObjectReconciler for StatefulSetReconciler<'_> {
    type Object = StatefulSet;

    fn name(&self) -> String {
        self.config.statefulset_name()
    }

    fn build(&self) -> StatefulSet {
        let config = self.config;
        let volumes = &config.volumes;

        StatefulSet {
            metadata: ObjectMetaBuilder::for_cluster(config, self.name(), BOOKIE_COMPONENT)
                .with_annotations(config.annotations.clone())
                .build(),
            spec: Some(StatefulSetSpec {
                service_name: Some(config.headless_service_name()),
                replicas: Some(config.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..LabelSelector::default()
                },
                update_strategy: Some(StatefulSetUpdateStrategy {
                    type_: Some("RollingUpdate".to_owned()),
                    ..StatefulSetUpdateStrategy::default()
                }),
                pod_management_policy: Some("OrderedReady".to_owned()),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.selector_labels()),
                        annotations: Some(self.pod_annotations()),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(pod::pod_spec(config, vec![pod::bookie_container(config)])),
                },
                volume_claim_templates: Some(vec![
                    self.volume_claim_template(INDEX_VOLUME, &volumes.index),
                    self.volume_claim_template(LEDGER_VOLUME, &volumes.ledger),
                    self.volume_claim_template(JOURNAL_VOLUME, &volumes.journal),
                ]),
                ..StatefulSetSpec::default()
            }),
            status: None,
        }
    }

    fn needs_update(&self, existing: &StatefulSet) -> bool {
        let replicas = existing.spec.as_ref().and_then(|spec| spec.replicas);
        replicas != Some(self.config.replicas)
            || self.synchronized.bookkeeper_version.as_deref()
                != Some(self.config.bookkeeper_version.as_str())
            || self.synchronized.config_fingerprint.as_deref()
                != Some(self.config.config_fingerprint.as_str())
    }

    fn apply(&self, mut existing: StatefulSet) -> StatefulSet {
        info!(
            cluster = %self.config.name,
            replicas = self.config.replicas,
            version = %self.config.bookkeeper_version,
            "rolling out the bookie statefulset"
        );
        let spec = existing.spec.get_or_insert_with(StatefulSetSpec::default);
        spec.replicas = Some(self.config.replicas);

        let template = &mut spec.template;
        template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(
                CONFIG_FINGERPRINT_ANNOTATION.to_owned(),
                self.config.config_fingerprint.clone(),
            );
        if let Some(pod_spec) = template.spec.as_mut() {
            let desired = pod::bookie_container(self.config);
            for container in &mut pod_spec.containers {
                if container.name == BOOKIE_CONTAINER_NAME {
                    container.image.clone_from(&desired.image);
                    container.startup_probe.clone_from(&desired.startup_probe);
                    container.readiness_probe.clone_from(&desired.readiness_probe);
                    container.liveness_probe.clone_from(&desired.liveness_probe);
                }
            }
        }
        existing
    }
}

/// Reconciles the StatefulSet, then removes the claims of bookies that no longer exist.
///
/// The claim clean up runs on every pass, so a batch cut short by a failed delete is finished
/// later even when the StatefulSet itself is already up to date.
pub async fn reconcile(
    store: &impl ResourceStore,
    config: &ClusterConfig,
    synchronized: &ClusterMetadata,
) -> Result<Outcome> {
    let outcome =
        reconcile_object(store, config, &StatefulSetReconciler::new(config, synchronized)).await?;

    volumes::delete_idle_claims(
        store,
        &config.namespace,
        &labels::selector_labels(&config.name, BOOKIE_COMPONENT),
        config.replicas,
        config.volumes.reclaim_policy,
    )
    .await
    .context(CleanUpVolumeClaimsSnafu)?;

    Ok(outcome)
}
