use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::PodTemplateSpec,
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};
use kube::Resource;
use snafu::ResultExt;
use tracing::info;

use super::{DeleteObjectSnafu, GetObjectSnafu, ObjectReconciler, Outcome, Result, reconcile_object};
use crate::{
    builder::{meta::ObjectMetaBuilder, pod},
    client::ResourceStore,
    crd::ClusterConfig,
    labels::{self, AUTO_RECOVERY_COMPONENT},
};

/// Runs the auto recovery daemon, which re-replicates the ledgers of lost bookies.
pub struct AutoRecoveryReconciler<'a> {
    config: &'a ClusterConfig,
}

impl<'a> AutoRecoveryReconciler<'a> {
    pub fn new(config: &'a ClusterConfig) -> Self {
        Self { config }
    }
}

impl ObjectReconciler for AutoRecoveryReconciler<'_> {
    type Object = Deployment;

    fn name(&self) -> String {
        self.config.auto_recovery_deployment_name()
    }

    fn build(&self) -> Deployment {
        let config = self.config;
        let selector = labels::selector_labels(&config.name, AUTO_RECOVERY_COMPONENT);

        Deployment {
            metadata: ObjectMetaBuilder::for_cluster(config, self.name(), AUTO_RECOVERY_COMPONENT)
                .with_annotations(config.annotations.clone())
                .build(),
            spec: Some(DeploymentSpec {
                replicas: Some(config.auto_recovery_replicas),
                selector: LabelSelector {
                    match_labels: Some(selector.clone()),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector),
                        annotations: Some(config.pod.annotations.clone())
                            .filter(|annotations| !annotations.is_empty()),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(pod::pod_spec(config, vec![pod::auto_recovery_container(
                        config,
                    )])),
                },
                ..DeploymentSpec::default()
            }),
            status: None,
        }
    }

    fn needs_update(&self, existing: &Deployment) -> bool {
        existing.spec.as_ref().and_then(|spec| spec.replicas)
            != Some(self.config.auto_recovery_replicas)
    }

    fn apply(&self, mut existing: Deployment) -> Deployment {
        existing
            .spec
            .get_or_insert_with(DeploymentSpec::default)
            .replicas = Some(self.config.auto_recovery_replicas);
        existing
    }
}

/// Keeps the Deployment in place while auto recovery is enabled and removes it otherwise.
pub async fn reconcile(store: &impl ResourceStore, config: &ClusterConfig) -> Result<Outcome> {
    let reconciler = AutoRecoveryReconciler::new(config);
    if config.enable_auto_recovery {
        return reconcile_object(store, config, &reconciler).await;
    }

    let name = reconciler.name();
    let namespace = config.namespace.as_str();
    let kind = Deployment::kind(&()).to_string();
    let existing = store
        .get_opt::<Deployment>(&name, namespace)
        .await
        .with_context(|_| GetObjectSnafu {
            kind: kind.clone(),
            namespace,
            name: name.clone(),
        })?;
    if existing.is_none() {
        return Ok(Outcome::Unchanged);
    }

    info!(cluster = %config.name, %name, "auto recovery is disabled, deleting its deployment");
    store
        .delete::<Deployment>(&name, namespace)
        .await
        .with_context(|_| DeleteObjectSnafu {
            kind,
            namespace,
            name: name.clone(),
        })?;
    Ok(Outcome::Deleted)
}
