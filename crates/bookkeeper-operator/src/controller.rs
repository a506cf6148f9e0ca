//! Drives one reconcile pass per [`BookkeeperCluster`] and wires it into the kube-runtime
//! controller.
//!
//! A pass runs its steps in a fixed order and stops at the first error. Nothing is rolled back,
//! every step is idempotent so the retry picks up where the failed pass stopped.

use std::{sync::Arc, time::Duration};

use const_format::concatcp;
use futures::StreamExt;
use jiff::Timestamp;
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, StatefulSet},
        core::v1::{ConfigMap, Service},
        policy::v1::PodDisruptionBudget,
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
use kube::runtime::{Controller, controller::Action, watcher};
use snafu::{ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};
use tracing::{debug, info};

use crate::{
    cli::WatchNamespace,
    client::{Client, ResourceStore},
    coordination::Connector,
    crd::{BookkeeperCluster, ClusterConfig, config, defaults::DefaultConfig},
    finalizer,
    labels::OPERATOR_NAME,
    logging::{ReconcilerError, report_controller_reconciled},
    metadata, reconcile, status,
};

pub const CONTROLLER_NAME: &str = "bookkeepercluster";
pub const FULL_CONTROLLER_NAME: &str = concatcp!(CONTROLLER_NAME, ".", OPERATOR_NAME);

/// Everything a pass needs besides the cluster itself.
pub struct Context<S, C> {
    pub store: S,
    pub connector: C,
    pub defaults: DefaultConfig,
    /// Requeue delay after a successful pass.
    pub resync_interval: Duration,
    /// Requeue delay after a failed pass.
    pub error_requeue: Duration,
}

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("invalid BookkeeperCluster"))]
    InvalidCluster { source: config::Error },

    #[snafu(display("failed to reconcile the PodDisruptionBudget"))]
    PodDisruptionBudget { source: reconcile::Error },

    #[snafu(display("failed to reconcile the ConfigMap"))]
    ConfigMap { source: reconcile::Error },

    #[snafu(display("failed to reconcile the Services"))]
    Services { source: reconcile::Error },

    #[snafu(display("failed to reconcile the StatefulSet"))]
    StatefulSet { source: reconcile::Error },

    #[snafu(display("failed to reconcile the auto recovery Deployment"))]
    AutoRecovery { source: reconcile::Error },

    #[snafu(display("failed to synchronize the cluster metadata"))]
    SynchronizeMetadata { source: metadata::Error },

    #[snafu(display("failed to update the cluster status"))]
    UpdateStatus { source: status::Error },

    #[snafu(display("failed to add the finalizer"))]
    AddFinalizer { source: finalizer::Error },

    #[snafu(display("failed to tear down the cluster"))]
    Teardown { source: finalizer::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}

/// One full pass over `cluster`, as of `now`.
pub async fn reconcile_cluster<S, C>(
    cluster: &BookkeeperCluster,
    ctx: &Context<S, C>,
    now: Timestamp,
) -> Result<Action>
where
    S: ResourceStore,
    C: Connector,
{
    let store = &ctx.store;

    if cluster.is_being_deleted() {
        finalizer::teardown(store, &ctx.connector, cluster, &ctx.defaults)
            .await
            .context(TeardownSnafu)?;
        return Ok(Action::await_change());
    }

    let config = ClusterConfig::resolve(cluster, &ctx.defaults).context(InvalidClusterSnafu)?;
    debug!(
        cluster = %config.name,
        namespace = %config.namespace,
        defaults = ctx.defaults.revision,
        "reconciling cluster"
    );

    reconcile::pdb::reconcile(store, &config)
        .await
        .context(PodDisruptionBudgetSnafu)?;
    reconcile::configmap::reconcile(store, &config)
        .await
        .context(ConfigMapSnafu)?;
    reconcile::service::reconcile(store, &config)
        .await
        .context(ServicesSnafu)?;

    let synchronized = cluster
        .status
        .as_ref()
        .map(|status| status.metadata.clone())
        .unwrap_or_default();
    reconcile::statefulset::reconcile(store, &config, &synchronized)
        .await
        .context(StatefulSetSnafu)?;
    reconcile::autorecovery::reconcile(store, &config)
        .await
        .context(AutoRecoverySnafu)?;

    let cluster = metadata::synchronize(store, &ctx.connector, cluster, &config, now)
        .await
        .context(SynchronizeMetadataSnafu)?;
    let cluster = status::reconcile(store, &cluster, &config, &Time(now))
        .await
        .context(UpdateStatusSnafu)?;

    finalizer::ensure_finalizer(store, &cluster)
        .await
        .context(AddFinalizerSnafu)?;

    Ok(Action::requeue(ctx.resync_interval))
}

async fn reconcile_bookkeeper<S, C>(
    cluster: Arc<BookkeeperCluster>,
    ctx: Arc<Context<S, C>>,
) -> Result<Action>
where
    S: ResourceStore,
    C: Connector,
{
    reconcile_cluster(&cluster, &ctx, Timestamp::now()).await
}

#[allow(clippy::needless_pass_by_value)]
fn error_policy<S, C>(
    _cluster: Arc<BookkeeperCluster>,
    _error: &Error,
    ctx: Arc<Context<S, C>>,
) -> Action {
    Action::requeue(ctx.error_requeue)
}

/// Watches every [`BookkeeperCluster`] in `watch_namespace` together with the objects it owns
/// and reconciles them until a termination signal arrives.
pub async fn run<C>(
    client: Client,
    watch_namespace: &WatchNamespace,
    connector: C,
    defaults: DefaultConfig,
    resync_interval: Duration,
    error_requeue: Duration,
) where
    C: Connector + 'static,
{
    let kube_client = client.as_kube_client();
    info!(
        controller = FULL_CONTROLLER_NAME,
        namespace = ?watch_namespace,
        defaults = defaults.revision,
        "starting controller"
    );

    let context = Arc::new(Context {
        store: client,
        connector,
        defaults,
        resync_interval,
        error_requeue,
    });

    Controller::new(
        watch_namespace.get_api::<BookkeeperCluster>(&kube_client),
        watcher::Config::default(),
    )
    .owns(
        watch_namespace.get_api::<PodDisruptionBudget>(&kube_client),
        watcher::Config::default(),
    )
    .owns(
        watch_namespace.get_api::<ConfigMap>(&kube_client),
        watcher::Config::default(),
    )
    .owns(
        watch_namespace.get_api::<Service>(&kube_client),
        watcher::Config::default(),
    )
    .owns(
        watch_namespace.get_api::<StatefulSet>(&kube_client),
        watcher::Config::default(),
    )
    .owns(
        watch_namespace.get_api::<Deployment>(&kube_client),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(reconcile_bookkeeper, error_policy, context)
    .for_each(|result| async move {
        report_controller_reconciled(FULL_CONTROLLER_NAME, &result);
    })
    .await;
}
