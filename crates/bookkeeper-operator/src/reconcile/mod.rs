//! One reconciler per managed object kind, all driven by [`reconcile_object`].
//!
//! Every reconciler looks its object up by a deterministic name. A missing object is built from
//! the [`ClusterConfig`] and created, an existing one is only written back when the kind
//! specific drift check says so.

use kube::Resource;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::{
    client::{NamespacedObject, ResourceStore},
    crd::ClusterConfig,
};

pub mod autorecovery;
pub mod configmap;
pub mod pdb;
pub mod service;
pub mod statefulset;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to get {kind} {namespace}/{name}"))]
    GetObject {
        source: kube::Error,
        kind: String,
        namespace: String,
        name: String,
    },

    #[snafu(display("failed to create {kind} {namespace}/{name}"))]
    CreateObject {
        source: kube::Error,
        kind: String,
        namespace: String,
        name: String,
    },

    #[snafu(display("failed to update {kind} {namespace}/{name}"))]
    UpdateObject {
        source: kube::Error,
        kind: String,
        namespace: String,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {namespace}/{name}"))]
    DeleteObject {
        source: kube::Error,
        kind: String,
        namespace: String,
        name: String,
    },

    #[snafu(display("failed to clean up the volume claims of removed bookies"))]
    CleanUpVolumeClaims { source: crate::volumes::Error },
}

/// What a reconciler did to its object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

/// The kind specific half of a reconciler.
pub trait ObjectReconciler {
    type Object: NamespacedObject;

    /// The deterministic name of the object.
    fn name(&self) -> String;

    /// The desired object, including owner reference and labels.
    fn build(&self) -> Self::Object;

    /// Whether the stored object drifted from the desired state.
    fn needs_update(&self, existing: &Self::Object) -> bool;

    /// Brings the stored object back to the desired state, keeping everything the operator does
    /// not own (resource version, platform defaults) intact.
    fn apply(&self, existing: Self::Object) -> Self::Object;
}

/// Fetches the object and creates, updates or leaves it as it is.
pub async fn reconcile_object<S, R>(
    store: &S,
    config: &ClusterConfig,
    reconciler: &R,
) -> Result<Outcome>
where
    S: ResourceStore,
    R: ObjectReconciler + Sync,
{
    let name = reconciler.name();
    let namespace = config.namespace.as_str();
    let kind = R::Object::kind(&()).to_string();

    let existing = store
        .get_opt::<R::Object>(&name, namespace)
        .await
        .with_context(|_| GetObjectSnafu {
            kind: kind.clone(),
            namespace,
            name: name.clone(),
        })?;

    match existing {
        None => {
            info!(cluster = %config.name, %kind, %name, "creating object");
            store
                .create(&reconciler.build())
                .await
                .with_context(|_| CreateObjectSnafu {
                    kind,
                    namespace,
                    name,
                })?;
            Ok(Outcome::Created)
        }
        Some(existing) if reconciler.needs_update(&existing) => {
            info!(cluster = %config.name, %kind, %name, "updating drifted object");
            store
                .update(&reconciler.apply(existing))
                .await
                .with_context(|_| UpdateObjectSnafu {
                    kind,
                    namespace,
                    name,
                })?;
            Ok(Outcome::Updated)
        }
        Some(_) => {
            debug!(cluster = %config.name, %kind, %name, "object is up to date");
            Ok(Outcome::Unchanged)
        }
    }
}
