use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    Api, Resource, ResourceExt,
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    client::Client as KubeClient,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::trace;

use crate::labels::to_selector_string;

/// Everything the operator reads or writes through a [`ResourceStore`].
pub trait NamespacedObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<T> NamespacedObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

/// Access to the orchestration API, as far as a reconcile pass needs it.
///
/// Not-found is a regular outcome (`Ok(None)` from [`Self::get_opt`]), every other failure is
/// returned unchanged to the caller.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_opt<T: NamespacedObject>(
        &self,
        name: &str,
        namespace: &str,
    ) -> kube::Result<Option<T>>;

    async fn create<T: NamespacedObject>(&self, object: &T) -> kube::Result<T>;

    /// Replaces the object. The stored resource version must still match.
    async fn update<T: NamespacedObject>(&self, object: &T) -> kube::Result<T>;

    /// Writes the status subresource of `object` and returns the stored object.
    async fn update_status<T: NamespacedObject>(&self, object: &T) -> kube::Result<T>;

    /// Deletes the object. Deleting an object that is already gone succeeds.
    async fn delete<T: NamespacedObject>(&self, name: &str, namespace: &str) -> kube::Result<()>;

    async fn list_with_labels<T: NamespacedObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> kube::Result<Vec<T>>;
}

/// The [`ResourceStore`] the operator runs against, backed by a [`kube::Client`].
///
/// Every create, replace and status patch is recorded under the configured field manager.
#[derive(Clone)]
pub struct Client {
    client: KubeClient,
    post_params: PostParams,
    patch_params: PatchParams,
    delete_params: DeleteParams,
}

impl Client {
    pub fn new(client: KubeClient, field_manager: Option<String>) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager: field_manager.clone(),
                ..PostParams::default()
            },
            patch_params: PatchParams {
                field_manager,
                ..PatchParams::default()
            },
            delete_params: DeleteParams::default(),
        }
    }

    /// The wrapped [`kube::Client`], for the watches of the controller runtime.
    pub fn as_kube_client(&self) -> KubeClient {
        self.client.clone()
    }

    pub fn get_namespaced_api<T>(&self, namespace: &str) -> Api<T>
    where
        T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn api_for<T: NamespacedObject>(&self, object: &T) -> Api<T> {
        match object.namespace() {
            Some(namespace) => self.get_namespaced_api(&namespace),
            None => Api::default_namespaced(self.client.clone()),
        }
    }
}

#[async_trait]
impl ResourceStore for Client {
    async fn get_opt<T: NamespacedObject>(
        &self,
        name: &str,
        namespace: &str,
    ) -> kube::Result<Option<T>> {
        self.get_namespaced_api(namespace).get_opt(name).await
    }

    async fn create<T: NamespacedObject>(&self, object: &T) -> kube::Result<T> {
        trace!(kind = %T::kind(&()), name = %object.name_any(), "creating object");
        self.api_for(object).create(&self.post_params, object).await
    }

    async fn update<T: NamespacedObject>(&self, object: &T) -> kube::Result<T> {
        trace!(kind = %T::kind(&()), name = %object.name_any(), "replacing object");
        self.api_for(object)
            .replace(&object.name_any(), &self.post_params, object)
            .await
    }

    async fn update_status<T: NamespacedObject>(&self, object: &T) -> kube::Result<T> {
        let status = serde_json::to_value(object)
            .map_err(kube::Error::SerdeError)?
            .get("status")
            .cloned()
            .unwrap_or_default();
        self.api_for(object)
            .patch_status(
                &object.name_any(),
                &self.patch_params,
                &Patch::Merge(json!({ "status": status })),
            )
            .await
    }

    async fn delete<T: NamespacedObject>(&self, name: &str, namespace: &str) -> kube::Result<()> {
        let api: Api<T> = self.get_namespaced_api(namespace);
        match api.delete(name, &self.delete_params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(error)) if error.code == 404 => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn list_with_labels<T: NamespacedObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> kube::Result<Vec<T>> {
        let params = ListParams::default().labels(&to_selector_string(labels));
        Ok(self.get_namespaced_api(namespace).list(&params).await?.items)
    }
}
