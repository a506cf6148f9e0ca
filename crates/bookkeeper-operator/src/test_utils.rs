//! In-memory stand-ins for the orchestration API and ZooKeeper, plus fixtures.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{PersistentVolumeClaim, Pod, PodCondition, PodStatus},
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time},
};
use kube::{ResourceExt, core::Status};
use serde_json::Value;

use crate::{
    client::{NamespacedObject, ResourceStore},
    coordination::{self, CoordinationSession, Connector},
    crd::{BookkeeperCluster, BookkeeperClusterSpec, ClusterConfig, defaults::DefaultConfig},
    labels::{BOOKIE_COMPONENT, selector_labels},
};

pub const TEST_NAMESPACE: &str = "default";

pub fn test_cluster(name: &str, size: i32) -> BookkeeperCluster {
    let mut cluster = BookkeeperCluster::new(name, BookkeeperClusterSpec {
        size: Some(size),
        zk_servers: "zk-0.zk:2181".to_owned(),
        ..BookkeeperClusterSpec::default()
    });
    cluster.metadata.namespace = Some(TEST_NAMESPACE.to_owned());
    cluster.metadata.uid = Some(format!("{name}-uid"));
    cluster
}

pub fn test_config_of(cluster: &BookkeeperCluster) -> ClusterConfig {
    ClusterConfig::resolve(cluster, &DefaultConfig::default()).expect("test cluster resolves")
}

pub fn test_config(name: &str, size: i32) -> ClusterConfig {
    test_config_of(&test_cluster(name, size))
}

pub fn test_claim(name: &str, cluster_name: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(TEST_NAMESPACE.to_owned()),
            labels: Some(selector_labels(cluster_name, BOOKIE_COMPONENT)),
            ..ObjectMeta::default()
        },
        ..PersistentVolumeClaim::default()
    }
}

pub fn test_pod(name: &str, cluster_name: &str, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(TEST_NAMESPACE.to_owned()),
            labels: Some(selector_labels(cluster_name, BOOKIE_COMPONENT)),
            ..ObjectMeta::default()
        },
        spec: None,
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_owned(),
                status: if ready { "True" } else { "False" }.to_owned(),
                ..PodCondition::default()
            }]),
            ..PodStatus::default()
        }),
    }
}

pub fn time(secs: i64) -> Time {
    Time(jiff::Timestamp::from_second(secs).expect("valid timestamp"))
}

fn injected_failure() -> kube::Error {
    kube::Error::Service("injected failure".into())
}

fn conflict((kind, _, name): &ObjectKey) -> kube::Error {
    kube::Error::Api(
        Status::failure(
            &format!(
                "Operation cannot be fulfilled on {kind} {name:?}: the object has been modified"
            ),
            "Conflict",
        )
        .with_code(409)
        .boxed(),
    )
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    UpdateStatus,
    Delete,
    List,
}

type ObjectKey = (String, String, String);

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<ObjectKey, Value>,
    calls: Vec<(StoreOp, String)>,
    failures: BTreeSet<(StoreOp, String)>,
    next_resource_version: u64,
}

impl StoreState {
    /// Records the call and fails it if a failure was injected for the kind.
    fn call(&mut self, op: StoreOp, kind: &str) -> kube::Result<()> {
        self.calls.push((op, kind.to_owned()));
        if self.failures.contains(&(op, kind.to_owned())) {
            return Err(injected_failure());
        }
        Ok(())
    }

    fn bump_resource_version(&mut self, value: &mut Value) {
        self.next_resource_version += 1;
        value["metadata"]["resourceVersion"] =
            Value::String(self.next_resource_version.to_string());
    }
}

/// A [`ResourceStore`] keeping objects as JSON in memory.
///
/// Every call is counted, including calls that fail through [`Self::fail_on`].
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

fn key_of<T: NamespacedObject>(name: &str, namespace: &str) -> ObjectKey {
    (T::kind(&()).to_string(), namespace.to_owned(), name.to_owned())
}

fn object_key<T: NamespacedObject>(object: &T) -> ObjectKey {
    key_of::<T>(
        &object.name_any(),
        &object.namespace().unwrap_or_else(|| TEST_NAMESPACE.to_owned()),
    )
}

fn to_value<T: NamespacedObject>(object: &T) -> Value {
    serde_json::to_value(object).expect("object serializes")
}

fn from_value<T: NamespacedObject>(value: Value) -> kube::Result<T> {
    serde_json::from_value(value).map_err(kube::Error::SerdeError)
}

impl FakeStore {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store lock is not poisoned")
    }

    /// Stores the object without counting a write.
    pub fn insert<T: NamespacedObject>(&self, object: &T) {
        let mut state = self.lock();
        let mut value = to_value(object);
        state.bump_resource_version(&mut value);
        state.objects.insert(object_key(object), value);
    }

    pub fn stored<T: NamespacedObject>(&self, name: &str) -> Option<T> {
        let value = self
            .lock()
            .objects
            .get(&key_of::<T>(name, TEST_NAMESPACE))
            .cloned()?;
        Some(from_value(value).expect("stored object deserializes"))
    }

    /// Changes a stored object behind the operator's back.
    pub fn modify<T: NamespacedObject>(&self, name: &str, change: impl FnOnce(&mut T)) {
        let mut object: T = self.stored(name).expect("object to modify exists");
        change(&mut object);
        self.insert(&object);
    }

    pub fn fail_on(&self, op: StoreOp, kind: &str) {
        self.lock().failures.insert((op, kind.to_owned()));
    }

    pub fn count(&self, op: StoreOp) -> usize {
        self.lock().calls.iter().filter(|(call, _)| *call == op).count()
    }

    /// Every call that writes, of any kind.
    pub fn writes(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(op, _)| {
                matches!(
                    op,
                    StoreOp::Create | StoreOp::Update | StoreOp::UpdateStatus | StoreOp::Delete
                )
            })
            .count()
    }

    /// The kinds touched by writes, in call order.
    pub fn written_kinds(&self) -> Vec<(StoreOp, String)> {
        self.lock()
            .calls
            .iter()
            .filter(|(op, _)| !matches!(op, StoreOp::Get | StoreOp::List))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get_opt<T: NamespacedObject>(
        &self,
        name: &str,
        namespace: &str,
    ) -> kube::Result<Option<T>> {
        let mut state = self.lock();
        state.call(StoreOp::Get, &T::kind(&()))?;
        state
            .objects
            .get(&key_of::<T>(name, namespace))
            .cloned()
            .map(from_value)
            .transpose()
    }

    async fn create<T: NamespacedObject>(&self, object: &T) -> kube::Result<T> {
        let mut state = self.lock();
        state.call(StoreOp::Create, &T::kind(&()))?;
        let key = object_key(object);
        if state.objects.contains_key(&key) {
            return Err(kube::Error::Service(
                format!("{} {} already exists", key.0, key.2).into(),
            ));
        }
        let mut value = to_value(object);
        state.bump_resource_version(&mut value);
        state.objects.insert(key, value.clone());
        from_value(value)
    }

    async fn update<T: NamespacedObject>(&self, object: &T) -> kube::Result<T> {
        let mut state = self.lock();
        state.call(StoreOp::Update, &T::kind(&()))?;
        let key = object_key(object);
        let Some(stored) = state.objects.get(&key) else {
            return Err(kube::Error::Service(
                format!("{} {} does not exist", key.0, key.2).into(),
            ));
        };
        // A replace without a resource version is unconditional, as on a real API server
        if let Some(expected) = object.resource_version() {
            if stored["metadata"]["resourceVersion"].as_str() != Some(expected.as_str()) {
                return Err(conflict(&key));
            }
        }
        let mut value = to_value(object);
        state.bump_resource_version(&mut value);
        state.objects.insert(key, value.clone());
        from_value(value)
    }

    async fn update_status<T: NamespacedObject>(&self, object: &T) -> kube::Result<T> {
        let mut state = self.lock();
        state.call(StoreOp::UpdateStatus, &T::kind(&()))?;
        let key = object_key(object);
        let Some(mut stored) = state.objects.get(&key).cloned() else {
            return Err(kube::Error::Service(
                format!("{} {} does not exist", key.0, key.2).into(),
            ));
        };
        stored["status"] = to_value(object)
            .get("status")
            .cloned()
            .unwrap_or_default();
        state.bump_resource_version(&mut stored);
        state.objects.insert(key, stored.clone());
        from_value(stored)
    }

    async fn delete<T: NamespacedObject>(&self, name: &str, namespace: &str) -> kube::Result<()> {
        let mut state = self.lock();
        state.call(StoreOp::Delete, &T::kind(&()))?;
        state.objects.remove(&key_of::<T>(name, namespace));
        Ok(())
    }

    async fn list_with_labels<T: NamespacedObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> kube::Result<Vec<T>> {
        let mut state = self.lock();
        let kind = T::kind(&()).to_string();
        state.call(StoreOp::List, &kind)?;
        state
            .objects
            .iter()
            .filter(|((object_kind, object_namespace, _), _)| {
                *object_kind == kind && object_namespace == namespace
            })
            .map(|(_, value)| from_value::<T>(value.clone()))
            .filter(|object| {
                object.as_ref().map_or(true, |object| {
                    let object_labels = object.labels();
                    labels
                        .iter()
                        .all(|(key, value)| object_labels.get(key) == Some(value))
                })
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CoordinationOp {
    Connect,
    Get,
    Create,
    Set,
    Delete,
    Children,
}

#[derive(Default)]
struct CoordinationState {
    /// Data and version per path.
    nodes: BTreeMap<String, (Vec<u8>, i32)>,
    calls: Vec<(CoordinationOp, String)>,
    failures: BTreeSet<(CoordinationOp, String)>,
}

impl CoordinationState {
    fn call(&mut self, op: CoordinationOp, path: &str) -> coordination::Result<()> {
        self.calls.push((op, path.to_owned()));
        if self.failures.contains(&(op, path.to_owned())) {
            return Err(coordination::Error::Transport {
                source: "injected failure".into(),
                path: path.to_owned(),
            });
        }
        Ok(())
    }
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) | None => None,
        Some((parent, _)) => Some(parent),
    }
}

/// A versioned in-memory node tree. Clones share the tree, so a test keeps a handle while the
/// code under test owns a session.
#[derive(Clone, Default)]
pub struct FakeCoordination {
    state: Arc<Mutex<CoordinationState>>,
}

impl FakeCoordination {
    fn lock(&self) -> MutexGuard<'_, CoordinationState> {
        self.state.lock().expect("coordination lock is not poisoned")
    }

    /// Adds a node at version 0 without recording a call.
    pub fn insert(&self, path: &str, data: &[u8]) {
        self.lock().nodes.insert(path.to_owned(), (data.to_vec(), 0));
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().nodes.get(path).map(|(data, _)| data.clone())
    }

    pub fn version(&self, path: &str) -> Option<i32> {
        self.lock().nodes.get(path).map(|(_, version)| *version)
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().nodes.keys().cloned().collect()
    }

    /// Creates and sets of the node.
    pub fn writes(&self, path: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(op, called)| {
                matches!(op, CoordinationOp::Create | CoordinationOp::Set) && called == path
            })
            .count()
    }

    pub fn calls(&self) -> Vec<(CoordinationOp, String)> {
        self.lock().calls.clone()
    }

    /// Makes every `op` on `path` fail. For [`CoordinationOp::Connect`] the path is the connect
    /// string.
    pub fn fail_on(&self, op: CoordinationOp, path: &str) {
        self.lock().failures.insert((op, path.to_owned()));
    }
}

#[async_trait]
impl Connector for FakeCoordination {
    type Session = Self;

    async fn connect(&self, address: &str) -> coordination::Result<Self> {
        let mut state = self.lock();
        state.calls.push((CoordinationOp::Connect, address.to_owned()));
        if state
            .failures
            .contains(&(CoordinationOp::Connect, address.to_owned()))
        {
            return Err(coordination::Error::Connect {
                source: "injected failure".into(),
                address: address.to_owned(),
            });
        }
        Ok(self.clone())
    }
}

#[async_trait]
impl CoordinationSession for FakeCoordination {
    async fn get(&self, path: &str) -> coordination::Result<(Vec<u8>, i32)> {
        let mut state = self.lock();
        state.call(CoordinationOp::Get, path)?;
        state
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| coordination::Error::NoNode {
                path: path.to_owned(),
            })
    }

    async fn create(&self, path: &str, data: &[u8]) -> coordination::Result<()> {
        let mut state = self.lock();
        state.call(CoordinationOp::Create, path)?;
        if state.nodes.contains_key(path) {
            return Err(coordination::Error::NodeExists {
                path: path.to_owned(),
            });
        }
        if let Some(parent) = parent_of(path) {
            if !state.nodes.contains_key(parent) {
                return Err(coordination::Error::NoNode {
                    path: parent.to_owned(),
                });
            }
        }
        state.nodes.insert(path.to_owned(), (data.to_vec(), 0));
        Ok(())
    }

    async fn set(
        &self,
        path: &str,
        data: &[u8],
        expected_version: i32,
    ) -> coordination::Result<()> {
        let mut state = self.lock();
        state.call(CoordinationOp::Set, path)?;
        let Some((stored, version)) = state.nodes.get_mut(path) else {
            return Err(coordination::Error::NoNode {
                path: path.to_owned(),
            });
        };
        if *version != expected_version {
            return Err(coordination::Error::BadVersion {
                path: path.to_owned(),
            });
        }
        *stored = data.to_vec();
        *version += 1;
        Ok(())
    }

    async fn delete(&self, path: &str, expected_version: i32) -> coordination::Result<()> {
        let mut state = self.lock();
        state.call(CoordinationOp::Delete, path)?;
        let Some((_, version)) = state.nodes.get(path) else {
            return Err(coordination::Error::NoNode {
                path: path.to_owned(),
            });
        };
        if *version != expected_version {
            return Err(coordination::Error::BadVersion {
                path: path.to_owned(),
            });
        }
        let child_prefix = format!("{path}/");
        if state.nodes.keys().any(|node| node.starts_with(&child_prefix)) {
            return Err(coordination::Error::NotEmpty {
                path: path.to_owned(),
            });
        }
        state.nodes.remove(path);
        Ok(())
    }

    async fn children(&self, path: &str) -> coordination::Result<Vec<String>> {
        let mut state = self.lock();
        state.call(CoordinationOp::Children, path)?;
        if !state.nodes.contains_key(path) {
            return Err(coordination::Error::NoNode {
                path: path.to_owned(),
            });
        }
        let child_prefix = format!("{path}/");
        Ok(state
            .nodes
            .keys()
            .filter_map(|node| node.strip_prefix(&child_prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_owned)
            .collect())
    }
}
