//! A minimal client for the hierarchical, versioned node store (ZooKeeper) the bookies
//! coordinate through.
//!
//! [`CoordinationSession`] is the seam between the operator and the store, the production
//! backend lives in [`zookeeper`]. [`MetadataClient`] layers the operations the operator needs on
//! top: lazy ancestor creation, compare-and-set writes and recursive deletes.

use async_trait::async_trait;
use futures::{FutureExt, future::BoxFuture};
use snafu::Snafu;
use tracing::debug;

pub mod zookeeper;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("node {path:?} does not exist"))]
    NoNode { path: String },

    #[snafu(display("node {path:?} already exists"))]
    NodeExists { path: String },

    #[snafu(display("node {path:?} still has children"))]
    NotEmpty { path: String },

    #[snafu(display("node {path:?} was modified concurrently"))]
    BadVersion { path: String },

    #[snafu(display("failed to connect to the coordination service at {address:?}"))]
    Connect {
        source: BoxedError,
        address: String,
    },

    #[snafu(display("coordination request on {path:?} failed"))]
    Transport { source: BoxedError, path: String },
}

/// One session with the node store.
///
/// Versions are the store's data versions: [`Self::set`] and [`Self::delete`] only succeed if the
/// node still has the version the caller read.
#[async_trait]
pub trait CoordinationSession: Send + Sync {
    /// Returns the data and the current version of the node.
    async fn get(&self, path: &str) -> Result<(Vec<u8>, i32)>;

    /// Creates a persistent node. The parent must exist.
    async fn create(&self, path: &str, data: &[u8]) -> Result<()>;

    async fn set(&self, path: &str, data: &[u8], expected_version: i32) -> Result<()>;

    async fn delete(&self, path: &str, expected_version: i32) -> Result<()>;

    /// Names (not paths) of the direct children of the node.
    async fn children(&self, path: &str) -> Result<Vec<String>>;
}

/// Opens sessions against a connect string such as `zk-0.zk:2181,zk-1.zk:2181`.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: CoordinationSession;

    async fn connect(&self, address: &str) -> Result<Self::Session>;
}

pub struct MetadataClient<S> {
    session: S,
}

impl<S: CoordinationSession> MetadataClient<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub async fn connect<C>(connector: &C, address: &str) -> Result<Self>
    where
        C: Connector<Session = S>,
    {
        Ok(Self::new(connector.connect(address).await?))
    }

    /// Writes `data` to the node at `path`, creating it and any missing ancestor first.
    ///
    /// An existing node is updated with a compare-and-set against the version just read.
    pub async fn set_node_data(&self, path: &str, data: &[u8]) -> Result<()> {
        match self.session.get(path).await {
            Ok((_, version)) => self.session.set(path, data, version).await,
            Err(Error::NoNode { .. }) => self.create_node(path, data).await,
            Err(error) => Err(error),
        }
    }

    /// Creates every prefix of `path` in turn. Only the node itself receives `data`.
    async fn create_node(&self, path: &str, data: &[u8]) -> Result<()> {
        let prefixes = path_prefixes(path);
        let last = prefixes.len().saturating_sub(1);
        for (index, prefix) in prefixes.iter().enumerate() {
            let node_data: &[u8] = if index == last { data } else { &[] };
            match self.session.create(prefix, node_data).await {
                // Someone else created it in the meantime
                Ok(()) | Err(Error::NodeExists { .. }) => {}
                Err(error) => return Err(error),
            }
        }
        debug!(path, "created coordination node");
        Ok(())
    }

    /// Deletes the node at `path` together with everything below it. A missing node is not an
    /// error.
    pub fn delete_node<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let version = match self.session.get(path).await {
                Ok((_, version)) => version,
                Err(Error::NoNode { .. }) => return Ok(()),
                Err(error) => return Err(error),
            };
            match self.session.delete(path, version).await {
                Ok(()) | Err(Error::NoNode { .. }) => Ok(()),
                Err(Error::NotEmpty { .. }) => {
                    let children = match self.session.children(path).await {
                        Ok(children) => children,
                        Err(Error::NoNode { .. }) => return Ok(()),
                        Err(error) => return Err(error),
                    };
                    for child in children {
                        self.delete_node(&format!("{path}/{child}")).await?;
                    }
                    self.delete_node(path).await
                }
                Err(error) => Err(error),
            }
        }
        .boxed()
    }
}

/// `/a/b/c` yields `/a`, `/a/b` and `/a/b/c`.
fn path_prefixes(path: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}
