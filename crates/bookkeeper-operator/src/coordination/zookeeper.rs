//! [`CoordinationSession`] backed by a real ZooKeeper ensemble.

use async_trait::async_trait;
use zookeeper_client as zk;

use super::{Connector, CoordinationSession, Error, Result};

/// Connects to ZooKeeper with default session settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZooKeeperConnector;

pub struct ZooKeeperSession {
    client: zk::Client,
}

#[async_trait]
impl Connector for ZooKeeperConnector {
    type Session = ZooKeeperSession;

    async fn connect(&self, address: &str) -> Result<ZooKeeperSession> {
        let client = zk::Client::connect(address)
            .await
            .map_err(|source| Error::Connect {
                source: Box::new(source),
                address: address.to_owned(),
            })?;
        Ok(ZooKeeperSession { client })
    }
}

#[async_trait]
impl CoordinationSession for ZooKeeperSession {
    async fn get(&self, path: &str) -> Result<(Vec<u8>, i32)> {
        let (data, stat) = self
            .client
            .get_data(path)
            .await
            .map_err(|error| from_zk(path, error))?;
        Ok((data, stat.version))
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());
        self.client
            .create(path, data, &options)
            .await
            .map(|_| ())
            .map_err(|error| from_zk(path, error))
    }

    async fn set(&self, path: &str, data: &[u8], expected_version: i32) -> Result<()> {
        self.client
            .set_data(path, data, Some(expected_version))
            .await
            .map(|_| ())
            .map_err(|error| from_zk(path, error))
    }

    async fn delete(&self, path: &str, expected_version: i32) -> Result<()> {
        self.client
            .delete(path, Some(expected_version))
            .await
            .map_err(|error| from_zk(path, error))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.client
            .list_children(path)
            .await
            .map_err(|error| from_zk(path, error))
    }
}

/// Maps the ZooKeeper errors the operator branches on to their own variants.
fn from_zk(path: &str, error: zk::Error) -> Error {
    let path = path.to_owned();
    match error {
        zk::Error::NoNode => Error::NoNode { path },
        zk::Error::NodeExists => Error::NodeExists { path },
        zk::Error::NotEmpty => Error::NotEmpty { path },
        zk::Error::BadVersion => Error::BadVersion { path },
        other => Error::Transport {
            source: Box::new(other),
            path,
        },
    }
}
