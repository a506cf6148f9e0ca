//! Command line of the operator binary.

use std::time::Duration;

use clap::{Args, Parser};
use jiff::SignedDuration;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Resource};

use crate::logging::LogFormat;

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(
    name = "bookkeeper-operator",
    author,
    version,
    about = "Kubernetes operator for Apache BookKeeper clusters"
)]
pub struct Opts {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, clap::Subcommand)]
pub enum Command {
    /// Print the BookkeeperCluster CRD as YAML.
    Crd,

    /// Run the operator.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct RunArguments {
    /// Provides a specific namespace to watch (instead of watching all namespaces)
    #[arg(long, env, default_value = "")]
    pub watch_namespace: WatchNamespace,

    /// How long a converged cluster waits before it is reconciled again, e.g. `5m`
    #[arg(long, env, default_value = "5m")]
    pub resync_interval: SignedDuration,

    /// How long a cluster whose reconciliation failed waits before it is retried, e.g. `30s`
    #[arg(long, env, default_value = "30s")]
    pub error_requeue: SignedDuration,

    /// Field manager recorded for every write
    #[arg(long, env, default_value = crate::labels::OPERATOR_NAME)]
    pub field_manager: String,

    /// Output format of the operator's own logs
    #[arg(long, env, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl RunArguments {
    pub fn resync_interval(&self) -> Duration {
        self.resync_interval.unsigned_abs()
    }

    pub fn error_requeue(&self) -> Duration {
        self.error_requeue.unsigned_abs()
    }
}

/// The namespaces the operator watches.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum WatchNamespace {
    All,
    One(String),
}

impl From<&str> for WatchNamespace {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::All
        } else {
            Self::One(s.to_owned())
        }
    }
}

impl WatchNamespace {
    /// Gets an API object for the namespace in question or for all namespaces, depending on
    /// which variant we are.
    pub fn get_api<T>(&self, client: &kube::Client) -> Api<T>
    where
        T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match self {
            Self::All => Api::all(client.clone()),
            Self::One(namespace) => Api::namespaced(client.clone(), namespace),
        }
    }
}
