//! Resolution of a [`BookkeeperCluster`] into the fully defaulted [`ClusterConfig`] every
//! reconciler works from.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::PersistentVolumeClaimSpec,
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use snafu::{OptionExt, Snafu, ensure};
use tracing::warn;

use super::{
    BookkeeperCluster, ClusterMetadata, PodConfig, ProbeConfig, ProbeTiming, VolumeReclaimPolicy,
    defaults::DefaultConfig,
};

/// Prefix the bookie start scripts use to pick settings out of the environment.
pub const BOOKIE_CONFIG_PREFIX: &str = "BK_";

/// Keys the operator derives itself. User overrides for them are dropped.
pub const RESERVED_CONFIG_KEYS: &[&str] = &[
    "BK_zkServers",
    "BK_zkLedgersRootPath",
    "BK_httpServerEnabled",
    "BK_httpServerPort",
    "BK_enableStatistics",
    "BK_BOOKIE_PORT",
    "BK_BOOKIE_GC_OPTS",
    "BK_BOOKIE_MEM_OPTS",
    "BK_BOOKIE_EXTRA_OPTS",
    "BK_BOOKIE_GC_LOGGING_OPTS",
    "BK_journalDirectories",
    "BK_ledgerDirectories",
    "BK_indexDirectories",
];

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("cluster size must be at least 1, got {size}"))]
    InvalidSize { size: i32 },

    #[snafu(display("the ZooKeeper connect string (zkServers) must not be empty"))]
    MissingZkServers,

    #[snafu(display("the cluster object has no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("the cluster object has no uid, it cannot own other objects"))]
    ObjectHasNoUid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BookieDirectories {
    pub journal_dir: String,
    pub ledger_dirs: String,
    pub index_dirs: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BookiePorts {
    pub bookie: i32,
    pub admin: i32,
    pub metrics: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VolumeClaims {
    pub reclaim_policy: VolumeReclaimPolicy,
    pub annotations: BTreeMap<String, String>,
    pub journal: PersistentVolumeClaimSpec,
    pub ledger: PersistentVolumeClaimSpec,
    pub index: PersistentVolumeClaimSpec,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProbeSettings {
    pub initial_delay_seconds: i32,
    pub failure_threshold: i32,
    /// `None` leaves the Kubernetes default in place.
    pub timeout_seconds: Option<i32>,
    pub period_seconds: Option<i32>,
    pub success_threshold: Option<i32>,
}

impl ProbeSettings {
    fn from_defaults(defaults: &DefaultConfig) -> Self {
        Self {
            initial_delay_seconds: defaults.probe_initial_delay_seconds,
            failure_threshold: defaults.probe_failure_threshold,
            timeout_seconds: None,
            period_seconds: None,
            success_threshold: None,
        }
    }

    /// Applies every field the user set in `timing`.
    fn merged(self, timing: Option<&ProbeTiming>) -> Self {
        let Some(timing) = timing else {
            return self;
        };
        Self {
            initial_delay_seconds: timing
                .initial_delay_seconds
                .unwrap_or(self.initial_delay_seconds),
            failure_threshold: timing.failure_threshold.unwrap_or(self.failure_threshold),
            timeout_seconds: timing.timeout_seconds.or(self.timeout_seconds),
            period_seconds: timing.period_seconds.or(self.period_seconds),
            success_threshold: timing.success_threshold.or(self.success_threshold),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BookieProbes {
    pub startup: ProbeSettings,
    pub readiness: ProbeSettings,
    pub liveness: ProbeSettings,
}

impl BookieProbes {
    fn resolve(probes: Option<&ProbeConfig>, defaults: &DefaultConfig) -> Self {
        let base = ProbeSettings::from_defaults(defaults);
        let startup = base.merged(probes.and_then(|probes| probes.startup.as_ref()));
        Self {
            startup: ProbeSettings {
                initial_delay_seconds: base.initial_delay_seconds,
                failure_threshold: base.failure_threshold,
                ..startup
            },
            readiness: base.merged(probes.and_then(|probes| probes.readiness.as_ref())),
            liveness: base.merged(probes.and_then(|probes| probes.liveness.as_ref())),
        }
    }
}

/// A [`BookkeeperCluster`] with every default applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterConfig {
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,

    pub replicas: i32,
    pub bookkeeper_version: String,
    pub image: String,
    pub image_pull_policy: String,
    pub max_unavailable_nodes: u16,
    pub zk_servers: String,
    pub zk_root_path: String,
    pub zk_ledgers_root_path: String,

    pub directories: BookieDirectories,
    pub ports: BookiePorts,
    pub enable_auto_recovery: bool,
    pub auto_recovery_replicas: i32,

    pub pod: PodConfig,
    pub termination_grace_period_seconds: i64,
    pub monitoring_enabled: bool,
    pub probes: BookieProbes,
    pub volumes: VolumeClaims,

    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub cluster_domain: String,

    /// The environment handed to every bookie through the ConfigMap.
    pub bookie_config: BTreeMap<String, String>,
    /// SHA-256 over [`Self::bookie_config`].
    pub config_fingerprint: String,
}

impl ClusterConfig {
    pub fn resolve(cluster: &BookkeeperCluster, defaults: &DefaultConfig) -> Result<Self> {
        let spec = &cluster.spec;

        let replicas = spec.size.unwrap_or(defaults.size);
        ensure!(replicas >= 1, InvalidSizeSnafu { size: replicas });
        ensure!(!spec.zk_servers.trim().is_empty(), MissingZkServersSnafu);

        let namespace = cluster.namespace().context(ObjectHasNoNamespaceSnafu)?;
        let owner = cluster.controller_owner_ref(&()).context(ObjectHasNoUidSnafu)?;

        let bookkeeper_version = spec
            .bookkeeper_version
            .clone()
            .unwrap_or_else(|| defaults.bookkeeper_version.clone());

        let directories = spec.directories.clone().unwrap_or_default();
        let ports = spec.ports.clone().unwrap_or_default();
        let persistence = spec.persistence.clone().unwrap_or_default();
        let jvm = spec.jvm_options.clone().unwrap_or_default();

        let mut config = Self {
            name: cluster.name_any(),
            namespace,
            owner,
            replicas,
            image: format!("{}:{bookkeeper_version}", defaults.image_repository),
            bookkeeper_version,
            image_pull_policy: spec
                .image_pull_policy
                .clone()
                .unwrap_or_else(|| defaults.image_pull_policy.clone()),
            max_unavailable_nodes: spec
                .max_unavailable_nodes
                .unwrap_or(defaults.max_unavailable_nodes),
            zk_servers: spec.zk_servers.clone(),
            zk_root_path: cluster.zk_root_path(),
            zk_ledgers_root_path: cluster.zk_ledgers_root_path(),
            directories: BookieDirectories {
                journal_dir: directories
                    .journal_dir
                    .unwrap_or_else(|| defaults.journal_dir.clone()),
                ledger_dirs: directories
                    .ledger_dirs
                    .unwrap_or_else(|| defaults.ledger_dirs.clone()),
                index_dirs: directories
                    .index_dirs
                    .unwrap_or_else(|| defaults.index_dirs.clone()),
            },
            ports: BookiePorts {
                bookie: ports.bookie.unwrap_or(defaults.bookie_port),
                admin: ports.admin.unwrap_or(defaults.admin_port),
                metrics: ports.metrics.unwrap_or(defaults.metrics_port),
            },
            enable_auto_recovery: spec
                .enable_auto_recovery
                .unwrap_or(defaults.enable_auto_recovery),
            auto_recovery_replicas: spec
                .auto_recovery_replicas
                .unwrap_or(defaults.auto_recovery_replicas),
            termination_grace_period_seconds: spec
                .pod_config
                .termination_grace_period_seconds
                .unwrap_or(defaults.termination_grace_period_seconds),
            pod: spec.pod_config.clone(),
            monitoring_enabled: spec.monitoring_config.enabled,
            probes: BookieProbes::resolve(spec.probe_config.as_ref(), defaults),
            volumes: VolumeClaims {
                reclaim_policy: persistence
                    .reclaim_policy
                    .unwrap_or(defaults.reclaim_policy),
                annotations: persistence.annotations,
                journal: persistence
                    .journal_volume_claim_spec
                    .unwrap_or_else(|| defaults.volume_claim_spec()),
                ledger: persistence
                    .ledger_volume_claim_spec
                    .unwrap_or_else(|| defaults.volume_claim_spec()),
                index: persistence
                    .index_volume_claim_spec
                    .unwrap_or_else(|| defaults.volume_claim_spec()),
            },
            labels: spec.labels.clone(),
            annotations: spec.annotations.clone(),
            cluster_domain: spec
                .cluster_domain
                .clone()
                .unwrap_or_else(|| defaults.cluster_domain.clone()),
            bookie_config: BTreeMap::new(),
            config_fingerprint: String::new(),
        };

        let jvm_options = JvmOptionStrings {
            memory: jvm
                .memory
                .unwrap_or_else(|| defaults.jvm_memory_options.clone())
                .join(" "),
            gc: jvm
                .gc
                .unwrap_or_else(|| defaults.jvm_gc_options.clone())
                .join(" "),
            gc_logging: jvm
                .gc_logging
                .unwrap_or_else(|| defaults.jvm_gc_logging_options.clone())
                .join(" "),
            extra: jvm
                .extra
                .unwrap_or_else(|| defaults.jvm_extra_options.clone())
                .join(" "),
        };
        config.bookie_config = config.render_bookie_config(&jvm_options, &spec.bk_config);
        config.config_fingerprint = fingerprint(&config.bookie_config);

        Ok(config)
    }

    /// The metadata snapshot this configuration corresponds to once synchronized.
    pub fn metadata(&self) -> ClusterMetadata {
        ClusterMetadata {
            size: self.replicas,
            bookkeeper_version: Some(self.bookkeeper_version.clone()),
            config_fingerprint: Some(self.config_fingerprint.clone()),
        }
    }

    pub fn config_map_name(&self) -> String {
        self.name.clone()
    }

    pub fn statefulset_name(&self) -> String {
        self.name.clone()
    }

    pub fn pod_disruption_budget_name(&self) -> String {
        self.name.clone()
    }

    pub fn client_service_name(&self) -> String {
        self.name.clone()
    }

    pub fn headless_service_name(&self) -> String {
        format!("{}-headless", self.name)
    }

    pub fn auto_recovery_deployment_name(&self) -> String {
        format!("{}-auto-recovery", self.name)
    }

    pub fn client_service_fqdn(&self) -> String {
        format!(
            "{name}.{namespace}.svc.{domain}",
            name = self.name,
            namespace = self.namespace,
            domain = self.cluster_domain
        )
    }

    fn render_bookie_config(
        &self,
        jvm_options: &JvmOptionStrings,
        overrides: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut data: BTreeMap<String, String> = [
            ("BK_enableStatistics", "true".to_owned()),
            ("BK_httpServerEnabled", "true".to_owned()),
            ("BK_useHostNameAsBookieID", "true".to_owned()),
            ("BK_lostBookieRecoveryDelay", "60".to_owned()),
            ("BK_prometheusStatsHttpAddress", "0.0.0.0".to_owned()),
            (
                "BK_statsProviderClass",
                "org.apache.bookkeeper.stats.prometheus.PrometheusMetricsProvider".to_owned(),
            ),
            ("BK_CLUSTER_ROOT_PATH", self.zk_root_path.clone()),
            ("BK_zkServers", self.zk_servers.clone()),
            ("BK_zkLedgersRootPath", self.zk_ledgers_root_path.clone()),
            ("BK_indexDirectories", self.directories.index_dirs.clone()),
            ("BK_ledgerDirectories", self.directories.ledger_dirs.clone()),
            ("BK_journalDirectories", self.directories.journal_dir.clone()),
            (
                "BK_autoRecoveryDaemonEnabled",
                self.enable_auto_recovery.to_string(),
            ),
            ("BK_httpServerPort", self.ports.admin.to_string()),
            ("BK_prometheusStatsHttpPort", self.ports.metrics.to_string()),
            ("BK_BOOKIE_PORT", self.ports.bookie.to_string()),
            ("BK_BOOKIE_MEM_OPTS", jvm_options.memory.clone()),
            ("BK_BOOKIE_GC_OPTS", jvm_options.gc.clone()),
            ("BK_BOOKIE_GC_LOGGING_OPTS", jvm_options.gc_logging.clone()),
            ("BK_BOOKIE_EXTRA_OPTS", jvm_options.extra.clone()),
            ("CLUSTER_NAME", self.name.clone()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect();

        for (key, value) in overrides {
            let key = if key.starts_with(BOOKIE_CONFIG_PREFIX) {
                key.clone()
            } else {
                format!("{BOOKIE_CONFIG_PREFIX}{key}")
            };
            if RESERVED_CONFIG_KEYS.contains(&key.as_str()) {
                warn!(
                    cluster = %self.name,
                    config.key = %key,
                    "ignoring bookie config override of an operator managed key"
                );
                continue;
            }
            data.insert(key, value.clone());
        }
        data
    }
}

struct JvmOptionStrings {
    memory: String,
    gc: String,
    gc_logging: String,
    extra: String,
}

/// Stable digest of the rendered bookie configuration.
pub fn fingerprint(data: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_utils::test_cluster;

    fn resolve(cluster: &BookkeeperCluster) -> ClusterConfig {
        ClusterConfig::resolve(cluster, &DefaultConfig::default()).expect("cluster resolves")
    }

    #[test]
    fn defaults_are_applied() {
        let config = resolve(&test_cluster("bk", 3));

        assert_eq!(config.namespace, "default");
        assert_eq!(config.image, "monime/bookkeeper:latest");
        assert_eq!(config.max_unavailable_nodes, 1);
        assert_eq!(config.ports, BookiePorts {
            bookie: 3181,
            admin: 8080,
            metrics: 8000
        });
        assert_eq!(config.volumes.reclaim_policy, VolumeReclaimPolicy::Delete);
        assert_eq!(config.termination_grace_period_seconds, 600);
        assert_eq!(config.client_service_fqdn(), "bk.default.svc.cluster.local");
        assert_eq!(config.headless_service_name(), "bk-headless");
        assert_eq!(config.auto_recovery_deployment_name(), "bk-auto-recovery");
        assert!(config.enable_auto_recovery);
    }

    #[test]
    fn rendered_config_carries_derived_keys() {
        let config = resolve(&test_cluster("bk", 3));
        let data = &config.bookie_config;

        assert_eq!(data["BK_zkServers"], "zk-0.zk:2181");
        assert_eq!(data["BK_CLUSTER_ROOT_PATH"], "/bookkeeper/bk");
        assert_eq!(data["BK_zkLedgersRootPath"], "/bookkeeper/bk/ledgers");
        assert_eq!(data["BK_BOOKIE_PORT"], "3181");
        assert_eq!(data["BK_httpServerPort"], "8080");
        assert_eq!(data["BK_prometheusStatsHttpPort"], "8000");
        assert_eq!(
            data["BK_BOOKIE_MEM_OPTS"],
            "-Xms128m -Xmx256m -XX:MaxDirectMemorySize=256m"
        );
        assert_eq!(data["BK_BOOKIE_GC_LOGGING_OPTS"], "");
        assert_eq!(data["BK_autoRecoveryDaemonEnabled"], "true");
        assert_eq!(data["CLUSTER_NAME"], "bk");
    }

    #[rstest]
    #[case("journalWriteBufferSizeKB", "BK_journalWriteBufferSizeKB")]
    #[case("BK_journalWriteBufferSizeKB", "BK_journalWriteBufferSizeKB")]
    fn overrides_are_prefixed(#[case] key: &str, #[case] expected: &str) {
        let mut cluster = test_cluster("bk", 3);
        cluster.spec.bk_config.insert(key.to_owned(), "64".to_owned());

        let config = resolve(&cluster);

        assert_eq!(config.bookie_config[expected], "64");
        assert!(!config.bookie_config.contains_key("BK_BK_journalWriteBufferSizeKB"));
    }

    #[rstest]
    #[case("zkServers")]
    #[case("BK_zkServers")]
    #[case("BOOKIE_PORT")]
    #[case("ledgerDirectories")]
    fn reserved_overrides_are_dropped(#[case] key: &str) {
        let mut cluster = test_cluster("bk", 3);
        cluster.spec.bk_config.insert(key.to_owned(), "hijacked".to_owned());

        let config = resolve(&cluster);

        assert!(config.bookie_config.values().all(|value| value != "hijacked"));
    }

    #[test]
    fn fingerprint_follows_rendered_config() {
        let base = resolve(&test_cluster("bk", 3));
        let mut resized = test_cluster("bk", 3);
        resized.spec.size = Some(5);
        let mut tuned = test_cluster("bk", 3);
        tuned
            .spec
            .bk_config
            .insert("journalSyncData".to_owned(), "false".to_owned());

        assert_eq!(base.config_fingerprint, resolve(&resized).config_fingerprint);
        assert_ne!(base.config_fingerprint, resolve(&tuned).config_fingerprint);
        assert_eq!(base.config_fingerprint.len(), 64);
    }

    #[rstest]
    #[case(Some(0), "zk:2181", Error::InvalidSize { size: 0 })]
    #[case(Some(-2), "zk:2181", Error::InvalidSize { size: -2 })]
    #[case(Some(3), "  ", Error::MissingZkServers)]
    fn invalid_clusters_are_rejected(
        #[case] size: Option<i32>,
        #[case] zk_servers: &str,
        #[case] expected: Error,
    ) {
        let mut cluster = test_cluster("bk", 3);
        cluster.spec.size = size;
        cluster.spec.zk_servers = zk_servers.to_owned();

        let error = ClusterConfig::resolve(&cluster, &DefaultConfig::default())
            .expect_err("cluster must be rejected");

        assert_eq!(error, expected);
    }

    #[test]
    fn journal_claim_uses_its_own_spec() {
        let mut cluster = test_cluster("bk", 3);
        let journal = PersistentVolumeClaimSpec {
            storage_class_name: Some("fast".to_owned()),
            ..PersistentVolumeClaimSpec::default()
        };
        cluster.spec.persistence = Some(super::super::Persistence {
            journal_volume_claim_spec: Some(journal.clone()),
            ..Default::default()
        });

        let config = resolve(&cluster);

        assert_eq!(config.volumes.journal, journal);
        assert_eq!(
            config.volumes.ledger,
            DefaultConfig::default().volume_claim_spec()
        );
    }
}
