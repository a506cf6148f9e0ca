//! Versioned operator defaults applied to every [`super::BookkeeperCluster`].

use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{PersistentVolumeClaimSpec, VolumeResourceRequirements},
    apimachinery::pkg::api::resource::Quantity,
};

use super::VolumeReclaimPolicy;

pub const DEFAULT_IMAGE_REPOSITORY: &str = "monime/bookkeeper";

/// The defaults a cluster is resolved against.
///
/// Defaults are a plain value handed to the controller instead of process wide state, so a pass
/// always sees one consistent set and tests can supply their own.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultConfig {
    /// Identifies this set of defaults in logs.
    pub revision: &'static str,
    pub image_repository: String,
    pub bookkeeper_version: String,
    pub image_pull_policy: String,
    pub size: i32,
    pub max_unavailable_nodes: u16,

    pub journal_dir: String,
    pub ledger_dirs: String,
    pub index_dirs: String,

    pub bookie_port: i32,
    pub admin_port: i32,
    pub metrics_port: i32,

    pub storage_size: String,
    pub access_mode: String,
    pub reclaim_policy: VolumeReclaimPolicy,

    pub enable_auto_recovery: bool,
    pub auto_recovery_replicas: i32,
    pub termination_grace_period_seconds: i64,
    pub cluster_domain: String,

    pub jvm_memory_options: Vec<String>,
    pub jvm_gc_options: Vec<String>,
    pub jvm_gc_logging_options: Vec<String>,
    pub jvm_extra_options: Vec<String>,

    pub probe_initial_delay_seconds: i32,
    pub probe_failure_threshold: i32,
}

impl DefaultConfig {
    pub fn v1() -> Self {
        Self {
            revision: "v1",
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_owned(),
            bookkeeper_version: "latest".to_owned(),
            image_pull_policy: "IfNotPresent".to_owned(),
            size: 3,
            max_unavailable_nodes: 1,
            journal_dir: "/bk/data/journal".to_owned(),
            ledger_dirs: "/bk/data/ledger".to_owned(),
            index_dirs: "/bk/data/index".to_owned(),
            bookie_port: 3181,
            admin_port: 8080,
            metrics_port: 8000,
            storage_size: "10Gi".to_owned(),
            access_mode: "ReadWriteOnce".to_owned(),
            reclaim_policy: VolumeReclaimPolicy::Delete,
            enable_auto_recovery: true,
            auto_recovery_replicas: 1,
            termination_grace_period_seconds: 600,
            cluster_domain: "cluster.local".to_owned(),
            jvm_memory_options: to_strings(&[
                "-Xms128m",
                "-Xmx256m",
                "-XX:MaxDirectMemorySize=256m",
            ]),
            jvm_gc_options: to_strings(&[
                "-XX:+UseG1GC",
                "-XX:MaxGCPauseMillis=10",
                "-XX:+ParallelRefProcEnabled",
                "-XX:+UnlockExperimentalVMOptions",
                "-XX:+DoEscapeAnalysis",
                "-verbosegc",
                "-XX:ParallelGCThreads=4",
                "-XX:ConcGCThreads=4",
                "-XX:G1NewSizePercent=50",
                "-XX:+DisableExplicitGC",
                "-XX:-ResizePLAB",
                "-XX:+ExitOnOutOfMemoryError",
                "-XX:+PerfDisableSharedMem",
                "-Xlog:gc*",
            ]),
            jvm_gc_logging_options: Vec::new(),
            jvm_extra_options: to_strings(&[
                "-Dio.netty.leakDetectionLevel=disabled",
                "-Dio.netty.recycler.maxCapacity.default=1000",
                "-Dio.netty.recycler.linkCapacity=1024",
            ]),
            probe_initial_delay_seconds: 120,
            probe_failure_threshold: 15,
        }
    }

    /// The claim spec used for every volume category the user leaves unset.
    pub fn volume_claim_spec(&self) -> PersistentVolumeClaimSpec {
        PersistentVolumeClaimSpec {
            access_modes: Some(vec![self.access_mode.clone()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_owned(),
                    Quantity(self.storage_size.clone()),
                )])),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }
    }
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self::v1()
    }
}

fn to_strings(options: &[&str]) -> Vec<String> {
    options.iter().map(|option| (*option).to_owned()).collect()
}
