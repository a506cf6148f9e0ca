use k8s_openapi::{
    api::core::v1::{
        ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, HTTPGetAction, PodSpec,
        Probe, VolumeMount,
    },
    apimachinery::pkg::util::intstr::IntOrString,
};

use crate::crd::{
    ADMIN_PORT_NAME, CLIENT_PORT_NAME, ClusterConfig, METRICS_PORT_NAME, config::ProbeSettings,
};

pub const BOOKIE_CONTAINER_NAME: &str = "bookie";
pub const AUTO_RECOVERY_CONTAINER_NAME: &str = "bookkeeper-autorecovery";

const ENTRYPOINT: [&str; 2] = ["/bin/bash", "/opt/bookkeeper/scripts/entrypoint.sh"];
const BOOKKEEPER_BIN: &str = "/opt/bookkeeper/bin/bookkeeper";

pub const HEARTBEAT_PATH: &str = "/heartbeat";
pub const READINESS_PATH: &str = "/api/v1/bookie/is_ready";

pub const JOURNAL_VOLUME: &str = "journal";
pub const LEDGER_VOLUME: &str = "ledger";
pub const INDEX_VOLUME: &str = "index";

/// Builds HTTP GET probes against the bookie admin server.
#[derive(Debug)]
pub struct ProbeBuilder {
    port: i32,
    path: String,
    initial_delay_seconds: i32,
    failure_threshold: i32,
    timeout_seconds: Option<i32>,
    period_seconds: Option<i32>,
    success_threshold: Option<i32>,
}

impl ProbeBuilder {
    pub fn http_get(port: i32, path: impl Into<String>) -> Self {
        Self {
            port,
            path: path.into(),
            // The following values match the Kubernetes default
            initial_delay_seconds: 0,
            failure_threshold: 3,
            timeout_seconds: None,
            period_seconds: None,
            success_threshold: None,
        }
    }

    pub fn with_settings(mut self, settings: ProbeSettings) -> Self {
        self.initial_delay_seconds = settings.initial_delay_seconds;
        self.failure_threshold = settings.failure_threshold;
        self.timeout_seconds = settings.timeout_seconds;
        self.period_seconds = settings.period_seconds;
        self.success_threshold = settings.success_threshold;
        self
    }

    pub fn build(self) -> Probe {
        Probe {
            http_get: Some(HTTPGetAction {
                path: Some(self.path),
                port: IntOrString::Int(self.port),
                ..HTTPGetAction::default()
            }),
            initial_delay_seconds: Some(self.initial_delay_seconds),
            failure_threshold: Some(self.failure_threshold),
            timeout_seconds: self.timeout_seconds,
            period_seconds: self.period_seconds,
            success_threshold: self.success_threshold,
            ..Probe::default()
        }
    }
}

/// The `bookie` container of the StatefulSet pod template.
pub fn bookie_container(config: &ClusterConfig) -> Container {
    let admin_probe = |path: &str, settings: ProbeSettings| {
        ProbeBuilder::http_get(config.ports.admin, path)
            .with_settings(settings)
            .build()
    };

    Container {
        name: BOOKIE_CONTAINER_NAME.to_owned(),
        args: Some(vec![BOOKKEEPER_BIN.to_owned(), "bookie".to_owned()]),
        ports: Some(vec![
            container_port(CLIENT_PORT_NAME, config.ports.bookie),
            container_port(ADMIN_PORT_NAME, config.ports.admin),
            container_port(METRICS_PORT_NAME, config.ports.metrics),
        ]),
        resources: config.pod.resources.clone(),
        volume_mounts: Some(bookie_volume_mounts(config)),
        startup_probe: Some(admin_probe(HEARTBEAT_PATH, config.probes.startup)),
        liveness_probe: Some(admin_probe(HEARTBEAT_PATH, config.probes.liveness)),
        readiness_probe: Some(admin_probe(READINESS_PATH, config.probes.readiness)),
        ..base_container(config)
    }
}

/// The container running the auto recovery daemon outside of the bookies.
pub fn auto_recovery_container(config: &ClusterConfig) -> Container {
    Container {
        name: AUTO_RECOVERY_CONTAINER_NAME.to_owned(),
        args: Some(vec![BOOKKEEPER_BIN.to_owned(), "autorecovery".to_owned()]),
        ..base_container(config)
    }
}

/// Applies the user's pod level settings around `containers`.
pub fn pod_spec(config: &ClusterConfig, containers: Vec<Container>) -> PodSpec {
    let pod = &config.pod;
    PodSpec {
        containers,
        affinity: pod.affinity.clone(),
        node_selector: (!pod.node_selector.is_empty()).then(|| pod.node_selector.clone()),
        tolerations: (!pod.tolerations.is_empty()).then(|| pod.tolerations.clone()),
        service_account_name: pod.service_account_name.clone(),
        termination_grace_period_seconds: Some(config.termination_grace_period_seconds),
        ..PodSpec::default()
    }
}

fn base_container(config: &ClusterConfig) -> Container {
    Container {
        image: Some(config.image.clone()),
        image_pull_policy: Some(config.image_pull_policy.clone()),
        command: Some(ENTRYPOINT.iter().map(|part| (*part).to_owned()).collect()),
        env_from: Some(vec![EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: config.name.clone(),
                ..ConfigMapEnvSource::default()
            }),
            ..EnvFromSource::default()
        }]),
        env: (!config.pod.env.is_empty()).then(|| config.pod.env.clone()),
        ..Container::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_owned()),
        container_port: port,
        ..ContainerPort::default()
    }
}

/// One mount per configured directory. Categories with several directories share a volume
/// through sub paths.
fn bookie_volume_mounts(config: &ClusterConfig) -> Vec<VolumeMount> {
    let directories = &config.directories;
    let mut mounts = Vec::new();
    mounts.extend(volume_mounts(INDEX_VOLUME, split_dirs(&directories.index_dirs)));
    mounts.extend(volume_mounts(LEDGER_VOLUME, split_dirs(&directories.ledger_dirs)));
    mounts.extend(volume_mounts(JOURNAL_VOLUME, vec![directories.journal_dir.as_str()]));
    mounts
}

fn split_dirs(directories: &str) -> Vec<&str> {
    directories.split(',').map(str::trim).collect()
}

fn volume_mounts(volume: &str, directories: Vec<&str>) -> Vec<VolumeMount> {
    let shared = directories.len() > 1;
    directories
        .into_iter()
        .enumerate()
        .map(|(index, directory)| VolumeMount {
            name: volume.to_owned(),
            mount_path: directory.to_owned(),
            sub_path: shared.then(|| format!("{volume}{index}")),
            ..VolumeMount::default()
        })
        .collect()
}
