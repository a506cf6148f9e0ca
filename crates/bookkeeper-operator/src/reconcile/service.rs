use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use tracing::info;

use super::{ObjectReconciler, Outcome, Result, reconcile_object};
use crate::{
    builder::meta::ObjectMetaBuilder,
    client::ResourceStore,
    crd::{ADMIN_PORT_NAME, CLIENT_PORT_NAME, ClusterConfig, METRICS_PORT_NAME},
    labels::{self, BOOKIE_COMPONENT},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceRole {
    /// Load balanced, routable ClusterIP service for clients.
    Client,
    /// Gives every bookie a stable DNS name, ready or not.
    Headless,
}

pub struct ServiceReconciler<'a> {
    config: &'a ClusterConfig,
    role: ServiceRole,
}

impl<'a> ServiceReconciler<'a> {
    pub fn new(config: &'a ClusterConfig, role: ServiceRole) -> Self {
        Self { config, role }
    }

    fn selector(&self) -> BTreeMap<String, String> {
        labels::selector_labels(&self.config.name, BOOKIE_COMPONENT)
    }

    fn ports(&self) -> Vec<ServicePort> {
        let ports = &self.config.ports;
        [
            (CLIENT_PORT_NAME, ports.bookie),
            (ADMIN_PORT_NAME, ports.admin),
            (METRICS_PORT_NAME, ports.metrics),
        ]
        .into_iter()
        .map(|(name, port)| ServicePort {
            name: Some(name.to_owned()),
            port,
            ..ServicePort::default()
        })
        .collect()
    }
}

/// The (name, port) pairs of a port list, the only part of a port compared for drift.
fn port_pairs(ports: &[ServicePort]) -> Vec<(Option<&str>, i32)> {
    ports
        .iter()
        .map(|port| (port.name.as_deref(), port.port))
        .collect()
}

impl ObjectReconciler for ServiceReconciler<'_> {
    type Object = Service;

    fn name(&self) -> String {
        match self.role {
            ServiceRole::Client => self.config.client_service_name(),
            ServiceRole::Headless => self.config.headless_service_name(),
        }
    }

    fn build(&self) -> Service {
        let spec = match self.role {
            ServiceRole::Client => ServiceSpec {
                type_: Some("ClusterIP".to_owned()),
                ..ServiceSpec::default()
            },
            ServiceRole::Headless => ServiceSpec {
                cluster_ip: Some("None".to_owned()),
                publish_not_ready_addresses: Some(true),
                ..ServiceSpec::default()
            },
        };

        Service {
            metadata: ObjectMetaBuilder::for_cluster(self.config, self.name(), BOOKIE_COMPONENT)
                .with_annotations(self.config.annotations.clone())
                .build(),
            spec: Some(ServiceSpec {
                selector: Some(self.selector()),
                ports: Some(self.ports()),
                ..spec
            }),
            status: None,
        }
    }

    fn needs_update(&self, existing: &Service) -> bool {
        let Some(spec) = existing.spec.as_ref() else {
            return true;
        };
        spec.selector.as_ref() != Some(&self.selector())
            || port_pairs(spec.ports.as_deref().unwrap_or_default()) != port_pairs(&self.ports())
    }

    fn apply(&self, mut existing: Service) -> Service {
        let spec = existing.spec.get_or_insert_with(ServiceSpec::default);
        spec.selector = Some(self.selector());
        spec.ports = Some(self.ports());
        existing
    }
}

/// Reconciles the headless service first, then the client service.
pub async fn reconcile(store: &impl ResourceStore, config: &ClusterConfig) -> Result<Outcome> {
    let headless =
        reconcile_object(store, config, &ServiceReconciler::new(config, ServiceRole::Headless))
            .await?;
    let client =
        reconcile_object(store, config, &ServiceReconciler::new(config, ServiceRole::Client))
            .await?;
    if client == Outcome::Created {
        info!(
            cluster = %config.name,
            address = %config.client_service_fqdn(),
            port = config.ports.bookie,
            "bookies are reachable through the client service"
        );
    }
    Ok(match (headless, client) {
        (Outcome::Created, _) | (_, Outcome::Created) => Outcome::Created,
        (Outcome::Updated, _) | (_, Outcome::Updated) => Outcome::Updated,
        _ => Outcome::Unchanged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeStore, StoreOp, test_config};

    #[tokio::test]
    async fn creates_both_services() {
        let config = test_config("bk", 3);
        let store = FakeStore::default();

        reconcile(&store, &config).await.expect("create");

        let headless: Service = store.stored("bk-headless").expect("headless service");
        let headless_spec = headless.spec.expect("spec");
        assert_eq!(headless_spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(headless_spec.publish_not_ready_addresses, Some(true));

        let client: Service = store.stored("bk").expect("client service");
        let client_spec = client.spec.expect("spec");
        assert_eq!(client_spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(
            port_pairs(&client_spec.ports.expect("ports")),
            vec![
                (Some("tcp-client"), 3181),
                (Some("http-admin"), 8080),
                (Some("http-metrics"), 8000)
            ]
        );
    }

    #[tokio::test]
    async fn platform_defaulted_ports_do_not_drift() {
        let config = test_config("bk", 3);
        let store = FakeStore::default();
        reconcile(&store, &config).await.expect("create");

        store.modify::<Service>("bk", |service| {
            let spec = service.spec.as_mut().expect("spec");
            spec.cluster_ip = Some("10.0.0.12".to_owned());
            for port in spec.ports.iter_mut().flatten() {
                port.protocol = Some("TCP".to_owned());
            }
        });

        assert_eq!(reconcile(&store, &config).await.expect("no-op"), Outcome::Unchanged);
        assert_eq!(store.count(StoreOp::Update), 0);
    }

    #[tokio::test]
    async fn port_change_is_applied_in_place() {
        let mut config = test_config("bk", 3);
        let store = FakeStore::default();
        reconcile(&store, &config).await.expect("create");

        config.ports.admin = 9090;
        assert_eq!(reconcile(&store, &config).await.expect("update"), Outcome::Updated);

        assert_eq!(store.count(StoreOp::Update), 2);
        let client: Service = store.stored("bk").expect("client service");
        assert!(
            client
                .spec
                .and_then(|spec| spec.ports)
                .expect("ports")
                .iter()
                .any(|port| port.port == 9090)
        );
    }
}
