use bookkeeper_operator::{
    cli::{Command, Opts},
    client::Client,
    controller,
    coordination::zookeeper::ZooKeeperConnector,
    crd::{BookkeeperCluster, defaults::DefaultConfig},
    logging::{self, LOG_ENV},
};
use clap::Parser;
use kube::CustomResourceExt;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to serialize the CRD"))]
    SerializeCrd { source: serde_yaml::Error },

    #[snafu(display("failed to create the Kubernetes client"))]
    CreateClient { source: kube::Error },
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    match opts.command {
        Command::Crd => {
            print!(
                "{}",
                serde_yaml::to_string(&BookkeeperCluster::crd()).context(SerializeCrdSnafu)?
            );
        }
        Command::Run(args) => {
            logging::initialize_logging(LOG_ENV, args.log_format);
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                watch_namespace = ?args.watch_namespace,
                "starting {}",
                env!("CARGO_PKG_NAME")
            );

            let client = Client::new(
                kube::Client::try_default()
                    .await
                    .context(CreateClientSnafu)?,
                Some(args.field_manager.clone()),
            );
            controller::run(
                client,
                &args.watch_namespace,
                ZooKeeperConnector,
                DefaultConfig::v1(),
                args.resync_interval(),
                args.error_requeue(),
            )
            .await;
        }
    }
    Ok(())
}
