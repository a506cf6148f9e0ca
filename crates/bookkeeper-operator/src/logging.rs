//! Logging setup and reporting of controller outcomes.

use std::error::Error;

use kube::{
    Resource,
    runtime::{
        controller::{self, Action},
        reflector::ObjectRef,
    },
};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter, e.g. `bookkeeper_operator=debug`.
pub const LOG_ENV: &str = "BOOKKEEPER_OPERATOR_LOG";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Initializes `tracing` logging with the filter from the environment variable `env`.
///
/// If the variable is unset or invalid, the maximum log level is INFO.
pub fn initialize_logging(env: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_env(env)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));
    let registry = Registry::default().with(filter);

    match format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// [`Error`] extensions that help report reconciliation errors.
///
/// This should be implemented for reconciler error types.
pub trait ReconcilerError: Error {
    /// `PascalCase`d name for the error category
    ///
    /// This can typically be implemented by delegating to [`strum::EnumDiscriminants`] and
    /// [`strum::IntoStaticStr`].
    fn category(&self) -> &'static str;
}

/// Logs the result of one controller invocation.
pub fn report_controller_reconciled<K, ReconcileErr, QueueErr>(
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<ReconcileErr, QueueErr>>,
) where
    K: Resource,
    ReconcileErr: ReconcilerError,
    QueueErr: Error,
{
    match result {
        Ok((object, _)) => {
            tracing::info!(
                controller.name = controller_name,
                object = %object,
                "Reconciled object"
            );
        }
        Err(controller::Error::ReconcilerFailed(error, object)) => {
            tracing::error!(
                controller.name = controller_name,
                object = %object,
                error.category = error.category(),
                error = error as &dyn Error,
                "Failed to reconcile object",
            );
        }
        Err(error) => {
            tracing::error!(
                controller.name = controller_name,
                error = error as &dyn Error,
                "Failed to reconcile object",
            );
        }
    }
}
