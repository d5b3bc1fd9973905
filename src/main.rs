use futures::stream::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::Resource;
use kube::ResourceExt;
use kube::{api::ListParams, client::Client, Api};
use kube_runtime::controller::{Context, ReconcilerAction};
use kube_runtime::Controller;
use log::{debug, error, info};

use mattermost_operator::controllers::installation::ClusterInstallationController;
use mattermost_operator::models::cluster_installation::ClusterInstallation;
use mattermost_operator::utils::config::OperatorConfig;
use mattermost_operator::utils::error::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let config = OperatorConfig::from_env()?;
    info!("Starting mattermost-operator with {:?}", config);

    // The client is moved into the controller context; KUBECONFIG or the in-cluster
    // service account decide which cluster it talks to.
    let kubernetes_client: Client = Client::try_default().await?;

    let crd_api: Api<ClusterInstallation> = Api::all(kubernetes_client.clone());
    let deployment_api: Api<Deployment> = Api::all(kubernetes_client.clone());
    let context: Context<ContextData> =
        Context::new(ContextData::new(kubernetes_client.clone(), config));

    // Deployments are owned by their ClusterInstallation, so drift or deletion of a
    // generated Deployment triggers a reconcile of the installation that owns it.
    Controller::new(crd_api, ListParams::default())
        .owns(deployment_api, ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|reconciliation_result| async move {
            match reconciliation_result {
                Ok(installation) => {
                    debug!("Reconciliation successful. Resource: {:?}", installation);
                }
                Err(reconciliation_err) => {
                    error!("Reconciliation error: {:?}", reconciliation_err)
                }
            }
        })
        .await;

    Ok(())
}

/// Context injected with each `reconcile` and `on_error` method invocation.
struct ContextData {
    controller: ClusterInstallationController,
}

impl ContextData {
    /// Constructs a new instance of ContextData.
    ///
    /// # Arguments:
    /// - `client`: A Kubernetes client to make Kubernetes REST API requests with.
    /// - `config`: Operator settings read at startup.
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        let controller = ClusterInstallationController::new(client, config);
        ContextData { controller }
    }
}

/// Action to be taken upon a `ClusterInstallation` resource during reconciliation
enum Action {
    /// Materialize the installation and apply its production Deployment
    Apply,
    /// The installation is being deleted; owner references clean up the Deployment
    NoOp,
}

async fn reconcile(
    installation: ClusterInstallation,
    context: Context<ContextData>,
) -> Result<ReconcilerAction, Error> {
    let controller = &context.get_ref().controller;

    let namespace: String = match installation.namespace() {
        None => {
            return Err(Error::UserInputError(
                "Expected ClusterInstallation resource to be namespaced. Can't deploy to an unknown namespace."
                    .to_owned(),
            ));
        }
        Some(namespace) => namespace,
    };

    match determine_action(&installation) {
        Action::Apply => {
            debug!("Action::Apply {}/{}", namespace, installation.name());

            let materialized = controller.apply_deployment(&installation, &namespace).await?;
            controller
                .update_status(&installation.name(), &namespace, &materialized)
                .await?;

            Ok(ReconcilerAction {
                requeue_after: Some(controller.config().requeue_after),
            })
        }
        Action::NoOp => {
            debug!("Action::NoOp {}/{}", namespace, installation.name());

            Ok(ReconcilerAction {
                requeue_after: None,
            })
        }
    }
}

/// Looks at the state of the given `ClusterInstallation` and decides what to do with it.
fn determine_action(installation: &ClusterInstallation) -> Action {
    if installation.meta().deletion_timestamp.is_some() {
        Action::NoOp
    } else {
        Action::Apply
    }
}

/// Logs a failed reconciliation and requeues the resource after the configured delay.
fn on_error(error: &Error, context: Context<ContextData>) -> ReconcilerAction {
    error!("Reconciliation error:\n{:?}", error);
    ReconcilerAction {
        requeue_after: Some(context.get_ref().controller.config().error_requeue_after),
    }
}
