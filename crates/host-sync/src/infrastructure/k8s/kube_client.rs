use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;
use tracing::info;

use crate::infrastructure::k8s::KubernetesError;

/// Build a Kubernetes client from `kubeconfig`, or from the in-cluster /
/// `~/.kube/config` defaults when no path is given.
///
/// # Errors
///
/// - [`KubernetesError::ConnectionFailed`] if the configuration cannot be
///   loaded or the client cannot be built
pub async fn init_kube_client(kubeconfig: Option<&Path>) -> Result<Client, Report<KubernetesError>> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).change_context_lazy(|| {
                KubernetesError::ConnectionFailed {
                    message: format!("cannot read kubeconfig {}", path.display()),
                }
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .change_context_lazy(|| KubernetesError::ConnectionFailed {
                    message: format!("invalid kubeconfig {}", path.display()),
                })?
        }
        None => Config::infer()
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "no in-cluster or default kubeconfig available".to_string(),
            })?,
    };

    info!(cluster_url = %config.cluster_url, "Kubernetes client configured");
    Client::try_from(config).change_context(KubernetesError::ConnectionFailed {
        message: "cannot build Kubernetes client".to_string(),
    })
}
