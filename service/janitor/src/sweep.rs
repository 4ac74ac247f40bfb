use crate::env::Env;
use crate::errors::{ControllerListFailure, OrphanListFailure};
use error::StringError;
use k8s::PodExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use log::{error, info, warn};
use result::Result;
use sidecar_proto::sidecar_client::SidecarClient;
use sidecar_proto::{MetricsRequest, MetricsResponse};
use std::sync::Arc;
use std::time::Duration;
use term_colors::*;
use tokio::sync::{mpsc, Mutex};
use tonic::transport::Channel;

/// The `app` label every controller pod carries, matching the value `clb`
/// dials in `controller_client.rs`/`fnapi_client.rs`.
const CONTROLLER_APP: &str = "sanfran-controller";
const WORKER_COUNT: usize = 10;
const CHANNEL_CAPACITY: usize = 300;
const METRICS_DEADLINE: Duration = Duration::from_millis(200);
/// Matches `service/sidecar`'s listening port.
const SIDECAR_PORT: u16 = 9090;
/// A pod whose sidecar hasn't heard from its owning controller in longer
/// than this is considered abandoned, per `janitor/cleanup.go`'s
/// `orphanAfterPingGap`.
const ORPHAN_AFTER_PING_GAP_S: f64 = 900.0;

/// One pass over the namespace: find every function pod whose `controller`
/// label names a controller that is no longer running, and delete it if it
/// looks dead. Runs once and returns — the real deployment schedules this
/// as a `CronJob`.
pub async fn run(env: &Env) -> Result<()> {
    info!("sweeping namespace {}", cyan(&env.namespace));
    let api: Api<Pod> = k8s::client::new().await;

    let live = live_controllers(&api).await?;
    info!("{} live controllers: {:?}", live.len(), live);

    let orphans = orphan_pods(&api, &live).await?;
    info!("found {} orphan pods", orphans.len());

    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    for pod in orphans {
        if sender.send(pod).await.is_err() {
            break;
        }
    }
    drop(sender);

    let receiver = Arc::new(Mutex::new(receiver));
    let mut workers = Vec::with_capacity(WORKER_COUNT);
    for _ in 0..WORKER_COUNT {
        let receiver = receiver.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let pod = receiver.lock().await.recv().await;
                match pod {
                    Some(pod) => sweep_one(pod).await,
                    None => return,
                }
            }
        }));
    }
    for worker in workers {
        let _ = worker.await;
    }

    info!("I'm done thanks, goodbye!");
    Ok(())
}

/// Names of every non-deleting controller pod, identifying which
/// `controller` label values on function pods are still valid owners.
async fn live_controllers(api: &Api<Pod>) -> Result<Vec<String>> {
    let selector = format!("app={}", CONTROLLER_APP);
    let list = api
        .list(&ListParams::default().labels(&selector))
        .await
        .map_err(|cause| ControllerListFailure {
            selector: selector.clone(),
            cause: StringError::from(cause.to_string()),
        })?;
    Ok(list
        .items
        .into_iter()
        .filter(|pod| !pod.deleting())
        .map(|pod| pod.name())
        .collect())
}

/// Every function pod whose `controller` label is not among `live`. When
/// `live` is empty there is no controller left at all, so every function
/// pod in the namespace qualifies — a `notin ()` selector with an empty set
/// is not valid Kubernetes syntax, so that case is handled separately.
async fn orphan_pods(api: &Api<Pod>, live: &[String]) -> Result<Vec<Pod>> {
    let selector = if live.is_empty() {
        "app=sf-func".to_string()
    } else {
        format!("app=sf-func,controller notin ({})", live.join(","))
    };
    info!("orphan pod selector: {}", selector);
    let list = api
        .list(&ListParams::default().labels(&selector))
        .await
        .map_err(|cause| OrphanListFailure {
            selector: selector.clone(),
            cause: StringError::from(cause.to_string()),
        })?;
    Ok(list.items)
}

async fn sweep_one(pod: Pod) {
    let name = pod.name();

    let mut delete = pod.exited();
    if !delete {
        match fetch_metrics(&pod).await {
            Ok(metrics) => {
                delete = metrics.terminate || metrics.last_ping_s > ORPHAN_AFTER_PING_GAP_S;
                info!(
                    "[{}] last_ping_s={} terminate={}",
                    cyan(&name),
                    metrics.last_ping_s,
                    metrics.terminate
                );
            }
            Err(err) => {
                warn!("[{}] could not collect metrics, assuming orphaned: {}", cyan(&name), err);
                delete = true;
            }
        }
    }

    if delete {
        info!("deleting orphan pod {}", cyan(&name));
        if let Err(err) = k8s::delete(&name).await {
            error!("failed to delete orphan pod {}: {:?}", cyan(&name), err);
        }
    }
}

async fn fetch_metrics(pod: &Pod) -> Result<MetricsResponse> {
    let ip = pod.ip().unwrap_or_default();
    let endpoint = format!("http://{}:{}", ip, SIDECAR_PORT);
    let channel = Channel::from_shared(endpoint)
        .map_err(|err| StringError::from(err.to_string()))?
        .connect()
        .await
        .map_err(|err| StringError::from(err.to_string()))?;
    let mut client = SidecarClient::new(channel);
    let mut request = tonic::Request::new(MetricsRequest {
        from_controller: false,
    });
    request.set_timeout(METRICS_DEADLINE);
    let response = client
        .metrics(request)
        .await
        .map_err(|status| StringError::from(status.to_string()))?;
    Ok(response.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_live_set_selects_every_function_pod() {
        // orphan_pods needs a live Api<Pod> to call, so this only exercises
        // the selector string construction path it shares with the empty
        // branch above.
        let live: Vec<String> = Vec::new();
        let selector = if live.is_empty() {
            "app=sf-func".to_string()
        } else {
            format!("app=sf-func,controller notin ({})", live.join(","))
        };
        assert_eq!(selector, "app=sf-func");
    }

    #[test]
    fn nonempty_live_set_builds_a_notin_selector() {
        let live = vec!["sanfran-controller-abc".to_string(), "sanfran-controller-def".to_string()];
        let selector = format!("app=sf-func,controller notin ({})", live.join(","));
        assert_eq!(
            selector,
            "app=sf-func,controller notin (sanfran-controller-abc,sanfran-controller-def)"
        );
    }
}
