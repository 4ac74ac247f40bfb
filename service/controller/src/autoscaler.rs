use crate::env::{self, Env};
use crate::errors::{MetricsDialFailure, PodListFailure};
use crate::fnpod;
use error::StringError;
use k8s::{pod, PodExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, ResourceExt};
use log::{error, info, warn};
use result::Result;
use sidecar_proto::sidecar_client::SidecarClient;
use sidecar_proto::{MetricsRequest, MetricsResponse};
use std::sync::Arc;
use std::time::Duration;
use term_colors::*;
use tokio::sync::mpsc;
use tonic::transport::Channel;

const CYCLE_INTERVAL: Duration = Duration::from_secs(15);
const CHANNEL_CAPACITY: usize = 300;
const WORKER_COUNT: usize = 10;
const METRICS_DEADLINE: Duration = Duration::from_millis(200);
/// Matches `service/sidecar`'s listening port.
const SIDECAR_PORT: u16 = 9090;
/// A Warm pod idle past this many seconds of inactivity is eligible for
/// scale-down once the pool is over target.
const WARM_IDLE_THRESHOLD_S: f64 = 300.0;
/// An Active pod idle past this many seconds is considered unhealthy for
/// its function and demoted back to Warm.
const ACTIVE_IDLE_THRESHOLD_S: f64 = 20.0;

/// Runs forever on a 15s cadence: lists this controller's pods, reaps dead
/// ones, demotes idle Active pods, scales down an over-target Warm pool,
/// and tops the pool back up to target.
pub async fn run(env: Arc<Env>) {
    let api: Api<Pod> = k8s::client::new().await;
    let mut ticker = tokio::time::interval(CYCLE_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(err) = cycle(&env, &api).await {
            error!("autoscaler cycle failed: {}", err);
        }
    }
}

async fn cycle(env: &Env, api: &Api<Pod>) -> Result<()> {
    let list_params = ListParams::default().labels(&env.owned_pods_selector());
    let pods = api
        .list(&list_params)
        .await
        .map_err(|cause| PodListFailure {
            selector: env.owned_pods_selector(),
            cause: StringError::from(cause.to_string()),
        })?
        .items;

    let ready_warm = pods
        .iter()
        .filter(|pod| !pod.deleting() && pod.running() && pod.function().is_none())
        .count();

    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    let total = pods.len();
    for pod in pods {
        if sender.send(pod).await.is_err() {
            break;
        }
    }
    drop(sender);
    info!(
        "autoscaler cycle: {} pods owned, {} ready-warm",
        total,
        ready_warm
    );
    run_workers(api.clone(), receiver, ready_warm).await;

    let target = env::pool_size();
    if ready_warm < target {
        let short_by = target - ready_warm;
        info!("topping up warm pool by {} pods", short_by);
        for _ in 0..short_by {
            let pod = fnpod::new_function_pod(env, false);
            if let Err(err) = api.create(&PostParams::default(), &pod).await {
                error!("failed to create a warm-pool top-up pod: {:?}", err);
            }
        }
    }
    Ok(())
}

async fn run_workers(api: Api<Pod>, receiver: mpsc::Receiver<Pod>, ready_warm: usize) {
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
    let mut workers = Vec::with_capacity(WORKER_COUNT);
    for _ in 0..WORKER_COUNT {
        let api = api.clone();
        let receiver = receiver.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let pod = receiver.lock().await.recv().await;
                match pod {
                    Some(pod) => process(&api, pod, ready_warm).await,
                    None => return,
                }
            }
        }));
    }
    for worker in workers {
        let _ = worker.await;
    }
}

async fn process(api: &Api<Pod>, pod: Pod, ready_warm: usize) {
    let name = pod.name();

    if pod.exited() {
        reap(api, &name, "Terminated containers").await;
        return;
    }

    let ip = match pod.ip() {
        Some(ip) => ip,
        None => return,
    };

    let metrics = match fetch_metrics(&ip).await {
        Ok(metrics) => metrics,
        Err(err) => {
            warn!("autoscaler could not collect metrics from {}: {}", cyan(&name), err);
            return;
        }
    };

    match pod.function() {
        Some(function) => {
            if metrics.terminate || metrics.last_req_s == 0.0 || metrics.last_req_s > ACTIVE_IDLE_THRESHOLD_S {
                info!(
                    "demoting pod {} for function {} back to Warm (last_req_s={})",
                    cyan(&name),
                    cyan(&function),
                    metrics.last_req_s
                );
                demote(api, &name).await;
            }
        }
        None => {
            if metrics.terminate {
                reap(api, &name, "Sidecar requested termination").await;
            } else if (metrics.last_req_s == 0.0 || metrics.last_req_s > WARM_IDLE_THRESHOLD_S)
                && ready_warm > env::pool_size()
            {
                reap(api, &name, "Scaling down").await;
            }
        }
    }
}

async fn reap(_api: &Api<Pod>, name: &str, reason: &str) {
    info!("deleting pod {}: {}", cyan(name), reason);
    if let Err(err) = k8s::delete(name).await {
        error!("failed to delete pod {}: {:?}", cyan(name), err);
    }
}

async fn demote(api: &Api<Pod>, name: &str) {
    let patch = serde_json::json!({
        "metadata": {
            "labels": {
                pod::LABEL_FUNCTION: serde_json::Value::Null,
            },
            "annotations": {
                pod::ANNOTATION_VERSION: serde_json::Value::Null,
            }
        }
    });
    if let Err(err) = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        error!("failed to demote pod {} to Warm: {:?}", cyan(name), err);
    }
}

async fn fetch_metrics(ip: &str) -> Result<MetricsResponse> {
    let endpoint = format!("http://{}:{}", ip, SIDECAR_PORT);
    let channel = Channel::from_shared(endpoint)
        .map_err(|err| MetricsDialFailure {
            pod: ip.to_string(),
            cause: StringError::from(err.to_string()),
        })?
        .connect()
        .await
        .map_err(|err| MetricsDialFailure {
            pod: ip.to_string(),
            cause: StringError::from(err.to_string()),
        })?;
    let mut client = SidecarClient::new(channel);
    let mut request = tonic::Request::new(MetricsRequest {
        from_controller: true,
    });
    request.set_timeout(METRICS_DEADLINE);
    Ok(client
        .metrics(request)
        .await
        .map_err(|status| MetricsDialFailure {
            pod: ip.to_string(),
            cause: StringError::from(status.to_string()),
        })?
        .into_inner())
}
