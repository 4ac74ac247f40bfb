use crate::env::Env;
use crate::routes::RouteTable;
use futures::stream::StreamExt;
use k8s::PodExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use term_colors::*;

/// Full relist cadence, matching the controller's warm-pool watch and the
/// upstream indexer's `resyncPeriod`.
const RESYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Watches every Active pod across the cluster (`app=sf-func, function`, no
/// `controller` scoping — the router routes to any controller's pods) and
/// keeps `table` in sync via `AddRoute`/`DeleteRoute`. Runs forever.
pub async fn run(table: Arc<RouteTable>, env: Arc<Env>) {
    let api: Api<Pod> = k8s::client::new().await;
    tokio::spawn(resync_loop(table.clone(), api.clone(), env.clone()));

    loop {
        let list_params = ListParams::default().labels(&env.active_pods_selector());
        let mut events = k8s::watcher::watcher(api.clone(), list_params).boxed();
        loop {
            let event = match events.next().await {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    warn!("pod watch saw a failure, continuing: {:?}", err);
                    continue;
                }
                None => {
                    debug!("pod watch stream closed, restarting");
                    break;
                }
            };
            match event {
                k8s::watcher::Event::Added(pod) | k8s::watcher::Event::Applied(pod) => {
                    apply(&table, pod).await;
                }
                k8s::watcher::Event::Deleted(pod) => {
                    remove(&table, pod).await;
                }
                k8s::watcher::Event::Restarted(pods) => {
                    for pod in pods {
                        apply(&table, pod).await;
                    }
                }
            }
        }
    }
}

async fn resync_loop(table: Arc<RouteTable>, api: Api<Pod>, env: Arc<Env>) {
    let mut ticker = tokio::time::interval(RESYNC_INTERVAL);
    loop {
        ticker.tick().await;
        let list_params = ListParams::default().labels(&env.active_pods_selector());
        match api.list(&list_params).await {
            Ok(list) => {
                info!("route table resync listed {} active pods", list.items.len());
                for pod in list.items {
                    apply(&table, pod).await;
                }
            }
            Err(err) => error!("route table resync failed to list pods: {:?}", err),
        }
    }
}

/// A single Active-pod observation: `Ready add` becomes `AddRoute`, anything
/// carrying a deletion timestamp becomes `DeleteRoute`.
async fn apply(table: &RouteTable, pod: Pod) {
    if pod.deleting() {
        remove(table, pod).await;
        return;
    }
    if !pod.ready() {
        return;
    }
    let (name, version, ip) = match triple(&pod) {
        Some(triple) => triple,
        None => return,
    };
    table.add_route(&name, version, &ip).await;
}

async fn remove(table: &RouteTable, pod: Pod) {
    let (name, version, ip) = match triple(&pod) {
        Some(triple) => triple,
        None => return,
    };
    table.delete_route(&name, version, &ip).await;
}

fn triple(pod: &Pod) -> Option<(String, i64, String)> {
    let name = pod.function()?;
    let version = pod.version()?;
    let ip = pod.ip().unwrap_or_else(|| {
        warn!(
            "active pod {} for function {} has no IP recorded, using an empty host",
            cyan(pod.name()),
            cyan(&name)
        );
        String::new()
    });
    if ip.is_empty() {
        return None;
    }
    Some((name, version, ip))
}
