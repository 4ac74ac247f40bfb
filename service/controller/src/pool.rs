use crate::env::Env;
use futures::stream::StreamExt;
use k8s::PodExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, ResourceExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use term_colors::*;
use tokio::sync::Mutex;

/// Safety-valve window for a `locked=true` pod that never got unlocked by a
/// completed (or failed) synchronous activation.
const LOCKED_TTL: chrono::Duration = chrono::Duration::seconds(60);
/// Full relist cadence, matching the upstream indexer's `resyncPeriod`.
const RESYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// The controller-local index of pods believed Warm: ready, unspecialized,
/// not locked. Mutated only by the watch/resync loop and by
/// [pop](WarmPool::pop). A single mutex, per spec's concurrency model.
pub struct WarmPool {
    pods: Mutex<HashMap<String, Pod>>,
}

impl WarmPool {
    pub fn new() -> Self {
        Self {
            pods: Mutex::new(HashMap::new()),
        }
    }

    /// Removes and returns an arbitrary warm pod, if any exist. Used by the
    /// activator to grab a pod to specialize without waiting on a fresh create.
    pub async fn pop(&self) -> Option<(String, Pod)> {
        let mut pods = self.pods.lock().await;
        let name = pods.keys().next().cloned()?;
        pods.remove(&name).map(|pod| (name, pod))
    }

    pub async fn len(&self) -> usize {
        self.pods.lock().await.len()
    }

    async fn insert(&self, name: String, pod: Pod) {
        self.pods.lock().await.insert(name, pod);
    }

    async fn remove(&self, name: &str) {
        self.pods.lock().await.remove(name);
    }
}

impl Default for WarmPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the warm-pool watch forever: applies every pod event under
/// `app=sf-func, controller=<self>, !function` to `pool`, and separately
/// relists on [RESYNC_INTERVAL] to reconcile away any missed events.
pub async fn run(pool: Arc<WarmPool>, env: Arc<Env>) {
    let api: Api<Pod> = k8s::client::new().await;
    tokio::spawn(resync_loop(pool.clone(), api.clone(), env.clone()));

    loop {
        let list_params = ListParams::default().labels(&env.warm_pool_selector());
        let mut events = k8s::watcher::watcher(api.clone(), list_params).boxed();
        loop {
            let event = match events.next().await {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    warn!("warm-pool watch saw a failure, continuing: {:?}", err);
                    continue;
                }
                None => {
                    debug!("warm-pool watch stream closed, restarting");
                    break;
                }
            };
            match event {
                k8s::watcher::Event::Added(pod) | k8s::watcher::Event::Applied(pod) => {
                    process(&pool, &api, pod).await;
                }
                k8s::watcher::Event::Deleted(pod) => {
                    pool.remove(&pod.name()).await;
                }
                k8s::watcher::Event::Restarted(pods) => {
                    for pod in pods {
                        process(&pool, &api, pod).await;
                    }
                }
            }
        }
    }
}

async fn resync_loop(pool: Arc<WarmPool>, api: Api<Pod>, env: Arc<Env>) {
    let mut ticker = tokio::time::interval(RESYNC_INTERVAL);
    loop {
        ticker.tick().await;
        let list_params = ListParams::default().labels(&env.warm_pool_selector());
        match api.list(&list_params).await {
            Ok(list) => {
                info!("warm-pool resync listed {} pods", list.items.len());
                for pod in list.items {
                    process(&pool, &api, pod).await;
                }
            }
            Err(err) => error!("warm-pool resync failed to list pods: {:?}", err),
        }
    }
}

/// A single pod event, applied to the pool. Mirrors the upstream watcher's
/// `process(pod)`: ignore unless ready, clear a stale `locked` annotation,
/// drop deleted pods, otherwise remember the pod as Warm.
async fn process(pool: &WarmPool, api: &Api<Pod>, pod: Pod) {
    if !pod.ready() {
        return;
    }
    let name = pod.name();
    if pod.locked() && pod.age() > LOCKED_TTL {
        warn!(
            "pod {} has been locked for over {}s, clearing the locked annotation",
            cyan(&name),
            LOCKED_TTL.num_seconds()
        );
        if let Err(err) = clear_locked(api, &name).await {
            error!("failed to clear stale locked annotation on {}: {:?}", cyan(&name), err);
        }
        return;
    }
    if pod.deleting() {
        pool.remove(&name).await;
        return;
    }
    pool.insert(name, pod).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_named(name: &str) -> Pod {
        Pod {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn starts_empty() {
        let pool = WarmPool::new();
        assert_eq!(pool.len().await, 0);
        assert!(pool.pop().await.is_none());
    }

    #[tokio::test]
    async fn insert_then_pop_returns_the_same_pod() {
        let pool = WarmPool::new();
        pool.insert("sf-pod-a".to_string(), pod_named("sf-pod-a")).await;
        assert_eq!(pool.len().await, 1);
        let (name, pod) = pool.pop().await.unwrap();
        assert_eq!(name, "sf-pod-a");
        assert_eq!(pod.name(), "sf-pod-a");
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn remove_drops_a_specific_entry() {
        let pool = WarmPool::new();
        pool.insert("sf-pod-a".to_string(), pod_named("sf-pod-a")).await;
        pool.insert("sf-pod-b".to_string(), pod_named("sf-pod-b")).await;
        pool.remove("sf-pod-a").await;
        assert_eq!(pool.len().await, 1);
        let (name, _) = pool.pop().await.unwrap();
        assert_eq!(name, "sf-pod-b");
    }
}

async fn clear_locked(api: &Api<Pod>, name: &str) -> kube::Result<Pod> {
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                k8s::pod::ANNOTATION_LOCKED: serde_json::Value::Null,
            }
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
}
