use futures::stream::StreamExt;
use k8s::PodExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use log::{debug, error, warn};
use std::collections::HashSet;
use term_colors::*;
use tokio::sync::mpsc::Sender;
use tonic::transport::{Channel, Endpoint};
use tower::discover::Change;

/// Port a pod is assumed to listen on when it declares no port under the
/// requested name. Mirrors the fallback the original resolver used.
const DEFAULT_PORT: i32 = 8080;

/// Dials the set of pods labeled `app=<app>` as a single load balanced
/// [Channel](tonic::transport::Channel). The returned channel round-robins
/// RPCs across whatever pods are currently ready, and stays current for the
/// lifetime of the channel: a background task keeps watching the label
/// selector and pushes `Insert`/`Remove` changes into the channel's
/// endpoint set as pods come and go.
///
/// `port_name` selects which named container port to dial; pods that don't
/// declare a port under that name fall back to [DEFAULT_PORT].
///
/// Dropping the returned [Channel](tonic::transport::Channel) does not
/// immediately stop the background watch — the watch task exits on its own
/// once the channel's `Insert`/`Remove` sender is closed, which happens when
/// the channel (and every clone of it) is dropped.
pub fn dial<A: Into<String>, P: Into<String>>(app: A, port_name: P) -> Channel {
    let (channel, sender) = Channel::balance_channel::<String>(1);
    tokio::spawn(watch(app.into(), port_name.into(), sender));
    channel
}

/// Runs until its `sender` is closed, translating pod watch events for
/// `app` into balancer `Change`s for `port_name`.
async fn watch(app: String, port_name: String, sender: Sender<Change<String, Endpoint>>) {
    let client: Api<Pod> = k8s::client::new().await;
    let list_params = ListParams::default().labels(&format!("app={}", app));
    let mut events = k8s::watcher::watcher(client, list_params).boxed();
    let mut known: HashSet<String> = HashSet::new();
    loop {
        let event = match events.next().await {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                warn!("clb watch for service {} saw a failure: {:?}", cyan(&app), err);
                continue;
            }
            None => {
                debug!("clb watch for service {} closed its event stream", cyan(&app));
                return;
            }
        };
        match event {
            k8s::watcher::Event::Added(pod) | k8s::watcher::Event::Applied(pod) => {
                if apply(&app, &port_name, pod, &mut known, &sender).await.is_err() {
                    return;
                }
            }
            k8s::watcher::Event::Deleted(pod) => {
                if remove(pod, &mut known, &sender).await.is_err() {
                    return;
                }
            }
            k8s::watcher::Event::Restarted(pods) => {
                let seen: HashSet<String> = pods.iter().map(|pod| pod.name()).collect();
                let stale: Vec<String> = known.difference(&seen).cloned().collect();
                for name in stale {
                    known.remove(&name);
                    if sender.send(Change::Remove(name)).await.is_err() {
                        return;
                    }
                }
                for pod in pods {
                    if apply(&app, &port_name, pod, &mut known, &sender).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Applies a single observed pod to the balancer, sending an `Insert` when the
/// pod is ready and reachable, a `Remove` when it's gone or being deleted, or
/// nothing at all when it isn't ready yet. Returns `Err` only when the
/// balancer's channel has been closed, which tells the caller to stop watching.
async fn apply(
    app: &str,
    port_name: &str,
    pod: Pod,
    known: &mut HashSet<String>,
    sender: &Sender<Change<String, Endpoint>>,
) -> Result<(), ()> {
    if pod.metadata.deletion_timestamp.is_some() {
        return remove(pod, known, sender).await;
    }
    if !pod.running() {
        return Ok(());
    }
    let ip = match pod.status.as_ref().and_then(|status| status.pod_ip.as_ref()) {
        Some(ip) => ip.clone(),
        None => return Ok(()),
    };
    let port = resolve_port(&pod, port_name);
    let endpoint = match Endpoint::from_shared(format!("http://{}:{}", ip, port)) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            error!(
                "clb could not build an endpoint for pod {} of service {}: {:?}",
                cyan(pod.name()),
                cyan(app),
                err
            );
            return Ok(());
        }
    };
    let name = pod.name();
    known.insert(name.clone());
    sender.send(Change::Insert(name, endpoint)).await.map_err(|_| ())
}

async fn remove(
    pod: Pod,
    known: &mut HashSet<String>,
    sender: &Sender<Change<String, Endpoint>>,
) -> Result<(), ()> {
    let name = pod.name();
    if known.remove(&name) {
        sender.send(Change::Remove(name)).await.map_err(|_| ())
    } else {
        Ok(())
    }
}

fn resolve_port(pod: &Pod, port_name: &str) -> i32 {
    pod.spec
        .as_ref()
        .into_iter()
        .flat_map(|spec| spec.containers.iter())
        .flat_map(|container| container.ports.iter().flatten())
        .find(|port| port.name.as_deref() == Some(port_name))
        .map(|port| port.container_port)
        .unwrap_or(DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec};

    fn pod_with_ports(ports: Vec<ContainerPort>) -> Pod {
        Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "function".to_string(),
                    ports: Some(ports),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_named_port() {
        let pod = pod_with_ports(vec![ContainerPort {
            name: Some("grpc".to_string()),
            container_port: 9090,
            ..Default::default()
        }]);
        assert_eq!(resolve_port(&pod, "grpc"), 9090);
    }

    #[test]
    fn falls_back_to_default_port() {
        let pod = pod_with_ports(vec![ContainerPort {
            name: Some("metrics".to_string()),
            container_port: 9100,
            ..Default::default()
        }]);
        assert_eq!(resolve_port(&pod, "grpc"), DEFAULT_PORT);
    }

    #[test]
    fn falls_back_when_pod_has_no_spec() {
        let pod = Pod::default();
        assert_eq!(resolve_port(&pod, "grpc"), DEFAULT_PORT);
    }
}
