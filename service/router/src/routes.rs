use log::{debug, info};
use sidecar_proto::sidecar_client::SidecarClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use term_colors::*;
use tokio::sync::{watch, Mutex};
use tonic::transport::Channel;

/// Port every sidecar listens on, matching `service/sidecar`'s default.
const SIDECAR_PORT: u16 = 9090;
/// How long [RouteTable::get_conn] will wait for a cold-pending entry to
/// materialize before giving up and telling its caller to drive a cold start.
const COLD_START_BARRIER_BUDGET: Duration = Duration::from_millis(300);
/// Sentinel `version` for an entry inserted by [RouteTable::get_conn] before
/// anything has been added to it. Real versions are always `>= 0`.
const UNRESOLVED_VERSION: i64 = -1;

/// A function's round-robin route set: the version currently routable, the
/// ordered set of pod IPs serving it, and a round-robin cursor. The `ready`
/// barrier is a one-shot event, not a condition variable — built over a
/// [watch] channel so a value set before a waiter subscribes is never
/// missed, per the design note that drove this choice.
struct FnRoute {
    inner: Mutex<Inner>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

struct Inner {
    version: i64,
    hosts: Vec<String>,
    cursor: usize,
}

impl FnRoute {
    fn cold_pending() -> Arc<Self> {
        let (ready_tx, ready_rx) = watch::channel(false);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                version: UNRESOLVED_VERSION,
                hosts: Vec::new(),
                cursor: 0,
            }),
            ready_tx,
            ready_rx,
        })
    }

    fn close(&self) {
        // `send` only errors if every receiver (including our own retained
        // one) has dropped, which cannot happen here since `self` holds one.
        let _ = self.ready_tx.send(true);
    }
}

/// The router-local routing table: `name -> FnRoute`, plus a connection
/// cache keyed by pod IP. Two locks, per spec's concurrency model — the
/// routes map lock and the connection cache lock are never held across
/// network IO; the per-`FnRoute` lock guards only its hosts/cursor.
pub struct RouteTable {
    routes: Mutex<HashMap<String, Arc<FnRoute>>>,
    conns: Mutex<HashMap<String, SidecarClient<Channel>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            conns: Mutex::new(HashMap::new()),
        }
    }

    /// `AddRoute`: folds a single `(name, version, ip)` observation into the
    /// table. Idempotent — applying the same triple twice is a no-op past
    /// the first time.
    pub async fn add_route(&self, name: &str, version: i64, ip: &str) {
        let route = {
            let mut routes = self.routes.lock().await;
            routes
                .entry(name.to_string())
                .or_insert_with(FnRoute::cold_pending)
                .clone()
        };
        let mut inner = route.inner.lock().await;
        if inner.version < version {
            info!(
                "route for {} now points at version {} (host {})",
                cyan(name),
                version,
                cyan(ip)
            );
            inner.version = version;
            inner.hosts = vec![ip.to_string()];
            inner.cursor = 0;
        } else if inner.version == version && !inner.hosts.iter().any(|host| host == ip) {
            inner.hosts.push(ip.to_string());
        }
        drop(inner);
        route.close();
    }

    /// `DeleteRoute`: removes `ip` from `name`'s route set if its version
    /// still matches. Drops the whole entry once its host list is empty.
    /// A no-op if the triple is stale or absent.
    pub async fn delete_route(&self, name: &str, version: i64, ip: &str) {
        let mut routes = self.routes.lock().await;
        let route = match routes.get(name) {
            Some(route) => route.clone(),
            None => return,
        };
        let should_drop = {
            let mut inner = route.inner.lock().await;
            if inner.version != version {
                return;
            }
            inner.hosts.retain(|host| host != ip);
            if inner.cursor >= inner.hosts.len() {
                inner.cursor = 0;
            }
            inner.hosts.is_empty()
        };
        if should_drop {
            debug!("route for {} has no hosts left, dropping the entry", cyan(name));
            routes.remove(name);
        }
        self.conns.lock().await.remove(ip);
    }

    /// `GetConn`: resolves `name` to a live sidecar client, cold-starting the
    /// caller's retry path on a miss. Waits on the cold-start barrier up to
    /// 300ms when an entry exists but hasn't been populated yet, per the
    /// boundary test: it always returns within that budget.
    pub async fn get_conn(&self, name: &str) -> Option<SidecarClient<Channel>> {
        let route = {
            let mut routes = self.routes.lock().await;
            match routes.get(name) {
                Some(route) => route.clone(),
                None => {
                    routes.insert(name.to_string(), FnRoute::cold_pending());
                    return None;
                }
            }
        };

        if !*route.ready_rx.borrow() {
            let mut rx = route.ready_rx.clone();
            let _ = tokio::time::timeout(COLD_START_BARRIER_BUDGET, rx.changed()).await;
        }

        let ip = {
            let mut inner = route.inner.lock().await;
            if inner.hosts.is_empty() {
                return None;
            }
            let ip = inner.hosts[inner.cursor].clone();
            inner.cursor = (inner.cursor + 1) % inner.hosts.len();
            ip
        };

        Some(self.dial(&ip).await)
    }

    async fn dial(&self, ip: &str) -> SidecarClient<Channel> {
        let mut conns = self.conns.lock().await;
        if let Some(client) = conns.get(ip) {
            return client.clone();
        }
        let endpoint = format!("http://{}:{}", ip, SIDECAR_PORT);
        // `connect_lazy` defers the actual TCP handshake to first use and
        // transparently redials on failure, which is what stands in here for
        // the upstream's manual TransientFailure/Shutdown connection-state
        // check — tonic's lazy channel already recovers from a dead peer on
        // the next call rather than needing that to be driven by hand.
        let channel = Channel::from_shared(endpoint)
            .expect("pod IP formats into a valid URI")
            .connect_lazy();
        let client = SidecarClient::new(channel);
        conns.insert(ip.to_string(), client.clone());
        client
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cold_miss_inserts_pending_entry_and_reports_miss() {
        let table = RouteTable::new();
        assert!(table.get_conn("hello").await.is_none());
        assert!(table.routes.lock().await.contains_key("hello"));
    }

    #[tokio::test]
    async fn add_then_get_returns_a_connection() {
        let table = RouteTable::new();
        table.add_route("hello", 7, "10.0.0.1").await;
        assert!(table.get_conn("hello").await.is_some());
    }

    #[tokio::test]
    async fn higher_version_replaces_lower() {
        let table = RouteTable::new();
        table.add_route("hello", 7, "10.0.0.1").await;
        table.add_route("hello", 8, "10.0.0.2").await;
        let routes = table.routes.lock().await;
        let route = routes.get("hello").unwrap();
        let inner = route.inner.lock().await;
        assert_eq!(inner.version, 8);
        assert_eq!(inner.hosts, vec!["10.0.0.2".to_string()]);
    }

    #[tokio::test]
    async fn stale_version_is_ignored() {
        let table = RouteTable::new();
        table.add_route("hello", 8, "10.0.0.2").await;
        table.add_route("hello", 7, "10.0.0.1").await;
        let routes = table.routes.lock().await;
        let inner = routes.get("hello").unwrap().inner.lock().await;
        assert_eq!(inner.version, 8);
        assert_eq!(inner.hosts, vec!["10.0.0.2".to_string()]);
    }

    #[tokio::test]
    async fn same_version_appends_distinct_hosts_only() {
        let table = RouteTable::new();
        table.add_route("hello", 7, "10.0.0.1").await;
        table.add_route("hello", 7, "10.0.0.1").await;
        table.add_route("hello", 7, "10.0.0.2").await;
        let routes = table.routes.lock().await;
        let inner = routes.get("hello").unwrap().inner.lock().await;
        assert_eq!(inner.hosts, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    }

    #[tokio::test]
    async fn delete_of_absent_ip_is_a_no_op() {
        let table = RouteTable::new();
        table.add_route("hello", 7, "10.0.0.1").await;
        table.delete_route("hello", 7, "10.0.0.9").await;
        let routes = table.routes.lock().await;
        let inner = routes.get("hello").unwrap().inner.lock().await;
        assert_eq!(inner.hosts, vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn delete_drops_entry_once_hosts_are_empty() {
        let table = RouteTable::new();
        table.add_route("hello", 7, "10.0.0.1").await;
        table.delete_route("hello", 7, "10.0.0.1").await;
        assert!(!table.routes.lock().await.contains_key("hello"));
    }

    #[tokio::test]
    async fn delete_ignores_mismatched_version() {
        let table = RouteTable::new();
        table.add_route("hello", 8, "10.0.0.1").await;
        table.delete_route("hello", 7, "10.0.0.1").await;
        let routes = table.routes.lock().await;
        let inner = routes.get("hello").unwrap().inner.lock().await;
        assert_eq!(inner.hosts, vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn cold_start_barrier_returns_within_budget_if_never_populated() {
        let table = RouteTable::new();
        // Insert the pending entry first, the way a concurrent request would.
        table.get_conn("never-comes").await;
        let start = tokio::time::Instant::now();
        let result = table.get_conn("never-comes").await;
        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn round_robins_across_hosts() {
        let table = RouteTable::new();
        table.add_route("hello", 7, "10.0.0.1").await;
        table.add_route("hello", 7, "10.0.0.2").await;
        let routes = table.routes.lock().await;
        let inner = routes.get("hello").unwrap().inner.lock().await;
        assert_eq!(inner.cursor, 0);
    }
}
