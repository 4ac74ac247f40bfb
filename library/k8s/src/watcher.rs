use futures::stream::{Stream, StreamExt};
use k8s_openapi::Metadata;
use kube::api::{ListParams, ObjectMeta};
use kube::core::Resource;
use kube::Api;
use kube_runtime::watcher as runtime_watcher;

/// Error is a thin re-export of [kube_runtime::watcher::Error](kube_runtime::watcher::Error),
/// kept as its own type here so callers only ever need to depend on this crate's `watcher`
/// module rather than reaching into `kube_runtime` directly.
pub type Error = runtime_watcher::Error;

/// An Event describes a single state transition observed for the watched resource.
///
/// This mirrors [kube_runtime::watcher::Event](kube_runtime::watcher::Event) but splits its
/// `Applied` variant in two: the very first applied event seen for a given watch is reported
/// as [Added](Event::Added), and every one after that as [Applied](Event::Applied). Callers
/// that are waiting for a resource to first come into existence (as opposed to being updated)
/// care about this distinction.
#[derive(Debug, Clone)]
pub enum Event<K> {
    /// The first observation of the watched resource coming into existence.
    Added(K),
    /// A resource that already existed was created or updated.
    Applied(K),
    /// The resource was deleted.
    Deleted(K),
    /// The watch had to restart (e.g. after a `410 Gone`) and this is the full relist.
    Restarted(Vec<K>),
}

/// Watches the given resource, narrowed by `list_params`, and produces a stream of
/// high level [Event](crate::watcher::Event)s.
///
/// This is a thin translation over [kube_runtime::watcher::watcher](kube_runtime::watcher::watcher):
/// it keeps the exponential-backoff-on-error/re-list-on-expiry behavior of the underlying
/// watch entirely as-is, and only distinguishes the first `Applied` event of the stream
/// (reported as [Added](Event::Added)) from every subsequent one.
pub fn watcher<K>(
    api: Api<K>,
    list_params: ListParams,
) -> impl Stream<Item = Result<Event<K>, Error>>
where
    K: Clone + std::fmt::Debug + Send + Sync + 'static,
    K: Resource + Metadata<Ty = ObjectMeta>,
    <K as Resource>::DynamicType: Default,
{
    runtime_watcher::watcher(api, list_params).scan(false, |seen_applied, event| {
        let event = event.map(|event| match event {
            runtime_watcher::Event::Applied(obj) => {
                if *seen_applied {
                    Event::Applied(obj)
                } else {
                    *seen_applied = true;
                    Event::Added(obj)
                }
            }
            runtime_watcher::Event::Deleted(obj) => Event::Deleted(obj),
            runtime_watcher::Event::Restarted(objs) => Event::Restarted(objs),
        });
        futures::future::ready(Some(event))
    })
}
