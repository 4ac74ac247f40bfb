use crate::errors::ApiError;
use kube::api::ObjectMeta;
use kube::core::Resource;
use kube::Api;

/// The namespace every component operates within, read from `NAMESPACE` on
/// every call so a changed environment is picked up without a restart.
/// Defaults to `"default"` when unset, matching the upstream controller's
/// `getNamespace()`.
pub fn namespace() -> String {
    std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

/// Returns a new Kubernetes client scoped to [namespace](crate::client::namespace).
///
/// This function panics if there is any error encountered while constructing the required
/// configuration object from the environment. This is because a missing Kubernetes environment
/// is extremely terminal for which there truly is no alternative besides crashing.
pub async fn new<K>() -> Api<K>
where
    <K as Resource>::DynamicType: Default,
    K: k8s_openapi::Metadata<Ty = ObjectMeta>,
{
    new_with_namespace(namespace()).await
}

/// Returns a new Kubernetes client configured for the given namespace.
///
/// This function panics if there is any error encountered while constructing the required
/// configuration object from the environment. This is because a missing Kubernetes environment
/// is extremely terminal for which there truly is no alternative besides crashing.
async fn new_with_namespace<K, N>(namespace: N) -> Api<K>
where
    <K as Resource>::DynamicType: Default,
    K: k8s_openapi::Metadata<Ty = ObjectMeta>,
    N: AsRef<str>,
{
    Api::namespaced(
        kube::Client::try_default()
            .await
            .map_err(ApiError::from)
            .unwrap(),
        namespace.as_ref(),
    )
}
