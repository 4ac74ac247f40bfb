/// Identity and collaborator configuration the router reads once at startup.
/// Unlike the controller, the router does not own pods itself, so it carries
/// no `controller` identity — its watch selector spans every controller's
/// pods, matching the upstream `watcher.go`'s unscoped `function` selector.
#[derive(Clone, Debug)]
pub struct Env {
    pub namespace: String,
    pub helm_release: String,
}

impl Env {
    pub fn load() -> Self {
        Self {
            namespace: std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string()),
            helm_release: require_env("HELM_RELEASE"),
        }
    }

    /// Selector for Active pods across the whole namespace: specialized to
    /// some function, regardless of which controller owns them.
    pub fn active_pods_selector(&self) -> String {
        "app=sf-func,function".to_string()
    }
}

fn require_env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("required environment variable {} is unset", name))
}
