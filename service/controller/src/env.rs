use std::fs;

/// Identity and image configuration read once at startup. Adapted from the
/// upstream `config.go` free functions into methods gathered in one place so
/// a binary's configuration is visible at its call site instead of scattered
/// `std::env::var` calls.
#[derive(Clone, Debug)]
pub struct Env {
    pub namespace: String,
    pub controller_name: String,
    pub controller_uid: String,
    pub fn_lang_image: String,
    pub sidecar_image: String,
    pub helm_release: String,
}

impl Env {
    pub fn load() -> Self {
        Self {
            namespace: std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string()),
            controller_name: require_env("CONTROLLER_NAME"),
            controller_uid: require_env("CONTROLLER_UID"),
            fn_lang_image: require_env("FN_LANG_IMAGE"),
            sidecar_image: require_env("SIDECAR_IMAGE"),
            helm_release: require_env("HELM_RELEASE"),
        }
    }

    /// Label selector identifying every pod this controller owns.
    pub fn owned_pods_selector(&self) -> String {
        format!("app=sf-func,controller={}", self.controller_name)
    }

    /// Label selector for the warm-pool watch: owned pods that are not yet
    /// specialized to a function.
    pub fn warm_pool_selector(&self) -> String {
        format!("app=sf-func,controller={},!function", self.controller_name)
    }
}

fn require_env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("required environment variable {} is unset", name))
}

/// Default warm-pool target used when the pool size file is missing or
/// unparsable, matching `controller/config.go`'s `MAX_READY_PODS` fallback.
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Path to the file the autoscaler re-reads every cycle for the warm-pool
/// target. Re-read rather than cached, per spec: an operator can push a new
/// target without restarting the controller.
pub const POOL_SIZE_PATH: &str = "/etc/sanfran-config/controller.poolsize";

/// Reads the warm-pool target from [POOL_SIZE_PATH], defaulting to
/// [DEFAULT_POOL_SIZE] when the file is missing, empty, or not an integer.
pub fn pool_size() -> usize {
    fs::read_to_string(POOL_SIZE_PATH)
        .ok()
        .and_then(|contents| contents.trim().parse().ok())
        .unwrap_or(DEFAULT_POOL_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_falls_back_when_file_absent() {
        assert_eq!(pool_size(), DEFAULT_POOL_SIZE);
    }
}
