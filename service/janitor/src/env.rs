/// Identity configuration the janitor reads once per invocation. Mirrors
/// the other binaries' `Env::load`, though the janitor only ever needs the
/// namespace it is scoped to.
#[derive(Clone, Debug)]
pub struct Env {
    pub namespace: String,
}

impl Env {
    pub fn load() -> Self {
        Self {
            namespace: std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string()),
        }
    }
}
