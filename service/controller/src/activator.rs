use crate::env::Env;
use crate::errors::{ActivationFailed, PodCreateFailure, PodNeverReady, PodUpdateFailure, SidecarDialFailure};
use crate::fnapi_client::FnApi;
use crate::fnpod;
use crate::pool::WarmPool;
use error::StringError;
use k8s::{pod, PodExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, ResourceExt};
use log::{info, warn};
use result::Result;
use sidecar_proto::sidecar_client::SidecarClient;
use sidecar_proto::{activate_request, ActivateRequest};
use std::time::Duration;
use term_colors::*;
use tonic::transport::Channel;

/// Port every sidecar listens on, matching `service/sidecar`'s default.
const SIDECAR_PORT: u16 = 9090;
const ACTIVATE_DEADLINE: Duration = Duration::from_millis(500);
const PROVISION_POLL_INTERVAL: Duration = Duration::from_millis(50);
const PROVISION_POLL_BUDGET: Duration = Duration::from_secs(15);

pub struct Activated {
    pub pod_name: String,
    pub pod_ip: String,
    pub version: i64,
}

/// Implements `Controller.NewFunctionPod`: resolve the function against
/// fnapi, take a warm pod (or provision one synchronously), activate it,
/// and commit the label/annotation change that promotes it to Active.
pub async fn new_function_pod(
    env: &Env,
    pool: &WarmPool,
    fnapi: &FnApi,
    api: &Api<Pod>,
    name: &str,
) -> Result<Activated> {
    let resolved = fnapi.get(name).await?;

    let (pod_name, pod) = match pool.pop().await {
        Some(found) => found,
        None => provision_synchronously(env, api).await?,
    };

    let ip = pod.ip().unwrap_or_default();
    let activation = activate(&ip, &resolved.code_link).await;

    let committed = commit(api, &pod_name, name, resolved.version).await?;

    if let Err(err) = activation {
        warn!(
            "activation failed for pod {}, function {}: {}",
            cyan(&pod_name),
            cyan(name),
            err
        );
        return Err(err);
    }

    Ok(Activated {
        pod_name,
        pod_ip: committed.ip().unwrap_or(ip),
        version: resolved.version,
    })
}

async fn provision_synchronously(env: &Env, api: &Api<Pod>) -> Result<(String, Pod)> {
    let pod = fnpod::new_function_pod(env, true);
    let created = api
        .create(&PostParams::default(), &pod)
        .await
        .map_err(|cause| PodCreateFailure {
            namespace: env.namespace.clone(),
            cause: StringError::from(cause.to_string()),
        })?;
    let name = created.name();
    info!("provisioned pod {} synchronously for a cold start", cyan(&name));

    let deadline = tokio::time::Instant::now() + PROVISION_POLL_BUDGET;
    loop {
        let current = api.get(&name).await.map_err(|cause| PodCreateFailure {
            namespace: env.namespace.clone(),
            cause: StringError::from(cause.to_string()),
        })?;
        if current.ready() {
            return Ok((name, current));
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PodNeverReady {}.into());
        }
        tokio::time::sleep(PROVISION_POLL_INTERVAL).await;
    }
}

async fn activate(ip: &str, code_link: &str) -> Result<()> {
    let endpoint = format!("http://{}:{}", ip, SIDECAR_PORT);
    let channel = Channel::from_shared(endpoint)
        .map_err(|err| SidecarDialFailure {
            pod: ip.to_string(),
            cause: StringError::from(err.to_string()),
        })?
        .connect()
        .await
        .map_err(|err| SidecarDialFailure {
            pod: ip.to_string(),
            cause: StringError::from(err.to_string()),
        })?;
    let mut client = SidecarClient::new(channel);
    let mut request = tonic::Request::new(ActivateRequest {
        code: Some(activate_request::Code::Link(code_link.to_string())),
    });
    request.set_timeout(ACTIVATE_DEADLINE);
    client.activate(request).await.map_err(|status| {
        Box::new(ActivationFailed {
            pod: ip.to_string(),
            message: status.message().to_string(),
        }) as Box<dyn error::SfError>
    })?;
    Ok(())
}

/// Clears `locked`, sets `function`/`version`, making the pod Active and
/// visible to the router's watcher. Runs unconditionally, even when
/// activation failed, per spec: the router should not keep retrying
/// against a half-activated pod once it sees it via the watch.
async fn commit(api: &Api<Pod>, pod_name: &str, function: &str, version: i64) -> Result<Pod> {
    let patch = serde_json::json!({
        "metadata": {
            "labels": {
                pod::LABEL_FUNCTION: function,
            },
            "annotations": {
                pod::ANNOTATION_VERSION: version.to_string(),
                pod::ANNOTATION_LOCKED: serde_json::Value::Null,
            }
        }
    });
    api.patch(pod_name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|cause| {
            PodUpdateFailure {
                pod: pod_name.to_string(),
                cause: StringError::from(cause.to_string()),
            }
            .into()
        })
}
