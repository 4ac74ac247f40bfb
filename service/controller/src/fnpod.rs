use crate::env::Env;
use k8s::pod::{ANNOTATION_LOCKED, APP_SF_FUNC, LABEL_APP, LABEL_CONTROLLER};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, Pod, PodSecurityContext, PodSpec, ResourceRequirements,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

const SHARED_VOLUME: &str = "shared-data";
const SHARED_MOUNT: &str = "/shared";

/// Builds the two-container pod spec every function instance runs as:
/// a read-only `function` container running the user's code and a
/// read-write `sidecar` container that materializes it. Both mount the
/// same `emptyDir` scratch volume. `locked` marks the pod as mid
/// synchronous-activation, hiding it from the warm-pool watcher until the
/// activator clears the annotation (or the 60s safety valve does).
pub fn new_function_pod(env: &Env, locked: bool) -> Pod {
    let resources = container_resources();

    let function = Container {
        name: "function".to_string(),
        image: Some(env.fn_lang_image.clone()),
        volume_mounts: Some(vec![VolumeMount {
            name: SHARED_VOLUME.to_string(),
            mount_path: SHARED_MOUNT.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        security_context: Some(container_security_context()),
        resources: Some(resources.clone()),
        ..Default::default()
    };

    let sidecar = Container {
        name: "sidecar".to_string(),
        image: Some(env.sidecar_image.clone()),
        volume_mounts: Some(vec![VolumeMount {
            name: SHARED_VOLUME.to_string(),
            mount_path: SHARED_MOUNT.to_string(),
            read_only: Some(false),
            ..Default::default()
        }]),
        security_context: Some(container_security_context()),
        resources: Some(resources),
        ..Default::default()
    };

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP.to_string(), APP_SF_FUNC.to_string());
    labels.insert("release".to_string(), env.helm_release.clone());
    labels.insert(LABEL_CONTROLLER.to_string(), env.controller_name.clone());

    let annotations = if locked {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_LOCKED.to_string(), "true".to_string());
        Some(annotations)
    } else {
        None
    };

    Pod {
        metadata: ObjectMeta {
            generate_name: Some("sf-pod-".to_string()),
            labels: Some(labels),
            annotations,
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            volumes: Some(vec![Volume {
                name: SHARED_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }]),
            containers: vec![function, sidecar],
            security_context: Some(pod_security_context()),
            ..Default::default()
        }),
        status: None,
    }
}

fn pod_security_context() -> PodSecurityContext {
    PodSecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(65534),
        ..Default::default()
    }
}

fn container_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(true),
        ..Default::default()
    }
}

fn container_resources() -> ResourceRequirements {
    let mut limits = BTreeMap::new();
    limits.insert("memory".to_string(), Quantity("500Mi".to_string()));
    limits.insert("cpu".to_string(), Quantity("1000m".to_string()));

    let mut requests = BTreeMap::new();
    requests.insert("memory".to_string(), Quantity("50Mi".to_string()));
    requests.insert("cpu".to_string(), Quantity("20m".to_string()));

    ResourceRequirements {
        limits: Some(limits),
        requests: Some(requests),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env {
            namespace: "default".to_string(),
            controller_name: "sanfran-controller-abc".to_string(),
            controller_uid: "abc-123".to_string(),
            fn_lang_image: "sanfran/node-runtime:latest".to_string(),
            sidecar_image: "sanfran/sidecar:latest".to_string(),
            helm_release: "sanfran".to_string(),
        }
    }

    #[test]
    fn builds_two_containers_with_shared_volume() {
        let pod = new_function_pod(&env(), false);
        let spec = pod.spec.unwrap();
        assert_eq!(spec.containers.len(), 2);
        assert_eq!(spec.containers[0].name, "function");
        assert_eq!(spec.containers[1].name, "sidecar");
        assert_eq!(spec.volumes.unwrap().len(), 1);
        assert_eq!(pod.metadata.annotations, None);
    }

    #[test]
    fn locked_pod_carries_locked_annotation() {
        let pod = new_function_pod(&env(), true);
        let annotations = pod.metadata.annotations.unwrap();
        assert_eq!(annotations.get(ANNOTATION_LOCKED), Some(&"true".to_string()));
    }

    #[test]
    fn labels_identify_app_and_owning_controller() {
        let pod = new_function_pod(&env(), false);
        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_APP), Some(&APP_SF_FUNC.to_string()));
        assert_eq!(
            labels.get(LABEL_CONTROLLER),
            Some(&"sanfran-controller-abc".to_string())
        );
    }
}
