use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerState, Pod, PodStatus};

/// Label carried by every pod this platform schedules, warm or active.
pub const LABEL_APP: &str = "app";
pub const APP_SF_FUNC: &str = "sf-func";
/// Label naming the controller that owns a pod. Derived from that
/// controller's own identity env, not from anything the pod itself chose.
pub const LABEL_CONTROLLER: &str = "controller";
/// Label present only once a pod has been specialized for a function.
/// Its absence is exactly what distinguishes Warm from Active.
pub const LABEL_FUNCTION: &str = "function";
/// Annotation recording the version a pod was activated against.
pub const ANNOTATION_VERSION: &str = "version";
/// Annotation hiding a pod mid-synchronous-activation from the warm-pool
/// watcher. Race-avoidance marker, not an authorization lock.
pub const ANNOTATION_LOCKED: &str = "locked";

/// PodExt answers the lifecycle questions the warm pool, the router and the
/// autoscaler all need to ask of a pod, per the Warm / Activating / Active /
/// Terminated state machine: IP assignment, both-containers-Running,
/// `function`/`version`/`locked`/`controller` label and annotation reads,
/// and pod age.
pub trait PodExt {
    /// `Some(ip)` once the orchestrator has assigned one.
    fn ip(&self) -> Option<String>;
    /// True once both containers (function + sidecar) report Running.
    /// A pod with any other container count is never considered running.
    fn running(&self) -> bool;
    /// True once [ip](PodExt::ip) is set and [running](PodExt::running) holds.
    fn ready(&self) -> bool;
    /// True if a deletion timestamp has been set by the orchestrator.
    fn deleting(&self) -> bool;
    /// True only once both of this platform's two containers are reporting
    /// status and at least one of them has terminated. A pod that hasn't
    /// reported any (or not yet both) container statuses — e.g. one still
    /// Provisioning — is not considered exited.
    fn exited(&self) -> bool;
    /// True while the `locked` annotation is present (synchronous
    /// activation in progress, or a crashed one that hasn't hit the
    /// 60s safety window yet).
    fn locked(&self) -> bool;
    /// `Some(name)` once the `function` label has been set.
    fn function(&self) -> Option<String>;
    /// The `version` annotation, parsed. `None` if absent or unparsable.
    fn version(&self) -> Option<i64>;
    /// The `controller` label identifying the owning controller.
    fn controller(&self) -> Option<String>;
    /// Wall-clock age since the orchestrator recorded creation.
    fn age(&self) -> chrono::Duration;
}

impl PodExt for Pod {
    fn ip(&self) -> Option<String> {
        self.status.as_ref()?.pod_ip.clone()
    }

    fn running(&self) -> bool {
        let default_status = PodStatus::default();
        let statuses = &self
            .status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses;
        let statuses = match statuses {
            Some(statuses) => statuses,
            None => return false,
        };
        statuses.len() == 2
            && statuses.iter().all(|status| {
                status
                    .state
                    .as_ref()
                    .unwrap_or(&ContainerState::default())
                    .running
                    .is_some()
            })
    }

    fn ready(&self) -> bool {
        self.ip().is_some() && self.running()
    }

    fn deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn exited(&self) -> bool {
        let default_status = PodStatus::default();
        let statuses = self
            .status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref();
        match statuses {
            Some(statuses) if statuses.len() == 2 => statuses.iter().any(|status| {
                status
                    .state
                    .as_ref()
                    .unwrap_or(&ContainerState::default())
                    .terminated
                    .is_some()
            }),
            _ => false,
        }
    }

    fn locked(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .map(|annotations| annotations.contains_key(ANNOTATION_LOCKED))
            .unwrap_or(false)
    }

    fn function(&self) -> Option<String> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LABEL_FUNCTION))
            .cloned()
    }

    fn version(&self) -> Option<i64> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(ANNOTATION_VERSION))
            .and_then(|version| version.parse().ok())
    }

    fn controller(&self) -> Option<String> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LABEL_CONTROLLER))
            .cloned()
    }

    fn age(&self) -> chrono::Duration {
        let created: Option<DateTime<Utc>> = self
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|time| time.0);
        match created {
            Some(created) => Utc::now() - created,
            None => chrono::Duration::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, ContainerStateRunning, ContainerStatus, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn running_status(name: &str) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            state: Some(ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn warm_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("sf-pod-abc".to_string()),
                labels: Some(BTreeMap::from([
                    (LABEL_APP.to_string(), APP_SF_FUNC.to_string()),
                    (LABEL_CONTROLLER.to_string(), "sanfran-controller".to_string()),
                ])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "function".to_string(),
                        ..Default::default()
                    },
                    Container {
                        name: "sidecar".to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            status: Some(PodStatus {
                pod_ip: Some("10.0.0.5".to_string()),
                container_statuses: Some(vec![running_status("function"), running_status("sidecar")]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn warm_pod_is_ready_and_has_no_function() {
        let pod = warm_pod();
        assert!(pod.ready());
        assert!(!pod.locked());
        assert_eq!(pod.function(), None);
        assert_eq!(pod.controller(), Some("sanfran-controller".to_string()));
    }

    #[test]
    fn provisioning_pod_is_not_ready() {
        let mut pod = warm_pod();
        pod.status = None;
        assert!(!pod.ready());
    }

    #[test]
    fn active_pod_reports_function_and_version() {
        let mut pod = warm_pod();
        pod.metadata
            .labels
            .as_mut()
            .unwrap()
            .insert(LABEL_FUNCTION.to_string(), "hello".to_string());
        pod.metadata.annotations = Some(BTreeMap::from([(
            ANNOTATION_VERSION.to_string(),
            "7".to_string(),
        )]));
        assert_eq!(pod.function(), Some("hello".to_string()));
        assert_eq!(pod.version(), Some(7));
    }

    #[test]
    fn locked_pod_is_reported_locked() {
        let mut pod = warm_pod();
        pod.metadata.annotations = Some(BTreeMap::from([(
            ANNOTATION_LOCKED.to_string(),
            "true".to_string(),
        )]));
        assert!(pod.locked());
    }

    #[test]
    fn single_container_pod_never_runs_but_is_not_exited() {
        let mut pod = warm_pod();
        pod.status.as_mut().unwrap().container_statuses =
            Some(vec![running_status("function")]);
        assert!(!pod.running());
        assert!(!pod.exited());
    }

    #[test]
    fn provisioning_pod_with_no_statuses_is_not_exited() {
        let mut pod = warm_pod();
        pod.status.as_mut().unwrap().container_statuses = None;
        assert!(!pod.exited());
    }

    #[test]
    fn terminated_container_counts_as_exited() {
        let mut pod = warm_pod();
        pod.status.as_mut().unwrap().container_statuses = Some(vec![
            ContainerStatus {
                name: "function".to_string(),
                state: Some(ContainerState {
                    terminated: Some(Default::default()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            running_status("sidecar"),
        ]);
        assert!(pod.exited());
    }

    #[test]
    fn age_of_unset_creation_timestamp_is_zero() {
        let pod = warm_pod();
        assert_eq!(pod.age(), chrono::Duration::zero());
    }

    #[test]
    fn age_reflects_elapsed_wall_clock() {
        let mut pod = warm_pod();
        pod.metadata.creation_timestamp = Some(Time(Utc::now() - chrono::Duration::seconds(90)));
        assert!(pod.age() >= chrono::Duration::seconds(89));
    }
}
