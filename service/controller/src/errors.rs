use error::*;

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::NotFound)]
#[error("No function named '{name}' is known to fnapi.")]
pub struct FunctionNotFound {
    pub name: String,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to resolve function '{name}' against fnapi.")]
pub struct FnApiTransportFailure {
    pub name: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to create a new pod in namespace '{namespace}'.")]
pub struct PodCreateFailure {
    pub namespace: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("A newly created pod never became ready within the 15s provisioning deadline.")]
pub struct PodNeverReady {}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("Could not reach the sidecar on pod '{pod}' to activate it.")]
pub struct SidecarDialFailure {
    pub pod: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Sidecar on pod '{pod}' rejected activation: {message}")]
pub struct ActivationFailed {
    pub pod: String,
    pub message: String,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to patch pod '{pod}' to commit its new labels/annotations.")]
pub struct PodUpdateFailure {
    pub pod: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("Could not reach the sidecar on pod '{pod}' to collect metrics.")]
pub struct MetricsDialFailure {
    pub pod: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to list pods for selector '{selector}'.")]
pub struct PodListFailure {
    pub selector: String,
    #[source]
    pub cause: StringError,
}
