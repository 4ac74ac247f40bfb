use error::*;

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::NotFound)]
#[error("No function named '{name}' is known to the platform.")]
pub struct FunctionNotFound {
    pub name: String,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to provision a pod for function '{name}' via the controller.")]
pub struct ColdStartFailure {
    pub name: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("Function '{name}' did not answer before the request deadline.")]
pub struct ExecuteTransportFailure {
    pub name: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("The request body for function '{name}' could not be read.")]
pub struct BodyReadFailure {
    pub name: String,
    #[source]
    pub cause: StringError,
}
