use error::*;

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::Conflict)]
#[error(
    "Activate was called while this pod is already marked for termination. A terminating pod \
cannot be reused; the caller should request a fresh pod from the controller."
)]
pub struct AlreadyTerminating {}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::BadRequest)]
#[error("Activate requires exactly one of inline code bytes or a code link, but neither was given.")]
pub struct NoCodeGiven {}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to prepare the local function volume at '{path}'.")]
pub struct FuncFolderError {
    pub path: String,
    #[source]
    pub cause: std::io::Error,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to write the function's code to '{path}'.")]
pub struct CodeWriteError {
    pub path: String,
    #[source]
    pub cause: std::io::Error,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to fetch the function's code from '{link}' after exhausting retries.")]
pub struct CodeFetchError {
    pub link: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("The code archive fetched from '{link}' could not be unzipped into the function volume.")]
pub struct CodeUnzipError {
    pub link: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("The function process rejected activation with HTTP {status}: {body}")]
pub struct ActivationRejected {
    pub status: u16,
    pub body: String,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("Failed to signal the function process to activate.")]
pub struct ActivationSignalFailure {
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("The function process never became ready within the activation deadline.")]
pub struct ActivationTimedOut {}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("Failed to reach the function process on localhost while executing a request.")]
pub struct ExecuteTransportFailure {
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::BadRequest)]
#[error("The HTTP method '{method}' given to Execute is not a recognized method.")]
pub struct InvalidMethod {
    pub method: String,
}
