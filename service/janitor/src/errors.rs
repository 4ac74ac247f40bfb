use error::*;

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to list controller pods for selector '{selector}'.")]
pub struct ControllerListFailure {
    pub selector: String,
    #[source]
    pub cause: StringError,
}

#[derive(Error, SfError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error("Failed to list function pods for selector '{selector}'.")]
pub struct OrphanListFailure {
    pub selector: String,
    #[source]
    pub cause: StringError,
}
