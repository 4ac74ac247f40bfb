pub mod client;
pub mod errors;
pub mod pod;
pub mod watcher;

pub use pod::PodExt;

use either::Either;
use kube::api::DeleteParams;
use kube::Api;
use result::Result;

use errors::ApiError;
use k8s_openapi::api::core::v1::Pod;
use kube::core::response::Status;
use kube::error::ErrorResponse;

/// Delete a named pod from the configured namespace.
///
/// When you get a `K` via `Left`, your delete has started. When you get a `Status` via
/// `Right`, the object was already gone and this should be treated as a confirmation
/// rather than a failure.
///
/// 4XX and 5XX status types other than 404 are returned as an `Err(Box<dyn SfError>)`.
pub async fn delete<I: AsRef<str>>(id: I) -> Result<Either<Pod, Status>> {
    let client: Api<Pod> = client::new().await;
    Ok(client
        .delete(
            id.as_ref(),
            &DeleteParams {
                dry_run: false,
                grace_period_seconds: Some(60), // We return immediately, but the connector is given 60 seconds to shutdown cleanly.
                propagation_policy: None,
                preconditions: None,
            },
        )
        .await
        .or_else(|result| match result {
            kube::error::Error::Api(ErrorResponse { code: 404, .. }) => {
                Ok(Either::Right(kube::core::response::Status {
                    status: "".to_string(),
                    message: "".to_string(),
                    reason: "".to_string(),
                    details: None,
                    code: 0,
                }))
            }
            err => Err(err),
        })
        .map_err(ApiError::from)?)
}
