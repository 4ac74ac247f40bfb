use crate::errors::{FnApiTransportFailure, FunctionNotFound};
use error::StringError;
use fnapi_proto::fn_api_client::FnApiClient;
use fnapi_proto::GetRequest;
use result::Result;
use std::time::Duration;
use tonic::transport::Channel;

const GET_DEADLINE: Duration = Duration::from_millis(400);
/// Named port `clb` resolves on fnapi pods; falls back to clb's default
/// port if fnapi declares no port under this name.
const FNAPI_PORT_NAME: &str = "grpc";
const FNAPI_SERVICE: &str = "sanfran-fnapi";

/// Resolved answer from fnapi for a function name: its current version and
/// a ready-to-use code URL a sidecar can `GET` directly.
pub struct Resolved {
    pub version: i64,
    pub code_link: String,
}

#[derive(Clone)]
pub struct FnApi {
    client: FnApiClient<Channel>,
}

impl FnApi {
    /// Dials the fnapi pod set via clb, the same label-watch load balancer
    /// the router and controller use for every other collaborator service.
    pub fn connect() -> Self {
        let channel = clb::dial(FNAPI_SERVICE, FNAPI_PORT_NAME);
        Self {
            client: FnApiClient::new(channel),
        }
    }

    pub async fn get(&self, name: &str) -> Result<Resolved> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(GetRequest {
            name: name.to_string(),
        });
        request.set_timeout(GET_DEADLINE);
        let response = client.get(request).await.map_err(|status| {
            if status.code() == tonic::Code::NotFound {
                Box::new(FunctionNotFound {
                    name: name.to_string(),
                }) as Box<dyn error::SfError>
            } else {
                Box::new(FnApiTransportFailure {
                    name: name.to_string(),
                    cause: StringError::from(status.to_string()),
                }) as Box<dyn error::SfError>
            }
        })?;
        let response = response.into_inner();
        Ok(Resolved {
            version: response.version,
            code_link: response.code_link,
        })
    }
}
