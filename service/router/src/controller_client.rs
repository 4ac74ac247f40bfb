use crate::errors::{ColdStartFailure, FunctionNotFound};
use controller_proto::controller_client::ControllerClient;
use controller_proto::NewFunctionPodRequest;
use error::StringError;
use result::Result;
use std::time::Duration;
use tonic::transport::Channel;

const NEW_FUNCTION_POD_DEADLINE: Duration = Duration::from_secs(15);
/// Named port `clb` resolves on controller pods; falls back to clb's
/// default port if the controller declares no port under this name.
const CONTROLLER_PORT_NAME: &str = "grpc";
const CONTROLLER_SERVICE: &str = "sanfran-controller";

/// What a successful cold start hands back: the freshly activated pod's
/// name, IP, and the version it now serves.
pub struct Activated {
    pub pod_ip: String,
    pub version: i64,
}

#[derive(Clone)]
pub struct Controller {
    client: ControllerClient<Channel>,
}

impl Controller {
    /// Dials the controller pod set via clb, exactly as the controller
    /// itself dials fnapi.
    pub fn connect() -> Self {
        let channel = clb::dial(CONTROLLER_SERVICE, CONTROLLER_PORT_NAME);
        Self {
            client: ControllerClient::new(channel),
        }
    }

    pub async fn new_function_pod(&self, name: &str) -> Result<Activated> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(NewFunctionPodRequest {
            name: name.to_string(),
        });
        request.set_timeout(NEW_FUNCTION_POD_DEADLINE);
        let response = client.new_function_pod(request).await.map_err(|status| {
            if status.code() == tonic::Code::NotFound {
                Box::new(FunctionNotFound {
                    name: name.to_string(),
                }) as Box<dyn error::SfError>
            } else {
                Box::new(ColdStartFailure {
                    name: name.to_string(),
                    cause: StringError::from(status.to_string()),
                }) as Box<dyn error::SfError>
            }
        })?;
        let response = response.into_inner();
        Ok(Activated {
            pod_ip: response.pod_ip,
            version: response.version,
        })
    }
}
