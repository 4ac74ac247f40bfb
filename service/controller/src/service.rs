use crate::activator;
use crate::env::Env;
use crate::fnapi_client::FnApi;
use crate::pool::WarmPool;
use controller_proto::controller_server::Controller;
use controller_proto::{NewFunctionPodRequest, NewFunctionPodResponse};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct ControllerService {
    env: Arc<Env>,
    pool: Arc<WarmPool>,
    fnapi: FnApi,
    api: Api<Pod>,
}

impl ControllerService {
    pub fn new(env: Arc<Env>, pool: Arc<WarmPool>, fnapi: FnApi, api: Api<Pod>) -> Self {
        Self {
            env,
            pool,
            fnapi,
            api,
        }
    }
}

#[tonic::async_trait]
impl Controller for ControllerService {
    async fn new_function_pod(
        &self,
        request: Request<NewFunctionPodRequest>,
    ) -> std::result::Result<Response<NewFunctionPodResponse>, Status> {
        let name = request.into_inner().name;
        activator::new_function_pod(&self.env, &self.pool, &self.fnapi, &self.api, &name)
            .await
            .map(|activated| {
                Response::new(NewFunctionPodResponse {
                    pod_name: activated.pod_name,
                    pod_ip: activated.pod_ip,
                    version: activated.version,
                })
            })
            .map_err(status_of)
    }
}

fn status_of(err: Box<dyn error::SfError>) -> Status {
    use error::HttpCode;
    let code = match err.http_code().code {
        404 => tonic::Code::NotFound,
        400 => tonic::Code::InvalidArgument,
        503 => tonic::Code::Unavailable,
        _ => tonic::Code::Internal,
    };
    Status::new(code, format!("{}", err))
}
