use crate::activate::{self, Code};
use crate::errors::*;
use crate::state::SidecarState;
use sidecar_proto::sidecar_server::Sidecar;
use sidecar_proto::{
    activate_request, ActivateRequest, ActivateResponse, ExecuteRequest, ExecuteResponse,
    HeaderValues, MetricsRequest, MetricsResponse,
};
use log::{debug, error};
use std::collections::HashMap;
use std::str::FromStr;
use term_colors::*;
use tonic::{Request, Response, Status};

const FUNCTION_PORT: u16 = 8081;

pub struct SidecarService {
    state: SidecarState,
    http: reqwest::Client,
}

impl SidecarService {
    pub fn new() -> Self {
        Self {
            state: SidecarState::new(),
            http: reqwest::Client::new(),
        }
    }
}

impl Default for SidecarService {
    fn default() -> Self {
        Self::new()
    }
}

#[tonic::async_trait]
impl Sidecar for SidecarService {
    async fn activate(
        &self,
        request: Request<ActivateRequest>,
    ) -> std::result::Result<Response<ActivateResponse>, Status> {
        let code = match request.into_inner().code {
            Some(activate_request::Code::Inline(bytes)) => Code::Inline(bytes),
            Some(activate_request::Code::Link(link)) => Code::Link(link),
            None => return Err(status_of(NoCodeGiven {}.into())),
        };
        activate::activate(&self.state, code)
            .await
            .map(|()| Response::new(ActivateResponse {}))
            .map_err(status_of)
    }

    async fn execute(
        &self,
        request: Request<ExecuteRequest>,
    ) -> std::result::Result<Response<ExecuteResponse>, Status> {
        if self.state.terminate().await {
            return Err(status_of(AlreadyTerminating {}.into()));
        }
        let req = request.into_inner();
        let method = reqwest::Method::from_str(&req.method).map_err(|_| {
            status_of(
                InvalidMethod {
                    method: req.method.clone(),
                }
                .into(),
            )
        })?;
        let url = format!(
            "http://localhost:{}/{}{}",
            FUNCTION_PORT,
            req.path.trim_start_matches('/'),
            encode_query(&req.query)
        );
        let mut builder = self.http.request(method, url);
        for (name, values) in &req.header {
            for value in &values.values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        let response = builder.body(req.body).send().await;
        match response {
            Ok(response) => {
                self.state.touch_last_req().await;
                let status_code = response.status().as_u16() as u32;
                let status_line = response.status().to_string();
                let header = collect_headers(response.headers());
                let body = response
                    .bytes()
                    .await
                    .map(|bytes| bytes.to_vec())
                    .unwrap_or_default();
                Ok(Response::new(ExecuteResponse {
                    status_code,
                    status: status_line,
                    header,
                    body,
                }))
            }
            Err(err) => {
                self.state.set_terminate(true).await;
                error!("Execute lost its function process, marking pod for termination: {:?}", err);
                Err(status_of(
                    ExecuteTransportFailure {
                        cause: error::StringError::from(err.to_string()),
                    }
                    .into(),
                ))
            }
        }
    }

    async fn metrics(
        &self,
        request: Request<MetricsRequest>,
    ) -> std::result::Result<Response<MetricsResponse>, Status> {
        let from_controller = request.into_inner().from_controller;
        if self.state.activating().await {
            return Ok(Response::new(MetricsResponse {
                terminate: false,
                ..Default::default()
            }));
        }
        if self.state.terminate().await {
            return Ok(Response::new(MetricsResponse {
                terminate: true,
                ..Default::default()
            }));
        }
        let url = format!("http://localhost:{}/api/ping", FUNCTION_PORT);
        let ping = self.http.get(&url).send().await;
        let (load_avg, free_mem) = match ping {
            Ok(response) if response.status().is_success() => {
                match response.json::<Ping>().await {
                    Ok(ping) => (ping.load_avg, ping.free_mem),
                    Err(_) => (Vec::new(), 0),
                }
            }
            Ok(_) => (Vec::new(), 0),
            Err(err) => {
                self.state.set_terminate(true).await;
                debug!("Metrics could not reach the function process: {:?}", err);
                return Ok(Response::new(MetricsResponse {
                    terminate: true,
                    ..Default::default()
                }));
            }
        };
        let now = tokio::time::Instant::now();
        let (last_req_s, last_ping_s) = self.state.elapsed(now).await;
        if from_controller {
            self.state.touch_last_ping().await;
        }
        Ok(Response::new(MetricsResponse {
            load_avg,
            free_mem,
            last_req_s,
            last_ping_s,
            terminate: false,
        }))
    }
}

#[derive(serde::Deserialize, Default)]
struct Ping {
    load_avg: Vec<f64>,
    free_mem: u64,
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, HeaderValues> {
    let mut collected: HashMap<String, HeaderValues> = HashMap::new();
    for (name, value) in headers.iter() {
        let value = match value.to_str() {
            Ok(value) => value.to_string(),
            Err(_) => continue,
        };
        collected
            .entry(name.to_string())
            .or_insert_with(|| HeaderValues { values: vec![] })
            .values
            .push(value);
    }
    collected
}

fn encode_query(query: &HashMap<String, HeaderValues>) -> String {
    if query.is_empty() {
        return String::new();
    }
    let mut pairs = Vec::new();
    for (key, values) in query {
        for value in &values.values {
            pairs.push(format!(
                "{}={}",
                urlencode(key),
                urlencode(value)
            ));
        }
    }
    format!("?{}", pairs.join("&"))
}

fn urlencode(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, percent_encoding::NON_ALPHANUMERIC).to_string()
}

fn status_of(err: Box<dyn error::SfError>) -> Status {
    use error::HttpCode;
    let code = match err.http_code().code {
        400 => tonic::Code::InvalidArgument,
        404 => tonic::Code::NotFound,
        409 => tonic::Code::FailedPrecondition,
        503 => tonic::Code::Unavailable,
        _ => tonic::Code::Internal,
    };
    Status::new(code, format!("{}", err))
}
