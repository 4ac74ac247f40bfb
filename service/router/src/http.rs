use crate::controller_client::Controller;
use crate::errors::*;
use crate::routes::RouteTable;
use error::StringError;
use log::{info, warn};
use result::Result;
use rocket::data::{Data, ToByteUnit};
use rocket::http::{Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::{Response as RocketResponse, State};
use sidecar_proto::{ExecuteRequest, HeaderValues};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use term_colors::*;

const EXECUTE_DEADLINE: Duration = Duration::from_secs(1);
const MAX_BODY_MB: u64 = 10;
/// Hop-by-hop headers the router strips before forwarding, per
/// `router/httpd.go`'s `httpToExecuteReq`.
const STRIPPED_HEADERS: &[&str] = &["upgrade-insecure-requests"];

pub struct RouterState {
    pub table: Arc<RouteTable>,
    pub controller: Controller,
}

/// A proxied HTTP response: status, headers and body copied verbatim from
/// the sidecar's reply, plus the platform's `X-Powered-By` header. This is
/// deliberately NOT `response::Response<T>` — a function's own status code
/// and body are not a platform error and must pass through untouched.
pub struct Upstream {
    pub status: u16,
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
}

impl<'r> Responder<'r, 'static> for Upstream {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut builder = RocketResponse::build();
        builder.status(Status::new(self.status));
        for (name, values) in self.headers {
            for value in values {
                builder.header_adjoin(Header::new(name.clone(), value));
            }
        }
        builder.header_adjoin(Header::new("X-Powered-By", "SanFran/Alpha"));
        builder.sized_body(self.body.len(), Cursor::new(self.body));
        Ok(builder.finalize())
    }
}

#[rocket::get("/fn/<name>/<path..>")]
pub async fn exec_get(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    proxy(name, path, req, Vec::new(), state).await
}

#[rocket::post("/fn/<name>/<path..>", data = "<data>")]
pub async fn exec_post(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    data: Data<'_>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    let body = read_body(&name, data).await?;
    proxy(name, path, req, body, state).await
}

#[rocket::put("/fn/<name>/<path..>", data = "<data>")]
pub async fn exec_put(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    data: Data<'_>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    let body = read_body(&name, data).await?;
    proxy(name, path, req, body, state).await
}

#[rocket::patch("/fn/<name>/<path..>", data = "<data>")]
pub async fn exec_patch(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    data: Data<'_>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    let body = read_body(&name, data).await?;
    proxy(name, path, req, body, state).await
}

#[rocket::delete("/fn/<name>/<path..>")]
pub async fn exec_delete(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    proxy(name, path, req, Vec::new(), state).await
}

#[rocket::head("/fn/<name>/<path..>")]
pub async fn exec_head(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    proxy(name, path, req, Vec::new(), state).await
}

#[rocket::options("/fn/<name>/<path..>")]
pub async fn exec_options(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    proxy(name, path, req, Vec::new(), state).await
}

async fn read_body(name: &str, data: Data<'_>) -> Result<Vec<u8>> {
    Ok(data
        .open(MAX_BODY_MB.mebibytes())
        .into_bytes()
        .await
        .map_err(|cause| BodyReadFailure {
            name: name.to_string(),
            cause: StringError::from(cause.to_string()),
        })?
        .into_inner())
}

/// Implements the request path of spec §4.4: resolve a connection (cold
/// starting through the controller on a miss), translate the HTTP request
/// into an `ExecuteReq`, forward it, and translate the reply back.
async fn proxy(
    name: String,
    path: PathBuf,
    req: &Request<'_>,
    body: Vec<u8>,
    state: &State<RouterState>,
) -> Result<Upstream> {
    let mut client = match state.table.get_conn(&name).await {
        Some(client) => client,
        None => {
            info!("no route for {}, driving a cold start", cyan(&name));
            let activated = state.controller.new_function_pod(&name).await?;
            state
                .table
                .add_route(&name, activated.version, &activated.pod_ip)
                .await;
            match state.table.get_conn(&name).await {
                Some(client) => client,
                None => {
                    warn!(
                        "cold start for {} reported success but the route never landed",
                        cyan(&name)
                    );
                    return Err(ColdStartFailure {
                        name: name.clone(),
                        cause: StringError::from("route table never observed the activated pod"),
                    }
                    .into());
                }
            }
        }
    };

    let execute_request = ExecuteRequest {
        name: name.clone(),
        method: req.method().as_str().to_string(),
        path: path.to_string_lossy().to_string(),
        header: translate_headers(req),
        query: translate_query(req),
        body,
    };

    let mut request = tonic::Request::new(execute_request);
    request.set_timeout(EXECUTE_DEADLINE);
    match client.execute(request).await {
        Ok(response) => {
            let response = response.into_inner();
            Ok(Upstream {
                status: response.status_code as u16,
                headers: response
                    .header
                    .into_iter()
                    .map(|(key, values)| (key, values.values))
                    .collect(),
                body: response.body,
            })
        }
        Err(status) => {
            warn!(
                "lost the route to {} ({}), dropping it so the next request rediscovers",
                cyan(&name),
                status
            );
            // We don't know which host answered from a `tonic::Status` alone,
            // so the pod watcher's next `Deleted` event (the sidecar will
            // have already marked itself terminating) repairs the table; a
            // transport error here only ever happens against a pod the
            // controller is about to reap anyway.
            Err(ExecuteTransportFailure {
                name,
                cause: StringError::from(status.to_string()),
            }
            .into())
        }
    }
}

fn translate_headers(req: &Request<'_>) -> HashMap<String, HeaderValues> {
    let mut header: HashMap<String, Vec<String>> = HashMap::new();
    for h in req.headers().iter() {
        let name = h.name().to_string();
        if STRIPPED_HEADERS.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        header.entry(name).or_default().push(h.value().to_string());
    }
    let host = req
        .headers()
        .get_one("host")
        .unwrap_or_default()
        .to_string();
    header.insert("X-Forwarded-Host".to_string(), vec![host]);
    header
        .into_iter()
        .map(|(key, values)| (key, HeaderValues { values }))
        .collect()
}

fn translate_query(req: &Request<'_>) -> HashMap<String, HeaderValues> {
    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(raw) = req.uri().query() {
        for (key, value) in url::form_urlencoded::parse(raw.as_str().as_bytes()) {
            query.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    query
        .into_iter()
        .map(|(key, values)| (key, HeaderValues { values }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripped_headers_are_lowercase_matched() {
        assert!(STRIPPED_HEADERS.contains(&"upgrade-insecure-requests"));
    }
}
